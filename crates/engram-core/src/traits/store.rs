// SPDX-FileCopyrightText: 2026 Engram Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Vector-store port: persistent tables with vector search, equality
//! scans, row updates, and idempotent deletes.
//!
//! Conflict semantics follow last-write-wins: a duplicate-id `add`
//! overwrites, an `update` of a missing row is a no-op, and deletes are
//! idempotent. `scan_all` exists so maintenance sweeps never rely on a
//! bounded zero-vector search as a full-table proxy.

use async_trait::async_trait;

use crate::error::EngramError;
use crate::traits::adapter::PluginAdapter;
use crate::types::{ScoredRecord, StoredRecord};

/// The four persistent tables owned by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Table {
    Themes,
    Semantics,
    Episodes,
    UserProfile,
}

impl Table {
    /// SQL-safe table name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Table::Themes => "themes",
            Table::Semantics => "semantics",
            Table::Episodes => "episodes",
            Table::UserProfile => "user_profile",
        }
    }

    /// All engine-owned tables, for schema bootstrap and sweeps.
    pub fn all() -> [Table; 4] {
        [
            Table::Themes,
            Table::Semantics,
            Table::Episodes,
            Table::UserProfile,
        ]
    }
}

/// Adapter over the persistent vector database.
///
/// Must be safe under concurrent use; mutations to the same primary key
/// observe last-write-wins.
#[async_trait]
pub trait VectorStoreAdapter: PluginAdapter {
    /// Insert a record, overwriting any existing row with the same id.
    async fn add(&self, table: Table, record: &StoredRecord) -> Result<(), EngramError>;

    /// Fetch a record by id.
    async fn get(&self, table: Table, id: &str) -> Result<Option<StoredRecord>, EngramError>;

    /// Vector search: top-`limit` records by cosine similarity to `vector`,
    /// descending. Zero-vector seed rows never match.
    async fn search(
        &self,
        table: Table,
        vector: &[f32],
        limit: usize,
    ) -> Result<Vec<ScoredRecord>, EngramError>;

    /// Equality-filter scan over a scalar field.
    async fn filter_eq(
        &self,
        table: Table,
        field: &str,
        value: &serde_json::Value,
    ) -> Result<Vec<StoredRecord>, EngramError>;

    /// Merge `fields` into an existing row and optionally replace its
    /// vector. Missing rows are a no-op.
    async fn update(
        &self,
        table: Table,
        id: &str,
        fields: serde_json::Map<String, serde_json::Value>,
        vector: Option<&[f32]>,
    ) -> Result<(), EngramError>;

    /// Delete by id. Deleting a missing row succeeds.
    async fn delete(&self, table: Table, id: &str) -> Result<(), EngramError>;

    /// Number of rows in a table.
    async fn count_rows(&self, table: Table) -> Result<usize, EngramError>;

    /// Every row in a table, unbounded. Used by the decay and dedup sweeps.
    async fn scan_all(&self, table: Table) -> Result<Vec<StoredRecord>, EngramError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_names() {
        assert_eq!(Table::Themes.as_str(), "themes");
        assert_eq!(Table::Semantics.as_str(), "semantics");
        assert_eq!(Table::Episodes.as_str(), "episodes");
        assert_eq!(Table::UserProfile.as_str(), "user_profile");
    }

    #[test]
    fn all_covers_four_tables() {
        assert_eq!(Table::all().len(), 4);
    }
}
