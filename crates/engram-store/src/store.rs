// SPDX-FileCopyrightText: 2026 Engram Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite implementation of the vector-store port.
//!
//! Vectors are BLOBs, scalar and list columns live in a JSON `fields`
//! column queried via `json_extract`. Vector search is a brute-force
//! cosine scan; tables stay small enough (hundreds to low thousands of
//! rows) that an index would not pay for itself.

use async_trait::async_trait;
use engram_core::vector::{blob_to_vec, cosine_similarity, vec_to_blob};
use engram_core::{
    AdapterType, EngramError, HealthStatus, PluginAdapter, ScoredRecord, StoredRecord, Table,
    VectorStoreAdapter,
};
use tokio_rusqlite::Connection;

use crate::database::{open_database, storage_err};

/// SQLite-backed vector store for the engine's four tables.
pub struct SqliteVectorStore {
    conn: Connection,
}

impl SqliteVectorStore {
    /// Open (or create) a store at `path`; `None` opens in memory.
    pub async fn open(path: Option<&str>) -> Result<Self, EngramError> {
        let conn = open_database(path).await?;
        Ok(Self { conn })
    }

    /// Wrap an existing connection whose schema is already created.
    pub fn new(conn: Connection) -> Self {
        Self { conn }
    }
}

fn row_to_record(
    id: String,
    blob: Vec<u8>,
    fields_json: String,
) -> StoredRecord {
    let fields = serde_json::from_str(&fields_json).unwrap_or_default();
    StoredRecord {
        id,
        vector: blob_to_vec(&blob),
        fields,
    }
}

#[async_trait]
impl PluginAdapter for SqliteVectorStore {
    fn name(&self) -> &str {
        "sqlite-vector-store"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::VectorStore
    }

    async fn health_check(&self) -> Result<HealthStatus, EngramError> {
        let result = self
            .conn
            .call(|conn| {
                let n: i64 = conn.query_row("SELECT 1", [], |row| row.get(0))?;
                Ok(n)
            })
            .await;
        match result {
            Ok(_) => Ok(HealthStatus::Healthy),
            Err(e) => Ok(HealthStatus::Unhealthy(e.to_string())),
        }
    }

    async fn shutdown(&self) -> Result<(), EngramError> {
        Ok(())
    }
}

#[async_trait]
impl VectorStoreAdapter for SqliteVectorStore {
    async fn add(&self, table: Table, record: &StoredRecord) -> Result<(), EngramError> {
        let id = record.id.clone();
        let blob = vec_to_blob(&record.vector);
        let fields = serde_json::Value::Object(record.fields.clone()).to_string();
        let sql = format!(
            "INSERT OR REPLACE INTO {} (id, vector, fields) VALUES (?1, ?2, ?3)",
            table.as_str()
        );
        self.conn
            .call(move |conn| {
                conn.execute(&sql, rusqlite::params![id, blob, fields])?;
                Ok(())
            })
            .await
            .map_err(storage_err)
    }

    async fn get(&self, table: Table, id: &str) -> Result<Option<StoredRecord>, EngramError> {
        let id = id.to_string();
        let sql = format!(
            "SELECT id, vector, fields FROM {} WHERE id = ?1",
            table.as_str()
        );
        self.conn
            .call(move |conn| {
                let mut stmt = conn.prepare(&sql)?;
                let mut rows = stmt.query(rusqlite::params![id])?;
                match rows.next()? {
                    Some(row) => Ok(Some(row_to_record(row.get(0)?, row.get(1)?, row.get(2)?))),
                    None => Ok(None),
                }
            })
            .await
            .map_err(storage_err)
    }

    async fn search(
        &self,
        table: Table,
        vector: &[f32],
        limit: usize,
    ) -> Result<Vec<ScoredRecord>, EngramError> {
        let all = self.scan_all(table).await?;
        let mut scored: Vec<ScoredRecord> = all
            .into_iter()
            .filter_map(|record| {
                // Zero-vector seed rows never match.
                if record.vector.iter().all(|x| *x == 0.0) {
                    return None;
                }
                let similarity = cosine_similarity(vector, &record.vector);
                Some(ScoredRecord { record, similarity })
            })
            .collect();
        scored.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        scored.truncate(limit);
        Ok(scored)
    }

    async fn filter_eq(
        &self,
        table: Table,
        field: &str,
        value: &serde_json::Value,
    ) -> Result<Vec<StoredRecord>, EngramError> {
        let path = format!("$.{field}");
        let value_text = match value {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        let sql = format!(
            "SELECT id, vector, fields FROM {} WHERE json_extract(fields, ?1) = ?2",
            table.as_str()
        );
        self.conn
            .call(move |conn| {
                let mut stmt = conn.prepare(&sql)?;
                let records = stmt
                    .query_map(rusqlite::params![path, value_text], |row| {
                        Ok(row_to_record(row.get(0)?, row.get(1)?, row.get(2)?))
                    })?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(records)
            })
            .await
            .map_err(storage_err)
    }

    async fn update(
        &self,
        table: Table,
        id: &str,
        fields: serde_json::Map<String, serde_json::Value>,
        vector: Option<&[f32]>,
    ) -> Result<(), EngramError> {
        let Some(mut existing) = self.get(table, id).await? else {
            // Updates of missing rows are a no-op (last-write-wins port semantics).
            return Ok(());
        };
        for (k, v) in fields {
            existing.fields.insert(k, v);
        }
        if let Some(v) = vector {
            existing.vector = v.to_vec();
        }
        self.add(table, &existing).await
    }

    async fn delete(&self, table: Table, id: &str) -> Result<(), EngramError> {
        let id = id.to_string();
        let sql = format!("DELETE FROM {} WHERE id = ?1", table.as_str());
        self.conn
            .call(move |conn| {
                conn.execute(&sql, rusqlite::params![id])?;
                Ok(())
            })
            .await
            .map_err(storage_err)
    }

    async fn count_rows(&self, table: Table) -> Result<usize, EngramError> {
        let sql = format!("SELECT count(*) FROM {}", table.as_str());
        self.conn
            .call(move |conn| {
                let n: i64 = conn.query_row(&sql, [], |row| row.get(0))?;
                Ok(n as usize)
            })
            .await
            .map_err(storage_err)
    }

    async fn scan_all(&self, table: Table) -> Result<Vec<StoredRecord>, EngramError> {
        let sql = format!("SELECT id, vector, fields FROM {}", table.as_str());
        self.conn
            .call(move |conn| {
                let mut stmt = conn.prepare(&sql)?;
                let records = stmt
                    .query_map([], |row| {
                        Ok(row_to_record(row.get(0)?, row.get(1)?, row.get(2)?))
                    })?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(records)
            })
            .await
            .map_err(storage_err)
    }
}
