// SPDX-FileCopyrightText: 2026 Engram Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Connection management and first-use schema creation.

use engram_core::{EngramError, Table};
use tokio_rusqlite::Connection;

/// Helper to convert tokio_rusqlite errors into EngramError::Storage.
pub(crate) fn storage_err(e: tokio_rusqlite::Error) -> EngramError {
    EngramError::Storage {
        source: Box::new(e),
    }
}

/// Open a database at `path` (or in memory when `None`) and ensure the
/// engine's four tables exist.
///
/// Each table has the same shape: `id` primary key, `vector` BLOB, and a
/// JSON `fields` column holding scalars and serialised lists. Existing
/// host tables are left untouched.
pub async fn open_database(path: Option<&str>) -> Result<Connection, EngramError> {
    let conn = match path {
        Some(p) => Connection::open(p).await.map_err(storage_err)?,
        None => Connection::open_in_memory().await.map_err(storage_err)?,
    };

    conn.call(|conn| {
        conn.execute_batch("PRAGMA journal_mode = WAL; PRAGMA synchronous = NORMAL;")?;
        Ok(())
    })
    .await
    .map_err(storage_err)?;

    ensure_schema(&conn).await?;
    Ok(conn)
}

/// Create the engine's tables if they do not exist yet.
pub async fn ensure_schema(conn: &Connection) -> Result<(), EngramError> {
    conn.call(|conn| {
        for table in Table::all() {
            conn.execute_batch(&format!(
                "CREATE TABLE IF NOT EXISTS {name} (
                    id TEXT PRIMARY KEY NOT NULL,
                    vector BLOB NOT NULL,
                    fields TEXT NOT NULL DEFAULT '{{}}'
                );",
                name = table.as_str()
            ))?;
        }
        Ok(())
    })
    .await
    .map_err(storage_err)
}
