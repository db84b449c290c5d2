// SPDX-FileCopyrightText: 2026 Engram Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite-backed implementation of the Engram vector-store port.
//!
//! Four tables (`themes`, `semantics`, `episodes`, `user_profile`), each
//! with an `id` primary key, a BLOB `vector`, and a JSON `fields` column.
//! First use creates the schema; existing host tables are untouched.

pub mod database;
pub mod store;

pub use database::open_database;
pub use store::SqliteVectorStore;
