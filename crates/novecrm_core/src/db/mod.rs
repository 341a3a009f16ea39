//! Device store bootstrap: connection setup, schema migrations and the
//! `kv_entries` table every CRM collection lives in.
//!
//! # Responsibility
//! - Open and configure the device-local SQLite database backing the CRM.
//! - Apply schema migrations in deterministic order.
//! - Confirm the key/value table exists before any store is built on it.
//!
//! # Invariants
//! - Migration version is tracked via `PRAGMA user_version`.
//! - A connection handed out by `open_db*` always carries `kv_entries`.

use rusqlite::Connection;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod migrations;
mod open;

pub use open::{open_db, open_db_in_memory};

/// Table holding every persisted collection as one JSON value per key.
pub const KV_TABLE: &str = "kv_entries";

pub type DbResult<T> = Result<T, DbError>;

#[derive(Debug)]
pub enum DbError {
    Sqlite(rusqlite::Error),
    /// The file was written by a newer build; opening it could lose data.
    UnsupportedSchemaVersion {
        db_version: u32,
        latest_supported: u32,
    },
    /// The connection was never migrated into a CRM store.
    MissingRequiredTable(&'static str),
}

impl Display for DbError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sqlite(err) => write!(f, "crm store error: {err}"),
            Self::UnsupportedSchemaVersion {
                db_version,
                latest_supported,
            } => write!(
                f,
                "crm store was written by schema version {db_version}; this build reads up to {latest_supported}"
            ),
            Self::MissingRequiredTable(table) => {
                write!(f, "crm store is missing table `{table}`; open it through open_db")
            }
        }
    }
}

impl Error for DbError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Sqlite(err) => Some(err),
            Self::UnsupportedSchemaVersion { .. } | Self::MissingRequiredTable(_) => None,
        }
    }
}

impl From<rusqlite::Error> for DbError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Sqlite(value)
    }
}

/// Fails with `MissingRequiredTable` unless `kv_entries` exists.
pub fn ensure_kv_table(conn: &Connection) -> DbResult<()> {
    let exists: bool = conn.query_row(
        "SELECT EXISTS(
            SELECT 1
            FROM sqlite_master
            WHERE type = 'table' AND name = ?1
        );",
        [KV_TABLE],
        |row| row.get(0),
    )?;
    if !exists {
        return Err(DbError::MissingRequiredTable(KV_TABLE));
    }
    Ok(())
}
