//! Key/value medium contract and SQLite implementation.
//!
//! # Responsibility
//! - Read, replace and delete whole JSON values under string keys.
//! - Decode collections entry by entry into typed snapshots that keep their
//!   load origin.
//!
//! # Invariants
//! - `write` replaces the full value in a single statement (last writer wins).
//! - Decoding never panics; a payload that is not a JSON array becomes
//!   `LoadOrigin::Degraded`.
//! - Entries that fail to decode are retained verbatim and written back by
//!   every read-modify-write cycle, so one bad entry never costs the others.

use crate::db::{ensure_kv_table, DbError};
use log::{debug, warn};
use rusqlite::{params, Connection, OptionalExtension};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type StorageResult<T> = Result<T, StorageError>;

/// Failure of the persistent medium.
#[derive(Debug)]
pub enum StorageError {
    Db(DbError),
    Encode {
        key: String,
        source: serde_json::Error,
    },
}

impl Display for StorageError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::Encode { key, source } => write!(f, "failed to encode `{key}`: {source}"),
        }
    }
}

impl Error for StorageError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            Self::Encode { source, .. } => Some(source),
        }
    }
}

impl From<DbError> for StorageError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for StorageError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// Synchronous read/write channel to the persistent medium.
pub trait KeyValueRepository {
    /// Returns the raw value stored under `key`, if any.
    fn read(&self, key: &str) -> StorageResult<Option<String>>;
    /// Replaces the value stored under `key`.
    fn write(&self, key: &str, value: &str) -> StorageResult<()>;
    /// Removes `key`. Absent keys are not an error.
    fn delete(&self, key: &str) -> StorageResult<()>;
}

/// SQLite-backed key/value repository.
#[derive(Clone, Copy)]
pub struct SqliteKeyValueRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteKeyValueRepository<'conn> {
    /// Constructs a repository from a migrated connection.
    ///
    /// # Errors
    /// - `DbError::MissingRequiredTable` when `kv_entries` was never created.
    pub fn try_new(conn: &'conn Connection) -> StorageResult<Self> {
        ensure_kv_table(conn)?;
        Ok(Self { conn })
    }
}

impl KeyValueRepository for SqliteKeyValueRepository<'_> {
    fn read(&self, key: &str) -> StorageResult<Option<String>> {
        let value = self
            .conn
            .query_row(
                "SELECT value FROM kv_entries WHERE key = ?1;",
                [key],
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        Ok(value)
    }

    fn write(&self, key: &str, value: &str) -> StorageResult<()> {
        self.conn.execute(
            "INSERT INTO kv_entries (key, value, updated_at)
             VALUES (?1, ?2, (strftime('%s', 'now') * 1000))
             ON CONFLICT(key) DO UPDATE SET
                value = excluded.value,
                updated_at = excluded.updated_at;",
            params![key, value],
        )?;
        Ok(())
    }

    fn delete(&self, key: &str) -> StorageResult<()> {
        self.conn
            .execute("DELETE FROM kv_entries WHERE key = ?1;", [key])?;
        Ok(())
    }
}

/// Where a loaded collection came from.
#[derive(Debug)]
pub enum LoadOrigin {
    /// Decoded from a stored value.
    Persisted,
    /// Nothing stored under the key yet.
    Absent,
    /// Stored value could not be used; the collection is reported empty.
    Degraded(DegradedReason),
}

#[derive(Debug)]
pub enum DegradedReason {
    /// The medium itself failed.
    ReadFailed(StorageError),
    /// The stored payload is not a valid collection.
    Undecodable(String),
}

/// Typed collection plus its load origin.
#[derive(Debug)]
pub struct Snapshot<T> {
    pub items: Vec<T>,
    /// Stored entries that did not decode as `T`, kept verbatim.
    pub retained: Vec<Value>,
    pub origin: LoadOrigin,
}

impl<T> Snapshot<T> {
    fn empty(origin: LoadOrigin) -> Self {
        Self {
            items: Vec::new(),
            retained: Vec::new(),
            origin,
        }
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self.origin, LoadOrigin::Degraded(_))
    }

    /// Number of stored entries that are hidden because they did not decode.
    pub fn retained_count(&self) -> usize {
        self.retained.len()
    }

    /// Returns the items unless the medium itself failed.
    pub fn require_readable(self) -> StorageResult<Vec<T>> {
        self.into_rewrite().map(|rewrite| rewrite.items)
    }

    /// Opens a read-modify-write cycle over this collection.
    ///
    /// Fails when the medium could not be read, so an unreadable collection
    /// is never overwritten. A payload that is not a JSON array yields an
    /// empty collection and gets replaced by the next write. Undecodable
    /// entries travel along and are written back after the typed items.
    pub(crate) fn into_rewrite(self) -> StorageResult<Rewrite<T>> {
        match self.origin {
            LoadOrigin::Degraded(DegradedReason::ReadFailed(err)) => Err(err),
            _ => Ok(Rewrite {
                items: self.items,
                retained: self.retained,
            }),
        }
    }
}

/// Collection held between a load and the write that replaces it.
#[derive(Debug)]
pub(crate) struct Rewrite<T> {
    pub(crate) items: Vec<T>,
    retained: Vec<Value>,
}

impl<T> Rewrite<T> {
    /// Raw entries that did not decode and will be written back untouched.
    pub(crate) fn retained(&self) -> &[Value] {
        &self.retained
    }
}

/// Reads the collection stored under `key` and decodes it entry by entry.
pub(crate) fn load_collection<T, R>(repo: &R, key: &str, module: &str) -> Snapshot<T>
where
    T: DeserializeOwned,
    R: KeyValueRepository + ?Sized,
{
    let raw = match repo.read(key) {
        Ok(Some(raw)) => raw,
        Ok(None) => {
            debug!("event=collection_load module={module} status=ok origin=absent");
            return Snapshot::empty(LoadOrigin::Absent);
        }
        Err(err) => {
            warn!(
                "event=collection_load module={module} status=degraded error_code=read_failed error={err}"
            );
            return Snapshot::empty(LoadOrigin::Degraded(DegradedReason::ReadFailed(err)));
        }
    };

    let entries = match serde_json::from_str::<Vec<Value>>(&raw) {
        Ok(entries) => entries,
        Err(err) => {
            warn!(
                "event=collection_load module={module} status=degraded error_code=undecodable error={err}"
            );
            return Snapshot::empty(LoadOrigin::Degraded(DegradedReason::Undecodable(
                err.to_string(),
            )));
        }
    };

    let mut items = Vec::with_capacity(entries.len());
    let mut retained = Vec::new();
    for (index, entry) in entries.into_iter().enumerate() {
        let decoded: Result<T, _> = Deserialize::deserialize(&entry);
        match decoded {
            Ok(item) => items.push(item),
            Err(err) => {
                warn!(
                    "event=collection_entry_skipped module={module} status=retained index={index} error={err}"
                );
                retained.push(entry);
            }
        }
    }

    debug!(
        "event=collection_load module={module} status=ok origin=persisted count={} retained={}",
        items.len(),
        retained.len()
    );
    Snapshot {
        items,
        retained,
        origin: LoadOrigin::Persisted,
    }
}

/// Encodes the collection and replaces the value under `key` in one write.
///
/// Typed items come first, followed by the retained raw entries.
pub(crate) fn store_collection<T, R>(
    repo: &R,
    key: &str,
    rewrite: &Rewrite<T>,
) -> StorageResult<()>
where
    T: Serialize,
    R: KeyValueRepository + ?Sized,
{
    let encode_err = |source: serde_json::Error| StorageError::Encode {
        key: key.to_string(),
        source,
    };
    let mut entries = rewrite
        .items
        .iter()
        .map(serde_json::to_value)
        .collect::<Result<Vec<Value>, _>>()
        .map_err(encode_err)?;
    entries.extend(rewrite.retained.iter().cloned());

    let encoded = serde_json::to_string(&entries).map_err(encode_err)?;
    repo.write(key, &encoded)
}
