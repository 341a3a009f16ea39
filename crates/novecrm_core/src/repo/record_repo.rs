//! Per-owner record collections.
//!
//! # Responsibility
//! - Load, upsert and remove records of one owner.
//! - Keep `created_at` fixed and refresh `updated_at` on every save.
//!
//! # Invariants
//! - One collection per owner key; owners never see each other's records.
//! - Every mutation rewrites the owner's full collection in one write.
//! - Stored entries that no longer decode are hidden from loads but written
//!   back unchanged by every mutation.
//! - Records are validated before any read or write of the medium.
//! - Loads are sorted by `created_at DESC, id ASC`.

use crate::config::StorageKeys;
use crate::error::CrmResult;
use crate::model::record::{sort_newest_first, Record, RecordId};
use crate::repo::kv_repo::{load_collection, store_collection, KeyValueRepository, Snapshot};
use chrono::Utc;
use log::{debug, info};

const MODULE: &str = "record_store";

pub struct RecordStore<R: KeyValueRepository> {
    repo: R,
    keys: StorageKeys,
}

impl<R: KeyValueRepository> RecordStore<R> {
    pub fn new(repo: R) -> Self {
        Self::with_keys(repo, StorageKeys::default())
    }

    pub fn with_keys(repo: R, keys: StorageKeys) -> Self {
        Self { repo, keys }
    }

    /// Returns the owner's records, newest first.
    ///
    /// A read failure yields an empty list; use [`RecordStore::snapshot`] to
    /// tell it apart from an owner with no records.
    pub fn load(&self, owner: &str) -> Vec<Record> {
        self.snapshot(owner).items
    }

    /// Loads the owner's records together with their load origin.
    ///
    /// Stored records are normalized on the way out, so notes written by
    /// older builds past the character bound come back truncated.
    pub fn snapshot(&self, owner: &str) -> Snapshot<Record> {
        let mut snapshot: Snapshot<Record> =
            load_collection(&self.repo, &self.keys.records_key(owner), MODULE);
        for record in &mut snapshot.items {
            record.normalize();
        }
        sort_newest_first(&mut snapshot.items);
        snapshot
    }

    /// Returns one record of the owner by id.
    pub fn get(&self, owner: &str, id: RecordId) -> Option<Record> {
        self.load(owner).into_iter().find(|record| record.id == id)
    }

    /// Inserts or replaces a record and returns the stored version.
    ///
    /// - Existing id: replaced; `created_at` is kept from the stored record.
    /// - New id: inserted with the record's own `created_at`.
    /// - Both cases: `updated_at` is set to now and `observacoes` is cut to
    ///   the character bound.
    ///
    /// # Errors
    /// - `Validation` when the record is invalid after normalization; nothing
    ///   is written.
    /// - `StorageUnavailable` when the collection cannot be read or written.
    ///   Entries that fail to decode are written back as they were stored.
    pub fn upsert(&self, owner: &str, mut record: Record) -> CrmResult<Record> {
        record.normalize();
        record.validate()?;

        let key = self.keys.records_key(owner);
        let mut collection = self.snapshot(owner).into_rewrite()?;
        record.updated_at = Utc::now();

        let records = &mut collection.items;
        let replaced = match records.iter_mut().find(|stored| stored.id == record.id) {
            Some(stored) => {
                record.created_at = stored.created_at;
                *stored = record.clone();
                true
            }
            None => {
                records.push(record.clone());
                false
            }
        };
        sort_newest_first(records);
        let record_count = records.len();
        store_collection(&self.repo, &key, &collection)?;

        info!(
            "event=record_upsert module={MODULE} status=ok record_id={} replaced={} record_count={} retained={}",
            record.id,
            replaced,
            record_count,
            collection.retained().len()
        );
        Ok(record)
    }

    /// Removes a record by id. Returns whether something was removed.
    ///
    /// Removing an absent id does not touch the medium.
    pub fn remove(&self, owner: &str, id: RecordId) -> CrmResult<bool> {
        let mut collection = self.snapshot(owner).into_rewrite()?;
        let before = collection.items.len();
        collection.items.retain(|record| record.id != id);
        if collection.items.len() == before {
            debug!("event=record_remove module={MODULE} status=noop record_id={id}");
            return Ok(false);
        }

        store_collection(&self.repo, &self.keys.records_key(owner), &collection)?;
        info!(
            "event=record_remove module={MODULE} status=ok record_id={id} record_count={}",
            collection.items.len()
        );
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::RecordStore;
    use crate::db::open_db_in_memory;
    use crate::model::record::Record;
    use crate::repo::kv_repo::{KeyValueRepository, LoadOrigin, SqliteKeyValueRepository};
    use chrono::{Duration, Utc};

    #[test]
    fn load_sorts_newest_first_with_id_tiebreak() {
        let conn = open_db_in_memory().unwrap();
        let store = RecordStore::new(SqliteKeyValueRepository::try_new(&conn).unwrap());
        let now = Utc::now();

        let mut old = Record::new("Old");
        old.created_at = now - Duration::days(2);
        let mut tie_a = Record::new("Tie A");
        tie_a.created_at = now;
        let mut tie_b = Record::new("Tie B");
        tie_b.created_at = now;

        for record in [old.clone(), tie_a.clone(), tie_b.clone()] {
            store.upsert("ana", record).unwrap();
        }

        let loaded = store.load("ana");
        assert_eq!(loaded.len(), 3);
        assert_eq!(loaded[2].id, old.id);
        let (first, second) = if tie_a.id < tie_b.id {
            (tie_a.id, tie_b.id)
        } else {
            (tie_b.id, tie_a.id)
        };
        assert_eq!(loaded[0].id, first);
        assert_eq!(loaded[1].id, second);
    }

    #[test]
    fn snapshot_reports_absent_for_new_owner() {
        let conn = open_db_in_memory().unwrap();
        let store = RecordStore::new(SqliteKeyValueRepository::try_new(&conn).unwrap());
        let snapshot = store.snapshot("nobody");
        assert!(matches!(snapshot.origin, LoadOrigin::Absent));
        assert!(snapshot.items.is_empty());
    }

    #[test]
    fn legacy_long_notes_are_truncated_on_load() {
        let conn = open_db_in_memory().unwrap();
        let repo = SqliteKeyValueRepository::try_new(&conn).unwrap();
        let store = RecordStore::new(repo);

        let mut record = Record::new("Legado");
        record.observacoes = "n".repeat(800);
        let raw = serde_json::to_string(&vec![record]).unwrap();
        repo.write("novecrm_posts_ana_v1", &raw).unwrap();

        let loaded = store.load("ana");
        assert_eq!(loaded[0].observacoes.chars().count(), 500);
    }
}
