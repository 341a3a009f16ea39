//! Attachment handle registry.
//!
//! # Responsibility
//! - Mint attachment metadata and a live handle for every selected file.
//! - Release handles on explicit removal, edit reconciliation and record
//!   deletion.
//!
//! # Invariants
//! - Handle state only moves `live -> released`. Releasing drops the file
//!   data and leaves only the id behind as a tombstone, so the same
//!   attachment id can never become live again.
//! - Every access to a released, unknown or handle-less attachment fails with
//!   `HandleUnavailable`.
//! - Nothing here is persisted; a restart starts with an empty registry.

use crate::error::{CrmError, CrmResult};
use crate::model::attachment::{Attachment, AttachmentId, PendingFile, TransientHandle};
use crate::model::record::Record;
use log::{debug, info};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use uuid::Uuid;

const MODULE: &str = "attachment_registry";

#[derive(Debug)]
struct LiveSlot {
    handle: TransientHandle,
    data: Arc<[u8]>,
}

/// Owner of all attachment data reachable in this process.
#[derive(Debug, Default)]
pub struct AttachmentRegistry {
    live: HashMap<AttachmentId, LiveSlot>,
    /// Tombstones: ids whose data was dropped and must stay unreachable.
    released: HashSet<AttachmentId>,
}

impl AttachmentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers selected files and returns their attachments, in input
    /// order, each carrying a live handle.
    pub fn attach(&mut self, files: Vec<PendingFile>) -> Vec<Attachment> {
        let attachments: Vec<Attachment> = files
            .into_iter()
            .map(|file| {
                let id = Uuid::new_v4();
                let handle = TransientHandle::mint();
                let size_bytes = file.data.len() as u64;
                self.live.insert(
                    id,
                    LiveSlot {
                        handle,
                        data: Arc::from(file.data),
                    },
                );
                Attachment {
                    id,
                    name: file.name,
                    mime_type: file.mime_type,
                    size_bytes,
                    transient_handle: Some(handle),
                }
            })
            .collect();

        info!(
            "event=attachment_attach module={MODULE} status=ok count={} live_count={}",
            attachments.len(),
            self.live_count()
        );
        attachments
    }

    /// Releases the handle of one attachment and drops its data.
    ///
    /// Returns `true` when a live handle was released; already released or
    /// unknown ids are a no-op.
    pub fn detach(&mut self, id: AttachmentId) -> bool {
        let Some(slot) = self.live.remove(&id) else {
            let reason = if self.released.contains(&id) {
                "released"
            } else {
                "unknown"
            };
            debug!("event=attachment_detach module={MODULE} status=noop reason={reason} attachment_id={id}");
            return false;
        };

        self.released.insert(id);
        info!(
            "event=attachment_detach module={MODULE} status=ok attachment_id={id} {}",
            slot.handle
        );
        true
    }

    /// Releases every attachment present in `old` but missing from `new`.
    ///
    /// Returns the number of handles released.
    pub fn reconcile_on_edit(&mut self, old: &[Attachment], new: &[Attachment]) -> usize {
        let released = old
            .iter()
            .filter(|before| !new.iter().any(|after| after.id == before.id))
            .filter(|before| self.detach(before.id))
            .count();
        debug!("event=attachment_reconcile module={MODULE} status=ok trigger=edit released={released}");
        released
    }

    /// Releases every live handle owned by `record`.
    pub fn reconcile_on_delete(&mut self, record: &Record) -> usize {
        let released = record
            .attachments
            .iter()
            .filter(|attachment| self.detach(attachment.id))
            .count();
        debug!(
            "event=attachment_reconcile module={MODULE} status=ok trigger=delete record_id={} released={released}",
            record.id
        );
        released
    }

    /// Returns the file data behind `attachment`.
    ///
    /// # Errors
    /// - `HandleUnavailable` when the attachment has no handle (e.g. it was
    ///   restored from storage), its handle was released, or the handle does
    ///   not belong to this registry.
    pub fn open(&self, attachment: &Attachment) -> CrmResult<Arc<[u8]>> {
        let unavailable = || CrmError::HandleUnavailable(attachment.id);
        let handle = attachment.transient_handle.ok_or_else(unavailable)?;
        match self.live.get(&attachment.id) {
            Some(slot) if slot.handle == handle => Ok(Arc::clone(&slot.data)),
            _ => Err(unavailable()),
        }
    }

    /// Re-annotates live handles onto attachments reloaded from storage.
    ///
    /// Attachments whose handle was released (or never existed here) end up
    /// with no handle.
    pub fn hydrate(&self, attachments: &mut [Attachment]) {
        for attachment in attachments {
            attachment.transient_handle = self.live.get(&attachment.id).map(|slot| slot.handle);
        }
    }

    pub fn is_live(&self, id: AttachmentId) -> bool {
        self.live.contains_key(&id)
    }

    pub fn live_count(&self) -> usize {
        self.live.len()
    }
}

#[cfg(test)]
mod tests {
    use super::AttachmentRegistry;
    use crate::error::CrmError;
    use crate::model::attachment::PendingFile;
    use crate::model::record::Record;

    fn pdf(name: &str) -> PendingFile {
        PendingFile::new(name, "application/pdf", name.as_bytes().to_vec())
    }

    #[test]
    fn attach_captures_metadata_and_live_handle() {
        let mut registry = AttachmentRegistry::new();
        let attachments = registry.attach(vec![pdf("proposta.pdf"), pdf("contrato.pdf")]);

        assert_eq!(attachments.len(), 2);
        assert_eq!(attachments[0].name, "proposta.pdf");
        assert_eq!(attachments[0].size_bytes, "proposta.pdf".len() as u64);
        assert!(attachments.iter().all(|a| a.has_handle()));
        assert_ne!(attachments[0].id, attachments[1].id);
        assert_eq!(&*registry.open(&attachments[1]).unwrap(), b"contrato.pdf");
        assert_eq!(registry.live_count(), 2);
    }

    #[test]
    fn detach_is_idempotent_and_never_resurrects() {
        let mut registry = AttachmentRegistry::new();
        let attachment = registry.attach(vec![pdf("a.pdf")]).remove(0);

        assert!(registry.detach(attachment.id));
        assert!(!registry.detach(attachment.id));
        assert!(!registry.detach(uuid::Uuid::new_v4()));

        let mut reloaded = vec![attachment.clone()];
        registry.hydrate(&mut reloaded);
        assert!(!reloaded[0].has_handle());
        assert!(matches!(
            registry.open(&attachment).unwrap_err(),
            CrmError::HandleUnavailable(id) if id == attachment.id
        ));
    }

    #[test]
    fn release_keeps_only_the_id_as_tombstone() {
        let mut registry = AttachmentRegistry::new();
        let attachment = registry.attach(vec![pdf("a.pdf")]).remove(0);
        let data = registry.open(&attachment).unwrap();
        assert_eq!(std::sync::Arc::strong_count(&data), 2);

        assert!(registry.detach(attachment.id));
        assert!(!registry.live.contains_key(&attachment.id));
        assert!(registry.released.contains(&attachment.id));
        assert_eq!(std::sync::Arc::strong_count(&data), 1);
    }

    #[test]
    fn reconcile_on_edit_releases_only_dropped_attachments() {
        let mut registry = AttachmentRegistry::new();
        let old = registry.attach(vec![pdf("keep.pdf"), pdf("drop.pdf")]);
        let new = vec![old[0].clone()];

        assert_eq!(registry.reconcile_on_edit(&old, &new), 1);
        assert!(registry.is_live(old[0].id));
        assert!(!registry.is_live(old[1].id));
        assert_eq!(registry.reconcile_on_edit(&old, &new), 0);
    }

    #[test]
    fn reconcile_on_delete_releases_every_handle() {
        let mut registry = AttachmentRegistry::new();
        let mut record = Record::new("Cliente X");
        record.attachments = registry.attach(vec![pdf("a.pdf"), pdf("b.pdf")]);

        assert_eq!(registry.reconcile_on_delete(&record), 2);
        assert_eq!(registry.live_count(), 0);
        for attachment in &record.attachments {
            assert!(matches!(
                registry.open(attachment),
                Err(CrmError::HandleUnavailable(_))
            ));
        }
    }

    #[test]
    fn restored_metadata_without_handle_is_unavailable() {
        let mut registry = AttachmentRegistry::new();
        let mut attachment = registry.attach(vec![pdf("a.pdf")]).remove(0);
        attachment.transient_handle = None;
        assert!(registry.open(&attachment).is_err());

        registry.hydrate(std::slice::from_mut(&mut attachment));
        assert!(registry.open(&attachment).is_ok());
    }
}
