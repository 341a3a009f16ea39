//! Record lifecycle orchestration.
//!
//! # Responsibility
//! - Drive the `Browsing / Composing / Viewing` state machine for one
//!   signed-in owner.
//! - Write through `RecordStore` and keep `AttachmentRegistry` reconciled so
//!   no handle outlives the record or composition that owns it.
//!
//! # Invariants
//! - Validation runs before any mutation; a rejected save changes nothing.
//! - Handles acquired while composing are owned by the composition until a
//!   save hands them to the record. Cancel releases them.
//! - Attachments of an already saved record are only released at save time
//!   (edit reconciliation) or on delete.
//! - The working set is reloaded from storage after every mutation.

use crate::attachment::registry::AttachmentRegistry;
use crate::error::CrmError;
use crate::model::attachment::{Attachment, AttachmentId, PendingFile};
use crate::model::record::{Record, RecordDraft, RecordId};
use crate::model::user::Session;
use crate::model::validation::ValidationError;
use crate::repo::kv_repo::KeyValueRepository;
use crate::repo::record_repo::RecordStore;
use crate::search::filter::{self, RecordQuery};
use crate::service::export::{export_rows, ExportRow};
use chrono::Utc;
use log::{info, warn};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::Arc;
use uuid::Uuid;

const MODULE: &str = "record_lifecycle";

pub type LifecycleResult<T> = Result<T, LifecycleError>;

/// Which kind of composition is open.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComposeMode {
    New,
    Edit(RecordId),
}

/// Externally visible state of the orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Browsing,
    Composing(ComposeMode),
    Viewing(RecordId),
}

impl Display for LifecycleState {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Browsing => write!(f, "browsing"),
            Self::Composing(ComposeMode::New) => write!(f, "composing(new)"),
            Self::Composing(ComposeMode::Edit(_)) => write!(f, "composing(edit)"),
            Self::Viewing(_) => write!(f, "viewing"),
        }
    }
}

#[derive(Debug)]
pub enum LifecycleError {
    /// The requested action is not allowed from the current state.
    InvalidTransition {
        from: LifecycleState,
        action: &'static str,
    },
    /// No record with this id in the owner's collection.
    RecordNotFound(RecordId),
    Crm(CrmError),
}

impl Display for LifecycleError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidTransition { from, action } => {
                write!(f, "cannot {action} while {from}")
            }
            Self::RecordNotFound(id) => write!(f, "record not found: {id}"),
            Self::Crm(err) => write!(f, "{err}"),
        }
    }
}

impl Error for LifecycleError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Crm(err) => Some(err),
            _ => None,
        }
    }
}

impl From<CrmError> for LifecycleError {
    fn from(value: CrmError) -> Self {
        Self::Crm(value)
    }
}

impl From<ValidationError> for LifecycleError {
    fn from(value: ValidationError) -> Self {
        Self::Crm(CrmError::Validation(value))
    }
}

/// Open composing session.
#[derive(Debug)]
struct Composition {
    mode: ComposeMode,
    draft: RecordDraft,
    /// Saved record being edited; `None` for new records.
    seed: Option<Record>,
    /// Attachments minted during this composition and not yet saved.
    acquired: Vec<AttachmentId>,
}

#[derive(Debug)]
enum Phase {
    Browsing,
    Viewing(RecordId),
    Composing(Composition),
}

/// Coordinator of create/edit/delete for one signed-in owner.
pub struct RecordLifecycle<R: KeyValueRepository> {
    session: Session,
    store: RecordStore<R>,
    registry: AttachmentRegistry,
    records: Vec<Record>,
    phase: Phase,
}

impl<R: KeyValueRepository> RecordLifecycle<R> {
    /// Starts in `Browsing` with a fresh attachment registry.
    pub fn new(session: Session, store: RecordStore<R>) -> Self {
        Self::with_registry(session, store, Default::default())
    }

    /// Starts in `Browsing`, reusing handles that are still live in this
    /// process (e.g. after signing out and back in).
    pub fn with_registry(
        session: Session,
        store: RecordStore<R>,
        registry: AttachmentRegistry,
    ) -> Self {
        let mut lifecycle = Self {
            session,
            store,
            registry,
            records: Vec::new(),
            phase: Phase::Browsing,
        };
        lifecycle.reload();
        lifecycle
    }

    /// Ends the lifecycle, releasing any open composition, and hands the
    /// registry back.
    pub fn into_registry(mut self) -> AttachmentRegistry {
        if let Phase::Composing(composition) = &self.phase {
            for id in &composition.acquired {
                self.registry.detach(*id);
            }
        }
        self.registry
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn state(&self) -> LifecycleState {
        match &self.phase {
            Phase::Browsing => LifecycleState::Browsing,
            Phase::Viewing(id) => LifecycleState::Viewing(*id),
            Phase::Composing(composition) => LifecycleState::Composing(composition.mode),
        }
    }

    /// Loaded records, newest first.
    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn registry(&self) -> &AttachmentRegistry {
        &self.registry
    }

    /// Filtered view of the working set.
    pub fn browse(&self, query: &RecordQuery) -> Vec<Record> {
        filter::query(&self.records, query)
    }

    /// Export rows for the same view `browse` would show.
    pub fn export_rows(&self, query: &RecordQuery) -> Vec<ExportRow> {
        export_rows(&self.browse(query))
    }

    /// The record shown while `Viewing`.
    pub fn current_record(&self) -> Option<&Record> {
        match self.phase {
            Phase::Viewing(id) => self.find(id),
            _ => None,
        }
    }

    /// Reads the file data of one attachment of the working set.
    pub fn open_attachment(&self, attachment: &Attachment) -> LifecycleResult<Arc<[u8]>> {
        Ok(self.registry.open(attachment)?)
    }

    /// `Browsing -> Viewing`.
    pub fn open(&mut self, id: RecordId) -> LifecycleResult<()> {
        self.expect_browsing("open a record")?;
        if self.find(id).is_none() {
            return Err(LifecycleError::RecordNotFound(id));
        }
        self.phase = Phase::Viewing(id);
        Ok(())
    }

    /// `Viewing -> Browsing`.
    pub fn back(&mut self) -> LifecycleResult<()> {
        self.expect_viewing("go back")?;
        self.phase = Phase::Browsing;
        Ok(())
    }

    /// `Browsing -> Composing(new)`.
    pub fn request_create(&mut self) -> LifecycleResult<()> {
        self.expect_browsing("create a record")?;
        self.phase = Phase::Composing(Composition {
            mode: ComposeMode::New,
            draft: RecordDraft::default(),
            seed: None,
            acquired: Vec::new(),
        });
        Ok(())
    }

    /// `Viewing -> Composing(edit)`, seeded with the viewed record.
    pub fn request_edit(&mut self) -> LifecycleResult<()> {
        let id = self.expect_viewing("edit a record")?;
        let seed = self
            .find(id)
            .cloned()
            .ok_or(LifecycleError::RecordNotFound(id))?;
        self.phase = Phase::Composing(Composition {
            mode: ComposeMode::Edit(id),
            draft: RecordDraft::from_record(&seed),
            seed: Some(seed),
            acquired: Vec::new(),
        });
        Ok(())
    }

    pub fn draft(&self) -> Option<&RecordDraft> {
        match &self.phase {
            Phase::Composing(composition) => Some(&composition.draft),
            _ => None,
        }
    }

    pub fn draft_mut(&mut self) -> LifecycleResult<&mut RecordDraft> {
        Ok(&mut self.composition_mut("edit the draft")?.draft)
    }

    /// Registers selected files and prepends them to the draft.
    pub fn attach_files(&mut self, files: Vec<PendingFile>) -> LifecycleResult<Vec<Attachment>> {
        let from = self.state();
        let Phase::Composing(composition) = &mut self.phase else {
            return Err(LifecycleError::InvalidTransition {
                from,
                action: "attach files",
            });
        };

        let attached = self.registry.attach(files);
        composition
            .acquired
            .extend(attached.iter().map(|attachment| attachment.id));
        let mut attachments = attached.clone();
        attachments.append(&mut composition.draft.attachments);
        composition.draft.attachments = attachments;
        Ok(attached)
    }

    /// Removes an attachment from the draft.
    ///
    /// Handles acquired in this composition are released right away; those
    /// of the saved record stay live until the edit is saved.
    pub fn remove_attachment(&mut self, id: AttachmentId) -> LifecycleResult<bool> {
        let from = self.state();
        let Phase::Composing(composition) = &mut self.phase else {
            return Err(LifecycleError::InvalidTransition {
                from,
                action: "remove an attachment",
            });
        };

        let before = composition.draft.attachments.len();
        composition
            .draft
            .attachments
            .retain(|attachment| attachment.id != id);
        let removed = composition.draft.attachments.len() != before;

        if let Some(pos) = composition.acquired.iter().position(|acquired| *acquired == id) {
            composition.acquired.swap_remove(pos);
            self.registry.detach(id);
        }
        Ok(removed)
    }

    /// `Composing(*) -> Viewing`: validates, persists and reconciles handles.
    ///
    /// On any error the composition stays open and nothing is released.
    pub fn save(&mut self) -> LifecycleResult<Record> {
        let composition = self.composition_mut("save")?;
        let mode = composition.mode;
        let (id, created_at, previous) = match &composition.seed {
            Some(seed) => (seed.id, seed.created_at, seed.attachments.clone()),
            None => (Uuid::new_v4(), Utc::now(), Vec::new()),
        };
        let record = composition.draft.clone().into_record(id, created_at)?;

        let saved = self.store.upsert(self.session.owner(), record)?;
        self.phase = Phase::Viewing(saved.id);
        let released = self
            .registry
            .reconcile_on_edit(&previous, &saved.attachments);

        self.reload();
        info!(
            "event=record_save module={MODULE} status=ok record_id={} mode={} released={released}",
            saved.id,
            match mode {
                ComposeMode::New => "new",
                ComposeMode::Edit(_) => "edit",
            }
        );
        Ok(saved)
    }

    /// `Composing(*) -> prior state` without persisting anything.
    ///
    /// Returns the number of handles released.
    pub fn cancel(&mut self) -> LifecycleResult<usize> {
        let composition = self.composition_mut("cancel")?;
        let mode = composition.mode;
        let acquired = std::mem::take(&mut composition.acquired);

        let released = acquired
            .iter()
            .filter(|id| self.registry.detach(**id))
            .count();
        self.phase = match mode {
            ComposeMode::New => Phase::Browsing,
            ComposeMode::Edit(id) => Phase::Viewing(id),
        };
        info!("event=record_cancel module={MODULE} status=ok released={released}");
        Ok(released)
    }

    /// `Viewing -> Browsing`: releases the record's handles, then removes it.
    ///
    /// # Errors
    /// - `InvalidTransition` outside `Viewing`.
    /// - `Crm(StorageUnavailable)` when the removal cannot be written. The
    ///   handles are already released at that point: the record stays
    ///   stored and the state stays `Viewing`, but its files can no longer
    ///   be opened in this process.
    pub fn delete(&mut self) -> LifecycleResult<()> {
        let id = self.expect_viewing("delete a record")?;
        let record = self
            .find(id)
            .cloned()
            .ok_or(LifecycleError::RecordNotFound(id))?;

        let released = self.registry.reconcile_on_delete(&record);
        if let Err(err) = self.store.remove(self.session.owner(), id) {
            warn!("event=record_delete module={MODULE} status=error record_id={id} released={released} error={err}");
            self.reload();
            return Err(err.into());
        }

        self.phase = Phase::Browsing;
        self.reload();
        info!("event=record_delete module={MODULE} status=ok record_id={id} released={released}");
        Ok(())
    }

    fn reload(&mut self) {
        let mut records = self.store.load(self.session.owner());
        for record in &mut records {
            self.registry.hydrate(&mut record.attachments);
        }
        self.records = records;
    }

    fn find(&self, id: RecordId) -> Option<&Record> {
        self.records.iter().find(|record| record.id == id)
    }

    fn expect_browsing(&self, action: &'static str) -> LifecycleResult<()> {
        match self.phase {
            Phase::Browsing => Ok(()),
            _ => Err(LifecycleError::InvalidTransition {
                from: self.state(),
                action,
            }),
        }
    }

    fn expect_viewing(&self, action: &'static str) -> LifecycleResult<RecordId> {
        match self.phase {
            Phase::Viewing(id) => Ok(id),
            _ => Err(LifecycleError::InvalidTransition {
                from: self.state(),
                action,
            }),
        }
    }

    fn composition_mut(&mut self, action: &'static str) -> LifecycleResult<&mut Composition> {
        let from = self.state();
        match &mut self.phase {
            Phase::Composing(composition) => Ok(composition),
            _ => Err(LifecycleError::InvalidTransition { from, action }),
        }
    }
}
