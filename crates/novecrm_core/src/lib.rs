//! Core data layer for Nove CRM.
//!
//! Everything stays on the user's device: accounts, the opt-in session, the
//! per-user record collections and the process-lifetime attachment handles.
//! Presentation, CSV text and messaging links are built by callers on top of
//! the operations exported here.

pub mod attachment;
pub mod config;
pub mod db;
pub mod error;
pub mod logging;
pub mod model;
pub mod repo;
pub mod search;
pub mod service;

pub use attachment::registry::AttachmentRegistry;
pub use config::{CoreConfig, StorageKeys};
pub use error::{CrmError, CrmResult};
pub use logging::{default_log_level, init_logging, logging_status};
pub use model::attachment::{Attachment, AttachmentId, PendingFile, TransientHandle};
pub use model::record::{
    Channel, Record, RecordDraft, RecordId, Status, OBSERVACOES_MAX_CHARS,
};
pub use model::user::{NewUser, Session, User, UserId};
pub use model::validation::ValidationError;
pub use repo::account_repo::AccountStore;
pub use repo::kv_repo::{
    DegradedReason, KeyValueRepository, LoadOrigin, Snapshot, SqliteKeyValueRepository,
    StorageError,
};
pub use repo::record_repo::RecordStore;
pub use search::filter::{query, RecordQuery};
pub use service::export::{export_rows, ExportRow, EXPORT_HEADERS};
pub use service::record_lifecycle::{
    ComposeMode, LifecycleError, LifecycleResult, LifecycleState, RecordLifecycle,
};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
