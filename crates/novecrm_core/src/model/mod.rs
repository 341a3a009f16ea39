//! Canonical CRM domain model.
//!
//! # Responsibility
//! - Define the single schema for users, sessions, records and attachments.
//! - Own field-level validation and normalization rules.
//!
//! # Invariants
//! - Persisted field names follow the camelCase layout of the device store.
//! - `observacoes` never exceeds [`record::OBSERVACOES_MAX_CHARS`] once
//!   normalized.
//! - Transient attachment handles are never serialized.

pub mod attachment;
pub mod record;
pub mod user;
pub mod validation;
