//! Persistence layer over the device-local key/value medium.
//!
//! # Responsibility
//! - Define the key/value contract every store writes through.
//! - Own the users/session slots and the per-owner record collections.
//!
//! # Invariants
//! - Each collection is replaced as a whole in one write; there are no
//!   partial updates.
//! - A failed write is always reported to the caller.
//! - Read failures degrade to an empty collection, tagged so diagnostics can
//!   tell them apart from a collection that was never written.

pub mod account_repo;
pub mod kv_repo;
pub mod record_repo;
