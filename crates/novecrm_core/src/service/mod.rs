//! Use-case services.
//!
//! # Responsibility
//! - Coordinate stores and the attachment registry into user-level actions.
//! - Keep presentation layers away from storage and handle bookkeeping.

pub mod export;
pub mod record_lifecycle;
