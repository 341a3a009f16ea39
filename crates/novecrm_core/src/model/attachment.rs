//! Attachment metadata and transient handle tokens.
//!
//! # Invariants
//! - Metadata (`name`, `mime_type`, `size_bytes`) is persisted with the record.
//! - `transient_handle` is skipped by serde: it is only meaningful inside the
//!   process that minted it.

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use uuid::Uuid;

pub type AttachmentId = Uuid;

/// Opaque token for file data held by the attachment registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TransientHandle(Uuid);

impl TransientHandle {
    pub(crate) fn mint() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Display for TransientHandle {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "handle:{}", self.0)
    }
}

/// File attached to a record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub id: AttachmentId,
    pub name: String,
    /// Serialized as `type` to keep the stored layout unchanged.
    #[serde(rename = "type", default)]
    pub mime_type: String,
    #[serde(rename = "size", default)]
    pub size_bytes: u64,
    #[serde(skip)]
    pub transient_handle: Option<TransientHandle>,
}

impl Attachment {
    /// Whether this copy still carries a handle minted in this process.
    ///
    /// The registry decides whether that handle is still live.
    pub fn has_handle(&self) -> bool {
        self.transient_handle.is_some()
    }
}

/// A file selected by the user, already fully read into memory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingFile {
    pub name: String,
    pub mime_type: String,
    pub data: Vec<u8>,
}

impl PendingFile {
    pub fn new(name: impl Into<String>, mime_type: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            mime_type: mime_type.into(),
            data,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{Attachment, TransientHandle};
    use uuid::Uuid;

    #[test]
    fn handle_is_not_persisted() {
        let attachment = Attachment {
            id: Uuid::new_v4(),
            name: "proposta.pdf".to_string(),
            mime_type: "application/pdf".to_string(),
            size_bytes: 2048,
            transient_handle: Some(TransientHandle::mint()),
        };

        let json = serde_json::to_value(&attachment).unwrap();
        assert_eq!(json["type"], "application/pdf");
        assert_eq!(json["size"], 2048);
        assert!(json.get("transient_handle").is_none());

        let restored: Attachment = serde_json::from_value(json).unwrap();
        assert_eq!(restored.name, "proposta.pdf");
        assert!(!restored.has_handle());
    }
}
