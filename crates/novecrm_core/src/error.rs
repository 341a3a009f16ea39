//! Crate-level error taxonomy shared by every CRM component.

use crate::db::DbError;
use crate::model::attachment::AttachmentId;
use crate::model::validation::ValidationError;
use crate::repo::kv_repo::StorageError;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type CrmResult<T> = Result<T, CrmError>;

#[derive(Debug)]
pub enum CrmError {
    /// Input rejected before any mutation.
    Validation(ValidationError),
    /// Signup with a username that is already registered.
    DuplicateUsername(String),
    /// No stored user matches the username/password pair.
    InvalidCredentials,
    /// Attachment data is not reachable in this process anymore.
    HandleUnavailable(AttachmentId),
    /// The persistent medium failed to read or write.
    StorageUnavailable(StorageError),
}

impl Display for CrmError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(err) => write!(f, "{err}"),
            Self::DuplicateUsername(username) => {
                write!(f, "username `{username}` is already registered")
            }
            Self::InvalidCredentials => write!(f, "invalid username or password"),
            Self::HandleUnavailable(id) => {
                write!(f, "attachment {id} is no longer available in this session")
            }
            Self::StorageUnavailable(err) => write!(f, "storage unavailable: {err}"),
        }
    }
}

impl Error for CrmError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::StorageUnavailable(err) => Some(err),
            Self::DuplicateUsername(_) | Self::InvalidCredentials | Self::HandleUnavailable(_) => {
                None
            }
        }
    }
}

impl From<ValidationError> for CrmError {
    fn from(value: ValidationError) -> Self {
        Self::Validation(value)
    }
}

impl From<StorageError> for CrmError {
    fn from(value: StorageError) -> Self {
        Self::StorageUnavailable(value)
    }
}

impl From<DbError> for CrmError {
    fn from(value: DbError) -> Self {
        Self::StorageUnavailable(StorageError::Db(value))
    }
}
