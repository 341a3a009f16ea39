use std::error::Error;
use std::fmt::{Display, Formatter};

pub type ValidationResult<T> = Result<T, ValidationError>;

/// Input rejected before any mutation reaches storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// A required field is empty or whitespace-only.
    MissingField(&'static str),
    /// `observacoes` exceeds the character bound.
    ObservacoesTooLong { chars: usize, max: usize },
    /// A value outside a fixed enumeration.
    UnknownValue { field: &'static str, value: String },
}

impl Display for ValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingField(field) => write!(f, "required field `{field}` is empty"),
            Self::ObservacoesTooLong { chars, max } => write!(
                f,
                "observacoes must have at most {max} characters, got {chars}"
            ),
            Self::UnknownValue { field, value } => {
                write!(f, "unknown value `{value}` for `{field}`")
            }
        }
    }
}

impl Error for ValidationError {}

/// Returns the trimmed value, or `MissingField` when nothing is left.
pub(crate) fn require_non_blank(field: &'static str, value: &str) -> ValidationResult<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::MissingField(field));
    }
    Ok(trimmed.to_string())
}

/// Keeps at most `max_chars` Unicode scalar values.
pub(crate) fn truncate_chars(value: &str, max_chars: usize) -> String {
    match value.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => value[..byte_idx].to_string(),
        None => value.to_string(),
    }
}
