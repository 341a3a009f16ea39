//! In-memory record filtering.
//!
//! # Invariants
//! - All provided filters combine with logical AND; absent filters pass.
//! - Text matching is a case-insensitive substring test over `cliente`,
//!   `produto`, `telefone` and `observacoes`.
//! - Output is always sorted `created_at DESC, id ASC`, whatever the input
//!   order.

use crate::model::record::{sort_newest_first, Channel, Record, Status};
use crate::model::validation::{ValidationError, ValidationResult};

/// Search box and select filters of the record list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordQuery {
    pub text: Option<String>,
    pub status: Option<Status>,
    pub channel: Option<Channel>,
}

impl RecordQuery {
    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    pub fn status(mut self, status: Status) -> Self {
        self.status = Some(status);
        self
    }

    pub fn channel(mut self, channel: Channel) -> Self {
        self.channel = Some(channel);
        self
    }

    /// Builds a query from raw form values, where `""` means "any".
    pub fn from_form(text: &str, status: &str, channel: &str) -> ValidationResult<Self> {
        let status = match status {
            "" => None,
            value => Some(Status::parse(value).ok_or_else(|| ValidationError::UnknownValue {
                field: "status",
                value: value.to_string(),
            })?),
        };
        let channel = match channel {
            "" => None,
            value => Some(Channel::parse(value).ok_or_else(|| ValidationError::UnknownValue {
                field: "canal",
                value: value.to_string(),
            })?),
        };

        Ok(Self {
            text: Some(text.to_string()),
            status,
            channel,
        })
    }

    fn needle(&self) -> Option<String> {
        self.text
            .as_deref()
            .map(str::trim)
            .filter(|text| !text.is_empty())
            .map(str::to_lowercase)
    }
}

/// Returns the records matching `query`, newest first.
pub fn query(records: &[Record], query: &RecordQuery) -> Vec<Record> {
    let needle = query.needle();
    let mut matched: Vec<Record> = records
        .iter()
        .filter(|record| query.status.map_or(true, |status| record.status == status))
        .filter(|record| query.channel.map_or(true, |channel| record.canal == channel))
        .filter(|record| {
            needle
                .as_deref()
                .map_or(true, |needle| text_matches(record, needle))
        })
        .cloned()
        .collect();
    sort_newest_first(&mut matched);
    matched
}

fn text_matches(record: &Record, needle: &str) -> bool {
    [
        record.cliente.as_str(),
        record.produto.as_str(),
        record.telefone.as_str(),
        record.observacoes.as_str(),
    ]
    .iter()
    .any(|field| field.to_lowercase().contains(needle))
}
