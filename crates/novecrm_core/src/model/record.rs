//! CRM record model.
//!
//! # Responsibility
//! - Define the canonical `Record` shape and its pipeline enumerations.
//! - Provide the composing form (`RecordDraft`) with explicit defaults.
//!
//! # Invariants
//! - `id` is stable and never reused for another record.
//! - `created_at` is fixed at first save; edits only move `updated_at`.
//! - `observacoes` holds at most `OBSERVACOES_MAX_CHARS` characters.
//! - `status`/`canal` are drawn from fixed enumerations.

use crate::model::attachment::Attachment;
use crate::model::validation::{
    require_non_blank, truncate_chars, ValidationError, ValidationResult,
};
use chrono::{DateTime, Local, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub type RecordId = Uuid;

/// Upper bound for free-text notes, in Unicode scalar values.
pub const OBSERVACOES_MAX_CHARS: usize = 500;

/// Pipeline stage of a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Status {
    #[default]
    #[serde(rename = "em_negociacao")]
    EmNegociacao,
    #[serde(rename = "resposta_7d")]
    Resposta7d,
    #[serde(rename = "prazo_10d_mais")]
    Prazo10dMais,
    #[serde(rename = "sinalizacao_positiva")]
    SinalizacaoPositiva,
    #[serde(rename = "sinalizacao_negativa")]
    SinalizacaoNegativa,
}

impl Status {
    pub const ALL: [Status; 5] = [
        Status::EmNegociacao,
        Status::Resposta7d,
        Status::Prazo10dMais,
        Status::SinalizacaoPositiva,
        Status::SinalizacaoNegativa,
    ];

    /// Stable wire value used in storage and exports.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::EmNegociacao => "em_negociacao",
            Self::Resposta7d => "resposta_7d",
            Self::Prazo10dMais => "prazo_10d_mais",
            Self::SinalizacaoPositiva => "sinalizacao_positiva",
            Self::SinalizacaoNegativa => "sinalizacao_negativa",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|status| status.as_str() == value)
    }

    /// Display label shown by the presentation layer.
    pub fn label(self) -> &'static str {
        match self {
            Self::EmNegociacao => "Em negociação",
            Self::Resposta7d => "Resposta em até 7 dias",
            Self::Prazo10dMais => "Prazo > 10 dias",
            Self::SinalizacaoPositiva => "Positivo",
            Self::SinalizacaoNegativa => "Negativo",
        }
    }
}

/// Medium used for the first contact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    #[default]
    Visita,
    Ligacao,
    RedesSociais,
    Outros,
}

impl Channel {
    pub const ALL: [Channel; 4] = [
        Channel::Visita,
        Channel::Ligacao,
        Channel::RedesSociais,
        Channel::Outros,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Visita => "visita",
            Self::Ligacao => "ligacao",
            Self::RedesSociais => "redes_sociais",
            Self::Outros => "outros",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|channel| channel.as_str() == value)
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Visita => "Visita",
            Self::Ligacao => "Ligação",
            Self::RedesSociais => "Redes sociais",
            Self::Outros => "Outros",
        }
    }
}

/// One CRM entry for a prospective or existing client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Record {
    pub id: RecordId,
    pub cliente: String,
    #[serde(default)]
    pub produto: String,
    /// Monetary value exactly as typed (locale formatted, not parsed).
    #[serde(default)]
    pub valor: String,
    #[serde(default)]
    pub telefone: String,
    /// Stored as `YYYY-MM-DD`; a full timestamp is read by its date prefix.
    #[serde(deserialize_with = "date_or_timestamp_prefix")]
    pub data_primeiro_contato: NaiveDate,
    #[serde(default)]
    pub canal: Channel,
    #[serde(default)]
    pub status: Status,
    #[serde(default)]
    pub observacoes: String,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Record {
    /// Creates a record with a generated id and default pipeline fields.
    pub fn new(cliente: impl Into<String>) -> Self {
        Self::with_id(Uuid::new_v4(), cliente)
    }

    /// Creates a record with a caller-provided id.
    ///
    /// Used by import paths where identity already exists.
    pub fn with_id(id: RecordId, cliente: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id,
            cliente: cliente.into(),
            produto: String::new(),
            valor: String::new(),
            telefone: String::new(),
            data_primeiro_contato: today(),
            canal: Channel::default(),
            status: Status::default(),
            observacoes: String::new(),
            attachments: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Applies the storage truncation policy.
    ///
    /// Trims free-form single-line fields and cuts `observacoes` to
    /// `OBSERVACOES_MAX_CHARS` characters.
    pub fn normalize(&mut self) {
        self.cliente = self.cliente.trim().to_string();
        self.produto = self.produto.trim().to_string();
        self.valor = self.valor.trim().to_string();
        self.telefone = self.telefone.trim().to_string();
        self.observacoes = truncate_chars(&self.observacoes, OBSERVACOES_MAX_CHARS);
    }

    /// Checks record invariants without modifying anything.
    pub fn validate(&self) -> ValidationResult<()> {
        require_non_blank("cliente", &self.cliente)?;
        check_observacoes(&self.observacoes)
    }

    pub fn attachment_names(&self) -> impl Iterator<Item = &str> {
        self.attachments.iter().map(|attachment| attachment.name.as_str())
    }
}

/// Composing form for a new or edited record.
///
/// Every field has a defined default, so the form can be rendered before the
/// user has typed anything.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordDraft {
    pub cliente: String,
    pub produto: String,
    pub valor: String,
    pub telefone: String,
    pub data_primeiro_contato: NaiveDate,
    pub canal: Channel,
    pub status: Status,
    pub observacoes: String,
    /// Newest attachments first.
    pub attachments: Vec<Attachment>,
}

impl Default for RecordDraft {
    fn default() -> Self {
        Self {
            cliente: String::new(),
            produto: String::new(),
            valor: String::new(),
            telefone: String::new(),
            data_primeiro_contato: today(),
            canal: Channel::default(),
            status: Status::default(),
            observacoes: String::new(),
            attachments: Vec::new(),
        }
    }
}

impl RecordDraft {
    /// Seeds an edit form from a saved record.
    pub fn from_record(record: &Record) -> Self {
        Self {
            cliente: record.cliente.clone(),
            produto: record.produto.clone(),
            valor: record.valor.clone(),
            telefone: record.telefone.clone(),
            data_primeiro_contato: record.data_primeiro_contato,
            canal: record.canal,
            status: record.status,
            observacoes: record.observacoes.clone(),
            attachments: record.attachments.clone(),
        }
    }

    /// Sets notes the way the input widget does: anything past the bound is
    /// dropped while typing.
    pub fn set_observacoes(&mut self, value: &str) {
        self.observacoes = truncate_chars(value, OBSERVACOES_MAX_CHARS);
    }

    /// Builds the record to persist.
    ///
    /// # Errors
    /// - `MissingField("cliente")` when the client name is blank.
    /// - `ObservacoesTooLong` when notes were set past the bound directly.
    pub fn into_record(
        self,
        id: RecordId,
        created_at: DateTime<Utc>,
    ) -> ValidationResult<Record> {
        let cliente = require_non_blank("cliente", &self.cliente)?;
        check_observacoes(&self.observacoes)?;

        Ok(Record {
            id,
            cliente,
            produto: self.produto.trim().to_string(),
            valor: self.valor.trim().to_string(),
            telefone: self.telefone.trim().to_string(),
            data_primeiro_contato: self.data_primeiro_contato,
            canal: self.canal,
            status: self.status,
            observacoes: self.observacoes,
            attachments: self.attachments,
            created_at,
            updated_at: Utc::now(),
        })
    }
}

/// Orders records newest `created_at` first, ties by ascending id.
pub fn sort_newest_first(records: &mut [Record]) {
    records.sort_by(|left, right| {
        right
            .created_at
            .cmp(&left.created_at)
            .then_with(|| left.id.cmp(&right.id))
    });
}

fn check_observacoes(value: &str) -> ValidationResult<()> {
    let chars = value.chars().count();
    if chars > OBSERVACOES_MAX_CHARS {
        return Err(ValidationError::ObservacoesTooLong {
            chars,
            max: OBSERVACOES_MAX_CHARS,
        });
    }
    Ok(())
}

fn date_or_timestamp_prefix<'de, D>(deserializer: D) -> Result<NaiveDate, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    let date = raw.get(..10).unwrap_or(&raw);
    NaiveDate::parse_from_str(date, "%Y-%m-%d").map_err(serde::de::Error::custom)
}

fn today() -> NaiveDate {
    Local::now().date_naive()
}
