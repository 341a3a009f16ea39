//! Tabular export of records for reporting collaborators.
//!
//! Rows are plain strings in a fixed column order. Quoting, escaping and
//! file emission belong to the caller.

use crate::model::record::Record;
use chrono::SecondsFormat;

pub const EXPORT_COLUMNS: usize = 12;

/// Header row, in column order.
pub const EXPORT_HEADERS: [&str; EXPORT_COLUMNS] = [
    "id",
    "cliente",
    "produto",
    "valor",
    "telefone",
    "dataPrimeiroContato",
    "canal",
    "status",
    "observacoes",
    "anexos",
    "createdAt",
    "updatedAt",
];

/// Separator between attachment names in the `anexos` column.
pub const ATTACHMENT_NAME_SEPARATOR: &str = "; ";

pub type ExportRow = [String; EXPORT_COLUMNS];

/// Converts records into export rows, preserving input order.
pub fn export_rows(records: &[Record]) -> Vec<ExportRow> {
    records.iter().map(export_row).collect()
}

fn export_row(record: &Record) -> ExportRow {
    [
        record.id.to_string(),
        record.cliente.clone(),
        record.produto.clone(),
        record.valor.clone(),
        record.telefone.clone(),
        record.data_primeiro_contato.format("%Y-%m-%d").to_string(),
        record.canal.as_str().to_string(),
        record.status.as_str().to_string(),
        record.observacoes.clone(),
        record
            .attachment_names()
            .collect::<Vec<_>>()
            .join(ATTACHMENT_NAME_SEPARATOR),
        record
            .created_at
            .to_rfc3339_opts(SecondsFormat::Millis, true),
        record
            .updated_at
            .to_rfc3339_opts(SecondsFormat::Millis, true),
    ]
}
