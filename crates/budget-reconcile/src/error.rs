use budget_xlsx::XlsxError;
use thiserror::Error;

use crate::note_key::NoteKey;

#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("unable to read base workbook: {0}")]
    UnreadableBase(#[source] XlsxError),
    #[error("unable to read update workbook: {0}")]
    UnreadableUpdate(String),
    #[error("update workbook is missing column {column:?} (header row {header_row})")]
    MissingColumn { column: String, header_row: u32 },
    #[error("base workbook has no sheet named {0:?}")]
    MissingSheet(String),
    #[error("non-numeric payment amount {value:?} for note {key} (update row {row})")]
    TypeMismatch { key: NoteKey, row: u32, value: String },
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("unable to serialize output workbook: {0}")]
    Serialize(#[source] XlsxError),
    #[error(transparent)]
    Xlsx(#[from] XlsxError),
}

pub type Result<T, E = ReconcileError> = std::result::Result<T, E>;
