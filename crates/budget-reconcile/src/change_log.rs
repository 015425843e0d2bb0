//! Append-only record of every cell the run changes.

use std::fmt;

use budget_model::{CellRef, CellValue};
use chrono::NaiveDateTime;
use serde::Serialize;

use crate::note_key::NoteKey;

/// Header row of the log sheet.
pub const LOG_HEADER: [&str; 6] = [
    "Tipo",
    "Nota de Empenho",
    "Campo",
    "Valor Antigo",
    "Valor Novo",
    "Data da Alteração",
];

pub const LOG_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ChangeKind {
    Empenho,
    Pagamento,
}

impl ChangeKind {
    pub fn label(self) -> &'static str {
        match self {
            ChangeKind::Empenho => "Empenho",
            ChangeKind::Pagamento => "Pagamento",
        }
    }
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LogEntry {
    pub kind: ChangeKind,
    pub key: NoteKey,
    pub field: String,
    /// Base-sheet cell that was overwritten.
    pub cell: CellRef,
    pub old_value: CellValue,
    pub new_value: CellValue,
    pub timestamp: NaiveDateTime,
}

impl LogEntry {
    /// The six log-sheet columns for this entry.
    pub fn to_row(&self) -> [CellValue; 6] {
        [
            CellValue::from(self.kind.label()),
            CellValue::from(self.key.as_str()),
            CellValue::from(self.field.as_str()),
            self.old_value.clone(),
            self.new_value.clone(),
            CellValue::String(self.timestamp.format(LOG_TIMESTAMP_FORMAT).to_string()),
        ]
    }
}

/// Sink shared by the reconcilers of one run. All entries carry the run's timestamp.
#[derive(Debug, Clone)]
pub struct ChangeLog {
    timestamp: NaiveDateTime,
    entries: Vec<LogEntry>,
}

impl ChangeLog {
    pub fn new(timestamp: NaiveDateTime) -> Self {
        Self {
            timestamp,
            entries: Vec::new(),
        }
    }

    pub fn record(
        &mut self,
        kind: ChangeKind,
        key: &NoteKey,
        field: impl Into<String>,
        cell: CellRef,
        old_value: CellValue,
        new_value: CellValue,
    ) {
        let entry = LogEntry {
            kind,
            key: key.clone(),
            field: field.into(),
            cell,
            old_value,
            new_value,
            timestamp: self.timestamp,
        };
        log::debug!(
            "{} {} {} at {}: {:?} -> {:?}",
            entry.kind,
            entry.key,
            entry.field,
            entry.cell,
            entry.old_value.display_text(),
            entry.new_value.display_text()
        );
        self.entries.push(entry);
    }

    pub fn entries(&self) -> &[LogEntry] {
        &self.entries
    }

    pub fn count(&self, kind: ChangeKind) -> usize {
        self.entries.iter().filter(|e| e.kind == kind).count()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn into_entries(self) -> Vec<LogEntry> {
        self.entries
    }
}
