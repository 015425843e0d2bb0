//! Budget workbook reconciliation.
//!
//! A base budget workbook is brought in line with an update workbook exported from the
//! accounting system:
//!
//! - the update table is cleaned ([`UpdateTable::preprocess`]) and indexed by note key
//!   ([`UpdateIndex`]);
//! - committed values that differ are overwritten ([`reconcile_committed_values`]);
//! - each month's payments become a live sum formula, with a surcharge term for rows whose
//!   status allows one ([`reconcile_payments`]);
//! - every change is appended to the log sheet and A1 is stamped with the run time
//!   ([`WorkbookAssembler`]).
//!
//! The base workbook is patched in place at the package level, so formatting, other sheets and
//! untouched parts survive unchanged.

mod base_sheet;
pub mod cache;
mod change_log;
pub mod cli;
mod committed;
mod compare;
pub mod config;
mod error;
mod month;
mod note_key;
pub mod output;
mod payments;
mod update_index;
mod update_table;
mod workbook;

pub use base_sheet::BaseSheet;
pub use cache::{cache_key, CacheKey, ReconcileCache};
pub use change_log::{ChangeKind, ChangeLog, LogEntry, LOG_HEADER, LOG_TIMESTAMP_FORMAT};
pub use committed::{reconcile_committed_values, COMMITTED_FIELD};
pub use compare::{ChangeDetector, NumericTolerant, Stringified};
pub use config::{
    AmountPolicy, BaseLayout, ComparisonPolicy, KeyStrategy, ReconcileOptions, UpdateLayout,
    DEFAULT_LOG_SHEET,
};
pub use error::{ReconcileError, Result};
pub use month::Month;
pub use note_key::{normalize_key, normalize_key_text, NoteKey};
pub use output::write_output_atomically;
pub use payments::{build_payment_formula, is_accepted_status, reconcile_payments, sum_expression};
pub use update_index::{
    index_committed_value, index_payment, parse_payment_date, Amount, CommittedValueIndex,
    IndexStats, KeyCollision, PaymentIndex, RowOutcome, SkipReason, UpdateColumns, UpdateIndex,
};
pub use update_table::{PreprocessStats, UpdateRow, UpdateTable};
pub use workbook::{
    output_file_name, stamp_text, ReconcileOutput, ReconcileReport, WorkbookAssembler,
    STAMP_FORMAT,
};
