//! Lookup structures built once per run from the cleaned update table.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use budget_model::{serial_to_datetime, CellValue};
use chrono::{NaiveDate, NaiveDateTime};
use serde::Serialize;

use crate::config::{AmountPolicy, KeyStrategy, ReconcileOptions};
use crate::error::{ReconcileError, Result};
use crate::month::Month;
use crate::note_key::{normalize_key, NoteKey};
use crate::update_table::{PreprocessStats, UpdateRow, UpdateTable};

/// Latest committed value per note; later update rows overwrite earlier ones.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CommittedValueIndex {
    values: BTreeMap<NoteKey, CellValue>,
}

impl CommittedValueIndex {
    pub fn get(&self, key: &NoteKey) -> Option<&CellValue> {
        self.values.get(key)
    }

    pub fn insert(&mut self, key: NoteKey, value: CellValue) {
        self.values.insert(key, value);
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// A payment amount with its source digits preserved (decimal comma normalized to a period).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Amount {
    text: String,
    value: f64,
}

impl Amount {
    /// Parse a payment amount cell. Text such as `"1.234,56"` or `"10,50"` is accepted.
    pub fn parse(cell: &CellValue) -> Option<Amount> {
        match cell {
            CellValue::Number(n) if n.is_finite() => Some(Amount {
                text: n.to_string(),
                value: *n,
            }),
            CellValue::String(s) => {
                let trimmed = s.trim();
                let text = if trimmed.contains('.') && trimmed.contains(',') {
                    trimmed.replace('.', "").replace(',', ".")
                } else {
                    trimmed.replace(',', ".")
                };
                let value = text.parse::<f64>().ok().filter(|v| v.is_finite())?;
                Some(Amount { text, value })
            }
            _ => None,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn value(&self) -> f64 {
        self.value
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

/// Payment amounts per note and month, in update-row order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PaymentIndex {
    by_key: BTreeMap<NoteKey, BTreeMap<Month, Vec<Amount>>>,
}

impl PaymentIndex {
    /// Register `key` with all twelve months empty, if not yet present.
    pub fn ensure_key(&mut self, key: &NoteKey) -> &mut BTreeMap<Month, Vec<Amount>> {
        self.by_key
            .entry(key.clone())
            .or_insert_with(|| Month::ALL.iter().map(|m| (*m, Vec::new())).collect())
    }

    pub fn push(&mut self, key: &NoteKey, month: Month, amount: Amount) {
        self.ensure_key(key).entry(month).or_default().push(amount);
    }

    pub fn contains_key(&self, key: &NoteKey) -> bool {
        self.by_key.contains_key(key)
    }

    /// Amounts for `(key, month)`; empty when none were recorded.
    pub fn amounts(&self, key: &NoteKey, month: Month) -> &[Amount] {
        self.by_key
            .get(key)
            .and_then(|months| months.get(&month))
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.by_key.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_key.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    EmptyKey,
    EmptyValue,
    MalformedDate,
    InvalidAmount,
}

/// Result of feeding one update row to an index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowOutcome {
    Contributes,
    Skipped(SkipReason),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct IndexStats {
    pub rows_read: usize,
    pub subtotal_rows: usize,
    pub blank_rows: usize,
    pub empty_keys: usize,
    pub empty_committed_values: usize,
    pub malformed_dates: usize,
    pub invalid_amounts: usize,
    pub committed_keys: usize,
    pub payment_keys: usize,
    pub payment_amounts: usize,
}

impl IndexStats {
    fn from_preprocess(pre: PreprocessStats) -> Self {
        Self {
            rows_read: pre.rows_read,
            subtotal_rows: pre.subtotal_rows,
            blank_rows: pre.blank_rows,
            ..Self::default()
        }
    }
}

/// Distinct full identifiers that reduce to the same key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KeyCollision {
    pub key: NoteKey,
    pub identifiers: Vec<String>,
}

/// Column positions of the update table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpdateColumns {
    pub identifier: usize,
    pub committed: usize,
    pub date: usize,
    pub amount: usize,
}

impl UpdateColumns {
    pub fn resolve(table: &UpdateTable, options: &ReconcileOptions) -> Result<Self> {
        let layout = &options.update;
        Ok(Self {
            identifier: table.column(&layout.identifier_column)?,
            committed: table.column(&layout.committed_column)?,
            date: table.column(&layout.date_column)?,
            amount: table.column(&layout.amount_column)?,
        })
    }
}

/// Both indexes plus the diagnostics gathered while building them.
#[derive(Debug, Clone, Default)]
pub struct UpdateIndex {
    pub committed: CommittedValueIndex,
    pub payments: PaymentIndex,
    pub stats: IndexStats,
    pub collisions: Vec<KeyCollision>,
}

impl UpdateIndex {
    /// Clean `table` in place and build both indexes from the remaining rows.
    pub fn build(table: &mut UpdateTable, options: &ReconcileOptions) -> Result<Self> {
        let columns = UpdateColumns::resolve(table, options)?;
        let pre = table.preprocess(&options.update.subtotal_marker);
        let mut stats = IndexStats::from_preprocess(pre);

        let mut committed = CommittedValueIndex::default();
        let mut payments = PaymentIndex::default();
        let mut identifiers: BTreeMap<NoteKey, BTreeSet<String>> = BTreeMap::new();

        for row in table.rows() {
            let raw_id = row.get(columns.identifier);
            let key = normalize_key(raw_id, &options.key_strategy);
            if key.is_empty() {
                stats.empty_keys += 1;
                continue;
            }
            identifiers
                .entry(key.clone())
                .or_default()
                .insert(raw_id.display_text().trim().to_string());

            if let RowOutcome::Skipped(SkipReason::EmptyValue) =
                index_committed_value(&mut committed, &key, row, columns.committed)
            {
                stats.empty_committed_values += 1;
            }

            match index_payment(&mut payments, &key, row, &columns, options.amount_policy)? {
                RowOutcome::Contributes => stats.payment_amounts += 1,
                RowOutcome::Skipped(SkipReason::MalformedDate) => stats.malformed_dates += 1,
                RowOutcome::Skipped(SkipReason::InvalidAmount) => stats.invalid_amounts += 1,
                RowOutcome::Skipped(_) => {}
            }
        }

        stats.committed_keys = committed.len();
        stats.payment_keys = payments.len();
        let collisions = find_collisions(identifiers, &options.key_strategy);

        log::info!(
            "indexed {} committed values and {} payment amounts for {} notes ({} subtotal rows, {} malformed dates, {} invalid amounts)",
            stats.committed_keys,
            stats.payment_amounts,
            stats.payment_keys,
            stats.subtotal_rows,
            stats.malformed_dates,
            stats.invalid_amounts,
        );

        Ok(Self {
            committed,
            payments,
            stats,
            collisions,
        })
    }
}

/// Map `key` to the row's committed value (last write wins). Empty values are not indexed.
pub fn index_committed_value(
    index: &mut CommittedValueIndex,
    key: &NoteKey,
    row: &UpdateRow,
    col: usize,
) -> RowOutcome {
    let value = row.get(col);
    if value.is_empty() {
        return RowOutcome::Skipped(SkipReason::EmptyValue);
    }
    index.insert(key.clone(), value.clone());
    RowOutcome::Contributes
}

/// Append the row's payment amount to `(key, month of the payment date)`.
///
/// The key is registered even when the row is skipped. Unparseable dates are skipped silently;
/// unparseable amounts follow `policy`.
pub fn index_payment(
    index: &mut PaymentIndex,
    key: &NoteKey,
    row: &UpdateRow,
    columns: &UpdateColumns,
    policy: AmountPolicy,
) -> Result<RowOutcome> {
    index.ensure_key(key);

    let Some(month) = parse_payment_date(row.get(columns.date)).and_then(|d| Month::from_date(&d))
    else {
        log::debug!("row {}: unparseable payment date, skipped", row.sheet_row);
        return Ok(RowOutcome::Skipped(SkipReason::MalformedDate));
    };

    let raw_amount = row.get(columns.amount);
    let Some(amount) = Amount::parse(raw_amount) else {
        return match policy {
            AmountPolicy::Abort => Err(ReconcileError::TypeMismatch {
                key: key.clone(),
                row: row.sheet_row,
                value: raw_amount.display_text(),
            }),
            AmountPolicy::SkipWithWarning => {
                log::warn!(
                    "note {key}, update row {}: payment amount {:?} is not a number, skipped",
                    row.sheet_row,
                    raw_amount.display_text()
                );
                Ok(RowOutcome::Skipped(SkipReason::InvalidAmount))
            }
        };
    };

    index.push(key, month, amount);
    Ok(RowOutcome::Contributes)
}

/// Day-first date parsing for payment dates.
///
/// Accepts date cells, serial numbers, ISO strings and `dd/mm/yyyy` style strings (with `/`, `-`
/// or `.` separators, two- or four-digit years and an optional time).
pub fn parse_payment_date(cell: &CellValue) -> Option<NaiveDate> {
    match cell {
        CellValue::DateTime(dt) => Some(dt.date()),
        CellValue::Number(n) => serial_to_datetime(*n).map(|dt| dt.date()),
        CellValue::String(s) => parse_date_text(s.trim()),
        _ => None,
    }
}

fn parse_date_text(text: &str) -> Option<NaiveDate> {
    if text.is_empty() {
        return None;
    }
    for fmt in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M:%S%.f"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(text, fmt) {
            return Some(dt.date());
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(text, "%Y-%m-%d") {
        return Some(date);
    }

    let date_part = text.split_whitespace().next()?;
    let sep = ['/', '-', '.'].into_iter().find(|c| date_part.contains(*c))?;
    let parts: Vec<&str> = date_part.split(sep).collect();
    let [day, month, year] = parts.as_slice() else {
        return None;
    };
    let year: i32 = match year.len() {
        // Two-digit years pivot at 69, as strptime's `%y` does.
        2 => match year.parse::<i32>().ok()? {
            yy @ 0..=68 => 2000 + yy,
            yy => 1900 + yy,
        },
        4 => year.parse().ok()?,
        _ => return None,
    };

    // Written months: `15-jan-2025`, `15/Fev/2025`, `jan-15-2025`.
    if let Some(named) = Month::from_name(month) {
        return NaiveDate::from_ymd_opt(year, named.number(), day.parse().ok()?);
    }
    if let Some(named) = Month::from_name(day) {
        return NaiveDate::from_ymd_opt(year, named.number(), month.parse().ok()?);
    }

    let (day, month): (u32, u32) = (day.parse().ok()?, month.parse().ok()?);
    // Day first; a middle field above 12 can only be a day (`01/15/2025`).
    NaiveDate::from_ymd_opt(year, month, day).or_else(|| {
        if month > 12 {
            NaiveDate::from_ymd_opt(year, day, month)
        } else {
            None
        }
    })
}

fn find_collisions(
    identifiers: BTreeMap<NoteKey, BTreeSet<String>>,
    strategy: &KeyStrategy,
) -> Vec<KeyCollision> {
    if matches!(strategy, KeyStrategy::FullIdentifier) {
        return Vec::new();
    }
    identifiers
        .into_iter()
        .filter(|(_, ids)| ids.len() > 1)
        .map(|(key, ids)| {
            let identifiers: Vec<String> = ids.into_iter().collect();
            log::warn!(
                "key {key} is shared by distinct notes {}; their rows are merged",
                identifiers.join(", ")
            );
            KeyCollision { key, identifiers }
        })
        .collect()
}
