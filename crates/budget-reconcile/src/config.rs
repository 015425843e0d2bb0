//! Run options.
//!
//! Every field has a default matching the layout of the budget workbooks this tool was written
//! for, so an empty JSON object (or no config file at all) is a valid configuration.

use std::path::Path;

use budget_model::CellRef;
use serde::{Deserialize, Serialize};

use crate::compare::{ChangeDetector, NumericTolerant, Stringified};
use crate::error::{ReconcileError, Result};

pub const DEFAULT_LOG_SHEET: &str = "Log de Alterações";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ReconcileOptions {
    pub key_strategy: KeyStrategy,
    pub comparison: ComparisonPolicy,
    pub amount_policy: AmountPolicy,
    /// Sheet to reconcile. Defaults to the workbook's active tab.
    pub primary_sheet: Option<String>,
    pub log_sheet: String,
    pub base: BaseLayout,
    pub update: UpdateLayout,
}

impl Default for ReconcileOptions {
    fn default() -> Self {
        Self {
            key_strategy: KeyStrategy::default(),
            comparison: ComparisonPolicy::default(),
            amount_policy: AmountPolicy::default(),
            primary_sheet: None,
            log_sheet: DEFAULT_LOG_SHEET.to_string(),
            base: BaseLayout::default(),
            update: UpdateLayout::default(),
        }
    }
}

impl ReconcileOptions {
    pub fn from_json_str(json: &str) -> Result<Self> {
        let options: Self =
            serde_json::from_str(json).map_err(|e| ReconcileError::InvalidConfig(e.to_string()))?;
        options.validate()?;
        Ok(options)
    }

    pub fn from_json_path(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path).map_err(|e| {
            ReconcileError::InvalidConfig(format!("read {}: {e}", path.display()))
        })?;
        Self::from_json_str(&json)
    }

    pub fn validate(&self) -> Result<()> {
        if let KeyStrategy::Suffix { len: 0 } = self.key_strategy {
            return Err(invalid("key suffix length must be at least 1"));
        }
        if let ComparisonPolicy::NumericTolerant { epsilon } = self.comparison {
            if !epsilon.is_finite() || epsilon < 0.0 {
                return Err(invalid("numeric tolerance must be a finite, non-negative number"));
            }
        }
        if self.log_sheet.trim().is_empty() {
            return Err(invalid("log sheet name must not be empty"));
        }
        if self.base.committed_first_row == 0 || self.base.payment_first_row == 0 {
            return Err(invalid("base scan rows are 1-based"));
        }
        if self.update.header_row == 0 {
            return Err(invalid("update header row is 1-based"));
        }
        self.base.surcharge_cell()?;
        Ok(())
    }

    pub fn change_detector(&self) -> Box<dyn ChangeDetector> {
        match self.comparison {
            ComparisonPolicy::Stringified => Box::new(Stringified),
            ComparisonPolicy::NumericTolerant { epsilon } => Box::new(NumericTolerant { epsilon }),
        }
    }
}

fn invalid(msg: &str) -> ReconcileError {
    ReconcileError::InvalidConfig(msg.to_string())
}

/// How a raw note identifier is reduced to the key used to match rows across workbooks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum KeyStrategy {
    /// The trailing `len` characters of the trimmed identifier.
    Suffix { len: usize },
    /// The whole trimmed identifier.
    FullIdentifier,
}

impl Default for KeyStrategy {
    fn default() -> Self {
        KeyStrategy::Suffix { len: 8 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ComparisonPolicy {
    /// Compare trimmed display text; `150` and `150.00` differ.
    #[default]
    Stringified,
    /// Treat two numbers within `epsilon` of each other as equal.
    NumericTolerant { epsilon: f64 },
}

/// What to do with a payment row whose amount is missing or not a number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AmountPolicy {
    #[default]
    SkipWithWarning,
    Abort,
}

/// Fixed cell positions of the base workbook. Columns are 0-based, rows 1-based.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BaseLayout {
    pub identifier_col: u32,
    pub committed_col: u32,
    pub status_col: u32,
    pub committed_first_row: u32,
    pub payment_first_row: u32,
    pub surcharge_cell: String,
    /// Status prefixes (compared case-insensitively) that add the surcharge term.
    pub accepted_statuses: Vec<String>,
}

impl Default for BaseLayout {
    fn default() -> Self {
        Self {
            identifier_col: 4,
            committed_col: 5,
            status_col: 10,
            committed_first_row: 5,
            payment_first_row: 2,
            surcharge_cell: "AE6".to_string(),
            accepted_statuses: vec![
                "não pediu, mas pode solicitar.".to_string(),
                "solicitado - em análise".to_string(),
                "não solicitou, mas pode pedir".to_string(),
            ],
        }
    }
}

impl BaseLayout {
    pub fn surcharge_cell(&self) -> Result<CellRef> {
        CellRef::from_a1(self.surcharge_cell.trim()).map_err(|e| {
            ReconcileError::InvalidConfig(format!(
                "surcharge cell {:?}: {e}",
                self.surcharge_cell
            ))
        })
    }
}

/// Column names of the update workbook's table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct UpdateLayout {
    /// 1-based sheet row holding the column headers.
    pub header_row: u32,
    pub identifier_column: String,
    pub committed_column: String,
    pub date_column: String,
    pub amount_column: String,
    /// Rows with any cell containing this text are subtotals and are dropped.
    pub subtotal_marker: String,
}

impl Default for UpdateLayout {
    fn default() -> Self {
        Self {
            header_row: 3,
            identifier_column: "Número da Nota de Empenho".to_string(),
            committed_column: "Saldo - R$ (Item Informação)".to_string(),
            date_column: "Métrica".to_string(),
            amount_column: "Unnamed: 13".to_string(),
            subtotal_marker: "Total".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn empty_object_yields_defaults() {
        let options = ReconcileOptions::from_json_str("{}").unwrap();
        assert_eq!(options, ReconcileOptions::default());
        assert_eq!(options.key_strategy, KeyStrategy::Suffix { len: 8 });
        assert_eq!(options.base.surcharge_cell().unwrap(), CellRef::new(5, 30));
    }

    #[test]
    fn partial_overrides_keep_other_defaults() {
        let options = ReconcileOptions::from_json_str(
            r#"{
                "key_strategy": {"kind": "full_identifier"},
                "comparison": {"kind": "numeric_tolerant", "epsilon": 0.005},
                "amount_policy": "abort",
                "base": {"status_col": 11}
            }"#,
        )
        .unwrap();
        assert_eq!(options.key_strategy, KeyStrategy::FullIdentifier);
        assert_eq!(options.amount_policy, AmountPolicy::Abort);
        assert_eq!(options.base.status_col, 11);
        assert_eq!(options.base.identifier_col, 4);
        assert_eq!(options.update.amount_column, "Unnamed: 13");
    }

    #[test]
    fn rejects_invalid_values() {
        for json in [
            r#"{"key_strategy": {"kind": "suffix", "len": 0}}"#,
            r#"{"comparison": {"kind": "numeric_tolerant", "epsilon": -1.0}}"#,
            r#"{"base": {"surcharge_cell": "6AE"}}"#,
            r#"{"unknown": true}"#,
        ] {
            assert!(
                matches!(
                    ReconcileOptions::from_json_str(json),
                    Err(ReconcileError::InvalidConfig(_))
                ),
                "{json}"
            );
        }
    }
}
