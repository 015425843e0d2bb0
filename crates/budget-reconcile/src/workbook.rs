//! One reconciliation run over a base workbook and an update workbook.

use std::path::Path;

use budget_model::{CellRef, CellValue};
use budget_xlsx::{CellPatch, WorkbookCellPatches, XlsxPackage};
use chrono::{Local, NaiveDateTime};
use serde::Serialize;

use crate::base_sheet::BaseSheet;
use crate::change_log::{ChangeLog, LogEntry, LOG_HEADER};
use crate::committed::reconcile_committed_values;
use crate::config::ReconcileOptions;
use crate::error::{ReconcileError, Result};
use crate::payments::reconcile_payments;
use crate::update_index::{IndexStats, KeyCollision, UpdateIndex};
use crate::update_table::UpdateTable;

pub const STAMP_FORMAT: &str = "Última atualização: %d/%m/%Y às %H:%M";
const OUTPUT_SUFFIX: &str = "_atualizada";

/// What a run changed and what it observed in the update workbook.
#[derive(Debug, Clone, Serialize)]
pub struct ReconcileReport {
    pub primary_sheet: String,
    pub log_sheet: String,
    pub log_sheet_created: bool,
    pub timestamp: NaiveDateTime,
    pub committed_changes: usize,
    pub payment_changes: usize,
    pub stats: IndexStats,
    pub collisions: Vec<KeyCollision>,
    pub entries: Vec<LogEntry>,
}

impl ReconcileReport {
    pub fn total_changes(&self) -> usize {
        self.entries.len()
    }
}

#[derive(Debug, Clone)]
pub struct ReconcileOutput {
    pub bytes: Vec<u8>,
    pub report: ReconcileReport,
}

/// Runs the indexers and reconcilers over one pair of workbooks.
#[derive(Debug, Clone)]
pub struct WorkbookAssembler {
    options: ReconcileOptions,
}

impl WorkbookAssembler {
    pub fn new(options: ReconcileOptions) -> Result<Self> {
        options.validate()?;
        Ok(Self { options })
    }

    pub fn options(&self) -> &ReconcileOptions {
        &self.options
    }

    /// Reconcile using the local wall clock for the log timestamps and the A1 stamp.
    pub fn reconcile(&self, base: &[u8], update: &[u8]) -> Result<ReconcileOutput> {
        self.reconcile_at(base, update, Local::now().naive_local())
    }

    /// Reconcile with an explicit clock. Identical inputs and `now` give identical bytes.
    pub fn reconcile_at(
        &self,
        base: &[u8],
        update: &[u8],
        now: NaiveDateTime,
    ) -> Result<ReconcileOutput> {
        let options = &self.options;
        let mut package = XlsxPackage::from_bytes(base).map_err(ReconcileError::UnreadableBase)?;
        let primary = self.primary_sheet(&package)?;

        let mut table = UpdateTable::from_bytes(update, &options.update)?;
        let index = UpdateIndex::build(&mut table, options)?;

        let mut sheet = BaseSheet::load(&package, &primary)?;
        let detector = options.change_detector();
        let mut log = ChangeLog::new(now);

        let committed_changes = reconcile_committed_values(
            &mut sheet,
            &index.committed,
            options,
            detector.as_ref(),
            &mut log,
        );
        let payment_changes =
            reconcile_payments(&mut sheet, &index.payments, options, detector.as_ref(), &mut log)?;

        sheet.set_value(CellRef::new(0, 0), CellValue::String(stamp_text(now)));

        let mut patches = WorkbookCellPatches::default();
        for (cell, patch) in sheet.patches().iter() {
            patches.set_cell(primary.as_str(), cell, patch.clone());
        }
        let log_sheet_created = self.append_log_rows(&mut package, &mut patches, &log)?;

        package
            .apply_cell_patches(&patches)
            .map_err(ReconcileError::Serialize)?;
        let bytes = package
            .write_to_bytes()
            .map_err(ReconcileError::Serialize)?;

        log::info!(
            "reconciled sheet {primary:?}: {committed_changes} committed values, {payment_changes} payment cells changed"
        );

        Ok(ReconcileOutput {
            bytes,
            report: ReconcileReport {
                primary_sheet: primary,
                log_sheet: options.log_sheet.clone(),
                log_sheet_created,
                timestamp: now,
                committed_changes,
                payment_changes,
                stats: index.stats,
                collisions: index.collisions,
                entries: log.into_entries(),
            },
        })
    }

    /// The configured sheet, or the active tab. An active log sheet falls back to the first
    /// other tab.
    fn primary_sheet(&self, package: &XlsxPackage) -> Result<String> {
        let names = package.sheet_names()?;
        if let Some(name) = &self.options.primary_sheet {
            return names
                .into_iter()
                .find(|n| n == name)
                .ok_or_else(|| ReconcileError::MissingSheet(name.clone()));
        }
        let active = package.active_sheet_name()?;
        if active != self.options.log_sheet {
            return Ok(active);
        }
        log::warn!("active tab is the log sheet; reconciling the first other sheet");
        names
            .into_iter()
            .find(|n| *n != self.options.log_sheet)
            .ok_or_else(|| ReconcileError::MissingSheet("(primary)".to_string()))
    }

    /// Queue the log rows below the last used row of the log sheet, creating the sheet (with its
    /// header) when absent. Returns whether the sheet was created.
    fn append_log_rows(
        &self,
        package: &mut XlsxPackage,
        patches: &mut WorkbookCellPatches,
        log: &ChangeLog,
    ) -> Result<bool> {
        let name = self.options.log_sheet.as_str();
        let exists = package.sheet_names()?.iter().any(|n| n == name);
        let (created, last_row) = if exists {
            (false, package.read_sheet(name)?.max_row())
        } else {
            package.add_worksheet(name)?;
            (true, None)
        };

        let mut next_row = match last_row {
            Some(row) => row + 1,
            None => {
                for (col, header) in LOG_HEADER.iter().enumerate() {
                    patches.set_cell(name, CellRef::new(0, col as u32), CellPatch::set_value(*header));
                }
                1
            }
        };

        for entry in log.entries() {
            for (col, value) in entry.to_row().into_iter().enumerate() {
                if value.is_empty() {
                    continue;
                }
                patches.set_cell(name, CellRef::new(next_row, col as u32), CellPatch::set_value(value));
            }
            next_row += 1;
        }
        Ok(created)
    }
}

/// Text written to A1 of the primary sheet.
pub fn stamp_text(now: NaiveDateTime) -> String {
    now.format(STAMP_FORMAT).to_string()
}

/// `orcamento.xlsx` → `orcamento_atualizada.xlsx`; names without an extension get `.xlsx`.
pub fn output_file_name(input: &str) -> String {
    let path = Path::new(input);
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| input.to_string());
    match file_name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => format!("{stem}{OUTPUT_SUFFIX}.{ext}"),
        _ => format!("{file_name}{OUTPUT_SUFFIX}.xlsx"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use pretty_assertions::assert_eq;

    #[test]
    fn stamp_uses_day_first_format() {
        let now = NaiveDate::from_ymd_opt(2025, 3, 7)
            .unwrap()
            .and_hms_opt(14, 5, 59)
            .unwrap();
        assert_eq!(stamp_text(now), "Última atualização: 07/03/2025 às 14:05");
    }

    #[test]
    fn output_names_insert_suffix_before_extension() {
        assert_eq!(output_file_name("orcamento.xlsx"), "orcamento_atualizada.xlsx");
        assert_eq!(output_file_name("dir/plan.v2.xlsm"), "plan.v2_atualizada.xlsm");
        assert_eq!(output_file_name("orcamento"), "orcamento_atualizada.xlsx");
        assert_eq!(output_file_name(".hidden"), ".hidden_atualizada.xlsx");
    }
}
