use budget_model::CellRef;

use crate::base_sheet::BaseSheet;
use crate::change_log::{ChangeKind, ChangeLog};
use crate::compare::ChangeDetector;
use crate::config::ReconcileOptions;
use crate::note_key::normalize_key;
use crate::update_index::CommittedValueIndex;

pub const COMMITTED_FIELD: &str = "Valor Empenhado";

/// Overwrite every base committed value that differs from the update's, logging each change.
/// Returns the number of cells changed.
pub fn reconcile_committed_values(
    sheet: &mut BaseSheet,
    index: &CommittedValueIndex,
    options: &ReconcileOptions,
    detector: &dyn ChangeDetector,
    log: &mut ChangeLog,
) -> usize {
    let layout = &options.base;
    let mut changed = 0;

    for row in layout.committed_first_row..=sheet.last_row() {
        let row0 = row - 1;
        let key = normalize_key(
            &sheet.value(CellRef::new(row0, layout.identifier_col)),
            &options.key_strategy,
        );
        if key.is_empty() {
            continue;
        }
        let Some(new_value) = index.get(&key) else {
            continue;
        };

        let cell = CellRef::new(row0, layout.committed_col);
        if !detector.differs(&sheet.content_text(cell), &new_value.display_text()) {
            continue;
        }

        log.record(
            ChangeKind::Empenho,
            &key,
            COMMITTED_FIELD,
            cell,
            sheet.content_value(cell),
            new_value.clone(),
        );
        sheet.set_value(cell, new_value.clone());
        changed += 1;
    }

    changed
}
