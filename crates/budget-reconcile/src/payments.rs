//! Monthly payment formulas.
//!
//! Each month cell of a base row holds a live formula summing that month's payments, e.g.
//! `=10.50+20.00`. Rows whose status allows a surcharge get
//! `=(10.50+20.00)+((10.50+20.00)*AE6)`, where the surcharge cell holds the rate.

use budget_model::{CellRef, CellValue};

use crate::base_sheet::BaseSheet;
use crate::change_log::{ChangeKind, ChangeLog};
use crate::compare::ChangeDetector;
use crate::config::ReconcileOptions;
use crate::error::Result;
use crate::month::Month;
use crate::note_key::normalize_key;
use crate::update_index::{Amount, PaymentIndex};

/// Whether `status` starts with one of `accepted` (case-insensitive, surrounding whitespace
/// ignored).
pub fn is_accepted_status(status: &str, accepted: &[String]) -> bool {
    let status = status.trim().to_lowercase();
    accepted
        .iter()
        .map(|prefix| prefix.trim().to_lowercase())
        .any(|prefix| !prefix.is_empty() && status.starts_with(&prefix))
}

/// `a+b+...` over the amounts' source text.
pub fn sum_expression(amounts: &[Amount]) -> String {
    amounts
        .iter()
        .map(Amount::as_str)
        .collect::<Vec<_>>()
        .join("+")
}

/// The formula text (with leading `=`) for one month, or `None` when there are no amounts.
pub fn build_payment_formula(
    amounts: &[Amount],
    accepted_status: bool,
    surcharge_cell: &str,
) -> Option<String> {
    if amounts.is_empty() {
        return None;
    }
    let sum = sum_expression(amounts);
    Some(if accepted_status {
        format!("=({sum})+(({sum})*{surcharge_cell})")
    } else {
        format!("={sum}")
    })
}

/// Rewrite every month cell whose generated formula differs from its current content, logging
/// each change. Returns the number of cells changed.
pub fn reconcile_payments(
    sheet: &mut BaseSheet,
    index: &PaymentIndex,
    options: &ReconcileOptions,
    detector: &dyn ChangeDetector,
    log: &mut ChangeLog,
) -> Result<usize> {
    let layout = &options.base;
    let surcharge = layout.surcharge_cell()?.to_a1();
    let mut changed = 0;

    for row in layout.payment_first_row..=sheet.last_row() {
        let row0 = row - 1;
        let key = normalize_key(
            &sheet.value(CellRef::new(row0, layout.identifier_col)),
            &options.key_strategy,
        );
        if key.is_empty() || !index.contains_key(&key) {
            continue;
        }

        let status = sheet
            .value(CellRef::new(row0, layout.status_col))
            .display_text();
        let accepted = is_accepted_status(&status, &layout.accepted_statuses);

        for month in Month::ALL {
            let Some(formula) =
                build_payment_formula(index.amounts(&key, month), accepted, &surcharge)
            else {
                continue;
            };

            let cell = CellRef::new(row0, month.column());
            if !detector.differs(&sheet.content_text(cell), &formula) {
                continue;
            }

            log.record(
                ChangeKind::Pagamento,
                &key,
                format!("Pagamento {month}"),
                cell,
                sheet.content_value(cell),
                CellValue::String(formula.clone()),
            );
            sheet.set_formula(cell, &formula);
            changed += 1;
        }
    }

    Ok(changed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use budget_model::Cell;
    use budget_xlsx::SheetCells;
    use chrono::NaiveDate;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    use crate::compare::Stringified;
    use crate::note_key::NoteKey;

    fn amounts(texts: &[&str]) -> Vec<Amount> {
        texts
            .iter()
            .map(|t| Amount::parse(&CellValue::from(*t)).unwrap())
            .collect()
    }

    fn accepted() -> Vec<String> {
        ReconcileOptions::default().base.accepted_statuses
    }

    #[test]
    fn plain_and_surcharge_formulas() {
        let two = amounts(&["10,50", "20,00"]);
        assert_eq!(
            build_payment_formula(&two, false, "AE6").as_deref(),
            Some("=10.50+20.00")
        );
        assert_eq!(
            build_payment_formula(&two, true, "AE6").as_deref(),
            Some("=(10.50+20.00)+((10.50+20.00)*AE6)")
        );
        assert_eq!(
            build_payment_formula(&amounts(&["7"]), false, "AE6").as_deref(),
            Some("=7")
        );
        assert_eq!(build_payment_formula(&[], true, "AE6"), None);
    }

    #[test]
    fn status_matching_is_prefix_and_case_insensitive() {
        let accepted = accepted();
        assert!(is_accepted_status("Solicitado - em Análise", &accepted));
        assert!(is_accepted_status(
            "  NÃO PEDIU, MAS PODE SOLICITAR. (prazo 30/06)",
            &accepted
        ));
        assert!(is_accepted_status("Não solicitou, mas pode pedir", &accepted));
        assert!(!is_accepted_status("Pago", &accepted));
        assert!(!is_accepted_status("", &accepted));
        assert!(!is_accepted_status("em análise - solicitado", &accepted));
    }

    #[test]
    fn writes_formulas_and_skips_empty_months() {
        let mut cells = SheetCells::default();
        cells.set(CellRef::new(1, 4), Cell::new(CellValue::from("2025NE00000001")));
        cells.set(CellRef::new(1, 10), Cell::new(CellValue::from("Solicitado - em análise")));
        cells.set(CellRef::new(1, 13), Cell::new(CellValue::Number(3.0)));
        let mut sheet = BaseSheet::new("Base", cells);

        let key = NoteKey::from("00000001");
        let mut index = PaymentIndex::default();
        for amount in amounts(&["10,50", "20,00"]) {
            index.push(&key, Month::Jan, amount);
        }

        let now = NaiveDate::from_ymd_opt(2025, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        let mut log = ChangeLog::new(now);
        let options = ReconcileOptions::default();
        let changed =
            reconcile_payments(&mut sheet, &index, &options, &Stringified, &mut log).unwrap();

        assert_eq!(changed, 1);
        assert_eq!(
            sheet.content_text(CellRef::new(1, 12)),
            "=(10.50+20.00)+((10.50+20.00)*AE6)"
        );
        assert_eq!(sheet.value(CellRef::new(1, 13)), CellValue::Number(3.0));
        assert_eq!(log.entries()[0].field, "Pagamento jan");
        assert_eq!(log.entries()[0].old_value, CellValue::Empty);

        let mut again = ChangeLog::new(now);
        let changed =
            reconcile_payments(&mut sheet, &index, &options, &Stringified, &mut again).unwrap();
        assert_eq!(changed, 0);
    }

    proptest! {
        #[test]
        fn operator_count_matches_amount_count(values in prop::collection::vec(0u32..100_000, 1..12)) {
            let amounts: Vec<Amount> = values
                .iter()
                .map(|v| Amount::parse(&CellValue::Number(f64::from(*v) / 100.0)).unwrap())
                .collect();
            let formula = build_payment_formula(&amounts, false, "AE6").unwrap();
            prop_assert_eq!(formula.matches('+').count(), amounts.len() - 1);
            prop_assert!(formula.starts_with('='));
        }
    }
}
