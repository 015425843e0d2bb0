use budget_model::{CellRef, CellValue};
use budget_reconcile::{
    output_file_name, ChangeKind, ReconcileCache, ReconcileError, ReconcileOptions,
    WorkbookAssembler, LOG_HEADER,
};
use budget_xlsx::XlsxPackage;
use chrono::{NaiveDate, NaiveDateTime};
use pretty_assertions::assert_eq;
use rust_xlsxwriter::Workbook;

const BASE_SHEET: &str = "Orçamento";
const LOG_SHEET: &str = "Log de Alterações";

fn cell(a1: &str) -> CellRef {
    CellRef::from_a1(a1).expect("valid a1")
}

fn at(day: u32, hour: u32, minute: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2025, 6, day)
        .expect("date")
        .and_hms_opt(hour, minute, 0)
        .expect("time")
}

fn base_workbook() -> Vec<u8> {
    let mut workbook = Workbook::new();
    let sheet = workbook.add_worksheet();
    sheet.set_name(BASE_SHEET).expect("sheet name");
    sheet.write_string(0, 0, "Controle orçamentário").expect("A1");
    sheet.write_string(3, 4, "Nota").expect("E4");
    sheet.write_string(3, 5, "Valor Empenhado").expect("F4");
    sheet.write_number(5, 30, 0.1).expect("AE6");

    sheet.write_string(4, 4, "2025NE00000001").expect("E5");
    sheet.write_number(4, 5, 100.0).expect("F5");
    sheet.write_string(4, 10, "Solicitado - em Análise").expect("K5");

    sheet.write_string(5, 4, "2025NE00000002").expect("E6");
    sheet.write_number(5, 5, 80.0).expect("F6");
    sheet.write_string(5, 10, "Pago").expect("K6");

    sheet.write_string(6, 4, "2025NE00000003").expect("E7");
    sheet.write_number(6, 5, 42.0).expect("F7");

    let other = workbook.add_worksheet();
    other.set_name("Resumo").expect("sheet name");
    other.write_formula(0, 0, "=SUM(1,2)").expect("A1");
    workbook.save_to_buffer().expect("save base")
}

/// One update row: identifier, committed value, payment date, payment amount (column N).
type UpdateRow<'a> = (&'a str, f64, &'a str, &'a str);

fn update_workbook(rows: &[UpdateRow<'_>]) -> Vec<u8> {
    let mut workbook = Workbook::new();
    let sheet = workbook.add_worksheet();
    sheet.write_string(0, 0, "Execução orçamentária").expect("title");
    sheet.write_string(2, 0, "Número da Nota de Empenho").expect("header");
    sheet.write_string(2, 1, "Saldo - R$ (Item Informação)").expect("header");
    sheet.write_string(2, 2, "Métrica").expect("header");
    for (idx, (id, committed, date, amount)) in rows.iter().enumerate() {
        let row = 3 + idx as u32;
        sheet.write_string(row, 0, *id).expect("id");
        sheet.write_number(row, 1, *committed).expect("committed");
        sheet.write_string(row, 2, *date).expect("date");
        sheet.write_string(row, 13, *amount).expect("amount");
    }
    workbook.save_to_buffer().expect("save update")
}

fn default_update() -> Vec<u8> {
    update_workbook(&[
        ("2025NE00000001", 150.0, "15/01/2025", "10,50"),
        ("2025NE00000001", 150.0, "20/01/2025", "20,00"),
        ("2025NE00000002", 80.0, "03/02/2025", "5,00"),
        ("2025NE00000002", 9999.0, "Total Geral", "999,00"),
    ])
}

fn assembler() -> WorkbookAssembler {
    WorkbookAssembler::new(ReconcileOptions::default()).expect("valid options")
}

#[test]
fn reconciles_committed_values_and_payment_formulas() {
    let output = assembler()
        .reconcile_at(&base_workbook(), &default_update(), at(2, 9, 30))
        .expect("reconcile");
    let report = &output.report;

    assert_eq!(report.primary_sheet, BASE_SHEET);
    assert_eq!(report.committed_changes, 1);
    assert_eq!(report.payment_changes, 2);
    assert_eq!(report.stats.subtotal_rows, 1);
    assert!(report.log_sheet_created);

    let committed = &report.entries[0];
    assert_eq!(committed.kind, ChangeKind::Empenho);
    assert_eq!(committed.key.as_str(), "00000001");
    assert_eq!(committed.field, "Valor Empenhado");
    assert_eq!(committed.old_value, CellValue::Number(100.0));
    assert_eq!(committed.new_value, CellValue::Number(150.0));

    let package = XlsxPackage::from_bytes(&output.bytes).expect("reload output");
    let sheet = package.read_sheet(BASE_SHEET).expect("base sheet");
    assert_eq!(sheet.value(cell("F5")), CellValue::Number(150.0));
    // The subtotal row's 9999 must not reach the committed index.
    assert_eq!(sheet.value(cell("F6")), CellValue::Number(80.0));
    assert_eq!(sheet.value(cell("F7")), CellValue::Number(42.0));
    assert_eq!(
        sheet.content_text(cell("M5")),
        "=(10.50+20.00)+((10.50+20.00)*AE6)"
    );
    assert_eq!(sheet.content_text(cell("N6")), "=5.00");
    assert_eq!(sheet.content_text(cell("N5")), "");
    assert_eq!(
        sheet.value(cell("A1")),
        CellValue::from("Última atualização: 02/06/2025 às 09:30")
    );

    let resumo = package.read_sheet("Resumo").expect("other sheet");
    assert_eq!(resumo.content_text(cell("A1")), "=SUM(1,2)");
}

#[test]
fn log_sheet_is_created_with_header_and_rows() {
    let output = assembler()
        .reconcile_at(&base_workbook(), &default_update(), at(2, 9, 30))
        .expect("reconcile");
    let package = XlsxPackage::from_bytes(&output.bytes).expect("reload output");
    assert!(package
        .sheet_names()
        .expect("sheet names")
        .iter()
        .any(|name| name == LOG_SHEET));

    let log = package.read_sheet(LOG_SHEET).expect("log sheet");
    let header: Vec<String> = (0..6)
        .map(|col| log.value(CellRef::new(0, col)).display_text())
        .collect();
    assert_eq!(header, LOG_HEADER.to_vec());

    assert_eq!(log.value(cell("A2")), CellValue::from("Empenho"));
    assert_eq!(log.value(cell("B2")), CellValue::from("00000001"));
    assert_eq!(log.value(cell("C2")), CellValue::from("Valor Empenhado"));
    assert_eq!(log.value(cell("D2")), CellValue::Number(100.0));
    assert_eq!(log.value(cell("E2")), CellValue::Number(150.0));
    assert_eq!(log.value(cell("F2")), CellValue::from("2025-06-02 09:30:00"));

    assert_eq!(log.value(cell("A3")), CellValue::from("Pagamento"));
    assert_eq!(log.value(cell("C3")), CellValue::from("Pagamento jan"));
    assert_eq!(
        log.value(cell("E3")),
        CellValue::from("=(10.50+20.00)+((10.50+20.00)*AE6)")
    );
    assert_eq!(log.value(cell("C4")), CellValue::from("Pagamento fev"));
    assert_eq!(log.max_row(), Some(3));
}

#[test]
fn rerun_on_own_output_logs_nothing() {
    let first = assembler()
        .reconcile_at(&base_workbook(), &default_update(), at(2, 9, 30))
        .expect("first run");
    let second = assembler()
        .reconcile_at(&first.bytes, &default_update(), at(3, 10, 0))
        .expect("second run");

    assert!(second.report.entries.is_empty());
    assert!(!second.report.log_sheet_created);

    let package = XlsxPackage::from_bytes(&second.bytes).expect("reload output");
    let log = package.read_sheet(LOG_SHEET).expect("log sheet");
    assert_eq!(log.max_row(), Some(3));
    let sheet = package.read_sheet(BASE_SHEET).expect("base sheet");
    assert_eq!(
        sheet.value(cell("A1")),
        CellValue::from("Última atualização: 03/06/2025 às 10:00")
    );
}

#[test]
fn later_runs_append_below_existing_log_rows() {
    let first = assembler()
        .reconcile_at(&base_workbook(), &default_update(), at(2, 9, 30))
        .expect("first run");
    let revised = update_workbook(&[("2025NE00000001", 175.0, "15/01/2025", "10,50")]);
    let second = assembler()
        .reconcile_at(&first.bytes, &revised, at(4, 8, 0))
        .expect("second run");

    assert_eq!(second.report.committed_changes, 1);
    // January now has a single amount and the surcharge form.
    assert_eq!(second.report.payment_changes, 1);

    let package = XlsxPackage::from_bytes(&second.bytes).expect("reload output");
    let log = package.read_sheet(LOG_SHEET).expect("log sheet");
    assert_eq!(log.value(cell("A1")), CellValue::from("Tipo"));
    assert_eq!(log.value(cell("D5")), CellValue::Number(150.0));
    assert_eq!(log.value(cell("E5")), CellValue::Number(175.0));
    assert_eq!(log.value(cell("F5")), CellValue::from("2025-06-04 08:00:00"));
    assert_eq!(log.value(cell("E6")), CellValue::from("=(10.50)+((10.50)*AE6)"));
    assert_eq!(log.max_row(), Some(5));
}

#[test]
fn same_inputs_and_clock_give_identical_bytes() {
    let base = base_workbook();
    let update = default_update();
    let a = assembler().reconcile_at(&base, &update, at(2, 9, 30)).expect("run a");
    let b = assembler().reconcile_at(&base, &update, at(2, 9, 30)).expect("run b");
    assert_eq!(a.bytes, b.bytes);

    let mut cache = ReconcileCache::new();
    let assembler = assembler();
    let cached = cache
        .reconcile_at(&assembler, &base, &update, at(2, 9, 30))
        .expect("cached run")
        .bytes
        .clone();
    cache
        .reconcile_at(&assembler, &base, &update, at(2, 9, 30))
        .expect("cache hit");
    assert_eq!(cached, a.bytes);
    assert_eq!(cache.hits(), 1);
    assert_eq!(cache.misses(), 1);
}

#[test]
fn configured_sheet_must_exist() {
    let options = ReconcileOptions {
        primary_sheet: Some("2024".to_string()),
        ..ReconcileOptions::default()
    };
    let err = WorkbookAssembler::new(options)
        .expect("valid options")
        .reconcile_at(&base_workbook(), &default_update(), at(2, 9, 30))
        .expect_err("missing sheet");
    assert!(matches!(err, ReconcileError::MissingSheet(name) if name == "2024"));
}

#[test]
fn missing_update_column_is_fatal() {
    let mut workbook = Workbook::new();
    let sheet = workbook.add_worksheet();
    sheet.write_string(2, 0, "Nota").expect("header");
    let update = workbook.save_to_buffer().expect("save update");

    let err = assembler()
        .reconcile_at(&base_workbook(), &update, at(2, 9, 30))
        .expect_err("missing column");
    assert!(matches!(err, ReconcileError::MissingColumn { .. }));
}

#[test]
fn unreadable_inputs_are_reported() {
    let err = assembler()
        .reconcile_at(b"not a workbook", &default_update(), at(2, 9, 30))
        .expect_err("bad base");
    assert!(matches!(err, ReconcileError::UnreadableBase(_)));

    let err = assembler()
        .reconcile_at(&base_workbook(), b"not a workbook", at(2, 9, 30))
        .expect_err("bad update");
    assert!(matches!(err, ReconcileError::UnreadableUpdate(_)));
}

#[test]
fn output_names_follow_base_name() {
    assert_eq!(output_file_name("orcamento.xlsx"), "orcamento_atualizada.xlsx");
    assert_eq!(output_file_name("orcamento"), "orcamento_atualizada.xlsx");
}
