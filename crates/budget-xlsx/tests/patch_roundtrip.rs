use budget_model::{CellRef, CellValue};
use budget_xlsx::{CellPatch, WorkbookCellPatches, XlsxError, XlsxPackage};
use pretty_assertions::assert_eq;
use rust_xlsxwriter::Workbook;

fn cell(a1: &str) -> CellRef {
    CellRef::from_a1(a1).expect("valid a1")
}

fn base_workbook() -> Vec<u8> {
    let mut workbook = Workbook::new();
    let sheet = workbook.add_worksheet();
    sheet.set_name("Base").expect("sheet name");
    sheet.write_string(0, 0, "Controle").expect("A1");
    sheet.write_string(4, 4, "2025NE00000001").expect("E5");
    sheet.write_number(4, 5, 100.0).expect("F5");
    sheet.write_string(4, 10, "Pago").expect("K5");
    sheet.write_formula(4, 12, "=1+2").expect("M5");
    let other = workbook.add_worksheet();
    other.set_name("Resumo").expect("sheet name");
    other.write_string(0, 0, "intocado").expect("A1");
    workbook.save_to_buffer().expect("save workbook")
}

#[test]
fn patches_cells_and_preserves_other_parts() {
    let bytes = base_workbook();
    let mut pkg = XlsxPackage::from_bytes(&bytes).expect("load package");
    let styles_before = pkg.part("xl/styles.xml").map(<[u8]>::to_vec);
    let resumo_part = pkg.worksheet_part("Resumo").expect("resumo part");
    let resumo_before = pkg.part(&resumo_part).map(<[u8]>::to_vec);

    let mut patches = WorkbookCellPatches::default();
    patches.set_cell("Base", cell("F5"), CellPatch::set_value(150.0));
    patches.set_cell("Base", cell("M5"), CellPatch::set_formula("=10.50+20.00"));
    patches.set_cell("Base", cell("A1"), CellPatch::set_value("Última atualização"));
    pkg.apply_cell_patches(&patches).expect("apply patches");

    let reloaded = XlsxPackage::from_bytes(&pkg.write_to_bytes().expect("write")).expect("reload");
    let cells = reloaded.read_sheet("Base").expect("read base");
    assert_eq!(cells.value(cell("F5")), CellValue::Number(150.0));
    assert_eq!(cells.content_text(cell("M5")), "=10.50+20.00");
    assert_eq!(cells.value(cell("A1")), CellValue::from("Última atualização"));
    assert_eq!(cells.value(cell("E5")), CellValue::from("2025NE00000001"));
    assert_eq!(cells.value(cell("K5")), CellValue::from("Pago"));

    assert_eq!(reloaded.part("xl/styles.xml").map(<[u8]>::to_vec), styles_before);
    assert_eq!(reloaded.part(&resumo_part).map(<[u8]>::to_vec), resumo_before);

    let workbook_xml = std::str::from_utf8(reloaded.part("xl/workbook.xml").expect("workbook"))
        .expect("utf8")
        .to_string();
    assert!(workbook_xml.contains(r#"fullCalcOnLoad="1""#), "{workbook_xml}");
}

#[test]
fn formula_edits_drop_calc_chain_and_its_references() {
    let mut pkg = XlsxPackage::from_bytes(&base_workbook()).expect("load package");
    pkg.set_part(
        "xl/calcChain.xml",
        br#"<calcChain xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><c r="M5" i="1"/></calcChain>"#.to_vec(),
    );
    let rels = String::from_utf8(pkg.part("xl/_rels/workbook.xml.rels").expect("rels").to_vec())
        .expect("utf8")
        .replace(
            "</Relationships>",
            r#"<Relationship Id="rId99" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/calcChain" Target="calcChain.xml"/></Relationships>"#,
        );
    pkg.set_part("xl/_rels/workbook.xml.rels", rels.into_bytes());
    let ct = String::from_utf8(pkg.part("[Content_Types].xml").expect("ct").to_vec())
        .expect("utf8")
        .replace(
            "</Types>",
            r#"<Override PartName="/xl/calcChain.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.calcChain+xml"/></Types>"#,
        );
    pkg.set_part("[Content_Types].xml", ct.into_bytes());

    let mut patches = WorkbookCellPatches::default();
    patches.set_cell("Base", cell("M5"), CellPatch::set_formula("=(1+2)+((1+2)*AE6)"));
    pkg.apply_cell_patches(&patches).expect("apply patches");

    assert!(pkg.part("xl/calcChain.xml").is_none());
    let rels = std::str::from_utf8(pkg.part("xl/_rels/workbook.xml.rels").expect("rels")).expect("utf8");
    assert!(!rels.contains("calcChain"), "{rels}");
    let ct = std::str::from_utf8(pkg.part("[Content_Types].xml").expect("ct")).expect("utf8");
    assert!(!ct.contains("calcChain"), "{ct}");
}

#[test]
fn added_worksheet_is_readable_and_patchable() {
    let mut pkg = XlsxPackage::from_bytes(&base_workbook()).expect("load package");
    let part = pkg.add_worksheet("Log de Alterações").expect("add sheet");
    assert!(part.starts_with("xl/worksheets/sheet"));
    assert_eq!(
        pkg.sheet_names().expect("names"),
        vec!["Base", "Resumo", "Log de Alterações"]
    );
    assert!(matches!(
        pkg.add_worksheet("Base"),
        Err(XlsxError::DuplicateSheet(name)) if name == "Base"
    ));

    let mut patches = WorkbookCellPatches::default();
    for (col, header) in ["Tipo", "Nota de Empenho", "Campo"].iter().enumerate() {
        patches.set_cell(
            "Log de Alterações",
            CellRef::new(0, col as u32),
            CellPatch::set_value(*header),
        );
    }
    patches.set_cell("Log de Alterações", cell("D2"), CellPatch::set_value(100.0));
    pkg.apply_cell_patches(&patches).expect("apply patches");

    let reloaded = XlsxPackage::from_bytes(&pkg.write_to_bytes().expect("write")).expect("reload");
    let log = reloaded.read_sheet("Log de Alterações").expect("read log");
    assert_eq!(log.value(cell("B1")), CellValue::from("Nota de Empenho"));
    assert_eq!(log.value(cell("D2")), CellValue::Number(100.0));
    assert_eq!(log.max_row(), Some(1));
}

#[test]
fn unknown_sheet_is_reported() {
    let mut pkg = XlsxPackage::from_bytes(&base_workbook()).expect("load package");
    let mut patches = WorkbookCellPatches::default();
    patches.set_cell("Nope", cell("A1"), CellPatch::set_value(1.0));
    assert!(matches!(
        pkg.apply_cell_patches(&patches),
        Err(XlsxError::UnknownSheet(name)) if name == "Nope"
    ));
}

#[test]
fn rejects_non_zip_input() {
    assert!(matches!(
        XlsxPackage::from_bytes(b"not a zip"),
        Err(XlsxError::Zip(_))
    ));
}

#[test]
fn overwriting_a_shared_formula_anchor_keeps_the_rest_of_the_group() {
    let mut pkg = XlsxPackage::from_bytes(&base_workbook()).expect("load package");
    let part = pkg.worksheet_part("Base").expect("base part");
    pkg.set_part(
        part.clone(),
        br#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><sheetData><row r="5"><c r="L5"><v>1</v></c><c r="M5" s="2"><f t="shared" ref="M5:M7" si="0">L5*2</f><v>2</v></c></row><row r="6"><c r="L6"><v>2</v></c><c r="M6" s="2"><f t="shared" si="0"/><v>4</v></c></row><row r="7"><c r="L7"><v>3</v></c><c r="M7" s="2"><f t="shared" si="0"/><v>6</v></c></row></sheetData></worksheet>"#
            .to_vec(),
    );
    assert_eq!(
        pkg.read_sheet("Base").expect("read before").content_text(cell("M7")),
        "=L7*2"
    );

    let mut patches = WorkbookCellPatches::default();
    patches.set_cell("Base", cell("M5"), CellPatch::set_formula("=(10.50)+((10.50)*AE6)"));
    pkg.apply_cell_patches(&patches).expect("apply patches");

    let reloaded = XlsxPackage::from_bytes(&pkg.write_to_bytes().expect("write")).expect("reload");
    let cells = reloaded.read_sheet("Base").expect("read base");
    assert_eq!(cells.content_text(cell("M5")), "=(10.50)+((10.50)*AE6)");
    assert_eq!(cells.content_text(cell("M6")), "=L6*2");
    assert_eq!(cells.content_text(cell("M7")), "=L7*2");

    let xml = std::str::from_utf8(reloaded.part(&part).expect("sheet part"))
        .expect("utf8")
        .to_string();
    assert!(!xml.contains(r#"t="shared""#), "{xml}");
    assert!(xml.contains(r#"<c r="M6" s="2"><f>L6*2</f><v>4</v></c>"#), "{xml}");
}
