use std::collections::{BTreeMap, HashMap};

use budget_model::{Cell, CellRef, CellValue};
use roxmltree::{Document, Node};

use crate::shared_formula::{shared_role, SharedFormula, SharedRole};
use crate::shared_strings::string_item_text;
use crate::XlsxError;

/// Populated cells of one worksheet, keyed row-major.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SheetCells {
    cells: BTreeMap<CellRef, Cell>,
}

impl SheetCells {
    pub fn get(&self, cell: CellRef) -> Option<&Cell> {
        self.cells.get(&cell)
    }

    /// Cell value, or [`CellValue::Empty`] for unpopulated cells.
    pub fn value(&self, cell: CellRef) -> CellValue {
        self.get(cell).map(|c| c.value.clone()).unwrap_or_default()
    }

    /// Formula-bar content of a cell; empty for unpopulated cells.
    pub fn content_text(&self, cell: CellRef) -> String {
        self.get(cell).map(Cell::content_text).unwrap_or_default()
    }

    pub fn set(&mut self, cell: CellRef, value: Cell) {
        self.cells.insert(cell, value);
    }

    /// 0-based index of the last row holding a populated cell.
    pub fn max_row(&self) -> Option<u32> {
        self.cells.keys().map(|c| c.row).max()
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (CellRef, &Cell)> {
        self.cells.iter().map(|(r, c)| (*r, c))
    }
}

/// Parse the `<sheetData>` of a worksheet part.
///
/// Members of a shared formula group read as the anchor formula moved to their position.
pub fn read_worksheet_cells(xml: &[u8], shared_strings: &[String]) -> Result<SheetCells, XlsxError> {
    let xml = std::str::from_utf8(xml)?;
    let doc = Document::parse(xml)?;
    let mut out = SheetCells::default();
    let mut anchors: HashMap<u32, SharedFormula> = HashMap::new();
    let mut members: Vec<(CellRef, u32)> = Vec::new();

    visit_cells(&doc, |cell_ref, c| {
        let cell = parse_cell(&c, shared_strings)?;
        let role = c
            .children()
            .find(|n| n.is_element() && n.tag_name().name() == "f")
            .and_then(|f| shared_role(cell_ref, &f));
        match role {
            Some(SharedRole::Anchor { si, group }) => {
                anchors.entry(si).or_insert(group);
            }
            Some(SharedRole::Member { si }) => members.push((cell_ref, si)),
            None => {}
        }
        if cell.formula.is_none() && cell.value.is_empty() {
            return Ok(());
        }
        out.set(cell_ref, cell);
        Ok(())
    })?;

    for (cell_ref, si) in members {
        let formula = anchors.get(&si).map(|group| group.text_at(cell_ref));
        let Some(cell) = out.cells.get_mut(&cell_ref) else {
            continue;
        };
        cell.formula = formula;
        if cell.formula.is_none() && cell.value.is_empty() {
            out.cells.remove(&cell_ref);
        }
    }

    Ok(out)
}

/// Visit every `<c>` of `<sheetData>` with its position.
///
/// Rows and cells without an `r` attribute continue from the previous position, as producers
/// are allowed to omit them.
pub(crate) fn visit_cells<'a, 'input: 'a>(
    doc: &'a Document<'input>,
    mut visit: impl FnMut(CellRef, Node<'a, 'input>) -> Result<(), XlsxError>,
) -> Result<(), XlsxError> {
    let Some(sheet_data) = doc
        .root_element()
        .children()
        .find(|n| n.is_element() && n.tag_name().name() == "sheetData")
    else {
        return Ok(());
    };

    let mut next_row = 0u32;
    for row in sheet_data
        .children()
        .filter(|n| n.is_element() && n.tag_name().name() == "row")
    {
        let row_idx = row
            .attribute("r")
            .and_then(|r| r.trim().parse::<u32>().ok())
            .and_then(|r| r.checked_sub(1))
            .unwrap_or(next_row);
        next_row = row_idx + 1;

        let mut next_col = 0u32;
        for c in row
            .children()
            .filter(|n| n.is_element() && n.tag_name().name() == "c")
        {
            let cell_ref = match c.attribute("r") {
                Some(a1) => CellRef::from_a1(a1).map_err(|e| {
                    XlsxError::Invalid(format!("invalid cell reference {a1:?}: {e}"))
                })?,
                None => CellRef::new(row_idx, next_col),
            };
            next_col = cell_ref.col + 1;
            visit(cell_ref, c)?;
        }
    }
    Ok(())
}

fn parse_cell(c: &Node<'_, '_>, shared_strings: &[String]) -> Result<Cell, XlsxError> {
    let child = |name: &str| {
        c.children()
            .find(|n| n.is_element() && n.tag_name().name() == name)
    };
    let raw = child("v").map(|v| v.text().unwrap_or_default().to_string());
    let formula = child("f").map(|f| f.text().unwrap_or_default().to_string());

    let value = match c.attribute("t").unwrap_or("n") {
        "s" => match raw {
            Some(raw) => {
                let idx: usize = raw.trim().parse().map_err(|_| {
                    XlsxError::Invalid(format!("invalid shared string index {raw:?}"))
                })?;
                let text = shared_strings.get(idx).ok_or_else(|| {
                    XlsxError::Invalid(format!("shared string index {idx} out of range"))
                })?;
                CellValue::String(text.clone())
            }
            None => CellValue::Empty,
        },
        "inlineStr" => child("is")
            .map(|is| CellValue::String(string_item_text(&is)))
            .unwrap_or_default(),
        "b" => match raw.as_deref().map(str::trim) {
            Some("1") | Some("true") => CellValue::Boolean(true),
            Some(_) => CellValue::Boolean(false),
            None => CellValue::Empty,
        },
        "e" => raw.map(CellValue::Error).unwrap_or_default(),
        "str" | "d" => raw.map(CellValue::String).unwrap_or_default(),
        _ => match raw {
            Some(raw) if !raw.trim().is_empty() => match raw.trim().parse::<f64>() {
                Ok(n) => CellValue::Number(n),
                Err(_) => CellValue::String(raw),
            },
            _ => CellValue::Empty,
        },
    };

    Ok(Cell { value, formula })
}
