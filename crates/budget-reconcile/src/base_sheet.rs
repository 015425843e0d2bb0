use budget_model::{Cell, CellRef, CellValue};
use budget_xlsx::{CellPatch, SheetCells, WorksheetCellPatches, XlsxPackage};

use crate::error::Result;

/// Working view of the sheet being reconciled: the cells as loaded plus every write made so
/// far. Writes are visible to later reads and are turned into package patches at the end.
#[derive(Debug, Clone, Default)]
pub struct BaseSheet {
    name: String,
    cells: SheetCells,
    patches: WorksheetCellPatches,
}

impl BaseSheet {
    pub fn new(name: impl Into<String>, cells: SheetCells) -> Self {
        Self {
            name: name.into(),
            cells,
            patches: WorksheetCellPatches::default(),
        }
    }

    pub fn load(package: &XlsxPackage, name: &str) -> Result<Self> {
        Ok(Self::new(name, package.read_sheet(name)?))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// 1-based number of the last populated row; 0 for an empty sheet.
    pub fn last_row(&self) -> u32 {
        self.cells.max_row().map_or(0, |row| row + 1)
    }

    pub fn value(&self, cell: CellRef) -> CellValue {
        self.cells.value(cell)
    }

    /// Formula-bar text of a cell (`=` + formula for formula cells).
    pub fn content_text(&self, cell: CellRef) -> String {
        self.cells.content_text(cell)
    }

    /// The cell content as it should appear in the change log.
    pub fn content_value(&self, cell: CellRef) -> CellValue {
        self.cells
            .get(cell)
            .map(Cell::content_value)
            .unwrap_or_default()
    }

    pub fn set_value(&mut self, cell: CellRef, value: CellValue) {
        self.cells.set(cell, Cell::new(value.clone()));
        self.patches.set_cell(cell, CellPatch::set_value(value));
    }

    /// Store a live formula; a leading `=` is accepted.
    pub fn set_formula(&mut self, cell: CellRef, formula: &str) {
        let formula = formula.strip_prefix('=').unwrap_or(formula);
        self.cells.set(cell, Cell::with_formula(formula));
        self.patches.set_cell(cell, CellPatch::set_formula(formula));
    }

    pub fn patches(&self) -> &WorksheetCellPatches {
        &self.patches
    }
}
