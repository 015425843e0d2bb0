//! Part-preserving XLSX access for budget workbooks.
//!
//! - [`XlsxPackage`]: the OPC ZIP inflated into memory (part name -> bytes). Parts that are
//!   never edited are written back byte-for-byte.
//! - [`XlsxPackage::read_sheet`]: a typed view of a worksheet's populated cells (values and
//!   formula text).
//! - [`WorkbookCellPatches`]: cell writes applied by stream-rewriting only the affected
//!   worksheet XML, appending to `sharedStrings.xml` and flagging the workbook for a full
//!   recalculation when formulas change.
//! - [`XlsxPackage::add_worksheet`]: appends a new empty tab.

mod append;
pub mod openxml;
mod package;
pub mod patch;
mod shared_formula;
mod shared_strings;
mod sheet_metadata;
mod worksheet;

pub use package::{XlsxError, XlsxPackage, MAX_PART_BYTES};
pub use patch::{CellPatch, WorkbookCellPatches, WorksheetCellPatches};
pub use shared_formula::shift_formula;
pub use shared_strings::parse_shared_strings_xml;
pub use sheet_metadata::{parse_workbook_sheets, WorkbookSheetInfo};
pub use worksheet::{read_worksheet_cells, SheetCells};
