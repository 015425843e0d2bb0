//! Core cell types shared by the budget reconciliation crates.

mod address;
mod value;

pub use address::{col_to_name, name_to_col, A1ParseError, CellRef, MAX_COLS, MAX_ROWS};
pub use value::{
    datetime_to_serial, serial_to_datetime, Cell, CellValue, DATETIME_DISPLAY_FORMAT,
};
