//! The update workbook as a header-addressed table.
//!
//! The first worksheet is read with `calamine`, so any format it supports is accepted. Column
//! names come from a fixed header row; positions are absolute sheet columns, so a blank header in
//! column N is addressed as `Unnamed: N`.

use std::collections::HashMap;
use std::io::Cursor;

use budget_model::{serial_to_datetime, CellValue};
use calamine::{open_workbook_auto_from_rs, Data, Range, Reader};
use chrono::NaiveDateTime;
use serde::Serialize;

use crate::config::UpdateLayout;
use crate::error::{ReconcileError, Result};

#[derive(Debug, Clone, PartialEq)]
pub struct UpdateRow {
    /// 1-based sheet row, for diagnostics.
    pub sheet_row: u32,
    pub cells: Vec<CellValue>,
}

impl UpdateRow {
    pub fn get(&self, col: usize) -> &CellValue {
        const EMPTY: &CellValue = &CellValue::Empty;
        self.cells.get(col).unwrap_or(EMPTY)
    }

    fn is_blank(&self) -> bool {
        self.cells.iter().all(CellValue::is_empty)
    }
}

/// Row counts observed while cleaning the table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PreprocessStats {
    pub rows_read: usize,
    pub subtotal_rows: usize,
    pub blank_rows: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UpdateTable {
    header_row: u32,
    headers: Vec<String>,
    rows: Vec<UpdateRow>,
}

impl UpdateTable {
    /// Load the first worksheet of an update workbook.
    pub fn from_bytes(bytes: &[u8], layout: &UpdateLayout) -> Result<Self> {
        let mut workbook = open_workbook_auto_from_rs(Cursor::new(bytes.to_vec()))
            .map_err(|e| ReconcileError::UnreadableUpdate(e.to_string()))?;
        let range = workbook
            .worksheet_range_at(0)
            .ok_or_else(|| ReconcileError::UnreadableUpdate("workbook has no sheets".to_string()))?
            .map_err(|e| ReconcileError::UnreadableUpdate(e.to_string()))?;
        Ok(Self::from_grid(range_to_grid(&range), layout.header_row))
    }

    /// Build a table from absolute sheet rows (row 0 is sheet row 1, column 0 is column A).
    pub fn from_grid(grid: Vec<Vec<CellValue>>, header_row: u32) -> Self {
        let header_idx = header_row.saturating_sub(1) as usize;
        let width = grid.iter().map(Vec::len).max().unwrap_or(0);

        let raw_headers: Vec<CellValue> = grid.get(header_idx).cloned().unwrap_or_default();
        let headers = header_names(&raw_headers, width);

        let rows = grid
            .into_iter()
            .enumerate()
            .skip(header_idx + 1)
            .map(|(idx, cells)| UpdateRow {
                sheet_row: idx as u32 + 1,
                cells,
            })
            .collect();

        Self {
            header_row,
            headers,
            rows,
        }
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn rows(&self) -> &[UpdateRow] {
        &self.rows
    }

    /// Position of the column named `name`.
    pub fn column(&self, name: &str) -> Result<usize> {
        self.headers
            .iter()
            .position(|h| h == name)
            .ok_or_else(|| ReconcileError::MissingColumn {
                column: name.to_string(),
                header_row: self.header_row,
            })
    }

    /// Drop subtotal rows (any cell's text contains `subtotal_marker`) and fully blank rows, then
    /// fill every empty cell from the nearest preceding row.
    pub fn preprocess(&mut self, subtotal_marker: &str) -> PreprocessStats {
        let mut stats = PreprocessStats {
            rows_read: self.rows.len(),
            ..PreprocessStats::default()
        };

        self.rows.retain(|row| {
            if !subtotal_marker.is_empty()
                && row
                    .cells
                    .iter()
                    .any(|c| c.display_text().contains(subtotal_marker))
            {
                log::debug!("dropping subtotal row {}", row.sheet_row);
                stats.subtotal_rows += 1;
                return false;
            }
            if row.is_blank() {
                stats.blank_rows += 1;
                return false;
            }
            true
        });

        let width = self.headers.len();
        let mut last: Vec<CellValue> = vec![CellValue::Empty; width];
        for row in &mut self.rows {
            row.cells.resize(width.max(row.cells.len()), CellValue::Empty);
            for (col, cell) in row.cells.iter_mut().enumerate() {
                if cell.is_empty() {
                    if let Some(prev) = last.get(col) {
                        *cell = prev.clone();
                    }
                } else if let Some(slot) = last.get_mut(col) {
                    *slot = cell.clone();
                }
            }
        }

        stats
    }
}

/// Header labels; blanks become `Unnamed: <col>` and repeats get `.1`, `.2` suffixes.
fn header_names(raw: &[CellValue], width: usize) -> Vec<String> {
    let mut seen: HashMap<String, usize> = HashMap::new();
    (0..width)
        .map(|col| {
            let text = raw.get(col).map(CellValue::display_text).unwrap_or_default();
            let base = if text.trim().is_empty() {
                format!("Unnamed: {col}")
            } else {
                text
            };
            let count = seen.entry(base.clone()).or_insert(0);
            let name = if *count == 0 {
                base
            } else {
                format!("{base}.{count}")
            };
            *count += 1;
            name
        })
        .collect()
}

fn range_to_grid(range: &Range<Data>) -> Vec<Vec<CellValue>> {
    let Some((row_offset, col_offset)) = range.start() else {
        return Vec::new();
    };
    let (row_offset, col_offset) = (row_offset as usize, col_offset as usize);
    let mut grid: Vec<Vec<CellValue>> = vec![Vec::new(); row_offset];
    for row in range.rows() {
        let mut cells = vec![CellValue::Empty; col_offset];
        cells.extend(row.iter().map(data_to_value));
        grid.push(cells);
    }
    grid
}

fn data_to_value(data: &Data) -> CellValue {
    match data {
        Data::Empty => CellValue::Empty,
        Data::String(s) if s.is_empty() => CellValue::Empty,
        Data::String(s) => CellValue::String(s.clone()),
        Data::Float(f) => CellValue::Number(*f),
        Data::Int(i) => CellValue::Number(*i as f64),
        Data::Bool(b) => CellValue::Boolean(*b),
        Data::Error(e) => CellValue::Error(e.to_string()),
        Data::DateTime(dt) => dt
            .as_datetime()
            .or_else(|| serial_to_datetime(dt.as_f64()))
            .map(CellValue::DateTime)
            .unwrap_or(CellValue::Number(dt.as_f64())),
        Data::DateTimeIso(s) => parse_iso_datetime(s)
            .map(CellValue::DateTime)
            .unwrap_or_else(|| CellValue::String(s.clone())),
        other => CellValue::String(other.to_string()),
    }
}

fn parse_iso_datetime(s: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .or_else(|| {
            chrono::NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn s(text: &str) -> CellValue {
        CellValue::from(text)
    }

    fn grid() -> Vec<Vec<CellValue>> {
        vec![
            vec![s("Relatório")],
            vec![],
            vec![s("Número da Nota de Empenho"), CellValue::Empty, s("Valor"), s("Valor")],
            vec![s("2025NE000001"), s("a"), CellValue::Number(1.0)],
            vec![CellValue::Empty, CellValue::Empty, CellValue::Number(2.0)],
            vec![],
            vec![s("Total Geral"), CellValue::Empty, CellValue::Number(3.0)],
            vec![s("2025NE000002"), CellValue::Empty, CellValue::Empty, s("x")],
        ]
    }

    #[test]
    fn names_blank_and_duplicate_headers() {
        let table = UpdateTable::from_grid(grid(), 3);
        assert_eq!(
            table.headers(),
            ["Número da Nota de Empenho", "Unnamed: 1", "Valor", "Valor.1"]
        );
        assert_eq!(table.column("Valor.1").unwrap(), 3);
        assert!(matches!(
            table.column("Métrica"),
            Err(ReconcileError::MissingColumn { column, header_row: 3 }) if column == "Métrica"
        ));
    }

    #[test]
    fn preprocess_drops_subtotals_and_blanks_then_fills_down() {
        let mut table = UpdateTable::from_grid(grid(), 3);
        let stats = table.preprocess("Total");
        assert_eq!(
            stats,
            PreprocessStats {
                rows_read: 5,
                subtotal_rows: 1,
                blank_rows: 1,
            }
        );

        let rows = table.rows();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[1].sheet_row, 5);
        assert_eq!(rows[1].get(0), &s("2025NE000001"));
        assert_eq!(rows[1].get(1), &s("a"));
        assert_eq!(rows[2].sheet_row, 8);
        assert_eq!(rows[2].get(1), &s("a"));
        assert_eq!(rows[2].get(2), &CellValue::Number(2.0));
        assert_eq!(rows[2].get(3), &s("x"));
    }

    #[test]
    fn maps_calamine_values() {
        assert_eq!(data_to_value(&Data::Int(7)), CellValue::Number(7.0));
        assert_eq!(data_to_value(&Data::String(String::new())), CellValue::Empty);
        assert_eq!(
            data_to_value(&Data::DateTimeIso("2025-03-04".to_string())),
            CellValue::DateTime(
                chrono::NaiveDate::from_ymd_opt(2025, 3, 4)
                    .unwrap()
                    .and_hms_opt(0, 0, 0)
                    .unwrap()
            )
        );
    }
}
