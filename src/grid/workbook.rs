use super::{Grid, classify_text, text_cell};
use crate::error::{EngineError, EngineResult};
use crate::model::CellValue;
use indexmap::IndexMap;
use std::path::Path;
use umya_spreadsheet::{Cell, CellRawValue, Worksheet};
use umya_spreadsheet::reader::xlsx;

/// Reads every worksheet of an XLSX workbook, in workbook order.
pub fn read_workbook(path: &Path) -> EngineResult<IndexMap<String, Grid>> {
    let book = xlsx::read(path).map_err(|err| EngineError::source_unavailable(path, err))?;
    let mut sheets = IndexMap::new();
    for sheet in book.get_sheet_collection() {
        sheets.insert(sheet.get_name().to_string(), sheet_to_grid(sheet));
    }
    Ok(sheets)
}

fn sheet_to_grid(sheet: &Worksheet) -> Grid {
    let (max_col, max_row) = sheet.get_highest_column_and_row();
    let mut rows: Vec<Vec<Option<CellValue>>> = Vec::with_capacity(max_row as usize);
    for row in 1..=max_row {
        let mut cells = Vec::with_capacity(max_col as usize);
        for col in 1..=max_col {
            let value = sheet.get_cell((col, row)).and_then(cell_value);
            cells.push(value);
        }
        rows.push(cells);
    }
    Grid::from_rows(rows)
}

/// Typed value of a workbook cell, following the cell's stored data type.
fn cell_value(cell: &Cell) -> Option<CellValue> {
    match cell.get_raw_value() {
        CellRawValue::Numeric(number) if number.is_finite() => Some(CellValue::Number(*number)),
        CellRawValue::Empty => None,
        CellRawValue::Lazy(raw) => classify_text(raw),
        _ => text_cell(&cell.get_value()),
    }
}
