//! Parsed sheets as immutable row/column grids.

mod delimited;
mod workbook;

use crate::error::{BoundsError, EngineError, EngineResult};
use crate::model::{CellCoord, CellValue, format_number};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::path::Path;

pub use delimited::read_delimited;
pub use workbook::read_workbook;

/// Rectangular table of cells; `None` is an empty cell.
///
/// Rows shorter than the widest row are padded on construction, so every
/// in-bounds coordinate is addressable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "GridRows")]
pub struct Grid {
    rows: Vec<Vec<Option<CellValue>>>,
    columns: usize,
}

#[derive(Deserialize)]
struct GridRows {
    rows: Vec<Vec<Option<CellValue>>>,
}

impl From<GridRows> for Grid {
    fn from(raw: GridRows) -> Self {
        Grid::from_rows(raw.rows)
    }
}

impl Grid {
    pub fn from_rows(mut rows: Vec<Vec<Option<CellValue>>>) -> Self {
        let columns = rows.iter().map(Vec::len).max().unwrap_or(0);
        for row in &mut rows {
            row.resize(columns, None);
        }
        Self { rows, columns }
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn column_count(&self) -> usize {
        self.columns
    }

    pub fn contains(&self, coord: CellCoord) -> bool {
        (coord.row as usize) < self.rows.len() && (coord.column as usize) < self.columns
    }

    pub fn check(&self, coord: CellCoord) -> Result<(), BoundsError> {
        if self.contains(coord) {
            Ok(())
        } else {
            Err(BoundsError {
                coord,
                rows: self.rows.len(),
                columns: self.columns,
            })
        }
    }

    /// Cell at (row, column); `Ok(None)` for an empty in-bounds cell.
    pub fn get(&self, row: usize, column: usize) -> Result<Option<&CellValue>, BoundsError> {
        self.cell(CellCoord::new(column as u32, row as u32))
    }

    pub fn cell(&self, coord: CellCoord) -> Result<Option<&CellValue>, BoundsError> {
        self.check(coord)?;
        Ok(self.rows[coord.row as usize][coord.column as usize].as_ref())
    }

    /// Lookup text of a cell, empty string for an empty cell.
    pub fn text(&self, coord: CellCoord) -> Result<String, BoundsError> {
        Ok(self
            .cell(coord)?
            .map(CellValue::as_lookup_text)
            .unwrap_or_default())
    }

    pub fn rows(&self) -> impl Iterator<Item = &[Option<CellValue>]> {
        self.rows.iter().map(Vec::as_slice)
    }
}

/// Anything that can turn a file into named grids.
pub trait GridSource: Send + Sync {
    /// All sheets of `path`, in workbook order.
    fn load(&self, path: &Path) -> EngineResult<IndexMap<String, Grid>>;
}

/// Dispatches on file extension: delimited text or an XLSX workbook.
#[derive(Debug, Clone, Copy, Default)]
pub struct FileGridSource;

impl GridSource for FileGridSource {
    fn load(&self, path: &Path) -> EngineResult<IndexMap<String, Grid>> {
        if !path.is_file() {
            return Err(EngineError::source_unavailable(path, "file does not exist"));
        }
        let ext = path
            .extension()
            .and_then(|os| os.to_str())
            .unwrap_or("")
            .to_ascii_lowercase();
        match ext.as_str() {
            "csv" => single_sheet(path, read_delimited(path, b',')?),
            "tsv" => single_sheet(path, read_delimited(path, b'\t')?),
            "xlsx" | "xlsm" => read_workbook(path),
            other => Err(EngineError::source_unavailable(
                path,
                format!("unsupported file extension '{other}'"),
            )),
        }
    }
}

/// A delimited file holds one sheet, named after the file.
fn single_sheet(path: &Path, grid: Grid) -> EngineResult<IndexMap<String, Grid>> {
    let name = path
        .file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_else(|| "sheet".to_string());
    let mut sheets = IndexMap::new();
    sheets.insert(name, grid);
    Ok(sheets)
}

/// Cell text to a typed value; blank text is an empty cell.
///
/// Text only becomes a number when the number renders back to the same
/// text, so codes like `02139` or `1.50` keep their spelling.
pub(crate) fn classify_text(raw: &str) -> Option<CellValue> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    match trimmed.parse::<f64>() {
        Ok(number) if number.is_finite() && format_number(number) == trimmed => {
            Some(CellValue::Number(number))
        }
        _ => Some(CellValue::Text(raw.to_string())),
    }
}

/// Text cell that never becomes a number; blank text is an empty cell.
pub(crate) fn text_cell(raw: &str) -> Option<CellValue> {
    (!raw.trim().is_empty()).then(|| CellValue::Text(raw.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_rows_are_padded() {
        let grid = Grid::from_rows(vec![
            vec![Some(CellValue::Text("a".into()))],
            vec![None, None, Some(CellValue::Number(3.0))],
        ]);
        assert_eq!(grid.column_count(), 3);
        assert_eq!(grid.get(0, 2), Ok(None));
        assert_eq!(grid.get(1, 2), Ok(Some(&CellValue::Number(3.0))));
    }

    #[test]
    fn out_of_bounds_names_the_coordinate() {
        let grid = Grid::from_rows(vec![vec![None, None]]);
        let err = grid.get(4, 1).unwrap_err();
        assert_eq!(err.coord, CellCoord::new(1, 4));
        assert!(err.to_string().contains("B5"));
    }

    #[test]
    fn classify_text_types_cells() {
        assert_eq!(classify_text("  "), None);
        assert_eq!(classify_text("12"), Some(CellValue::Number(12.0)));
        assert_eq!(classify_text("NaN"), Some(CellValue::Text("NaN".into())));
        assert_eq!(classify_text("Chad"), Some(CellValue::Text("Chad".into())));
        assert_eq!(classify_text("-2.5"), Some(CellValue::Number(-2.5)));
    }

    #[test]
    fn non_canonical_numerals_stay_text() {
        for raw in ["02139", "007", "1.50", "+5", "1e3"] {
            assert_eq!(classify_text(raw), Some(CellValue::Text(raw.into())), "{raw}");
        }
        assert_eq!(text_cell("42"), Some(CellValue::Text("42".into())));
        assert_eq!(text_cell(" "), None);
    }
}
