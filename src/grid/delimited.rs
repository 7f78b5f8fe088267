use super::{Grid, classify_text};
use crate::error::{EngineError, EngineResult};
use csv::ReaderBuilder;
use std::path::Path;

/// Reads a CSV/TSV file into a grid. Every record is data; there is no
/// header row, and ragged records are allowed.
pub fn read_delimited(path: &Path, delimiter: u8) -> EngineResult<Grid> {
    let mut reader = ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(false)
        .flexible(true)
        .from_path(path)
        .map_err(|err| EngineError::source_unavailable(path, err))?;

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|err| EngineError::source_unavailable(path, err))?;
        rows.push(record.iter().map(classify_text).collect());
    }
    Ok(Grid::from_rows(rows))
}
