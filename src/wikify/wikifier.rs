use super::item_table::{ItemRow, ItemTable, OverwriteReport};
use crate::error::{EngineError, EngineResult};
use crate::utils::{column_letter_to_index, write_atomic};
use csv::{ReaderBuilder, StringRecord};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

const REQUIRED_COLUMNS: [&str; 5] = ["column", "row", "value", "context", "item"];

/// Where a batch of item rows came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum WikifierSource {
    File { path: PathBuf },
    Rows { count: usize },
}

/// A row tagged with the context it belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextRow {
    #[serde(default)]
    pub context: String,
    #[serde(flatten)]
    pub row: ItemRow,
}

/// Builds an [`ItemTable`] from override sources applied in call order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Wikifier {
    sources: Vec<WikifierSource>,
    item_table: ItemTable,
}

impl Wikifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn item_table(&self) -> &ItemTable {
        &self.item_table
    }

    pub fn into_item_table(self) -> ItemTable {
        self.item_table
    }

    pub fn sources(&self) -> &[WikifierSource] {
        &self.sources
    }

    /// Applies a wikifier CSV with `column,row,value,context,item` headers.
    /// Other columns (labels, descriptions) are ignored.
    pub fn add_file(&mut self, path: &Path) -> EngineResult<OverwriteReport> {
        let rows = read_wikifier_csv(path)?;
        let report = self.apply(rows)?;
        self.sources.push(WikifierSource::File {
            path: path.to_path_buf(),
        });
        tracing::info!(
            path = %path.display(),
            overwritten = report.len(),
            "wikifier file applied"
        );
        Ok(report)
    }

    pub fn add_rows<I>(&mut self, rows: I) -> EngineResult<OverwriteReport>
    where
        I: IntoIterator<Item = ContextRow>,
    {
        let rows: Vec<ContextRow> = rows.into_iter().collect();
        let count = rows.len();
        let report = self.apply(rows)?;
        self.sources.push(WikifierSource::Rows { count });
        Ok(report)
    }

    /// Merges into a copy so a failure in any context leaves the table as it was.
    fn apply(&mut self, rows: Vec<ContextRow>) -> EngineResult<OverwriteReport> {
        let mut by_context: IndexMap<String, Vec<(usize, ItemRow)>> = IndexMap::new();
        for (index, ContextRow { context, row }) in rows.into_iter().enumerate() {
            by_context
                .entry(context.trim().to_string())
                .or_default()
                .push((index, row));
        }

        let mut table = self.item_table.clone();
        let mut report = OverwriteReport::default();
        for (context, rows) in by_context {
            let (indices, rows): (Vec<usize>, Vec<ItemRow>) = rows.into_iter().unzip();
            let merged = table.merge_from(rows, &context).map_err(|err| match err {
                EngineError::InvalidItemRow { index, reason } => EngineError::InvalidItemRow {
                    index: indices.get(index).copied().unwrap_or(index),
                    reason,
                },
                other => other,
            })?;
            report.extend(merged);
        }
        self.item_table = table;
        Ok(report)
    }

    pub fn save(&self, path: &Path) -> EngineResult<()> {
        let bytes = serde_json::to_vec_pretty(self)?;
        write_atomic(path, &bytes)?;
        Ok(())
    }

    pub fn load(path: &Path) -> EngineResult<Self> {
        let bytes = fs::read(path).map_err(|err| EngineError::source_unavailable(path, err))?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

fn read_wikifier_csv(path: &Path) -> EngineResult<Vec<ContextRow>> {
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(|err| EngineError::source_unavailable(path, err))?;

    let headers = reader
        .headers()
        .map_err(|err| EngineError::source_unavailable(path, err))?
        .clone();
    let mut positions = [0usize; 5];
    for (slot, name) in positions.iter_mut().zip(REQUIRED_COLUMNS) {
        *slot = headers
            .iter()
            .position(|header| header.eq_ignore_ascii_case(name))
            .ok_or_else(|| {
                EngineError::source_unavailable(path, format!("missing column '{name}'"))
            })?;
    }
    let [column_at, row_at, value_at, context_at, item_at] = positions;

    let mut rows = Vec::new();
    for (index, record) in reader.records().enumerate() {
        let record = record.map_err(|err| EngineError::source_unavailable(path, err))?;
        let get = |at: usize| field(&record, at);
        let column = match get(column_at) {
            Some(raw) => Some(parse_column(raw).ok_or_else(|| EngineError::InvalidItemRow {
                index,
                reason: format!("invalid column '{raw}'"),
            })?),
            None => None,
        };
        let row = match get(row_at) {
            Some(raw) => Some(parse_index(raw).ok_or_else(|| EngineError::InvalidItemRow {
                index,
                reason: format!("invalid row '{raw}'"),
            })?),
            None => None,
        };
        rows.push(ContextRow {
            context: get(context_at).unwrap_or_default().to_string(),
            row: ItemRow {
                column,
                row,
                value: get(value_at).map(str::to_string),
                item: get(item_at).unwrap_or_default().to_string(),
            },
        });
    }
    Ok(rows)
}

fn field(record: &StringRecord, at: usize) -> Option<&str> {
    record.get(at).map(str::trim).filter(|raw| !raw.is_empty())
}

/// Zero-based index, tolerating a trailing `.0` from float-typed exports.
fn parse_index(raw: &str) -> Option<u32> {
    raw.strip_suffix(".0").unwrap_or(raw).parse().ok()
}

fn parse_column(raw: &str) -> Option<u32> {
    parse_index(raw).or_else(|| column_letter_to_index(raw))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn column_accepts_index_or_letter() {
        assert_eq!(parse_column("2"), Some(2));
        assert_eq!(parse_column("2.0"), Some(2));
        assert_eq!(parse_column("C"), Some(2));
        assert_eq!(parse_column("2x"), None);
    }
}
