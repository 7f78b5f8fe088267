//! Priority-ordered lookup from cell position and value to item identifiers.
//!
//! Entries are partitioned by context. Within a context each entry is keyed
//! by which of (column, row, value) it pins down; the unpinned parts match
//! anything. A query walks [`KeyShape::RESOLUTION_ORDER`] from the most to
//! the least specific shape and returns the first hit.

use crate::error::{EngineError, EngineResult};
use crate::utils::{sha256_hex, to_excel};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyShape {
    ColumnRowValue,
    ColumnRow,
    ColumnValue,
    Column,
    RowValue,
    Row,
    Value,
}

impl KeyShape {
    pub const RESOLUTION_ORDER: [KeyShape; 7] = [
        KeyShape::ColumnRowValue,
        KeyShape::ColumnRow,
        KeyShape::ColumnValue,
        KeyShape::Column,
        KeyShape::RowValue,
        KeyShape::Row,
        KeyShape::Value,
    ];

    /// Shape of a key with the given parts set. `None` when nothing is set.
    pub fn of(column: bool, row: bool, value: bool) -> Option<KeyShape> {
        match (column, row, value) {
            (true, true, true) => Some(KeyShape::ColumnRowValue),
            (true, true, false) => Some(KeyShape::ColumnRow),
            (true, false, true) => Some(KeyShape::ColumnValue),
            (true, false, false) => Some(KeyShape::Column),
            (false, true, true) => Some(KeyShape::RowValue),
            (false, true, false) => Some(KeyShape::Row),
            (false, false, true) => Some(KeyShape::Value),
            (false, false, false) => None,
        }
    }

    fn uses_column(self) -> bool {
        matches!(
            self,
            KeyShape::ColumnRowValue
                | KeyShape::ColumnRow
                | KeyShape::ColumnValue
                | KeyShape::Column
        )
    }

    fn uses_row(self) -> bool {
        matches!(
            self,
            KeyShape::ColumnRowValue | KeyShape::ColumnRow | KeyShape::RowValue | KeyShape::Row
        )
    }

    fn uses_value(self) -> bool {
        matches!(
            self,
            KeyShape::ColumnRowValue | KeyShape::ColumnValue | KeyShape::RowValue | KeyShape::Value
        )
    }

    /// Projects a fully specified query onto this shape. `None` when the
    /// shape needs a value and the query value is empty.
    fn project(self, column: u32, row: u32, value: &str) -> Option<LookupKey> {
        if self.uses_value() && value.is_empty() {
            return None;
        }
        Some(LookupKey {
            column: self.uses_column().then_some(column),
            row: self.uses_row().then_some(row),
            value: self.uses_value().then(|| value.to_string()),
        })
    }
}

/// One exact key inside a context. Unset parts are wildcards.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LookupKey {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub column: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub row: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

impl LookupKey {
    pub fn shape(&self) -> Option<KeyShape> {
        KeyShape::of(
            self.column.is_some(),
            self.row.is_some(),
            self.value.is_some(),
        )
    }
}

impl fmt::Display for LookupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let column = match (self.column, self.row) {
            (Some(col), Some(row)) => to_excel(col, row),
            (Some(col), None) => format!("column {}", crate::utils::column_index_to_letter(col)),
            (None, Some(row)) => format!("row {}", u64::from(row) + 1),
            (None, None) => "any cell".to_string(),
        };
        match &self.value {
            Some(value) => write!(f, "{column} = '{value}'"),
            None => f.write_str(&column),
        }
    }
}

/// One row of an override source: position and/or value mapped to an item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemRow {
    #[serde(default)]
    pub column: Option<u32>,
    #[serde(default)]
    pub row: Option<u32>,
    #[serde(default)]
    pub value: Option<String>,
    pub item: String,
}

impl ItemRow {
    pub fn by_value(value: impl Into<String>, item: impl Into<String>) -> Self {
        Self {
            column: None,
            row: None,
            value: Some(value.into()),
            item: item.into(),
        }
    }

    pub fn at_cell(column: u32, row: u32, item: impl Into<String>) -> Self {
        Self {
            column: Some(column),
            row: Some(row),
            value: None,
            item: item.into(),
        }
    }

    fn key(&self) -> LookupKey {
        LookupKey {
            column: self.column,
            row: self.row,
            value: self
                .value
                .as_deref()
                .map(str::trim)
                .filter(|value| !value.is_empty())
                .map(str::to_string),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Overwrite {
    pub context: String,
    pub key: LookupKey,
    pub previous: String,
    pub replacement: String,
}

/// Keys a merge replaced. Empty when nothing was overwritten.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OverwriteReport {
    pub overwritten: Vec<Overwrite>,
}

impl OverwriteReport {
    pub fn is_empty(&self) -> bool {
        self.overwritten.is_empty()
    }

    pub fn len(&self) -> usize {
        self.overwritten.len()
    }

    pub fn extend(&mut self, other: OverwriteReport) {
        self.overwritten.extend(other.overwritten);
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
struct ContextTable {
    shapes: HashMap<KeyShape, HashMap<LookupKey, String>>,
}

impl ContextTable {
    fn is_empty(&self) -> bool {
        self.shapes.values().all(HashMap::is_empty)
    }

    fn get(&self, shape: KeyShape, key: &LookupKey) -> Option<&str> {
        self.shapes.get(&shape)?.get(key).map(String::as_str)
    }

    fn insert(&mut self, shape: KeyShape, key: LookupKey, item: String) -> Option<String> {
        self.shapes.entry(shape).or_default().insert(key, item)
    }
}

/// Context-partitioned item lookup table.
///
/// Serializes through [`ItemTableSnapshot`], a sorted flat list, so saved
/// tables and fingerprints are stable across runs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(into = "ItemTableSnapshot", try_from = "ItemTableSnapshot")]
pub struct ItemTable {
    contexts: HashMap<String, ContextTable>,
}

impl ItemTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has_context(&self, context: &str) -> bool {
        self.contexts
            .get(context)
            .is_some_and(|table| !table.is_empty())
    }

    pub fn contexts(&self) -> impl Iterator<Item = &str> {
        self.contexts.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.contexts
            .values()
            .flat_map(|table| table.shapes.values())
            .map(HashMap::len)
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn context(&self, context: &str) -> EngineResult<&ContextTable> {
        self.contexts
            .get(context)
            .filter(|table| !table.is_empty())
            .ok_or_else(|| EngineError::unknown_context(context))
    }

    /// Item for the cell at (column, row) holding `value`.
    ///
    /// `Ok(None)` means the context exists but no shape matched. An empty
    /// `value` only matches shapes that do not pin a value.
    pub fn resolve(
        &self,
        column: u32,
        row: u32,
        value: &str,
        context: &str,
    ) -> EngineResult<Option<String>> {
        let table = self.context(context)?;
        let value = value.trim();
        for shape in KeyShape::RESOLUTION_ORDER {
            let Some(key) = shape.project(column, row, value) else {
                continue;
            };
            if let Some(item) = table.get(shape, &key) {
                return Ok(Some(item.to_string()));
            }
        }
        Ok(None)
    }

    /// Value-only lookup that treats a miss as an error.
    pub fn resolve_by_value(&self, value: &str, context: &str) -> EngineResult<String> {
        self.lookup_by_value(value, context)?
            .ok_or_else(|| EngineError::ItemNotFound {
                context: context.to_string(),
                value: Some(value.to_string()),
            })
    }

    /// Value-only lookup; `Ok(None)` on a miss in an existing context.
    pub fn lookup_by_value(&self, value: &str, context: &str) -> EngineResult<Option<String>> {
        let table = self.context(context)?;
        let value = value.trim();
        if value.is_empty() {
            return Ok(None);
        }
        let key = LookupKey {
            column: None,
            row: None,
            value: Some(value.to_string()),
        };
        Ok(table.get(KeyShape::Value, &key).map(str::to_string))
    }

    /// Loads `rows` into `context`, last write wins.
    ///
    /// All rows are validated before anything is written, so a rejected
    /// merge leaves the table untouched.
    pub fn merge_from<I>(&mut self, rows: I, context: &str) -> EngineResult<OverwriteReport>
    where
        I: IntoIterator<Item = ItemRow>,
    {
        let mut staged = Vec::new();
        for (index, row) in rows.into_iter().enumerate() {
            let item = row.item.trim().to_string();
            if item.is_empty() {
                return Err(EngineError::InvalidItemRow {
                    index,
                    reason: "item definition missing".to_string(),
                });
            }
            let key = row.key();
            let Some(shape) = key.shape() else {
                return Err(EngineError::InvalidItemRow {
                    index,
                    reason: "row does not name a column, row or value".to_string(),
                });
            };
            staged.push((shape, key, item));
        }

        let table = self.contexts.entry(context.to_string()).or_default();
        let mut report = OverwriteReport::default();
        for (shape, key, item) in staged {
            if let Some(previous) = table.insert(shape, key.clone(), item.clone()) {
                report.overwritten.push(Overwrite {
                    context: context.to_string(),
                    key,
                    previous,
                    replacement: item,
                });
            }
        }

        if !report.is_empty() {
            tracing::warn!(
                context = context,
                overwritten = report.len(),
                "item table update overwrote existing entries"
            );
        }
        Ok(report)
    }

    pub fn snapshot(&self) -> ItemTableSnapshot {
        let mut entries: Vec<SnapshotEntry> = self
            .contexts
            .iter()
            .flat_map(|(context, table)| {
                table.shapes.values().flat_map(move |keys| {
                    keys.iter().map(move |(key, item)| SnapshotEntry {
                        context: context.clone(),
                        key: key.clone(),
                        item: item.clone(),
                    })
                })
            })
            .collect();
        entries.sort_by(|a, b| (&a.context, &a.key).cmp(&(&b.context, &b.key)));
        ItemTableSnapshot { entries }
    }

    /// Content hash; equal tables have equal fingerprints.
    pub fn fingerprint(&self) -> String {
        let snapshot = self.snapshot();
        let mut parts: Vec<Vec<u8>> = Vec::with_capacity(snapshot.entries.len() * 3);
        for entry in &snapshot.entries {
            parts.push(entry.context.as_bytes().to_vec());
            parts.push(entry.key.to_string().into_bytes());
            parts.push(entry.item.as_bytes().to_vec());
        }
        let borrowed: Vec<&[u8]> = parts.iter().map(Vec::as_slice).collect();
        sha256_hex(&borrowed)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotEntry {
    pub context: String,
    #[serde(flatten)]
    pub key: LookupKey,
    pub item: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemTableSnapshot {
    pub entries: Vec<SnapshotEntry>,
}

impl From<ItemTable> for ItemTableSnapshot {
    fn from(table: ItemTable) -> Self {
        table.snapshot()
    }
}

impl TryFrom<ItemTableSnapshot> for ItemTable {
    type Error = String;

    fn try_from(snapshot: ItemTableSnapshot) -> Result<Self, Self::Error> {
        let mut table = ItemTable::new();
        for entry in snapshot.entries {
            let shape = entry
                .key
                .shape()
                .ok_or_else(|| format!("entry for '{}' has an empty key", entry.item))?;
            table
                .contexts
                .entry(entry.context)
                .or_default()
                .insert(shape, entry.key, entry.item);
        }
        Ok(table)
    }
}
