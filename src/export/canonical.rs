//! Fixed-column tabular projection of a statement set.

use crate::error::{EngineError, EngineResult};
use crate::mapping::{POINT_IN_TIME, STATED_IN};
use crate::model::{StatementMap, StatementValue};
use crate::resolver::{LabelResolver, label_or_id};
use csv::{Terminator, WriterBuilder};
use indexmap::{IndexMap, IndexSet};
use std::collections::HashMap;

pub const CANONICAL_COLUMNS: [&str; 23] = [
    "dataset_id",
    "variable_id",
    "variable",
    "main_subject",
    "main_subject_id",
    "value",
    "time",
    "time_precision",
    "country",
    "country_id",
    "country_cameo",
    "admin1",
    "admin2",
    "admin3",
    "region_coordinate",
    "stated_in",
    "stated_in_id",
    "stated in",
    "FactorClass",
    "Relevance",
    "Normalizer",
    "Units",
    "DocID",
];

#[derive(Debug, Clone, Default)]
pub struct CanonicalOptions {
    pub dataset_id: String,
    /// Subject id to CAMEO country code.
    pub cameos: HashMap<String, String>,
    /// Subject id to a region coordinate string.
    pub coordinates: HashMap<String, String>,
    /// Property id to `(column, value)` tags copied onto its rows.
    pub variable_tags: HashMap<String, Vec<(String, String)>>,
}

/// Header plus one row per statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanonicalTable {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl CanonicalTable {
    pub fn to_csv(&self) -> EngineResult<String> {
        let mut writer = WriterBuilder::new()
            .terminator(Terminator::Any(b'\n'))
            .from_writer(Vec::new());
        let csv_error = |err: csv::Error| EngineError::Io(std::io::Error::other(err));
        writer.write_record(&self.columns).map_err(csv_error)?;
        for row in &self.rows {
            writer.write_record(row).map_err(csv_error)?;
        }
        let bytes = writer
            .into_inner()
            .map_err(|err| EngineError::Io(std::io::Error::other(err.to_string())))?;
        String::from_utf8(bytes).map_err(|err| EngineError::Io(std::io::Error::other(err)))
    }
}

/// Projects statements onto [`CANONICAL_COLUMNS`] plus ad-hoc qualifier
/// columns, appended in the order they are first seen.
pub fn canonical_table(
    statements: &StatementMap,
    labels: Option<&dyn LabelResolver>,
    options: &CanonicalOptions,
) -> CanonicalTable {
    let mut extra_columns: IndexSet<String> = IndexSet::new();
    let mut records: Vec<IndexMap<String, String>> = Vec::with_capacity(statements.len());
    let mut label_memo: HashMap<String, String> = HashMap::new();
    let mut label = |id: &str| {
        label_memo
            .entry(id.to_string())
            .or_insert_with(|| label_or_id(labels, id))
            .clone()
    };

    for statement in statements.values() {
        let mut record: IndexMap<String, String> = IndexMap::new();
        let variable = label(&statement.property);
        let subject_label = label(&statement.subject);

        record.insert("dataset_id".into(), options.dataset_id.clone());
        record.insert("variable_id".into(), clean_id(&variable));
        record.insert("variable".into(), variable);
        record.insert("main_subject".into(), subject_label);
        record.insert("main_subject_id".into(), statement.subject.clone());
        record.insert("value".into(), statement.value.display());
        record.insert("country_id".into(), statement.subject.clone());
        if let Some(cameo) = options.cameos.get(&statement.subject) {
            record.insert("country_cameo".into(), cameo.clone());
        }
        if let Some(coordinate) = options.coordinates.get(&statement.subject) {
            record.insert("region_coordinate".into(), coordinate.clone());
        }
        if let StatementValue::Quantity {
            unit: Some(unit), ..
        } = &statement.value
        {
            record.insert("Units".into(), label(unit));
        }
        if let Some(time) = &statement.time {
            record.insert("time".into(), time.clone());
        }
        if let Some(precision) = statement.time_precision {
            record.insert("time_precision".into(), precision.to_string());
        }
        if let Some(stated_in) = &statement.stated_in {
            let stated_label = label(stated_in);
            record.insert("stated_in_id".into(), stated_in.clone());
            record.insert("stated_in".into(), stated_label.clone());
            record.insert("stated in".into(), stated_label);
        }

        for qualifier in &statement.qualifiers {
            // Intrinsic fields are already filled from the statement itself.
            if qualifier.property == POINT_IN_TIME || qualifier.property == STATED_IN {
                continue;
            }
            let column = label(&qualifier.property);
            let value = match &qualifier.value {
                StatementValue::Item { id } => label(id),
                other => other.display(),
            };
            add_column(&mut extra_columns, &column);
            record.insert(column, value);
        }

        if let Some(tags) = options.variable_tags.get(&statement.property) {
            for (column, value) in tags {
                add_column(&mut extra_columns, column);
                record.insert(column.clone(), value.clone());
            }
        }
        records.push(record);
    }

    let columns: Vec<String> = CANONICAL_COLUMNS
        .iter()
        .map(|column| column.to_string())
        .chain(extra_columns)
        .collect();
    let rows = records
        .into_iter()
        .map(|mut record| {
            columns
                .iter()
                .map(|column| record.swap_remove(column).unwrap_or_default())
                .collect()
        })
        .collect();
    CanonicalTable { columns, rows }
}

fn add_column(extra: &mut IndexSet<String>, column: &str) {
    if !CANONICAL_COLUMNS.contains(&column) {
        extra.insert(column.to_string());
    }
}

/// Label reduced to `[A-Za-z0-9_]`, runs of anything else collapsed to `_`.
pub fn clean_id(label: &str) -> String {
    let mut out = String::with_capacity(label.len());
    for ch in label.trim().chars() {
        if ch.is_ascii_alphanumeric() || ch == '_' {
            out.push(ch);
        } else if !out.ends_with('_') {
            out.push('_');
        }
    }
    out.trim_matches('_').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clean_id_collapses_punctuation() {
        assert_eq!(clean_id("population (total)"), "population_total");
        assert_eq!(clean_id("GDP, PPP"), "GDP_PPP");
        assert_eq!(clean_id(""), "");
    }
}
