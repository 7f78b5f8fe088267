pub mod canonical;

pub use canonical::{CANONICAL_COLUMNS, CanonicalOptions, CanonicalTable, canonical_table, clean_id};

use crate::error::EngineResult;
use crate::model::{ErrorMap, StatementMap};
use serde::Serialize;

#[derive(Serialize)]
struct JsonExport<'a> {
    statements: &'a StatementMap,
    errors: &'a ErrorMap,
}

/// Statements and rendered errors, both keyed by A1 address.
pub fn to_json(statements: &StatementMap, errors: &ErrorMap) -> EngineResult<String> {
    Ok(serde_json::to_string_pretty(&JsonExport { statements, errors })?)
}
