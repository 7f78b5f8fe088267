//! Error taxonomy for the statement engine
//!
//! Two families live here:
//! - [`EngineError`]: configuration-level failures that abort an operation
//!   and surface to the caller (missing source, unknown item context, ...).
//! - [`CellError`]: per-cell failures collected during a generation pass.
//!   These never abort; they are returned next to the statements that did
//!   resolve.
//!
//! User-facing text for per-cell errors is produced in one place,
//! [`CellErrorKind::message`], when the error crosses a serialization or
//! export boundary.

use crate::annotation::ValueType;
use crate::model::CellCoord;
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

pub type EngineResult<T> = std::result::Result<T, EngineError>;

/// A coordinate outside the loaded grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error(
    "cell {coord} is outside the bounds of the current data file \
     ({rows} rows x {columns} columns)"
)]
pub struct BoundsError {
    pub coord: CellCoord,
    pub rows: usize,
    pub columns: usize,
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Bounds(#[from] BoundsError),

    #[error("source {} is unavailable: {reason}", .path.display())]
    SourceUnavailable { path: PathBuf, reason: String },

    #[error("sheet '{sheet}' not found in {}", .path.display())]
    SheetNotFound { path: PathBuf, sheet: String },

    #[error("failed to write cache artifact {}: {reason}", .path.display())]
    CacheWrite { path: PathBuf, reason: String },

    #[error("{}", describe_item_miss(.context, .value.as_deref()))]
    ItemNotFound {
        context: String,
        value: Option<String>,
    },

    #[error("invalid item table row {index}: {reason}")]
    InvalidItemRow { index: usize, reason: String },

    #[error("invalid annotation: {0}")]
    InvalidAnnotation(String),

    #[error("resolver failure: {0}")]
    Resolver(#[from] ResolverError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("background task failed: {0}")]
    Task(String),
}

fn describe_item_miss(context: &str, value: Option<&str>) -> String {
    match value {
        Some(value) => format!("could not find item for value '{value}' in context '{context}'"),
        None => format!("no values defined for context '{context}'"),
    }
}

impl EngineError {
    pub fn source_unavailable(path: impl Into<PathBuf>, reason: impl fmt::Display) -> Self {
        EngineError::SourceUnavailable {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    pub fn unknown_context(context: &str) -> Self {
        EngineError::ItemNotFound {
            context: context.to_string(),
            value: None,
        }
    }

    /// Stable category name used for metrics labels and log fields.
    pub fn category(&self) -> &'static str {
        match self {
            EngineError::Bounds(_) => "bounds",
            EngineError::SourceUnavailable { .. } | EngineError::SheetNotFound { .. } => {
                "source_unavailable"
            }
            EngineError::CacheWrite { .. } => "cache_write",
            EngineError::ItemNotFound { .. } => "item_not_found",
            EngineError::InvalidItemRow { .. } | EngineError::InvalidAnnotation(_) => {
                "validation_error"
            }
            EngineError::Resolver(_) => "resolver_error",
            EngineError::Io(_) => "io_error",
            EngineError::Serialization(_) => "serialization_error",
            EngineError::Task(_) => "internal_error",
        }
    }
}

/// Failure reported by a property-type or label collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolverError {
    #[error("identifier '{0}' not found")]
    NotFound(String),
    #[error("identifier '{0}' is not a valid entity id")]
    InvalidIdentifier(String),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("unexpected response: {0}")]
    Response(String),
    #[error("unsupported property type '{0}'")]
    UnsupportedType(String),
}

/// Which part of a statement a cell error belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum StatementField {
    Subject,
    Property,
    Value,
    Unit,
    Qualifier,
    Reference,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// The statement for this cell was not emitted.
    Error,
    /// The statement was emitted without the failing part.
    Warning,
}

/// Closed set of per-cell failure kinds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, strum::IntoStaticStr)]
#[serde(tag = "kind", rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum CellErrorKind {
    MissingSubject {
        subject_cell: Option<CellCoord>,
        lookup: Option<String>,
    },
    PropertyNotFound {
        property_cell: Option<CellCoord>,
        lookup: Option<String>,
    },
    TypeMismatch {
        expected: ValueType,
        found: String,
        detail: String,
    },
    ItemUnresolved {
        value: String,
        context: String,
    },
    PropertyTypeUnavailable {
        property: String,
        reason: String,
    },
    EmptyCell,
}

impl CellErrorKind {
    pub fn name(&self) -> &'static str {
        self.into()
    }

    pub fn message(&self) -> String {
        match self {
            CellErrorKind::MissingSubject {
                subject_cell: None, ..
            } => "no subject region covers this cell".to_string(),
            CellErrorKind::MissingSubject {
                subject_cell: Some(cell),
                lookup,
            } => format!(
                "subject cell {cell} ({}) did not resolve to an item",
                lookup.as_deref().unwrap_or("empty")
            ),
            CellErrorKind::PropertyNotFound {
                property_cell: None, ..
            } => "no property is declared for this cell".to_string(),
            CellErrorKind::PropertyNotFound {
                property_cell: Some(cell),
                lookup,
            } => format!(
                "property cell {cell} ({}) did not resolve to a property",
                lookup.as_deref().unwrap_or("empty")
            ),
            CellErrorKind::TypeMismatch {
                expected,
                found,
                detail,
            } => format!("expected a {expected} value but found '{found}': {detail}"),
            CellErrorKind::ItemUnresolved { value, context } => {
                format!("no item found for '{value}' in context '{context}'")
            }
            CellErrorKind::PropertyTypeUnavailable { property, reason } => {
                format!("could not determine the type of property {property}: {reason}")
            }
            CellErrorKind::EmptyCell => "cell is empty".to_string(),
        }
    }
}

/// One failure recorded against one cell during generation.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CellError {
    pub field: StatementField,
    #[serde(flatten)]
    pub kind: CellErrorKind,
}

impl CellError {
    pub fn new(field: StatementField, kind: CellErrorKind) -> Self {
        Self { field, kind }
    }

    pub fn severity(&self) -> Severity {
        if matches!(self.kind, CellErrorKind::EmptyCell) {
            return Severity::Warning;
        }
        match self.field {
            StatementField::Subject | StatementField::Property | StatementField::Value => {
                Severity::Error
            }
            _ => Severity::Warning,
        }
    }

    pub fn message(&self) -> String {
        self.kind.message()
    }
}

impl fmt::Display for CellError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.kind.message())
    }
}

// The rendered message and severity are attached on the way out; they are
// derived from the kind and therefore skipped when reading artifacts back.
impl Serialize for CellError {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        #[derive(Serialize)]
        struct Rendered<'a> {
            field: StatementField,
            #[serde(flatten)]
            kind: &'a CellErrorKind,
            severity: Severity,
            message: String,
        }
        Rendered {
            field: self.field,
            kind: &self.kind,
            severity: self.severity(),
            message: self.kind.message(),
        }
        .serialize(serializer)
    }
}
