//! Annotation-driven statement generation.
//!
//! One pass walks the data region row-major, resolves subject, property,
//! value, qualifiers and references for each cell, and collects per-cell
//! errors next to the statements that did resolve. Only configuration-level
//! problems (a region outside the grid, an unknown item-table context) end
//! the pass early.

use crate::annotation::{
    Annotation, DEFAULT_CONTEXT, Region, SUBJECT_CONTEXT, Source, UNIT_CONTEXT, ValueType,
};
use crate::config::EngineConfig;
use crate::error::{
    CellError, CellErrorKind, EngineError, EngineResult, ResolverError, StatementField,
};
use crate::grid::Grid;
use crate::log_slow_operation;
use crate::mapping::values::{parse_coordinate, parse_quantity, parse_time};
use crate::metrics::METRICS;
use crate::model::{
    CellCoord, CellValue, ErrorMap, QualifierEntry, ReferenceEntry, Statement, StatementMap,
    StatementValue,
};
use crate::resolver::{PropertyTypeResolver, is_entity_id, is_property_id};
use crate::utils::sha256_hex;
use crate::wikify::ItemTable;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

pub const POINT_IN_TIME: &str = "P585";
pub const STATED_IN: &str = "P248";

const SLOW_PASS_MS: u64 = 2_000;

/// Positions `[start, end)` within the data region's active cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Window {
    pub start: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<usize>,
}

impl Window {
    pub const ALL: Window = Window {
        start: 0,
        end: None,
    };

    pub fn new(start: usize, end: usize) -> Self {
        Self {
            start,
            end: Some(end),
        }
    }

    pub fn is_full(&self) -> bool {
        self.start == 0 && self.end.is_none()
    }

    fn len(&self) -> usize {
        self.end
            .map(|end| end.saturating_sub(self.start))
            .unwrap_or(usize::MAX)
    }
}

impl Default for Window {
    fn default() -> Self {
        Window::ALL
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationMetadata {
    pub window: Window,
    /// Active (non-skipped) cells in the data region.
    pub region_cells: usize,
    pub visited: usize,
    pub statements: usize,
    pub error_cells: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationResult {
    pub statements: StatementMap,
    pub errors: ErrorMap,
    pub metadata: GenerationMetadata,
}

pub struct StatementGenerator {
    warn_for_empty_cells: bool,
    type_resolver: Option<Arc<dyn PropertyTypeResolver>>,
}

impl StatementGenerator {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            warn_for_empty_cells: config.warn_for_empty_cells,
            type_resolver: None,
        }
    }

    pub fn with_type_resolver(mut self, resolver: Arc<dyn PropertyTypeResolver>) -> Self {
        self.type_resolver = Some(resolver);
        self
    }

    /// Hash of the settings that change what a pass produces.
    pub fn fingerprint(&self) -> String {
        let resolver = self
            .type_resolver
            .as_ref()
            .map(|resolver| resolver.identity())
            .unwrap_or_default();
        let warn = if self.warn_for_empty_cells { "warn" } else { "quiet" };
        sha256_hex(&[warn.as_bytes(), resolver.as_bytes()])
    }

    pub fn generate(
        &self,
        annotation: &Annotation,
        grid: &Grid,
        item_table: &ItemTable,
        window: Window,
    ) -> EngineResult<GenerationResult> {
        let started = Instant::now();

        for (_, rect) in annotation.regions() {
            grid.check(rect.start)?;
            grid.check(rect.end)?;
        }

        let mut pass = Pass {
            annotation,
            grid,
            item_table,
            type_resolver: self.type_resolver.as_deref(),
            warn_for_empty_cells: self.warn_for_empty_cells,
            type_memo: HashMap::new(),
            statements: StatementMap::new(),
            errors: ErrorMap::new(),
        };

        let region_cells = annotation.data.active_cells().count();
        let mut visited = 0;
        for cell in annotation
            .data
            .active_cells()
            .skip(window.start)
            .take(window.len())
        {
            visited += 1;
            pass.visit(cell)?;
        }

        let Pass {
            statements, errors, ..
        } = pass;

        for cell_errors in errors.values() {
            for error in cell_errors {
                METRICS.record_cell_error(error.kind.name());
            }
        }
        let elapsed = started.elapsed();
        METRICS.record_generation(statements.len(), elapsed);
        log_slow_operation!(
            elapsed,
            SLOW_PASS_MS,
            statements = statements.len(),
            error_cells = errors.len(),
            "generation pass finished"
        );
        tracing::info!(
            region_cells,
            visited,
            statements = statements.len(),
            error_cells = errors.len(),
            window_start = window.start,
            window_end = ?window.end,
            "generated statements"
        );

        let metadata = GenerationMetadata {
            window,
            region_cells,
            visited,
            statements: statements.len(),
            error_cells: errors.len(),
        };
        Ok(GenerationResult {
            statements,
            errors,
            metadata,
        })
    }
}

/// State for one generation pass.
struct Pass<'a> {
    annotation: &'a Annotation,
    grid: &'a Grid,
    item_table: &'a ItemTable,
    type_resolver: Option<&'a dyn PropertyTypeResolver>,
    warn_for_empty_cells: bool,
    type_memo: HashMap<String, Result<ValueType, ResolverError>>,
    statements: StatementMap,
    errors: ErrorMap,
}

/// Outcome of resolving one part of a statement: the value, or the error
/// to record against the cell.
type Part<T> = Result<T, CellError>;

impl<'a> Pass<'a> {
    fn record(&mut self, cell: CellCoord, error: CellError) {
        self.errors.entry(cell).or_default().push(error);
    }

    fn visit(&mut self, cell: CellCoord) -> EngineResult<()> {
        let data = &self.annotation.data;
        let Some(value) = self.grid.cell(cell)?.cloned() else {
            if self.warn_for_empty_cells {
                self.record(cell, CellError::new(StatementField::Value, CellErrorKind::EmptyCell));
            }
            return Ok(());
        };

        let (subject, subject_cell) = match self.subject(cell)? {
            Ok(found) => found,
            Err(error) => {
                self.record(cell, error);
                return Ok(());
            }
        };

        let property = match self.property(data, cell, StatementField::Property)? {
            Ok(property) => property,
            Err(error) => {
                self.record(cell, error);
                return Ok(());
            }
        };

        let mut warnings = Vec::new();
        let value = match self.value(
            data,
            &property,
            cell,
            &value,
            StatementField::Value,
            &mut warnings,
        )? {
            Ok(value) => value,
            Err(error) => {
                self.record(cell, error);
                for warning in warnings {
                    self.record(cell, warning);
                }
                return Ok(());
            }
        };

        let mut statement = Statement {
            subject,
            subject_cell,
            property,
            value,
            time: None,
            time_precision: None,
            stated_in: None,
            qualifiers: Vec::new(),
            references: Vec::new(),
        };

        for region in &self.annotation.qualifiers {
            match self.attached(region, cell, StatementField::Qualifier, &mut warnings)? {
                Some((property, value, at)) => apply_qualifier(&mut statement, property, value, at),
                None => continue,
            }
        }
        for region in &self.annotation.references {
            if let Some((property, value, at)) =
                self.attached(region, cell, StatementField::Reference, &mut warnings)?
            {
                statement.references.push(ReferenceEntry {
                    property,
                    value,
                    cell: Some(at),
                });
            }
        }

        for warning in warnings {
            self.record(cell, warning);
        }
        self.statements.insert(cell, statement);
        Ok(())
    }

    fn subject(&self, cell: CellCoord) -> EngineResult<Part<(String, Option<CellCoord>)>> {
        let Some(region) = &self.annotation.subject else {
            return Ok(Err(missing_subject(None, None)));
        };
        let Some(at) = region.rect.aligned_with(cell) else {
            return Ok(Err(missing_subject(None, None)));
        };
        let text = self.grid.text(at)?;
        let context = region.context.as_deref().unwrap_or(SUBJECT_CONTEXT);
        match self.lookup(at, &text, context, is_entity_id)? {
            Some(id) => Ok(Ok((id, Some(at)))),
            None => Ok(Err(missing_subject(Some(at), non_empty(text)))),
        }
    }

    /// Property of `region` for `cell`, falling back to raw `P…` text.
    fn property(
        &self,
        region: &Region,
        cell: CellCoord,
        field: StatementField,
    ) -> EngineResult<Part<String>> {
        let not_found = |property_cell, lookup| {
            CellError::new(
                field,
                CellErrorKind::PropertyNotFound {
                    property_cell,
                    lookup,
                },
            )
        };
        match &region.property {
            Some(Source::Fixed(id)) => Ok(Ok(id.trim().to_string())),
            None => Ok(Err(not_found(None, None))),
            Some(Source::Region(lookup)) => {
                let Some(at) = lookup.rect.aligned_with(cell) else {
                    return Ok(Err(not_found(None, None)));
                };
                let text = self.grid.text(at)?;
                let context = lookup.context.as_deref().unwrap_or(DEFAULT_CONTEXT);
                match self.lookup(at, &text, context, is_property_id)? {
                    Some(id) => Ok(Ok(id)),
                    None => Ok(Err(not_found(Some(at), non_empty(text)))),
                }
            }
        }
    }

    /// Item-table lookup for the cell at `at`.
    ///
    /// Text that already is an identifier of the expected kind is used as is
    /// when the context has no entry for it. An absent context aborts the
    /// pass whatever the cell holds.
    fn lookup(
        &self,
        at: CellCoord,
        text: &str,
        context: &str,
        is_identifier: fn(&str) -> bool,
    ) -> EngineResult<Option<String>> {
        let found = self.item_table.resolve(at.column, at.row, text, context)?;
        Ok(found.or_else(|| is_identifier(text).then(|| text.to_string())))
    }

    fn value_type(
        &mut self,
        region: &Region,
        property: &str,
        field: StatementField,
    ) -> Part<ValueType> {
        if let Some(declared) = region.value_type {
            return Ok(declared);
        }
        let Some(resolver) = self.type_resolver else {
            return Ok(ValueType::String);
        };
        let answer = self
            .type_memo
            .entry(property.to_string())
            .or_insert_with(|| resolver.resolve_type(property));
        answer.clone().map_err(|err| {
            CellError::new(
                field,
                CellErrorKind::PropertyTypeUnavailable {
                    property: property.to_string(),
                    reason: err.to_string(),
                },
            )
        })
    }

    /// Typed value of the cell at `at` read through `region`'s settings.
    /// Non-fatal unit failures are pushed to `warnings`.
    fn value(
        &mut self,
        region: &Region,
        property: &str,
        at: CellCoord,
        raw: &CellValue,
        field: StatementField,
        warnings: &mut Vec<CellError>,
    ) -> EngineResult<Part<StatementValue>> {
        let value_type = match self.value_type(region, property, field) {
            Ok(value_type) => value_type,
            Err(error) => return Ok(Err(error)),
        };
        let mismatch = |detail: String| {
            CellError::new(
                field,
                CellErrorKind::TypeMismatch {
                    expected: value_type,
                    found: raw.as_lookup_text(),
                    detail,
                },
            )
        };

        let value = match value_type {
            ValueType::Item => {
                let text = raw.as_lookup_text();
                let context = region.context.as_deref().unwrap_or(DEFAULT_CONTEXT);
                match self.lookup(at, &text, context, is_entity_id)? {
                    Some(id) => StatementValue::Item { id },
                    None => {
                        return Ok(Err(CellError::new(
                            field,
                            CellErrorKind::ItemUnresolved {
                                value: text,
                                context: context.to_string(),
                            },
                        )));
                    }
                }
            }
            ValueType::Quantity => match parse_quantity(raw) {
                Ok(amount) => StatementValue::Quantity {
                    amount,
                    unit: self.unit(region, at, warnings)?,
                },
                Err(detail) => return Ok(Err(mismatch(detail))),
            },
            ValueType::Time => {
                match parse_time(raw, region.format.as_deref(), region.precision) {
                    Ok((time, precision)) => StatementValue::Time {
                        time,
                        precision,
                        calendar: region.calendar.clone(),
                    },
                    Err(detail) => return Ok(Err(mismatch(detail))),
                }
            }
            ValueType::Coordinate => match parse_coordinate(raw) {
                Ok((latitude, longitude)) => StatementValue::Coordinate {
                    latitude,
                    longitude,
                },
                Err(detail) => return Ok(Err(mismatch(detail))),
            },
            ValueType::String => StatementValue::String {
                text: raw.as_lookup_text(),
                lang: region.lang.clone(),
            },
        };
        Ok(Ok(value))
    }

    fn unit(
        &self,
        region: &Region,
        at: CellCoord,
        warnings: &mut Vec<CellError>,
    ) -> EngineResult<Option<String>> {
        let lookup = match &region.unit {
            None => return Ok(None),
            Some(Source::Fixed(id)) => return Ok(Some(id.trim().to_string())),
            Some(Source::Region(lookup)) => lookup,
        };
        let context = lookup.context.as_deref().unwrap_or(UNIT_CONTEXT);
        let Some(unit_cell) = lookup.rect.aligned_with(at) else {
            return Ok(None);
        };
        let text = self.grid.text(unit_cell)?;
        if text.is_empty() {
            return Ok(None);
        }
        match self.lookup(unit_cell, &text, context, is_entity_id)? {
            Some(id) => Ok(Some(id)),
            None => {
                warnings.push(CellError::new(
                    StatementField::Unit,
                    CellErrorKind::ItemUnresolved {
                        value: text,
                        context: context.to_string(),
                    },
                ));
                Ok(None)
            }
        }
    }

    /// Resolves a qualifier or reference region for the data cell `cell`.
    /// Failures become warnings; `None` means nothing to attach.
    fn attached(
        &mut self,
        region: &Region,
        cell: CellCoord,
        field: StatementField,
        warnings: &mut Vec<CellError>,
    ) -> EngineResult<Option<(String, StatementValue, CellCoord)>> {
        let Some(at) = region.aligned_with(cell) else {
            return Ok(None);
        };
        if region.skip.skips(at) {
            return Ok(None);
        }
        let Some(raw) = self.grid.cell(at)?.cloned() else {
            return Ok(None);
        };
        let property = match self.property(region, at, field)? {
            Ok(property) => property,
            Err(error) => {
                warnings.push(error);
                return Ok(None);
            }
        };
        match self.value(region, &property, at, &raw, field, warnings)? {
            Ok(value) => Ok(Some((property, value, at))),
            Err(error) => {
                warnings.push(error);
                Ok(None)
            }
        }
    }
}

/// Point in time and stated in fill intrinsic fields; everything else is
/// appended, repeats included.
fn apply_qualifier(
    statement: &mut Statement,
    property: String,
    value: StatementValue,
    at: CellCoord,
) {
    match property.as_str() {
        POINT_IN_TIME => match value {
            StatementValue::Time {
                time, precision, ..
            } => {
                statement.time = Some(time);
                statement.time_precision = Some(precision);
            }
            other => {
                statement.time = Some(other.display());
                statement.time_precision = None;
            }
        },
        STATED_IN => statement.stated_in = Some(value.display()),
        _ => statement.qualifiers.push(QualifierEntry {
            property,
            value,
            cell: Some(at),
        }),
    }
}

fn missing_subject(subject_cell: Option<CellCoord>, lookup: Option<String>) -> CellError {
    CellError::new(
        StatementField::Subject,
        CellErrorKind::MissingSubject {
            subject_cell,
            lookup,
        },
    )
}

fn non_empty(text: String) -> Option<String> {
    (!text.is_empty()).then_some(text)
}
