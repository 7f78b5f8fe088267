use crate::model::CellCoord;
use crate::utils::{column_index_to_letter, column_letter_to_index, parse_range, to_excel};
use indexmap::IndexSet;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeSet;
use std::fmt;

use super::ValueType;

/// Inclusive rectangle of cells, `start` top-left and `end` bottom-right.
///
/// Accepts either `range: "B2:C5"` or the `left`/`right`/`top`/`bottom`
/// form (column letters, one-based row numbers).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RectSpec", into = "RectSpec")]
pub struct Rect {
    pub start: CellCoord,
    pub end: CellCoord,
}

impl Rect {
    pub fn new(a: CellCoord, b: CellCoord) -> Self {
        Self {
            start: CellCoord::new(a.column.min(b.column), a.row.min(b.row)),
            end: CellCoord::new(a.column.max(b.column), a.row.max(b.row)),
        }
    }

    pub fn cell(coord: CellCoord) -> Self {
        Self::new(coord, coord)
    }

    pub fn parse(range: &str) -> Option<Self> {
        parse_range(range).map(|(a, b)| Self::new(a, b))
    }

    pub fn width(&self) -> u32 {
        self.end.column - self.start.column + 1
    }

    pub fn height(&self) -> u32 {
        self.end.row - self.start.row + 1
    }

    pub fn len(&self) -> usize {
        self.width() as usize * self.height() as usize
    }

    pub fn is_single_cell(&self) -> bool {
        self.start == self.end
    }

    pub fn contains(&self, coord: CellCoord) -> bool {
        (self.start.column..=self.end.column).contains(&coord.column)
            && (self.start.row..=self.end.row).contains(&coord.row)
    }

    /// The cell of this rectangle that lines up with `cell`.
    ///
    /// A single cell aligns with everything; a single column aligns by row;
    /// a single row aligns by column. Anything wider has no alignment.
    pub fn aligned_with(&self, cell: CellCoord) -> Option<CellCoord> {
        if self.is_single_cell() {
            return Some(self.start);
        }
        if self.width() == 1 {
            return (self.start.row..=self.end.row)
                .contains(&cell.row)
                .then(|| CellCoord::new(self.start.column, cell.row));
        }
        if self.height() == 1 {
            return (self.start.column..=self.end.column)
                .contains(&cell.column)
                .then(|| CellCoord::new(cell.column, self.start.row));
        }
        None
    }

    /// All cells, row-major.
    pub fn cells(&self) -> impl Iterator<Item = CellCoord> + '_ {
        let (start, end) = (self.start, self.end);
        (start.row..=end.row)
            .flat_map(move |row| {
                (start.column..=end.column).map(move |col| CellCoord::new(col, row))
            })
    }
}

impl fmt::Display for Rect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_single_cell() {
            f.write_str(&self.start.to_excel())
        } else {
            write!(f, "{}:{}", self.start.to_excel(), self.end.to_excel())
        }
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct RectSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    range: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    left: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    right: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    top: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    bottom: Option<u32>,
}

impl TryFrom<RectSpec> for Rect {
    type Error = String;

    fn try_from(spec: RectSpec) -> Result<Self, Self::Error> {
        if let Some(range) = spec.range.as_deref() {
            return Rect::parse(range).ok_or_else(|| format!("invalid range '{range}'"));
        }
        let column = |raw: Option<&str>, side: &str| {
            let raw = raw.ok_or_else(|| format!("region is missing '{side}'"))?;
            column_letter_to_index(raw.trim()).ok_or_else(|| format!("invalid column '{raw}'"))
        };
        let row = |raw: Option<u32>, side: &str| match raw {
            Some(0) => Err(format!("'{side}' rows are numbered from 1")),
            Some(row) => Ok(row - 1),
            None => Err(format!("region is missing '{side}'")),
        };
        let left = column(spec.left.as_deref(), "left")?;
        let right = column(spec.right.as_deref(), "right")?;
        let top = row(spec.top, "top")?;
        let bottom = row(spec.bottom, "bottom")?;
        Ok(Rect::new(
            CellCoord::new(left, top),
            CellCoord::new(right, bottom),
        ))
    }
}

impl From<Rect> for RectSpec {
    fn from(rect: Rect) -> Self {
        RectSpec {
            range: Some(format!(
                "{}:{}",
                to_excel(rect.start.column, rect.start.row),
                to_excel(rect.end.column, rect.end.row)
            )),
            ..RectSpec::default()
        }
    }
}

/// Rows, columns and single cells excluded from a region.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "SkipSpec", into = "SkipSpec")]
pub struct SkipRules {
    pub rows: BTreeSet<u32>,
    pub columns: BTreeSet<u32>,
    pub cells: IndexSet<CellCoord>,
}

impl SkipRules {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty() && self.columns.is_empty() && self.cells.is_empty()
    }

    pub fn skips(&self, coord: CellCoord) -> bool {
        self.rows.contains(&coord.row)
            || self.columns.contains(&coord.column)
            || self.cells.contains(&coord)
    }
}

/// User-facing form: one-based rows, column letters, A1 cells.
#[derive(Debug, Default, Serialize, Deserialize)]
struct SkipSpec {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    rows: Vec<u32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    columns: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    cells: Vec<CellCoord>,
}

impl TryFrom<SkipSpec> for SkipRules {
    type Error = String;

    fn try_from(spec: SkipSpec) -> Result<Self, Self::Error> {
        let rows = spec
            .rows
            .into_iter()
            .map(|row| {
                row.checked_sub(1)
                    .ok_or_else(|| "skip rows are numbered from 1".to_string())
            })
            .collect::<Result<_, _>>()?;
        let columns = spec
            .columns
            .iter()
            .map(|raw| {
                column_letter_to_index(raw.trim())
                    .ok_or_else(|| format!("invalid skip column '{raw}'"))
            })
            .collect::<Result<_, _>>()?;
        Ok(SkipRules {
            rows,
            columns,
            cells: spec.cells.into_iter().collect(),
        })
    }
}

impl From<SkipRules> for SkipSpec {
    fn from(rules: SkipRules) -> Self {
        SkipSpec {
            rows: rules.rows.into_iter().map(|row| row.saturating_add(1)).collect(),
            columns: rules.columns.into_iter().map(column_index_to_letter).collect(),
            cells: rules.cells.into_iter().collect(),
        }
    }
}

/// Region whose cells are looked up in the item table: a property or unit
/// region nested under a value-bearing region.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LookupRegion {
    #[serde(flatten)]
    pub rect: Rect,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
}

/// Either a fixed identifier or a region to read identifiers from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Source {
    Fixed(String),
    Region(LookupRegion),
}

/// Value-bearing region: the data region, a qualifier or a reference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Region {
    #[serde(flatten)]
    pub rect: Rect,
    #[serde(default, skip_serializing_if = "SkipRules::is_empty")]
    pub skip: SkipRules,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub value_type: Option<ValueType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub property: Option<Source>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<Source>,
    /// Item-table context for item-typed values.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "deserialize_precision"
    )]
    pub precision: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub calendar: Option<String>,
    /// chrono format string for time values.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lang: Option<String>,
}

impl Region {
    pub fn new(rect: Rect) -> Self {
        Self {
            rect,
            skip: SkipRules::default(),
            value_type: None,
            property: None,
            unit: None,
            context: None,
            precision: None,
            calendar: None,
            format: None,
            lang: None,
        }
    }

    pub fn with_property(mut self, property: Source) -> Self {
        self.property = Some(property);
        self
    }

    pub fn with_type(mut self, value_type: ValueType) -> Self {
        self.value_type = Some(value_type);
        self
    }

    pub fn aligned_with(&self, cell: CellCoord) -> Option<CellCoord> {
        self.rect.aligned_with(cell)
    }

    /// Cells in row-major order with skipped cells removed.
    pub fn active_cells(&self) -> impl Iterator<Item = CellCoord> + '_ {
        self.rect.cells().filter(|cell| !self.skip.skips(*cell))
    }
}

/// Subject region: cells resolved to items in the subject context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubjectRegion {
    #[serde(flatten)]
    pub rect: Rect,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum PrecisionSpec {
    Number(u8),
    Name(String),
}

fn deserialize_precision<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<u8>, D::Error> {
    let raw = Option::<PrecisionSpec>::deserialize(deserializer)?;
    match raw {
        None => Ok(None),
        Some(PrecisionSpec::Number(n)) if n <= 14 => Ok(Some(n)),
        Some(PrecisionSpec::Number(n)) => Err(serde::de::Error::custom(format!(
            "precision {n} is out of range (0-14)"
        ))),
        Some(PrecisionSpec::Name(name)) => precision_from_name(&name)
            .map(Some)
            .ok_or_else(|| serde::de::Error::custom(format!("unknown precision '{name}'"))),
    }
}

/// Named time precision to its numeric level (year = 9, day = 11, ...).
pub fn precision_from_name(name: &str) -> Option<u8> {
    let level = match name.trim().to_ascii_lowercase().as_str() {
        "gigayear" | "gigayears" => 0,
        "100 megayears" | "megayear" => 1,
        "10 megayears" => 2,
        "megayears" => 3,
        "100 kiloyears" | "kiloyear" => 4,
        "10 kiloyears" => 5,
        "millennium" | "millennia" => 6,
        "century" | "centuries" => 7,
        "decade" | "decades" => 8,
        "year" | "years" => 9,
        "month" | "months" => 10,
        "day" | "days" => 11,
        "hour" | "hours" => 12,
        "minute" | "minutes" => 13,
        "second" | "seconds" => 14,
        other => return other.parse::<u8>().ok().filter(|n| *n <= 14),
    };
    Some(level)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alignment_follows_region_shape() {
        let column = Rect::parse("A2:A5").expect("range");
        assert_eq!(
            column.aligned_with(CellCoord::new(3, 2)),
            Some(CellCoord::new(0, 2))
        );
        assert_eq!(column.aligned_with(CellCoord::new(3, 9)), None);

        let row = Rect::parse("B1:E1").expect("range");
        assert_eq!(
            row.aligned_with(CellCoord::new(2, 7)),
            Some(CellCoord::new(2, 0))
        );

        let single = Rect::parse("Z9").expect("cell");
        assert_eq!(
            single.aligned_with(CellCoord::new(0, 0)),
            Some(CellCoord::new(25, 8))
        );

        let block = Rect::parse("A1:B2").expect("range");
        assert_eq!(block.aligned_with(CellCoord::new(0, 0)), None);
    }

    #[test]
    fn side_form_matches_range_form() {
        let from_sides: Rect =
            serde_json::from_str(r#"{"left":"B","right":"C","top":2,"bottom":3}"#).expect("sides");
        assert_eq!(from_sides, Rect::parse("B2:C3").expect("range"));
    }

    #[test]
    fn precision_accepts_names_and_numbers() {
        assert_eq!(precision_from_name("Year"), Some(9));
        assert_eq!(precision_from_name("day"), Some(11));
        assert_eq!(precision_from_name("10"), Some(10));
        assert_eq!(precision_from_name("fortnight"), None);
    }
}
