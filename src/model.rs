use crate::error::CellError;
use crate::utils::{parse_cell_address, to_excel};
use indexmap::IndexMap;
use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize, Serializer};
use std::cmp::Ordering;
use std::fmt;

/// Zero-based (column, row) position in a grid.
///
/// Serialized as its A1 address so it can key JSON maps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CellCoord {
    pub column: u32,
    pub row: u32,
}

impl CellCoord {
    pub const fn new(column: u32, row: u32) -> Self {
        Self { column, row }
    }

    pub fn to_excel(&self) -> String {
        to_excel(self.column, self.row)
    }

    /// Row-major comparison, used wherever output order must be stable.
    pub fn row_major(a: &CellCoord, b: &CellCoord) -> Ordering {
        (a.row, a.column).cmp(&(b.row, b.column))
    }
}

impl fmt::Display for CellCoord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_excel())
    }
}

impl Serialize for CellCoord {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_excel())
    }
}

impl<'de> Deserialize<'de> for CellCoord {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        parse_cell_address(&raw)
            .ok_or_else(|| de::Error::custom(format!("invalid cell address '{raw}'")))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value")]
pub enum CellValue {
    Text(String),
    Number(f64),
}

impl CellValue {
    /// Text used for item lookups and display. Integral numbers render
    /// without a fractional part so `2020.0` and `"2020"` look the same.
    pub fn as_lookup_text(&self) -> String {
        match self {
            CellValue::Text(text) => text.trim().to_string(),
            CellValue::Number(n) => format_number(*n),
        }
    }
}

pub fn format_number(n: f64) -> String {
    if n.is_finite() && n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{n}")
    }
}

/// Typed statement value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StatementValue {
    Item {
        id: String,
    },
    Quantity {
        amount: f64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        unit: Option<String>,
    },
    Time {
        time: String,
        precision: u8,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        calendar: Option<String>,
    },
    Coordinate {
        latitude: f64,
        longitude: f64,
    },
    String {
        text: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        lang: Option<String>,
    },
}

impl StatementValue {
    /// Flat text rendition used by tabular exports.
    pub fn display(&self) -> String {
        match self {
            StatementValue::Item { id } => id.clone(),
            StatementValue::Quantity { amount, .. } => format_number(*amount),
            StatementValue::Time { time, .. } => time.clone(),
            StatementValue::Coordinate {
                latitude,
                longitude,
            } => format!("Point({longitude} {latitude})"),
            StatementValue::String { text, .. } => text.clone(),
        }
    }

    pub fn item_id(&self) -> Option<&str> {
        match self {
            StatementValue::Item { id } => Some(id),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualifierEntry {
    pub property: String,
    pub value: StatementValue,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cell: Option<CellCoord>,
}

impl QualifierEntry {
    pub fn precision(&self) -> Option<u8> {
        match self.value {
            StatementValue::Time { precision, .. } => Some(precision),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferenceEntry {
    pub property: String,
    pub value: StatementValue,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cell: Option<CellCoord>,
}

/// One generated statement, keyed externally by the data cell that produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Statement {
    pub subject: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject_cell: Option<CellCoord>,
    pub property: String,
    pub value: StatementValue,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_precision: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stated_in: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub qualifiers: Vec<QualifierEntry>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub references: Vec<ReferenceEntry>,
}

pub type StatementMap = IndexMap<CellCoord, Statement>;
pub type ErrorMap = IndexMap<CellCoord, Vec<CellError>>;

/// Cell lists for rendering a sheet overlay, all sorted row-major.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Highlights {
    pub data_region: Vec<CellCoord>,
    pub items: Vec<CellCoord>,
    pub qualifier_region: Vec<CellCoord>,
    pub reference_region: Vec<CellCoord>,
    pub error_cells: Vec<CellCoord>,
    pub danger_cells: Vec<CellCoord>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cell_coord_serializes_as_address() {
        let coord = CellCoord::new(1, 0);
        assert_eq!(serde_json::to_string(&coord).unwrap(), "\"B1\"");
        let mut map = StatementMap::new();
        map.insert(
            coord,
            Statement {
                subject: "Q1".into(),
                subject_cell: None,
                property: "P123".into(),
                value: StatementValue::Quantity {
                    amount: 10.0,
                    unit: None,
                },
                time: None,
                time_precision: None,
                stated_in: None,
                qualifiers: Vec::new(),
                references: Vec::new(),
            },
        );
        let json = serde_json::to_string(&map).unwrap();
        let back: StatementMap = serde_json::from_str(&json).unwrap();
        assert_eq!(back, map);
    }

    #[test]
    fn lookup_text_drops_integral_fraction() {
        assert_eq!(CellValue::Number(2020.0).as_lookup_text(), "2020");
        assert_eq!(CellValue::Number(2.5).as_lookup_text(), "2.5");
        assert_eq!(CellValue::Text("  Chad ".into()).as_lookup_text(), "Chad");
    }
}
