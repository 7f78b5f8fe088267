//! Declarative description of which regions of a sheet play which role.
//!
//! ```yaml
//! data:
//!   range: C2:D3
//!   type: quantity
//!   property: P1082
//! subject:
//!   range: B2:B3
//! qualifiers:
//!   - range: C1:D1
//!     property: P585
//!     type: time
//! ```

mod region;

pub use region::{LookupRegion, Rect, Region, SkipRules, Source, SubjectRegion, precision_from_name};

use crate::error::{EngineError, EngineResult};
use crate::utils::sha256_hex;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

pub const SUBJECT_CONTEXT: &str = "main subject";
pub const UNIT_CONTEXT: &str = "unit";
pub const DEFAULT_CONTEXT: &str = "";

/// Kind of value a region holds.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum ValueType {
    #[serde(alias = "wikibaseitem", alias = "wikibase-item")]
    #[strum(to_string = "item", serialize = "wikibaseitem", serialize = "wikibase-item")]
    Item,
    Quantity,
    Time,
    #[serde(alias = "globecoordinate", alias = "globe-coordinate")]
    #[strum(
        to_string = "coordinate",
        serialize = "globecoordinate",
        serialize = "globe-coordinate"
    )]
    Coordinate,
    #[serde(
        alias = "monolingualtext",
        alias = "externalid",
        alias = "external-id",
        alias = "url"
    )]
    #[strum(
        to_string = "string",
        serialize = "monolingualtext",
        serialize = "externalid",
        serialize = "external-id",
        serialize = "url"
    )]
    String,
}

impl ValueType {
    /// Maps a datatype name (`WikibaseItem`, `GlobeCoordinate`, ...) or its
    /// `wikiba.se/ontology#` IRI to a value type.
    pub fn from_datatype(raw: &str) -> Option<ValueType> {
        let name = raw.rsplit(['#', '/']).next().unwrap_or(raw).trim();
        name.parse().ok()
    }
}

/// Semantic role of a region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Role {
    Subject,
    Property,
    Value,
    Qualifier,
    Unit,
    Reference,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Annotation {
    pub data: Region,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<SubjectRegion>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub qualifiers: Vec<Region>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub references: Vec<Region>,
}

impl Annotation {
    pub fn new(data: Region) -> Self {
        Self {
            data,
            subject: None,
            qualifiers: Vec::new(),
            references: Vec::new(),
        }
    }

    pub fn from_yaml_str(raw: &str) -> EngineResult<Self> {
        let annotation: Annotation = serde_yaml::from_str(raw)
            .map_err(|err| EngineError::InvalidAnnotation(err.to_string()))?;
        annotation.validate()?;
        Ok(annotation)
    }

    pub fn from_json_str(raw: &str) -> EngineResult<Self> {
        let annotation: Annotation = serde_json::from_str(raw)
            .map_err(|err| EngineError::InvalidAnnotation(err.to_string()))?;
        annotation.validate()?;
        Ok(annotation)
    }

    /// Loads a `.yaml`/`.yml` or `.json` annotation file.
    pub fn load(path: &Path) -> EngineResult<Self> {
        let raw =
            fs::read_to_string(path).map_err(|err| EngineError::source_unavailable(path, err))?;
        let ext = path
            .extension()
            .and_then(|os| os.to_str())
            .unwrap_or("")
            .to_ascii_lowercase();
        match ext.as_str() {
            "json" => Self::from_json_str(&raw),
            "yaml" | "yml" => Self::from_yaml_str(&raw),
            other => Err(EngineError::InvalidAnnotation(format!(
                "unsupported annotation extension '{other}'"
            ))),
        }
    }

    /// Structural checks that do not need the grid.
    pub fn validate(&self) -> EngineResult<()> {
        if self.data.property.is_none() {
            return Err(invalid("data region needs a property"));
        }
        validate_value_region("data", &self.data)?;
        for (index, qualifier) in self.qualifiers.iter().enumerate() {
            let label = format!("qualifier {index}");
            if qualifier.property.is_none() {
                return Err(invalid(format!("{label} needs a property")));
            }
            validate_value_region(&label, qualifier)?;
        }
        for (index, reference) in self.references.iter().enumerate() {
            let label = format!("reference {index}");
            if reference.property.is_none() {
                return Err(invalid(format!("{label} needs a property")));
            }
            validate_value_region(&label, reference)?;
        }
        Ok(())
    }

    /// Every rectangle with its role, nested property/unit regions included.
    pub fn regions(&self) -> Vec<(Role, Rect)> {
        let mut out = vec![(Role::Value, self.data.rect)];
        push_sources(&mut out, &self.data);
        if let Some(subject) = &self.subject {
            out.push((Role::Subject, subject.rect));
        }
        for qualifier in &self.qualifiers {
            out.push((Role::Qualifier, qualifier.rect));
            push_sources(&mut out, qualifier);
        }
        for reference in &self.references {
            out.push((Role::Reference, reference.rect));
            push_sources(&mut out, reference);
        }
        out
    }

    pub fn canonical_json(&self) -> EngineResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn content_hash(&self) -> EngineResult<String> {
        Ok(sha256_hex(&[self.canonical_json()?.as_bytes()]))
    }
}

fn push_sources(out: &mut Vec<(Role, Rect)>, region: &Region) {
    if let Some(Source::Region(lookup)) = &region.property {
        out.push((Role::Property, lookup.rect));
    }
    if let Some(Source::Region(lookup)) = &region.unit {
        out.push((Role::Unit, lookup.rect));
    }
}

fn validate_value_region(label: &str, region: &Region) -> EngineResult<()> {
    if region.unit.is_some()
        && region
            .value_type
            .is_some_and(|value_type| value_type != ValueType::Quantity)
    {
        return Err(invalid(format!("{label}: only quantity values carry a unit")));
    }
    match &region.property {
        Some(Source::Fixed(id)) if id.trim().is_empty() => {
            return Err(invalid(format!("{label}: property identifier is empty")));
        }
        Some(Source::Region(lookup)) if !covers_by_alignment(&lookup.rect, &region.rect) => {
            return Err(invalid(format!(
                "{label}: property region {} cannot line up with {}",
                lookup.rect, region.rect
            )));
        }
        _ => {}
    }
    if region.format.is_some() && region.value_type.is_some_and(|t| t != ValueType::Time) {
        return Err(invalid(format!("{label}: format only applies to time values")));
    }
    Ok(())
}

/// True when some cell of `target` has an aligned cell in `lookup`.
fn covers_by_alignment(lookup: &Rect, target: &Rect) -> bool {
    target.cells().any(|cell| lookup.aligned_with(cell).is_some())
}

fn invalid(message: impl Into<String>) -> EngineError {
    EngineError::InvalidAnnotation(message.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::CellCoord;
    use assert_matches::assert_matches;

    const SAMPLE: &str = r#"
data:
  range: C2:D3
  type: quantity
  property: P1082
  skip:
    cells: [D3]
subject:
  left: B
  right: B
  top: 2
  bottom: 3
qualifiers:
  - range: C1:D1
    property: P585
    type: time
    precision: year
"#;

    #[test]
    fn yaml_annotation_loads() {
        let annotation = Annotation::from_yaml_str(SAMPLE).expect("annotation");
        assert_eq!(annotation.data.value_type, Some(ValueType::Quantity));
        assert!(annotation.data.skip.skips(CellCoord::new(3, 2)));
        assert_eq!(annotation.qualifiers[0].precision, Some(9));
        let subject = annotation.subject.as_ref().expect("subject");
        assert_eq!(subject.rect, Rect::parse("B2:B3").expect("range"));
        assert_eq!(annotation.regions().len(), 3);
    }

    #[test]
    fn canonical_json_reloads_to_same_annotation() {
        let annotation = Annotation::from_yaml_str(SAMPLE).expect("annotation");
        let json = annotation.canonical_json().expect("json");
        let back = Annotation::from_json_str(&json).expect("reload");
        assert_eq!(back, annotation);
        assert_eq!(back.content_hash().unwrap(), annotation.content_hash().unwrap());
    }

    #[test]
    fn unit_on_non_quantity_is_rejected() {
        let raw = r#"
data:
  range: A1:A3
  type: string
  property: P1
  unit: Q11573
"#;
        assert_matches!(
            Annotation::from_yaml_str(raw),
            Err(EngineError::InvalidAnnotation(_))
        );
    }

    #[test]
    fn datatype_names_map_to_value_types() {
        assert_eq!(ValueType::from_datatype("WikibaseItem"), Some(ValueType::Item));
        assert_eq!(
            ValueType::from_datatype("http://wikiba.se/ontology#GlobeCoordinate"),
            Some(ValueType::Coordinate)
        );
        assert_eq!(ValueType::from_datatype("Monolingualtext"), Some(ValueType::String));
        assert_eq!(ValueType::from_datatype("Lexeme"), None);
    }
}
