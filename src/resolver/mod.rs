//! Property-type and label lookups used during generation and export.

mod sparql;

pub use sparql::SparqlResolver;

use crate::annotation::ValueType;
use crate::error::ResolverError;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;

static ENTITY_ID: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[PQ][0-9]+$").expect("valid entity regex"));
static PROPERTY_ID: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^P[0-9]+$").expect("valid property regex"));

pub fn is_entity_id(raw: &str) -> bool {
    ENTITY_ID.is_match(raw)
}

pub fn is_property_id(raw: &str) -> bool {
    PROPERTY_ID.is_match(raw)
}

pub trait PropertyTypeResolver: Send + Sync {
    fn resolve_type(&self, property: &str) -> Result<ValueType, ResolverError>;

    /// Stable description of where answers come from. Cached results are
    /// keyed on it, so resolvers that can answer differently must differ.
    fn identity(&self) -> String {
        std::any::type_name::<Self>().to_string()
    }
}

pub trait LabelResolver: Send + Sync {
    fn resolve_label(&self, id: &str) -> Result<String, ResolverError>;

    fn resolve_description(&self, id: &str) -> Result<String, ResolverError> {
        Err(ResolverError::NotFound(id.to_string()))
    }
}

/// Label for `id`, or `id` itself when the lookup fails.
pub fn label_or_id(resolver: Option<&dyn LabelResolver>, id: &str) -> String {
    match resolver.map(|resolver| resolver.resolve_label(id)) {
        Some(Ok(label)) if !label.trim().is_empty() => label,
        Some(Err(err)) => {
            tracing::debug!(id = id, error = %err, "label lookup failed, using id");
            id.to_string()
        }
        _ => id.to_string(),
    }
}

/// In-memory resolver for offline runs and tests.
#[derive(Debug, Clone, Default)]
pub struct StaticResolver {
    types: HashMap<String, ValueType>,
    labels: HashMap<String, String>,
    descriptions: HashMap<String, String>,
}

impl StaticResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_type(mut self, property: impl Into<String>, value_type: ValueType) -> Self {
        self.types.insert(property.into(), value_type);
        self
    }

    pub fn with_label(mut self, id: impl Into<String>, label: impl Into<String>) -> Self {
        self.labels.insert(id.into(), label.into());
        self
    }

    pub fn with_description(
        mut self,
        id: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        self.descriptions.insert(id.into(), description.into());
        self
    }
}

impl PropertyTypeResolver for StaticResolver {
    fn resolve_type(&self, property: &str) -> Result<ValueType, ResolverError> {
        self.types
            .get(property)
            .copied()
            .ok_or_else(|| ResolverError::NotFound(property.to_string()))
    }

    fn identity(&self) -> String {
        let mut types: Vec<String> = self
            .types
            .iter()
            .map(|(property, value_type)| format!("{property}={value_type}"))
            .collect();
        types.sort();
        format!("static:{}", types.join(","))
    }
}

impl LabelResolver for StaticResolver {
    fn resolve_label(&self, id: &str) -> Result<String, ResolverError> {
        self.labels
            .get(id)
            .cloned()
            .ok_or_else(|| ResolverError::NotFound(id.to_string()))
    }

    fn resolve_description(&self, id: &str) -> Result<String, ResolverError> {
        self.descriptions
            .get(id)
            .cloned()
            .ok_or_else(|| ResolverError::NotFound(id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn label_falls_back_to_id() {
        let resolver = StaticResolver::new().with_label("P1082", "population");
        assert_eq!(label_or_id(Some(&resolver), "P1082"), "population");
        assert_eq!(label_or_id(Some(&resolver), "P17"), "P17");
        assert_eq!(label_or_id(None, "P17"), "P17");
    }

    #[test]
    fn entity_ids_are_validated() {
        assert!(is_entity_id("Q42"));
        assert!(is_property_id("P585"));
        assert!(!is_entity_id("Q42 }"));
        assert!(!is_property_id("Q42"));
    }

    #[test]
    fn static_identity_follows_the_declared_types() {
        let a = StaticResolver::new()
            .with_type("P1082", ValueType::Quantity)
            .with_type("P17", ValueType::Item);
        let b = StaticResolver::new()
            .with_type("P17", ValueType::Item)
            .with_type("P1082", ValueType::Quantity);
        let c = StaticResolver::new().with_type("P1082", ValueType::String);
        assert_eq!(a.identity(), b.identity());
        assert_ne!(a.identity(), c.identity());
        assert_eq!(a.identity(), "static:P1082=quantity,P17=item");
    }
}
