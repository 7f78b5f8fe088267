use super::{LabelResolver, PropertyTypeResolver, is_entity_id, is_property_id};
use crate::annotation::ValueType;
use crate::error::ResolverError;
use once_cell::sync::OnceCell;
use parking_lot::RwLock;
use reqwest::blocking::Client;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;

const PREFIXES: &str = "PREFIX wd: <http://www.wikidata.org/entity/>\n\
PREFIX wikibase: <http://wikiba.se/ontology#>\n\
PREFIX rdfs: <http://www.w3.org/2000/01/rdf-schema#>\n\
PREFIX schema: <http://schema.org/>\n";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Default)]
struct Entity {
    label: Option<String>,
    description: Option<String>,
}

/// Resolver backed by a SPARQL endpoint over blocking HTTP.
///
/// Answers are memoized for the lifetime of the resolver. The HTTP client is
/// built on first use so the resolver can be constructed inside an async
/// context and only queried from blocking threads.
pub struct SparqlResolver {
    endpoint: String,
    language: String,
    client: OnceCell<Client>,
    types: RwLock<HashMap<String, ValueType>>,
    entities: RwLock<HashMap<String, Entity>>,
}

#[derive(Debug, Deserialize)]
struct SparqlResponse {
    results: SparqlResults,
}

#[derive(Debug, Deserialize)]
struct SparqlResults {
    bindings: Vec<HashMap<String, SparqlTerm>>,
}

#[derive(Debug, Deserialize)]
struct SparqlTerm {
    value: String,
}

impl SparqlResolver {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            language: "en".to_string(),
            client: OnceCell::new(),
            types: RwLock::new(HashMap::new()),
            entities: RwLock::new(HashMap::new()),
        }
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = language.into();
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn client(&self) -> Result<&Client, ResolverError> {
        self.client.get_or_try_init(|| {
            Client::builder()
                .timeout(REQUEST_TIMEOUT)
                .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
                .build()
                .map_err(|err| ResolverError::Transport(err.to_string()))
        })
    }

    fn query(&self, sparql: &str) -> Result<Vec<HashMap<String, SparqlTerm>>, ResolverError> {
        let response = self
            .client()?
            .get(&self.endpoint)
            .query(&[("query", sparql), ("format", "json")])
            .header(reqwest::header::ACCEPT, "application/sparql-results+json")
            .send()
            .map_err(|err| ResolverError::Transport(err.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(ResolverError::Transport(format!(
                "endpoint answered {status}"
            )));
        }
        let body: SparqlResponse = response
            .json()
            .map_err(|err| ResolverError::Response(err.to_string()))?;
        Ok(body.results.bindings)
    }

    fn entity(&self, id: &str) -> Result<Entity, ResolverError> {
        if !is_entity_id(id) {
            return Err(ResolverError::InvalidIdentifier(id.to_string()));
        }
        if let Some(entity) = self.entities.read().get(id) {
            return Ok(entity.clone());
        }
        let lang = &self.language;
        let sparql = format!(
            "{PREFIXES}SELECT ?label ?description WHERE {{\n  \
             OPTIONAL {{ wd:{id} rdfs:label ?label . FILTER(LANG(?label) = \"{lang}\") }}\n  \
             OPTIONAL {{ wd:{id} schema:description ?description . \
             FILTER(LANG(?description) = \"{lang}\") }}\n\
             }} LIMIT 1"
        );
        let bindings = self.query(&sparql)?;
        let row = bindings.into_iter().next().unwrap_or_default();
        let entity = Entity {
            label: row.get("label").map(|term| term.value.clone()),
            description: row.get("description").map(|term| term.value.clone()),
        };
        self.entities.write().insert(id.to_string(), entity.clone());
        Ok(entity)
    }
}

impl PropertyTypeResolver for SparqlResolver {
    fn resolve_type(&self, property: &str) -> Result<ValueType, ResolverError> {
        if !is_property_id(property) {
            return Err(ResolverError::InvalidIdentifier(property.to_string()));
        }
        if let Some(value_type) = self.types.read().get(property) {
            return Ok(*value_type);
        }
        let sparql = format!(
            "{PREFIXES}SELECT ?type WHERE {{ wd:{property} wikibase:propertyType ?type . }} LIMIT 1"
        );
        let bindings = self.query(&sparql)?;
        let raw = bindings
            .first()
            .and_then(|row| row.get("type"))
            .map(|term| term.value.clone())
            .ok_or_else(|| ResolverError::NotFound(property.to_string()))?;
        let value_type =
            ValueType::from_datatype(&raw).ok_or_else(|| ResolverError::UnsupportedType(raw))?;
        self.types.write().insert(property.to_string(), value_type);
        tracing::debug!(property = property, value_type = %value_type, "resolved property type");
        Ok(value_type)
    }

    fn identity(&self) -> String {
        format!("sparql:{}@{}", self.endpoint, self.language)
    }
}

impl LabelResolver for SparqlResolver {
    fn resolve_label(&self, id: &str) -> Result<String, ResolverError> {
        self.entity(id)?
            .label
            .ok_or_else(|| ResolverError::NotFound(id.to_string()))
    }

    fn resolve_description(&self, id: &str) -> Result<String, ResolverError> {
        self.entity(id)?
            .description
            .ok_or_else(|| ResolverError::NotFound(id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn malformed_ids_never_reach_the_network() {
        let resolver = SparqlResolver::new("http://127.0.0.1:9/sparql");
        assert_eq!(
            resolver.resolve_type("P1 } DROP"),
            Err(ResolverError::InvalidIdentifier("P1 } DROP".into()))
        );
        assert_eq!(
            resolver.resolve_label("wd:Q1"),
            Err(ResolverError::InvalidIdentifier("wd:Q1".into()))
        );
    }
}
