//! Facade tying the caches, the generator and the resolvers together.

use crate::annotation::Annotation;
use crate::cache::{
    AnnotationKey, CacheOutcome, CacheStats, CachedResult, ResultCache, SheetCache, SheetKey,
};
use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};
use crate::export::{CanonicalOptions, canonical_table};
use crate::grid::GridSource;
use crate::logging::generation_span;
use crate::mapping::{GenerationMetadata, StatementGenerator, Window, highlights};
use crate::model::StatementMap;
use crate::resolver::{LabelResolver, PropertyTypeResolver, SparqlResolver};
use crate::wikify::ItemTable;
use chrono::Utc;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::task;

/// Everything one generation call hands back.
#[derive(Debug, Clone)]
pub struct EngineOutput {
    pub result: Arc<CachedResult>,
    /// Present when a pass ran; a result cache hit has none.
    pub metadata: Option<GenerationMetadata>,
    /// `Bypass` for windowed calls, which are never cached.
    pub cache: CacheOutcome,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EngineStats {
    pub sheets: CacheStats,
    pub results: CacheStats,
}

pub struct Engine {
    config: EngineConfig,
    sheets: SheetCache,
    results: ResultCache,
    generator: StatementGenerator,
    labels: Option<Arc<dyn LabelResolver>>,
}

impl Engine {
    /// Builds the engine; a configured endpoint backs both property types
    /// and labels with a [`SparqlResolver`].
    pub fn new(config: EngineConfig) -> Self {
        let mut generator = StatementGenerator::new(&config);
        let mut labels: Option<Arc<dyn LabelResolver>> = None;
        if let Some(endpoint) = config.endpoint.as_deref() {
            let sparql = Arc::new(SparqlResolver::new(endpoint));
            generator = generator.with_type_resolver(sparql.clone());
            labels = Some(sparql as Arc<dyn LabelResolver>);
            tracing::info!(endpoint = endpoint, "using SPARQL resolver");
        }
        Self {
            sheets: SheetCache::new(&config),
            results: ResultCache::new(&config),
            generator,
            labels,
            config,
        }
    }

    pub fn with_type_resolver(mut self, resolver: Arc<dyn PropertyTypeResolver>) -> Self {
        self.generator = StatementGenerator::new(&self.config).with_type_resolver(resolver);
        self
    }

    pub fn with_label_resolver(mut self, resolver: Arc<dyn LabelResolver>) -> Self {
        self.labels = Some(resolver);
        self
    }

    pub fn with_grid_source(mut self, source: Arc<dyn GridSource>) -> Self {
        self.sheets = SheetCache::with_source(&self.config, source);
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn sheet_cache(&self) -> &SheetCache {
        &self.sheets
    }

    pub fn result_cache(&self) -> &ResultCache {
        &self.results
    }

    /// Runs grid → statements → highlights for one sheet.
    ///
    /// Full-window results are memoized under the sheet identity and the
    /// annotation folded with the item table and generator fingerprints.
    pub fn generate(
        &self,
        path: &Path,
        sheet: &str,
        annotation: &Annotation,
        item_table: &ItemTable,
        window: Window,
    ) -> EngineResult<EngineOutput> {
        annotation.validate()?;
        let span = generation_span(sheet);
        let _entered = span.enter();

        if !window.is_full() {
            let grid = self.sheets.get_grid(path, sheet)?;
            let generated = self.generator.generate(annotation, &grid, item_table, window)?;
            let highlights = highlights(&generated.statements, &generated.errors);
            let result = CachedResult {
                statements: generated.statements,
                highlights,
                errors: generated.errors,
                created_at: Utc::now(),
            };
            return Ok(EngineOutput {
                result: Arc::new(result),
                metadata: Some(generated.metadata),
                cache: CacheOutcome::Bypass,
            });
        }

        let sheet_key = SheetKey::for_sheet(path, sheet)?;
        let annotation_key = AnnotationKey::for_annotation(annotation)?
            .with_item_table(&item_table.fingerprint())
            .with_generator(&self.generator.fingerprint());
        if let Some(result) = self.results.get(&sheet_key, &annotation_key) {
            return Ok(EngineOutput {
                result,
                metadata: None,
                cache: CacheOutcome::Hit,
            });
        }

        let grid = self.sheets.get_grid(path, sheet)?;
        let generated = self.generator.generate(annotation, &grid, item_table, window)?;
        let highlights = highlights(&generated.statements, &generated.errors);
        let result = self.results.put(
            &sheet_key,
            &annotation_key,
            generated.statements,
            highlights,
            generated.errors,
        );
        Ok(EngineOutput {
            result,
            metadata: Some(generated.metadata),
            cache: CacheOutcome::Miss,
        })
    }

    /// [`Engine::generate`] on the tokio blocking pool.
    pub async fn generate_async(
        self: &Arc<Self>,
        path: PathBuf,
        sheet: String,
        annotation: Arc<Annotation>,
        item_table: Arc<ItemTable>,
        window: Window,
    ) -> EngineResult<EngineOutput> {
        let engine = Arc::clone(self);
        task::spawn_blocking(move || {
            engine.generate(&path, &sheet, &annotation, &item_table, window)
        })
        .await
        .map_err(|err| EngineError::Task(err.to_string()))?
    }

    /// Materializes every sheet of `path`; returns the sheet names.
    pub fn warm(&self, path: &Path) -> EngineResult<Vec<String>> {
        let sheets = self.sheets.warm(path)?;
        tracing::info!(path = %path.display(), sheets = sheets.len(), "warmed sheet cache");
        Ok(sheets)
    }

    /// Drops cached results, and the sheet artifacts of `path` or of every
    /// file when `path` is `None`. Returns the number of files removed.
    pub fn clear_cache(&self, path: Option<&Path>) -> EngineResult<usize> {
        let sheets = match path {
            Some(path) => self.sheets.purge(path)?,
            None => self.sheets.clear()?,
        };
        let results = self.results.clear()?;
        tracing::info!(sheets, results, "cleared caches");
        Ok(sheets + results)
    }

    pub fn stats(&self) -> EngineStats {
        EngineStats {
            sheets: self.sheets.stats(),
            results: self.results.stats(),
        }
    }

    /// Canonical CSV of `statements`, labelled through the engine's resolver.
    pub fn export_canonical(
        &self,
        statements: &StatementMap,
        options: &CanonicalOptions,
    ) -> EngineResult<String> {
        canonical_table(statements, self.labels.as_deref(), options).to_csv()
    }
}
