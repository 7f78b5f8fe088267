/// Prometheus metrics for the statement engine
///
/// Counters for both caches and for generation passes. The registry is
/// process-wide; `encode` renders it in the Prometheus text format.
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use prometheus_client::encoding::{EncodeLabelSet, text::encode};
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::histogram::{Histogram, exponential_buckets};
use prometheus_client::registry::Registry;
use std::sync::Arc;
use std::time::Duration;

/// Global metrics registry instance
pub static METRICS: Lazy<Arc<MetricsCollector>> = Lazy::new(|| Arc::new(MetricsCollector::new()));

/// Labels for cache metrics
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct CacheLabels {
    /// "sheet" or "result"
    pub cache: String,
}

/// Labels for per-cell error metrics
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct CellErrorLabels {
    pub kind: String,
}

pub struct MetricsCollector {
    registry: RwLock<Registry>,

    pub cache_hits_total: Family<CacheLabels, Counter>,
    pub cache_misses_total: Family<CacheLabels, Counter>,
    pub cache_write_failures_total: Family<CacheLabels, Counter>,

    pub statements_generated_total: Counter,
    pub cell_errors_total: Family<CellErrorLabels, Counter>,
    pub generation_duration_seconds: Histogram,
}

impl MetricsCollector {
    pub fn new() -> Self {
        let mut registry = Registry::default();

        let cache_hits_total = Family::<CacheLabels, Counter>::default();
        registry.register(
            "tablegraph_cache_hits_total",
            "Total number of cache hits by cache",
            cache_hits_total.clone(),
        );

        let cache_misses_total = Family::<CacheLabels, Counter>::default();
        registry.register(
            "tablegraph_cache_misses_total",
            "Total number of cache misses by cache",
            cache_misses_total.clone(),
        );

        let cache_write_failures_total = Family::<CacheLabels, Counter>::default();
        registry.register(
            "tablegraph_cache_write_failures_total",
            "Cache artifacts that could not be written",
            cache_write_failures_total.clone(),
        );

        let statements_generated_total = Counter::default();
        registry.register(
            "tablegraph_statements_generated_total",
            "Statements emitted by generation passes",
            statements_generated_total.clone(),
        );

        let cell_errors_total = Family::<CellErrorLabels, Counter>::default();
        registry.register(
            "tablegraph_cell_errors_total",
            "Per-cell errors recorded by generation passes",
            cell_errors_total.clone(),
        );

        // Buckets: 1ms .. ~16s
        let generation_duration_seconds = Histogram::new(exponential_buckets(0.001, 2.5, 12));
        registry.register(
            "tablegraph_generation_duration_seconds",
            "Generation pass duration in seconds",
            generation_duration_seconds.clone(),
        );

        Self {
            registry: RwLock::new(registry),
            cache_hits_total,
            cache_misses_total,
            cache_write_failures_total,
            statements_generated_total,
            cell_errors_total,
            generation_duration_seconds,
        }
    }

    /// Encode metrics in Prometheus text format
    pub fn encode(&self) -> String {
        let mut buffer = String::new();
        let registry = self.registry.read();
        if let Err(err) = encode(&mut buffer, &registry) {
            tracing::warn!(error = %err, "failed to encode metrics");
        }
        buffer
    }

    pub fn record_cache_hit(&self, cache: &str) {
        self.cache_hits_total
            .get_or_create(&CacheLabels {
                cache: cache.to_string(),
            })
            .inc();
    }

    pub fn record_cache_miss(&self, cache: &str) {
        self.cache_misses_total
            .get_or_create(&CacheLabels {
                cache: cache.to_string(),
            })
            .inc();
    }

    pub fn record_cache_write_failure(&self, cache: &str) {
        self.cache_write_failures_total
            .get_or_create(&CacheLabels {
                cache: cache.to_string(),
            })
            .inc();
    }

    pub fn record_generation(&self, statements: usize, duration: Duration) {
        self.statements_generated_total.inc_by(statements as u64);
        self.generation_duration_seconds
            .observe(duration.as_secs_f64());
    }

    pub fn record_cell_error(&self, kind: &str) {
        self.cell_errors_total
            .get_or_create(&CellErrorLabels {
                kind: kind.to_string(),
            })
            .inc();
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}
