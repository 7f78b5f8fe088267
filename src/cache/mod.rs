//! Freshness-aware caches for parsed sheets and generation results.

pub mod result;
pub mod sheet;

pub use result::{AnnotationKey, CachedResult, ResultCache, SheetKey};
pub use sheet::{SheetArtifact, SheetCache};

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// How a cache answered a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum CacheOutcome {
    Hit,
    Miss,
    /// Caching is disabled; the value was computed and not stored.
    Bypass,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub write_failures: u64,
    /// Entries held in memory, when the cache has a memory layer.
    pub entries: usize,
    pub capacity: Option<usize>,
}

impl CacheStats {
    pub fn operations(&self) -> u64 {
        self.hits + self.misses
    }

    pub fn hit_rate(&self) -> f64 {
        if self.operations() == 0 {
            0.0
        } else {
            self.hits as f64 / self.operations() as f64
        }
    }
}

/// Hit/miss/write-failure counters shared by both caches.
#[derive(Debug, Default)]
pub(crate) struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    write_failures: AtomicU64,
}

impl Counters {
    pub(crate) fn hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn write_failure(&self) {
        self.write_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn stats(&self, entries: usize, capacity: Option<usize>) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            write_failures: self.write_failures.load(Ordering::Relaxed),
            entries,
            capacity,
        }
    }
}
