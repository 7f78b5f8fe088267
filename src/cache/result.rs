use super::{CacheStats, Counters};
use crate::annotation::Annotation;
use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};
use crate::log_cache_operation;
use crate::metrics::METRICS;
use crate::model::{ErrorMap, Highlights, StatementMap};
use crate::utils::{hash_path_metadata, path_to_forward_slashes, sha256_hex, write_atomic};
use chrono::{DateTime, Utc};
use lru::LruCache;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

const CACHE_NAME: &str = "result";
const SOURCE_HASH_LEN: usize = 16;

/// Identity of one sheet of one file version.
///
/// `source` names the sheet of a file at a path; `version` adds the file's
/// size and mtime, so an edited file gets a new version of the same source.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SheetKey {
    source: String,
    version: String,
}

impl SheetKey {
    pub fn for_sheet(path: &Path, sheet: &str) -> EngineResult<Self> {
        let canonical =
            fs::canonicalize(path).map_err(|err| EngineError::source_unavailable(path, err))?;
        let metadata =
            fs::metadata(&canonical).map_err(|err| EngineError::source_unavailable(path, err))?;
        let location = path_to_forward_slashes(&canonical);
        let mut source = sha256_hex(&[location.as_bytes(), sheet.as_bytes()]);
        source.truncate(SOURCE_HASH_LEN);
        let file = hash_path_metadata(&canonical, &metadata);
        Ok(Self {
            source,
            version: sha256_hex(&[file.as_bytes(), sheet.as_bytes()]),
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn version(&self) -> &str {
        &self.version
    }
}

impl fmt::Display for SheetKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.source, self.version)
    }
}

/// Content hash of an annotation, folded with the other inputs that change
/// the result: the item table and the generator settings.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AnnotationKey(String);

impl AnnotationKey {
    pub fn for_annotation(annotation: &Annotation) -> EngineResult<Self> {
        Ok(Self(annotation.content_hash()?))
    }

    pub fn with_item_table(self, fingerprint: &str) -> Self {
        Self(sha256_hex(&[self.0.as_bytes(), b"items", fingerprint.as_bytes()]))
    }

    pub fn with_generator(self, fingerprint: &str) -> Self {
        Self(sha256_hex(&[self.0.as_bytes(), b"generator", fingerprint.as_bytes()]))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AnnotationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedResult {
    pub statements: StatementMap,
    pub highlights: Highlights,
    pub errors: ErrorMap,
    pub created_at: DateTime<Utc>,
}

type Key = (SheetKey, AnnotationKey);

/// Memoized generation results: an in-memory LRU in front of JSON artifacts.
pub struct ResultCache {
    persist: bool,
    directory: PathBuf,
    capacity: usize,
    memory: RwLock<LruCache<Key, Arc<CachedResult>>>,
    counters: Counters,
}

impl ResultCache {
    pub fn new(config: &EngineConfig) -> Self {
        let capacity =
            NonZeroUsize::new(config.cache_capacity.max(1)).unwrap_or(NonZeroUsize::MIN);
        Self {
            persist: config.cache_enabled,
            directory: config.results_directory(),
            capacity: capacity.get(),
            memory: RwLock::new(LruCache::new(capacity)),
            counters: Counters::default(),
        }
    }

    pub fn get(
        &self,
        sheet_key: &SheetKey,
        annotation_key: &AnnotationKey,
    ) -> Option<Arc<CachedResult>> {
        let key = (sheet_key.clone(), annotation_key.clone());
        let cached = self.memory.write().get(&key).cloned();
        let found = cached.or_else(|| {
            let loaded = self.read_disk(sheet_key, annotation_key).map(Arc::new)?;
            self.memory.write().put(key, loaded.clone());
            Some(loaded)
        });

        match &found {
            Some(_) => {
                self.counters.hit();
                METRICS.record_cache_hit(CACHE_NAME);
                log_cache_operation!(hit, annotation_key, sheet_key = %sheet_key);
            }
            None => {
                self.counters.miss();
                METRICS.record_cache_miss(CACHE_NAME);
                log_cache_operation!(miss, annotation_key, sheet_key = %sheet_key);
            }
        }
        found
    }

    /// Stores a result; last write wins. Disk failures are logged and counted.
    ///
    /// Results for older versions of the same sheet are dropped, since no
    /// key can reach them again.
    pub fn put(
        &self,
        sheet_key: &SheetKey,
        annotation_key: &AnnotationKey,
        statements: StatementMap,
        highlights: Highlights,
        errors: ErrorMap,
    ) -> Arc<CachedResult> {
        let result = Arc::new(CachedResult {
            statements,
            highlights,
            errors,
            created_at: Utc::now(),
        });
        {
            let mut memory = self.memory.write();
            let superseded: Vec<Key> = memory
                .iter()
                .map(|(key, _)| key)
                .filter(|(sheet, _)| sheet.source == sheet_key.source && sheet != sheet_key)
                .cloned()
                .collect();
            for key in superseded {
                memory.pop(&key);
            }
            memory.put((sheet_key.clone(), annotation_key.clone()), result.clone());
        }

        if self.persist {
            self.prune_superseded(sheet_key);
            let path = self.artifact_path(sheet_key, annotation_key);
            if let Err(err) = write_result(&path, &result) {
                self.counters.write_failure();
                METRICS.record_cache_write_failure(CACHE_NAME);
                log_cache_operation!(
                    write_failed,
                    path.display(),
                    error = %err,
                    category = err.category()
                );
            }
        }
        result
    }

    /// Drops every entry from memory and disk.
    pub fn clear(&self) -> EngineResult<usize> {
        self.memory.write().clear();
        if !self.directory.is_dir() {
            return Ok(0);
        }
        let mut removed = 0;
        for entry in fs::read_dir(&self.directory)? {
            let entry = entry?;
            if entry.file_type()?.is_file() {
                fs::remove_file(entry.path())?;
                removed += 1;
            }
        }
        Ok(removed)
    }

    pub fn stats(&self) -> CacheStats {
        let entries = self.memory.read().len();
        self.counters.stats(entries, Some(self.capacity))
    }

    pub fn artifact_path(&self, sheet_key: &SheetKey, annotation_key: &AnnotationKey) -> PathBuf {
        self.directory.join(format!("{sheet_key}-{}.json", annotation_key.as_str()))
    }

    /// Removes artifacts of the same sheet written for other file versions.
    fn prune_superseded(&self, sheet_key: &SheetKey) -> usize {
        let Ok(entries) = fs::read_dir(&self.directory) else {
            return 0;
        };
        let same_source = format!("{}-", sheet_key.source);
        let current = format!("{sheet_key}-");
        let mut removed = 0;
        for entry in entries.filter_map(Result::ok) {
            let name = entry.file_name().to_string_lossy().to_string();
            if !name.starts_with(&same_source) || name.starts_with(&current) {
                continue;
            }
            match fs::remove_file(entry.path()) {
                Ok(()) => removed += 1,
                Err(err) => {
                    tracing::warn!(
                        path = %entry.path().display(),
                        error = %err,
                        "could not prune result artifact"
                    );
                }
            }
        }
        if removed > 0 {
            log_cache_operation!(pruned, sheet_key.source, removed = removed);
        }
        removed
    }

    fn read_disk(
        &self,
        sheet_key: &SheetKey,
        annotation_key: &AnnotationKey,
    ) -> Option<CachedResult> {
        if !self.persist {
            return None;
        }
        let path = self.artifact_path(sheet_key, annotation_key);
        let bytes = fs::read(&path).ok()?;
        match serde_json::from_slice(&bytes) {
            Ok(result) => Some(result),
            Err(err) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %err,
                    "discarding unreadable result artifact"
                );
                None
            }
        }
    }
}

fn write_result(path: &Path, result: &CachedResult) -> EngineResult<()> {
    let cache_write = |reason: String| EngineError::CacheWrite {
        path: path.to_path_buf(),
        reason,
    };
    let bytes = serde_json::to_vec(result).map_err(|err| cache_write(err.to_string()))?;
    write_atomic(path, &bytes).map_err(|err| cache_write(err.to_string()))
}
