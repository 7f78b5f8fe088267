use super::{CacheOutcome, CacheStats, Counters};
use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};
use crate::grid::{FileGridSource, Grid, GridSource};
use crate::log_cache_operation;
use crate::metrics::METRICS;
use crate::utils::{
    modified_at, path_to_forward_slashes, sanitize_file_component, sha256_hex, write_atomic,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use walkdir::WalkDir;

const CACHE_NAME: &str = "sheet";

/// One materialized sheet on disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SheetArtifact {
    pub source: PathBuf,
    pub sheet: String,
    /// Source mtime when the artifact was built.
    pub source_modified: DateTime<Utc>,
    pub built_at: DateTime<Utc>,
    pub grid: Grid,
}

impl SheetArtifact {
    /// Reusable while the source still carries the recorded mtime and the
    /// artifact was built after it.
    pub fn is_fresh(&self, current_modified: DateTime<Utc>) -> bool {
        self.built_at > current_modified && current_modified == self.source_modified
    }
}

/// Per-(file, sheet) grid cache backed by JSON artifacts.
pub struct SheetCache {
    enabled: bool,
    directory: PathBuf,
    source: Arc<dyn GridSource>,
    counters: Counters,
}

impl SheetCache {
    pub fn new(config: &EngineConfig) -> Self {
        Self::with_source(config, Arc::new(FileGridSource))
    }

    pub fn with_source(config: &EngineConfig, source: Arc<dyn GridSource>) -> Self {
        Self {
            enabled: config.cache_enabled,
            directory: config.sheets_directory(),
            source,
            counters: Counters::default(),
        }
    }

    pub fn get_grid(&self, path: &Path, sheet: &str) -> EngineResult<Arc<Grid>> {
        self.get_grid_with_outcome(path, sheet).map(|(grid, _)| grid)
    }

    pub fn get_grid_with_outcome(
        &self,
        path: &Path,
        sheet: &str,
    ) -> EngineResult<(Arc<Grid>, CacheOutcome)> {
        if !self.enabled {
            let mut sheets = self.source.load(path)?;
            let grid = take_sheet(&mut sheets, path, sheet)?;
            return Ok((Arc::new(grid), CacheOutcome::Bypass));
        }

        let current = source_modified(path)?;
        let artifact_path = self.artifact_path(path, sheet);
        if let Some(artifact) = read_artifact(&artifact_path).filter(|a| a.is_fresh(current)) {
            self.counters.hit();
            METRICS.record_cache_hit(CACHE_NAME);
            log_cache_operation!(hit, artifact_path.display(), sheet = sheet);
            return Ok((Arc::new(artifact.grid), CacheOutcome::Hit));
        }

        self.counters.miss();
        METRICS.record_cache_miss(CACHE_NAME);
        log_cache_operation!(miss, artifact_path.display(), sheet = sheet);

        let mut sheets = self.source.load(path)?;
        self.store_all(path, current, &sheets);
        let grid = take_sheet(&mut sheets, path, sheet)?;
        Ok((Arc::new(grid), CacheOutcome::Miss))
    }

    /// Parses `path` and writes every sheet; returns the sheet names.
    pub fn warm(&self, path: &Path) -> EngineResult<Vec<String>> {
        let sheets = self.source.load(path)?;
        if self.enabled {
            let current = source_modified(path)?;
            self.store_all(path, current, &sheets);
        }
        Ok(sheets.keys().cloned().collect())
    }

    /// Stored artifact for (`path`, `sheet`), if a readable one exists.
    pub fn artifact(&self, path: &Path, sheet: &str) -> Option<SheetArtifact> {
        read_artifact(&self.artifact_path(path, sheet))
    }

    /// Removes every artifact of `path`; returns how many were removed.
    pub fn purge(&self, path: &Path) -> EngineResult<usize> {
        if !self.directory.is_dir() {
            return Ok(0);
        }
        let prefix = format!("{}__", file_key(path));
        let mut removed = 0;
        for entry in WalkDir::new(&self.directory)
            .min_depth(1)
            .max_depth(1)
            .into_iter()
            .filter_map(Result::ok)
        {
            let name = entry.file_name().to_string_lossy();
            if entry.file_type().is_file() && name.starts_with(&prefix) {
                fs::remove_file(entry.path())?;
                removed += 1;
            }
        }
        tracing::debug!(path = %path.display(), removed, "purged sheet artifacts");
        Ok(removed)
    }

    /// Removes every sheet artifact.
    pub fn clear(&self) -> EngineResult<usize> {
        if !self.directory.is_dir() {
            return Ok(0);
        }
        let mut removed = 0;
        for entry in WalkDir::new(&self.directory)
            .min_depth(1)
            .max_depth(1)
            .into_iter()
            .filter_map(Result::ok)
            .filter(|entry| entry.file_type().is_file())
        {
            fs::remove_file(entry.path())?;
            removed += 1;
        }
        Ok(removed)
    }

    pub fn stats(&self) -> CacheStats {
        self.counters.stats(0, None)
    }

    pub fn artifact_path(&self, path: &Path, sheet: &str) -> PathBuf {
        self.directory.join(format!(
            "{}__{}.json",
            file_key(path),
            sanitize_file_component(sheet)
        ))
    }

    fn store_all(
        &self,
        path: &Path,
        source_modified: DateTime<Utc>,
        sheets: &indexmap::IndexMap<String, Grid>,
    ) {
        let built_at = Utc::now();
        for (name, grid) in sheets {
            let artifact_path = self.artifact_path(path, name);
            let artifact = SheetArtifact {
                source: path.to_path_buf(),
                sheet: name.clone(),
                source_modified,
                built_at,
                grid: grid.clone(),
            };
            if let Err(err) = write_artifact(&artifact_path, &artifact) {
                self.counters.write_failure();
                METRICS.record_cache_write_failure(CACHE_NAME);
                log_cache_operation!(
                    write_failed,
                    artifact_path.display(),
                    error = %err,
                    category = err.category()
                );
            }
        }
    }
}

/// `<stem>-<hash8>`: the stem for readability, a hash of the full path so
/// equal stems in different folders do not collide.
fn file_key(path: &Path) -> String {
    let canonical = fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
    let stem = path
        .file_stem()
        .map(|stem| sanitize_file_component(&stem.to_string_lossy()))
        .unwrap_or_else(|| "sheet".to_string());
    let hash = sha256_hex(&[path_to_forward_slashes(&canonical).as_bytes()]);
    format!("{stem}-{}", &hash[..8])
}

fn source_modified(path: &Path) -> EngineResult<DateTime<Utc>> {
    let metadata = fs::metadata(path).map_err(|err| EngineError::source_unavailable(path, err))?;
    modified_at(&metadata)
        .ok_or_else(|| EngineError::source_unavailable(path, "modification time unavailable"))
}

fn take_sheet(
    sheets: &mut indexmap::IndexMap<String, Grid>,
    path: &Path,
    sheet: &str,
) -> EngineResult<Grid> {
    sheets
        .swap_remove(sheet)
        .ok_or_else(|| EngineError::SheetNotFound {
            path: path.to_path_buf(),
            sheet: sheet.to_string(),
        })
}

/// Corrupt or unreadable artifacts read as absent.
fn read_artifact(path: &Path) -> Option<SheetArtifact> {
    let bytes = fs::read(path).ok()?;
    match serde_json::from_slice(&bytes) {
        Ok(artifact) => Some(artifact),
        Err(err) => {
            tracing::warn!(
                path = %path.display(),
                error = %err,
                "discarding unreadable sheet artifact"
            );
            None
        }
    }
}

fn write_artifact(path: &Path, artifact: &SheetArtifact) -> EngineResult<()> {
    let cache_write = |reason: String| EngineError::CacheWrite {
        path: path.to_path_buf(),
        reason,
    };
    let bytes = serde_json::to_vec(artifact).map_err(|err| cache_write(err.to_string()))?;
    write_atomic(path, &bytes).map_err(|err| cache_write(err.to_string()))
}
