//! Per-scope analysis cache.
//!
//! One JSON file per scope holds the complete unit-result map of the last
//! finished run. The file is only ever replaced whole, never merged. Nothing
//! in here fails its caller: unreadable files are misses, failed writes are
//! logged.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::config::AnalysisOptions;
use crate::fingerprint::sha256_hex;
use crate::models::{Granularity, UnitResult};

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache file I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("cache file is corrupt: {0}")]
    Corrupt(#[from] serde_json::Error),
}

/// Options that change what a run produces. A cache built under different
/// values is never reused.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CacheOptions {
    pub granularity: Granularity,
    pub max_results: usize,
    pub similarity_threshold: f32,
}

impl From<&AnalysisOptions> for CacheOptions {
    fn from(options: &AnalysisOptions) -> Self {
        Self {
            granularity: options.granularity,
            max_results: options.max_results,
            similarity_threshold: options.similarity_threshold,
        }
    }
}

/// Everything a cached run must match to be reused.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheKey {
    pub document_hash: String,
    pub corpus_state_hash: String,
    pub options: CacheOptions,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AnalysisCache {
    pub document_hash: String,
    pub corpus_state_hash: String,
    /// Unit ids in document order.
    pub unit_order: Vec<String>,
    pub units: HashMap<String, UnitResult>,
    pub created_at: DateTime<Utc>,
    pub options: CacheOptions,
}

impl AnalysisCache {
    pub fn new(key: CacheKey, results: &[UnitResult]) -> Self {
        Self {
            document_hash: key.document_hash,
            corpus_state_hash: key.corpus_state_hash,
            unit_order: results.iter().map(|r| r.unit_id.clone()).collect(),
            units: results
                .iter()
                .map(|r| (r.unit_id.clone(), r.clone()))
                .collect(),
            created_at: Utc::now(),
            options: key.options,
        }
    }

    /// Unit results in document order.
    pub fn ordered_results(&self) -> Vec<UnitResult> {
        self.unit_order
            .iter()
            .filter_map(|id| self.units.get(id).cloned())
            .collect()
    }

    fn matches(&self, key: &CacheKey) -> bool {
        self.document_hash == key.document_hash
            && self.corpus_state_hash == key.corpus_state_hash
            && self.options == key.options
    }
}

pub struct CacheManager {
    dir: PathBuf,
    ttl: Duration,
}

impl CacheManager {
    pub fn new(dir: impl Into<PathBuf>, ttl_hours: i64) -> Self {
        Self {
            dir: dir.into(),
            ttl: Duration::hours(ttl_hours),
        }
    }

    /// The scope's cache when it is fresh and matches `key`.
    pub fn load(&self, scope: &str, key: &CacheKey) -> Option<AnalysisCache> {
        let cache = self.peek(scope)?;
        if !cache.matches(key) {
            tracing::debug!("Cache for scope {scope} does not match the request");
            return None;
        }
        Some(cache)
    }

    /// The scope's cache when it is fresh, whatever it was built from.
    pub fn peek(&self, scope: &str) -> Option<AnalysisCache> {
        let path = self.path_for(scope);
        let cache = match read_cache(&path) {
            Ok(Some(cache)) => cache,
            Ok(None) => return None,
            Err(e) => {
                tracing::warn!("Ignoring cache {}: {e}", path.display());
                return None;
            }
        };

        if Utc::now() - cache.created_at >= self.ttl {
            tracing::debug!("Cache for scope {scope} expired");
            return None;
        }
        Some(cache)
    }

    /// Replace the scope's cache file. Failures are logged only.
    pub fn save(&self, scope: &str, cache: &AnalysisCache) {
        let path = self.path_for(scope);
        match write_cache(&self.dir, &path, cache) {
            Ok(()) => tracing::info!(
                "Cached {} unit results for scope {scope}",
                cache.unit_order.len()
            ),
            Err(e) => tracing::warn!("Failed to write cache {}: {e}", path.display()),
        }
    }

    /// Remove the scope's cache file. Returns whether a file was removed.
    pub fn clear(&self, scope: &str) -> bool {
        let path = self.path_for(scope);
        match std::fs::remove_file(&path) {
            Ok(()) => {
                tracing::info!("Cleared cache for scope {scope}");
                true
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => false,
            Err(e) => {
                tracing::warn!("Failed to remove cache {}: {e}", path.display());
                false
            }
        }
    }

    fn path_for(&self, scope: &str) -> PathBuf {
        let hash = sha256_hex(scope);
        self.dir.join(format!("analysis-{}.json", &hash[..16]))
    }
}

fn read_cache(path: &Path) -> Result<Option<AnalysisCache>, CacheError> {
    let data = match std::fs::read_to_string(path) {
        Ok(data) => data,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    Ok(Some(serde_json::from_str(&data)?))
}

/// Atomic write via temp file + rename.
fn write_cache(dir: &Path, path: &Path, cache: &AnalysisCache) -> Result<(), CacheError> {
    std::fs::create_dir_all(dir)?;
    let data = serde_json::to_string(cache)?;
    let tmp_path = path.with_extension("json.tmp");
    std::fs::write(&tmp_path, data)?;
    std::fs::rename(&tmp_path, path)?;
    Ok(())
}
