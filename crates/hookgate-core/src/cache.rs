//! On-disk cache of validator results keyed by work-tree content hash.
//!
//! Only `passed` results are stored. An entry is reused while it is younger
//! than the configured TTL; reuse is marked with `cached = true`.

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tempfile::NamedTempFile;

use crate::error::{GateError, Result};
use crate::result::{ValidationResult, ValidationStatus};
use crate::stage::HookStage;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct CacheEntry {
    stored_at: DateTime<Utc>,
    result: ValidationResult,
}

#[derive(Debug)]
pub struct ResultCache {
    dir: PathBuf,
    ttl: Duration,
    entries: BTreeMap<String, CacheEntry>,
    dirty: bool,
}

/// Cache key for `validator` in `stage` over a work-tree `fingerprint`.
pub fn cache_key(stage: HookStage, validator: &str, fingerprint: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(stage.name().as_bytes());
    hasher.update(b"\0");
    hasher.update(validator.as_bytes());
    hasher.update(b"\0");
    hasher.update(fingerprint.as_bytes());
    hex::encode(hasher.finalize())
}

impl ResultCache {
    const FILE: &'static str = "results.json";

    /// Open the cache in `dir`. A missing file is an empty cache; an
    /// unreadable one is an error the caller may recover from.
    pub fn open(dir: &Path, ttl_secs: u64) -> Result<Self> {
        let path = dir.join(Self::FILE);
        let entries = match fs::read(&path) {
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(|e| {
                GateError::Context(format!("result cache unreadable at {}: {e}", path.display()))
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(e.into()),
        };
        Ok(Self {
            dir: dir.to_path_buf(),
            ttl: Duration::seconds(ttl_secs.min(i64::MAX as u64) as i64),
            entries,
            dirty: false,
        })
    }

    /// An empty cache that is never persisted.
    pub fn disabled() -> Self {
        Self {
            dir: PathBuf::new(),
            ttl: Duration::zero(),
            entries: BTreeMap::new(),
            dirty: false,
        }
    }

    fn enabled(&self) -> bool {
        !self.dir.as_os_str().is_empty() && self.ttl > Duration::zero()
    }

    pub fn get(&self, key: &str) -> Option<ValidationResult> {
        self.get_at(key, Utc::now())
    }

    fn get_at(&self, key: &str, now: DateTime<Utc>) -> Option<ValidationResult> {
        if !self.enabled() {
            return None;
        }
        let entry = self.entries.get(key)?;
        if now - entry.stored_at > self.ttl {
            return None;
        }
        let mut result = entry.result.clone();
        result.cached = true;
        Some(result)
    }

    /// Remember a result; anything but `passed` is ignored.
    pub fn put(&mut self, key: String, result: &ValidationResult) {
        if !self.enabled() || result.status != ValidationStatus::Passed || result.cached {
            return;
        }
        self.entries.insert(
            key,
            CacheEntry {
                stored_at: Utc::now(),
                result: result.clone(),
            },
        );
        self.dirty = true;
    }

    /// Persist atomically, dropping expired entries.
    pub fn save(&mut self) -> Result<()> {
        if !self.enabled() || !self.dirty {
            return Ok(());
        }
        let now = Utc::now();
        let ttl = self.ttl;
        self.entries.retain(|_, e| now - e.stored_at <= ttl);

        fs::create_dir_all(&self.dir)?;
        let bytes = serde_json::to_vec_pretty(&self.entries)?;
        let mut tmp = NamedTempFile::new_in(&self.dir)?;
        tmp.write_all(&bytes)?;
        tmp.persist(self.dir.join(Self::FILE)).map_err(|e| e.error)?;
        self.dirty = false;
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_passed_results_round_trip_as_cached() {
        let dir = tempfile::tempdir().unwrap();
        let key = cache_key(HookStage::PreCommit, "lint", "abc");
        {
            let mut cache = ResultCache::open(dir.path(), 300).unwrap();
            cache.put(key.clone(), &ValidationResult::passed("clean"));
            cache.save().unwrap();
        }
        let cache = ResultCache::open(dir.path(), 300).unwrap();
        let hit = cache.get(&key).unwrap();
        assert!(hit.cached);
        assert_eq!(hit.detail, "clean");
    }

    #[test]
    fn test_failures_are_not_cached() {
        let dir = tempfile::tempdir().unwrap();
        let mut cache = ResultCache::open(dir.path(), 300).unwrap();
        cache.put("k".to_string(), &ValidationResult::failed("boom"));
        cache.put("s".to_string(), &ValidationResult::skipped("nothing"));
        assert!(cache.is_empty());
    }

    #[test]
    fn test_entries_expire_after_ttl() {
        let dir = tempfile::tempdir().unwrap();
        let mut cache = ResultCache::open(dir.path(), 300).unwrap();
        cache.put("k".to_string(), &ValidationResult::passed("ok"));
        assert!(cache.get_at("k", Utc::now() + Duration::seconds(299)).is_some());
        assert!(cache.get_at("k", Utc::now() + Duration::seconds(301)).is_none());
    }

    #[test]
    fn test_key_depends_on_every_component() {
        let base = cache_key(HookStage::PreCommit, "lint", "abc");
        assert_ne!(base, cache_key(HookStage::PrePush, "lint", "abc"));
        assert_ne!(base, cache_key(HookStage::PreCommit, "test", "abc"));
        assert_ne!(base, cache_key(HookStage::PreCommit, "lint", "abd"));
    }

    #[test]
    fn test_corrupt_cache_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("results.json"), b"{not json").unwrap();
        let err = ResultCache::open(dir.path(), 300).unwrap_err();
        assert!(err.to_string().contains("result cache"));
    }
}
