//! Content-addressed embedding cache: chunk-text hash -> embedding vector,
//! persisted as a flat JSON file.
//!
//! A missing or corrupt file loads as empty rather than failing the caller.
//! Writes are gated behind a dirty flag so a run that touched nothing never
//! rewrites the file. The on-disk shape is a bare object
//! `{ <content-hash>: { vector, timestamp } }` with no wrapper key.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::error::{IndexError, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CacheEntry {
    vector: Vec<f32>,
    /// ms since epoch at last `set`/`get` touch; used by `prune`.
    timestamp: u64,
}

type CacheMap = HashMap<String, CacheEntry>;

#[derive(Debug, Clone, Copy, Default)]
pub struct CacheStats {
    pub entry_count: usize,
    pub hits: u64,
    pub misses: u64,
}

pub struct EmbeddingCache {
    path: PathBuf,
    entries: CacheMap,
    dirty: bool,
    hits: u64,
    misses: u64,
}

impl EmbeddingCache {
    /// Load from `path`. A missing or corrupt file is treated as empty — this
    /// never fails the caller; corruption is logged by the caller if desired.
    pub fn load(path: &Path) -> Self {
        let entries = match std::fs::read_to_string(path) {
            Ok(text) => match serde_json::from_str::<CacheMap>(&text) {
                Ok(map) => map,
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "embedding cache corrupt, starting empty");
                    CacheMap::new()
                }
            },
            Err(_) => CacheMap::new(),
        };
        Self { path: path.to_path_buf(), entries, dirty: false, hits: 0, misses: 0 }
    }

    pub fn get(&mut self, content_hash: &str, now_ms: u64) -> Option<Vec<f32>> {
        match self.entries.get_mut(content_hash) {
            Some(entry) => {
                entry.timestamp = now_ms;
                self.hits += 1;
                self.dirty = true;
                Some(entry.vector.clone())
            }
            None => {
                self.misses += 1;
                None
            }
        }
    }

    pub fn has(&self, content_hash: &str) -> bool {
        self.entries.contains_key(content_hash)
    }

    pub fn set(&mut self, content_hash: String, vector: Vec<f32>, now_ms: u64) {
        self.entries.insert(content_hash, CacheEntry { vector, timestamp: now_ms });
        self.dirty = true;
    }

    pub fn clear(&mut self) {
        if !self.entries.is_empty() {
            self.dirty = true;
        }
        self.entries.clear();
    }

    /// Drop entries whose `now_ms - timestamp > max_age_ms`. Returns the count removed.
    pub fn prune(&mut self, now_ms: u64, max_age_ms: u64) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, e| now_ms.saturating_sub(e.timestamp) <= max_age_ms);
        let removed = before - self.entries.len();
        if removed > 0 {
            self.dirty = true;
        }
        removed
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats { entry_count: self.entries.len(), hits: self.hits, misses: self.misses }
    }

    /// Write to disk only if something changed since load/last save.
    pub fn save(&mut self) -> Result<()> {
        if !self.dirty {
            return Ok(());
        }
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| IndexError::CachePersistFailure(e.to_string()))?;
        }
        let text = serde_json::to_string(&self.entries).map_err(|e| IndexError::CachePersistFailure(e.to_string()))?;
        std::fs::write(&self.path, text).map_err(|e| IndexError::CachePersistFailure(e.to_string()))?;
        self.dirty = false;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let cache = EmbeddingCache::load(&dir.path().join("nope.json"));
        assert_eq!(cache.stats().entry_count, 0);
    }

    #[test]
    fn corrupt_file_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("cache.json");
        std::fs::write(&p, b"{not json").unwrap();
        let cache = EmbeddingCache::load(&p);
        assert_eq!(cache.stats().entry_count, 0);
    }

    #[test]
    fn set_then_get_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let mut cache = EmbeddingCache::load(&dir.path().join("cache.json"));
        cache.set("abc".to_string(), vec![1.0, 2.0], 100);
        assert!(cache.has("abc"));
        assert_eq!(cache.get("abc", 101), Some(vec![1.0, 2.0]));
        assert_eq!(cache.stats().hits, 1);
    }

    #[test]
    fn miss_is_counted() {
        let dir = tempfile::tempdir().unwrap();
        let mut cache = EmbeddingCache::load(&dir.path().join("cache.json"));
        assert_eq!(cache.get("missing", 0), None);
        assert_eq!(cache.stats().misses, 1);
    }

    #[test]
    fn save_skips_write_when_clean() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("cache.json");
        let mut cache = EmbeddingCache::load(&p);
        cache.save().unwrap();
        assert!(!p.exists(), "no-op save on an untouched cache must not create the file");
    }

    #[test]
    fn save_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("nested/cache.json");
        let mut cache = EmbeddingCache::load(&p);
        cache.set("k1".to_string(), vec![0.5, -0.5], 10);
        cache.save().unwrap();

        let mut reloaded = EmbeddingCache::load(&p);
        assert_eq!(reloaded.get("k1", 11), Some(vec![0.5, -0.5]));
    }

    #[test]
    fn prune_removes_stale_entries_only() {
        let dir = tempfile::tempdir().unwrap();
        let mut cache = EmbeddingCache::load(&dir.path().join("cache.json"));
        cache.set("old".to_string(), vec![1.0], 5);
        cache.set("fresh".to_string(), vec![2.0], 95);
        let removed = cache.prune(100, 20);
        assert_eq!(removed, 1);
        assert!(!cache.has("old"));
        assert!(cache.has("fresh"));
    }

    #[test]
    fn clear_empties_and_marks_dirty() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("cache.json");
        let mut cache = EmbeddingCache::load(&p);
        cache.set("k".to_string(), vec![1.0], 1);
        cache.save().unwrap();
        cache.clear();
        cache.save().unwrap();
        let reloaded = EmbeddingCache::load(&p);
        assert_eq!(reloaded.stats().entry_count, 0);
    }

    #[test]
    fn on_disk_shape_is_flat_map_of_hash_to_entry() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("cache.json");
        let mut cache = EmbeddingCache::load(&p);
        cache.set("deadbeef".to_string(), vec![1.0], 1000);
        cache.save().unwrap();
        let raw = std::fs::read_to_string(&p).unwrap();
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert!(value.get("deadbeef").is_some(), "expected a top-level key, not a wrapper object");
        assert!(value.get("entries").is_none());
    }
}
