//! Persistent enrichment cache keyed by normalized title.
//!
//! Write-through: every `put` rewrites the whole mapping to disk before it
//! returns. The file is replaced via a sibling temp file + rename, so a
//! crash mid-write leaves the previous cache intact.

use crate::error::{EtlError, Result};
use crate::models::CacheEntry;
use rustc_hash::FxHashMap;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::debug;

pub type CacheMap = FxHashMap<String, CacheEntry>;

/// On-disk value. Older cache files store `[director, plot, box_office]`.
#[derive(Deserialize)]
#[serde(untagged)]
enum StoredEntry {
    Fields(CacheEntry),
    Legacy([String; 3]),
}

impl From<StoredEntry> for CacheEntry {
    fn from(stored: StoredEntry) -> Self {
        match stored {
            StoredEntry::Fields(entry) => entry,
            StoredEntry::Legacy([director, plot, box_office]) => {
                CacheEntry::new(director, plot, box_office)
            }
        }
    }
}

pub struct EnrichmentCache {
    path: PathBuf,
    entries: Mutex<CacheMap>,
}

impl EnrichmentCache {
    /// Open the cache at `path`, loading any prior state.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let entries = load(&path)?;
        debug!(path = %path.display(), entries = entries.len(), "loaded enrichment cache");
        Ok(Self {
            path,
            entries: Mutex::new(entries),
        })
    }

    pub fn get(&self, key: &str) -> Option<CacheEntry> {
        self.lock().get(key).cloned()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.lock().contains_key(key)
    }

    /// Insert or overwrite `key`, then persist the full mapping.
    /// The lock is held across the write so concurrent puts are serialized.
    /// On a failed write the in-memory mapping is rolled back, so memory
    /// never holds an entry the file doesn't.
    pub fn put(&self, key: &str, entry: CacheEntry) -> Result<()> {
        let mut entries = self.lock();
        let previous = entries.insert(key.to_string(), entry);
        if let Err(e) = save(&self.path, &entries) {
            match previous {
                Some(prev) => entries.insert(key.to_string(), prev),
                None => entries.remove(key),
            };
            return Err(e);
        }
        Ok(())
    }

    /// Drop every entry matching `pred` and persist. Returns how many were removed.
    pub fn remove_where(&self, pred: impl Fn(&str, &CacheEntry) -> bool) -> Result<usize> {
        let mut entries = self.lock();
        let kept: CacheMap = entries
            .iter()
            .filter(|(k, v)| !pred(k, v))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        let removed = entries.len() - kept.len();
        if removed > 0 {
            save(&self.path, &kept)?;
            *entries = kept;
        }
        Ok(removed)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Copy of the current mapping.
    pub fn snapshot(&self) -> CacheMap {
        self.lock().clone()
    }

    fn lock(&self) -> MutexGuard<'_, CacheMap> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Read persisted state. A missing file is an empty cache; an unreadable or
/// unparsable one is an error.
pub fn load(path: &Path) -> Result<CacheMap> {
    let data = match std::fs::read_to_string(path) {
        Ok(data) => data,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(CacheMap::default()),
        Err(source) => {
            return Err(EtlError::CacheIo {
                path: path.to_path_buf(),
                source,
            })
        }
    };

    let stored: FxHashMap<String, StoredEntry> =
        serde_json::from_str(&data).map_err(|source| EtlError::CacheCorrupt {
            path: path.to_path_buf(),
            source,
        })?;

    Ok(stored.into_iter().map(|(k, v)| (k, v.into())).collect())
}

fn save(path: &Path, entries: &CacheMap) -> Result<()> {
    // Sorted keys keep the file diffable between runs
    let sorted: BTreeMap<&String, &CacheEntry> = entries.iter().collect();
    let json = serde_json::to_string_pretty(&sorted).map_err(|source| EtlError::CacheCorrupt {
        path: path.to_path_buf(),
        source,
    })?;

    let io_err = |source| EtlError::CacheIo {
        path: path.to_path_buf(),
        source,
    };

    let tmp = temp_path(path);
    std::fs::write(&tmp, json).map_err(io_err)?;
    std::fs::rename(&tmp, path).map_err(io_err)?;
    Ok(())
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| "cache.json".into());
    name.push(".tmp");
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn toy_story() -> CacheEntry {
        CacheEntry::new("John Lasseter", "A cowboy doll is threatened...", "$2M")
    }

    #[test]
    fn test_missing_file_is_empty_cache() {
        let dir = TempDir::new().unwrap();
        let cache = EnrichmentCache::open(dir.path().join("omdb_cache.json")).unwrap();
        assert!(cache.is_empty());
        assert_eq!(cache.get("Toy Story"), None);
    }

    #[test]
    fn test_put_survives_restart() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("omdb_cache.json");

        let cache = EnrichmentCache::open(&path).unwrap();
        cache.put("Toy Story", toy_story()).unwrap();
        cache.put("Heat", CacheEntry::not_available()).unwrap();
        drop(cache);

        let reopened = EnrichmentCache::open(&path).unwrap();
        assert_eq!(reopened.len(), 2);
        assert_eq!(reopened.get("Toy Story"), Some(toy_story()));
        assert_eq!(reopened.get("Heat"), Some(CacheEntry::not_available()));
        assert!(!dir.path().join("omdb_cache.json.tmp").exists());
    }

    #[test]
    fn test_put_overwrites() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cache.json");
        let cache = EnrichmentCache::open(&path).unwrap();
        cache.put("Heat", CacheEntry::not_available()).unwrap();
        cache.put("Heat", CacheEntry::new("Michael Mann", "plot", "$67M")).unwrap();

        let loaded = load(&path).unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded["Heat"].director, "Michael Mann");
    }

    #[test]
    fn test_corrupt_file_fails_loudly() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cache.json");
        std::fs::write(&path, "{ not json").unwrap();

        let result = EnrichmentCache::open(&path);
        assert!(matches!(result, Err(EtlError::CacheCorrupt { .. })));
    }

    #[test]
    fn test_wrong_shape_is_corrupt() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cache.json");
        std::fs::write(&path, r#"{"Heat": 42}"#).unwrap();
        assert!(matches!(load(&path), Err(EtlError::CacheCorrupt { .. })));
    }

    #[test]
    fn test_legacy_array_entries() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cache.json");
        std::fs::write(
            &path,
            r#"{
  "Toy Story": ["John Lasseter", "A cowboy doll is threatened...", "$2M"],
  "Heat": {"director": "Michael Mann", "plot": "p", "box_office": "$67M"}
}"#,
        )
        .unwrap();

        let cache = EnrichmentCache::open(&path).unwrap();
        assert_eq!(cache.get("Toy Story"), Some(toy_story()));
        assert_eq!(cache.get("Heat").unwrap().box_office, "$67M");
    }

    #[test]
    fn test_failed_put_leaves_memory_untouched() {
        let dir = TempDir::new().unwrap();
        let sub = dir.path().join("cache");
        std::fs::create_dir(&sub).unwrap();
        let cache = EnrichmentCache::open(sub.join("cache.json")).unwrap();
        cache.put("Toy Story", toy_story()).unwrap();

        std::fs::remove_dir_all(&sub).unwrap();

        let result = cache.put("Heat", CacheEntry::new("Michael Mann", "plot", "$67M"));
        assert!(matches!(result, Err(EtlError::CacheIo { .. })));
        assert!(!cache.contains("Heat"));

        // Overwrite of an existing key rolls back to the old value
        assert!(cache.put("Toy Story", CacheEntry::not_available()).is_err());
        assert_eq!(cache.get("Toy Story"), Some(toy_story()));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_failed_remove_where_leaves_memory_untouched() {
        let dir = TempDir::new().unwrap();
        let sub = dir.path().join("cache");
        std::fs::create_dir(&sub).unwrap();
        let cache = EnrichmentCache::open(sub.join("cache.json")).unwrap();
        cache.put("Heat", CacheEntry::not_available()).unwrap();

        std::fs::remove_dir_all(&sub).unwrap();

        assert!(cache.remove_where(|_, e| e.is_not_available()).is_err());
        assert!(cache.contains("Heat"));
    }

    #[test]
    fn test_remove_where_persists() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cache.json");
        let cache = EnrichmentCache::open(&path).unwrap();
        cache.put("Toy Story", toy_story()).unwrap();
        cache.put("Heat", CacheEntry::not_available()).unwrap();

        let removed = cache.remove_where(|_, e| e.is_not_available()).unwrap();
        assert_eq!(removed, 1);

        let reopened = EnrichmentCache::open(&path).unwrap();
        assert!(reopened.contains("Toy Story"));
        assert!(!reopened.contains("Heat"));
    }
}
