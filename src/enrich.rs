//! Enrichment service: normalizer + cache + fetcher behind one `resolve`.
//!
//! At most one external call is made per unique normalized title for the
//! life of the cache file. Failed lookups are cached as the sentinel too,
//! so they are not retried on later runs.

use crate::cache::EnrichmentCache;
use crate::error::Result;
use crate::fetcher::MetadataFetcher;
use crate::models::CacheEntry;
use crate::normalize::normalize_title;
use crate::rate_limit::RateLimiter;
use rustc_hash::FxHashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::debug;

/// Resolution counters, readable while resolution is in progress.
#[derive(Default, Debug)]
pub struct EnrichmentCounters {
    pub cache_hits: AtomicUsize,
    pub fetches: AtomicUsize,
    pub fetch_failures: AtomicUsize,
    pub offline_misses: AtomicUsize,
}

#[derive(Default, Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnrichmentSnapshot {
    pub cache_hits: usize,
    pub fetches: usize,
    pub fetch_failures: usize,
    pub offline_misses: usize,
}

impl EnrichmentCounters {
    pub fn snapshot(&self) -> EnrichmentSnapshot {
        EnrichmentSnapshot {
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            fetches: self.fetches.load(Ordering::Relaxed),
            fetch_failures: self.fetch_failures.load(Ordering::Relaxed),
            offline_misses: self.offline_misses.load(Ordering::Relaxed),
        }
    }
}

pub struct EnrichmentService {
    cache: EnrichmentCache,
    /// None = offline: cache-only, misses resolve to an uncached sentinel
    fetcher: Option<Box<dyn MetadataFetcher>>,
    limiter: Box<dyn RateLimiter>,
    /// Per-key locks held while a key is being fetched
    in_flight: Mutex<FxHashMap<String, Arc<Mutex<()>>>>,
    counters: EnrichmentCounters,
}

impl EnrichmentService {
    pub fn new(
        cache: EnrichmentCache,
        fetcher: Box<dyn MetadataFetcher>,
        limiter: Box<dyn RateLimiter>,
    ) -> Self {
        Self::build(cache, Some(fetcher), limiter)
    }

    /// Cache-only service, used when no API key is configured.
    pub fn offline(cache: EnrichmentCache) -> Self {
        Self::build(cache, None, Box::new(crate::rate_limit::Unthrottled))
    }

    fn build(
        cache: EnrichmentCache,
        fetcher: Option<Box<dyn MetadataFetcher>>,
        limiter: Box<dyn RateLimiter>,
    ) -> Self {
        Self {
            cache,
            fetcher,
            limiter,
            in_flight: Mutex::new(FxHashMap::default()),
            counters: EnrichmentCounters::default(),
        }
    }

    pub fn is_offline(&self) -> bool {
        self.fetcher.is_none()
    }

    pub fn cache(&self) -> &EnrichmentCache {
        &self.cache
    }

    pub fn counters(&self) -> EnrichmentSnapshot {
        self.counters.snapshot()
    }

    /// Resolve director/plot/box office for a raw title.
    /// Only cache persistence errors are returned; lookup failures resolve
    /// to the sentinel entry.
    pub fn resolve(&self, raw_title: &str) -> Result<CacheEntry> {
        let key = normalize_title(raw_title);

        if let Some(hit) = self.cached(&key) {
            return Ok(hit);
        }

        let Some(fetcher) = self.fetcher.as_ref() else {
            self.counters.offline_misses.fetch_add(1, Ordering::Relaxed);
            return Ok(CacheEntry::not_available());
        };

        // Nothing to look up: don't spend a request or a cache slot on it
        if key.is_empty() {
            debug!(title = raw_title, "empty normalized title, skipping lookup");
            return Ok(CacheEntry::not_available());
        }

        let key_lock = self.key_lock(&key);
        let guard = key_lock.lock().unwrap_or_else(PoisonError::into_inner);

        // Another resolver may have fetched this key while we waited
        let result = match self.cached(&key) {
            Some(hit) => Ok(hit),
            None => self.fetch_and_store(&**fetcher, &key),
        };

        drop(guard);
        self.locks().remove(&key);
        result
    }

    fn fetch_and_store(&self, fetcher: &dyn MetadataFetcher, key: &str) -> Result<CacheEntry> {
        self.limiter.acquire();
        let entry = fetcher.fetch(key);
        self.counters.fetches.fetch_add(1, Ordering::Relaxed);
        if entry.is_not_available() {
            self.counters.fetch_failures.fetch_add(1, Ordering::Relaxed);
        }

        self.cache.put(key, entry.clone())?;
        Ok(entry)
    }

    fn cached(&self, key: &str) -> Option<CacheEntry> {
        let hit = self.cache.get(key)?;
        self.counters.cache_hits.fetch_add(1, Ordering::Relaxed);
        Some(hit)
    }

    fn key_lock(&self, key: &str) -> Arc<Mutex<()>> {
        Arc::clone(self.locks().entry(key.to_string()).or_default())
    }

    fn locks(&self) -> MutexGuard<'_, FxHashMap<String, Arc<Mutex<()>>>> {
        self.in_flight.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rate_limit::Unthrottled;
    use rayon::prelude::*;
    use std::time::Duration;
    use tempfile::TempDir;

    /// Fetcher that records every title it is asked for.
    struct RecordingFetcher {
        calls: Arc<Mutex<Vec<String>>>,
        response: CacheEntry,
        delay: Duration,
    }

    impl MetadataFetcher for RecordingFetcher {
        fn fetch(&self, normalized_title: &str) -> CacheEntry {
            std::thread::sleep(self.delay);
            self.calls.lock().unwrap().push(normalized_title.to_string());
            self.response.clone()
        }
    }

    fn service_with(
        dir: &TempDir,
        response: CacheEntry,
        delay: Duration,
    ) -> (EnrichmentService, Arc<Mutex<Vec<String>>>) {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let cache = EnrichmentCache::open(dir.path().join("cache.json")).unwrap();
        let fetcher = RecordingFetcher {
            calls: Arc::clone(&calls),
            response,
            delay,
        };
        let service = EnrichmentService::new(cache, Box::new(fetcher), Box::new(Unthrottled));
        (service, calls)
    }

    #[test]
    fn test_second_resolve_uses_cache() {
        let dir = TempDir::new().unwrap();
        let heat = CacheEntry::new("Michael Mann", "A group of professional bank robbers...", "$67M");
        let (service, calls) = service_with(&dir, heat.clone(), Duration::ZERO);

        assert_eq!(service.resolve("Heat (1995)").unwrap(), heat);
        assert_eq!(service.resolve("Heat (1995)").unwrap(), heat);
        // Same normalized key, different raw title
        assert_eq!(service.resolve("Heat").unwrap(), heat);

        assert_eq!(*calls.lock().unwrap(), vec!["Heat".to_string()]);
        let counters = service.counters();
        assert_eq!(counters.fetches, 1);
        assert_eq!(counters.cache_hits, 2);
    }

    #[test]
    fn test_failed_fetch_is_cached() {
        let dir = TempDir::new().unwrap();
        let (service, calls) = service_with(&dir, CacheEntry::not_available(), Duration::ZERO);

        assert!(service.resolve("Obscure Film (1921)").unwrap().is_not_available());
        assert!(service.resolve("Obscure Film (1921)").unwrap().is_not_available());

        assert_eq!(calls.lock().unwrap().len(), 1);
        assert_eq!(service.counters().fetch_failures, 1);
        assert_eq!(
            service.cache().get("Obscure Film"),
            Some(CacheEntry::not_available())
        );
    }

    #[test]
    fn test_cache_persists_across_services() {
        let dir = TempDir::new().unwrap();
        let entry = CacheEntry::new("Michael Mann", "plot", "$67M");
        {
            let (service, _) = service_with(&dir, entry.clone(), Duration::ZERO);
            service.resolve("Heat (1995)").unwrap();
        }

        let (restarted, calls) = service_with(&dir, CacheEntry::not_available(), Duration::ZERO);
        assert_eq!(restarted.resolve("Heat (1995)").unwrap(), entry);
        assert!(calls.lock().unwrap().is_empty());
    }

    #[test]
    fn test_offline_miss_is_not_cached() {
        let dir = TempDir::new().unwrap();
        let cache = EnrichmentCache::open(dir.path().join("cache.json")).unwrap();
        cache
            .put("Toy Story", CacheEntry::new("John Lasseter", "plot", "$2M"))
            .unwrap();
        let service = EnrichmentService::offline(cache);

        assert!(service.is_offline());
        assert_eq!(service.resolve("Toy Story (1995)").unwrap().director, "John Lasseter");
        assert!(service.resolve("Heat (1995)").unwrap().is_not_available());
        assert!(!service.cache().contains("Heat"));
        assert_eq!(service.counters().offline_misses, 1);
    }

    #[test]
    fn test_empty_key_skips_lookup() {
        let dir = TempDir::new().unwrap();
        let (service, calls) = service_with(&dir, CacheEntry::new("x", "y", "z"), Duration::ZERO);

        assert!(service.resolve(" (1995) ").unwrap().is_not_available());
        assert!(calls.lock().unwrap().is_empty());
        assert!(service.cache().is_empty());
    }

    #[test]
    fn test_concurrent_resolves_fetch_each_key_once() {
        let dir = TempDir::new().unwrap();
        let (service, calls) = service_with(
            &dir,
            CacheEntry::new("Someone", "plot", "$1"),
            Duration::from_millis(20),
        );

        let titles: Vec<String> = (0..32)
            .map(|i| format!("Title {} ({})", i % 4, 1990 + i))
            .collect();

        let pool = rayon::ThreadPoolBuilder::new().num_threads(8).build().unwrap();
        pool.install(|| {
            titles
                .par_iter()
                .for_each(|t| assert!(!service.resolve(t).unwrap().is_not_available()));
        });

        let mut seen = calls.lock().unwrap().clone();
        seen.sort();
        assert_eq!(seen, vec!["Title 0", "Title 1", "Title 2", "Title 3"]);
        assert_eq!(service.counters().fetches, 4);
        assert_eq!(service.counters().cache_hits, 28);
        assert!(service.locks().is_empty());
    }

    #[test]
    fn test_waiter_served_from_cache_releases_key_lock() {
        let dir = TempDir::new().unwrap();
        let (service, calls) = service_with(&dir, CacheEntry::new("x", "y", "z"), Duration::ZERO);

        // Simulate a resolver that filled the cache while this one waited on the key lock
        let held = service.key_lock("Heat");
        let guard = held.lock().unwrap();
        std::thread::scope(|s| {
            // Misses the cache, then blocks on the key lock
            let waiter = s.spawn(|| service.resolve("Heat (1995)"));
            std::thread::sleep(Duration::from_millis(100));
            service
                .cache()
                .put("Heat", CacheEntry::new("Michael Mann", "plot", "$67M"))
                .unwrap();
            drop(guard);
            assert_eq!(waiter.join().unwrap().unwrap().director, "Michael Mann");
        });

        assert!(calls.lock().unwrap().is_empty());
        assert!(service.locks().is_empty());
    }

    #[test]
    fn test_failed_store_releases_key_lock() {
        let dir = TempDir::new().unwrap();
        let sub = dir.path().join("cache");
        std::fs::create_dir(&sub).unwrap();
        let cache = EnrichmentCache::open(sub.join("cache.json")).unwrap();
        let fetcher = RecordingFetcher {
            calls: Arc::new(Mutex::new(Vec::new())),
            response: CacheEntry::new("Michael Mann", "plot", "$67M"),
            delay: Duration::ZERO,
        };
        let service = EnrichmentService::new(cache, Box::new(fetcher), Box::new(Unthrottled));
        std::fs::remove_dir_all(&sub).unwrap();

        assert!(service.resolve("Heat (1995)").is_err());
        assert!(!service.cache().contains("Heat"));
        assert!(service.locks().is_empty());
    }
}
