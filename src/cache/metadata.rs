//! Metadata Cache Implementation
//!
//! TTL cache for file and folder metadata using Moka, keyed by normalized
//! (lower-cased) path. Uses the synchronous cache to match the adapter's
//! blocking call semantics.
//!
//! Entries past their TTL are treated as absent on read even if Moka has not
//! evicted them yet. A TTL of zero disables caching: every lookup misses and
//! inserts are dropped.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use moka::sync::Cache;
use tracing::{debug, trace};

use crate::config::MAX_CACHE_TTL;
use crate::dropbox::MetadataRecord;
use crate::path::{cache_key, is_within};

/// Cache entry for a single path's metadata
#[derive(Clone, Debug)]
pub struct CachedRecord {
    /// The metadata record
    pub record: MetadataRecord,
    /// When this entry was cached
    pub cached_at: Instant,
}

/// Cache entry for a folder listing
#[derive(Clone, Debug)]
pub struct CachedDir {
    /// The folder's children
    pub entries: Vec<MetadataRecord>,
    /// When this entry was cached
    pub cached_at: Instant,
}

/// Metadata cache with TTL support
///
/// Holds two maps sharing one TTL:
/// - per-path metadata records
/// - folder listings, a derived view keyed by the folder's path
pub struct MetadataCache {
    /// Entry lifetime; zero disables caching
    ttl: Duration,
    /// Cache for metadata records by path key
    attr_cache: Cache<String, CachedRecord>,
    /// Cache for folder listings by path key
    dir_cache: Cache<String, CachedDir>,
    /// Cache hit counter
    hits: AtomicU64,
    /// Cache miss counter
    misses: AtomicU64,
}

impl MetadataCache {
    /// Create a cache whose entries live for `ttl`, capped at [`MAX_CACHE_TTL`]
    pub fn new(ttl: Duration) -> Self {
        let ttl = ttl.min(MAX_CACHE_TTL);
        let mut attr_builder = Cache::builder().name("metadata_cache");
        let mut dir_builder = Cache::builder().name("listing_cache");
        if !ttl.is_zero() {
            attr_builder = attr_builder.time_to_live(ttl);
            dir_builder = dir_builder.time_to_live(ttl);
        }

        Self {
            ttl,
            attr_cache: attr_builder.build(),
            dir_cache: dir_builder.build(),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Whether caching is enabled (TTL > 0)
    pub fn is_enabled(&self) -> bool {
        !self.ttl.is_zero()
    }

    /// Configured TTL
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    fn is_fresh(&self, cached_at: Instant) -> bool {
        cached_at.elapsed() < self.ttl
    }

    fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    /// Get metadata from cache
    ///
    /// Returns Some(record) only if present and unexpired.
    /// Updates hit/miss counters.
    pub fn get(&self, path: &str) -> Option<MetadataRecord> {
        let key = cache_key(path);
        match self.attr_cache.get(&key) {
            Some(cached) if self.is_fresh(cached.cached_at) => {
                self.record_hit();
                trace!(path = %key, "Cache HIT for metadata");
                Some(cached.record)
            }
            _ => {
                self.record_miss();
                trace!(path = %key, "Cache MISS for metadata");
                None
            }
        }
    }

    /// Like [`get`](Self::get) but leaves the hit/miss counters alone
    pub fn peek(&self, path: &str) -> Option<MetadataRecord> {
        self.attr_cache
            .get(&cache_key(path))
            .filter(|cached| self.is_fresh(cached.cached_at))
            .map(|cached| cached.record)
    }

    /// Insert or replace metadata, resetting its expiry
    pub fn put(&self, path: &str, record: MetadataRecord) {
        if !self.is_enabled() {
            return;
        }
        let key = cache_key(path);
        debug!(path = %key, size = record.size, is_dir = record.is_directory, "Cached metadata");
        self.attr_cache.insert(
            key,
            CachedRecord {
                record,
                cached_at: Instant::now(),
            },
        );
    }

    /// Get a folder listing from cache
    pub fn get_listing(&self, path: &str) -> Option<Vec<MetadataRecord>> {
        let key = cache_key(path);
        match self.dir_cache.get(&key) {
            Some(cached) if self.is_fresh(cached.cached_at) => {
                self.record_hit();
                trace!(path = %key, entries = cached.entries.len(), "Cache HIT for listing");
                Some(cached.entries)
            }
            _ => {
                self.record_miss();
                trace!(path = %key, "Cache MISS for listing");
                None
            }
        }
    }

    /// Insert a folder listing
    pub fn put_listing(&self, path: &str, entries: Vec<MetadataRecord>) {
        if !self.is_enabled() {
            return;
        }
        let key = cache_key(path);
        debug!(path = %key, entries = entries.len(), "Cached folder listing");
        self.dir_cache.insert(
            key,
            CachedDir {
                entries,
                cached_at: Instant::now(),
            },
        );
    }

    /// Remove the metadata and listing cached for `path`
    ///
    /// Call this when the object at `path` changes.
    pub fn invalidate(&self, path: &str) {
        let key = cache_key(path);
        self.attr_cache.invalidate(&key);
        self.dir_cache.invalidate(&key);
        debug!(path = %key, "Invalidated cache for path");
    }

    /// Remove only the listing cached for folder `path`
    ///
    /// Call this when a child of `path` is created, removed or renamed.
    pub fn invalidate_listing(&self, path: &str) {
        let key = cache_key(path);
        self.dir_cache.invalidate(&key);
        debug!(path = %key, "Invalidated listing for folder");
    }

    /// Remove `path` and everything nested beneath it
    pub fn invalidate_prefix(&self, path: &str) {
        let prefix = cache_key(path);

        let stale: Vec<String> = self
            .attr_cache
            .iter()
            .map(|(k, _)| k)
            .chain(self.dir_cache.iter().map(|(k, _)| k))
            .filter(|k| is_within(k, &prefix))
            .map(|k| k.to_string())
            .collect();

        for key in &stale {
            self.attr_cache.invalidate(key);
            self.dir_cache.invalidate(key);
        }
        self.attr_cache.invalidate(&prefix);
        self.dir_cache.invalidate(&prefix);

        debug!(path = %prefix, entries = stale.len(), "Invalidated cache subtree");
    }

    /// Clear all caches
    ///
    /// Call this on close or when resetting state.
    pub fn clear(&self) {
        self.attr_cache.invalidate_all();
        self.dir_cache.invalidate_all();
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
        debug!("Cleared all metadata caches");
    }

    /// Get cache statistics
    ///
    /// Returns (hits, misses, hit_rate)
    pub fn stats(&self) -> (u64, u64, f64) {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;
        let hit_rate = if total > 0 {
            (hits as f64 / total as f64) * 100.0
        } else {
            0.0
        };
        (hits, misses, hit_rate)
    }

    /// Log current cache metrics
    pub fn log_metrics(&self) {
        let (hits, misses, hit_rate) = self.stats();

        debug!(
            hits = hits,
            misses = misses,
            hit_rate = format!("{:.1}%", hit_rate),
            attr_entries = self.attr_cache.entry_count(),
            dir_entries = self.dir_cache.entry_count(),
            ttl_secs = self.ttl.as_secs(),
            "Cache metrics"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::SystemTime;

    fn file_record(path: &str, size: u64) -> MetadataRecord {
        MetadataRecord {
            path: path.to_string(),
            name: crate::path::base_name(path).to_string(),
            size,
            is_directory: false,
            rev: Some("015f".to_string()),
            content_hash: None,
            modified: None,
            fetched_at: SystemTime::now(),
        }
    }

    fn dir_record(path: &str) -> MetadataRecord {
        MetadataRecord {
            is_directory: true,
            size: 0,
            rev: None,
            ..file_record(path, 0)
        }
    }

    #[test]
    fn test_cache_hit_miss() {
        let cache = MetadataCache::new(Duration::from_secs(60));
        let record = file_record("/a/b.txt", 100);

        // Initially miss
        assert!(cache.get("/a/b.txt").is_none());
        let (_, _, hit_rate) = cache.stats();
        assert_eq!(hit_rate, 0.0);

        // Insert and hit
        cache.put("/a/b.txt", record.clone());
        assert_eq!(cache.get("/a/b.txt"), Some(record));

        let (hits, misses, hit_rate) = cache.stats();
        assert_eq!(hits, 1);
        assert_eq!(misses, 1);
        assert!(hit_rate > 49.0 && hit_rate < 51.0); // ~50%
    }

    #[test]
    fn test_case_and_slash_variants_share_entry() {
        let cache = MetadataCache::new(Duration::from_secs(60));
        cache.put("/Photos/Cat.JPG", file_record("/Photos/Cat.JPG", 5));

        assert!(cache.get("/photos/cat.jpg").is_some());
        assert!(cache.get("photos//Cat.jpg/").is_some());
    }

    #[test]
    fn test_cache_invalidation() {
        let cache = MetadataCache::new(Duration::from_secs(60));

        cache.put("/a/b.txt", file_record("/a/b.txt", 100));
        assert!(cache.get("/a/b.txt").is_some());

        cache.invalidate("/a/b.txt");
        assert!(cache.get("/a/b.txt").is_none());

        // Idempotent
        cache.invalidate("/a/b.txt");
        assert!(cache.get("/a/b.txt").is_none());
    }

    #[test]
    fn test_invalidate_prefix() {
        let cache = MetadataCache::new(Duration::from_secs(60));
        cache.put("/dir", dir_record("/dir"));
        cache.put("/dir/file", file_record("/dir/file", 5));
        cache.put("/dir/sub/deep", file_record("/dir/sub/deep", 1));
        cache.put("/directory", dir_record("/directory"));
        cache.put_listing("/dir", vec![file_record("/dir/file", 5)]);

        cache.invalidate_prefix("/dir");

        assert!(cache.get("/dir").is_none());
        assert!(cache.get("/dir/file").is_none());
        assert!(cache.get("/dir/sub/deep").is_none());
        assert!(cache.get_listing("/dir").is_none());
        // Sibling sharing the textual prefix survives
        assert!(cache.get("/directory").is_some());
    }

    #[test]
    fn test_listing_invalidation_keeps_record() {
        let cache = MetadataCache::new(Duration::from_secs(60));
        cache.put("/dir", dir_record("/dir"));
        cache.put_listing("/dir", vec![file_record("/dir/a", 1)]);

        cache.invalidate_listing("/dir");

        assert!(cache.get_listing("/dir").is_none());
        assert!(cache.get("/dir").is_some());
    }

    #[test]
    fn test_entries_expire() {
        let cache = MetadataCache::new(Duration::from_millis(50));
        cache.put("/a", file_record("/a", 1));
        cache.put_listing("/", vec![file_record("/a", 1)]);
        assert!(cache.get("/a").is_some());

        thread::sleep(Duration::from_millis(80));

        assert!(cache.get("/a").is_none());
        assert!(cache.get_listing("/").is_none());
    }

    #[test]
    fn test_huge_ttl_is_capped() {
        let cache = MetadataCache::new(Duration::from_secs(40_000_000_000));
        assert_eq!(cache.ttl(), MAX_CACHE_TTL);

        cache.put("/a", file_record("/a", 1));
        assert!(cache.get("/a").is_some());
    }

    #[test]
    fn test_peek_does_not_count() {
        let cache = MetadataCache::new(Duration::from_secs(60));
        assert!(cache.peek("/a").is_none());
        cache.put("/a", file_record("/a", 1));
        assert!(cache.peek("/A").is_some());

        let (hits, misses, _) = cache.stats();
        assert_eq!((hits, misses), (0, 0));
    }

    #[test]
    fn test_zero_ttl_disables_caching() {
        let cache = MetadataCache::new(Duration::ZERO);
        assert!(!cache.is_enabled());

        cache.put("/a/b.txt", file_record("/a/b.txt", 100));
        cache.put_listing("/a", vec![file_record("/a/b.txt", 100)]);

        assert!(cache.get("/a/b.txt").is_none());
        assert!(cache.get_listing("/a").is_none());
    }

    #[test]
    fn test_put_replaces_wholesale() {
        let cache = MetadataCache::new(Duration::from_secs(60));
        cache.put("/a", file_record("/a", 1));
        cache.put("/a", file_record("/a", 2));
        assert_eq!(cache.get("/a").map(|r| r.size), Some(2));
    }

    #[test]
    fn test_cache_clear() {
        let cache = MetadataCache::new(Duration::from_secs(60));

        cache.put("/a", file_record("/a", 1));
        cache.put("/b", file_record("/b", 2));
        cache.put_listing("/", vec![file_record("/a", 1)]);

        cache.clear();

        assert!(cache.get("/a").is_none());
        assert!(cache.get("/b").is_none());
        assert!(cache.get_listing("/").is_none());

        cache.clear();
        let (hits, misses, _) = cache.stats();
        assert_eq!(hits, 0);
        assert_eq!(misses, 0);
    }

    #[test]
    fn test_concurrent_put_and_invalidate() {
        let cache = Arc::new(MetadataCache::new(Duration::from_secs(60)));
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let cache = Arc::clone(&cache);
                thread::spawn(move || {
                    let path = format!("/dir/{}", i);
                    for _ in 0..100 {
                        cache.put(&path, file_record(&path, i));
                        assert!(cache.get(&path).is_some());
                        cache.invalidate(&path);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        for i in 0..8 {
            assert!(cache.get(&format!("/dir/{}", i)).is_none());
        }
    }
}
