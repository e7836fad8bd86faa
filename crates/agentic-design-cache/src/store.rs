//! Cache stores and the tiered lookup protocol.
//!
//! The primary store answers first; on error the secondary is consulted;
//! with both unavailable the caller computes without caching (degraded
//! mode, signalled once per transition by the orchestrator). Writes are
//! best-effort with at most one retry — a store failure must never fail
//! the request.
//!
//! Invariant (cache honesty): an entry's payload is byte-identical to a
//! fresh transform on the same signature, because every behavior-relevant
//! input participates in the signature.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use agentic_design_core::{ChangeLog, Error, Result, global_metrics, now_utc};

// ---------------------------------------------------------------------------
// Entries
// ---------------------------------------------------------------------------

/// The cached transform result: output code plus its change log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedTransform {
    pub code: String,
    pub change_log: ChangeLog,
}

/// One cache slot with bookkeeping.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    pub signature: String,
    pub payload: CachedTransform,
    pub created_at: DateTime<Utc>,
    pub last_hit_at: DateTime<Utc>,
    pub hit_count: u64,
    pub size_bytes: usize,
}

impl CacheEntry {
    #[must_use]
    pub fn new(signature: String, payload: CachedTransform) -> Self {
        let now = now_utc();
        let size_bytes = payload.code.len();
        Self {
            signature,
            payload,
            created_at: now,
            last_hit_at: now,
            hit_count: 0,
            size_bytes,
        }
    }

    fn expired(&self, ttl: Duration) -> bool {
        let age = now_utc().signed_duration_since(self.last_hit_at);
        age.num_seconds() >= 0 && age.to_std().is_ok_and(|a| a > ttl)
    }
}

// ---------------------------------------------------------------------------
// Store trait
// ---------------------------------------------------------------------------

/// Storage backend for cache entries. Implementations must be safe for
/// concurrent readers; the signature slot is the write-consistency unit.
pub trait CacheStore: Send + Sync {
    /// Fetch and touch (`last_hit_at`, `hit_count`) an entry.
    fn get(&self, signature: &str) -> Result<Option<CacheEntry>>;

    fn put(&self, entry: CacheEntry) -> Result<()>;

    /// Drop entries whose `last_hit_at` is older than the TTL. Returns
    /// how many were removed.
    fn remove_expired(&self, ttl: Duration) -> Result<usize>;

    fn len(&self) -> Result<usize>;

    fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }
}

// ---------------------------------------------------------------------------
// Memory store
// ---------------------------------------------------------------------------

/// Mutex-guarded in-process store with oldest-first eviction above the
/// entry high-water mark.
#[derive(Debug)]
pub struct MemoryCacheStore {
    entries: Mutex<HashMap<String, CacheEntry>>,
    max_entries: usize,
}

impl MemoryCacheStore {
    #[must_use]
    pub fn new(max_entries: usize) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            max_entries: max_entries.max(1),
        }
    }
}

impl CacheStore for MemoryCacheStore {
    fn get(&self, signature: &str) -> Result<Option<CacheEntry>> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(entries.get_mut(signature).map(|entry| {
            entry.last_hit_at = now_utc();
            entry.hit_count += 1;
            entry.clone()
        }))
    }

    fn put(&self, entry: CacheEntry) -> Result<()> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        if entries.len() >= self.max_entries && !entries.contains_key(&entry.signature) {
            // Evict the least-recently-hit slot to stay under the mark.
            if let Some(oldest) = entries
                .values()
                .min_by_key(|e| e.last_hit_at)
                .map(|e| e.signature.clone())
            {
                entries.remove(&oldest);
            }
        }
        entries.insert(entry.signature.clone(), entry);
        Ok(())
    }

    fn remove_expired(&self, ttl: Duration) -> Result<usize> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        let before = entries.len();
        entries.retain(|_, entry| !entry.expired(ttl));
        Ok(before - entries.len())
    }

    fn len(&self) -> Result<usize> {
        Ok(self
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len())
    }
}

// ---------------------------------------------------------------------------
// Disk store
// ---------------------------------------------------------------------------

/// One JSON file per signature under a root directory. Writes go through
/// a temp file + rename so readers never observe a torn entry.
#[derive(Debug)]
pub struct DiskCacheStore {
    root: PathBuf,
}

impl DiskCacheStore {
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    fn entry_path(&self, signature: &str) -> PathBuf {
        self.root.join(format!("{signature}.json"))
    }
}

impl CacheStore for DiskCacheStore {
    fn get(&self, signature: &str) -> Result<Option<CacheEntry>> {
        let path = self.entry_path(signature);
        let text = match std::fs::read_to_string(&path) {
            Ok(t) => t,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(Error::DependencyUnavailable(format!("cache read: {e}"))),
        };
        let mut entry: CacheEntry = serde_json::from_str(&text)
            .map_err(|e| Error::DependencyUnavailable(format!("cache decode: {e}")))?;
        entry.last_hit_at = now_utc();
        entry.hit_count += 1;
        // Touch bookkeeping back to disk; losing it costs a TTL refresh,
        // not correctness.
        if let Err(e) = self.put(entry.clone()) {
            debug!(error = %e, "cache touch write failed");
        }
        Ok(Some(entry))
    }

    fn put(&self, entry: CacheEntry) -> Result<()> {
        let path = self.entry_path(&entry.signature);
        let tmp = path.with_extension("json.tmp");
        let json = serde_json::to_string(&entry)
            .map_err(|e| Error::DependencyUnavailable(format!("cache encode: {e}")))?;
        std::fs::write(&tmp, json)
            .and_then(|()| std::fs::rename(&tmp, &path))
            .map_err(|e| Error::DependencyUnavailable(format!("cache write: {e}")))
    }

    fn remove_expired(&self, ttl: Duration) -> Result<usize> {
        let mut removed = 0usize;
        let dir = std::fs::read_dir(&self.root)
            .map_err(|e| Error::DependencyUnavailable(format!("cache scan: {e}")))?;
        for dirent in dir.flatten() {
            let path = dirent.path();
            if path.extension().is_none_or(|ext| ext != "json") {
                continue;
            }
            let Ok(text) = std::fs::read_to_string(&path) else {
                continue;
            };
            let Ok(entry) = serde_json::from_str::<CacheEntry>(&text) else {
                // Undecodable entries are dead weight.
                let _ = std::fs::remove_file(&path);
                removed += 1;
                continue;
            };
            if entry.expired(ttl) && std::fs::remove_file(&path).is_ok() {
                removed += 1;
            }
        }
        Ok(removed)
    }

    fn len(&self) -> Result<usize> {
        let dir = std::fs::read_dir(&self.root)
            .map_err(|e| Error::DependencyUnavailable(format!("cache scan: {e}")))?;
        Ok(dir
            .flatten()
            .filter(|d| d.path().extension().is_some_and(|ext| ext == "json"))
            .count())
    }
}

// ---------------------------------------------------------------------------
// Tiered protocol
// ---------------------------------------------------------------------------

/// Outcome of a tiered lookup.
#[derive(Debug, Clone, PartialEq)]
pub enum Lookup {
    Hit(CachedTransform),
    Miss,
    /// Every configured store errored; the caller computes uncached.
    Unavailable,
}

/// Primary + optional secondary store under one TTL.
pub struct TieredCache {
    primary: Box<dyn CacheStore>,
    secondary: Option<Box<dyn CacheStore>>,
    ttl: Duration,
}

impl TieredCache {
    #[must_use]
    pub fn new(
        primary: Box<dyn CacheStore>,
        secondary: Option<Box<dyn CacheStore>>,
        ttl: Duration,
    ) -> Self {
        Self {
            primary,
            secondary,
            ttl,
        }
    }

    #[must_use]
    pub const fn ttl(&self) -> Duration {
        self.ttl
    }

    /// The lookup protocol: primary, then secondary, then unavailable.
    #[must_use]
    pub fn lookup(&self, signature: &str) -> Lookup {
        let metrics = global_metrics();
        match self.primary.get(signature) {
            Ok(Some(entry)) if !entry.expired(self.ttl) => {
                metrics.cache_hits.inc();
                return Lookup::Hit(entry.payload);
            }
            Ok(_) => {
                metrics.cache_misses.inc();
                return Lookup::Miss;
            }
            Err(e) => {
                warn!(error = %e, "primary cache store unavailable");
                metrics.cache_store_failures.inc();
            }
        }
        if let Some(secondary) = &self.secondary {
            match secondary.get(signature) {
                Ok(Some(entry)) if !entry.expired(self.ttl) => {
                    metrics.cache_hits.inc();
                    return Lookup::Hit(entry.payload);
                }
                Ok(_) => {
                    metrics.cache_misses.inc();
                    return Lookup::Miss;
                }
                Err(e) => {
                    warn!(error = %e, "secondary cache store unavailable");
                    metrics.cache_store_failures.inc();
                }
            }
        }
        Lookup::Unavailable
    }

    /// Best-effort store with at most one retry. Returns whether any
    /// store accepted the entry.
    pub fn store(&self, signature: &str, payload: CachedTransform) -> bool {
        let entry = CacheEntry::new(signature.to_string(), payload);
        for attempt in 0..2 {
            match self.primary.put(entry.clone()) {
                Ok(()) => {
                    if let Some(secondary) = &self.secondary {
                        if let Err(e) = secondary.put(entry.clone()) {
                            debug!(error = %e, "secondary cache store write failed");
                        }
                    }
                    return true;
                }
                Err(e) if attempt == 0 => {
                    debug!(error = %e, "cache write failed, retrying once");
                }
                Err(e) => {
                    warn!(error = %e, "cache write dropped");
                    global_metrics().cache_store_failures.inc();
                }
            }
        }
        // Primary rejected twice; the secondary may still take it.
        if let Some(secondary) = &self.secondary {
            if secondary.put(entry).is_ok() {
                return true;
            }
        }
        false
    }

    /// Entry count in the first store that answers.
    #[must_use]
    pub fn entry_count(&self) -> usize {
        self.primary
            .len()
            .or_else(|_| {
                self.secondary
                    .as_ref()
                    .map_or(Ok(0), |secondary| secondary.len())
            })
            .unwrap_or(0)
    }

    /// TTL sweep across both tiers. Returns total removed.
    pub fn sweep(&self) -> usize {
        let mut removed = self.primary.remove_expired(self.ttl).unwrap_or(0);
        if let Some(secondary) = &self.secondary {
            removed += secondary.remove_expired(self.ttl).unwrap_or(0);
        }
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload(code: &str) -> CachedTransform {
        CachedTransform {
            code: code.to_string(),
            change_log: ChangeLog::default(),
        }
    }

    /// Store that always errors, standing in for an offline backend.
    struct OfflineStore;

    impl CacheStore for OfflineStore {
        fn get(&self, _signature: &str) -> Result<Option<CacheEntry>> {
            Err(Error::DependencyUnavailable("store offline".into()))
        }
        fn put(&self, _entry: CacheEntry) -> Result<()> {
            Err(Error::DependencyUnavailable("store offline".into()))
        }
        fn remove_expired(&self, _ttl: Duration) -> Result<usize> {
            Err(Error::DependencyUnavailable("store offline".into()))
        }
        fn len(&self) -> Result<usize> {
            Err(Error::DependencyUnavailable("store offline".into()))
        }
    }

    #[test]
    fn memory_store_round_trips_and_touches() {
        let store = MemoryCacheStore::new(16);
        store
            .put(CacheEntry::new("sig-a".into(), payload("a")))
            .unwrap();
        let first = store.get("sig-a").unwrap().unwrap();
        assert_eq!(first.hit_count, 1);
        let second = store.get("sig-a").unwrap().unwrap();
        assert_eq!(second.hit_count, 2);
        assert!(store.get("sig-missing").unwrap().is_none());
    }

    #[test]
    fn memory_store_evicts_oldest_at_capacity() {
        let store = MemoryCacheStore::new(2);
        store
            .put(CacheEntry::new("one".into(), payload("1")))
            .unwrap();
        store
            .put(CacheEntry::new("two".into(), payload("2")))
            .unwrap();
        // Touch "one" so "two" is oldest.
        let _ = store.get("one").unwrap();
        store
            .put(CacheEntry::new("three".into(), payload("3")))
            .unwrap();
        assert_eq!(store.len().unwrap(), 2);
        assert!(store.get("two").unwrap().is_none());
        assert!(store.get("one").unwrap().is_some());
    }

    #[test]
    fn disk_store_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = DiskCacheStore::new(dir.path()).unwrap();
        store
            .put(CacheEntry::new("sig-d".into(), payload("disk")))
            .unwrap();
        let entry = store.get("sig-d").unwrap().unwrap();
        assert_eq!(entry.payload.code, "disk");
        assert_eq!(store.len().unwrap(), 1);
        assert!(store.get("nope").unwrap().is_none());
    }

    #[test]
    fn tiered_lookup_falls_back_to_secondary() {
        let secondary = MemoryCacheStore::new(16);
        secondary
            .put(CacheEntry::new("sig".into(), payload("from-secondary")))
            .unwrap();
        let cache = TieredCache::new(
            Box::new(OfflineStore),
            Some(Box::new(secondary)),
            Duration::from_secs(3600),
        );
        match cache.lookup("sig") {
            Lookup::Hit(hit) => assert_eq!(hit.code, "from-secondary"),
            other => panic!("expected hit, got {other:?}"),
        }
    }

    #[test]
    fn both_stores_down_is_unavailable_not_an_error() {
        let cache = TieredCache::new(
            Box::new(OfflineStore),
            Some(Box::new(OfflineStore)),
            Duration::from_secs(3600),
        );
        assert_eq!(cache.lookup("sig"), Lookup::Unavailable);
        // Writes are swallowed too.
        assert!(!cache.store("sig", payload("x")));
    }

    #[test]
    fn store_write_lands_in_secondary_when_primary_down() {
        let secondary = MemoryCacheStore::new(16);
        let cache = TieredCache::new(
            Box::new(OfflineStore),
            Some(Box::new(secondary)),
            Duration::from_secs(3600),
        );
        assert!(cache.store("sig", payload("y")));
        match cache.lookup("sig") {
            Lookup::Hit(hit) => assert_eq!(hit.code, "y"),
            other => panic!("expected hit, got {other:?}"),
        }
    }

    #[test]
    fn ttl_zero_expires_immediately() {
        let store = MemoryCacheStore::new(4);
        store
            .put(CacheEntry::new("sig".into(), payload("z")))
            .unwrap();
        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(store.remove_expired(Duration::from_millis(1)).unwrap(), 1);
        assert_eq!(store.len().unwrap(), 0);
    }
}
