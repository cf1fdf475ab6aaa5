//! TTL cache for normalized section payloads.
//!
//! [`CacheStore`] sits in front of a pluggable [`CacheBackend`]. Expired
//! entries are never returned and are evicted lazily on read. The store never
//! fails a collection: backend errors are logged and treated as a miss (on
//! read) or dropped (on write).

use crate::registry::SectionKind;
use crate::traits::{Clock, SystemClock};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

pub const DEFAULT_TTL: Duration = Duration::from_secs(300);

// ============================================================================
// Keys and entries
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheKey {
    pub region: String,
    pub resource_id: String,
    pub section: SectionKind,
    pub filter_signature: String,
}

impl CacheKey {
    pub fn new(region: &str, resource_id: &str, section: SectionKind) -> Self {
        Self {
            region: region.to_string(),
            resource_id: resource_id.to_string(),
            section,
            filter_signature: section.filter_signature(resource_id),
        }
    }

    /// File-system safe rendering of the key.
    fn file_stem(&self) -> String {
        let raw = format!(
            "{}__{}__{}__{}",
            self.region, self.resource_id, self.section, self.filter_signature
        );
        raw.chars()
            .map(|c| match c {
                'a'..='z' | 'A'..='Z' | '0'..='9' | '-' | '_' | '.' => c,
                _ => '_',
            })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub key: CacheKey,
    pub payload: Value,
    pub fetched_at: DateTime<Utc>,
    pub ttl_seconds: u64,
}

impl CacheEntry {
    /// Valid iff `now - fetched_at < ttl`.
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        let age_ms = i128::from(now.signed_duration_since(self.fetched_at).num_milliseconds());
        age_ms < i128::from(self.ttl_seconds) * 1000
    }
}

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Cache I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Cache entry could not be (de)serialized: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Cache lock poisoned")]
    Poisoned,
}

// ============================================================================
// Backends
// ============================================================================

/// Storage behind a [`CacheStore`]. Implementations must tolerate concurrent
/// readers and writers; the last write to a key wins.
#[async_trait]
pub trait CacheBackend: Send + Sync {
    async fn load(&self, key: &CacheKey) -> Result<Option<CacheEntry>, CacheError>;
    async fn store(&self, entry: CacheEntry) -> Result<(), CacheError>;
    async fn remove(&self, key: &CacheKey) -> Result<(), CacheError>;
    async fn clear(&self) -> Result<(), CacheError>;
}

#[derive(Debug, Default)]
pub struct MemoryBackend {
    entries: RwLock<HashMap<CacheKey, CacheEntry>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|entries| entries.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl CacheBackend for MemoryBackend {
    async fn load(&self, key: &CacheKey) -> Result<Option<CacheEntry>, CacheError> {
        let entries = self.entries.read().map_err(|_| CacheError::Poisoned)?;
        Ok(entries.get(key).cloned())
    }

    async fn store(&self, entry: CacheEntry) -> Result<(), CacheError> {
        let mut entries = self.entries.write().map_err(|_| CacheError::Poisoned)?;
        entries.insert(entry.key.clone(), entry);
        Ok(())
    }

    async fn remove(&self, key: &CacheKey) -> Result<(), CacheError> {
        let mut entries = self.entries.write().map_err(|_| CacheError::Poisoned)?;
        entries.remove(key);
        Ok(())
    }

    async fn clear(&self) -> Result<(), CacheError> {
        let mut entries = self.entries.write().map_err(|_| CacheError::Poisoned)?;
        entries.clear();
        Ok(())
    }
}

/// One JSON document per key under a directory.
///
/// Writes go to a temporary file that is renamed into place, so a reader
/// never sees a half-written entry.
#[derive(Debug, Clone)]
pub struct FileBackend {
    dir: PathBuf,
}

impl FileBackend {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, key: &CacheKey) -> PathBuf {
        self.dir.join(format!("{}.json", key.file_stem()))
    }
}

fn io_error(path: &Path, source: std::io::Error) -> CacheError {
    CacheError::Io {
        path: path.to_path_buf(),
        source,
    }
}

#[async_trait]
impl CacheBackend for FileBackend {
    async fn load(&self, key: &CacheKey) -> Result<Option<CacheEntry>, CacheError> {
        let path = self.path_for(key);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(io_error(&path, e)),
        };
        let entry: CacheEntry = serde_json::from_slice(&bytes)?;
        // Sanitized file names can collide; only the exact key is a hit.
        Ok((entry.key == *key).then_some(entry))
    }

    async fn store(&self, entry: CacheEntry) -> Result<(), CacheError> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| io_error(&self.dir, e))?;

        let path = self.path_for(&entry.key);
        let tmp = path.with_extension(format!("json.{}.tmp", rand::random::<u32>()));
        let bytes = serde_json::to_vec(&entry)?;
        tokio::fs::write(&tmp, bytes)
            .await
            .map_err(|e| io_error(&tmp, e))?;
        if let Err(e) = tokio::fs::rename(&tmp, &path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(io_error(&path, e));
        }
        Ok(())
    }

    async fn remove(&self, key: &CacheKey) -> Result<(), CacheError> {
        let path = self.path_for(key);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(io_error(&path, e)),
        }
    }

    async fn clear(&self) -> Result<(), CacheError> {
        let mut dir = match tokio::fs::read_dir(&self.dir).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(io_error(&self.dir, e)),
        };
        while let Some(item) = dir
            .next_entry()
            .await
            .map_err(|e| io_error(&self.dir, e))?
        {
            let path = item.path();
            if path.extension().is_some_and(|ext| ext == "json") {
                tokio::fs::remove_file(&path)
                    .await
                    .map_err(|e| io_error(&path, e))?;
            }
        }
        Ok(())
    }
}

// ============================================================================
// Store
// ============================================================================

/// TTL-aware front of a [`CacheBackend`], shared by every collector worker.
#[derive(Clone)]
pub struct CacheStore {
    backend: Arc<dyn CacheBackend>,
    clock: Arc<dyn Clock>,
    default_ttl: Duration,
}

impl CacheStore {
    pub fn new(backend: Arc<dyn CacheBackend>) -> Self {
        Self {
            backend,
            clock: Arc::new(SystemClock),
            default_ttl: DEFAULT_TTL,
        }
    }

    /// In-memory store with the system clock and the default TTL.
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryBackend::new()))
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = ttl;
        self
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    /// Returns the entry for `key` if present and still valid. An expired
    /// entry is removed from the backend and reported as absent.
    pub async fn get(&self, key: &CacheKey) -> Option<CacheEntry> {
        let entry = match self.backend.load(key).await {
            Ok(Some(entry)) => entry,
            Ok(None) => {
                debug!(section = %key.section, "Cache miss");
                return None;
            }
            Err(e) => {
                warn!(section = %key.section, error = %e, "Cache read failed, treating as miss");
                return None;
            }
        };

        if entry.is_valid_at(self.clock.now()) {
            debug!(section = %key.section, "Cache hit");
            return Some(entry);
        }

        debug!(section = %key.section, fetched_at = %entry.fetched_at, "Cache entry expired");
        if let Err(e) = self.backend.remove(key).await {
            warn!(section = %key.section, error = %e, "Failed to evict expired cache entry");
        }
        None
    }

    /// Stores `payload` under `key`, stamped with the current time.
    /// `ttl` falls back to the store's default.
    pub async fn put(&self, key: CacheKey, payload: Value, ttl: Option<Duration>) {
        let section = key.section;
        let entry = CacheEntry {
            key,
            payload,
            fetched_at: self.clock.now(),
            ttl_seconds: ttl.unwrap_or(self.default_ttl).as_secs(),
        };
        if let Err(e) = self.backend.store(entry).await {
            warn!(section = %section, error = %e, "Cache write failed");
        }
    }

    pub async fn invalidate(&self, key: &CacheKey) {
        if let Err(e) = self.backend.remove(key).await {
            warn!(section = %key.section, error = %e, "Cache invalidation failed");
        }
    }

    pub async fn clear(&self) {
        if let Err(e) = self.backend.clear().await {
            warn!(error = %e, "Cache clear failed");
        }
    }
}

impl std::fmt::Debug for CacheStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheStore")
            .field("default_ttl", &self.default_ttl)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use crate::traits::Clock;
    use chrono::{DateTime, Duration, Utc};
    use std::sync::Mutex;

    /// Clock that only moves when told to.
    pub struct ManualClock {
        now: Mutex<DateTime<Utc>>,
    }

    impl ManualClock {
        pub fn new(start: DateTime<Utc>) -> Self {
            Self {
                now: Mutex::new(start),
            }
        }

        pub fn advance(&self, by: Duration) {
            let mut now = self.now.lock().unwrap();
            *now = *now + by;
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> DateTime<Utc> {
            *self.now.lock().unwrap()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::ManualClock;
    use super::*;
    use chrono::{Duration as ChronoDuration, TimeZone};
    use serde_json::json;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap()
    }

    fn key(section: SectionKind) -> CacheKey {
        CacheKey::new("us-east-1", "vpc-1", section)
    }

    #[tokio::test]
    async fn test_entry_expires_after_ttl() {
        let clock = Arc::new(ManualClock::new(t0()));
        let backend = Arc::new(MemoryBackend::new());
        let store = CacheStore::new(backend.clone()).with_clock(clock.clone());

        store
            .put(key(SectionKind::Vpc), json!({"VpcId": "vpc-1"}), None)
            .await;

        clock.advance(ChronoDuration::seconds(299));
        assert!(store.get(&key(SectionKind::Vpc)).await.is_some());

        clock.advance(ChronoDuration::seconds(2));
        assert!(store.get(&key(SectionKind::Vpc)).await.is_none());
        // Lazily evicted on the expired read
        assert!(backend.is_empty());
    }

    #[test]
    fn test_validity_boundary_is_exclusive() {
        let entry = CacheEntry {
            key: key(SectionKind::Subnets),
            payload: json!(null),
            fetched_at: t0(),
            ttl_seconds: 300,
        };
        assert!(entry.is_valid_at(t0() + ChronoDuration::seconds(299)));
        assert!(!entry.is_valid_at(t0() + ChronoDuration::seconds(300)));
        assert!(!entry.is_valid_at(t0() + ChronoDuration::seconds(301)));
    }

    #[test]
    fn test_keys_differ_by_filter_scope() {
        assert_ne!(
            CacheKey::new("us-east-1", "vpc-1", SectionKind::Subnets),
            CacheKey::new("us-east-1", "vpc-2", SectionKind::Subnets)
        );
        assert_ne!(
            CacheKey::new("us-east-1", "vpc-1", SectionKind::Subnets),
            CacheKey::new("eu-west-1", "vpc-1", SectionKind::Subnets)
        );
    }

    #[tokio::test]
    async fn test_invalidate_and_clear() {
        let store = CacheStore::in_memory();
        store.put(key(SectionKind::Vpc), json!(1), None).await;
        store.put(key(SectionKind::Subnets), json!(2), None).await;

        store.invalidate(&key(SectionKind::Vpc)).await;
        assert!(store.get(&key(SectionKind::Vpc)).await.is_none());
        assert!(store.get(&key(SectionKind::Subnets)).await.is_some());

        store.clear().await;
        assert!(store.get(&key(SectionKind::Subnets)).await.is_none());
    }

    #[tokio::test]
    async fn test_file_backend_persists_entries() {
        let dir = tempfile::tempdir().unwrap();
        let clock = Arc::new(ManualClock::new(t0()));

        let store = CacheStore::new(Arc::new(FileBackend::new(dir.path()))).with_clock(clock.clone());
        store
            .put(key(SectionKind::FlowLogs), json!({"TotalCount": 0}), None)
            .await;

        // A second store over the same directory sees the entry.
        let reopened = CacheStore::new(Arc::new(FileBackend::new(dir.path()))).with_clock(clock);
        let entry = reopened.get(&key(SectionKind::FlowLogs)).await.unwrap();
        assert_eq!(entry.payload, json!({"TotalCount": 0}));
        assert_eq!(entry.fetched_at, t0());

        let leftovers: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().path())
            .filter(|p| p.to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());

        reopened.clear().await;
        assert!(reopened.get(&key(SectionKind::FlowLogs)).await.is_none());
    }

    #[tokio::test]
    async fn test_unreadable_entry_is_a_miss() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FileBackend::new(dir.path());
        let k = key(SectionKind::Vpc);
        std::fs::write(backend.path_for(&k), b"not json").unwrap();

        let store = CacheStore::new(Arc::new(backend));
        assert!(store.get(&k).await.is_none());
    }
}
