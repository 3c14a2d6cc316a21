//! In-memory TTL cache for sheet data
//!
//! Keyed by (spreadsheet_id, gid). Entries are evicted lazily on read;
//! `evict_expired` offers a sweep for entries that are never re-read.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use crate::cache::etag::compute_etag;
use crate::sheets::SheetData;

/// A cached table snapshot with its fingerprint and expiry.
///
/// Entries are owned by the cache; callers always receive clones.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub data: SheetData,
    pub etag: String,
    pub expires_at: Instant,
}

impl CacheEntry {
    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }
}

/// In-memory cache for sheet data with TTL and per-table ETags.
pub struct SheetCache {
    ttl: Duration,
    entries: Mutex<HashMap<(String, String), CacheEntry>>,
}

impl SheetCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Get the cached entry if present and not expired.
    ///
    /// An expired entry is removed and `None` is returned.
    pub fn get(&self, spreadsheet_id: &str, gid: &str) -> Option<CacheEntry> {
        let key = (spreadsheet_id.to_string(), gid.to_string());
        let mut entries = self.lock();

        match entries.get(&key) {
            Some(entry) if entry.is_expired() => {
                entries.remove(&key);
                None
            }
            Some(entry) => Some(entry.clone()),
            None => None,
        }
    }

    /// Store freshly fetched data, computing its fingerprint and expiry.
    ///
    /// Returns the entry actually stored. Only called on successful
    /// fetches, so a failure never overwrites a valid entry.
    pub fn set(&self, spreadsheet_id: &str, gid: &str, data: SheetData) -> CacheEntry {
        let entry = CacheEntry {
            etag: compute_etag(&data),
            expires_at: Instant::now() + self.ttl,
            data,
        };

        self.lock().insert(
            (spreadsheet_id.to_string(), gid.to_string()),
            entry.clone(),
        );
        entry
    }

    /// Remove all entries.
    pub fn clear(&self) {
        self.lock().clear();
    }

    /// Remove all expired entries, returning how many were dropped.
    pub fn evict_expired(&self) -> usize {
        let mut entries = self.lock();
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_expired());
        before - entries.len()
    }

    /// Number of entries, expired ones included.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<(String, String), CacheEntry>> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
