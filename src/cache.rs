// src/cache.rs
//! # Cache Store
//! In-memory map from request fingerprint to the last known response.
//!
//! Entries carry a lifecycle state (Pending → Fresh | Failed, Fresh → Stale
//! once observed past the TTL). A Failed entry keeps the last good payload so
//! a caller may fall back to it. Optionally bounded: least-recently-used
//! entries go first, Pending entries are never evicted.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::Serialize;
use serde_json::Value;
use tokio::time::Instant;

use crate::error::FetchError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheState {
    Pending,
    Fresh,
    Stale,
    Failed,
}

#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub fingerprint: String,
    pub endpoint: String,
    pub state: CacheState,
    /// Raw JSON of the last successful fetch, if there ever was one.
    pub payload: Option<Arc<Value>>,
    /// Set while the entry is Failed.
    pub error: Option<FetchError>,
    /// Monotonic time of the last successful fetch.
    pub fetched_at: Option<Instant>,
    pub updated_at: DateTime<Utc>,
}

impl CacheEntry {
    /// Start of a fetch; whatever was known before is carried along.
    pub fn pending(fingerprint: &str, endpoint: &str, previous: Option<&CacheEntry>) -> Self {
        Self {
            fingerprint: fingerprint.to_string(),
            endpoint: endpoint.to_string(),
            state: CacheState::Pending,
            payload: previous.and_then(|p| p.payload.clone()),
            error: None,
            fetched_at: previous.and_then(|p| p.fetched_at),
            updated_at: Utc::now(),
        }
    }

    pub fn fresh(fingerprint: &str, endpoint: &str, payload: Arc<Value>) -> Self {
        Self {
            fingerprint: fingerprint.to_string(),
            endpoint: endpoint.to_string(),
            state: CacheState::Fresh,
            payload: Some(payload),
            error: None,
            fetched_at: Some(Instant::now()),
            updated_at: Utc::now(),
        }
    }

    pub fn failed(
        fingerprint: &str,
        endpoint: &str,
        error: FetchError,
        previous: Option<&CacheEntry>,
    ) -> Self {
        Self {
            fingerprint: fingerprint.to_string(),
            endpoint: endpoint.to_string(),
            state: CacheState::Failed,
            payload: previous.and_then(|p| p.payload.clone()),
            error: Some(error),
            fetched_at: previous.and_then(|p| p.fetched_at),
            updated_at: Utc::now(),
        }
    }

    /// Time since the last successful fetch.
    pub fn age(&self) -> Option<Duration> {
        self.fetched_at.map(|t| t.elapsed())
    }

    pub fn summary(&self) -> CacheEntrySummary {
        CacheEntrySummary {
            fingerprint: self.fingerprint.clone(),
            endpoint: self.endpoint.clone(),
            state: self.state,
            has_payload: self.payload.is_some(),
            age_ms: self.age().map(|d| d.as_millis() as u64),
            error: self.error.as_ref().map(|e| e.kind()),
            updated_at: self.updated_at,
        }
    }
}

/// Payload-free view of an entry for diagnostics.
#[derive(Debug, Clone, Serialize)]
pub struct CacheEntrySummary {
    pub fingerprint: String,
    pub endpoint: String,
    pub state: CacheState,
    pub has_payload: bool,
    pub age_ms: Option<u64>,
    pub error: Option<&'static str>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug)]
pub struct CacheStore {
    /// Iteration order is recency order: front = least recently used.
    inner: Mutex<IndexMap<String, CacheEntry>>,
    max_entries: Option<usize>,
}

impl Default for CacheStore {
    fn default() -> Self {
        Self::unbounded()
    }
}

impl CacheStore {
    pub fn unbounded() -> Self {
        Self::with_max_entries(None)
    }

    /// `None` or `Some(0)` means unbounded.
    pub fn with_max_entries(max_entries: Option<usize>) -> Self {
        Self {
            inner: Mutex::new(IndexMap::new()),
            max_entries: max_entries.filter(|n| *n > 0),
        }
    }

    pub fn max_entries(&self) -> Option<usize> {
        self.max_entries
    }

    fn lock(&self) -> MutexGuard<'_, IndexMap<String, CacheEntry>> {
        self.inner.lock().unwrap_or_else(|poison| poison.into_inner())
    }

    /// Lookup that also marks the entry as most recently used.
    pub fn get(&self, fingerprint: &str) -> Option<CacheEntry> {
        let mut map = self.lock();
        let idx = map.get_index_of(fingerprint)?;
        let last = map.len() - 1;
        map.move_index(idx, last);
        map.get_index(last).map(|(_, e)| e.clone())
    }

    /// Lookup without touching recency.
    pub fn peek(&self, fingerprint: &str) -> Option<CacheEntry> {
        self.lock().get(fingerprint).cloned()
    }

    /// Unconditional replace (last writer wins), then evict down to the bound.
    pub fn put(&self, fingerprint: &str, entry: CacheEntry) {
        let mut map = self.lock();
        map.shift_remove(fingerprint);
        map.insert(fingerprint.to_string(), entry);

        let Some(max) = self.max_entries else { return };
        while map.len() > max {
            let victim = map
                .iter()
                .position(|(k, e)| e.state != CacheState::Pending && k != fingerprint);
            match victim {
                Some(i) => {
                    if let Some((k, e)) = map.shift_remove_index(i) {
                        tracing::debug!(fingerprint = %k, endpoint = %e.endpoint, "cache evict (lru)");
                    }
                }
                // Everything else is in flight; stay over the bound for now.
                None => break,
            }
        }
    }

    /// `now - fetched_at < ttl` for an entry that holds a usable payload.
    pub fn is_fresh(entry: &CacheEntry, ttl: Duration) -> bool {
        matches!(entry.state, CacheState::Fresh | CacheState::Stale)
            && entry.payload.is_some()
            && entry.age().is_some_and(|age| age < ttl)
    }

    /// Fresh → Stale. Any other state is left alone.
    pub fn mark_stale(&self, fingerprint: &str) {
        let mut map = self.lock();
        if let Some(e) = map.get_mut(fingerprint) {
            if e.state == CacheState::Fresh {
                e.state = CacheState::Stale;
                e.updated_at = Utc::now();
            }
        }
    }

    pub fn remove(&self, fingerprint: &str) -> Option<CacheEntry> {
        self.lock().shift_remove(fingerprint)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Summaries in recency order, least recently used first.
    pub fn snapshot(&self) -> Vec<CacheEntrySummary> {
        self.lock().values().map(CacheEntry::summary).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fresh(fp: &str) -> CacheEntry {
        CacheEntry::fresh(fp, "coins", Arc::new(json!({ "fp": fp })))
    }

    #[tokio::test(start_paused = true)]
    async fn freshness_follows_ttl() {
        let e = fresh("a");
        let ttl = Duration::from_secs(60);
        assert!(CacheStore::is_fresh(&e, ttl));

        tokio::time::advance(Duration::from_secs(59)).await;
        assert!(CacheStore::is_fresh(&e, ttl));

        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(!CacheStore::is_fresh(&e, ttl));
    }

    #[tokio::test(start_paused = true)]
    async fn pending_and_failed_are_never_fresh() {
        let ok = fresh("a");
        let pending = CacheEntry::pending("a", "coins", Some(&ok));
        let failed = CacheEntry::failed("a", "coins", FetchError::Network("x".into()), Some(&ok));
        let ttl = Duration::from_secs(60);
        assert!(!CacheStore::is_fresh(&pending, ttl));
        assert!(!CacheStore::is_fresh(&failed, ttl));
        // the last good payload survives the failure
        assert!(failed.payload.is_some());
    }

    #[test]
    fn lru_evicts_least_recently_used() {
        let store = CacheStore::with_max_entries(Some(2));
        store.put("a", fresh("a"));
        store.put("b", fresh("b"));
        // touch a → b becomes the LRU
        assert!(store.get("a").is_some());
        store.put("c", fresh("c"));

        assert_eq!(store.len(), 2);
        assert!(store.peek("b").is_none());
        assert!(store.peek("a").is_some());
        assert!(store.peek("c").is_some());
    }

    #[test]
    fn pending_entries_survive_eviction() {
        let store = CacheStore::with_max_entries(Some(1));
        store.put("a", CacheEntry::pending("a", "coins", None));
        store.put("b", CacheEntry::pending("b", "coins", None));
        // nothing evictable
        assert_eq!(store.len(), 2);

        store.put("c", fresh("c"));
        // only the just-written non-pending entry remains evictable, and it is protected
        assert_eq!(store.len(), 3);

        store.put("a", fresh("a"));
        // a is no longer pending; the bound can now be approached again
        assert!(store.peek("b").is_some());
        assert!(store.len() <= 2);
    }

    #[test]
    fn mark_stale_only_touches_fresh() {
        let store = CacheStore::unbounded();
        store.put("a", fresh("a"));
        store.put("p", CacheEntry::pending("p", "coins", None));
        store.mark_stale("a");
        store.mark_stale("p");
        assert_eq!(store.peek("a").unwrap().state, CacheState::Stale);
        assert_eq!(store.peek("p").unwrap().state, CacheState::Pending);
    }
}
