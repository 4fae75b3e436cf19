//! Optimistic, lock-free access-token cache.
//!
//! Backed by `dashmap::DashMap`, the same sharded concurrent map the
//! `pmcp-tasks` in-memory task store reaches for when it needs fine-grained
//! shard-level locking and CAS-style mutation without one global lock. Reads
//! never block writes: a lookup only ever touches the shard its key hashes
//! into.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use dashmap::DashMap;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::claims::AccessTokenContent;
use crate::config::AccessTokenCacheConfig;
use crate::error::{EventType, SecurityEventCounter, ValidationError};
use crate::monitor::{MeasurementType, ValidatorMonitor};

#[derive(Clone)]
struct CachedToken {
    raw: String,
    content: AccessTokenContent,
    expires_at_millis: i64,
}

impl CachedToken {
    fn is_expired(&self, now_millis: i64) -> bool {
        self.expires_at_millis <= now_millis
    }
}

/// Folds a raw token string down to the 4-byte key this cache indexes by.
///
/// Collisions are expected and handled by re-checking the stored `raw`
/// string on every read; `DefaultHasher` (SipHash-1-3 with fixed per-process
/// keys) keeps the fold deterministic within one process run, which is what
/// the collision-handling tests rely on.
fn fingerprint(raw: &str) -> i32 {
    let mut hasher = DefaultHasher::new();
    raw.hash(&mut hasher);
    let bits = hasher.finish();
    #[allow(clippy::cast_possible_truncation)]
    let folded = ((bits >> 32) ^ (bits & 0xFFFF_FFFF)) as u32;
    folded as i32
}

/// Hash-keyed, size-bounded, self-expiring cache of previously validated
/// access tokens.
///
/// `max_size == 0` disables the cache entirely: no map is populated, `get`
/// always misses, `put` is a no-op, and no background task is spawned.
pub struct AccessTokenCache {
    entries: Option<Arc<DashMap<i32, CachedToken>>>,
    max_size: usize,
    counter: Arc<SecurityEventCounter>,
    sweep_handle: Option<JoinHandle<()>>,
}

impl AccessTokenCache {
    /// Builds the cache and, unless disabled, spawns the background expiry
    /// sweep task on the current tokio runtime.
    #[must_use]
    pub fn new(config: &AccessTokenCacheConfig, counter: Arc<SecurityEventCounter>) -> Self {
        if config.max_size == 0 {
            return Self {
                entries: None,
                max_size: 0,
                counter,
                sweep_handle: None,
            };
        }

        let entries = Arc::new(DashMap::new());
        let sweep_handle = spawn_sweep(Arc::clone(&entries), config.eviction_interval);
        Self {
            entries: Some(entries),
            max_size: config.max_size,
            counter,
            sweep_handle: Some(sweep_handle),
        }
    }

    fn is_disabled(&self) -> bool {
        self.entries.is_none()
    }

    /// Looks up `raw` in the cache, recording `CACHE_LOOKUP` timing.
    ///
    /// A present-but-expired entry is removed and reported as
    /// `Err(TOKEN_EXPIRED)`, never as a miss — a cached expired token is a
    /// signal to the caller, not silence. A hash collision (entry present
    /// under this fingerprint but with a different `raw`) is treated as a
    /// miss after discarding the stale entry.
    pub fn get(
        &self,
        raw: &str,
        monitor: &ValidatorMonitor,
    ) -> Result<Option<AccessTokenContent>, ValidationError> {
        if self.is_disabled() {
            return Ok(None);
        }
        let ticker = monitor.start(MeasurementType::CacheLookup);
        let result = self.get_inner(raw);
        ticker.stop_and_record();
        result
    }

    fn get_inner(&self, raw: &str) -> Result<Option<AccessTokenContent>, ValidationError> {
        let Some(entries) = &self.entries else {
            return Ok(None);
        };
        let key = fingerprint(raw);
        let now = Utc::now().timestamp_millis();

        let Some(entry) = entries.get(&key) else {
            return Ok(None);
        };

        if entry.raw != raw {
            drop(entry);
            entries.remove(&key);
            debug!(target: "token_guard::cache", "fingerprint collision, treating as miss");
            return Ok(None);
        }

        if entry.is_expired(now) {
            drop(entry);
            entries.remove(&key);
            self.counter.increment(EventType::TokenExpired);
            return Err(ValidationError::new(
                EventType::TokenExpired,
                "cached access token has expired",
            ));
        }

        self.counter.increment(EventType::AccessTokenCacheHit);
        Ok(Some(entry.content.clone()))
    }

    /// Inserts `content` for `raw` if the cache is enabled, recording
    /// `CACHE_STORE` timing only on a successful insert.
    ///
    /// Requires `content.expiration()`; a validated token always has one by
    /// the time the pipeline builds it, so the only way this is absent is a
    /// programming error upstream — reported as `InternalCacheError` rather
    /// than panicking.
    pub fn put(
        &self,
        raw: &str,
        content: AccessTokenContent,
        monitor: &ValidatorMonitor,
    ) -> Result<(), ValidationError> {
        if self.is_disabled() {
            return Ok(());
        }
        let ticker = monitor.start(MeasurementType::CacheStore);
        let inserted = self.put_inner(raw, content)?;
        if inserted {
            ticker.stop_and_record();
        }
        Ok(())
    }

    fn put_inner(&self, raw: &str, content: AccessTokenContent) -> Result<bool, ValidationError> {
        let Some(entries) = &self.entries else {
            return Ok(false);
        };

        let expires_at_millis = content.expiration().timestamp_millis();
        let key = fingerprint(raw);
        let candidate = CachedToken {
            raw: raw.to_string(),
            content,
            expires_at_millis,
        };

        let now = Utc::now().timestamp_millis();
        let inserted = match entries.entry(key) {
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(candidate);
                true
            }
            dashmap::mapref::entry::Entry::Occupied(mut slot) => {
                let existing = slot.get();
                if existing.raw == candidate.raw && !existing.is_expired(now) {
                    // Another writer already won the race with a valid entry.
                    false
                } else {
                    slot.insert(candidate);
                    true
                }
            }
        };

        if inserted {
            let size = entries.len();
            if size > self.max_size {
                self.evict_some(entries, size);
            }
        }

        Ok(inserted)
    }

    fn evict_some(&self, entries: &DashMap<i32, CachedToken>, size: usize) {
        let to_evict = (size / 10).max(1);
        let victims: Vec<i32> = entries.iter().take(to_evict).map(|e| *e.key()).collect();
        for key in victims {
            entries.remove(&key);
        }
    }

    /// Current number of cached entries (`0` when disabled).
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.as_ref().map_or(0, dashmap::DashMap::len)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Aborts the background sweep task, if one was spawned. Idempotent:
    /// aborting an already-finished task is harmless, matching
    /// `JoinHandle::abort`'s documented behavior.
    pub fn shutdown(&self) {
        if let Some(handle) = &self.sweep_handle {
            handle.abort();
        }
    }
}

impl Drop for AccessTokenCache {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn spawn_sweep(entries: Arc<DashMap<i32, CachedToken>>, interval: Duration) -> JoinHandle<()> {
    let swept_rounds = Arc::new(AtomicUsize::new(0));
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            let now = Utc::now().timestamp_millis();
            let expired: Vec<i32> = entries
                .iter()
                .filter(|e| e.value().is_expired(now))
                .map(|e| *e.key())
                .collect();
            for key in &expired {
                entries.remove(key);
            }
            let round = swept_rounds.fetch_add(1, Ordering::Relaxed);
            if !expired.is_empty() {
                debug!(target: "token_guard::cache", round, removed = expired.len(), "expiry sweep");
            }
        }
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde_json::Map;
    use std::collections::HashSet;

    fn content(expires_in: chrono::Duration) -> AccessTokenContent {
        AccessTokenContent::new(
            "raw-token".to_string(),
            "https://issuer.example".to_string(),
            "u1".to_string(),
            HashSet::new(),
            HashSet::new(),
            HashSet::new(),
            HashSet::new(),
            Utc::now() + expires_in,
            None,
            None,
            Map::new(),
        )
    }

    #[tokio::test]
    async fn disabled_cache_never_stores_anything() {
        let counter = SecurityEventCounter::new();
        let cache = AccessTokenCache::new(&AccessTokenCacheConfig::disabled(), counter);
        let monitor = ValidatorMonitor::disabled();

        cache
            .put("tok", content(chrono::Duration::seconds(60)), &monitor)
            .unwrap();
        assert!(cache.get("tok", &monitor).unwrap().is_none());
        assert_eq!(cache.len(), 0);
    }

    #[tokio::test]
    async fn hit_after_put_returns_the_same_content() {
        let counter = SecurityEventCounter::new();
        let cache = AccessTokenCache::new(&AccessTokenCacheConfig::default(), counter.clone());
        let monitor = ValidatorMonitor::disabled();

        cache
            .put("tok-1", content(chrono::Duration::seconds(60)), &monitor)
            .unwrap();
        let hit = cache.get("tok-1", &monitor).unwrap();
        assert!(hit.is_some());
        assert_eq!(counter.get(EventType::AccessTokenCacheHit), 1);
        cache.shutdown();
    }

    #[tokio::test]
    async fn expired_entry_is_reported_as_an_error_not_a_miss() {
        let counter = SecurityEventCounter::new();
        let cache = AccessTokenCache::new(&AccessTokenCacheConfig::default(), counter);
        let monitor = ValidatorMonitor::disabled();

        cache
            .put("tok-exp", content(chrono::Duration::seconds(-5)), &monitor)
            .unwrap();
        let err = cache.get("tok-exp", &monitor).unwrap_err();
        assert_eq!(err.kind, EventType::TokenExpired);
        assert!(cache.get("tok-exp", &monitor).unwrap().is_none());
        cache.shutdown();
    }

    #[tokio::test]
    async fn size_bound_evicts_roughly_ten_percent() {
        let counter = SecurityEventCounter::new();
        let config = AccessTokenCacheConfig {
            max_size: 10,
            ..AccessTokenCacheConfig::default()
        };
        let cache = AccessTokenCache::new(&config, counter);
        let monitor = ValidatorMonitor::disabled();

        for i in 0..12 {
            let mut c = content(chrono::Duration::seconds(60));
            // distinct raw strings so each gets its own fingerprint
            let raw = format!("tok-{i}");
            c = AccessTokenContent::new(
                raw.clone(),
                c.issuer().to_string(),
                c.subject().to_string(),
                c.audience().clone(),
                c.scopes().clone(),
                c.roles().clone(),
                c.groups().clone(),
                c.expiration(),
                c.not_before(),
                c.issued_at(),
                c.claims().clone(),
            );
            cache.put(&raw, c, &monitor).unwrap();
        }

        assert!(cache.len() <= 11);
        cache.shutdown();
    }

    #[test]
    fn fingerprint_is_deterministic_within_a_process() {
        assert_eq!(fingerprint("same-token"), fingerprint("same-token"));
    }
}
