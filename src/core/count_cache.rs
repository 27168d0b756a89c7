//! Per-entity cache of row counts across pages
//!
//! Paging through one logical result set issues the same filtered count
//! again and again. The cache keeps the count per filter fingerprint and
//! only recounts once the entry is older than the tolerance.

use crate::core::error::CrudResult;
use crate::core::field::FieldValue;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Default age after which a cached count is recomputed
pub const DEFAULT_TOLERANCE: Duration = Duration::from_secs(60);

/// Default maximum number of fingerprints kept per entity
pub const DEFAULT_MAX_ENTRIES: usize = 10_000;

/// A cached count and when it was computed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CountEntry {
    pub count: i64,
    pub computed_at: Instant,
    generation: u64,
}

/// Count cache for one entity type `T`
///
/// Safe to share between tasks; concurrent callers never block each other
/// while a count is being computed.
#[derive(Debug)]
pub struct CountCache<T> {
    entries: DashMap<String, CountEntry>,
    max_entries: usize,
    generation: AtomicU64,
    _marker: PhantomData<fn() -> T>,
}

impl<T> CountCache<T> {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_MAX_ENTRIES)
    }

    /// A cache holding at most `max_entries` fingerprints
    pub fn with_capacity(max_entries: usize) -> Self {
        Self {
            entries: DashMap::new(),
            max_entries: max_entries.max(1),
            generation: AtomicU64::new(0),
            _marker: PhantomData,
        }
    }

    /// Key for a filter and its parameters.
    ///
    /// Parameters are joined with `,`. When a parameter's text itself
    /// contains a comma the join would be ambiguous, so the parameter list
    /// is serialized as JSON instead.
    pub fn fingerprint(filter: Option<&str>, parameters: &[FieldValue]) -> String {
        let mut key = filter.unwrap_or_default().to_string();
        if parameters.is_empty() {
            return key;
        }

        let texts: Vec<String> = parameters.iter().map(ToString::to_string).collect();
        if texts.iter().any(|t| t.contains(',')) {
            key.push_str(&serde_json::to_string(parameters).unwrap_or_else(|_| texts.join(",")));
        } else {
            key.push_str(&texts.join(","));
        }
        key
    }

    /// Get the count for `fingerprint`, calling `compute` when there is no
    /// entry or the entry is at least `tolerance` old.
    ///
    /// A refreshed count only replaces the entry it was computed from; if
    /// another caller refreshed it first, the new value is returned but not
    /// stored.
    pub async fn get_count<F, Fut>(
        &self,
        fingerprint: &str,
        tolerance: Duration,
        compute: F,
    ) -> CrudResult<i64>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = CrudResult<i64>>,
    {
        let observed = self.entries.get(fingerprint).map(|entry| *entry);

        match observed {
            Some(entry) if entry.computed_at.elapsed() < tolerance => {
                tracing::debug!(fingerprint, count = entry.count, "count cache hit");
                Ok(entry.count)
            }
            Some(entry) => {
                tracing::debug!(fingerprint, "count cache entry stale, recounting");
                let count = compute().await?;
                if let Some(mut current) = self.entries.get_mut(fingerprint) {
                    if current.generation == entry.generation {
                        *current = self.entry(count);
                    }
                }
                Ok(count)
            }
            None => {
                tracing::debug!(fingerprint, "count cache miss");
                let count = compute().await?;
                self.make_room(tolerance);
                if let Entry::Vacant(vacant) = self.entries.entry(fingerprint.to_string()) {
                    vacant.insert(self.entry(count));
                }
                Ok(count)
            }
        }
    }

    fn entry(&self, count: i64) -> CountEntry {
        CountEntry {
            count,
            computed_at: Instant::now(),
            generation: self.generation.fetch_add(1, Ordering::Relaxed),
        }
    }

    /// Drop stale entries, then the oldest ones, until a new entry fits
    fn make_room(&self, tolerance: Duration) {
        if self.entries.len() < self.max_entries {
            return;
        }
        self.entries
            .retain(|_, entry| entry.computed_at.elapsed() < tolerance);

        while self.entries.len() >= self.max_entries {
            let oldest = self
                .entries
                .iter()
                .min_by_key(|entry| entry.computed_at)
                .map(|entry| entry.key().clone());
            match oldest {
                Some(key) => {
                    self.entries.remove(&key);
                }
                None => break,
            }
        }
    }

    /// The cached entry for a fingerprint, if any
    pub fn get(&self, fingerprint: &str) -> Option<CountEntry> {
        self.entries.get(fingerprint).map(|entry| *entry)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&self) {
        self.entries.clear();
    }
}

impl<T> Default for CountCache<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::CrudError;
    use std::sync::Arc;
    use std::sync::atomic::AtomicUsize;

    struct Song;

    async fn counted(calls: &AtomicUsize, value: i64) -> CrudResult<i64> {
        calls.fetch_add(1, Ordering::SeqCst);
        Ok(value)
    }

    #[test]
    fn test_fingerprint_joins_parameters() {
        let key = CountCache::<Song>::fingerprint(
            Some("Title == @0 && Id > @1"),
            &[FieldValue::from("Help"), FieldValue::from(2i64)],
        );
        assert_eq!(key, "Title == @0 && Id > @1Help,2");
        assert_eq!(CountCache::<Song>::fingerprint(None, &[]), "");
    }

    #[test]
    fn test_fingerprint_falls_back_to_json_on_ambiguity() {
        let ambiguous = CountCache::<Song>::fingerprint(
            Some("Title == @0"),
            &[FieldValue::from("a,b")],
        );
        let split = CountCache::<Song>::fingerprint(
            Some("Title == @0"),
            &[FieldValue::from("a"), FieldValue::from("b")],
        );
        assert_ne!(ambiguous, split);
        assert_eq!(ambiguous, "Title == @0[\"a,b\"]");
    }

    #[tokio::test]
    async fn test_cached_within_tolerance() {
        let cache = CountCache::<Song>::new();
        let calls = AtomicUsize::new(0);

        let first = cache
            .get_count("k", DEFAULT_TOLERANCE, || counted(&calls, 10))
            .await
            .expect("count");
        let second = cache
            .get_count("k", DEFAULT_TOLERANCE, || counted(&calls, 11))
            .await
            .expect("count");

        assert_eq!(first, 10);
        assert_eq!(second, 10);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_recomputed_after_tolerance() {
        let cache = CountCache::<Song>::new();
        let calls = AtomicUsize::new(0);
        let tolerance = Duration::from_millis(20);

        cache
            .get_count("k", tolerance, || counted(&calls, 10))
            .await
            .expect("count");
        tokio::time::sleep(Duration::from_millis(40)).await;
        let refreshed = cache
            .get_count("k", tolerance, || counted(&calls, 12))
            .await
            .expect("count");

        assert_eq!(refreshed, 12);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(cache.get("k").map(|e| e.count), Some(12));
    }

    #[tokio::test]
    async fn test_lost_refresh_race_is_discarded() {
        let cache = Arc::new(CountCache::<Song>::new());
        let tolerance = Duration::from_millis(10);
        cache
            .get_count("k", tolerance, || async { Ok::<_, CrudError>(1) })
            .await
            .expect("count");
        tokio::time::sleep(Duration::from_millis(20)).await;

        let racer = cache.clone();
        let value = cache
            .get_count("k", tolerance, || async move {
                // another caller refreshes while this count is running
                racer.clear();
                racer
                    .get_count("k", Duration::ZERO, || async { Ok::<_, CrudError>(7) })
                    .await?;
                Ok::<_, CrudError>(5)
            })
            .await
            .expect("count");

        assert_eq!(value, 5);
        assert_eq!(cache.get("k").map(|e| e.count), Some(7));
    }

    #[tokio::test]
    async fn test_bounded_capacity_evicts_oldest() {
        let cache = CountCache::<Song>::with_capacity(2);
        for (i, key) in ["a", "b", "c"].iter().enumerate() {
            cache
                .get_count(key, DEFAULT_TOLERANCE, || async move {
                    Ok::<_, CrudError>(i as i64)
                })
                .await
                .expect("count");
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
        assert_eq!(cache.len(), 2);
        assert!(cache.get("a").is_none());
        assert!(cache.get("c").is_some());
    }

    #[tokio::test]
    async fn test_compute_errors_are_not_cached() {
        let cache = CountCache::<Song>::new();
        let result = cache
            .get_count("k", DEFAULT_TOLERANCE, || async {
                Err::<i64, _>(CrudError::Internal("boom".to_string()))
            })
            .await;
        assert!(result.is_err());
        assert!(cache.is_empty());
    }
}
