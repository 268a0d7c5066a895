//! Single-slot report cache.
//!
//! Holds at most one [`AggregatedReport`], keyed by a fingerprint of the
//! folder listing and the query. A different fingerprint evicts the slot;
//! an entry older than the TTL is discarded and recomputed, never served.
//!
//! The mutex guards only reads and writes of the slot. Computation runs
//! outside it, so two concurrent misses for the same fingerprint both
//! compute and the last one to finish owns the slot.

use sha2::{Digest, Sha256};
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use crate::models::{AggregatedReport, ReportQuery, SourceFile};

type Clock = Arc<dyn Fn() -> Instant + Send + Sync>;

struct CacheEntry {
    fingerprint: String,
    report: Arc<AggregatedReport>,
    created: Instant,
}

pub struct ReportCache {
    ttl: Duration,
    slot: Mutex<Option<CacheEntry>>,
    clock: Clock,
    hits: AtomicU64,
    misses: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
}

impl ReportCache {
    pub fn new(ttl: Duration) -> Self {
        Self::with_clock(ttl, Arc::new(Instant::now))
    }

    pub fn with_clock(ttl: Duration, clock: Clock) -> Self {
        Self {
            ttl,
            slot: Mutex::new(None),
            clock,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    fn slot(&self) -> MutexGuard<'_, Option<CacheEntry>> {
        // The slot is replaced wholesale, so a poisoned lock still holds a
        // consistent value.
        self.slot.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// The cached report for `fingerprint`, if present and fresh.
    pub fn lookup(&self, fingerprint: &str) -> Option<Arc<AggregatedReport>> {
        let now = (self.clock)();
        let mut slot = self.slot();
        let expired = match slot.as_ref() {
            Some(entry) if entry.fingerprint == fingerprint => {
                if now.saturating_duration_since(entry.created) < self.ttl {
                    return Some(entry.report.clone());
                }
                true
            }
            _ => false,
        };
        if expired {
            log::debug!("cache entry expired");
            *slot = None;
        }
        None
    }

    fn store(&self, fingerprint: &str, report: AggregatedReport) -> Arc<AggregatedReport> {
        let report = Arc::new(report);
        *self.slot() = Some(CacheEntry {
            fingerprint: fingerprint.to_string(),
            report: report.clone(),
            created: (self.clock)(),
        });
        report
    }

    /// Return the fresh cached report for `fingerprint`, or run `compute`
    /// and cache its result. Errors from `compute` are returned and nothing
    /// is cached.
    pub async fn get_or_compute<F, Fut, E>(
        &self,
        fingerprint: &str,
        compute: F,
    ) -> Result<Arc<AggregatedReport>, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<AggregatedReport, E>>,
    {
        if let Some(report) = self.lookup(fingerprint) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            log::info!("report cache hit");
            return Ok(report);
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        log::info!("report cache miss, recomputing");
        let report = compute().await?;
        Ok(self.store(fingerprint, report))
    }

    /// Drop the cached report so the next request recomputes.
    pub fn invalidate(&self) {
        *self.slot() = None;
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}

/// Hex SHA-256 over the sorted file identities and the query.
pub fn fingerprint(files: &[SourceFile], query: &ReportQuery) -> String {
    let mut identities: Vec<(&str, i64, u32, u64)> = files
        .iter()
        .map(|f| {
            (
                f.handle.as_str(),
                f.modified.timestamp(),
                f.modified.timestamp_subsec_nanos(),
                f.size,
            )
        })
        .collect();
    identities.sort();

    let mut hasher = Sha256::new();
    for (handle, secs, nanos, size) in identities {
        hasher.update(handle.as_bytes());
        hasher.update([0u8]);
        hasher.update(secs.to_le_bytes());
        hasher.update(nanos.to_le_bytes());
        hasher.update(size.to_le_bytes());
    }
    hasher.update(serde_json::to_vec(query).unwrap_or_default());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, TimeZone, Utc};
    use std::sync::atomic::AtomicUsize;

    struct ManualClock {
        start: Instant,
        offset_secs: AtomicU64,
    }

    impl ManualClock {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                start: Instant::now(),
                offset_secs: AtomicU64::new(0),
            })
        }

        fn advance(&self, secs: u64) {
            self.offset_secs.fetch_add(secs, Ordering::SeqCst);
        }

        fn as_clock(self: &Arc<Self>) -> Clock {
            let me = self.clone();
            Arc::new(move || me.start + Duration::from_secs(me.offset_secs.load(Ordering::SeqCst)))
        }
    }

    fn report(threshold: u64) -> AggregatedReport {
        AggregatedReport {
            threshold,
            ..AggregatedReport::default()
        }
    }

    async fn counted(
        cache: &ReportCache,
        fp: &str,
        calls: &AtomicUsize,
    ) -> Arc<AggregatedReport> {
        cache
            .get_or_compute(fp, move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok::<_, std::convert::Infallible>(report(50))
            })
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn second_call_returns_same_instance() {
        let cache = ReportCache::new(Duration::from_secs(300));
        let calls = AtomicUsize::new(0);

        let first = counted(&cache, "fp", &calls).await;
        let second = counted(&cache, "fp", &calls).await;

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.stats(), CacheStats { hits: 1, misses: 1 });
    }

    #[tokio::test]
    async fn invalidate_forces_recompute() {
        let cache = ReportCache::new(Duration::from_secs(300));
        let calls = AtomicUsize::new(0);

        counted(&cache, "fp", &calls).await;
        cache.invalidate();
        counted(&cache, "fp", &calls).await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn new_fingerprint_evicts_old_entry() {
        let cache = ReportCache::new(Duration::from_secs(300));
        let calls = AtomicUsize::new(0);

        counted(&cache, "a", &calls).await;
        counted(&cache, "b", &calls).await;
        assert!(cache.lookup("a").is_none());
        assert!(cache.lookup("b").is_some());
        counted(&cache, "a", &calls).await;
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn stale_entry_is_never_served() {
        let clock = ManualClock::new();
        let cache = ReportCache::with_clock(Duration::from_secs(300), clock.as_clock());
        let calls = AtomicUsize::new(0);

        counted(&cache, "fp", &calls).await;
        clock.advance(299);
        counted(&cache, "fp", &calls).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        clock.advance(1);
        counted(&cache, "fp", &calls).await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn failed_compute_caches_nothing() {
        let cache = ReportCache::new(Duration::from_secs(300));
        let result = cache
            .get_or_compute("fp", || async { Err::<AggregatedReport, _>("boom") })
            .await;
        assert_eq!(result.unwrap_err(), "boom");
        assert!(cache.lookup("fp").is_none());
    }

    fn file(handle: &str, secs: i64, size: u64) -> SourceFile {
        SourceFile {
            handle: handle.to_string(),
            name: handle.to_string(),
            date: NaiveDate::from_ymd_opt(2025, 11, 1).unwrap(),
            modified: Utc.timestamp_opt(secs, 0).unwrap(),
            size,
        }
    }

    #[test]
    fn fingerprint_ignores_listing_order() {
        let q = ReportQuery::with_threshold(50);
        let a = fingerprint(&[file("a", 1, 1), file("b", 2, 2)], &q);
        let b = fingerprint(&[file("b", 2, 2), file("a", 1, 1)], &q);
        assert_eq!(a, b);
    }

    #[test]
    fn fingerprint_tracks_mtime_size_and_query() {
        let q = ReportQuery::with_threshold(50);
        let base = fingerprint(&[file("a", 1, 1)], &q);
        assert_ne!(base, fingerprint(&[file("a", 2, 1)], &q));
        assert_ne!(base, fingerprint(&[file("a", 1, 9)], &q));
        assert_ne!(base, fingerprint(&[file("a", 1, 1)], &ReportQuery::with_threshold(10)));
        assert_ne!(base, fingerprint(&[], &q));
    }
}
