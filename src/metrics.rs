use metrics::{counter, gauge, histogram};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

pub const DOCUMENTS_INDEXED_TOTAL: &str = "flock_search_documents_indexed_total";
pub const SEARCHES_TOTAL: &str = "flock_search_queries_total";
pub const SEARCH_DURATION: &str = "flock_search_query_duration_seconds";
pub const SEARCH_HITS: &str = "flock_search_hits";
pub const DEDUP_CHECKS_TOTAL: &str = "flock_dedup_checks_total";
pub const DEDUP_DUPLICATES_TOTAL: &str = "flock_dedup_duplicates_total";
pub const DEDUP_BATCH_KEPT: &str = "flock_dedup_batch_kept";

/// Metrics collection and management
///
/// Every record goes to the global `metrics` recorder (a no-op unless the
/// embedding service installs one) and to local tallies readable in tests.
#[derive(Debug, Default)]
pub struct MetricsCollector {
    documents_indexed: AtomicU64,
    searches: AtomicU64,
    dedup_checks: AtomicU64,
    duplicates: AtomicU64,
}

impl MetricsCollector {
    /// Record a batch of documents added to a search index
    pub fn record_documents_indexed(&self, count: usize) {
        let count = count as u64;
        counter!(DOCUMENTS_INDEXED_TOTAL).increment(count);
        self.documents_indexed.fetch_add(count, Ordering::Relaxed);
    }

    /// Record one executed search
    pub fn record_search(&self, scoped: bool, hits: usize, duration: Duration) {
        counter!(SEARCHES_TOTAL, "scoped" => scoped.to_string()).increment(1);
        histogram!(SEARCH_DURATION).record(duration.as_secs_f64());
        histogram!(SEARCH_HITS).record(hits as f64);
        self.searches.fetch_add(1, Ordering::Relaxed);
    }

    /// Record one duplicate check; `reason` is `None` for a non-duplicate
    pub fn record_dedup_check(&self, reason: Option<&'static str>) {
        counter!(DEDUP_CHECKS_TOTAL).increment(1);
        self.dedup_checks.fetch_add(1, Ordering::Relaxed);
        if let Some(reason) = reason {
            counter!(DEDUP_DUPLICATES_TOTAL, "reason" => reason).increment(1);
            self.duplicates.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Record how many posts survived a batch filter
    pub fn record_batch_kept(&self, kept: usize) {
        gauge!(DEDUP_BATCH_KEPT).set(kept as f64);
    }

    /// Documents indexed so far
    pub fn documents_indexed(&self) -> u64 {
        self.documents_indexed.load(Ordering::Relaxed)
    }

    /// Searches executed so far
    pub fn searches(&self) -> u64 {
        self.searches.load(Ordering::Relaxed)
    }

    /// Duplicate checks performed so far
    pub fn dedup_checks(&self) -> u64 {
        self.dedup_checks.load(Ordering::Relaxed)
    }

    /// Checks that returned a duplicate verdict
    pub fn duplicates(&self) -> u64 {
        self.duplicates.load(Ordering::Relaxed)
    }
}
