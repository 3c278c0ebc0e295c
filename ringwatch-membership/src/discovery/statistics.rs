use std::ops::Deref;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

pub type Counter = AtomicU64;

#[derive(Debug, Clone, Default)]
/// Live metrics around the discovery feed.
pub struct DiscoveryStatistics(Arc<DiscoveryStatisticsInner>);

impl Deref for DiscoveryStatistics {
    type Target = DiscoveryStatisticsInner;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

#[derive(Debug, Default)]
pub struct DiscoveryStatisticsInner {
    pub(crate) num_events_received: Counter,
    pub(crate) num_events_filtered: Counter,
    pub(crate) num_events_dropped: Counter,
    pub(crate) num_snapshots_applied: Counter,
    pub(crate) num_nodes_added: Counter,
    pub(crate) num_nodes_removed: Counter,
    pub(crate) num_entries_skipped: Counter,
}

impl DiscoveryStatisticsInner {
    /// The number of pushed events accepted into the receiver queue.
    pub fn num_events_received(&self) -> u64 {
        self.num_events_received.load(Ordering::Relaxed)
    }

    /// The number of pushed events ignored because they concern no subscribed service.
    pub fn num_events_filtered(&self) -> u64 {
        self.num_events_filtered.load(Ordering::Relaxed)
    }

    /// The number of queued states discarded to make room for newer ones.
    pub fn num_events_dropped(&self) -> u64 {
        self.num_events_dropped.load(Ordering::Relaxed)
    }

    /// The number of snapshots reconciled against the ring.
    pub fn num_snapshots_applied(&self) -> u64 {
        self.num_snapshots_applied.load(Ordering::Relaxed)
    }

    pub fn num_nodes_added(&self) -> u64 {
        self.num_nodes_added.load(Ordering::Relaxed)
    }

    pub fn num_nodes_removed(&self) -> u64 {
        self.num_nodes_removed.load(Ordering::Relaxed)
    }

    /// The number of catalog entries which could not be turned into a ring key.
    pub fn num_entries_skipped(&self) -> u64 {
        self.num_entries_skipped.load(Ordering::Relaxed)
    }

    pub(crate) fn incr(counter: &Counter, n: usize) {
        counter.fetch_add(n as u64, Ordering::Relaxed);
    }
}
