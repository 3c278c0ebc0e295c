use std::collections::BTreeSet;

use parking_lot::Mutex;
use ringwatch_hashring::RingKey;
use ringwatch_manager::RingManager;

use super::statistics::DiscoveryStatisticsInner;
use super::{DiscoveryStatistics, ServiceRecord, ServicesState};
use crate::resolver::key_for_service;
use crate::MembershipError;

#[derive(Debug, Default)]
/// The outcome of reconciling one snapshot against the ring.
pub struct ReconcileReport {
    /// Keys which were not part of the previous snapshot.
    pub added: Vec<RingKey>,
    /// Keys from the previous snapshot which are no longer present.
    pub removed: Vec<RingKey>,
    /// Entries of the target service which could not be placed on the ring.
    pub skipped: Vec<MembershipError>,
}

impl ReconcileReport {
    #[inline]
    /// Returns if the pass issued no ring commands.
    pub fn is_unchanged(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

/// Turns full catalog snapshots into ring membership changes.
///
/// Each snapshot is filtered down to the alive instances of one service and diffed
/// against the previously applied snapshot, only the difference is sent to the ring.
pub struct DiscoveryAdapter {
    manager: RingManager,
    service_name: String,
    service_port: u16,
    snapshot: tokio::sync::Mutex<BTreeSet<RingKey>>,
    last_errors: Mutex<Vec<String>>,
    statistics: DiscoveryStatistics,
}

impl DiscoveryAdapter {
    pub fn new(
        manager: RingManager,
        service_name: impl Into<String>,
        service_port: u16,
        statistics: DiscoveryStatistics,
    ) -> Self {
        Self {
            manager,
            service_name: service_name.into(),
            service_port,
            snapshot: tokio::sync::Mutex::new(BTreeSet::new()),
            last_errors: Mutex::new(Vec::new()),
            statistics,
        }
    }

    #[inline]
    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    #[inline]
    pub fn service_port(&self) -> u16 {
        self.service_port
    }

    #[inline]
    pub fn statistics(&self) -> &DiscoveryStatistics {
        &self.statistics
    }

    /// The keys of the last applied snapshot.
    pub async fn snapshot(&self) -> Vec<RingKey> {
        self.snapshot.lock().await.iter().cloned().collect()
    }

    /// The errors recorded while applying the last snapshot.
    pub fn last_errors(&self) -> Vec<String> {
        self.last_errors.lock().clone()
    }

    /// Reconciles a catalog snapshot against the ring.
    pub async fn on_snapshot(&self, state: &ServicesState) -> ReconcileReport {
        self.reconcile(state.records()).await
    }

    /// Reconciles a set of service records against the ring.
    ///
    /// Records of other services and instances which are not alive are ignored.
    /// The stored snapshot is replaced with the result even when it is empty.
    pub async fn reconcile(
        &self,
        records: impl IntoIterator<Item = ServiceRecord>,
    ) -> ReconcileReport {
        let mut skipped = Vec::new();
        let new_snapshot = records
            .into_iter()
            .filter(|record| record.alive && record.name == self.service_name)
            .filter_map(|record| match key_for_service(&record, self.service_port) {
                Ok(key) => Some(key),
                Err(error) => {
                    error!(
                        error = %error,
                        service_id = %record.id,
                        "Skipping service which cannot be placed on the ring.",
                    );
                    skipped.push(error);
                    None
                },
            })
            .collect::<BTreeSet<_>>();

        // Held for the whole pass so snapshots are applied one at a time.
        let mut snapshot = self.snapshot.lock().await;

        let added = new_snapshot
            .difference(&snapshot)
            .cloned()
            .collect::<Vec<_>>();
        let removed = snapshot
            .difference(&new_snapshot)
            .cloned()
            .collect::<Vec<_>>();

        for key in added.iter() {
            debug!(service = %self.service_name, node = %key, "Adding node to ring.");
            if let Err(error) = self.manager.add_node(key.clone()).await {
                error!(error = %error, node = %key, "Failed to add node to ring.");
            }
        }

        for key in removed.iter() {
            debug!(service = %self.service_name, node = %key, "Removing node from ring.");
            if let Err(error) = self.manager.remove_node(key.clone()).await {
                error!(error = %error, node = %key, "Failed to remove node from ring.");
            }
        }

        *snapshot = new_snapshot;
        drop(snapshot);

        *self.last_errors.lock() = skipped.iter().map(ToString::to_string).collect();

        DiscoveryStatisticsInner::incr(&self.statistics.num_snapshots_applied, 1);
        DiscoveryStatisticsInner::incr(&self.statistics.num_nodes_added, added.len());
        DiscoveryStatisticsInner::incr(&self.statistics.num_nodes_removed, removed.len());
        DiscoveryStatisticsInner::incr(&self.statistics.num_entries_skipped, skipped.len());

        if !added.is_empty() || !removed.is_empty() {
            info!(
                service = %self.service_name,
                num_added = added.len(),
                num_removed = removed.len(),
                num_skipped = skipped.len(),
                "Ring membership updated from discovery.",
            );
        }

        ReconcileReport {
            added,
            removed,
            skipped,
        }
    }
}

#[cfg(test)]
mod tests {
    use ringwatch_manager::RingError;

    use super::*;
    use crate::discovery::PortRecord;

    fn record(id: &str, name: &str, ip: &str, port: i64, service_port: i64) -> ServiceRecord {
        ServiceRecord {
            id: id.to_string(),
            name: name.to_string(),
            hostname: "beowulf".to_string(),
            alive: true,
            ports: vec![PortRecord {
                ip: Some(ip.to_string()),
                port,
                service_port,
            }],
        }
    }

    async fn adapter() -> DiscoveryAdapter {
        let manager = RingManager::new(Vec::<String>::new());
        manager.start().expect("Start manager.");
        assert!(manager.ping().await);
        DiscoveryAdapter::new(manager, "awesome-svc", 8000, DiscoveryStatistics::default())
    }

    #[tokio::test]
    async fn test_unmatched_port_is_skipped() {
        let adapter = adapter().await;
        let report = adapter
            .reconcile([
                record("deadbeef0001", "awesome-svc", "10.0.0.5", 32763, 8000),
                record("deadbeef0002", "awesome-svc", "10.0.0.6", 32764, 9000),
            ])
            .await;

        assert_eq!(report.added, vec!["10.0.0.5:32763"]);
        assert!(report.removed.is_empty());
        assert_eq!(report.skipped.len(), 1);
        assert!(matches!(
            report.skipped[0],
            MembershipError::PortNotMatched { service_port: 8000, .. }
        ));
        assert_eq!(adapter.last_errors().len(), 1);
        assert_eq!(adapter.statistics().num_entries_skipped(), 1);

        let nodes = adapter.manager.nodes().await.unwrap();
        assert_eq!(nodes, vec!["10.0.0.5:32763"]);
    }

    #[tokio::test]
    async fn test_removal_only_touches_missing_nodes() {
        let adapter = adapter().await;
        let a = record("a", "awesome-svc", "10.0.0.5", 32763, 8000);
        let b = record("b", "awesome-svc", "10.0.0.6", 32763, 8000);

        adapter.reconcile([a, b.clone()]).await;
        let report = adapter.reconcile([b]).await;

        assert_eq!(report.removed, vec!["10.0.0.5:32763"]);
        assert!(report.added.is_empty());
        assert_eq!(adapter.snapshot().await, vec!["10.0.0.6:32763"]);
        assert_eq!(adapter.manager.nodes().await.unwrap(), vec!["10.0.0.6:32763"]);
        assert!(adapter.last_errors().is_empty());
    }

    #[tokio::test]
    async fn test_repeated_snapshot_is_idempotent() {
        let adapter = adapter().await;
        let records = vec![
            record("a", "awesome-svc", "10.0.0.5", 32763, 8000),
            record("other", "other-svc", "10.0.0.7", 32763, 8000),
        ];

        let first = adapter.reconcile(records.clone()).await;
        assert_eq!(first.added.len(), 1);

        let second = adapter.reconcile(records).await;
        assert!(second.is_unchanged());
        assert_eq!(adapter.statistics().num_nodes_added(), 1);
        assert_eq!(adapter.statistics().num_snapshots_applied(), 2);
    }

    #[tokio::test]
    async fn test_empty_snapshot_removes_everything() {
        let adapter = adapter().await;
        adapter
            .reconcile([
                record("a", "awesome-svc", "10.0.0.5", 32763, 8000),
                record("b", "awesome-svc", "10.0.0.6", 32763, 8000),
            ])
            .await;

        let report = adapter.reconcile(Vec::new()).await;
        assert_eq!(report.removed.len(), 2);
        assert!(adapter.snapshot().await.is_empty());
        assert_eq!(
            adapter.manager.get_node("grendel").await,
            Err(RingError::EmptyRing)
        );
    }

    #[tokio::test]
    async fn test_dead_services_are_not_members() {
        let adapter = adapter().await;
        let mut dead = record("a", "awesome-svc", "10.0.0.5", 32763, 8000);
        dead.alive = false;

        let report = adapter.reconcile([dead]).await;
        assert!(report.is_unchanged());
        assert!(report.skipped.is_empty());
    }

    #[tokio::test]
    async fn test_hostname_is_used_without_ip() {
        let adapter = adapter().await;
        let mut service = record("a", "awesome-svc", "", 32763, 8000);
        service.ports[0].ip = None;

        let report = adapter.reconcile([service]).await;
        assert_eq!(report.added, vec!["beowulf:32763"]);
    }
}
