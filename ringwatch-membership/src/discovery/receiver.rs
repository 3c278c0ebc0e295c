use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use hyper::{Client, StatusCode, Uri};
use parking_lot::{Mutex, RwLock};
use tokio::task::JoinHandle;

use super::statistics::DiscoveryStatisticsInner;
use super::{DiscoveryAdapter, DiscoveryStatistics, ServicesState, StateChangedEvent};
use crate::MembershipError;

/// Queues catalog states pushed by the discovery service and feeds them to an adapter.
///
/// The queue is bounded, when it is full the oldest queued state is discarded as
/// every state is a full snapshot and supersedes anything queued before it.
pub struct Receiver {
    tx: RwLock<Option<flume::Sender<ServicesState>>>,
    rx: flume::Receiver<ServicesState>,
    subscriptions: RwLock<BTreeSet<String>>,
    statistics: DiscoveryStatistics,
    processor: Mutex<Option<JoinHandle<()>>>,
}

impl Receiver {
    pub fn new(capacity: usize, statistics: DiscoveryStatistics) -> Self {
        let (tx, rx) = flume::bounded(capacity.max(1));
        Self {
            tx: RwLock::new(Some(tx)),
            rx,
            subscriptions: RwLock::new(BTreeSet::new()),
            statistics,
            processor: Mutex::new(None),
        }
    }

    /// Only deliver events about the given service.
    ///
    /// With no subscriptions every event is delivered.
    pub fn subscribe(&self, service_name: impl Into<String>) {
        self.subscriptions.write().insert(service_name.into());
    }

    /// Returns if events about the given service should be delivered.
    pub fn is_subscribed(&self, service_name: &str) -> bool {
        let subscriptions = self.subscriptions.read();
        subscriptions.is_empty() || subscriptions.contains(service_name)
    }

    /// The number of states waiting to be processed.
    pub fn pending(&self) -> usize {
        self.rx.len()
    }

    pub fn is_closed(&self) -> bool {
        self.tx.read().is_none()
    }

    /// Decodes a pushed state change event and queues its state.
    ///
    /// Returns `false` if the event concerns no subscribed service and was dropped.
    pub fn enqueue_update(&self, body: &[u8]) -> Result<bool, MembershipError> {
        let event = StateChangedEvent::decode(body).map_err(MembershipError::InvalidState)?;

        let service = &event.change_event.service;
        if !self.is_subscribed(&service.name) {
            debug!(service = %service.name, "Ignoring event for unsubscribed service.");
            DiscoveryStatisticsInner::incr(&self.statistics.num_events_filtered, 1);
            return Ok(false);
        }

        debug!(
            service = %service.name,
            service_id = %service.id,
            status = ?service.status,
            previous_status = ?event.change_event.previous_status,
            "Received state change event.",
        );

        self.enqueue(event.state)?;
        Ok(true)
    }

    /// Queues a full catalog state for processing.
    pub fn enqueue(&self, mut state: ServicesState) -> Result<(), MembershipError> {
        let guard = self.tx.read();
        let tx = guard.as_ref().ok_or(MembershipError::ReceiverClosed)?;

        loop {
            match tx.try_send(state) {
                Ok(()) => break,
                Err(flume::TrySendError::Disconnected(_)) => {
                    return Err(MembershipError::ReceiverClosed)
                },
                Err(flume::TrySendError::Full(rejected)) => {
                    state = rejected;
                    if self.rx.try_recv().is_ok() {
                        warn!("Receiver queue is full, dropping the oldest state.");
                        DiscoveryStatisticsInner::incr(&self.statistics.num_events_dropped, 1);
                    }
                },
            }
        }

        DiscoveryStatisticsInner::incr(&self.statistics.num_events_received, 1);
        Ok(())
    }

    /// Fetches the current catalog state from the given URL and applies it.
    ///
    /// This bypasses the queue so the state is applied before the call returns.
    pub async fn fetch_initial_state(
        &self,
        url: &str,
        timeout: Duration,
        adapter: &DiscoveryAdapter,
    ) -> Result<(), MembershipError> {
        info!(url = %url, "Fetching initial discovery state.");

        let state = tokio::time::timeout(timeout, fetch_state(url))
            .await
            .map_err(|_| MembershipError::Bootstrap {
                url: url.to_string(),
                reason: format!("Timed out after {timeout:?}"),
            })??;

        let report = adapter.on_snapshot(&state).await;
        info!(
            url = %url,
            num_added = report.added.len(),
            num_skipped = report.skipped.len(),
            "Applied initial discovery state.",
        );
        Ok(())
    }

    /// Starts delivering queued states to the adapter.
    pub fn spawn_processor(&self, adapter: Arc<DiscoveryAdapter>) {
        let rx = self.rx.clone();
        let task = tokio::spawn(async move {
            while let Ok(state) = rx.recv_async().await {
                let report = adapter.on_snapshot(&state).await;
                debug!(
                    num_added = report.added.len(),
                    num_removed = report.removed.len(),
                    num_skipped = report.skipped.len(),
                    "Processed discovery state.",
                );
            }
            debug!("Receiver closed, stopping processor.");
        });

        if let Some(previous) = self.processor.lock().replace(task) {
            previous.abort();
        }
    }

    /// Stops accepting new states and stops the processor.
    pub fn close(&self) {
        if self.tx.write().take().is_none() {
            return;
        }

        info!("Closing discovery receiver.");
        if let Some(processor) = self.processor.lock().take() {
            processor.abort();
        }
    }
}

async fn fetch_state(url: &str) -> Result<ServicesState, MembershipError> {
    let bootstrap_error = |reason: String| MembershipError::Bootstrap {
        url: url.to_string(),
        reason,
    };

    let uri = url
        .parse::<Uri>()
        .map_err(|e| bootstrap_error(e.to_string()))?;

    let client = Client::new();
    let response = client
        .get(uri)
        .await
        .map_err(|e| bootstrap_error(e.to_string()))?;

    let status = response.status();
    let body = hyper::body::to_bytes(response.into_body())
        .await
        .map_err(|e| bootstrap_error(e.to_string()))?;

    if status != StatusCode::OK {
        return Err(bootstrap_error(format!(
            "Unexpected status {status}: {}",
            String::from_utf8_lossy(&body)
        )));
    }

    ServicesState::decode(&body).map_err(|e| bootstrap_error(e.to_string()))
}
