use std::sync::Arc;

use async_trait::async_trait;
use ringwatch_hashring::RingKey;
use ringwatch_manager::{RingManager, RingMembership};

use super::{DiscoveryAdapter, DiscoveryConfig, DiscoveryStatistics, Receiver};
use crate::MembershipError;

/// A consistent hash ring made up of the alive instances of one discovered service.
pub struct DiscoveryRing {
    manager: RingManager,
    adapter: Arc<DiscoveryAdapter>,
    receiver: Receiver,
    statistics: DiscoveryStatistics,
}

impl DiscoveryRing {
    /// Starts the ring manager and begins following the discovery catalog.
    ///
    /// If a seed URL is configured the catalog state is fetched and applied before
    /// this returns, failing to do so fails the whole ring.
    pub async fn connect(config: DiscoveryConfig) -> Result<Self, MembershipError> {
        let manager = RingManager::with_config(Vec::<String>::new(), config.manager.clone());
        manager.start()?;
        if let Err(error) = manager.try_ping().await {
            let _ = manager.stop();
            return Err(error.into());
        }

        let statistics = DiscoveryStatistics::default();
        let adapter = Arc::new(DiscoveryAdapter::new(
            manager.clone(),
            config.service_name.clone(),
            config.service_port,
            statistics.clone(),
        ));

        let receiver = Receiver::new(config.receiver_capacity, statistics.clone());
        receiver.subscribe(config.service_name.clone());

        if let Some(url) = config.seed_url.as_deref() {
            let bootstrapped = receiver
                .fetch_initial_state(url, config.bootstrap_timeout, &adapter)
                .await;

            if let Err(error) = bootstrapped {
                error!(error = %error, "Failed to bootstrap discovery ring.");
                receiver.close();
                let _ = manager.stop();
                return Err(error);
            }
        }

        receiver.spawn_processor(adapter.clone());

        info!(
            service = %config.service_name,
            service_port = config.service_port,
            "Discovery ring is ready."
        );

        Ok(Self {
            manager,
            adapter,
            receiver,
            statistics,
        })
    }

    #[inline]
    pub fn adapter(&self) -> &DiscoveryAdapter {
        &self.adapter
    }

    #[inline]
    /// The receiver pushed catalog events should be handed to.
    pub fn receiver(&self) -> &Receiver {
        &self.receiver
    }

    #[inline]
    pub fn statistics(&self) -> &DiscoveryStatistics {
        &self.statistics
    }

    /// Stops the receiver and the ring manager.
    pub fn shutdown(&self) {
        self.receiver.close();
        if let Err(error) = self.manager.stop() {
            warn!(error = %error, "Failed to stop ring manager.");
        }
    }
}

#[async_trait]
impl RingMembership for DiscoveryRing {
    type Member = RingKey;

    fn manager(&self) -> &RingManager {
        &self.manager
    }

    async fn members(&self) -> Vec<Self::Member> {
        self.adapter.snapshot().await
    }
}
