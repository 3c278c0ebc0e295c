use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chitchat::transport::Transport;
use ringwatch_manager::{RingManager, RingMembership};

use super::{ChitchatMembership, GossipAdapter, GossipConfig, GossipNode, MembershipDelegate};
use crate::resolver::NodeMetadata;
use crate::MembershipError;

/// A consistent hash ring kept current by gossip cluster membership.
///
/// Every member of the cluster, this node included, is placed on the ring under the
/// address it gossips from and the service port it advertises in its metadata.
pub struct GossipRing {
    manager: RingManager,
    adapter: Arc<GossipAdapter>,
    membership: ChitchatMembership,
}

impl GossipRing {
    /// Joins the gossip cluster and starts the ring manager fed by it.
    ///
    /// The node's metadata is advertised from the first gossip round. Once the
    /// manager is confirmed to be running every member already known is placed on
    /// the ring and later membership changes are applied as they are observed.
    pub async fn connect(
        config: GossipConfig,
        transport: &dyn Transport,
    ) -> Result<Self, MembershipError> {
        let adapter = Arc::new(GossipAdapter::new(
            RingManager::default(),
            NodeMetadata::new(config.service_port),
        ));

        let membership = ChitchatMembership::connect(
            &config,
            adapter.clone() as Arc<dyn MembershipDelegate>,
            transport,
        )
        .await?;

        let manager = RingManager::with_config(Vec::<String>::new(), config.manager.clone());
        let started = manager.start().map(|_worker| ());
        let ready = match started {
            Ok(()) => manager.try_ping().await,
            Err(error) => Err(error),
        };

        if let Err(error) = ready {
            error!(error = %error, node_id = %config.node_id, "Ring manager failed to start.");
            let _ = manager.stop();
            membership.shutdown().await;
            return Err(error.into());
        }

        adapter.attach(manager.clone());

        let seen = membership.members();
        for node in seen.iter() {
            adapter.on_join(node).await;
        }
        membership.start_notifications(seen);

        info!(
            node_id = %config.node_id,
            service_port = config.service_port,
            "Gossip ring is ready."
        );

        Ok(Self {
            manager,
            adapter,
            membership,
        })
    }

    #[inline]
    /// The adapter translating membership events into ring commands.
    pub fn adapter(&self) -> &GossipAdapter {
        &self.adapter
    }

    #[inline]
    /// The member representing this node.
    pub fn me(&self) -> &GossipNode {
        self.membership.me()
    }

    /// Waits until the gossip layer reports `count` members, this node included.
    pub async fn wait_for_members(&self, count: usize, timeout_after: Duration) -> bool {
        self.membership
            .wait_for_members(|members| members.len() == count, timeout_after)
            .await
    }

    /// Leaves the cluster and stops the ring manager.
    pub async fn shutdown(self) {
        self.membership.shutdown().await;
        if let Err(error) = self.manager.stop() {
            warn!(error = %error, "Failed to stop ring manager.");
        }
    }
}

#[async_trait]
impl RingMembership for GossipRing {
    type Member = GossipNode;

    fn manager(&self) -> &RingManager {
        &self.manager
    }

    async fn members(&self) -> Vec<Self::Member> {
        self.membership.members()
    }
}
