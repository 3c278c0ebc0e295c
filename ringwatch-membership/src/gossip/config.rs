use std::net::SocketAddr;
use std::time::Duration;

use ringwatch_manager::ManagerConfig;

pub static DEFAULT_CLUSTER_ID: &str = "default";
pub const DEFAULT_GOSSIP_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Clone)]
/// Configuration for a gossip backed ring.
pub struct GossipConfig {
    /// The unique name of this node within the cluster.
    pub node_id: String,

    /// Only nodes sharing the same cluster id will talk to one another.
    pub cluster_id: String,

    /// The address the gossip protocol binds to.
    ///
    /// This is often `0.0.0.0` + your chosen port.
    pub listen_addr: SocketAddr,

    /// The gossip address broadcast to other members.
    pub public_addr: SocketAddr,

    /// A set of initial seed nodes which the node will attempt to connect to and learn of any
    /// other members in the cluster.
    pub seed_nodes: Vec<String>,

    /// The port this node's *service* listens on, advertised to peers and used
    /// to build ring keys.
    pub service_port: u16,

    /// How often the node gossips with its peers.
    pub gossip_interval: Duration,

    /// Settings for the ring manager fed by the gossip layer.
    pub manager: ManagerConfig,
}

impl GossipConfig {
    /// Creates a new gossip config.
    pub fn new(
        node_id: impl Into<String>,
        listen_addr: SocketAddr,
        public_addr: SocketAddr,
        seeds: impl IntoIterator<Item = impl AsRef<str>>,
        service_port: u16,
    ) -> Self {
        Self {
            node_id: node_id.into(),
            cluster_id: DEFAULT_CLUSTER_ID.to_string(),
            listen_addr,
            public_addr,
            seed_nodes: seeds
                .into_iter()
                .map(|seed| seed.as_ref().to_string())
                .collect(),
            service_port,
            gossip_interval: DEFAULT_GOSSIP_INTERVAL,
            manager: ManagerConfig::default(),
        }
    }

    /// Set the cluster id for the node.
    pub fn with_cluster_id(mut self, cluster_id: impl Into<String>) -> Self {
        self.cluster_id = cluster_id.into();
        self
    }

    /// Set how often the node gossips.
    pub fn with_gossip_interval(mut self, interval: Duration) -> Self {
        self.gossip_interval = interval;
        self
    }

    /// Set the ring manager settings.
    pub fn with_manager_config(mut self, config: ManagerConfig) -> Self {
        self.manager = config;
        self
    }
}
