mod adapter;
mod backend;
mod config;
mod ring;

use std::net::IpAddr;

use async_trait::async_trait;
use serde::{Serialize, Serializer};

pub use self::adapter::GossipAdapter;
pub use self::backend::{ChitchatMembership, GossipMembers, NODE_META_KEY};
pub use self::config::{GossipConfig, DEFAULT_CLUSTER_ID, DEFAULT_GOSSIP_INTERVAL};
pub use self::ring::GossipRing;

/// The largest metadata payload a node will advertise.
pub const MAX_METADATA_SIZE: usize = 512;

#[derive(Debug, Clone, Eq, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
/// A member of the gossip cluster as seen by the membership layer.
pub struct GossipNode {
    /// The unique name of the member within the gossip cluster.
    pub name: String,
    /// The address the member gossips on.
    pub addr: IpAddr,
    /// The port the member gossips on.
    pub port: u16,
    #[serde(serialize_with = "serialize_meta")]
    /// The opaque metadata advertised by the member.
    pub meta: Vec<u8>,
}

fn serialize_meta<S>(meta: &[u8], serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(&String::from_utf8_lossy(meta))
}

#[async_trait]
/// The events a gossip membership layer delivers to whoever is watching it.
pub trait MembershipDelegate: Send + Sync + 'static {
    /// Produces the metadata this node advertises to its peers.
    ///
    /// The returned payload must not exceed `limit` bytes.
    fn on_metadata_request(&self, limit: usize) -> Vec<u8>;

    /// A node has joined the cluster.
    async fn on_join(&self, node: &GossipNode);

    /// A node has left the cluster or been declared dead.
    async fn on_leave(&self, node: &GossipNode);

    /// A node already in the cluster has changed its metadata.
    async fn on_update(&self, node: &GossipNode);
}
