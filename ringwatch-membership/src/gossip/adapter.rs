use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use ringwatch_hashring::RingKey;
use ringwatch_manager::RingManager;

use super::{GossipNode, MembershipDelegate};
use crate::resolver::{key_for_node, NodeMetadata};

static EMPTY_METADATA: &[u8] = b"{}";

/// Bridges gossip membership events into ring manager commands.
///
/// The adapter can be created, and advertise this node's metadata, before the ring
/// manager exists. Events received while no manager is attached are dropped, the
/// gossip layer is expected to replay its known members once one is attached.
pub struct GossipAdapter {
    manager: RwLock<RingManager>,
    metadata: NodeMetadata,
    // The key each member was placed under, by member name.
    known: Mutex<HashMap<String, RingKey>>,
}

impl GossipAdapter {
    pub fn new(manager: RingManager, metadata: NodeMetadata) -> Self {
        Self {
            manager: RwLock::new(manager),
            metadata,
            known: Mutex::new(HashMap::new()),
        }
    }

    /// Attaches the ring manager events should be forwarded to.
    pub fn attach(&self, manager: RingManager) {
        *self.manager.write() = manager;
    }

    /// A handle to the currently attached ring manager.
    pub fn manager(&self) -> RingManager {
        self.manager.read().clone()
    }

    #[inline]
    /// The metadata this node advertises.
    pub fn metadata(&self) -> &NodeMetadata {
        &self.metadata
    }

    /// The ring keys of every member the adapter has placed on the ring.
    pub fn known_keys(&self) -> Vec<RingKey> {
        let mut keys = self.known.lock().values().cloned().collect::<Vec<_>>();
        keys.sort();
        keys
    }

    fn attached_manager(&self, event: &str, node: &GossipNode) -> Option<RingManager> {
        let manager = self.manager();
        if manager.is_initialized() {
            Some(manager)
        } else {
            warn!(node = %node.name, event = event, "Ring manager is not attached, ignoring event.");
            None
        }
    }

    async fn add(&self, manager: &RingManager, key: RingKey) {
        if let Err(error) = manager.add_node(key.clone()).await {
            error!(error = %error, node = %key, "Failed to add node to ring.");
        }
    }

    // Distinct members can resolve to the same key, e.g. a node which restarted
    // under a new name. The key stays on the ring while any of them remain.
    fn is_key_claimed(&self, key: &RingKey) -> bool {
        self.known.lock().values().any(|known| known == key)
    }

    async fn remove(&self, manager: &RingManager, key: RingKey) {
        if self.is_key_claimed(&key) {
            debug!(node = %key, "Ring key is still claimed by another member, keeping it.");
            return;
        }

        if let Err(error) = manager.remove_node(key.clone()).await {
            error!(error = %error, node = %key, "Failed to remove node from ring.");
        }
    }
}

#[async_trait]
impl MembershipDelegate for GossipAdapter {
    fn on_metadata_request(&self, limit: usize) -> Vec<u8> {
        let data = match self.metadata.encode() {
            Ok(data) => data,
            Err(error) => {
                error!(error = %error, "Error encoding node metadata!");
                return EMPTY_METADATA.to_vec();
            },
        };

        if data.len() > limit {
            error!(size = data.len(), limit = limit, "Node metadata exceeds the size limit!");
            return EMPTY_METADATA.to_vec();
        }

        debug!(metadata = %String::from_utf8_lossy(&data), "Setting node metadata.");
        data
    }

    async fn on_join(&self, node: &GossipNode) {
        debug!(node = %node.name, meta = %String::from_utf8_lossy(&node.meta), "Node joined.");

        let Some(manager) = self.attached_manager("join", node) else {
            return;
        };

        let key = match key_for_node(node) {
            Ok(key) => key,
            Err(error) => {
                error!(error = %error, node = %node.name, "Unable to add node to ring.");
                return;
            },
        };

        self.known.lock().insert(node.name.clone(), key.clone());
        self.add(&manager, key).await;
    }

    async fn on_leave(&self, node: &GossipNode) {
        debug!(node = %node.name, "Node left.");

        let Some(manager) = self.attached_manager("leave", node) else {
            return;
        };

        let recorded = self.known.lock().remove(&node.name);
        let key = match (key_for_node(node), recorded) {
            (Ok(key), _) => key,
            (Err(error), Some(key)) => {
                warn!(
                    error = %error,
                    node = %node.name,
                    key = %key,
                    "Unable to decode metadata of leaving node, using the key it joined with.",
                );
                key
            },
            (Err(error), None) => {
                error!(error = %error, node = %node.name, "Unable to remove node from ring.");
                return;
            },
        };

        self.remove(&manager, key).await;
    }

    async fn on_update(&self, node: &GossipNode) {
        debug!(node = %node.name, meta = %String::from_utf8_lossy(&node.meta), "Node updated.");

        let Some(manager) = self.attached_manager("update", node) else {
            return;
        };

        let key = match key_for_node(node) {
            Ok(key) => key,
            Err(error) => {
                error!(error = %error, node = %node.name, "Unable to refresh node metadata.");
                return;
            },
        };

        let previous = self.known.lock().insert(node.name.clone(), key.clone());
        match previous {
            Some(previous) if previous == key => {},
            Some(previous) => {
                info!(node = %node.name, previous = %previous, key = %key, "Node ring key has changed.");
                self.remove(&manager, previous).await;
                self.add(&manager, key).await;
            },
            None => self.add(&manager, key).await,
        }
    }
}
