use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chitchat::transport::Transport;
use chitchat::{
    spawn_chitchat,
    ChitchatConfig,
    ChitchatHandle,
    ClusterStateSnapshot,
    FailureDetectorConfig,
    NodeId,
};
use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tokio_stream::wrappers::WatchStream;
use tokio_stream::StreamExt;

use super::{GossipConfig, GossipNode, MembershipDelegate, MAX_METADATA_SIZE};
use crate::MembershipError;

/// The chitchat key each node publishes its metadata under.
pub static NODE_META_KEY: &str = "node_meta";

pub type GossipMembers = BTreeMap<String, GossipNode>;

/// A gossip membership layer backed by chitchat.
///
/// The delegate is installed before the node joins the cluster so the node's
/// metadata is part of its state from the very first gossip round. Membership
/// notifications are only delivered to the delegate once [Self::start_notifications]
/// is called, any change before then is picked up by diffing against the
/// members the caller has already seen.
pub struct ChitchatMembership {
    me: GossipNode,
    delegate: Arc<dyn MembershipDelegate>,
    chitchat_handle: ChitchatHandle,
    members: watch::Receiver<GossipMembers>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    stop: Arc<AtomicBool>,
}

impl ChitchatMembership {
    pub async fn connect(
        config: &GossipConfig,
        delegate: Arc<dyn MembershipDelegate>,
        transport: &dyn Transport,
    ) -> Result<Self, MembershipError> {
        info!(
            cluster_id = %config.cluster_id,
            node_id = %config.node_id,
            public_addr = %config.public_addr,
            listen_gossip_addr = %config.listen_addr,
            peer_seed_addrs = %config.seed_nodes.join(", "),
            "Joining cluster."
        );

        let meta = delegate.on_metadata_request(MAX_METADATA_SIZE);
        let me = GossipNode {
            name: config.node_id.clone(),
            addr: config.public_addr.ip(),
            port: config.public_addr.port(),
            meta: meta.clone(),
        };

        let cfg = ChitchatConfig {
            node_id: NodeId::new(config.node_id.clone(), config.public_addr),
            cluster_id: config.cluster_id.clone(),
            gossip_interval: config.gossip_interval,
            listen_addr: config.listen_addr,
            seed_nodes: config.seed_nodes.clone(),
            failure_detector_config: FailureDetectorConfig {
                initial_interval: config.gossip_interval,
                ..Default::default()
            },
            is_ready_predicate: None,
        };

        let chitchat_handle = spawn_chitchat(
            cfg,
            vec![(
                NODE_META_KEY.to_string(),
                String::from_utf8_lossy(&meta).into_owned(),
            )],
            transport,
        )
        .await
        .map_err(|e| MembershipError::Gossip(e.to_string()))?;

        let initial_members = BTreeMap::from_iter([(me.name.clone(), me.clone())]);
        let (members_tx, members_rx) = watch::channel(initial_members);

        let stop = Arc::new(AtomicBool::new(false));
        let watcher = tokio::spawn(watch_ready_nodes(
            chitchat_handle.chitchat(),
            me.clone(),
            config.gossip_interval,
            members_tx,
            stop.clone(),
        ));

        Ok(Self {
            me,
            delegate,
            chitchat_handle,
            members: members_rx,
            tasks: Mutex::new(vec![watcher]),
            stop,
        })
    }

    #[inline]
    /// The member representing this node.
    pub fn me(&self) -> &GossipNode {
        &self.me
    }

    /// The members currently known to the gossip layer, including this node.
    pub fn members(&self) -> Vec<GossipNode> {
        self.members.borrow().values().cloned().collect()
    }

    /// Return [WatchStream] for monitoring change of node members.
    pub fn member_change_watcher(&self) -> WatchStream<GossipMembers> {
        WatchStream::new(self.members.clone())
    }

    /// Waits for the predicate to hold true for the cluster's members.
    ///
    /// Returns `false` if it did not hold within the given timeout.
    pub async fn wait_for_members<F>(&self, mut predicate: F, timeout_after: Duration) -> bool
    where
        F: FnMut(&GossipMembers) -> bool,
    {
        tokio::time::timeout(
            timeout_after,
            self.member_change_watcher()
                .skip_while(|members| !predicate(members))
                .next(),
        )
        .await
        .is_ok()
    }

    /// Begins delivering join, leave and update notifications to the delegate.
    ///
    /// `seen` is the set of members the delegate already knows about, typically
    /// the result of replaying [Self::members] through `on_join`.
    pub fn start_notifications(&self, seen: Vec<GossipNode>) {
        let seen = seen
            .into_iter()
            .map(|node| (node.name.clone(), node))
            .collect();

        let task = tokio::spawn(dispatch_membership_changes(
            self.me.name.clone(),
            self.delegate.clone(),
            self.member_change_watcher(),
            seen,
        ));
        self.tasks.lock().push(task);
    }

    /// Leave the cluster.
    pub async fn shutdown(self) {
        info!(self_addr = ?self.me.addr, node_id = %self.me.name, "Shutting down the cluster.");
        self.stop.store(true, Ordering::Relaxed);

        let result = self.chitchat_handle.shutdown().await;
        if let Err(error) = result {
            error!(node_id = %self.me.name, error = ?error, "Error while shutting down.");
        }

        for task in self.tasks.lock().drain(..) {
            task.abort();
        }
    }
}

/// Converts the ready node sets produced by chitchat into gossip members.
///
/// Chitchat only signals when the *set* of ready nodes changes, so the state is also
/// re-read every gossip interval to pick up metadata changes of existing members.
async fn watch_ready_nodes(
    chitchat: Arc<tokio::sync::Mutex<chitchat::Chitchat>>,
    me: GossipNode,
    gossip_interval: Duration,
    members_tx: watch::Sender<GossipMembers>,
    stop: Arc<AtomicBool>,
) {
    let mut node_change_rx = chitchat.lock().await.ready_nodes_watcher();
    let mut refresh = interval(gossip_interval);
    refresh.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut ready_nodes = Vec::<NodeId>::new();
    loop {
        tokio::select! {
            change = node_change_rx.next() => {
                let Some(members_set) = change else {
                    break;
                };
                ready_nodes = members_set.into_iter().collect();
            },
            _ = refresh.tick() => {},
        }

        if stop.load(Ordering::Relaxed) {
            debug!("Received a stop signal. Stopping.");
            break;
        }

        let state_snapshot = chitchat.lock().await.state_snapshot();
        let mut members = ready_nodes
            .iter()
            .filter_map(|node_id| match build_gossip_node(node_id, &state_snapshot) {
                Ok(node) => Some((node.name.clone(), node)),
                Err(error) => {
                    error!(
                        error = %error,
                        "Failed to build gossip member from cluster state, ignoring member.",
                    );
                    None
                },
            })
            .collect::<GossipMembers>();
        members.insert(me.name.clone(), me.clone());

        if *members_tx.borrow() == members {
            continue;
        }

        if members_tx.send(members).is_err() {
            // Somehow the membership has been dropped.
            error!("Failed to update members list. Stopping.");
            break;
        }
    }
}

/// Watches for changes in the cluster membership, turning them into delegate events.
async fn dispatch_membership_changes(
    self_node_id: String,
    delegate: Arc<dyn MembershipDelegate>,
    mut changes: WatchStream<GossipMembers>,
    mut last_members: GossipMembers,
) {
    while let Some(members) = changes.next().await {
        for (name, node) in last_members.iter() {
            if !members.contains_key(name) {
                info!(
                    self_node_id = %self_node_id,
                    target_node_id = %name,
                    target_addr = %node.addr,
                    "Node is no longer part of cluster."
                );
                delegate.on_leave(node).await;
            }
        }

        for (name, node) in members.iter() {
            match last_members.get(name) {
                None => {
                    info!(
                        self_node_id = %self_node_id,
                        target_node_id = %name,
                        target_addr = %node.addr,
                        "Node has connected to the cluster."
                    );
                    delegate.on_join(node).await;
                },
                Some(previous) if previous != node => delegate.on_update(node).await,
                Some(_) => {},
            }
        }

        last_members = members;
    }
}

fn build_gossip_node(
    chitchat_id: &NodeId,
    state: &ClusterStateSnapshot,
) -> Result<GossipNode, String> {
    let node_state = state.node_states.get(&chitchat_id.id).ok_or_else(|| {
        format!(
            "Could not find node ID `{}` in ChitChat state.",
            chitchat_id.id
        )
    })?;

    let meta = node_state.get(NODE_META_KEY).unwrap_or_default();

    Ok(GossipNode {
        name: chitchat_id.id.clone(),
        addr: chitchat_id.gossip_public_address.ip(),
        port: chitchat_id.gossip_public_address.port(),
        meta: meta.as_bytes().to_vec(),
    })
}
