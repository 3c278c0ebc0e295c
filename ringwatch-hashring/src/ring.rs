use std::collections::BTreeSet;
use std::ops::Bound;

use thiserror::Error;

use crate::RingKey;

/// The number of positions each physical node occupies on the ring.
pub const DEFAULT_REPLICAS: u32 = 160;

#[derive(Debug, Copy, Clone, Error, Eq, PartialEq)]
pub enum HashRingError {
    #[error("No nodes in ring!")]
    /// A lookup was attempted on a ring with no members.
    EmptyRing,
}

#[derive(Debug, Clone)]
/// An immutable consistent hash ring.
///
/// Every physical node is hashed onto the ring `replicas` times. A key is owned by
/// the first position greater than or equal to its own hash, wrapping back around to
/// the start of the ring once the end is reached.
///
/// Positions are stored as `(hash, key)` pairs so two virtual nodes which happen to
/// collide on the same hash are ordered by their key rather than by insertion order.
pub struct ConsistentHashRing {
    replicas: u32,
    nodes: BTreeSet<RingKey>,
    positions: BTreeSet<(u32, RingKey)>,
}

impl Default for ConsistentHashRing {
    fn default() -> Self {
        Self::with_replicas(DEFAULT_REPLICAS)
    }
}

impl ConsistentHashRing {
    /// Creates a new ring pre-populated with the given nodes.
    pub fn new<K>(nodes: impl IntoIterator<Item = K>) -> Self
    where
        K: Into<RingKey>,
    {
        Self::default().with_nodes(nodes)
    }

    /// Creates an empty ring placing `replicas` virtual nodes for each member.
    ///
    /// At least one replica is always placed.
    pub fn with_replicas(replicas: u32) -> Self {
        Self {
            replicas: replicas.max(1),
            nodes: BTreeSet::new(),
            positions: BTreeSet::new(),
        }
    }

    #[inline]
    /// The number of virtual nodes placed for each member.
    pub fn replicas(&self) -> u32 {
        self.replicas
    }

    #[inline]
    /// The number of physical nodes in the ring.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Returns if the given node is a member of the ring.
    pub fn contains(&self, key: impl AsRef<str>) -> bool {
        self.nodes.contains(key.as_ref())
    }

    /// The physical members of the ring in sorted order.
    pub fn nodes(&self) -> impl Iterator<Item = &RingKey> + '_ {
        self.nodes.iter()
    }

    #[must_use]
    /// Places the given nodes on this ring in place, consuming it.
    ///
    /// Unlike chaining [Self::add_node] this does not copy the ring per node.
    pub fn with_nodes<K>(mut self, nodes: impl IntoIterator<Item = K>) -> Self
    where
        K: Into<RingKey>,
    {
        for node in nodes {
            self.insert(node.into());
        }
        self
    }

    #[must_use]
    /// Returns a new ring with the given node added.
    ///
    /// Adding a node which is already a member produces an identical ring.
    ///
    /// The returned ring is a full copy, every call clones all `replicas * nodes`
    /// positions. Use [Self::new] or [Self::with_nodes] to build a ring in bulk.
    pub fn add_node(&self, key: impl Into<RingKey>) -> Self {
        let mut ring = self.clone();
        ring.insert(key.into());
        ring
    }

    #[must_use]
    /// Returns a new ring with every virtual node of the given node removed.
    ///
    /// Removing a node which is not a member produces an identical ring.
    /// Like [Self::add_node] this copies every position of the ring.
    pub fn remove_node(&self, key: impl AsRef<str>) -> Self {
        let mut ring = self.clone();
        ring.remove(key.as_ref());
        ring
    }

    /// Gets the node which owns the given key.
    pub fn get_node(&self, key: &str) -> Result<&RingKey, HashRingError> {
        self.walk_from(hash_key(key))
            .next()
            .ok_or(HashRingError::EmptyRing)
    }

    /// Gets up to `n` distinct nodes for the given key, in ring order.
    ///
    /// The first node is always the same node returned by [Self::get_node], the
    /// remaining nodes are the next distinct owners walking clockwise.
    pub fn get_nodes(&self, key: &str, n: usize) -> Result<Vec<&RingKey>, HashRingError> {
        if self.is_empty() {
            return Err(HashRingError::EmptyRing);
        }

        let limit = n.min(self.nodes.len());
        let mut selected = Vec::with_capacity(limit);
        for node in self.walk_from(hash_key(key)) {
            if selected.len() >= limit {
                break;
            }

            if !selected.contains(&node) {
                selected.push(node);
            }
        }

        Ok(selected)
    }

    /// Iterates over every position on the ring once, starting at the first
    /// position greater than or equal to `hash` and wrapping around.
    fn walk_from(&self, hash: u32) -> impl Iterator<Item = &RingKey> + '_ {
        let start = (Bound::Included((hash, RingKey::min())), Bound::Unbounded);
        let end = (Bound::Unbounded, Bound::Excluded((hash, RingKey::min())));

        self.positions
            .range(start)
            .chain(self.positions.range(end))
            .map(|(_, key)| key)
    }

    fn insert(&mut self, key: RingKey) {
        if !self.nodes.insert(key.clone()) {
            return;
        }

        for replica in 0..self.replicas {
            self.positions.insert((hash_replica(&key, replica), key.clone()));
        }
    }

    fn remove(&mut self, key: &str) {
        let Some(key) = self.nodes.take(key) else {
            return;
        };

        for replica in 0..self.replicas {
            self.positions.remove(&(hash_replica(&key, replica), key.clone()));
        }
    }
}

#[inline]
fn hash_key(key: &str) -> u32 {
    crc32fast::hash(key.as_bytes())
}

fn hash_replica(key: &RingKey, replica: u32) -> u32 {
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(key.as_str().as_bytes());
    hasher.update(b"-");
    hasher.update(&replica.to_le_bytes());
    hasher.finalize()
}
