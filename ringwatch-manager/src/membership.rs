use async_trait::async_trait;
use serde::Serialize;

use crate::RingManager;

#[async_trait]
/// A source of cluster membership which keeps a [RingManager] up to date.
///
/// Implementors observe membership in their own way (gossip, service discovery, ...)
/// and turn what they observe into ring manager commands. The routing facade only
/// ever needs the manager and a listing of the members currently known.
pub trait RingMembership: Send + Sync + 'static {
    /// A member as reported by the membership source.
    type Member: Serialize + Send;

    /// The manager owning the ring fed by this membership source.
    fn manager(&self) -> &RingManager;

    /// The members currently known to the membership source.
    async fn members(&self) -> Vec<Self::Member>;
}
