//! # Ringwatch Membership
//!
//! Membership sources which keep a [RingManager](ringwatch_manager::RingManager) current.
//!
//! - [GossipRing] joins a gossip cluster and places every member on the ring under
//!   its address and the service port it advertises.
//! - [DiscoveryRing] follows a push based service discovery catalog and places every
//!   alive instance of one service on the ring.
//!
//! Both implement [RingMembership](ringwatch_manager::RingMembership) so they can be
//! served by the same routing facade.

#[macro_use]
extern crate tracing;

pub mod discovery;
mod error;
pub mod gossip;
mod resolver;

pub use discovery::{DiscoveryConfig, DiscoveryRing};
pub use error::MembershipError;
pub use gossip::{GossipConfig, GossipNode, GossipRing};
pub use resolver::{key_for_node, key_for_service, NodeMetadata};
