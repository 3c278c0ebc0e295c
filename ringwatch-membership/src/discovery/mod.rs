//! Ring membership driven by a push based service discovery catalog.
//!
//! The catalog pushes a full copy of its state whenever any service changes, the
//! [Receiver] queues those states and the [DiscoveryAdapter] diffs each one against
//! the last to work out which ring members to add or remove.

mod adapter;
mod catalog;
mod config;
mod receiver;
mod ring;
mod statistics;

pub use self::adapter::{DiscoveryAdapter, ReconcileReport};
pub use self::catalog::{
    ChangeEvent,
    Port,
    Server,
    Service,
    ServiceStatus,
    ServicesState,
    StateChangedEvent,
};
pub use self::config::{DiscoveryConfig, DEFAULT_BOOTSTRAP_TIMEOUT, DEFAULT_RECEIVER_CAPACITY};
pub use self::receiver::Receiver;
pub use self::ring::DiscoveryRing;
pub use self::statistics::{DiscoveryStatistics, DiscoveryStatisticsInner};

#[derive(Debug, Clone, Eq, PartialEq)]
/// A catalog entry reduced to what is needed to derive its ring key.
pub struct ServiceRecord {
    pub id: String,
    pub name: String,
    pub hostname: String,
    pub alive: bool,
    pub ports: Vec<PortRecord>,
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct PortRecord {
    /// The address the port is exposed on, if it differs from the hostname.
    pub ip: Option<String>,
    /// The port the instance is reachable on.
    pub port: i64,
    /// The logical port of the service this port maps to.
    pub service_port: i64,
}
