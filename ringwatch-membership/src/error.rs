use ringwatch_manager::RingError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MembershipError {
    #[error("Unable to decode metadata for {node}: {source}")]
    /// A gossip member advertised metadata which could not be decoded.
    DecodeFailure {
        node: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Node {node} advertised an invalid service port: {port:?}")]
    /// A gossip member's metadata decoded but did not contain a usable port.
    InvalidServicePort { node: String, port: String },

    #[error("Can't match service port {service_port} for incoming service {service_id}!")]
    /// A discovered service does not expose the port the ring is watching.
    PortNotMatched {
        service_id: String,
        service_port: u16,
    },

    #[error("Service {service_id} has neither an IP nor a hostname to route to.")]
    MissingAddress { service_id: String },

    #[error("Unable to decode service discovery state: {0}")]
    InvalidState(#[source] serde_json::Error),

    #[error("Failed to fetch initial state from {url}: {reason}")]
    /// The synchronous bootstrap of the discovery state failed.
    Bootstrap { url: String, reason: String },

    #[error("The discovery receiver has been closed.")]
    ReceiverClosed,

    #[error("{0}")]
    /// An error has occurred within Chitchat.
    Gossip(String),

    #[error("{0}")]
    Ring(#[from] RingError),
}
