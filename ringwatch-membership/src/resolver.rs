//! Derives the [RingKey] of a node from whichever membership representation is in use.
//!
//! Both sources produce `address:port` keys, the address being the one peers reach the
//! node on and the port being the port the *service* (not the membership protocol)
//! listens on.

use std::net::{IpAddr, SocketAddr};

use ringwatch_hashring::RingKey;
use serde::{Deserialize, Serialize};

use crate::discovery::ServiceRecord;
use crate::gossip::GossipNode;
use crate::MembershipError;

#[derive(Debug, Clone, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
/// The metadata each gossip member advertises about itself.
///
/// On the wire this is a small JSON object, e.g. `{"ServicePort":"8000"}`.
/// Unknown fields are ignored and missing fields decode to empty values.
pub struct NodeMetadata {
    pub service_port: String,
}

impl NodeMetadata {
    pub fn new(service_port: impl ToString) -> Self {
        Self {
            service_port: service_port.to_string(),
        }
    }

    /// Decodes metadata advertised by a gossip member.
    pub fn decode(data: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(data)
    }

    pub fn encode(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }
}

/// Gets the key used to place a gossip member on the ring.
pub fn key_for_node(node: &GossipNode) -> Result<RingKey, MembershipError> {
    let meta = NodeMetadata::decode(&node.meta).map_err(|source| {
        MembershipError::DecodeFailure {
            node: node.name.clone(),
            source,
        }
    })?;

    let port = meta.service_port.trim().parse::<u16>().map_err(|_| {
        MembershipError::InvalidServicePort {
            node: node.name.clone(),
            port: meta.service_port.clone(),
        }
    })?;

    // Formatting through a socket address keeps IPv6 keys unambiguous.
    Ok(RingKey::new(SocketAddr::new(node.addr, port).to_string()))
}

/// Gets the key used to place a discovered service on the ring.
///
/// The port record exposing `service_port` is located first, the key is then built
/// from that record's IP if it has one, otherwise the service's hostname.
pub fn key_for_service(
    service: &ServiceRecord,
    service_port: u16,
) -> Result<RingKey, MembershipError> {
    let matched = service
        .ports
        .iter()
        .find(|port| port.service_port == i64::from(service_port))
        .ok_or_else(|| MembershipError::PortNotMatched {
            service_id: service.id.clone(),
            service_port,
        })?;

    let address = match matched.ip.as_deref() {
        Some(ip) if !ip.is_empty() => ip,
        _ if !service.hostname.is_empty() => service.hostname.as_str(),
        _ => {
            return Err(MembershipError::MissingAddress {
                service_id: service.id.clone(),
            })
        },
    };

    // IP addresses are formatted the same way gossip keys are, bracketing IPv6.
    let host = match address.parse::<IpAddr>() {
        Ok(IpAddr::V6(ip)) => format!("[{ip}]"),
        Ok(IpAddr::V4(ip)) => ip.to_string(),
        Err(_) => address.to_string(),
    };

    Ok(RingKey::from_host_port(host, matched.port))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discovery::PortRecord;

    fn gossip_node(addr: &str, meta: &str) -> GossipNode {
        GossipNode {
            name: "beowulf".to_string(),
            addr: addr.parse::<IpAddr>().unwrap(),
            port: 7946,
            meta: meta.as_bytes().to_vec(),
        }
    }

    fn service(ip: Option<&str>, hostname: &str, ports: &[(i64, i64)]) -> ServiceRecord {
        ServiceRecord {
            id: "deadbeef0001".to_string(),
            name: "awesome-svc".to_string(),
            hostname: hostname.to_string(),
            alive: true,
            ports: ports
                .iter()
                .map(|(port, service_port)| PortRecord {
                    ip: ip.map(ToString::to_string),
                    port: *port,
                    service_port: *service_port,
                })
                .collect(),
        }
    }

    #[test]
    fn test_metadata_wire_format() {
        let meta = NodeMetadata::new(8000);
        assert_eq!(meta.encode().unwrap(), br#"{"ServicePort":"8000"}"#.to_vec());

        let decoded = NodeMetadata::decode(br#"{"ServicePort":"9000","Other":1}"#).unwrap();
        assert_eq!(decoded, NodeMetadata::new("9000"));

        let decoded = NodeMetadata::decode(b"{}").unwrap();
        assert_eq!(decoded, NodeMetadata::default());
    }

    #[test]
    fn test_key_for_node() {
        let node = gossip_node("10.0.0.5", r#"{"ServicePort":"8000"}"#);
        assert_eq!(key_for_node(&node).unwrap(), "10.0.0.5:8000");

        let node = gossip_node("::1", r#"{"ServicePort":"8000"}"#);
        assert_eq!(key_for_node(&node).unwrap(), "[::1]:8000");
    }

    #[test]
    fn test_key_for_node_is_stable() {
        let node = gossip_node("10.0.0.5", r#"{"ServicePort":"8000"}"#);
        assert_eq!(key_for_node(&node).unwrap(), key_for_node(&node).unwrap());
    }

    #[test]
    fn test_key_for_node_bad_metadata() {
        let node = gossip_node("10.0.0.5", "not json");
        assert!(matches!(
            key_for_node(&node),
            Err(MembershipError::DecodeFailure { .. })
        ));

        let node = gossip_node("10.0.0.5", "{}");
        assert!(matches!(
            key_for_node(&node),
            Err(MembershipError::InvalidServicePort { .. })
        ));
    }

    #[test]
    fn test_key_for_service_prefers_ip() {
        let svc = service(Some("10.0.0.1"), "indomitable", &[(32763, 8000)]);
        assert_eq!(key_for_service(&svc, 8000).unwrap(), "10.0.0.1:32763");

        let svc = service(None, "indomitable", &[(32763, 8000)]);
        assert_eq!(key_for_service(&svc, 8000).unwrap(), "indomitable:32763");

        let svc = service(Some(""), "indomitable", &[(32763, 8000)]);
        assert_eq!(key_for_service(&svc, 8000).unwrap(), "indomitable:32763");
    }

    #[test]
    fn test_ipv6_keys_match_across_sources() {
        let svc = service(Some("::1"), "indomitable", &[(8000, 8000)]);
        assert_eq!(key_for_service(&svc, 8000).unwrap(), "[::1]:8000");

        let node = gossip_node("::1", r#"{"ServicePort":"8000"}"#);
        assert_eq!(
            key_for_service(&svc, 8000).unwrap(),
            key_for_node(&node).unwrap()
        );

        let svc = service(Some("0:0:0:0:0:0:0:1"), "indomitable", &[(8000, 8000)]);
        assert_eq!(key_for_service(&svc, 8000).unwrap(), "[::1]:8000");
    }

    #[test]
    fn test_key_for_service_matches_port() {
        let svc = service(Some("10.0.0.1"), "indomitable", &[(32761, 9000), (32763, 8000)]);
        assert_eq!(key_for_service(&svc, 8000).unwrap(), "10.0.0.1:32763");

        let err = key_for_service(&svc, 10000).unwrap_err();
        assert!(matches!(
            err,
            MembershipError::PortNotMatched { service_port: 10000, .. }
        ));
    }

    #[test]
    fn test_key_for_service_without_address() {
        let svc = service(None, "", &[(32763, 8000)]);
        assert!(matches!(
            key_for_service(&svc, 8000),
            Err(MembershipError::MissingAddress { .. })
        ));
    }
}
