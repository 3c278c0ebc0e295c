//! The JSON model of the service discovery catalog.
//!
//! Only the fields needed to place services on the ring are modelled, anything else
//! the catalog sends is ignored.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::{PortRecord, ServiceRecord};

#[derive(Debug, Copy, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(from = "i32", into = "i32")]
/// The health of a service as reported by the catalog.
pub enum ServiceStatus {
    Alive,
    Tombstone,
    Unhealthy,
    Unknown,
    Draining,
}

impl Default for ServiceStatus {
    fn default() -> Self {
        Self::Unknown
    }
}

impl From<i32> for ServiceStatus {
    fn from(value: i32) -> Self {
        match value {
            0 => Self::Alive,
            1 => Self::Tombstone,
            2 => Self::Unhealthy,
            4 => Self::Draining,
            _ => Self::Unknown,
        }
    }
}

impl From<ServiceStatus> for i32 {
    fn from(status: ServiceStatus) -> Self {
        match status {
            ServiceStatus::Alive => 0,
            ServiceStatus::Tombstone => 1,
            ServiceStatus::Unhealthy => 2,
            ServiceStatus::Unknown => 3,
            ServiceStatus::Draining => 4,
        }
    }
}

#[derive(Debug, Clone, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct Port {
    #[serde(rename = "Type")]
    pub kind: String,
    pub port: i64,
    pub service_port: i64,
    #[serde(rename = "IP")]
    pub ip: String,
}

#[derive(Debug, Clone, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct Service {
    #[serde(rename = "ID")]
    pub id: String,
    pub name: String,
    pub image: String,
    pub hostname: String,
    pub ports: Vec<Port>,
    pub status: ServiceStatus,
}

impl Service {
    #[inline]
    pub fn is_alive(&self) -> bool {
        self.status == ServiceStatus::Alive
    }

    /// Converts the catalog entry into the representation keys are derived from.
    pub fn to_record(&self) -> ServiceRecord {
        ServiceRecord {
            id: self.id.clone(),
            name: self.name.clone(),
            hostname: self.hostname.clone(),
            alive: self.is_alive(),
            ports: self
                .ports
                .iter()
                .map(|port| PortRecord {
                    ip: Some(port.ip.clone()).filter(|ip| !ip.is_empty()),
                    port: port.port,
                    service_port: port.service_port,
                })
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
/// A host known to the catalog and the services running on it.
pub struct Server {
    pub name: String,
    pub services: BTreeMap<String, Service>,
}

#[derive(Debug, Clone, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
/// A full snapshot of the catalog.
pub struct ServicesState {
    pub cluster_name: String,
    pub servers: BTreeMap<String, Server>,
}

impl ServicesState {
    pub fn decode(data: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(data)
    }

    /// Visits every service in the catalog along with the host it runs on.
    pub fn services(&self) -> impl Iterator<Item = (&str, &Service)> + '_ {
        self.servers.iter().flat_map(|(hostname, server)| {
            server
                .services
                .values()
                .map(move |service| (hostname.as_str(), service))
        })
    }

    /// Every service in the catalog as a [ServiceRecord].
    ///
    /// Services which don't carry their own hostname inherit the one of the server
    /// they were reported under.
    pub fn records(&self) -> Vec<ServiceRecord> {
        self.services()
            .map(|(hostname, service)| {
                let mut record = service.to_record();
                if record.hostname.is_empty() {
                    record.hostname = hostname.to_string();
                }
                record
            })
            .collect()
    }
}

#[derive(Debug, Clone, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
/// The service whose state change triggered a push.
pub struct ChangeEvent {
    pub service: Service,
    pub previous_status: ServiceStatus,
}

#[derive(Debug, Clone, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
/// The envelope pushed by the catalog whenever a service changes state.
pub struct StateChangedEvent {
    pub state: ServicesState,
    pub change_event: ChangeEvent,
}

impl StateChangedEvent {
    pub fn decode(data: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    static PUSHED_EVENT: &str = r#"{
        "State": {
            "ClusterName": "default",
            "Servers": {
                "beowulf": {
                    "Name": "beowulf",
                    "LastUpdated": "2016-04-06T20:08:04.52938364Z",
                    "Services": {
                        "deadbeef0001": {
                            "ID": "deadbeef0001",
                            "Name": "awesome-svc",
                            "Image": "awesome-svc:latest",
                            "Hostname": "beowulf",
                            "Ports": [
                                {"Type": "tcp", "Port": 32763, "ServicePort": 8000, "IP": "10.0.0.5"}
                            ],
                            "Status": 0
                        },
                        "deadbeef0002": {
                            "ID": "deadbeef0002",
                            "Name": "awesome-svc",
                            "Ports": [],
                            "Status": 1
                        }
                    }
                }
            }
        },
        "ChangeEvent": {
            "Service": {"ID": "deadbeef0002", "Name": "awesome-svc", "Status": 1},
            "PreviousStatus": 0,
            "Time": "2016-04-06T20:08:04.52938364Z"
        }
    }"#;

    #[test]
    fn test_decode_pushed_event() {
        let event = StateChangedEvent::decode(PUSHED_EVENT.as_bytes()).unwrap();
        assert_eq!(event.change_event.service.name, "awesome-svc");
        assert_eq!(event.change_event.service.status, ServiceStatus::Tombstone);
        assert_eq!(event.change_event.previous_status, ServiceStatus::Alive);

        let records = event.state.records();
        assert_eq!(records.len(), 2);

        let alive = &records[0];
        assert!(alive.alive);
        assert_eq!(alive.ports[0].ip.as_deref(), Some("10.0.0.5"));
        assert_eq!(alive.ports[0].port, 32763);
        assert_eq!(alive.ports[0].service_port, 8000);

        let dead = &records[1];
        assert!(!dead.alive);
        assert_eq!(dead.hostname, "beowulf", "Hostname should be inherited from the server.");
    }

    #[test]
    fn test_unknown_status_values() {
        assert_eq!(ServiceStatus::from(3), ServiceStatus::Unknown);
        assert_eq!(ServiceStatus::from(42), ServiceStatus::Unknown);
        assert_eq!(i32::from(ServiceStatus::Draining), 4);
    }

    #[test]
    fn test_empty_ip_is_treated_as_missing() {
        let service = Service {
            id: "deadbeef0001".to_string(),
            name: "awesome-svc".to_string(),
            hostname: "beowulf".to_string(),
            ports: vec![Port {
                kind: "tcp".to_string(),
                port: 32763,
                service_port: 8000,
                ip: String::new(),
            }],
            status: ServiceStatus::Alive,
            ..Default::default()
        };

        assert_eq!(service.to_record().ports[0].ip, None);
    }
}
