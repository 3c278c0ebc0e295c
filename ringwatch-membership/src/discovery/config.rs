use std::time::Duration;

use ringwatch_manager::ManagerConfig;

pub const DEFAULT_RECEIVER_CAPACITY: usize = 50;
pub const DEFAULT_BOOTSTRAP_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
/// Configuration for a service discovery backed ring.
pub struct DiscoveryConfig {
    /// The service whose instances make up the ring.
    pub service_name: String,

    /// The port the service exposes, used to pick the port record of each instance.
    pub service_port: u16,

    /// The URL to fetch the full catalog state from before accepting pushes.
    ///
    /// When unset the ring starts empty and waits for the first push.
    pub seed_url: Option<String>,

    /// How many pushed states can wait to be processed.
    pub receiver_capacity: usize,

    /// How long fetching the initial state may take.
    pub bootstrap_timeout: Duration,

    pub manager: ManagerConfig,
}

impl DiscoveryConfig {
    pub fn new(service_name: impl Into<String>, service_port: u16) -> Self {
        Self {
            service_name: service_name.into(),
            service_port,
            seed_url: None,
            receiver_capacity: DEFAULT_RECEIVER_CAPACITY,
            bootstrap_timeout: DEFAULT_BOOTSTRAP_TIMEOUT,
            manager: ManagerConfig::default(),
        }
    }

    /// Bootstrap the ring from the given catalog URL.
    pub fn with_seed_url(mut self, url: impl Into<String>) -> Self {
        self.seed_url = Some(url.into()).filter(|url: &String| !url.is_empty());
        self
    }

    pub fn with_receiver_capacity(mut self, capacity: usize) -> Self {
        self.receiver_capacity = capacity.max(1);
        self
    }

    pub fn with_bootstrap_timeout(mut self, timeout: Duration) -> Self {
        self.bootstrap_timeout = timeout;
        self
    }

    pub fn with_manager_config(mut self, config: ManagerConfig) -> Self {
        self.manager = config;
        self
    }
}
