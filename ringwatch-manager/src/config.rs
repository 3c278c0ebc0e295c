use std::time::Duration;

use ringwatch_hashring::DEFAULT_REPLICAS;

/// How many commands can be waiting in the mailbox before senders are made to wait.
pub const DEFAULT_MAILBOX_CAPACITY: usize = 10;
/// How long a ping waits for the worker before it is considered not running.
pub const DEFAULT_PING_TIMEOUT: Duration = Duration::from_millis(5);

#[derive(Debug, Clone)]
/// Settings for a [RingManager](crate::RingManager).
pub struct ManagerConfig {
    /// The capacity of the bounded command mailbox.
    ///
    /// Once full, `add_node` and `remove_node` callers wait for the worker
    /// to free up space.
    pub mailbox_capacity: usize,

    /// The liveness window used by `ping`.
    pub ping_timeout: Duration,

    /// The number of virtual nodes placed on the ring for each member.
    pub replicas: u32,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            mailbox_capacity: DEFAULT_MAILBOX_CAPACITY,
            ping_timeout: DEFAULT_PING_TIMEOUT,
            replicas: DEFAULT_REPLICAS,
        }
    }
}

impl ManagerConfig {
    /// Set the capacity of the command mailbox.
    pub fn with_mailbox_capacity(mut self, capacity: usize) -> Self {
        self.mailbox_capacity = capacity.max(1);
        self
    }

    /// Set the timeout used when pinging the worker.
    pub fn with_ping_timeout(mut self, timeout: Duration) -> Self {
        self.ping_timeout = timeout;
        self
    }

    /// Set the number of virtual nodes per member.
    pub fn with_replicas(mut self, replicas: u32) -> Self {
        self.replicas = replicas;
        self
    }
}
