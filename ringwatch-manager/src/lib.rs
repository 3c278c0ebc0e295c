//! # Ringwatch Manager
//!
//! The [RingManager] owns the one authoritative [ConsistentHashRing](ringwatch_hashring::ConsistentHashRing)
//! of a process. All reads and writes are sent as commands into a bounded mailbox
//! which is drained by a single worker task, the worker is the only thing which ever
//! touches the ring so no locking of the ring itself is required.
//!
//! ```rust
//! use ringwatch_manager::RingManager;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let manager = RingManager::new(["10.0.0.1:8000"]);
//!     manager.start()?;
//!     assert!(manager.ping().await);
//!
//!     manager.add_node("10.0.0.2:8000").await?;
//!     let owner = manager.get_node("my-key").await?;
//!     assert!(owner == "10.0.0.1:8000" || owner == "10.0.0.2:8000");
//!
//!     manager.stop()?;
//!     assert!(!manager.ping().await);
//!     Ok(())
//! }
//! ```

#[macro_use]
extern crate tracing;

mod config;
mod error;
mod manager;
mod membership;

pub use config::{ManagerConfig, DEFAULT_MAILBOX_CAPACITY, DEFAULT_PING_TIMEOUT};
pub use error::RingError;
pub use manager::{Command, Lifecycle, RingManager, RunLoop};
pub use membership::RingMembership;
pub use ringwatch_hashring::{ConsistentHashRing, HashRingError, RingKey};
