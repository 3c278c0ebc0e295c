//! # Ringwatch
//! Consistent hash rings which keep themselves current from cluster membership.
//!
//! This is a convenience package which includes all of the sub-projects within
//! Ringwatch, realistically you probably only want some of these projects:
//!
//! ### Features
//! - `ringwatch_hashring` - An immutable consistent hash ring with virtual nodes.
//! - `ringwatch_manager` - A single writer actor owning the ring of a process.
//! - `ringwatch_membership` - Gossip and service discovery sources feeding the manager.
//! - `ringwatch_http` - A JSON routing facade over any membership source.

#[cfg(feature = "ringwatch-hashring")]
pub use ringwatch_hashring as hashring;
#[cfg(feature = "ringwatch-http")]
pub use ringwatch_http as http;
#[cfg(feature = "ringwatch-manager")]
pub use ringwatch_manager as manager;
#[cfg(feature = "ringwatch-membership")]
pub use ringwatch_membership as membership;
