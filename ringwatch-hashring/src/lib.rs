//! # Ringwatch Hashring
//!
//! An immutable consistent hash ring. Each physical node, identified by a [RingKey],
//! is placed on a 32 bit hash space many times over (virtual nodes) so that keys are
//! spread evenly and adding or removing a node only remaps a small share of them.
//!
//! Rings are values: adding or removing a node produces a *new* ring and leaves the
//! original untouched, which makes it cheap to swap the whole ring out from under a
//! single owner.
//!
//! ### Basic Example
//! ```rust
//! use ringwatch_hashring::{ConsistentHashRing, HashRingError};
//!
//! let ring = ConsistentHashRing::default();
//! assert_eq!(ring.get_node("my-key"), Err(HashRingError::EmptyRing));
//!
//! let ring = ring.add_node("10.0.0.1:8000").add_node("10.0.0.2:8000");
//! let owner = ring.get_node("my-key").expect("Ring is not empty.");
//! assert!(ring.contains(owner));
//!
//! // The same key always lands on the same node for a given membership.
//! assert_eq!(ring.get_node("my-key"), Ok(owner));
//! ```

mod key;
mod ring;

pub use key::RingKey;
pub use ring::{ConsistentHashRing, HashRingError, DEFAULT_REPLICAS};
