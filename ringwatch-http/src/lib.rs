//! # Ringwatch HTTP
//!
//! A thin JSON facade over a ring kept current by any
//! [RingMembership](ringwatch_manager::RingMembership) source.
//!
//! - `GET /nodes/get?key=<key>` returns the node owning `key`.
//! - `GET /nodes` lists the members known to the membership source.
//! - `POST /update` accepts pushed catalog events, discovery rings only.

#[macro_use]
extern crate tracing;

mod handlers;

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use ringwatch_manager::RingMembership;
use ringwatch_membership::DiscoveryRing;

pub use handlers::{GetNodeParams, NodeOwner};

/// Builds the read only routes for the given ring.
pub fn router<M>(ring: Arc<M>) -> Router
where
    M: RingMembership,
{
    Router::new()
        .route("/nodes/get", get(handlers::get_node::<M>))
        .route("/nodes", get(handlers::list_nodes::<M>))
        .with_state(ring)
}

/// Builds the routes for a discovery ring, including the push endpoint.
pub fn discovery_router(ring: Arc<DiscoveryRing>) -> Router {
    Router::new()
        .route("/nodes/get", get(handlers::get_node::<DiscoveryRing>))
        .route("/nodes", get(handlers::list_nodes::<DiscoveryRing>))
        .route("/update", post(handlers::update))
        .with_state(ring)
}
