use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use ringwatch_manager::{RingError, RingMembership};
use ringwatch_membership::{DiscoveryRing, MembershipError};
use serde::{Deserialize, Serialize};
use serde_json::json;

#[derive(Debug, Default, Deserialize)]
pub struct GetNodeParams {
    #[serde(default)]
    pub key: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
/// The node currently responsible for a key.
///
/// `node` is empty when the ring has no members.
pub struct NodeOwner {
    pub node: String,
    pub key: String,
}

pub(crate) async fn get_node<M: RingMembership>(
    State(ring): State<Arc<M>>,
    Query(params): Query<GetNodeParams>,
) -> Response {
    if params.key.is_empty() {
        return error_response(StatusCode::NOT_FOUND, "Invalid key");
    }

    let node = match ring.manager().get_node(&params.key).await {
        Ok(node) => node.to_string(),
        Err(RingError::EmptyRing) => String::new(),
        Err(error) => {
            error!(error = %error, key = %params.key, "Failed to look up node.");
            return error_response(StatusCode::INTERNAL_SERVER_ERROR, &error.to_string());
        },
    };

    pretty_json(
        StatusCode::OK,
        &NodeOwner {
            node,
            key: params.key,
        },
    )
}

pub(crate) async fn list_nodes<M: RingMembership>(State(ring): State<Arc<M>>) -> Response {
    let members = ring.members().await;
    pretty_json(StatusCode::OK, &members)
}

pub(crate) async fn update(State(ring): State<Arc<DiscoveryRing>>, body: Bytes) -> Response {
    match ring.receiver().enqueue_update(&body) {
        Ok(_) => StatusCode::ACCEPTED.into_response(),
        Err(error @ MembershipError::InvalidState(_)) => {
            warn!(error = %error, "Rejected malformed update.");
            error_response(StatusCode::BAD_REQUEST, &error.to_string())
        },
        Err(error @ MembershipError::ReceiverClosed) => {
            error_response(StatusCode::SERVICE_UNAVAILABLE, &error.to_string())
        },
        Err(error) => error_response(StatusCode::INTERNAL_SERVER_ERROR, &error.to_string()),
    }
}

fn error_response(status: StatusCode, message: &str) -> Response {
    let body = json!({
        "status": "error",
        "message": message,
    });
    pretty_json(status, &body)
}

fn pretty_json<T: Serialize + ?Sized>(status: StatusCode, value: &T) -> Response {
    match serde_json::to_string_pretty(value) {
        Ok(body) => (status, [(header::CONTENT_TYPE, "application/json")], body).into_response(),
        Err(error) => {
            error!(error = %error, "Failed to encode response.");
            (StatusCode::INTERNAL_SERVER_ERROR, error.to_string()).into_response()
        },
    }
}
