//! Request routing for the control plane API.
//!
//! | Method & path               | Effect                                  |
//! |-----------------------------|-----------------------------------------|
//! | `POST /routes`              | upsert a route, retarget active session |
//! | `DELETE /routes/{ip}`       | delete route and close session          |
//! | `DELETE /sessions/{ip}`     | close session, keep route               |
//! | `GET /routes`               | list routes                             |
//! | `GET /health`               | liveness                                |

use std::collections::BTreeMap;
use std::net::IpAddr;

use bytes::Bytes;
use http::{Method, StatusCode};
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::modules::relay::Relay;

use super::error::{ControlPlaneError, ControlPlaneResult};
use super::response::{self, ApiResponse};

/// Body of `POST /routes`.
#[derive(Debug, Deserialize)]
struct SetRouteRequest {
    #[serde(default)]
    player_ip: String,
    #[serde(default)]
    backend: String,
}

/// Handle one request against the relay.
///
/// Never fails: errors become JSON error responses.
pub async fn dispatch(relay: &Relay, method: &Method, path: &str, body: Bytes) -> ApiResponse {
    match route(relay, method, path, body).await {
        Ok(response) => response,
        Err(e) => {
            if e.status().is_server_error() {
                warn!(%method, path, error = %e, "Control plane request failed");
            } else {
                debug!(%method, path, error = %e, "Rejected control plane request");
            }
            response::error(&e)
        },
    }
}

async fn route(
    relay: &Relay,
    method: &Method,
    path: &str,
    body: Bytes,
) -> ControlPlaneResult<ApiResponse> {
    let segments: Vec<&str> = path.trim_start_matches('/').split('/').collect();

    match (method, segments.as_slice()) {
        (&Method::GET, ["health"]) => Ok(response::healthy()),
        (&Method::GET, ["routes"]) => Ok(list_routes(relay)),
        (&Method::POST, ["routes"]) => set_route(relay, &body).await,
        (&Method::DELETE, ["routes", player_ip]) => delete_route(relay, player_ip).await,
        (&Method::DELETE, ["sessions", player_ip]) => close_session(relay, player_ip).await,
        (_, ["health"] | ["routes"] | ["routes", _] | ["sessions", _]) => {
            Err(ControlPlaneError::MethodNotAllowed)
        },
        _ => Err(ControlPlaneError::NotFound),
    }
}

fn parse_player_ip(raw: &str) -> ControlPlaneResult<IpAddr> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(ControlPlaneError::BadRequest("player_ip required".to_string()));
    }
    raw.parse()
        .map_err(|_| ControlPlaneError::BadRequest(format!("invalid player_ip '{raw}'")))
}

async fn set_route(relay: &Relay, body: &[u8]) -> ControlPlaneResult<ApiResponse> {
    let request: SetRouteRequest = serde_json::from_slice(body)
        .map_err(|_| ControlPlaneError::BadRequest("invalid json".to_string()))?;

    let backend = request.backend.trim();
    if request.player_ip.trim().is_empty() || backend.is_empty() {
        return Err(ControlPlaneError::BadRequest(
            "player_ip and backend required".to_string(),
        ));
    }

    let player_ip = parse_player_ip(&request.player_ip)?;
    relay.set_route(player_ip, backend).await;
    Ok(response::ok())
}

async fn delete_route(relay: &Relay, player_ip: &str) -> ControlPlaneResult<ApiResponse> {
    let player_ip = parse_player_ip(player_ip)?;
    relay.delete_route(player_ip).await;
    Ok(response::ok())
}

async fn close_session(relay: &Relay, player_ip: &str) -> ControlPlaneResult<ApiResponse> {
    let player_ip = parse_player_ip(player_ip)?;
    let closed = relay.close_session(player_ip).await;
    info!(player = %player_ip, closed, "Session close requested");
    Ok(response::ok())
}

fn list_routes(relay: &Relay) -> ApiResponse {
    let routes: BTreeMap<String, String> = relay
        .routes()
        .list()
        .into_iter()
        .map(|(ip, backend)| (ip.to_string(), backend))
        .collect();
    response::json(StatusCode::OK, &routes)
}
