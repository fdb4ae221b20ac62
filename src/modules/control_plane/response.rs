//! JSON response helpers.

use bytes::Bytes;
use http::header::CONTENT_TYPE;
use http::{Response, StatusCode};
use http_body_util::Full;
use serde::Serialize;
use serde_json::json;

use super::error::ControlPlaneError;

/// Response type produced by the control plane.
pub type ApiResponse = Response<Full<Bytes>>;

/// Serialize `body` as JSON with the given status.
#[must_use]
pub fn json<T: Serialize>(status: StatusCode, body: &T) -> ApiResponse {
    let (status, payload) = match serde_json::to_vec(body) {
        Ok(payload) => (status, payload),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!(r#"{{"error":"serialization failed: {e}"}}"#).into_bytes(),
        ),
    };

    let mut response = Response::new(Full::new(Bytes::from(payload)));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, http::HeaderValue::from_static("application/json"));
    response
}

/// `200 {"status":"ok"}`.
#[must_use]
pub fn ok() -> ApiResponse {
    json(StatusCode::OK, &json!({"status": "ok"}))
}

/// `200 {"status":"healthy"}`.
#[must_use]
pub fn healthy() -> ApiResponse {
    json(StatusCode::OK, &json!({"status": "healthy"}))
}

/// Error response carrying `{"error": message}`.
#[must_use]
pub fn error(err: &ControlPlaneError) -> ApiResponse {
    json(err.status(), &json!({"error": err.to_string()}))
}
