//! Control plane error types.

use http::StatusCode;
use std::net::SocketAddr;
use thiserror::Error;

/// Errors raised while serving the control plane.
#[derive(Debug, Error)]
pub enum ControlPlaneError {
    /// Failed to bind the HTTP listener.
    #[error("failed to bind control plane to {address}: {source}")]
    Bind {
        /// The address that failed to bind.
        address: SocketAddr,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// Malformed request from the client.
    #[error("{0}")]
    BadRequest(String),

    /// Request body could not be read or was too large.
    #[error("invalid request body: {0}")]
    Body(String),

    /// No such endpoint.
    #[error("not found")]
    NotFound,

    /// Endpoint exists but not for this method.
    #[error("method not allowed")]
    MethodNotAllowed,
}

impl ControlPlaneError {
    /// HTTP status reported for this error.
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) | Self::Body(_) => StatusCode::BAD_REQUEST,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            Self::Bind { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Result type alias for control plane operations.
pub type ControlPlaneResult<T> = Result<T, ControlPlaneError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            ControlPlaneError::BadRequest("x".into()).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(ControlPlaneError::NotFound.status(), StatusCode::NOT_FOUND);
        assert_eq!(
            ControlPlaneError::MethodNotAllowed.status(),
            StatusCode::METHOD_NOT_ALLOWED
        );
        assert_eq!(
            ControlPlaneError::Body("length limit exceeded".into()).status(),
            StatusCode::BAD_REQUEST
        );
    }
}
