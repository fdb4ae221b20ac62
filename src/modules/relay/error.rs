//! Relay error types.

use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;

/// Errors returned by a [`RouteResolver`](super::RouteResolver).
#[derive(Debug, Error)]
pub enum ResolverError {
    /// No route-assignment service is configured.
    #[error("route resolver is not configured")]
    Unconfigured,

    /// The service could not be reached.
    #[error("route resolver unreachable: {0}")]
    Unreachable(String),

    /// The request did not complete in time.
    #[error("route resolver timed out after {0:?}")]
    Timeout(Duration),

    /// The service answered with a non-success status or an unusable body.
    #[error("route resolver returned a bad response: {0}")]
    BadResponse(String),
}

/// Result type alias for resolver operations.
pub type ResolverResult<T> = Result<T, ResolverError>;

/// Errors that can occur in the relay engine.
#[derive(Debug, Error)]
pub enum RelayError {
    /// Failed to bind the inbound socket.
    #[error("failed to bind to {address}: {source}")]
    Bind {
        /// The address that failed to bind.
        address: SocketAddr,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// A backend address string did not resolve to a socket address.
    #[error("cannot resolve backend address '{backend}': {reason}")]
    AddressResolution {
        /// The backend string as configured.
        backend: String,
        /// Why resolution failed.
        reason: String,
    },

    /// Could not open an outbound session socket.
    #[error("failed to allocate outbound socket: {0}")]
    SocketAllocation(#[source] std::io::Error),

    /// Failed to send a datagram.
    #[error("failed to send datagram to {address}: {source}")]
    Send {
        /// The destination address.
        address: SocketAddr,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// Non-timeout read error on a session socket.
    #[error("failed to read backend reply: {0}")]
    ReplyRead(#[source] std::io::Error),

    /// Route resolution failed.
    #[error(transparent)]
    Resolver(#[from] ResolverError),

    /// The relay is stopping and accepts no new sessions.
    #[error("relay is shutting down")]
    ShuttingDown,
}

/// Result type alias for relay operations.
pub type RelayResult<T> = Result<T, RelayError>;
