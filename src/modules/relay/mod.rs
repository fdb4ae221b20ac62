//! # UDP Relay
//!
//! Transparent UDP relay between players and a pool of game backends.
//!
//! ## Data flow
//!
//! - A player datagram arrives on the inbound socket.
//! - The [`RoutingTable`] maps the player's IP to a backend; on a miss the
//!   [`RouteResolver`] is asked and the answer stored.
//! - The [`SessionRegistry`] returns the player's [`Session`], opening a
//!   dedicated outbound socket on first contact.
//! - The datagram is written to the backend through that socket.
//! - The session's reply loop writes backend replies to the player's latest
//!   source address through the inbound socket.
//!
//! ## Configuration
//!
//! ```toml
//! [relay]
//! listen_addr = "0.0.0.0:5520"
//! recv_buffer_size = 8388608
//!
//! [resolver]
//! base_url = "http://localhost:3001"
//! timeout_secs = 5
//! ```

mod config;
mod engine;
mod error;
mod resolver;
mod routing;
mod session;
mod socket;
mod stats;

pub use config::{
    RelayConfig, ResolverConfig, SessionSettings, DEFAULT_RELAY_PORT, MAX_UDP_DATAGRAM,
};
pub use engine::Relay;
pub use error::{RelayError, RelayResult, ResolverError, ResolverResult};
pub use resolver::{HttpRouteResolver, RouteResolver, ROUTE_REQUEST_PATH};
pub use routing::{player_key, RoutingTable};
pub use session::{resolve_backend, Backend, Session, SessionId, SessionRegistry, SessionStats};
pub use socket::bind_udp;
pub use stats::{RelayStats, RelayStatsSnapshot};
