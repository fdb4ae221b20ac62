//! # Peel
//!
//! A transparent UDP relay that sits between game clients and a pool of
//! backend servers. Each player IP is pinned to one backend through a routing
//! table; the first datagram from an unknown player triggers a lookup against
//! an external route-assignment service.
//!
//! ## Architecture
//!
//! - [`modules::relay`] owns the inbound socket, the routing table and one
//!   session (outbound socket plus reply loop) per player IP.
//! - [`modules::control_plane`] is a small HTTP API operators use to inject
//!   routes and close sessions at runtime.
//! - [`config`] and [`logging`] carry the process-level setup.
//!
//! Backends can be retargeted while a session is live: the session keeps its
//! outbound socket and only the destination changes.

pub mod config;
pub mod logging;
pub mod modules;

pub use config::{ConfigLoader, ConfigOverrides, PeelConfig};
pub use modules::control_plane::ControlPlane;
pub use modules::relay::{HttpRouteResolver, Relay, RelayStatsSnapshot, RouteResolver};
