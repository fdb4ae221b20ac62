//! # Control Plane
//!
//! HTTP API operators use to inject and remove routes and to close sessions
//! on a running [`Relay`](crate::modules::relay::Relay).
//!
//! ## Example
//!
//! ```text
//! POST /routes  {"player_ip": "203.0.113.50", "backend": "10.0.50.2:5521"}
//! GET  /routes  -> {"203.0.113.50": "10.0.50.2:5521"}
//! ```

mod config;
mod error;
mod handler;
mod response;
mod server;

pub use config::ControlPlaneConfig;
pub use error::{ControlPlaneError, ControlPlaneResult};
pub use handler::dispatch;
pub use response::ApiResponse;
pub use server::ControlPlane;
