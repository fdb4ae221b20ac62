//! # Relay Modules
//!
//! - [`relay`] - UDP relay engine, routing table and per-player sessions
//! - [`control_plane`] - HTTP API for managing routes and sessions

pub mod control_plane;
pub mod relay;
