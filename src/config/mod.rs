//! # Configuration System
//!
//! TOML-based configuration for the relay process. Values are layered with
//! the precedence CLI flag, environment variable, config file, default.
//!
//! ## Example Configuration
//!
//! ```toml
//! [relay]
//! listen_addr = "0.0.0.0:5520"
//! recv_buffer_size = 8388608
//!
//! [control_plane]
//! listen_addr = "0.0.0.0:8080"
//!
//! [resolver]
//! base_url = "http://localhost:3001"
//! timeout_secs = 5
//!
//! [logging]
//! level = "info"
//! format = "json"
//! ```

mod error;
mod loader;
mod types;
mod validation;

pub use error::{ConfigError, ConfigResult};
pub use loader::{ConfigLoader, ConfigOverrides};
pub use types::{LogFormat, LogLevel, LoggingConfig, PeelConfig};
pub use validation::{check, validate, ValidationError};
