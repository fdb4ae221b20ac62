//! Configuration validation.

use super::error::{ConfigError, ConfigResult};
use super::types::PeelConfig;
use crate::modules::relay::MAX_UDP_DATAGRAM;

/// A single validation error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// The field path that failed validation.
    pub field: String,
    /// Error message.
    pub message: String,
}

impl ValidationError {
    fn new(field: &str, message: impl Into<String>) -> Self {
        Self {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Collect every problem with a configuration.
#[must_use]
pub fn check(config: &PeelConfig) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    if config.relay.recv_buffer_size == 0 {
        errors.push(ValidationError::new(
            "relay.recv_buffer_size",
            "Receive buffer size cannot be 0",
        ));
    }

    if !(1..=MAX_UDP_DATAGRAM).contains(&config.relay.max_datagram_size) {
        errors.push(ValidationError::new(
            "relay.max_datagram_size",
            format!("Must be between 1 and {MAX_UDP_DATAGRAM}"),
        ));
    }

    if config.control_plane.max_body_size == 0 {
        errors.push(ValidationError::new(
            "control_plane.max_body_size",
            "Body size limit cannot be 0",
        ));
    }

    if config.resolver.timeout_secs == 0 {
        errors.push(ValidationError::new(
            "resolver.timeout_secs",
            "Timeout cannot be 0",
        ));
    }

    if let Some(url) = config.resolver.endpoint() {
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            errors.push(ValidationError::new(
                "resolver.base_url",
                format!("'{url}' is not an http(s) URL"),
            ));
        }
    }

    errors
}

/// Validate a configuration, reporting all problems at once.
///
/// # Errors
///
/// Returns [`ConfigError::ValidationError`] listing every failed check.
pub fn validate(config: &PeelConfig) -> ConfigResult<()> {
    let errors = check(config);
    if errors.is_empty() {
        return Ok(());
    }

    let messages: Vec<String> = errors.iter().map(ToString::to_string).collect();
    Err(ConfigError::ValidationError(messages.join("; ")))
}
