//! Configuration file loader.

use super::error::{ConfigError, ConfigResult};
use super::types::{LogFormat, LogLevel, PeelConfig};
use super::validation;
use std::net::SocketAddr;
use std::path::Path;

/// Values supplied on the command line or through the environment.
///
/// Each `Some` replaces the value from the file (or the default).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigOverrides {
    /// Relay listen address.
    pub listen_addr: Option<SocketAddr>,
    /// Control plane listen address.
    pub api_addr: Option<SocketAddr>,
    /// Route-assignment service base URL.
    pub resolver_url: Option<String>,
    /// Socket receive buffer size.
    pub recv_buffer_size: Option<usize>,
    /// Log level.
    pub log_level: Option<LogLevel>,
    /// Log format.
    pub log_format: Option<LogFormat>,
}

impl ConfigOverrides {
    fn apply(self, config: &mut PeelConfig) {
        if let Some(addr) = self.listen_addr {
            config.relay.listen_addr = addr;
        }
        if let Some(addr) = self.api_addr {
            config.control_plane.listen_addr = addr;
        }
        if let Some(url) = self.resolver_url {
            config.resolver.base_url = Some(url);
        }
        if let Some(size) = self.recv_buffer_size {
            config.relay.recv_buffer_size = size;
        }
        if let Some(level) = self.log_level {
            config.logging.level = level;
        }
        if let Some(format) = self.log_format {
            config.logging.format = format;
        }
    }
}

/// Configuration loader.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConfigLoader;

impl ConfigLoader {
    /// Create a new configuration loader.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Load configuration from a file path.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The file does not exist
    /// - The file cannot be read
    /// - The TOML is malformed
    /// - Validation fails
    pub fn load<P: AsRef<Path>>(&self, path: P) -> ConfigResult<PeelConfig> {
        let config = self.read(path.as_ref())?;
        validation::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML is malformed or validation fails.
    pub fn load_str(&self, content: &str) -> ConfigResult<PeelConfig> {
        let config: PeelConfig = toml::from_str(content)?;
        validation::validate(&config)?;
        Ok(config)
    }

    /// Build the effective configuration from defaults, an optional file
    /// and overrides, then validate the result.
    ///
    /// # Errors
    ///
    /// Returns an error if the given file cannot be loaded or the merged
    /// configuration is invalid.
    pub fn resolve(
        &self,
        path: Option<&Path>,
        overrides: ConfigOverrides,
    ) -> ConfigResult<PeelConfig> {
        let mut config = match path {
            Some(path) => self.read(path)?,
            None => PeelConfig::default(),
        };

        overrides.apply(&mut config);
        validation::validate(&config)?;
        Ok(config)
    }

    fn read(&self, path: &Path) -> ConfigResult<PeelConfig> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            source: e,
        })?;

        Ok(toml::from_str(&content)?)
    }
}
