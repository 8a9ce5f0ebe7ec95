//! Stream configuration.
//!
//! Flow-control limits applied to every stream a connection creates.
//!
//! # Example
//!
//! ```toml
//! initial_send_window = 1048576
//! initial_receive_window = 1048576
//! max_receive_window = 6291456
//! window_update_threshold = 0.25
//! ```
//!
//! Precedence, lowest first: defaults, configuration file, `QUICD_STREAM_*`
//! environment variables.

use std::path::Path;

use anyhow::{Context, Result};
use config::builder::DefaultState;
use config::{Config as ConfigLoader, ConfigBuilder, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};

/// Environment variable prefix for overrides
pub const ENV_PREFIX: &str = "QUICD_STREAM";

/// Configuration validator trait.
pub trait ConfigValidator {
    /// Validate the configuration.
    ///
    /// Returns `Ok(())` if valid, or a list of error messages if invalid.
    fn validate(&self) -> Result<(), Vec<String>>;
}

/// Per-stream flow control configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    /// Send credit assumed before the peer's first MAX_STREAM_DATA (bytes)
    pub initial_send_window: u64,

    /// Receive window advertised to the peer at stream creation (bytes)
    pub initial_receive_window: u64,

    /// Upper bound for receive window growth (bytes)
    pub max_receive_window: u64,

    /// Fraction of the window that must be consumed before advertising more
    pub window_update_threshold: f64,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            initial_send_window: 1024 * 1024,    // 1 MB
            initial_receive_window: 1024 * 1024, // 1 MB
            max_receive_window: 6 * 1024 * 1024, // 6 MB
            window_update_threshold: 0.25,
        }
    }
}

impl StreamConfig {
    /// Load configuration from a TOML file with environment overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, or if
    /// validation fails.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let builder = ConfigLoader::builder().add_source(File::from(path));
        Self::finish(builder)
            .with_context(|| format!("Failed to load stream config from {}", path.display()))
    }

    /// Parse configuration from an inline TOML document with environment overrides.
    pub fn from_toml_str(toml: &str) -> Result<Self> {
        let builder = ConfigLoader::builder().add_source(File::from_str(toml, FileFormat::Toml));
        Self::finish(builder)
    }

    fn finish(builder: ConfigBuilder<DefaultState>) -> Result<Self> {
        let config: StreamConfig = builder
            .add_source(Environment::with_prefix(ENV_PREFIX).try_parsing(true))
            .build()
            .context("Failed to build stream config")?
            .try_deserialize()
            .context("Failed to deserialize stream config")?;

        config.validate().map_err(|errors| {
            anyhow::anyhow!("Stream config validation failed:\n{}", errors.join("\n"))
        })?;
        Ok(config)
    }
}

impl ConfigValidator for StreamConfig {
    fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.initial_send_window == 0 {
            errors.push("initial_send_window must be greater than 0".to_string());
        }
        if self.initial_receive_window == 0 {
            errors.push("initial_receive_window must be greater than 0".to_string());
        }
        if self.max_receive_window < self.initial_receive_window {
            errors.push(format!(
                "max_receive_window ({}) must be at least initial_receive_window ({})",
                self.max_receive_window, self.initial_receive_window
            ));
        }
        if !(self.window_update_threshold > 0.0 && self.window_update_threshold < 1.0) {
            errors.push(format!(
                "window_update_threshold ({}) must be between 0 and 1 (exclusive)",
                self.window_update_threshold
            ));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}
