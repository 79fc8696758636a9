//! Configuration module for ingest_runtime.
//!
//! This module provides centralized configuration loading from environment variables.
//!
//! # Example
//!
//! ```rust,ignore
//! use ingest_runtime::config::Config;
//!
//! let config = Config::from_env()?;
//! println!("Pool size: {}", config.runtime.pool_size());
//! println!("Workers: {}", config.runtime.worker_count());
//! ```

mod error;
mod logging;
mod parse;
mod runtime;

pub use error::ConfigError;
pub use logging::{LogFormat, LoggingConfig};
pub use parse::{env_duration_ms, env_or, env_parse};
pub use runtime::RuntimeConfig;

/// Complete application configuration.
#[derive(Clone, Debug, Default)]
pub struct Config {
    /// Dispatcher configuration.
    pub runtime: RuntimeConfig,
    /// Logging configuration.
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            runtime: RuntimeConfig::from_env()?,
            logging: LoggingConfig::from_env()?,
        })
    }

    /// Print configuration summary to log.
    pub fn log_summary(&self) {
        use tracing::info;

        info!("Configuration loaded:");
        info!("  Pool size: {}", self.runtime.pool_size());
        info!(
            "  Acquire timeout: {}ms",
            self.runtime.acquire_timeout.as_millis()
        );
        info!("  Workers: {}", self.runtime.worker_count());
        info!("  Queue capacity: {}", self.runtime.queue_capacity());

        if self.runtime.max_retries > 0 {
            info!(
                "  Retries: {} every {}ms",
                self.runtime.max_retries,
                self.runtime.retry_backoff.as_millis()
            );
        } else {
            info!("  Retries: disabled");
        }

        info!("  Log format: {:?}", self.logging.format);
    }
}
