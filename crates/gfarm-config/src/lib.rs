//! Configuration Management for the Gfarm HTTP gateway
//!
//! This crate provides:
//! - File-based configuration (TOML)
//! - Environment variable overrides (`GFARM_HTTP_*`)
//! - Configuration validation with errors and warnings
//!
//! Priority: defaults, then the configuration file, then environment
//! variables (highest) — deployments are configured env-first, the file is
//! a development convenience.

pub mod config;
pub mod validate;

pub use config::*;
pub use validate::*;

use thiserror::Error;

/// Configuration error types
#[derive(Debug, Error)]
pub enum ConfigError {
    /// File I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// TOML parsing error
    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),

    /// A value that cannot be interpreted
    #[error("invalid value for {field}: {message}")]
    InvalidValue {
        /// Field or environment variable name
        field: String,
        /// What was wrong
        message: String,
    },
}

/// Result type for configuration operations
pub type Result<T> = std::result::Result<T, ConfigError>;
