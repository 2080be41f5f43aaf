//! Gateway configuration model and loading

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::{ConfigError, Result};

/// Log level configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Trace level
    Trace,
    /// Debug level
    Debug,
    /// Info level
    #[default]
    Info,
    /// Warn level
    Warn,
    /// Error level
    Error,
}

impl LogLevel {
    /// Filter directive understood by the tracing subscriber.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}

impl std::str::FromStr for LogLevel {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "trace" => Ok(Self::Trace),
            "debug" => Ok(Self::Debug),
            "info" => Ok(Self::Info),
            "warn" => Ok(Self::Warn),
            "error" => Ok(Self::Error),
            _ => Err(ConfigError::InvalidValue {
                field: "log.level".to_string(),
                message: format!("invalid log level: {s}"),
            }),
        }
    }
}

/// HTTP server configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: String,
    /// Port to bind to
    pub port: u16,
    /// Enable CORS
    pub enable_cors: bool,
    /// Origins allowed by CORS; a `*` entry degrades to
    /// permissive-without-credentials
    pub allowed_origins: Vec<String>,
    /// Enable request tracing
    pub enable_tracing: bool,
    /// Enable Swagger UI
    pub enable_swagger: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8000,
            enable_cors: true,
            allowed_origins: vec!["http://localhost:3000".to_string()],
            enable_tracing: true,
            enable_swagger: false,
        }
    }
}

impl ServerConfig {
    /// Get the socket address
    pub fn socket_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|e| ConfigError::InvalidValue {
                field: "server.host".to_string(),
                message: format!("invalid address: {e}"),
            })
    }
}

/// Authentication policy configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AuthConfig {
    /// Permit requests without credentials
    pub allow_anonymous: bool,
    /// Helper executable surfaced to the toolset for bearer identities
    #[serde(skip_serializing_if = "Option::is_none")]
    pub helper_script: Option<PathBuf>,
}

/// Distributed lock configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LockSettings {
    /// Store URL (e.g. `redis://127.0.0.1:6379/0`); absent disables
    /// cross-instance locking
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Key prefix in the store
    pub prefix: String,
    /// Lease lifetime in seconds (minimum 1)
    pub ttl_secs: u64,
    /// Additional acquisition attempts after the first
    pub retry_count: u32,
    /// Sleep between attempts in milliseconds (capped at 5000)
    pub retry_interval_ms: u64,
}

impl Default for LockSettings {
    fn default() -> Self {
        Self {
            url: None,
            prefix: "lock:".to_string(),
            ttl_secs: 60,
            retry_count: 3,
            retry_interval_ms: 200,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct LogConfig {
    /// Log level
    pub level: LogLevel,
}

/// Complete gateway configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct GatewayConfig {
    /// HTTP server section
    pub server: ServerConfig,
    /// Authentication policy section
    pub auth: AuthConfig,
    /// Distributed lock section
    pub lock: LockSettings,
    /// Logging section
    pub log: LogConfig,
}

impl GatewayConfig {
    /// Parse a TOML document.
    pub fn from_toml(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Load from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml(&text)
    }

    /// Load with the full priority chain: defaults, then `file` when
    /// given, then `GFARM_HTTP_*` environment overrides.
    pub fn load(file: Option<&Path>) -> Result<Self> {
        let mut config = match file {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env()?;
        Ok(config)
    }

    /// Apply `GFARM_HTTP_*` environment overrides.
    pub fn apply_env(&mut self) -> Result<()> {
        if let Some(host) = env_var("GFARM_HTTP_HOST") {
            self.server.host = host;
        }
        if let Some(port) = env_var("GFARM_HTTP_PORT") {
            self.server.port = port.parse().map_err(|_| ConfigError::InvalidValue {
                field: "GFARM_HTTP_PORT".to_string(),
                message: format!("not a port number: {port}"),
            })?;
        }
        if let Some(origins) = env_var("GFARM_HTTP_ORIGINS") {
            self.server.allowed_origins =
                origins.split(',').map(|o| o.trim().to_string()).collect();
        }
        if let Some(value) = env_var("GFARM_HTTP_ALLOW_ANONYMOUS") {
            self.auth.allow_anonymous = parse_flag("GFARM_HTTP_ALLOW_ANONYMOUS", &value)?;
        }
        if let Some(script) = env_var("GFARM_HTTP_HELPER_SCRIPT") {
            self.auth.helper_script = Some(PathBuf::from(script));
        }
        if let Some(url) = env_var("GFARM_HTTP_LOCK_URL") {
            self.lock.url = Some(url);
        }
        if let Some(level) = env_var("GFARM_HTTP_LOG_LEVEL") {
            self.log.level = level.parse()?;
        }
        Ok(())
    }
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

fn parse_flag(field: &str, value: &str) -> Result<bool> {
    match value.to_lowercase().as_str() {
        "yes" | "true" | "1" | "on" => Ok(true),
        "no" | "false" | "0" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            field: field.to_string(),
            message: format!("expected yes/no, got: {value}"),
        }),
    }
}
