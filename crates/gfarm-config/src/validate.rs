//! Configuration validation

use std::fmt;

use crate::config::GatewayConfig;

/// One validation finding, tied to a configuration field.
#[derive(Debug, Clone)]
pub struct ValidationIssue {
    /// Dotted field path, e.g. `lock.ttl_secs`
    pub field: String,
    /// What is wrong or questionable
    pub message: String,
}

impl ValidationIssue {
    fn new(field: &str, message: impl Into<String>) -> Self {
        Self {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Result of configuration validation
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    /// Findings that prevent the configuration from being used
    pub errors: Vec<ValidationIssue>,
    /// Non-blocking findings worth surfacing
    pub warnings: Vec<ValidationIssue>,
}

impl ValidationResult {
    /// True when there are no validation errors
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// True when there are any warnings present
    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }

    fn error(&mut self, field: &str, message: impl Into<String>) {
        self.errors.push(ValidationIssue::new(field, message));
    }

    fn warning(&mut self, field: &str, message: impl Into<String>) {
        self.warnings.push(ValidationIssue::new(field, message));
    }
}

/// Validate a configuration before starting the gateway.
pub fn validate(config: &GatewayConfig) -> ValidationResult {
    let mut result = ValidationResult::default();

    if config.server.port == 0 {
        result.error("server.port", "port must be non-zero");
    }
    if config.server.socket_addr().is_err() {
        result.error("server.host", "host does not form a valid socket address");
    }
    if config.server.enable_cors && config.server.allowed_origins.is_empty() {
        result.warning(
            "server.allowed_origins",
            "CORS enabled with no origins; no cross-origin request will be allowed",
        );
    }
    if config
        .server
        .allowed_origins
        .iter()
        .any(|origin| origin == "*")
    {
        result.warning(
            "server.allowed_origins",
            "wildcard origin disables credentialed CORS requests",
        );
    }

    if config.auth.allow_anonymous {
        result.warning("auth.allow_anonymous", "anonymous access is enabled");
    }
    if let Some(script) = &config.auth.helper_script {
        if script.is_relative() {
            result.warning(
                "auth.helper_script",
                "helper script path is relative; the toolset resolves it against an unspecified directory",
            );
        }
    }

    if config.lock.ttl_secs == 0 {
        result.error("lock.ttl_secs", "lease TTL must be at least 1 second");
    }
    if config.lock.prefix.is_empty() {
        result.error("lock.prefix", "lock key prefix must not be empty");
    }
    if config.lock.retry_interval_ms > 5000 {
        result.warning(
            "lock.retry_interval_ms",
            "retry interval exceeds the 5000 ms cap and will be clamped",
        );
    }

    result
}
