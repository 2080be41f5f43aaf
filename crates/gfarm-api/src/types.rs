//! API response types

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Error response body
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    /// Human-readable diagnostic
    pub detail: String,
}

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct HealthStatus {
    /// Overall status
    pub status: String,
    /// Gateway version
    pub version: String,
    /// Seconds since the server started
    pub uptime_seconds: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_response_wire_shape() {
        let body = serde_json::to_string(&ErrorResponse {
            detail: "boom".to_string(),
        })
        .unwrap();
        assert_eq!(body, r#"{"detail":"boom"}"#);
    }

    #[test]
    fn test_health_status_round_trip() {
        let status = HealthStatus {
            status: "healthy".to_string(),
            version: "0.1.0".to_string(),
            uptime_seconds: 42,
        };
        let json = serde_json::to_string(&status).unwrap();
        let back: HealthStatus = serde_json::from_str(&json).unwrap();
        assert_eq!(back.status, "healthy");
        assert_eq!(back.uptime_seconds, 42);
    }
}
