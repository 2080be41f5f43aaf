//! HTTP surface of the Gfarm gateway
//!
//! This crate provides:
//! - REST endpoints using Axum: directory listing, directory creation,
//!   file retrieval (streaming), identity lookup, health
//! - OpenAPI annotations with utoipa and optional Swagger UI
//! - Response shaping: raw text listings, streamed file bodies with
//!   probed content-length, `{"detail": ...}` error bodies
//! - Server lifecycle with CORS/trace layers and graceful shutdown

pub mod routes;
pub mod server;
pub mod types;

pub use routes::{create_router, ApiState};
pub use server::ApiServer;
pub use types::{ErrorResponse, HealthStatus};

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;

use gfarm_auth::AuthError;
use gfarm_grid::GridError;
use gfarm_lock::LockError;
use gfarm_proc::ProcError;

/// API error types
#[derive(Debug, Error)]
pub enum ApiError {
    /// Credential resolution failed
    #[error(transparent)]
    Auth(#[from] AuthError),

    /// Anonymous access attempted while disabled
    #[error("anonymous access is not allowed")]
    AnonymousDisabled,

    /// Retrieval target is not a plain file of known size
    #[error("The requested URL does not represent a file.")]
    NotAFile,

    /// Grid toolset operation failed
    #[error(transparent)]
    Grid(#[from] GridError),

    /// Distributed lock operation failed
    #[error(transparent)]
    Lock(#[from] LockError),

    /// Anything else
    #[error("internal error: {0}")]
    Internal(String),
}

/// Result type for API operations
pub type Result<T> = std::result::Result<T, ApiError>;

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::Auth(_) => StatusCode::FORBIDDEN,
            ApiError::AnonymousDisabled => StatusCode::UNAUTHORIZED,
            ApiError::NotAFile => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            ApiError::Lock(LockError::Unavailable { .. }) => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn detail(&self) -> String {
        match self {
            // Surface the tool's own diagnostics when it left any.
            ApiError::Grid(GridError::Process(ProcError::ToolFailure { stderr, .. }))
                if !stderr.is_empty() =>
            {
                stderr.clone()
            }
            other => other.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let detail = self.detail();
        if status.is_server_error() {
            tracing::error!(%status, "request failed: {detail}");
        }
        (status, Json(ErrorResponse { detail })).into_response()
    }
}
