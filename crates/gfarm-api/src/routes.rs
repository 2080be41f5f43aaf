//! API route handlers

use std::sync::Arc;
use std::time::Instant;

use axum::body::Body;
use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;
use tracing::debug;
use utoipa::IntoParams;

use gfarm_auth::{parse_authorization, Identity};
use gfarm_grid::{GridClient, ListOptions};
use gfarm_lock::DistributedLock;

use crate::types::HealthStatus;
use crate::{ApiError, Result};

/// Shared application state
#[derive(Clone)]
pub struct ApiState {
    /// Grid toolset client
    grid: Arc<GridClient>,
    /// Cross-instance lock, when a store is configured
    lock: Option<Arc<DistributedLock>>,
    /// Whether requests without credentials are accepted
    allow_anonymous: bool,
    /// Server start time
    start_time: Instant,
}

impl ApiState {
    /// Create new API state
    pub fn new(
        grid: Arc<GridClient>,
        lock: Option<Arc<DistributedLock>>,
        allow_anonymous: bool,
    ) -> Self {
        Self {
            grid,
            lock,
            allow_anonymous,
            start_time: Instant::now(),
        }
    }

    /// Get uptime in seconds
    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    /// Resolve the caller identity and enforce the anonymous policy.
    fn identity(&self, headers: &HeaderMap) -> Result<Identity> {
        let header = match headers.get(header::AUTHORIZATION) {
            Some(value) => Some(value.to_str().map_err(|_| {
                gfarm_auth::AuthError::MalformedCredential(
                    "header is not valid ASCII".to_string(),
                )
            })?),
            None => None,
        };
        let identity = parse_authorization(header)?;
        if identity.is_anonymous() && !self.allow_anonymous {
            return Err(ApiError::AnonymousDisabled);
        }
        Ok(identity)
    }
}

/// Directory listing query flags
#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ListQuery {
    /// Include hidden entries when set to 1
    #[serde(default)]
    pub a: u8,
    /// Recurse into subdirectories when set to 1
    #[serde(default, rename = "R")]
    pub recursive: u8,
    /// Return output with status 200 even when the tool reports errors
    #[serde(default)]
    pub ign_err: u8,
}

impl ListQuery {
    fn options(&self) -> ListOptions {
        ListOptions {
            all: self.a != 0,
            recursive: self.recursive != 0,
            ignore_errors: self.ign_err != 0,
        }
    }
}

/// Create API router
pub fn create_router(state: ApiState) -> Router {
    let mut router = Router::new();
    for alias in ["d", "dir", "directories"] {
        router = router
            .route(&format!("/{alias}"), get(list_directory_root))
            .route(
                &format!("/{alias}/{{*path}}"),
                get(list_directory).put(create_directory),
            );
    }
    for alias in ["f", "files"] {
        router = router.route(&format!("/{alias}/{{*path}}"), get(export_file));
    }
    router
        .route("/conf/me", get(whoami))
        .route("/c/me", get(whoami))
        .route("/health", get(health))
        .with_state(state)
}

/// Map a wire path parameter onto an absolute grid path.
fn grid_path(path: &str) -> String {
    format!("/{}", path.trim_start_matches('/'))
}

/// Directory listing endpoint
#[utoipa::path(
    get,
    path = "/dir/{path}",
    params(
        ("path" = String, Path, description = "Directory path"),
        ListQuery,
    ),
    responses(
        (status = 200, description = "Raw long-form listing", body = String),
        (status = 401, description = "Anonymous access disabled", body = crate::ErrorResponse),
        (status = 403, description = "Malformed credentials", body = crate::ErrorResponse),
        (status = 500, description = "Listing tool failed", body = crate::ErrorResponse)
    ),
    tag = "directories"
)]
pub(crate) async fn list_directory(
    State(state): State<ApiState>,
    Path(path): Path<String>,
    Query(query): Query<ListQuery>,
    headers: HeaderMap,
) -> Result<String> {
    run_listing(&state, &path, &query, &headers).await
}

/// Listing of the filesystem root (`GET /dir`)
pub(crate) async fn list_directory_root(
    State(state): State<ApiState>,
    Query(query): Query<ListQuery>,
    headers: HeaderMap,
) -> Result<String> {
    run_listing(&state, "", &query, &headers).await
}

async fn run_listing(
    state: &ApiState,
    path: &str,
    query: &ListQuery,
    headers: &HeaderMap,
) -> Result<String> {
    let identity = state.identity(headers)?;
    let path = grid_path(path);
    let listing = state.grid.list(&identity, &path, query.options()).await?;
    Ok(listing)
}

/// Directory creation endpoint
#[utoipa::path(
    put,
    path = "/dir/{path}",
    params(("path" = String, Path, description = "Directory path")),
    responses(
        (status = 200, description = "Directory created"),
        (status = 500, description = "Creation tool failed", body = crate::ErrorResponse),
        (status = 503, description = "Resource lease unavailable", body = crate::ErrorResponse)
    ),
    tag = "directories"
)]
pub(crate) async fn create_directory(
    State(state): State<ApiState>,
    Path(path): Path<String>,
    headers: HeaderMap,
) -> Result<StatusCode> {
    let identity = state.identity(&headers)?;
    let path = grid_path(&path);

    // Serialize mutation of one resource across gateway instances. Release
    // is best-effort; lease expiry is the backstop.
    let lease = match &state.lock {
        Some(lock) => Some((lock.clone(), lock.acquire(&path).await?)),
        None => None,
    };

    let result = state.grid.make_directory(&identity, &path).await;

    if let Some((lock, lease)) = lease {
        lock.release(&lease).await;
    }

    result?;
    debug!(path, "directory created");
    Ok(StatusCode::OK)
}

/// File retrieval endpoint
#[utoipa::path(
    get,
    path = "/files/{path}",
    params(("path" = String, Path, description = "File path")),
    responses(
        (status = 200, description = "File content", body = Vec<u8>),
        (status = 204, description = "File is empty"),
        (status = 415, description = "Target is not a plain file", body = crate::ErrorResponse),
        (status = 500, description = "Retrieval tool failed", body = crate::ErrorResponse)
    ),
    tag = "files"
)]
pub(crate) async fn export_file(
    State(state): State<ApiState>,
    Path(path): Path<String>,
    headers: HeaderMap,
) -> Result<Response> {
    let identity = state.identity(&headers)?;
    let path = grid_path(&path);

    let info = state.grid.stat(&identity, &path).await?;
    if !info.is_transferable() {
        debug!(path, size = info.size, "retrieval target is not a plain file");
        return Err(ApiError::NotAFile);
    }
    if info.size == 0 {
        // Nothing to transfer; the retrieval tool is never spawned.
        return Ok(StatusCode::NO_CONTENT.into_response());
    }

    let export = state.grid.export(&identity, &path).await?;
    let content_type = mime_guess::from_path(&path).first_or_octet_stream();

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, content_type.as_ref())
        .header(header::CONTENT_LENGTH, info.size)
        .body(Body::from_stream(export.into_stream()))
        .map_err(|e| ApiError::Internal(e.to_string()))
}

/// Identity lookup endpoint
#[utoipa::path(
    get,
    path = "/conf/me",
    responses(
        (status = 200, description = "Identity as reported by the toolset", body = String),
        (status = 401, description = "Anonymous access disabled", body = crate::ErrorResponse),
        (status = 500, description = "Identity tool failed", body = crate::ErrorResponse)
    ),
    tag = "identity"
)]
pub(crate) async fn whoami(
    State(state): State<ApiState>,
    headers: HeaderMap,
) -> Result<String> {
    let identity = state.identity(&headers)?;
    let me = state.grid.whoami(&identity).await?;
    Ok(me)
}

/// Health check endpoint
#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Service is healthy", body = HealthStatus)
    ),
    tag = "health"
)]
pub(crate) async fn health(State(state): State<ApiState>) -> Json<HealthStatus> {
    Json(HealthStatus {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.uptime_seconds(),
    })
}
