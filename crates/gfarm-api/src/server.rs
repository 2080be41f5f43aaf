//! API server with OpenAPI documentation

use std::sync::Arc;

use axum::http::{header, HeaderValue, Method};
use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::Notify;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use gfarm_config::ServerConfig;

use crate::routes::{self, create_router, ApiState};
use crate::types::{ErrorResponse, HealthStatus};
use crate::{ApiError, Result};

/// OpenAPI documentation
#[derive(OpenApi)]
#[openapi(
    paths(
        routes::list_directory,
        routes::create_directory,
        routes::export_file,
        routes::whoami,
        routes::health,
    ),
    components(schemas(ErrorResponse, HealthStatus)),
    tags(
        (name = "directories", description = "Directory listing and creation"),
        (name = "files", description = "File retrieval"),
        (name = "identity", description = "Identity lookup"),
        (name = "health", description = "Health check endpoints"),
    ),
    info(
        title = "Gfarm HTTP Gateway API",
        version = "0.1.0",
        description = "HTTP access to a Gfarm filesystem through its command-line toolset",
        license(name = "MIT OR Apache-2.0"),
    )
)]
pub struct ApiDoc;

/// API server
pub struct ApiServer {
    /// Configuration
    config: ServerConfig,

    /// Shared state
    state: ApiState,

    /// Shutdown signal
    shutdown: Arc<Notify>,
}

impl ApiServer {
    /// Create new API server
    pub fn new(config: ServerConfig, state: ApiState) -> Self {
        Self {
            config,
            state,
            shutdown: Arc::new(Notify::new()),
        }
    }

    /// Get the server configuration
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Get OpenAPI specification as JSON
    pub fn openapi_spec(&self) -> String {
        serde_json::to_string_pretty(&ApiDoc::openapi()).unwrap_or_default()
    }

    /// Build the router with all middleware
    fn build_router(&self) -> Router {
        let mut router = create_router(self.state.clone());

        if self.config.enable_swagger {
            router =
                router.merge(SwaggerUi::new("/swagger-ui").url("/openapi.json", ApiDoc::openapi()));
        }

        if self.config.enable_cors {
            router = router.layer(cors_layer(&self.config.allowed_origins));
        }

        if self.config.enable_tracing {
            router = router.layer(TraceLayer::new_for_http());
        }

        router
    }

    /// Start the API server
    pub async fn start(&self) -> Result<()> {
        let addr = self
            .config
            .socket_addr()
            .map_err(|e| ApiError::Internal(e.to_string()))?;
        let router = self.build_router();

        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| ApiError::Internal(format!("failed to bind to {addr}: {e}")))?;

        tracing::info!("gateway listening on {}", addr);

        let shutdown = self.shutdown.clone();
        axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                shutdown.notified().await;
            })
            .await
            .map_err(|e| ApiError::Internal(e.to_string()))?;

        Ok(())
    }

    /// Shutdown the API server
    pub async fn shutdown(&self) {
        tracing::info!("shutting down gateway");
        self.shutdown.notify_one();
    }
}

/// Build the CORS layer from the configured origin list.
///
/// Exact origins get credentialed requests; a `*` entry (or an empty list)
/// degrades to permissive-without-credentials, which is all the CORS
/// protocol allows for wildcards.
fn cors_layer(origins: &[String]) -> CorsLayer {
    let wildcard = origins.is_empty() || origins.iter().any(|o| o == "*");
    if wildcard {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        let origins: Vec<HeaderValue> = origins
            .iter()
            .filter_map(|origin| origin.parse().ok())
            .collect();
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods([Method::GET, Method::PUT, Method::POST, Method::DELETE])
            .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
            .allow_credentials(true)
    }
}
