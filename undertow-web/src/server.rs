//! JSON API server for Undertow
//!
//! Routes listing and resolution requests to the shared [`SourcePipeline`].

use std::net::SocketAddr;

use axum::Router;
use axum::middleware;
use axum::routing::get;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use undertow_core::UndertowConfig;
use undertow_sources::SourcePipeline;

use crate::error::WebError;
use crate::handlers::{embed_all, embed_one, health, list_servers};
use crate::rate_limit::{create_limiter, rate_limit};

#[derive(Debug, Clone)]
pub struct AppState {
    pub pipeline: SourcePipeline,
}

/// Builds the API router around `state`, limited to `requests_per_minute`.
pub fn build_router(state: AppState, requests_per_minute: u32) -> Router {
    let limiter = create_limiter(requests_per_minute);

    Router::new()
        .route("/health", get(health))
        .route("/{kind}/servers/{id}", get(list_servers))
        .route("/{kind}/embed/{id}", get(embed_all))
        .route("/{kind}/embed/{id}/server", get(embed_one))
        .layer(middleware::from_fn_with_state(limiter, rate_limit))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Validates `config`, wires the pipeline and serves until the process ends.
///
/// # Errors
/// - `WebError::Config` - Configuration is invalid
/// - `WebError::Pipeline` - HTTP client could not be built
/// - `WebError::Bind` - Listen address unavailable
/// - `WebError::Serve` - Server loop failed
pub async fn run_server(config: UndertowConfig) -> Result<(), WebError> {
    config.validate()?;

    let state = AppState {
        pipeline: SourcePipeline::from_config(&config)?,
    };
    let app = build_router(state, config.web.requests_per_minute);

    let addr = format!("{}:{}", config.web.host, config.web.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|source| WebError::Bind {
            addr: addr.clone(),
            source,
        })?;

    tracing::info!(
        "Undertow API running on http://{addr} (upstream {})",
        config.upstream.base_url
    );
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;
    Ok(())
}
