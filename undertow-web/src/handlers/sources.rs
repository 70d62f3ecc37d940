//! Server listing and embed resolution handlers

use axum::Json;
use axum::extract::{Path, Query, State};
use serde::Deserialize;
use undertow_sources::{
    AggregateResult, CatalogId, MediaKind, ResolvedSource, ServerDescriptor, SourceError,
};

use crate::error::ApiError;
use crate::server::AppState;

#[derive(Debug, Deserialize)]
pub struct ServerQuery {
    pub server: Option<String>,
}

fn catalog_id(kind: &str, id: &str) -> Result<CatalogId, SourceError> {
    let kind: MediaKind = kind.parse()?;
    CatalogId::new(kind, id)
}

/// `GET /{kind}/servers/{id}`
///
/// # Errors
/// - `ApiError::NoServers` - Listing is empty
/// - `ApiError::Source` - Bad path or listing failure
pub async fn list_servers(
    State(state): State<AppState>,
    Path((kind, id)): Path<(String, String)>,
) -> Result<Json<Vec<ServerDescriptor>>, ApiError> {
    let id = catalog_id(&kind, &id)?;
    let servers = state.pipeline.list_servers(&id).await?;

    if servers.is_empty() {
        return Err(ApiError::NoServers {
            id: id.as_str().to_string(),
        });
    }

    Ok(Json(servers))
}

/// `GET /{kind}/embed/{id}`: every server that resolved.
///
/// # Errors
/// - `ApiError::Source` - Bad path or listing failure
pub async fn embed_all(
    State(state): State<AppState>,
    Path((kind, id)): Path<(String, String)>,
) -> Result<Json<AggregateResult>, ApiError> {
    let id = catalog_id(&kind, &id)?;
    let result = state.pipeline.resolve_all(&id).await?;
    Ok(Json(result))
}

/// `GET /{kind}/embed/{id}/server?server=NAME`
///
/// # Errors
/// - `ApiError::Source` - Missing server parameter, unknown server or failed resolution
pub async fn embed_one(
    State(state): State<AppState>,
    Path((kind, id)): Path<(String, String)>,
    Query(query): Query<ServerQuery>,
) -> Result<Json<ResolvedSource>, ApiError> {
    let server = query
        .server
        .ok_or_else(|| SourceError::validation("server", "server query parameter is required"))?;
    let id = catalog_id(&kind, &id)?;

    let resolved = state.pipeline.resolve_one(&id, &server).await?;
    Ok(Json(resolved))
}
