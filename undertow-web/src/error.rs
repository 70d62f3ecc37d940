//! Error types and HTTP status mapping.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;
use undertow_core::ConfigError;
use undertow_sources::{ErrorKind, SourceError};

/// Errors a request handler can answer with.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Failure from the resolution pipeline.
    #[error(transparent)]
    Source(#[from] SourceError),

    /// Listing succeeded but offered no servers.
    #[error("No servers found for {id}")]
    NoServers {
        /// The catalog id that was listed
        id: String,
    },
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Source(error) => match error.kind() {
                ErrorKind::Validation => StatusCode::BAD_REQUEST,
                ErrorKind::NotFound => StatusCode::NOT_FOUND,
                ErrorKind::Failure => StatusCode::INTERNAL_SERVER_ERROR,
            },
            ApiError::NoServers { .. } => StatusCode::NOT_FOUND,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            ApiError::Source(error) => error.code(),
            ApiError::NoServers { .. } => "no_servers",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();

        if status.is_server_error() {
            tracing::error!(
                status = %status,
                error = %self,
                "Server error in API handler"
            );
        }

        let body = json!({
            "error": self.to_string(),
            "code": self.code(),
        });

        (status, Json(body)).into_response()
    }
}

/// Errors that stop the server from starting or serving.
#[derive(Debug, Error)]
pub enum WebError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("failed to build resolution pipeline: {0}")]
    Pipeline(#[from] SourceError),

    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("server error: {0}")]
    Serve(#[from] std::io::Error),
}
