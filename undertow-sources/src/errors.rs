//! Error types for embed-source resolution.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Errors that can occur while discovering, resolving or decoding sources.
#[derive(Debug, Error)]
pub enum SourceError {
    /// Caller supplied a malformed or missing id or server name.
    #[error("Invalid {field}: {reason}")]
    Validation {
        /// Which input was rejected
        field: &'static str,
        /// Why it was rejected
        reason: String,
    },

    /// Requested server is absent from the discovery listing.
    #[error("Server \"{server}\" not found")]
    ServerNotFound {
        /// The requested server name
        server: String,
    },

    /// Catalog site unreachable or returned an unexpected structure.
    #[error("Upstream error: {reason}")]
    Upstream {
        /// The reason for the upstream failure
        reason: String,
    },

    /// No decoder exists at any candidate location.
    #[error("Decoder not found in any expected location: {}", format_paths(.searched))]
    DecoderNotFound {
        /// Every location that was checked
        searched: Vec<PathBuf>,
    },

    /// Decoder process failed or produced unusable output.
    #[error("Decode failed for {embed_url}: {failure}")]
    Decode {
        /// The embed URL being decoded
        embed_url: String,
        /// What went wrong
        failure: DecodeFailure,
    },

    /// Decoder succeeded but reported zero stream sources.
    #[error("No sources found for {embed_url}")]
    NoSources {
        /// The embed URL that decoded to nothing
        embed_url: String,
    },

    /// A single server resolution exceeded its time budget.
    #[error("Resolution of server \"{server}\" timed out after {}s", whole_seconds(.after))]
    Timeout {
        /// The server whose resolution was abandoned
        server: String,
        /// The budget that was exceeded
        after: Duration,
    },
}

/// Detail for [`SourceError::Decode`].
#[derive(Debug, Error)]
pub enum DecodeFailure {
    /// Process exited with a non-zero status.
    #[error("process exited with code {}: {}", display_code(.code), .stderr.trim())]
    Exited {
        /// Exit code, None when terminated by a signal
        code: Option<i32>,
        /// Captured standard error
        stderr: String,
    },

    /// Exit status was zero but stdout was not the expected JSON object.
    #[error("malformed decoder output: {reason}")]
    MalformedOutput {
        /// The parse error
        reason: String,
    },

    /// The process could not be started or awaited.
    #[error("failed to run decoder: {reason}")]
    Spawn {
        /// The I/O error text
        reason: String,
    },

    /// The process exceeded its time budget and was killed.
    #[error("decoder timed out after {}s", whole_seconds(.after))]
    TimedOut {
        /// The budget that was exceeded
        after: Duration,
    },
}

/// Coarse classification used by API layers to pick a response status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    NotFound,
    Failure,
}

impl SourceError {
    /// Builds a validation error for the named input.
    pub fn validation(field: &'static str, reason: impl Into<String>) -> Self {
        SourceError::Validation {
            field,
            reason: reason.into(),
        }
    }

    /// Builds an upstream error from any displayable reason.
    pub fn upstream(reason: impl Into<String>) -> Self {
        SourceError::Upstream {
            reason: reason.into(),
        }
    }

    /// Classifies this error for status mapping.
    pub fn kind(&self) -> ErrorKind {
        match self {
            SourceError::Validation { .. } => ErrorKind::Validation,
            SourceError::ServerNotFound { .. } => ErrorKind::NotFound,
            _ => ErrorKind::Failure,
        }
    }

    /// Short machine-readable code for this error.
    pub fn code(&self) -> &'static str {
        match self {
            SourceError::Validation { .. } => "validation_error",
            SourceError::ServerNotFound { .. } => "server_not_found",
            SourceError::Upstream { .. } => "upstream_error",
            SourceError::DecoderNotFound { .. } => "decoder_not_found",
            SourceError::Decode { .. } => "decode_error",
            SourceError::NoSources { .. } => "no_sources",
            SourceError::Timeout { .. } => "timeout",
        }
    }
}

fn format_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|path| path.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

fn display_code(code: &Option<i32>) -> String {
    code.map_or_else(|| "signal".to_string(), |code| code.to_string())
}

fn whole_seconds(duration: &Duration) -> u64 {
    duration.as_secs()
}
