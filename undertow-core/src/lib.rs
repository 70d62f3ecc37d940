//! Undertow Core - Shared configuration and tracing
//!
//! Holds the configuration value that every Undertow component is built from,
//! plus the tracing setup used by the binaries.

pub mod config;
pub mod tracing_setup;

pub use config::{
    DecoderConfig, ReferrerConfig, ResolutionConfig, UndertowConfig, UpstreamConfig, WebConfig,
};

/// Errors raised while building or validating configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid upstream base URL '{url}': {reason}")]
    InvalidBaseUrl { url: String, reason: String },

    #[error("Configuration error: {reason}")]
    Invalid { reason: String },
}

impl ConfigError {
    /// Shorthand for a generic invalid-setting error.
    pub fn invalid(reason: impl Into<String>) -> Self {
        ConfigError::Invalid {
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, ConfigError>;
