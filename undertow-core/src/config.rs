//! Centralized configuration for Undertow.
//!
//! Every component receives the parts of this value it needs at construction,
//! so tests can build isolated instances without process-wide state.

use std::path::PathBuf;
use std::time::Duration;

use crate::{ConfigError, Result};

/// File name the decoder script is looked up under.
pub const DECODER_SCRIPT_NAME: &str = "decoder.js";

const DEFAULT_SITE: &str = "https://myflixerz.to";

/// Central configuration for all Undertow components.
#[derive(Debug, Clone, Default)]
pub struct UndertowConfig {
    pub upstream: UpstreamConfig,
    pub decoder: DecoderConfig,
    pub referrers: ReferrerConfig,
    pub resolution: ResolutionConfig,
    pub web: WebConfig,
}

/// Catalog site connection settings.
///
/// Shared read-only by every concurrent resolution.
#[derive(Debug, Clone)]
pub struct UpstreamConfig {
    /// Base URL of the catalog site, without trailing slash
    pub base_url: String,
    /// User agent sent with every upstream request
    pub user_agent: String,
    /// Timeout for a single upstream HTTP request
    pub request_timeout: Duration,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_SITE.to_string(),
            user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                         (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36"
                .to_string(),
            request_timeout: Duration::from_secs(15),
        }
    }
}

/// External decoder process settings.
#[derive(Debug, Clone)]
pub struct DecoderConfig {
    /// Program used to run the decoder script (None = execute the file directly)
    pub interpreter: Option<String>,
    /// Ordered candidate locations for the decoder, first existing one wins
    pub candidates: Vec<PathBuf>,
    /// Upper bound for one decoder run; the process is killed when exceeded
    pub timeout: Duration,
    /// Maximum number of decoder processes alive at the same time
    pub max_concurrent: usize,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            interpreter: Some("node".to_string()),
            candidates: default_decoder_candidates(),
            timeout: Duration::from_secs(30),
            max_concurrent: 4,
        }
    }
}

/// Candidate decoder locations: next to the installed binary, then the working directory.
pub fn default_decoder_candidates() -> Vec<PathBuf> {
    let mut candidates = Vec::new();

    if let Some(exe_dir) = std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(PathBuf::from))
    {
        if let Some(parent) = exe_dir.parent() {
            candidates.push(parent.join(DECODER_SCRIPT_NAME));
        }
        candidates.push(exe_dir.join(DECODER_SCRIPT_NAME));
    }

    if let Ok(cwd) = std::env::current_dir() {
        candidates.push(cwd.join(DECODER_SCRIPT_NAME));
    }

    candidates
}

/// Default referrers per server family, used when a caller supplies none.
#[derive(Debug, Clone)]
pub struct ReferrerConfig {
    /// VidCloud and UpCloud embeds
    pub vidcloud: String,
    /// MixDrop embeds
    pub mixdrop: String,
    /// Any server family without a dedicated entry
    pub fallback: String,
}

impl Default for ReferrerConfig {
    fn default() -> Self {
        Self {
            vidcloud: DEFAULT_SITE.to_string(),
            mixdrop: DEFAULT_SITE.to_string(),
            fallback: DEFAULT_SITE.to_string(),
        }
    }
}

/// Per-resolution limits applied by the aggregation pipeline.
#[derive(Debug, Clone)]
pub struct ResolutionConfig {
    /// Upper bound for one server's full resolution (listing entry to decoded sources)
    pub timeout: Duration,
}

impl Default for ResolutionConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(60),
        }
    }
}

/// API server settings.
#[derive(Debug, Clone)]
pub struct WebConfig {
    pub host: String,
    pub port: u16,
    /// Requests allowed per minute across all clients
    pub requests_per_minute: u32,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3000,
            requests_per_minute: 100,
        }
    }
}

impl UndertowConfig {
    /// Creates configuration with environment variable overrides.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(base_url) = std::env::var("UNDERTOW_BASE_URL") {
            config.upstream.base_url = base_url.trim_end_matches('/').to_string();
        }

        if let Ok(user_agent) = std::env::var("UNDERTOW_USER_AGENT") {
            config.upstream.user_agent = user_agent;
        }

        if let Some(timeout) = env_seconds("UNDERTOW_REQUEST_TIMEOUT") {
            config.upstream.request_timeout = timeout;
        }

        if let Ok(interpreter) = std::env::var("UNDERTOW_DECODER_INTERPRETER") {
            config.decoder.interpreter = if interpreter.trim().is_empty() {
                None
            } else {
                Some(interpreter)
            };
        }

        if let Ok(path) = std::env::var("UNDERTOW_DECODER_PATH") {
            config.decoder.candidates.insert(0, PathBuf::from(path));
        }

        if let Some(timeout) = env_seconds("UNDERTOW_DECODER_TIMEOUT") {
            config.decoder.timeout = timeout;
        }

        if let Ok(concurrency) = std::env::var("UNDERTOW_DECODER_CONCURRENCY") {
            if let Ok(count) = concurrency.parse::<usize>() {
                config.decoder.max_concurrent = count;
            }
        }

        if let Some(timeout) = env_seconds("UNDERTOW_RESOLUTION_TIMEOUT") {
            config.resolution.timeout = timeout;
        }

        if let Ok(host) = std::env::var("UNDERTOW_HOST") {
            config.web.host = host;
        }

        if let Ok(port) = std::env::var("PORT") {
            if let Ok(port) = port.parse::<u16>() {
                config.web.port = port;
            }
        }

        if let Ok(limit) = std::env::var("UNDERTOW_RATE_LIMIT") {
            if let Ok(limit) = limit.parse::<u32>() {
                config.web.requests_per_minute = limit;
            }
        }

        config
    }

    /// Creates a configuration with short timeouts for tests.
    pub fn for_testing() -> Self {
        Self {
            upstream: UpstreamConfig {
                request_timeout: Duration::from_secs(5),
                ..Default::default()
            },
            decoder: DecoderConfig {
                timeout: Duration::from_secs(5),
                ..Default::default()
            },
            resolution: ResolutionConfig {
                timeout: Duration::from_secs(10),
            },
            web: WebConfig {
                requests_per_minute: 10_000,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    /// Rejects settings the pipeline cannot run with.
    ///
    /// # Errors
    /// - `ConfigError::InvalidBaseUrl` - Base URL is not an absolute http(s) URL
    /// - `ConfigError::Invalid` - A timeout, concurrency limit or rate limit is zero
    pub fn validate(&self) -> Result<()> {
        let parsed =
            url::Url::parse(&self.upstream.base_url).map_err(|e| ConfigError::InvalidBaseUrl {
                url: self.upstream.base_url.clone(),
                reason: e.to_string(),
            })?;

        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(ConfigError::InvalidBaseUrl {
                url: self.upstream.base_url.clone(),
                reason: format!("unsupported scheme '{}'", parsed.scheme()),
            });
        }

        if self.upstream.request_timeout.is_zero() {
            return Err(ConfigError::invalid("upstream request timeout must be non-zero"));
        }
        if self.decoder.timeout.is_zero() {
            return Err(ConfigError::invalid("decoder timeout must be non-zero"));
        }
        if self.decoder.max_concurrent == 0 {
            return Err(ConfigError::invalid(
                "decoder concurrency must allow at least one process",
            ));
        }
        if self.resolution.timeout.is_zero() {
            return Err(ConfigError::invalid("resolution timeout must be non-zero"));
        }
        if self.web.requests_per_minute == 0 {
            return Err(ConfigError::invalid("rate limit must be non-zero"));
        }

        Ok(())
    }
}

fn env_seconds(name: &str) -> Option<Duration> {
    std::env::var(name)
        .ok()
        .and_then(|value| value.parse::<u64>().ok())
        .map(Duration::from_secs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_values() {
        let config = UndertowConfig::default();

        assert_eq!(config.upstream.base_url, "https://myflixerz.to");
        assert_eq!(config.upstream.request_timeout, Duration::from_secs(15));
        assert_eq!(config.decoder.interpreter.as_deref(), Some("node"));
        assert_eq!(config.decoder.timeout, Duration::from_secs(30));
        assert_eq!(config.decoder.max_concurrent, 4);
        assert_eq!(config.resolution.timeout, Duration::from_secs(60));
        assert_eq!(config.web.port, 3000);
        assert_eq!(config.web.requests_per_minute, 100);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_default_candidates_end_with_working_directory() {
        let candidates = default_decoder_candidates();
        let cwd = std::env::current_dir().unwrap();

        assert!(!candidates.is_empty());
        assert_eq!(candidates.last(), Some(&cwd.join(DECODER_SCRIPT_NAME)));
        assert!(
            candidates
                .iter()
                .all(|path| path.file_name().unwrap() == DECODER_SCRIPT_NAME)
        );
    }

    #[test]
    fn test_validate_rejects_bad_settings() {
        let mut config = UndertowConfig::for_testing();
        config.upstream.base_url = "not a url".to_string();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidBaseUrl { .. })
        ));

        let mut config = UndertowConfig::for_testing();
        config.upstream.base_url = "ftp://example.com".to_string();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidBaseUrl { .. })
        ));

        let mut config = UndertowConfig::for_testing();
        config.decoder.max_concurrent = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid { .. })));

        let mut config = UndertowConfig::for_testing();
        config.resolution.timeout = Duration::ZERO;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid { .. })));
    }

    #[test]
    fn test_env_override() {
        unsafe {
            std::env::set_var("UNDERTOW_BASE_URL", "http://localhost:9000/");
            std::env::set_var("UNDERTOW_DECODER_TIMEOUT", "7");
            std::env::set_var("UNDERTOW_DECODER_INTERPRETER", "");
            std::env::set_var("UNDERTOW_DECODER_PATH", "/opt/undertow/decoder.js");
            std::env::set_var("UNDERTOW_RESOLUTION_TIMEOUT", "90");
        }

        let config = UndertowConfig::from_env();

        assert_eq!(config.upstream.base_url, "http://localhost:9000");
        assert_eq!(config.decoder.timeout, Duration::from_secs(7));
        assert_eq!(config.decoder.interpreter, None);
        assert_eq!(
            config.decoder.candidates.first(),
            Some(&PathBuf::from("/opt/undertow/decoder.js"))
        );
        assert_eq!(config.resolution.timeout, Duration::from_secs(90));

        // Cleanup
        unsafe {
            std::env::remove_var("UNDERTOW_BASE_URL");
            std::env::remove_var("UNDERTOW_DECODER_TIMEOUT");
            std::env::remove_var("UNDERTOW_DECODER_INTERPRETER");
            std::env::remove_var("UNDERTOW_DECODER_PATH");
            std::env::remove_var("UNDERTOW_RESOLUTION_TIMEOUT");
        }
    }
}
