//! Boundary with the external decoder process.
//!
//! The decoder turns one embed URL into stream descriptors. It runs as its own
//! OS process, receives `--embed-url=<url> --referrer=<url>` and must print one
//! JSON object to stdout and exit 0:
//!
//! ```text
//! { "sources": [{ "file": "..", "type": ".." }],
//!   "tracks":  [{ "file": "..", "label": "..", "kind": "..", "default": true }],
//!   "t": 0, "server": 1 }
//! ```
//!
//! Any other exit status, or output that does not parse as that object, is a
//! decode failure.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::process::Command;
use tokio::sync::Semaphore;
use undertow_core::DecoderConfig;

use crate::errors::{DecodeFailure, SourceError};
use crate::types::{EmbedSource, EmbedSources, SubtitleTrack};

/// Inputs handed to one decoder run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecoderRequest {
    pub embed_url: String,
    pub referrer: String,
}

impl DecoderRequest {
    pub fn new(embed_url: impl Into<String>, referrer: impl Into<String>) -> Self {
        Self {
            embed_url: embed_url.into(),
            referrer: referrer.into(),
        }
    }

    /// Command-line arguments carrying this request.
    pub fn to_args(&self) -> [String; 2] {
        [
            format!("--embed-url={}", self.embed_url),
            format!("--referrer={}", self.referrer),
        ]
    }

    fn failure(&self, failure: DecodeFailure) -> SourceError {
        SourceError::Decode {
            embed_url: self.embed_url.clone(),
            failure,
        }
    }
}

/// Something that can decode embed URLs into stream descriptors.
///
/// The production implementation spawns a process per call; tests substitute
/// scripted implementations.
#[async_trait]
pub trait Decoder: Send + Sync + std::fmt::Debug {
    /// Decode one embed URL. Makes exactly one attempt.
    ///
    /// # Errors
    /// - `SourceError::DecoderNotFound` - No decoder is available
    /// - `SourceError::Decode` - Decoder failed or produced unusable output
    async fn decode(&self, request: &DecoderRequest) -> Result<EmbedSources, SourceError>;
}

/// Wire shape of the decoder's stdout.
#[derive(Debug, Deserialize)]
struct DecoderOutput {
    sources: Vec<EmbedSource>,
    tracks: Vec<SubtitleTrack>,
    #[serde(default)]
    t: f64,
    #[serde(default = "default_server_index")]
    server: u32,
}

fn default_server_index() -> u32 {
    1
}

/// Parses decoder stdout, tolerating surrounding whitespace.
///
/// # Errors
/// - `DecodeFailure::MalformedOutput` - Output is not exactly one object of the expected shape
pub fn parse_decoder_output(stdout: &str) -> Result<EmbedSources, DecodeFailure> {
    let output: DecoderOutput =
        serde_json::from_str(stdout.trim()).map_err(|e| DecodeFailure::MalformedOutput {
            reason: e.to_string(),
        })?;

    Ok(EmbedSources {
        sources: output.sources,
        tracks: output.tracks,
        time_offset: output.t,
        server_index: output.server,
    })
}

/// Returns the first candidate that exists on disk.
///
/// # Errors
/// - `SourceError::DecoderNotFound` - None of the candidates exist
pub async fn locate_decoder(candidates: &[PathBuf]) -> Result<PathBuf, SourceError> {
    for candidate in candidates {
        if tokio::fs::try_exists(candidate).await.unwrap_or(false) {
            return Ok(candidate.clone());
        }
    }

    Err(SourceError::DecoderNotFound {
        searched: candidates.to_vec(),
    })
}

/// Decoder that runs one external process per call.
///
/// Each run is bounded by the configured timeout; an overrunning process is
/// killed. A semaphore caps how many processes are alive at once.
#[derive(Debug, Clone)]
pub struct ProcessDecoder {
    interpreter: Option<String>,
    candidates: Vec<PathBuf>,
    timeout: Duration,
    permits: Arc<Semaphore>,
}

impl ProcessDecoder {
    pub fn new(config: &DecoderConfig) -> Self {
        Self {
            interpreter: config.interpreter.clone(),
            candidates: config.candidates.clone(),
            timeout: config.timeout,
            permits: Arc::new(Semaphore::new(config.max_concurrent.max(1))),
        }
    }

    fn command(&self, location: &Path, request: &DecoderRequest) -> Command {
        let mut command = match &self.interpreter {
            Some(interpreter) => {
                let mut command = Command::new(interpreter);
                command.arg(location);
                command
            }
            None => Command::new(location),
        };

        command
            .args(request.to_args())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        command
    }
}

#[async_trait]
impl Decoder for ProcessDecoder {
    async fn decode(&self, request: &DecoderRequest) -> Result<EmbedSources, SourceError> {
        let location = locate_decoder(&self.candidates).await?;

        let _permit = self.permits.acquire().await.map_err(|e| {
            request.failure(DecodeFailure::Spawn {
                reason: e.to_string(),
            })
        })?;

        tracing::debug!(
            decoder = %location.display(),
            embed_url = %request.embed_url,
            "Starting decoder process"
        );

        let child = self.command(&location, request).spawn().map_err(|e| {
            request.failure(DecodeFailure::Spawn {
                reason: format!("{}: {e}", location.display()),
            })
        })?;

        // Dropping the wait future on timeout drops the child, which kills it.
        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                return Err(request.failure(DecodeFailure::Spawn {
                    reason: e.to_string(),
                }));
            }
            Err(_) => {
                tracing::warn!(
                    embed_url = %request.embed_url,
                    "Decoder exceeded {:?}, killing process",
                    self.timeout
                );
                return Err(request.failure(DecodeFailure::TimedOut {
                    after: self.timeout,
                }));
            }
        };

        let stderr = String::from_utf8_lossy(&output.stderr);
        if !stderr.trim().is_empty() {
            tracing::debug!("Decoder stderr: {}", stderr.trim());
        }

        if !output.status.success() {
            return Err(request.failure(DecodeFailure::Exited {
                code: output.status.code(),
                stderr: stderr.into_owned(),
            }));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        parse_decoder_output(&stdout).map_err(|failure| request.failure(failure))
    }
}
