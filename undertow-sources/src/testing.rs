//! In-memory directory and decoder for tests.
//!
//! Enabled for this crate's unit tests and for dependents through the
//! `test-utils` feature.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use url::Url;

use crate::decoder::{Decoder, DecoderRequest, parse_decoder_output};
use crate::directory::ServerDirectory;
use crate::errors::{DecodeFailure, SourceError};
use crate::types::{CatalogId, EmbedSources, ServerDescriptor};

/// Directory serving a fixed listing for every catalog id.
#[derive(Debug, Default)]
pub struct StaticDirectory {
    servers: Vec<ServerDescriptor>,
    links: HashMap<String, String>,
    listing_error: Option<String>,
    list_calls: AtomicUsize,
}

impl StaticDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Directory whose listing always fails with an upstream error.
    pub fn failing(reason: &str) -> Self {
        Self {
            listing_error: Some(reason.to_string()),
            ..Self::default()
        }
    }

    /// Adds a server whose link endpoint returns `embed_url`.
    pub fn with_server(mut self, id: &str, name: &str, embed_url: &str) -> Self {
        self.links.insert(id.to_string(), embed_url.to_string());
        self.with_unlinked_server(id, name)
    }

    /// Adds a server whose link endpoint has nothing to offer.
    pub fn with_unlinked_server(mut self, id: &str, name: &str) -> Self {
        self.servers.push(ServerDescriptor {
            id: id.to_string(),
            name: name.to_string(),
            reference: format!("static://sources/{id}"),
        });
        self
    }

    /// Number of listing requests served so far.
    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ServerDirectory for StaticDirectory {
    async fn list_servers(&self, _id: &CatalogId) -> Result<Vec<ServerDescriptor>, SourceError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);

        match &self.listing_error {
            Some(reason) => Err(SourceError::upstream(reason.clone())),
            None => Ok(self.servers.clone()),
        }
    }

    async fn resolve_embed_url(&self, server: &ServerDescriptor) -> Result<Url, SourceError> {
        let link = self.links.get(&server.id).ok_or_else(|| {
            SourceError::upstream(format!(
                "No source link found for server \"{}\"",
                server.name
            ))
        })?;

        Url::parse(link).map_err(|e| SourceError::upstream(format!("invalid link '{link}': {e}")))
    }
}

/// What the scripted decoder does for one embed URL.
#[derive(Debug, Clone)]
pub enum ScriptedResponse {
    /// Pretend the decoder printed this to stdout and exited 0.
    Stdout(String),
    /// Pretend the decoder exited non-zero.
    Exit { code: i32, stderr: String },
    /// Answer with `Stdout` after a delay.
    Delayed { delay: Duration, stdout: String },
    /// Never answer.
    Hang,
}

/// Decoder answering from a script keyed by embed URL.
///
/// Unscripted URLs behave like a decoder exiting with code 1.
#[derive(Debug, Default)]
pub struct ScriptedDecoder {
    responses: HashMap<String, ScriptedResponse>,
    calls: Mutex<Vec<DecoderRequest>>,
}

impl ScriptedDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_response(mut self, embed_url: &str, response: ScriptedResponse) -> Self {
        self.responses.insert(embed_url.to_string(), response);
        self
    }

    /// Scripts raw stdout, parsed exactly like a real decoder run.
    pub fn with_stdout(self, embed_url: &str, stdout: &str) -> Self {
        self.with_response(embed_url, ScriptedResponse::Stdout(stdout.to_string()))
    }

    /// Scripts a successful run yielding `(file, type)` sources and no tracks.
    pub fn with_sources(self, embed_url: &str, sources: &[(&str, &str)]) -> Self {
        let stdout = sources_json(sources);
        self.with_stdout(embed_url, &stdout)
    }

    pub fn with_exit(self, embed_url: &str, code: i32, stderr: &str) -> Self {
        self.with_response(
            embed_url,
            ScriptedResponse::Exit {
                code,
                stderr: stderr.to_string(),
            },
        )
    }

    pub fn with_hang(self, embed_url: &str) -> Self {
        self.with_response(embed_url, ScriptedResponse::Hang)
    }

    /// Requests received so far, in arrival order.
    pub fn calls(&self) -> Vec<DecoderRequest> {
        self.calls
            .lock()
            .map(|calls| calls.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl Decoder for ScriptedDecoder {
    async fn decode(&self, request: &DecoderRequest) -> Result<EmbedSources, SourceError> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(request.clone());
        }

        let response = self
            .responses
            .get(&request.embed_url)
            .cloned()
            .unwrap_or(ScriptedResponse::Exit {
                code: 1,
                stderr: format!("unscripted embed url {}", request.embed_url),
            });

        let stdout = match response {
            ScriptedResponse::Stdout(stdout) => stdout,
            ScriptedResponse::Delayed { delay, stdout } => {
                tokio::time::sleep(delay).await;
                stdout
            }
            ScriptedResponse::Exit { code, stderr } => {
                return Err(decode_error(
                    request,
                    DecodeFailure::Exited {
                        code: Some(code),
                        stderr,
                    },
                ));
            }
            ScriptedResponse::Hang => std::future::pending().await,
        };

        parse_decoder_output(&stdout).map_err(|failure| decode_error(request, failure))
    }
}

fn decode_error(request: &DecoderRequest, failure: DecodeFailure) -> SourceError {
    SourceError::Decode {
        embed_url: request.embed_url.clone(),
        failure,
    }
}

/// Decoder stdout carrying `(file, type)` sources and no tracks.
pub fn sources_json(sources: &[(&str, &str)]) -> String {
    let sources: Vec<serde_json::Value> = sources
        .iter()
        .map(|(file, source_type)| serde_json::json!({ "file": file, "type": source_type }))
        .collect();

    serde_json::json!({ "sources": sources, "tracks": [], "t": 0, "server": 1 }).to_string()
}
