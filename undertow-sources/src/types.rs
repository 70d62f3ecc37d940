//! Data types for embed-source resolution.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::SourceError;

/// Stream type the decoder reports for segmented HLS playlists.
pub const HLS_MARKER: &str = "hls";

/// Quality label attached to every resolved source.
pub const DEFAULT_QUALITY: &str = "auto";

/// Catalog entry category, selects which listing endpoint is used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Movie,
    Tv,
}

impl MediaKind {
    /// Path segment used by the catalog site for this kind's server listing.
    pub fn listing_path(self) -> &'static str {
        match self {
            MediaKind::Movie => "ajax/episode/list",
            MediaKind::Tv => "ajax/episode/servers",
        }
    }
}

impl FromStr for MediaKind {
    type Err = SourceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "movie" => Ok(MediaKind::Movie),
            "tv" => Ok(MediaKind::Tv),
            other => Err(SourceError::validation(
                "media kind",
                format!("expected 'movie' or 'tv', got '{other}'"),
            )),
        }
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MediaKind::Movie => write!(f, "movie"),
            MediaKind::Tv => write!(f, "tv"),
        }
    }
}

/// Validated identifier of a movie or TV episode on the catalog site.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CatalogId {
    kind: MediaKind,
    id: String,
}

impl CatalogId {
    /// Validates a raw id for the given kind.
    ///
    /// # Errors
    /// - `SourceError::Validation` - Id is empty or contains characters other than
    ///   ASCII alphanumerics, `-` and `_`
    pub fn new(kind: MediaKind, raw: &str) -> Result<Self, SourceError> {
        let id = raw.trim();
        if id.is_empty() {
            return Err(SourceError::validation("id", "id is required"));
        }
        if !id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(SourceError::validation(
                "id",
                format!("'{id}' contains unsupported characters"),
            ));
        }

        Ok(Self {
            kind,
            id: id.to_string(),
        })
    }

    /// Creates a movie id.
    ///
    /// # Errors
    /// - `SourceError::Validation` - Id is malformed
    pub fn movie(raw: &str) -> Result<Self, SourceError> {
        Self::new(MediaKind::Movie, raw)
    }

    /// Creates a TV episode id.
    ///
    /// # Errors
    /// - `SourceError::Validation` - Id is malformed
    pub fn tv_episode(raw: &str) -> Result<Self, SourceError> {
        Self::new(MediaKind::Tv, raw)
    }

    pub fn kind(&self) -> MediaKind {
        self.kind
    }

    pub fn as_str(&self) -> &str {
        &self.id
    }
}

impl fmt::Display for CatalogId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.kind, self.id)
    }
}

/// Hosting server family, decides the default referrer handed to the decoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ServerKind {
    UpCloud,
    VidCloud,
    MixDrop,
    Other,
}

impl ServerKind {
    /// Classifies a display name; unknown names map to `Other`.
    pub fn from_name(name: &str) -> Self {
        match name.trim().to_lowercase().as_str() {
            "upcloud" => ServerKind::UpCloud,
            "vidcloud" => ServerKind::VidCloud,
            "mixdrop" => ServerKind::MixDrop,
            _ => ServerKind::Other,
        }
    }
}

/// One hosting option offered for a catalog entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerDescriptor {
    /// Opaque server id, unique within one listing
    pub id: String,
    /// Display name shown by the catalog site
    pub name: String,
    /// URL of the endpoint that hands out this server's embed link
    pub reference: String,
}

impl ServerDescriptor {
    pub fn kind(&self) -> ServerKind {
        ServerKind::from_name(&self.name)
    }
}

/// One raw stream variant returned by the decoder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmbedSource {
    pub file: String,
    #[serde(rename = "type")]
    pub source_type: String,
}

impl EmbedSource {
    pub fn is_hls(&self) -> bool {
        self.source_type == HLS_MARKER
    }
}

/// One subtitle or caption track.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubtitleTrack {
    pub file: String,
    /// Empty for unlabelled tracks such as thumbnail sprites
    #[serde(default)]
    pub label: String,
    pub kind: String,
    #[serde(rename = "default", default, skip_serializing_if = "Option::is_none")]
    pub is_default: Option<bool>,
}

/// Full decoder output for one embed URL.
#[derive(Debug, Clone, PartialEq)]
pub struct EmbedSources {
    /// Stream variants in decoder order
    pub sources: Vec<EmbedSource>,
    /// Subtitle tracks in decoder order
    pub tracks: Vec<SubtitleTrack>,
    /// Start offset reported by the decoder
    pub time_offset: f64,
    /// Server index reported by the decoder
    pub server_index: u32,
}

/// Final answer for one server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedSource {
    pub server_name: String,
    pub url: String,
    #[serde(rename = "isM3U8")]
    pub is_m3u8: bool,
    pub quality: String,
    pub subtitles: Vec<SubtitleTrack>,
}

impl ResolvedSource {
    /// Builds the answer for `server_name` from the first decoded source.
    ///
    /// # Errors
    /// - `SourceError::NoSources` - Decoder reported zero sources
    pub fn from_embed_sources(
        server_name: &str,
        embed_url: &str,
        decoded: EmbedSources,
    ) -> Result<Self, SourceError> {
        let first = decoded
            .sources
            .into_iter()
            .next()
            .ok_or_else(|| SourceError::NoSources {
                embed_url: embed_url.to_string(),
            })?;

        Ok(Self {
            server_name: server_name.to_string(),
            is_m3u8: first.is_hls(),
            url: first.file,
            quality: DEFAULT_QUALITY.to_string(),
            subtitles: decoded.tracks,
        })
    }
}

/// Answer for "all servers" mode: successes only, in completion-independent order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregateResult {
    pub id: String,
    pub sources: Vec<ResolvedSource>,
}

/// Result of resolving one discovered server.
#[derive(Debug)]
pub struct ResolutionOutcome {
    pub server_name: String,
    pub result: Result<ResolvedSource, SourceError>,
}

impl ResolutionOutcome {
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }
}

/// Every per-server outcome of one aggregate resolution.
#[derive(Debug)]
pub struct ResolutionReport {
    pub id: CatalogId,
    pub outcomes: Vec<ResolutionOutcome>,
}

impl ResolutionReport {
    /// Outcomes that failed, for diagnostics.
    pub fn failures(&self) -> impl Iterator<Item = (&str, &SourceError)> {
        self.outcomes.iter().filter_map(|outcome| {
            outcome
                .result
                .as_ref()
                .err()
                .map(|error| (outcome.server_name.as_str(), error))
        })
    }

    /// Drops failures and keeps the resolved sources.
    pub fn into_aggregate(self) -> AggregateResult {
        AggregateResult {
            id: self.id.as_str().to_string(),
            sources: self
                .outcomes
                .into_iter()
                .filter_map(|outcome| outcome.result.ok())
                .collect(),
        }
    }
}
