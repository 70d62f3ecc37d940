//! Source extraction for one embed URL.

use std::sync::Arc;

use undertow_core::ReferrerConfig;

use crate::decoder::{Decoder, DecoderRequest};
use crate::errors::SourceError;
use crate::types::{EmbedSources, ServerKind};

/// Wraps a [`Decoder`] with per-server-family referrer defaults.
///
/// Server families differ only in the referrer handed to the decoder when the
/// caller supplies none.
#[derive(Debug, Clone)]
pub struct SourceExtractor {
    decoder: Arc<dyn Decoder>,
    referrers: ReferrerConfig,
}

impl SourceExtractor {
    pub fn new(decoder: Arc<dyn Decoder>, referrers: ReferrerConfig) -> Self {
        Self { decoder, referrers }
    }

    /// Referrer used for `kind` when none is given.
    pub fn default_referrer(&self, kind: ServerKind) -> &str {
        match kind {
            ServerKind::UpCloud | ServerKind::VidCloud => &self.referrers.vidcloud,
            ServerKind::MixDrop => &self.referrers.mixdrop,
            ServerKind::Other => &self.referrers.fallback,
        }
    }

    /// Decode `embed_url` once, preserving the decoder's source and track order.
    ///
    /// # Errors
    /// - `SourceError::DecoderNotFound` - No decoder is resolvable
    /// - `SourceError::Decode` - Process failure or malformed output
    pub async fn extract(
        &self,
        kind: ServerKind,
        embed_url: &str,
        referrer: Option<&str>,
    ) -> Result<EmbedSources, SourceError> {
        let referrer = referrer.unwrap_or_else(|| self.default_referrer(kind));
        let request = DecoderRequest::new(embed_url, referrer);

        let decoded = self.decoder.decode(&request).await?;
        tracing::debug!(
            embed_url,
            sources = decoded.sources.len(),
            tracks = decoded.tracks.len(),
            "Decoded embed page"
        );

        Ok(decoded)
    }
}
