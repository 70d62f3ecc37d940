//! Single-server resolution: listing entry → redirect link → decoded sources.

use std::sync::Arc;

use url::Url;

use crate::directory::ServerDirectory;
use crate::errors::SourceError;
use crate::extractor::SourceExtractor;
use crate::types::{CatalogId, ResolvedSource, ServerDescriptor, ServerKind};

/// Which server to resolve.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerSelector {
    /// Display name, matched case-insensitively against the listing.
    Name(String),
    /// Embed URL the caller already holds; skips the directory entirely.
    EmbedUrl { url: Url, server_name: String },
}

impl ServerSelector {
    /// Selector for a server display name.
    ///
    /// # Errors
    /// - `SourceError::Validation` - Name is empty
    pub fn name(raw: &str) -> Result<Self, SourceError> {
        let name = raw.trim();
        if name.is_empty() {
            return Err(SourceError::validation("server", "server name is required"));
        }
        Ok(ServerSelector::Name(name.to_string()))
    }

    /// Selector for a known embed URL served by `server_name`.
    ///
    /// # Errors
    /// - `SourceError::Validation` - URL does not parse
    pub fn embed_url(raw: &str, server_name: &str) -> Result<Self, SourceError> {
        let url = Url::parse(raw.trim())
            .map_err(|e| SourceError::validation("embed url", format!("'{raw}': {e}")))?;
        Ok(ServerSelector::EmbedUrl {
            url,
            server_name: server_name.trim().to_string(),
        })
    }

    /// Server name the selector refers to.
    pub fn server_name(&self) -> &str {
        match self {
            ServerSelector::Name(name) => name,
            ServerSelector::EmbedUrl { server_name, .. } => server_name,
        }
    }
}

/// Resolves one server end to end.
#[derive(Debug, Clone)]
pub struct SourceResolver {
    directory: Arc<dyn ServerDirectory>,
    extractor: SourceExtractor,
}

impl SourceResolver {
    pub fn new(directory: Arc<dyn ServerDirectory>, extractor: SourceExtractor) -> Self {
        Self {
            directory,
            extractor,
        }
    }

    pub fn directory(&self) -> &Arc<dyn ServerDirectory> {
        &self.directory
    }

    /// Looks up `name` in the listing for `id`.
    ///
    /// # Errors
    /// - `SourceError::Upstream` - Listing could not be fetched
    /// - `SourceError::ServerNotFound` - No server carries that name
    pub async fn find_server(
        &self,
        id: &CatalogId,
        name: &str,
    ) -> Result<ServerDescriptor, SourceError> {
        let wanted = name.trim().to_lowercase();

        self.directory
            .list_servers(id)
            .await?
            .into_iter()
            .find(|server| server.name.to_lowercase() == wanted)
            .ok_or_else(|| SourceError::ServerNotFound {
                server: name.trim().to_string(),
            })
    }

    /// Resolves the server chosen by `selector`.
    ///
    /// # Errors
    /// Any [`SourceError`] raised along the way, unchanged.
    pub async fn resolve(
        &self,
        id: &CatalogId,
        selector: &ServerSelector,
    ) -> Result<ResolvedSource, SourceError> {
        match selector {
            ServerSelector::Name(name) => {
                let server = self.find_server(id, name).await?;
                self.resolve_descriptor(&server).await
            }
            ServerSelector::EmbedUrl { url, server_name } => {
                tracing::debug!(%id, server = %server_name, "Decoding caller-supplied embed URL");
                self.decode(server_name, ServerKind::from_name(server_name), url.as_str())
                    .await
            }
        }
    }

    /// Resolves an already discovered server.
    ///
    /// # Errors
    /// - `SourceError::Upstream` - Link endpoint failed
    /// - `SourceError::DecoderNotFound` / `SourceError::Decode` - Decoding failed
    /// - `SourceError::NoSources` - Decoder found nothing
    pub async fn resolve_descriptor(
        &self,
        server: &ServerDescriptor,
    ) -> Result<ResolvedSource, SourceError> {
        let embed_url = self.directory.resolve_embed_url(server).await?;
        tracing::debug!(server = %server.name, %embed_url, "Resolved embed link");

        self.decode(&server.name, server.kind(), embed_url.as_str())
            .await
    }

    async fn decode(
        &self,
        server_name: &str,
        kind: ServerKind,
        embed_url: &str,
    ) -> Result<ResolvedSource, SourceError> {
        let decoded = self.extractor.extract(kind, embed_url, None).await?;
        ResolvedSource::from_embed_sources(server_name, embed_url, decoded)
    }
}

#[cfg(test)]
mod tests {
    use undertow_core::ReferrerConfig;

    use super::*;
    use crate::testing::{ScriptedDecoder, StaticDirectory};

    fn resolver(directory: StaticDirectory, decoder: Arc<ScriptedDecoder>) -> SourceResolver {
        SourceResolver::new(
            Arc::new(directory),
            SourceExtractor::new(decoder, ReferrerConfig::default()),
        )
    }

    fn movie() -> CatalogId {
        CatalogId::movie("10283").unwrap()
    }

    #[tokio::test]
    async fn test_name_match_is_case_insensitive() {
        let decoder = Arc::new(
            ScriptedDecoder::new().with_sources("https://embed.example/up", &[("a.m3u8", "hls")]),
        );
        let resolver = resolver(
            StaticDirectory::new().with_server("1", "UpCloud", "https://embed.example/up"),
            decoder,
        );

        let resolved = resolver
            .resolve(&movie(), &ServerSelector::name("  upcloud ").unwrap())
            .await
            .unwrap();

        assert_eq!(resolved.server_name, "UpCloud");
        assert_eq!(resolved.url, "a.m3u8");
        assert!(resolved.is_m3u8);
    }

    #[tokio::test]
    async fn test_unknown_name_is_server_not_found() {
        let decoder = Arc::new(ScriptedDecoder::new());
        let resolver = resolver(
            StaticDirectory::new().with_server("1", "UpCloud", "https://embed.example/up"),
            decoder.clone(),
        );

        let result = resolver
            .resolve(&movie(), &ServerSelector::name("Voe").unwrap())
            .await;

        assert!(matches!(
            result,
            Err(SourceError::ServerNotFound { server }) if server == "Voe"
        ));
        assert!(decoder.calls().is_empty());
    }

    #[tokio::test]
    async fn test_embed_url_fast_path_skips_directory() {
        let directory = StaticDirectory::new();
        let decoder = Arc::new(
            ScriptedDecoder::new().with_sources("https://embed.example/mx", &[("b.mp4", "mp4")]),
        );
        let directory = Arc::new(directory);
        let resolver = SourceResolver::new(
            directory.clone(),
            SourceExtractor::new(decoder, ReferrerConfig::default()),
        );

        let resolved = resolver
            .resolve(
                &movie(),
                &ServerSelector::embed_url("https://embed.example/mx", "MixDrop").unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(resolved.url, "b.mp4");
        assert!(!resolved.is_m3u8);
        assert_eq!(directory.list_calls(), 0);
    }

    #[tokio::test]
    async fn test_missing_link_propagates_upstream_error() {
        let decoder = Arc::new(ScriptedDecoder::new());
        let resolver = resolver(
            StaticDirectory::new().with_unlinked_server("2", "MixDrop"),
            decoder,
        );

        let result = resolver
            .resolve(&movie(), &ServerSelector::name("MixDrop").unwrap())
            .await;

        assert!(matches!(result, Err(SourceError::Upstream { .. })));
    }

    #[tokio::test]
    async fn test_empty_decoder_output_is_no_sources() {
        let decoder = Arc::new(
            ScriptedDecoder::new()
                .with_stdout("https://embed.example/up", r#"{"sources":[],"tracks":[]}"#),
        );
        let resolver = resolver(
            StaticDirectory::new().with_server("1", "UpCloud", "https://embed.example/up"),
            decoder,
        );

        let result = resolver
            .resolve(&movie(), &ServerSelector::name("UpCloud").unwrap())
            .await;

        assert!(matches!(result, Err(SourceError::NoSources { .. })));
    }

    #[test]
    fn test_selector_validation() {
        assert!(matches!(
            ServerSelector::name("   "),
            Err(SourceError::Validation { field: "server", .. })
        ));
        assert!(ServerSelector::embed_url("not a url", "UpCloud").is_err());
    }
}
