//! Aggregation pipeline: list servers, resolve them concurrently, keep the successes.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tracing::{info, warn};
use undertow_core::{ResolutionConfig, UndertowConfig};

use crate::decoder::ProcessDecoder;
use crate::directory::{HttpServerDirectory, ServerDirectory};
use crate::errors::SourceError;
use crate::extractor::SourceExtractor;
use crate::resolver::{ServerSelector, SourceResolver};
use crate::types::{
    AggregateResult, CatalogId, ResolutionOutcome, ResolutionReport, ResolvedSource,
    ServerDescriptor,
};

/// Entry point for callers: single-server and all-servers resolution.
///
/// One failing server never affects the others in all-servers mode. Every
/// resolution is bounded by the configured timeout.
#[derive(Debug, Clone)]
pub struct SourcePipeline {
    resolver: Arc<SourceResolver>,
    resolution_timeout: Duration,
}

impl SourcePipeline {
    pub fn new(resolver: SourceResolver, config: &ResolutionConfig) -> Self {
        Self {
            resolver: Arc::new(resolver),
            resolution_timeout: config.timeout,
        }
    }

    /// Wires the HTTP directory and the process decoder from configuration.
    ///
    /// # Errors
    /// - `SourceError::Upstream` - HTTP client could not be built
    pub fn from_config(config: &UndertowConfig) -> Result<Self, SourceError> {
        let directory: Arc<dyn ServerDirectory> =
            Arc::new(HttpServerDirectory::new(&config.upstream)?);
        let decoder = Arc::new(ProcessDecoder::new(&config.decoder));
        let extractor = SourceExtractor::new(decoder, config.referrers.clone());

        Ok(Self::new(
            SourceResolver::new(directory, extractor),
            &config.resolution,
        ))
    }

    /// Servers currently offered for `id`.
    ///
    /// # Errors
    /// - `SourceError::Upstream` - Listing could not be fetched or parsed
    pub async fn list_servers(&self, id: &CatalogId) -> Result<Vec<ServerDescriptor>, SourceError> {
        self.resolver.directory().list_servers(id).await
    }

    /// Resolves the server chosen by `selector`, bounded by the resolution timeout.
    ///
    /// # Errors
    /// - `SourceError::Timeout` - Resolution exceeded its budget
    /// - Any other [`SourceError`] from listing, link lookup or decoding
    pub async fn resolve(
        &self,
        id: &CatalogId,
        selector: &ServerSelector,
    ) -> Result<ResolvedSource, SourceError> {
        self.bounded(selector.server_name(), self.resolver.resolve(id, selector))
            .await
    }

    /// Resolves the server named `server_name` for `id`.
    ///
    /// # Errors
    /// - `SourceError::Validation` - Server name is empty
    /// - `SourceError::ServerNotFound` - Listing has no such server
    /// - `SourceError::Timeout` - Resolution exceeded its budget
    /// - Any other [`SourceError`] from listing, link lookup or decoding
    pub async fn resolve_one(
        &self,
        id: &CatalogId,
        server_name: &str,
    ) -> Result<ResolvedSource, SourceError> {
        self.resolve(id, &ServerSelector::name(server_name)?).await
    }

    /// Resolves an embed URL the caller already holds for `id`, skipping discovery.
    ///
    /// # Errors
    /// - `SourceError::Validation` - URL does not parse
    /// - `SourceError::Timeout` - Resolution exceeded its budget
    /// - Any decoding [`SourceError`]
    pub async fn resolve_embed(
        &self,
        id: &CatalogId,
        embed_url: &str,
        server_name: &str,
    ) -> Result<ResolvedSource, SourceError> {
        self.resolve(id, &ServerSelector::embed_url(embed_url, server_name)?)
            .await
    }

    /// Resolves every listed server and reports each outcome.
    ///
    /// # Errors
    /// - `SourceError::Upstream` - Listing itself failed; per-server failures
    ///   are carried in the report instead
    pub async fn resolve_all_detailed(
        &self,
        id: &CatalogId,
    ) -> Result<ResolutionReport, SourceError> {
        let servers = self.list_servers(id).await?;
        info!("Resolving {} servers for {}", servers.len(), id);

        let resolutions = servers.iter().map(|server| async move {
            let result = self
                .bounded(&server.name, self.resolver.resolve_descriptor(server))
                .await;

            if let Err(error) = &result {
                warn!(server = %server.name, code = error.code(), "Server resolution failed: {error}");
            }

            ResolutionOutcome {
                server_name: server.name.clone(),
                result,
            }
        });

        let outcomes = join_all(resolutions).await;
        let report = ResolutionReport {
            id: id.clone(),
            outcomes,
        };

        info!(
            "Resolved {}/{} servers for {}",
            report.outcomes.iter().filter(|o| o.is_success()).count(),
            report.outcomes.len(),
            id
        );

        Ok(report)
    }

    /// Resolves every listed server, dropping the ones that failed.
    ///
    /// An empty `sources` list means no server succeeded; it is not an error.
    ///
    /// # Errors
    /// - `SourceError::Upstream` - Listing itself failed
    pub async fn resolve_all(&self, id: &CatalogId) -> Result<AggregateResult, SourceError> {
        Ok(self.resolve_all_detailed(id).await?.into_aggregate())
    }

    async fn bounded<F>(&self, server_name: &str, resolution: F) -> Result<ResolvedSource, SourceError>
    where
        F: Future<Output = Result<ResolvedSource, SourceError>>,
    {
        match tokio::time::timeout(self.resolution_timeout, resolution).await {
            Ok(result) => result,
            Err(_) => Err(SourceError::Timeout {
                server: server_name.to_string(),
                after: self.resolution_timeout,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use undertow_core::ReferrerConfig;

    use super::*;
    use crate::errors::DecodeFailure;
    use crate::testing::{ScriptedDecoder, ScriptedResponse, StaticDirectory, sources_json};

    const UPCLOUD_EMBED: &str = "https://rabbitstream.example/embed-4/abc";
    const MIXDROP_EMBED: &str = "https://mixdrop.example/e/xyz";

    fn pipeline(directory: StaticDirectory, decoder: ScriptedDecoder) -> SourcePipeline {
        pipeline_with_timeout(directory, decoder, Duration::from_secs(5))
    }

    fn pipeline_with_timeout(
        directory: StaticDirectory,
        decoder: ScriptedDecoder,
        timeout: Duration,
    ) -> SourcePipeline {
        let extractor = SourceExtractor::new(Arc::new(decoder), ReferrerConfig::default());
        SourcePipeline::new(
            SourceResolver::new(Arc::new(directory), extractor),
            &ResolutionConfig { timeout },
        )
    }

    fn two_servers() -> StaticDirectory {
        StaticDirectory::new()
            .with_server("9801", "UpCloud", UPCLOUD_EMBED)
            .with_server("9802", "MixDrop", MIXDROP_EMBED)
    }

    fn movie() -> CatalogId {
        CatalogId::movie("10283").unwrap()
    }

    #[tokio::test]
    async fn test_all_servers_succeed() {
        let decoder = ScriptedDecoder::new()
            .with_stdout(
                UPCLOUD_EMBED,
                r#"{"sources":[{"file":"https://cdn.example/a.m3u8","type":"hls"}],
                    "tracks":[{"file":"https://cdn.example/en.vtt","label":"English","kind":"captions","default":true}],
                    "t":0,"server":1}"#,
            )
            .with_sources(MIXDROP_EMBED, &[("https://cdn.example/b.mp4", "mp4")]);

        let result = pipeline(two_servers(), decoder)
            .resolve_all(&movie())
            .await
            .unwrap();

        assert_eq!(result.id, "10283");
        assert_eq!(result.sources.len(), 2);

        let upcloud = result
            .sources
            .iter()
            .find(|s| s.server_name == "UpCloud")
            .unwrap();
        assert_eq!(upcloud.url, "https://cdn.example/a.m3u8");
        assert!(upcloud.is_m3u8);
        assert_eq!(upcloud.quality, "auto");
        assert_eq!(upcloud.subtitles.len(), 1);
        assert_eq!(upcloud.subtitles[0].is_default, Some(true));

        let mixdrop = result
            .sources
            .iter()
            .find(|s| s.server_name == "MixDrop")
            .unwrap();
        assert_eq!(mixdrop.url, "https://cdn.example/b.mp4");
        assert!(!mixdrop.is_m3u8);
    }

    #[tokio::test]
    async fn test_failing_server_is_isolated() {
        let decoder = ScriptedDecoder::new()
            .with_sources(UPCLOUD_EMBED, &[("https://cdn.example/a.m3u8", "hls")])
            .with_exit(MIXDROP_EMBED, 2, "captcha wall");

        let pipeline = pipeline(two_servers(), decoder);
        let report = pipeline.resolve_all_detailed(&movie()).await.unwrap();

        let failures: Vec<_> = report.failures().collect();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].0, "MixDrop");
        assert!(matches!(
            failures[0].1,
            SourceError::Decode {
                failure: DecodeFailure::Exited { code: Some(2), .. },
                ..
            }
        ));

        let aggregate = report.into_aggregate();
        assert_eq!(aggregate.sources.len(), 1);
        assert_eq!(aggregate.sources[0].server_name, "UpCloud");
    }

    #[tokio::test]
    async fn test_all_failures_yield_empty_sources() {
        let decoder = ScriptedDecoder::new()
            .with_stdout(UPCLOUD_EMBED, "not json")
            .with_stdout(MIXDROP_EMBED, r#"{"sources":[],"tracks":[]}"#);

        let result = pipeline(two_servers(), decoder)
            .resolve_all(&movie())
            .await
            .unwrap();

        assert_eq!(result.id, "10283");
        assert!(result.sources.is_empty());
    }

    #[tokio::test]
    async fn test_empty_listing_yields_empty_sources() {
        let result = pipeline(StaticDirectory::new(), ScriptedDecoder::new())
            .resolve_all(&movie())
            .await
            .unwrap();

        assert!(result.sources.is_empty());
    }

    #[tokio::test]
    async fn test_listing_failure_fails_aggregate() {
        let result = pipeline(StaticDirectory::failing("503"), ScriptedDecoder::new())
            .resolve_all(&movie())
            .await;

        assert!(matches!(result, Err(SourceError::Upstream { .. })));
    }

    #[tokio::test]
    async fn test_resolutions_run_concurrently() {
        let delay = Duration::from_millis(300);
        let decoder = ScriptedDecoder::new()
            .with_response(
                UPCLOUD_EMBED,
                ScriptedResponse::Delayed {
                    delay,
                    stdout: sources_json(&[("a.m3u8", "hls")]),
                },
            )
            .with_response(
                MIXDROP_EMBED,
                ScriptedResponse::Delayed {
                    delay,
                    stdout: sources_json(&[("b.mp4", "mp4")]),
                },
            );

        let started = std::time::Instant::now();
        let result = pipeline(two_servers(), decoder)
            .resolve_all(&movie())
            .await
            .unwrap();

        assert_eq!(result.sources.len(), 2);
        assert!(started.elapsed() < delay * 2);
    }

    #[tokio::test]
    async fn test_hung_server_times_out_without_blocking_others() {
        let decoder = ScriptedDecoder::new()
            .with_sources(UPCLOUD_EMBED, &[("a.m3u8", "hls")])
            .with_hang(MIXDROP_EMBED);

        let pipeline =
            pipeline_with_timeout(two_servers(), decoder, Duration::from_millis(200));
        let report = pipeline.resolve_all_detailed(&movie()).await.unwrap();

        let failures: Vec<_> = report.failures().collect();
        assert_eq!(failures.len(), 1);
        assert!(matches!(
            failures[0].1,
            SourceError::Timeout { server, .. } if server == "MixDrop"
        ));

        let names: HashSet<_> = report
            .into_aggregate()
            .sources
            .into_iter()
            .map(|s| s.server_name)
            .collect();
        assert_eq!(names, HashSet::from(["UpCloud".to_string()]));
    }

    #[tokio::test]
    async fn test_resolve_one_by_name() {
        let decoder = ScriptedDecoder::new()
            .with_sources(MIXDROP_EMBED, &[("https://cdn.example/b.mp4", "mp4")]);

        let resolved = pipeline(two_servers(), decoder)
            .resolve_one(&movie(), "mixdrop")
            .await
            .unwrap();

        assert_eq!(resolved.server_name, "MixDrop");
        assert_eq!(resolved.url, "https://cdn.example/b.mp4");
        assert!(!resolved.is_m3u8);
    }

    #[tokio::test]
    async fn test_resolve_one_propagates_errors() {
        let pipeline = pipeline(
            two_servers(),
            ScriptedDecoder::new().with_exit(UPCLOUD_EMBED, 1, "boom"),
        );

        assert!(matches!(
            pipeline.resolve_one(&movie(), "").await,
            Err(SourceError::Validation { .. })
        ));
        assert!(matches!(
            pipeline.resolve_one(&movie(), "Voe").await,
            Err(SourceError::ServerNotFound { .. })
        ));
        assert!(matches!(
            pipeline.resolve_one(&movie(), "UpCloud").await,
            Err(SourceError::Decode { .. })
        ));
    }

    #[tokio::test]
    async fn test_resolve_embed_skips_discovery() {
        let decoder = Arc::new(
            ScriptedDecoder::new().with_sources(MIXDROP_EMBED, &[("b.mp4", "mp4")]),
        );
        let directory = Arc::new(two_servers());
        let referrers = ReferrerConfig::default();
        let pipeline = SourcePipeline::new(
            SourceResolver::new(
                directory.clone(),
                SourceExtractor::new(decoder.clone(), referrers.clone()),
            ),
            &ResolutionConfig::default(),
        );

        let resolved = pipeline
            .resolve_embed(&movie(), MIXDROP_EMBED, "MixDrop")
            .await
            .unwrap();

        assert_eq!(resolved.url, "b.mp4");
        assert_eq!(resolved.server_name, "MixDrop");
        assert_eq!(decoder.calls()[0].referrer, referrers.mixdrop);
        assert_eq!(directory.list_calls(), 0);
    }

    #[tokio::test]
    async fn test_resolve_embed_rejects_bad_url() {
        let result = pipeline(two_servers(), ScriptedDecoder::new())
            .resolve_embed(&movie(), "not a url", "UpCloud")
            .await;

        assert!(matches!(result, Err(SourceError::Validation { .. })));
    }

    #[tokio::test]
    async fn test_mp4_source_with_default_caption() {
        let stdout = r#"{"sources":[{"file":"b.mp4","type":"mp4"}],
            "tracks":[{"file":"cap.vtt","label":"EN","kind":"captions","default":true}]}"#;
        let decoder = ScriptedDecoder::new().with_stdout(MIXDROP_EMBED, stdout);
        let directory = StaticDirectory::new().with_server("9802", "MixDrop", MIXDROP_EMBED);

        let result = pipeline(directory, decoder)
            .resolve_all(&movie())
            .await
            .unwrap();

        assert_eq!(result.sources.len(), 1);
        let source = &result.sources[0];
        assert_eq!(source.server_name, "MixDrop");
        assert_eq!(source.url, "b.mp4");
        assert!(!source.is_m3u8);
        assert_eq!(source.quality, "auto");
        assert_eq!(source.subtitles.len(), 1);
        assert_eq!(source.subtitles[0].file, "cap.vtt");
        assert_eq!(source.subtitles[0].label, "EN");
        assert_eq!(source.subtitles[0].is_default, Some(true));
    }
}
