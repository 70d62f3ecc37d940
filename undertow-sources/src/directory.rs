//! Server discovery against the catalog site.

use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use undertow_core::UpstreamConfig;
use url::Url;

use crate::errors::SourceError;
use crate::types::{CatalogId, ServerDescriptor};

/// Path of the per-server endpoint that hands out embed links.
const SOURCES_PATH: &str = "ajax/episode/sources";
const TITLE_PREFIX: &str = "Server ";

/// Lists the servers offered for a catalog entry and exchanges a server
/// reference for its embed URL.
#[async_trait]
pub trait ServerDirectory: Send + Sync + std::fmt::Debug {
    /// Servers offered for `id`, in listing order.
    ///
    /// # Errors
    /// - `SourceError::Upstream` - Listing page could not be fetched or parsed
    async fn list_servers(&self, id: &CatalogId) -> Result<Vec<ServerDescriptor>, SourceError>;

    /// Redirect target for one discovered server.
    ///
    /// # Errors
    /// - `SourceError::Upstream` - Link endpoint failed or returned no usable link
    async fn resolve_embed_url(&self, server: &ServerDescriptor) -> Result<Url, SourceError>;
}

/// Response body of the per-server link endpoint.
#[derive(Debug, Deserialize)]
struct SourceLinkResponse {
    link: Option<String>,
}

/// Extracts server entries from the catalog's listing fragment.
#[derive(Debug, Clone)]
pub struct ListingParser {
    container: Regex,
    item: Regex,
    data_id: Regex,
    title: Regex,
    span: Regex,
    tag: Regex,
}

impl ListingParser {
    /// Compiles the listing patterns.
    ///
    /// # Errors
    /// - `regex::Error` - A pattern failed to compile
    pub fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            container: Regex::new(r#"(?is)<ul\b[^>]*\bclass\s*=\s*"[^"]*\bnav\b[^"]*""#)?,
            item: Regex::new(r#"(?is)<li\b[^>]*\bclass\s*=\s*"[^"]*\bnav-item\b[^"]*"[^>]*>(.*?)</li>"#)?,
            data_id: Regex::new(r#"(?is)<a\b[^>]*\bdata-id\s*=\s*"([^"]*)""#)?,
            title: Regex::new(r#"(?is)<a\b[^>]*\btitle\s*=\s*"([^"]*)""#)?,
            span: Regex::new(r"(?is)<span\b[^>]*>(.*?)</span>")?,
            tag: Regex::new(r"(?s)<[^>]*>")?,
        })
    }

    /// Parses a listing page into descriptors whose references point below `base_url`.
    ///
    /// Entries without a `data-id` are skipped; repeated ids keep their first entry.
    ///
    /// # Errors
    /// - `SourceError::Upstream` - The server list container is absent
    pub fn parse(&self, html: &str, base_url: &str) -> Result<Vec<ServerDescriptor>, SourceError> {
        if !self.container.is_match(html) {
            return Err(SourceError::upstream(
                "server listing container missing from catalog page",
            ));
        }

        let mut servers: Vec<ServerDescriptor> = Vec::new();
        for item in self.item.captures_iter(html) {
            let body = &item[1];

            let Some(id) = self
                .data_id
                .captures(body)
                .map(|caps| caps[1].trim().to_string())
                .filter(|id| !id.is_empty())
            else {
                tracing::debug!("Skipping server entry without data-id");
                continue;
            };

            if servers.iter().any(|server| server.id == id) {
                continue;
            }

            let name = self
                .span
                .captures(body)
                .map(|caps| self.text(&caps[1]))
                .filter(|name| !name.is_empty())
                .or_else(|| {
                    self.title
                        .captures(body)
                        .map(|caps| title_name(&self.text(&caps[1])).to_string())
                })
                .unwrap_or_default();

            servers.push(ServerDescriptor {
                reference: format!("{base_url}/{SOURCES_PATH}/{id}"),
                id,
                name,
            });
        }

        Ok(servers)
    }

    fn text(&self, fragment: &str) -> String {
        decode_entities(self.tag.replace_all(fragment, "").trim())
    }
}

/// Title attributes read "Server <name>"; the listing's span text is the bare name.
fn title_name(title: &str) -> &str {
    match title.get(..TITLE_PREFIX.len()) {
        Some(prefix) if prefix.eq_ignore_ascii_case(TITLE_PREFIX) => {
            title[TITLE_PREFIX.len()..].trim()
        }
        _ => title,
    }
}

fn decode_entities(text: &str) -> String {
    text.replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&")
}

/// Catalog-site implementation over HTTP.
///
/// The client carries base URL, user agent and timeout only, so one instance
/// serves any number of concurrent resolutions.
#[derive(Debug, Clone)]
pub struct HttpServerDirectory {
    client: reqwest::Client,
    base_url: String,
    parser: ListingParser,
}

impl HttpServerDirectory {
    /// Builds the HTTP client from upstream configuration.
    ///
    /// # Errors
    /// - `SourceError::Upstream` - Client or listing parser could not be built
    pub fn new(config: &UpstreamConfig) -> Result<Self, SourceError> {
        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.as_str())
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| SourceError::upstream(format!("failed to build HTTP client: {e}")))?;

        let parser = ListingParser::new()
            .map_err(|e| SourceError::upstream(format!("failed to build listing parser: {e}")))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            parser,
        })
    }

    fn listing_url(&self, id: &CatalogId) -> String {
        format!(
            "{}/{}/{}",
            self.base_url,
            id.kind().listing_path(),
            id.as_str()
        )
    }

    async fn get(&self, url: &str) -> Result<reqwest::Response, SourceError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| SourceError::upstream(format!("request to {url} failed: {e}")))?;

        if !response.status().is_success() {
            return Err(SourceError::upstream(format!(
                "catalog returned HTTP {} for {url}",
                response.status()
            )));
        }

        Ok(response)
    }
}

#[async_trait]
impl ServerDirectory for HttpServerDirectory {
    async fn list_servers(&self, id: &CatalogId) -> Result<Vec<ServerDescriptor>, SourceError> {
        let url = self.listing_url(id);
        let html = self
            .get(&url)
            .await?
            .text()
            .await
            .map_err(|e| SourceError::upstream(format!("failed to read listing for {id}: {e}")))?;

        let servers = self.parser.parse(&html, &self.base_url)?;
        tracing::debug!("Discovered {} servers for {}", servers.len(), id);
        Ok(servers)
    }

    async fn resolve_embed_url(&self, server: &ServerDescriptor) -> Result<Url, SourceError> {
        let body: SourceLinkResponse =
            self.get(&server.reference).await?.json().await.map_err(|e| {
                SourceError::upstream(format!(
                    "invalid link response for server \"{}\": {e}",
                    server.name
                ))
            })?;

        let link = body
            .link
            .map(|link| link.trim().to_string())
            .filter(|link| !link.is_empty())
            .ok_or_else(|| {
                SourceError::upstream(format!(
                    "No source link found for server \"{}\"",
                    server.name
                ))
            })?;

        Url::parse(&link).map_err(|e| {
            SourceError::upstream(format!(
                "server \"{}\" returned unusable link '{link}': {e}",
                server.name
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::types::ServerKind;

    const LISTING: &str = r#"
        <div class="detail_page-servers">
          <ul class="nav">
            <li class="nav-item">
              <a id="watch-9801" data-id="9801" data-linkid="9801"
                 class="nav-link btn btn-sm btn-secondary link-item" title="Server UpCloud">
                <i class="fas fa-play mr-2"></i><span>UpCloud</span>
              </a>
            </li>
            <li class="nav-item">
              <a data-id="9802" class="nav-link" title="Server MixDrop"><span>MixDrop</span></a>
            </li>
            <li class="nav-item">
              <a class="nav-link" title="Broken"><span>Broken</span></a>
            </li>
            <li class="nav-item">
              <a data-id="9801" class="nav-link"><span>UpCloud mirror</span></a>
            </li>
            <li class="nav-item">
              <a data-id="9803" class="nav-link" title="Server Vid &amp; Co"></a>
            </li>
          </ul>
        </div>"#;

    fn parser() -> ListingParser {
        ListingParser::new().unwrap()
    }

    fn config(base_url: &str) -> UpstreamConfig {
        UpstreamConfig {
            base_url: base_url.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_parse_listing() {
        let servers = parser().parse(LISTING, "https://site.example").unwrap();

        let names: Vec<&str> = servers.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, ["UpCloud", "MixDrop", "Vid & Co"]);
        assert_eq!(servers[0].id, "9801");
        assert_eq!(
            servers[1].reference,
            "https://site.example/ajax/episode/sources/9802"
        );
    }

    #[test]
    fn test_title_fallback_matches_span_names() {
        let html = r#"
            <ul class="nav">
              <li class="nav-item"><a data-id="1" title="Server UpCloud"><span> </span></a></li>
              <li class="nav-item"><a data-id="2" title="server MixDrop"></a></li>
              <li class="nav-item"><a data-id="3" title="Serverless"></a></li>
            </ul>"#;

        let servers = parser().parse(html, "https://site.example").unwrap();

        let names: Vec<&str> = servers.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, ["UpCloud", "MixDrop", "Serverless"]);
        assert_eq!(servers[0].kind(), ServerKind::UpCloud);
        assert_eq!(servers[1].kind(), ServerKind::MixDrop);
    }

    #[test]
    fn test_parse_empty_listing() {
        let servers = parser()
            .parse(r#"<ul class="nav nav-pills"></ul>"#, "https://site.example")
            .unwrap();
        assert!(servers.is_empty());
    }

    #[test]
    fn test_parse_without_container_is_upstream_error() {
        let result = parser().parse("<html><body>Cloudflare</body></html>", "https://s");
        assert!(matches!(result, Err(SourceError::Upstream { .. })));
    }

    #[tokio::test]
    async fn test_movie_and_tv_listing_endpoints() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/ajax/episode/list/10283"))
            .respond_with(ResponseTemplate::new(200).set_body_string(LISTING))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/ajax/episode/servers/77"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(r#"<ul class="nav"><li class="nav-item"><a data-id="5"><span>VidCloud</span></a></li></ul>"#),
            )
            .mount(&server)
            .await;

        let directory = HttpServerDirectory::new(&config(&server.uri())).unwrap();

        let movie = directory
            .list_servers(&CatalogId::movie("10283").unwrap())
            .await
            .unwrap();
        assert_eq!(movie.len(), 3);
        assert_eq!(
            movie[0].reference,
            format!("{}/ajax/episode/sources/9801", server.uri())
        );

        let episode = directory
            .list_servers(&CatalogId::tv_episode("77").unwrap())
            .await
            .unwrap();
        assert_eq!(episode.len(), 1);
        assert_eq!(episode[0].name, "VidCloud");
    }

    #[tokio::test]
    async fn test_listing_http_failure_is_upstream_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let directory = HttpServerDirectory::new(&config(&server.uri())).unwrap();
        let result = directory
            .list_servers(&CatalogId::movie("1").unwrap())
            .await;

        assert!(matches!(result, Err(SourceError::Upstream { reason }) if reason.contains("503")));
    }

    #[tokio::test]
    async fn test_resolve_embed_url() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/ajax/episode/sources/9801"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "type": "iframe",
                "link": "https://embed.example/e/abc?z=",
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/ajax/episode/sources/9802"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "type": "iframe",
                "link": "",
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/ajax/episode/sources/9803"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
            .mount(&server)
            .await;

        let directory = HttpServerDirectory::new(&config(&server.uri())).unwrap();
        let descriptor = |id: &str, name: &str| ServerDescriptor {
            id: id.to_string(),
            name: name.to_string(),
            reference: format!("{}/ajax/episode/sources/{id}", server.uri()),
        };

        let url = directory
            .resolve_embed_url(&descriptor("9801", "UpCloud"))
            .await
            .unwrap();
        assert_eq!(url.as_str(), "https://embed.example/e/abc?z=");

        let missing = directory
            .resolve_embed_url(&descriptor("9802", "MixDrop"))
            .await;
        assert!(
            matches!(missing, Err(SourceError::Upstream { reason }) if reason.contains("No source link"))
        );

        let garbage = directory
            .resolve_embed_url(&descriptor("9803", "Voe"))
            .await;
        assert!(matches!(garbage, Err(SourceError::Upstream { .. })));
    }
}
