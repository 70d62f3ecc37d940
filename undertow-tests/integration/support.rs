//! Shared harness: mock catalog site plus a shell decoder.

use std::path::PathBuf;
use std::time::Duration;

use serde_json::json;
use tempfile::TempDir;
use undertow_core::UndertowConfig;
use undertow_sources::SourcePipeline;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const MOVIE_ID: &str = "10283";
pub const EPISODE_ID: &str = "555";
pub const EMPTY_MOVIE_ID: &str = "777";

pub const UPCLOUD_EMBED: &str = "https://rabbitstream.example/upcloud/abc";
pub const MIXDROP_EMBED: &str = "https://mixdrop.example/mixdrop/xyz";
pub const GARBAGE_EMBED: &str = "https://vidcloud.example/garbage/1";

pub const MIXDROP_REFERRER: &str = "https://mixdrop.referrer.test";

/// Decoder stand-in. Behaviour is picked by a marker in the embed URL.
const DECODER_SCRIPT: &str = r#"#!/bin/sh
for arg in "$@"; do
  case "$arg" in
    --embed-url=*) url="${arg#--embed-url=}" ;;
    --referrer=*) ref="${arg#--referrer=}" ;;
  esac
done

case "$url" in
  *upcloud*)
    echo '{"sources":[{"file":"https://cdn.example/a.m3u8","type":"hls"},{"file":"https://cdn.example/b.mp4","type":"mp4"}],"tracks":[{"file":"https://cdn.example/en.vtt","label":"English","kind":"captions","default":true}],"t":0,"server":1}'
    ;;
  *mixdrop*)
    echo "blocked by captcha" >&2
    exit 1
    ;;
  *echo-referrer*)
    printf '{"sources":[{"file":"%s","type":"mp4"}],"tracks":[]}' "$ref"
    ;;
  *hang*)
    exec sleep 30
    ;;
  *)
    echo 'not json'
    ;;
esac
"#;

const MOVIE_LISTING: &str = r#"
<div class="detail_page-servers">
  <ul class="nav">
    <li class="nav-item"><a data-id="9801" title="Server UpCloud"><i class="fas fa-play"></i><span>UpCloud</span></a></li>
    <li class="nav-item"><a data-id="9802" title="Server MixDrop"><span>MixDrop</span></a></li>
    <li class="nav-item"><a data-id="9803" title="Server Vidcloud"><span>Vidcloud</span></a></li>
    <li class="nav-item"><a data-id="9804" title="Server Voe"><span>Voe</span></a></li>
  </ul>
</div>
"#;

const EPISODE_LISTING: &str = r#"
<ul class="nav">
  <li class="nav-item"><a data-id="9801" title="Server UpCloud"><span>UpCloud</span></a></li>
</ul>
"#;

const EMPTY_LISTING: &str = r#"<ul class="nav"></ul>"#;

/// Mock catalog, decoder script and matching configuration.
pub struct Harness {
    pub catalog: MockServer,
    pub config: UndertowConfig,
    _scripts: TempDir,
}

impl Harness {
    pub async fn start() -> Self {
        let catalog = MockServer::start().await;

        mount_html(&catalog, &format!("/ajax/episode/list/{MOVIE_ID}"), MOVIE_LISTING).await;
        mount_html(&catalog, &format!("/ajax/episode/servers/{EPISODE_ID}"), EPISODE_LISTING).await;
        mount_html(&catalog, &format!("/ajax/episode/list/{EMPTY_MOVIE_ID}"), EMPTY_LISTING).await;

        mount_link(&catalog, "9801", json!({ "link": UPCLOUD_EMBED })).await;
        mount_link(&catalog, "9802", json!({ "link": MIXDROP_EMBED })).await;
        mount_link(&catalog, "9803", json!({ "link": GARBAGE_EMBED })).await;
        mount_link(&catalog, "9804", json!({ "link": null })).await;

        let scripts = tempfile::tempdir().unwrap();
        let script = scripts.path().join("decoder.js");
        std::fs::write(&script, DECODER_SCRIPT).unwrap();

        let mut config = UndertowConfig::for_testing();
        config.upstream.base_url = catalog.uri();
        config.decoder.interpreter = Some("sh".to_string());
        config.decoder.candidates = vec![script];
        config.referrers.mixdrop = MIXDROP_REFERRER.to_string();

        Self {
            catalog,
            config,
            _scripts: scripts,
        }
    }

    pub fn pipeline(&self) -> SourcePipeline {
        SourcePipeline::from_config(&self.config).unwrap()
    }

    /// Pipeline whose decoder cannot be found anywhere.
    pub fn pipeline_without_decoder(&self) -> SourcePipeline {
        let mut config = self.config.clone();
        config.decoder.candidates = vec![PathBuf::from("/nonexistent/undertow/decoder.js")];
        SourcePipeline::from_config(&config).unwrap()
    }

    pub fn pipeline_with_decoder_timeout(&self, timeout: Duration) -> SourcePipeline {
        let mut config = self.config.clone();
        config.decoder.timeout = timeout;
        SourcePipeline::from_config(&config).unwrap()
    }
}

async fn mount_html(catalog: &MockServer, route: &str, body: &str) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(ResponseTemplate::new(200).set_body_string(body))
        .mount(catalog)
        .await;
}

async fn mount_link(catalog: &MockServer, server_id: &str, body: serde_json::Value) {
    Mock::given(method("GET"))
        .and(path(format!("/ajax/episode/sources/{server_id}")))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(catalog)
        .await;
}
