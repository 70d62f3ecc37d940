//! Decoder process contract through the public pipeline.

use std::time::Duration;

use undertow_sources::{CatalogId, DecodeFailure, SourceError};

use crate::support::{Harness, MIXDROP_REFERRER, MOVIE_ID};

#[tokio::test]
async fn test_server_family_referrer_reaches_decoder() {
    let harness = Harness::start().await;

    let resolved = harness
        .pipeline()
        .resolve_embed(
            &CatalogId::movie(MOVIE_ID).unwrap(),
            "https://cdn.example/echo-referrer",
            "MixDrop",
        )
        .await
        .unwrap();

    assert_eq!(resolved.url, MIXDROP_REFERRER);
    assert_eq!(resolved.server_name, "MixDrop");
    assert!(!resolved.is_m3u8);
}

#[tokio::test]
async fn test_hung_decoder_is_killed() {
    let harness = Harness::start().await;
    let pipeline = harness.pipeline_with_decoder_timeout(Duration::from_millis(300));

    let id = CatalogId::movie(MOVIE_ID).unwrap();

    let started = std::time::Instant::now();
    let result = pipeline
        .resolve_embed(&id, "https://slow.example/hang", "UpCloud")
        .await;

    assert!(matches!(
        result,
        Err(SourceError::Decode {
            failure: DecodeFailure::TimedOut { .. },
            ..
        })
    ));
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[tokio::test]
async fn test_missing_decoder() {
    let harness = Harness::start().await;
    let pipeline = harness.pipeline_without_decoder();
    let id = CatalogId::movie(MOVIE_ID).unwrap();

    let single = pipeline.resolve_one(&id, "UpCloud").await;
    assert!(matches!(single, Err(SourceError::DecoderNotFound { .. })));

    let all = pipeline.resolve_all(&id).await.unwrap();
    assert!(all.sources.is_empty());
}
