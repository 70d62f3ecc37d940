//! Listing, link lookup and decoding against the mock catalog.

use undertow_sources::{CatalogId, DecodeFailure, SourceError};

use crate::support::{EMPTY_MOVIE_ID, EPISODE_ID, Harness, MOVIE_ID};

#[tokio::test]
async fn test_movie_and_episode_listings() {
    let harness = Harness::start().await;
    let pipeline = harness.pipeline();

    let servers = pipeline
        .list_servers(&CatalogId::movie(MOVIE_ID).unwrap())
        .await
        .unwrap();
    let names: Vec<_> = servers.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(names, ["UpCloud", "MixDrop", "Vidcloud", "Voe"]);
    assert_eq!(
        servers[0].reference,
        format!("{}/ajax/episode/sources/9801", harness.catalog.uri())
    );

    let episode = pipeline
        .list_servers(&CatalogId::tv_episode(EPISODE_ID).unwrap())
        .await
        .unwrap();
    assert_eq!(episode.len(), 1);
    assert_eq!(episode[0].name, "UpCloud");
}

#[tokio::test]
async fn test_aggregate_keeps_only_working_servers() {
    let harness = Harness::start().await;
    let id = CatalogId::movie(MOVIE_ID).unwrap();

    let report = harness.pipeline().resolve_all_detailed(&id).await.unwrap();
    assert_eq!(report.outcomes.len(), 4);

    for (server, error) in report.failures() {
        match server {
            "MixDrop" => assert!(matches!(
                error,
                SourceError::Decode {
                    failure: DecodeFailure::Exited { code: Some(1), stderr },
                    ..
                } if stderr.contains("captcha")
            )),
            "Vidcloud" => assert!(matches!(
                error,
                SourceError::Decode {
                    failure: DecodeFailure::MalformedOutput { .. },
                    ..
                }
            )),
            "Voe" => assert!(matches!(error, SourceError::Upstream { .. })),
            other => panic!("unexpected failure for {other}: {error}"),
        }
    }

    let result = report.into_aggregate();
    assert_eq!(result.id, MOVIE_ID);
    assert_eq!(result.sources.len(), 1);

    let upcloud = &result.sources[0];
    assert_eq!(upcloud.server_name, "UpCloud");
    assert_eq!(upcloud.url, "https://cdn.example/a.m3u8");
    assert!(upcloud.is_m3u8);
    assert_eq!(upcloud.quality, "auto");
    assert_eq!(upcloud.subtitles.len(), 1);
    assert_eq!(upcloud.subtitles[0].label, "English");
    assert_eq!(upcloud.subtitles[0].is_default, Some(true));
}

#[tokio::test]
async fn test_single_server_errors_propagate() {
    let harness = Harness::start().await;
    let pipeline = harness.pipeline();
    let id = CatalogId::movie(MOVIE_ID).unwrap();

    let resolved = pipeline.resolve_one(&id, "upcloud").await.unwrap();
    assert_eq!(resolved.server_name, "UpCloud");

    assert!(matches!(
        pipeline.resolve_one(&id, "MixDrop").await,
        Err(SourceError::Decode { .. })
    ));
    assert!(matches!(
        pipeline.resolve_one(&id, "Streamtape").await,
        Err(SourceError::ServerNotFound { .. })
    ));
    assert!(matches!(
        pipeline.resolve_one(&id, "Voe").await,
        Err(SourceError::Upstream { .. })
    ));
}

#[tokio::test]
async fn test_empty_listing_is_not_an_error() {
    let harness = Harness::start().await;

    let result = harness
        .pipeline()
        .resolve_all(&CatalogId::movie(EMPTY_MOVIE_ID).unwrap())
        .await
        .unwrap();

    assert_eq!(result.id, EMPTY_MOVIE_ID);
    assert!(result.sources.is_empty());
}

#[tokio::test]
async fn test_unknown_catalog_id_fails_discovery() {
    let harness = Harness::start().await;

    let result = harness
        .pipeline()
        .resolve_all(&CatalogId::movie("424242").unwrap())
        .await;

    assert!(matches!(result, Err(SourceError::Upstream { .. })));
}
