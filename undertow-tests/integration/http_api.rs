//! API router over the real pipeline.

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use tower::ServiceExt;
use undertow_web::{AppState, build_router};

use crate::support::{EMPTY_MOVIE_ID, EPISODE_ID, Harness, MOVIE_ID};

fn router(harness: &Harness) -> Router {
    build_router(
        AppState {
            pipeline: harness.pipeline(),
        },
        harness.config.web.requests_per_minute,
    )
}

async fn get_json(app: Router, uri: &str) -> (StatusCode, serde_json::Value) {
    let response = app
        .oneshot(Request::get(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    (status, serde_json::from_slice(&bytes).unwrap())
}

#[tokio::test]
async fn test_embed_all_returns_partial_results() {
    let harness = Harness::start().await;

    let (status, json) = get_json(router(&harness), &format!("/movie/embed/{MOVIE_ID}")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["id"], MOVIE_ID);
    assert_eq!(json["sources"].as_array().unwrap().len(), 1);
    assert_eq!(json["sources"][0]["serverName"], "UpCloud");
    assert_eq!(json["sources"][0]["isM3U8"], true);
    assert_eq!(json["sources"][0]["subtitles"][0]["default"], true);
}

#[tokio::test]
async fn test_embed_one_status_codes() {
    let harness = Harness::start().await;
    let app = router(&harness);
    let base = format!("/movie/embed/{MOVIE_ID}/server");

    let (status, json) = get_json(app.clone(), &format!("{base}?server=UpCloud")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["url"], "https://cdn.example/a.m3u8");

    let (status, json) = get_json(app.clone(), &format!("{base}?server=MixDrop")).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(json["code"], "decode_error");
    assert!(json["error"].as_str().unwrap().contains("captcha"));

    let (status, _) = get_json(app.clone(), &format!("{base}?server=Streamtape")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = get_json(app, &base).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_server_listing_routes() {
    let harness = Harness::start().await;
    let app = router(&harness);

    let (status, json) = get_json(app.clone(), &format!("/tv/servers/{EPISODE_ID}")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json[0]["name"], "UpCloud");
    assert_eq!(json[0]["id"], "9801");

    let (status, json) = get_json(app, &format!("/movie/servers/{EMPTY_MOVIE_ID}")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["code"], "no_servers");
}
