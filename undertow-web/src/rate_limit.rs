//! Per-client request rate limiting keyed by peer IP.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::num::NonZeroU32;
use std::sync::Arc;

use axum::Json;
use axum::extract::{ConnectInfo, Request, State};
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use governor::clock::DefaultClock;
use governor::state::keyed::DefaultKeyedStateStore;
use governor::{Quota, RateLimiter};
use serde_json::json;

const FALLBACK_PER_MINUTE: NonZeroU32 = NonZeroU32::new(100).unwrap();

/// Requests served without connection info share one bucket.
const UNKNOWN_PEER: IpAddr = IpAddr::V4(Ipv4Addr::UNSPECIFIED);

/// A shared rate limiter instance.
pub type SharedLimiter = Arc<RateLimiter<IpAddr, DefaultKeyedStateStore<IpAddr>, DefaultClock>>;

/// Creates a limiter allowing `requests_per_minute` per client, with bursts up to the same amount.
pub fn create_limiter(requests_per_minute: u32) -> SharedLimiter {
    let quota =
        Quota::per_minute(NonZeroU32::new(requests_per_minute).unwrap_or(FALLBACK_PER_MINUTE));
    Arc::new(RateLimiter::keyed(quota))
}

fn peer_ip(request: &Request) -> IpAddr {
    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map_or(UNKNOWN_PEER, |ConnectInfo(addr)| addr.ip())
}

/// Answers 429 once the calling client's budget is exhausted.
pub async fn rate_limit(
    State(limiter): State<SharedLimiter>,
    request: Request,
    next: Next,
) -> Response {
    let peer = peer_ip(&request);
    if limiter.check_key(&peer).is_err() {
        tracing::debug!(%peer, path = %request.uri().path(), "Rate limit exceeded");
        let body = json!({
            "error": "Too many requests, please try again later.",
            "code": "rate_limited",
        });
        return (StatusCode::TOO_MANY_REQUESTS, Json(body)).into_response();
    }

    next.run(request).await
}
