//! The request gatekeeper
//!
//! Runs as middleware in front of every route. Per request, in order:
//! passthrough paths are admitted untouched, statically blocked ranges and
//! active dynamic blocks are rejected with 403, limiter violations create a
//! dynamic block and answer 429, and everything else is admitted with a
//! deduplicated new-visitor notification. Enrichment and notification run
//! on detached tasks so the request path never waits on a third-party call.

pub mod blocklist;
pub mod rate_limit;
pub mod ua;

use std::net::{IpAddr, SocketAddr};
use std::time::Instant;

use axum::{
    extract::{ConnectInfo, Request, State},
    http::{header, HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use tracing::info;

use crate::geo::GeoRecord;
use crate::routes::{pages, AppState};

/// The client address resolved for a request, stored in request extensions
/// so handlers behind the gatekeeper can reuse it.
#[derive(Debug, Clone)]
pub struct ClientAddr(pub String);

/// Gatekeeper middleware, applied to all routes.
pub async fn gatekeeper(State(state): State<AppState>, mut req: Request, next: Next) -> Response {
    let path = req.uri().path().to_string();
    if state
        .config
        .passthrough_prefixes
        .iter()
        .any(|p| path.starts_with(p))
    {
        return next.run(req).await;
    }

    let peer = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ci| ci.0);
    let addr = client_ip(req.headers(), peer);

    // Static ranges short-circuit everything: hard rejection, no state
    // touched, no notification.
    if let Ok(ip) = addr.parse::<IpAddr>() {
        if state.registry.in_static_range(ip) {
            return StatusCode::FORBIDDEN.into_response();
        }
    }

    let now = Instant::now();
    if state.registry.is_blocked(&addr, now) {
        return StatusCode::FORBIDDEN.into_response();
    }

    req.extensions_mut().insert(ClientAddr(addr.clone()));

    let count = state.limiter.observe(&addr, now);
    if count > state.config.max_requests {
        state.registry.block(&addr, now);
        // Start over with an empty window once the block lapses.
        state.limiter.forget(&addr);
        info!(%addr, count, "rate limit exceeded, address blocked");

        let task_state = state.clone();
        let task_addr = addr.clone();
        let window_secs = state.config.window_secs();
        tokio::spawn(async move {
            let geo = task_state.geo.lookup(&task_addr).await;
            task_state
                .notifier
                .dispatch(blocked_message(&task_addr, &geo, count, window_secs));
        });

        return pages::rate_limited_response(state.config.block_duration.as_secs());
    }

    if path != "/log" {
        let families = ua::classify(
            req.headers()
                .get(header::USER_AGENT)
                .and_then(|v| v.to_str().ok())
                .unwrap_or(""),
        );
        // Consecutive repeats of the same summary collapse to one send via
        // the notifier's content dedup, which is why the text carries no
        // timestamp.
        state
            .notifier
            .dispatch(visitor_message(&addr, families, &path));
    }

    next.run(req).await
}

/// The client-identifying address: first entry of the forwarding header
/// when present, otherwise the transport peer.
pub fn client_ip(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .or_else(|| peer.map(|p| p.ip().to_string()))
        .unwrap_or_else(|| "unknown".to_string())
}

fn blocked_message(addr: &str, geo: &GeoRecord, count: usize, window_secs: u64) -> String {
    format!(
        "🚫 Address blocked for exceeding the rate limit\n\
         🕒 Time: {}\n\
         📡 IP: <code>{}</code>\n\
         🌍 Country: {}\n\
         🏙 City: {}\n\
         🏢 ISP: {}\n\
         📝 Requests in {}s: {}",
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
        addr,
        geo.country(),
        geo.city(),
        geo.isp(),
        window_secs,
        count,
    )
}

fn visitor_message(addr: &str, families: ua::UaFamilies, path: &str) -> String {
    format!(
        "🌐 New visitor\n\
         📡 IP: {}\n\
         🖥 OS: {}\n\
         🌍 Browser: {}\n\
         📍 Page: {}",
        addr, families.os, families.browser, path,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::guard::blocklist::StaticRange;
    use crate::routes::{self, AppState};
    use axum::body::Body;
    use std::num::NonZeroUsize;
    use std::time::Duration;
    use tower::ServiceExt;

    fn test_config() -> Config {
        Config {
            host: "127.0.0.1".to_string(),
            port: 0,
            max_requests: 3,
            window: Duration::from_secs(60),
            block_duration: Duration::from_secs(1800),
            notify_min_interval: Duration::from_millis(10),
            blocked_ranges: vec![StaticRange::parse("104.16.0.0-104.31.255.255").unwrap()],
            passthrough_prefixes: vec!["/static/".to_string(), "/health".to_string()],
            telegram: None,
            telegram_api_base: "http://127.0.0.1:1".to_string(),
            geo_api_base: "http://127.0.0.1:1".to_string(),
            geo_cache_capacity: NonZeroUsize::new(16).unwrap(),
            log_access_token: None,
        }
    }

    fn app() -> axum::Router {
        routes::router(AppState::new(test_config()))
    }

    async fn get(app: &axum::Router, path: &str, ip: &str) -> StatusCode {
        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri(path)
                    .header("x-forwarded-for", ip)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        response.status()
    }

    #[tokio::test]
    async fn admits_up_to_the_limit_then_blocks() {
        let app = app();

        for _ in 0..3 {
            assert_eq!(get(&app, "/", "9.9.9.9").await, StatusCode::OK);
        }
        // One past the limit: rejected and dynamically blocked.
        assert_eq!(get(&app, "/", "9.9.9.9").await, StatusCode::TOO_MANY_REQUESTS);
        // The block is now active, before the limiter is even consulted.
        assert_eq!(get(&app, "/", "9.9.9.9").await, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn rate_limited_response_carries_retry_after_and_body() {
        let app = app();
        for _ in 0..3 {
            get(&app, "/", "8.8.8.8").await;
        }

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri("/")
                    .header("x-forwarded-for", "8.8.8.8")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(
            response.headers().get(header::RETRY_AFTER).unwrap(),
            "1800"
        );
    }

    #[tokio::test]
    async fn addresses_are_limited_independently() {
        let app = app();

        for i in 0..10 {
            let ip = format!("10.0.0.{i}");
            assert_eq!(get(&app, "/", &ip).await, StatusCode::OK);
        }
    }

    #[tokio::test]
    async fn static_range_is_always_forbidden() {
        let app = app();

        assert_eq!(get(&app, "/", "104.16.0.1").await, StatusCode::FORBIDDEN);
        assert_eq!(get(&app, "/", "104.31.255.255").await, StatusCode::FORBIDDEN);
        assert_eq!(get(&app, "/", "104.32.0.0").await, StatusCode::OK);
    }

    #[tokio::test]
    async fn passthrough_paths_skip_all_checks() {
        let app = app();

        // Even a statically blocked address reaches passthrough paths.
        assert_eq!(get(&app, "/health", "104.16.0.1").await, StatusCode::OK);

        // Passthrough traffic never counts against the limit.
        for _ in 0..20 {
            assert_eq!(get(&app, "/health", "7.7.7.7").await, StatusCode::OK);
        }
        assert_eq!(get(&app, "/", "7.7.7.7").await, StatusCode::OK);
    }

    #[test]
    fn forwarding_header_takes_priority_over_peer() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", "1.2.3.4, 10.0.0.1".parse().unwrap());
        let peer: SocketAddr = "192.168.1.1:9999".parse().unwrap();

        assert_eq!(client_ip(&headers, Some(peer)), "1.2.3.4");
        assert_eq!(client_ip(&HeaderMap::new(), Some(peer)), "192.168.1.1");
        assert_eq!(client_ip(&HeaderMap::new(), None), "unknown");
    }

    #[test]
    fn visitor_summary_is_stable_for_identical_visits() {
        let families = ua::classify("Mozilla/5.0 (Windows NT 10.0) Chrome/120.0 Safari/537.36");
        let a = visitor_message("1.2.3.4", families, "/");
        let b = visitor_message("1.2.3.4", families, "/");
        // Byte-identical, so the notifier's content dedup collapses them.
        assert_eq!(a, b);
        assert!(a.contains("1.2.3.4"));
        assert!(a.contains("Windows"));
        assert!(a.contains("Chrome"));
    }

    #[test]
    fn blocked_message_reports_unknown_fields() {
        let text = blocked_message("1.2.3.4", &GeoRecord::default(), 51, 60);
        assert!(text.contains("<code>1.2.3.4</code>"));
        assert!(text.contains("Country: Unknown"));
        assert!(text.contains("Requests in 60s: 51"));
    }
}
