//! Page stubs and the rate-limited render hook
//!
//! The real site's rendering lives outside this subsystem; the index here
//! is a placeholder so the gatekeeper has something to guard.

use axum::{
    http::{header, StatusCode},
    response::{Html, IntoResponse, Json, Response},
};

const RATE_LIMITED_PAGE: &str = "<!doctype html>\n\
<html>\n\
<head><meta charset=\"utf-8\"><title>Slow down</title></head>\n\
<body>\n\
<h1>Too many requests</h1>\n\
<p>Your address has been temporarily blocked. Try again later.</p>\n\
</body>\n\
</html>\n";

/// Placeholder for the content site's index page.
pub async fn index() -> Html<&'static str> {
    Html("<!doctype html>\n<html><body><h1>sitewarden</h1></body></html>\n")
}

/// Liveness endpoint, exempt from gatekeeper checks.
pub async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}

/// The 429 answer served when an address trips the limiter.
pub fn rate_limited_response(retry_after_secs: u64) -> Response {
    (
        StatusCode::TOO_MANY_REQUESTS,
        [(header::RETRY_AFTER, retry_after_secs.to_string())],
        Html(RATE_LIMITED_PAGE),
    )
        .into_response()
}
