//! Client-submitted log messages
//!
//! `POST /log` accepts a JSON body with a required `message` and forwards
//! it verbatim to the operator channel, enriched with geolocation and the
//! user agent. The dispatch itself happens on a detached task; the client
//! gets its acknowledgement immediately.

use axum::{
    extract::State,
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::post,
    Extension, Router,
};
use serde::Deserialize;
use serde_json::json;
use tracing::info;

use crate::geo::GeoRecord;
use crate::guard::ClientAddr;
use crate::routes::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/log", post(submit))
}

#[derive(Debug, Deserialize)]
struct LogSubmission {
    message: Option<String>,
    access_token: Option<String>,
}

async fn submit(
    State(state): State<AppState>,
    Extension(ClientAddr(addr)): Extension<ClientAddr>,
    headers: HeaderMap,
    Json(body): Json<LogSubmission>,
) -> Response {
    // Optional shared secret; without it configured the endpoint is open.
    if let Some(expected) = &state.config.log_access_token {
        if body.access_token.as_deref() != Some(expected.as_str()) {
            return (
                StatusCode::UNAUTHORIZED,
                Json(json!({"error": "Invalid token"})),
            )
                .into_response();
        }
    }

    let Some(message) = body.message.filter(|m| !m.is_empty()) else {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"error": "No message provided"})),
        )
            .into_response();
    };

    let user_agent = headers
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("Unknown")
        .to_string();
    info!(%addr, "log message submitted");

    let task_state = state.clone();
    tokio::spawn(async move {
        let geo = task_state.geo.lookup(&addr).await;
        task_state
            .notifier
            .dispatch(log_message(&addr, &geo, &user_agent, &message));
    });

    (StatusCode::OK, Json(json!({"status": "ok"}))).into_response()
}

fn log_message(addr: &str, geo: &GeoRecord, user_agent: &str, message: &str) -> String {
    format!(
        "📥 Log\n\
         🕒 Time: {}\n\
         📡 IP: <code>{}</code>\n\
         🌍 Country: {}\n\
         🏙 City: {}\n\
         🏢 ISP: {}\n\
         📱 User-Agent: {}\n\
         💬 Message: {}",
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
        addr,
        geo.country(),
        geo.city(),
        geo.isp(),
        user_agent,
        message,
    )
}
