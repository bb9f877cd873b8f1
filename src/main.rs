//! sitewarden - request gatekeeper for a content-serving web process
//!
//! Every inbound request passes the gatekeeper before normal handling:
//! statically blocked ranges and rate offenders are rejected, and
//! security-relevant events (blocks, new visitors, client-submitted log
//! messages) are dispatched to an operator Telegram channel off the
//! request path.

mod config;
mod geo;
mod guard;
mod notify;
mod routes;

use std::net::SocketAddr;
use std::time::{Duration, Instant};

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,sitewarden=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = config::Config::from_env()?;
    tracing::info!("Starting sitewarden on {}:{}", config.host, config.port);
    tracing::info!(
        "Rate limit: {} requests per {}s, block duration {}s",
        config.max_requests,
        config.window.as_secs(),
        config.block_duration.as_secs()
    );
    tracing::info!("Static blocked ranges: {}", config.blocked_ranges.len());
    if config.telegram.is_none() {
        tracing::warn!("Telegram credentials not configured; notifications disabled");
    }

    let state = routes::AppState::new(config.clone());

    // Periodic hygiene: keep the per-address tables bounded even for
    // addresses that never come back.
    let limiter = state.limiter.clone();
    let registry = state.registry.clone();
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(SWEEP_INTERVAL);
        loop {
            tick.tick().await;
            let now = Instant::now();
            limiter.sweep(now);
            registry.sweep(now);
        }
    });

    let app = routes::router(state);

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Listening on {}", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
