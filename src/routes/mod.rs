//! Route handlers and shared application state

pub mod log;
pub mod pages;

use std::sync::Arc;

use axum::{middleware, routing::get, Router};
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::geo::GeoClient;
use crate::guard;
use crate::guard::blocklist::BlockRegistry;
use crate::guard::rate_limit::SlidingWindow;
use crate::notify::Notifier;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub limiter: Arc<SlidingWindow>,
    pub registry: Arc<BlockRegistry>,
    pub geo: Arc<GeoClient>,
    pub notifier: Notifier,
}

impl AppState {
    /// Build all gatekeeper components and spawn the notifier worker.
    pub fn new(config: Config) -> Self {
        let limiter = Arc::new(SlidingWindow::new(config.window));
        let registry = Arc::new(BlockRegistry::new(
            config.blocked_ranges.clone(),
            config.block_duration,
        ));
        let geo = Arc::new(GeoClient::new(
            config.geo_api_base.clone(),
            config.geo_cache_capacity,
        ));
        let notifier = Notifier::spawn(&config);

        Self {
            config: Arc::new(config),
            limiter,
            registry,
            geo,
            notifier,
        }
    }
}

/// Assemble the full router with the gatekeeper in front of every route.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(pages::index))
        .route("/health", get(pages::health))
        .merge(log::router())
        .layer(middleware::from_fn_with_state(
            state.clone(),
            guard::gatekeeper,
        ))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
