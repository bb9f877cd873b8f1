//! Server configuration loaded from environment variables

use std::env;
use std::num::NonZeroUsize;
use std::time::Duration;

use crate::guard::blocklist::StaticRange;

/// Default statically blocked ranges (Cloudflare egress, checked before
/// any per-address state).
const DEFAULT_BLOCKED_RANGES: &str = "104.16.0.0-104.31.255.255";

#[derive(Debug, Clone)]
pub struct Config {
    /// Host to bind to
    pub host: String,

    /// Port for HTTP traffic
    pub port: u16,

    /// Maximum requests per address inside the sliding window
    pub max_requests: usize,

    /// Sliding window length
    pub window: Duration,

    /// How long a dynamic block lasts once an address trips the limiter
    pub block_duration: Duration,

    /// Minimum spacing between any two outbound notifications
    pub notify_min_interval: Duration,

    /// Inclusive address ranges that are always rejected
    pub blocked_ranges: Vec<StaticRange>,

    /// Path prefixes exempt from all gatekeeper checks
    pub passthrough_prefixes: Vec<String>,

    /// Telegram credentials; notifications are disabled when unset
    pub telegram: Option<TelegramCreds>,

    /// Telegram API base URL
    pub telegram_api_base: String,

    /// Geolocation API base URL
    pub geo_api_base: String,

    /// Capacity of the geolocation LRU cache
    pub geo_cache_capacity: NonZeroUsize,

    /// Optional shared secret required by the /log endpoint
    pub log_access_token: Option<String>,
}

/// Telegram bot credentials
#[derive(Debug, Clone)]
pub struct TelegramCreds {
    pub bot_token: String,
    pub chat_id: String,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let blocked_ranges = env::var("BLOCKED_RANGES")
            .unwrap_or_else(|_| DEFAULT_BLOCKED_RANGES.to_string())
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| {
                StaticRange::parse(s).ok_or_else(|| ConfigError::InvalidRange(s.to_string()))
            })
            .collect::<Result<Vec<_>, _>>()?;

        // Both credentials are required to enable dispatch; a half-configured
        // notifier is treated the same as an unconfigured one.
        let telegram = match (env::var("TELEGRAM_BOT_TOKEN"), env::var("TELEGRAM_CHAT_ID")) {
            (Ok(bot_token), Ok(chat_id)) if !bot_token.is_empty() && !chat_id.is_empty() => {
                Some(TelegramCreds { bot_token, chat_id })
            }
            _ => None,
        };

        Ok(Self {
            host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: parse_env("PORT", 8080)?,
            max_requests: parse_env("MAX_REQUESTS", 50)?,
            window: Duration::from_secs(parse_env("WINDOW_SECONDS", 60)?),
            block_duration: Duration::from_secs(parse_env("BLOCK_SECONDS", 1800)?),
            notify_min_interval: Duration::from_millis(parse_env(
                "NOTIFY_MIN_INTERVAL_MS",
                1000,
            )?),
            blocked_ranges,
            passthrough_prefixes: vec!["/static/".to_string(), "/health".to_string()],
            telegram,
            telegram_api_base: env::var("TELEGRAM_API_BASE")
                .unwrap_or_else(|_| "https://api.telegram.org".to_string()),
            geo_api_base: env::var("GEO_API_BASE")
                .unwrap_or_else(|_| "http://ip-api.com".to_string()),
            geo_cache_capacity: NonZeroUsize::new(parse_env("GEO_CACHE_CAPACITY", 1024)?)
                .ok_or(ConfigError::InvalidNumber("GEO_CACHE_CAPACITY"))?,
            log_access_token: env::var("LOG_ACCESS_TOKEN").ok().filter(|t| !t.is_empty()),
        })
    }

    /// Window length in whole seconds, for notification text
    pub fn window_secs(&self) -> u64 {
        self.window.as_secs()
    }
}

fn parse_env<T: std::str::FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(raw) => raw.parse().map_err(|_| ConfigError::InvalidNumber(name)),
        Err(_) => Ok(default),
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for environment variable: {0}")]
    InvalidNumber(&'static str),

    #[error("Invalid blocked range: {0} (expected \"start-end\")")]
    InvalidRange(String),
}
