//! Outbound operator notifications over Telegram
//!
//! Dispatch is fire-and-forget: `dispatch` pushes the text onto a bounded
//! queue and returns immediately. A single worker task drains the queue,
//! suppresses consecutive duplicates, enforces a minimum spacing between
//! sends, and talks to the Telegram API. Nothing here can block a request
//! handler or surface an error to one.

use std::time::{Duration, Instant};

use tokio::sync::mpsc;
use tracing::{debug, error, warn};

use crate::config::{Config, TelegramCreds};

const QUEUE_CAPACITY: usize = 64;
const SEND_TIMEOUT: Duration = Duration::from_secs(5);

/// Handle for enqueueing notifications. Cheap to clone.
#[derive(Clone)]
pub struct Notifier {
    tx: mpsc::Sender<String>,
}

impl Notifier {
    /// Spawn the worker task and return the dispatch handle.
    pub fn spawn(config: &Config) -> Self {
        let (tx, rx) = mpsc::channel(QUEUE_CAPACITY);

        let worker = Worker {
            client: reqwest::Client::new(),
            creds: config.telegram.clone(),
            api_base: config.telegram_api_base.clone(),
            throttle: Throttle::new(config.notify_min_interval),
        };
        tokio::spawn(worker.run(rx));

        Self { tx }
    }

    /// Enqueue a notification. Returns `false` when the queue is full (the
    /// message is dropped) or the worker is gone; never blocks.
    pub fn dispatch(&self, text: impl Into<String>) -> bool {
        match self.tx.try_send(text.into()) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!("notification queue full, dropping message");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                error!("notification worker is gone, dropping message");
                false
            }
        }
    }
}

/// Dedup and spacing state, owned by the worker.
struct Throttle {
    min_interval: Duration,
    last_text: Option<String>,
    last_sent: Option<Instant>,
}

impl Throttle {
    fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_text: None,
            last_sent: None,
        }
    }

    /// Decide what to do with `text` at `now`: `None` means suppress (it
    /// repeats the previously sent text), `Some(delay)` means send after
    /// waiting `delay` to honor the global spacing.
    fn admit(&self, text: &str, now: Instant) -> Option<Duration> {
        if self.last_text.as_deref() == Some(text) {
            return None;
        }
        let delay = match self.last_sent {
            Some(last) => self
                .min_interval
                .saturating_sub(now.saturating_duration_since(last)),
            None => Duration::ZERO,
        };
        Some(delay)
    }

    /// Record an attempted send. The text is remembered for dedup only
    /// when the send went through.
    fn record(&mut self, text: &str, now: Instant, sent: bool) {
        self.last_sent = Some(now);
        if sent {
            self.last_text = Some(text.to_string());
        }
    }
}

struct Worker {
    client: reqwest::Client,
    creds: Option<TelegramCreds>,
    api_base: String,
    throttle: Throttle,
}

impl Worker {
    async fn run(mut self, mut rx: mpsc::Receiver<String>) {
        if self.creds.is_none() {
            warn!("TELEGRAM_BOT_TOKEN / TELEGRAM_CHAT_ID not set; notifications disabled");
        }

        while let Some(text) = rx.recv().await {
            let Some(delay) = self.throttle.admit(&text, Instant::now()) else {
                debug!("suppressing duplicate notification");
                continue;
            };
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }

            let sent = self.send(&text).await;
            self.throttle.record(&text, Instant::now(), sent);
        }
    }

    /// One send attempt against the Telegram API. Failures are logged and
    /// reported as `false`; there are no retries.
    async fn send(&self, text: &str) -> bool {
        let Some(creds) = &self.creds else {
            return false;
        };

        let url = format!("{}/bot{}/sendMessage", self.api_base, creds.bot_token);
        let params = [
            ("chat_id", creds.chat_id.as_str()),
            ("text", text),
            ("parse_mode", "HTML"),
        ];

        let response = match self
            .client
            .post(&url)
            .form(&params)
            .timeout(SEND_TIMEOUT)
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => {
                error!("telegram send failed: {}", e);
                return false;
            }
        };
        if !response.status().is_success() {
            error!(status = %response.status(), "telegram API rejected message");
            return false;
        }

        match response.json::<serde_json::Value>().await {
            Ok(body) if body.get("ok").and_then(serde_json::Value::as_bool) == Some(true) => true,
            Ok(body) => {
                error!("telegram API reported failure: {}", body);
                false
            }
            Err(e) => {
                error!("unreadable telegram API response: {}", e);
                false
            }
        }
    }
}
