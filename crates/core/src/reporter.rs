//! Error and event reporting sink.
//!
//! The main loop reports every failed iteration and notable events here.
//! Reporting never fails and never blocks the loop on network I/O.

use alloy::primitives::Address;
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

const WEBHOOK_HTTP_TIMEOUT_SECS: u64 = 5;

/// Default interval between two webhook posts with the same key.
pub const DEFAULT_REPORT_COOLDOWN: Duration = Duration::from_secs(60);

/// Observability sink for the agent.
#[async_trait]
pub trait ErrorReporter: Send + Sync {
    async fn report_error(&self, error: &anyhow::Error);

    async fn report_message(&self, message: &str);
}

/// Reports through `tracing` only.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingReporter;

#[async_trait]
impl ErrorReporter for TracingReporter {
    async fn report_error(&self, error: &anyhow::Error) {
        error!(error = format!("{error:#}"), "Liquidator iteration failed");
    }

    async fn report_message(&self, message: &str) {
        info!(message, "Liquidator event");
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum ReportEvent<'a> {
    Error { message: String },
    Message { message: &'a str },
}

/// Logs like [`TracingReporter`] and additionally posts each event to a
/// webhook, rate limited per event key.
#[derive(Debug)]
pub struct WebhookReporter {
    url: String,
    cooldown: Duration,
    account: Option<Address>,
    last: Mutex<HashMap<String, Instant>>,
    client: reqwest::Client,
}

impl WebhookReporter {
    pub fn new(url: impl Into<String>, cooldown: Duration, account: Option<Address>) -> Self {
        let timeout = Duration::from_secs(WEBHOOK_HTTP_TIMEOUT_SECS);
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|e| {
                warn!(error = %e, "Failed to build webhook client with timeout, using default");
                reqwest::Client::new()
            });

        Self {
            url: url.into(),
            cooldown,
            account,
            last: Mutex::new(HashMap::new()),
            client,
        }
    }

    fn should_send(&self, key: &str) -> bool {
        self.should_send_at(key, Instant::now())
    }

    /// Keys whose cooldown has expired are dropped, so the map only holds
    /// keys sent within the last `cooldown`.
    fn should_send_at(&self, key: &str, now: Instant) -> bool {
        let mut last = self.last.lock();
        last.retain(|_, sent| now.saturating_duration_since(*sent) < self.cooldown);
        if last.contains_key(key) {
            return false;
        }
        last.insert(key.to_string(), now);
        true
    }

    fn post(&self, key: String, event: ReportEvent<'_>) {
        if !self.should_send(&key) {
            return;
        }

        let payload = serde_json::json!({
            "ts": chrono::Utc::now().timestamp(),
            "account": self.account,
            "event": event,
        });
        let client = self.client.clone();
        let url = self.url.clone();

        // fire-and-forget
        tokio::spawn(async move {
            if let Err(e) = client.post(&url).json(&payload).send().await {
                warn!(error = %e, "Failed to post report to webhook");
            }
        });
    }
}

#[async_trait]
impl ErrorReporter for WebhookReporter {
    async fn report_error(&self, error: &anyhow::Error) {
        TracingReporter.report_error(error).await;
        let message = format!("{error:#}");
        let key = format!("error:{}", error);
        self.post(key, ReportEvent::Error { message });
    }

    async fn report_message(&self, message: &str) {
        TracingReporter.report_message(message).await;
        self.post(format!("msg:{message}"), ReportEvent::Message { message });
    }
}

/// Webhook reporter when WATCHDOG_WEBHOOK is set, tracing otherwise.
pub fn reporter_from_env(cooldown: Duration, account: Option<Address>) -> Arc<dyn ErrorReporter> {
    match std::env::var("WATCHDOG_WEBHOOK") {
        Ok(url) if !url.trim().is_empty() => {
            info!("Reporting errors to webhook");
            Arc::new(WebhookReporter::new(url, cooldown, account))
        }
        _ => Arc::new(TracingReporter),
    }
}
