//! Webhook notification for finished listings.
//!
//! One POST of the full `PipelineResult` JSON, bounded by a timeout. No
//! retry and no authentication. The caller awaits the outcome before
//! responding, but the outcome is informational only.

use std::time::Duration;

use stylesync_core::config::NotificationConfig;
use stylesync_core::PipelineResult;

#[derive(Debug, Clone, PartialEq)]
pub enum NotifyOutcome {
    /// 2xx from the webhook.
    Delivered(u16),
    /// Non-2xx from the webhook.
    Rejected(u16),
    /// Transport failure before a status was received.
    Failed(String),
    TimedOut,
}

pub struct NotificationDispatcher {
    client: reqwest::Client,
    url: String,
    timeout: Duration,
}

impl NotificationDispatcher {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().build()?;
        Ok(Self {
            client,
            url: url.into(),
            timeout,
        })
    }

    /// `None` when no webhook is configured; callers skip notification then.
    pub fn from_config(url: Option<String>, config: &NotificationConfig) -> Option<Self> {
        let Some(url) = url else {
            tracing::warn!("N8N_WEBHOOK_URL not set, listing notifications disabled");
            return None;
        };
        match Self::new(url, Duration::from_secs(config.timeout_secs)) {
            Ok(dispatcher) => Some(dispatcher),
            Err(e) => {
                tracing::warn!(error = %e, "Failed to build webhook client, notifications disabled");
                None
            }
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub async fn dispatch(&self, result: &PipelineResult) -> NotifyOutcome {
        let send = self.client.post(&self.url).json(result).send();

        let outcome = match tokio::time::timeout(self.timeout, send).await {
            Err(_) => NotifyOutcome::TimedOut,
            Ok(Err(e)) => NotifyOutcome::Failed(e.to_string()),
            Ok(Ok(resp)) if resp.status().is_success() => {
                NotifyOutcome::Delivered(resp.status().as_u16())
            }
            Ok(Ok(resp)) => NotifyOutcome::Rejected(resp.status().as_u16()),
        };

        match &outcome {
            NotifyOutcome::Delivered(code) => {
                tracing::info!(status = code, "Listing sent to webhook");
            }
            NotifyOutcome::Rejected(code) => {
                tracing::warn!(status = code, "Webhook rejected listing");
            }
            NotifyOutcome::Failed(e) => {
                tracing::warn!(error = %e, "Webhook request failed");
            }
            NotifyOutcome::TimedOut => {
                tracing::warn!(timeout_ms = self.timeout.as_millis() as u64, "Webhook timed out");
            }
        }
        outcome
    }
}
