//! Outbound notification transports.

use std::time::Duration;

use anyhow::Context as _;
use async_trait::async_trait;
use reqwest::Client;
use tourshield_core::notification::{NotificationEvent, Payload};
use tourshield_engine::fanout::{DeliveryError, Subscriber};
use tracing::{info, warn};

// ─── Webhook ─────────────────────────────────────────────────────────────────

/// POSTs each event as JSON to a fixed URL. Any non-2xx answer is a failed
/// attempt, which the fan-out retries with backoff.
///
/// Cheap to clone; the inner [`reqwest::Client`] is `Arc`-based.
#[derive(Clone)]
pub struct WebhookSubscriber {
  name:   String,
  url:    String,
  client: Client,
}

impl WebhookSubscriber {
  pub fn new(name: impl Into<String>, url: impl Into<String>, timeout: Duration) -> anyhow::Result<Self> {
    let client = Client::builder()
      .timeout(timeout)
      .build()
      .context("failed to build HTTP client")?;
    Ok(Self { name: name.into(), url: url.into(), client })
  }
}

#[async_trait]
impl Subscriber for WebhookSubscriber {
  fn name(&self) -> &str { &self.name }

  async fn deliver(&self, event: &NotificationEvent) -> Result<(), DeliveryError> {
    let resp = self
      .client
      .post(&self.url)
      .header("x-notification-id", event.id.as_str())
      .json(event)
      .send()
      .await
      .map_err(|e| DeliveryError(format!("POST {} failed: {e}", self.url)))?;

    if !resp.status().is_success() {
      return Err(DeliveryError(format!("POST {} → {}", self.url, resp.status())));
    }
    Ok(())
  }
}

// ─── Log ─────────────────────────────────────────────────────────────────────

/// Writes every authority event to the log. Always registered, so the
/// authority class has a sink even without a webhook.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogSubscriber;

#[async_trait]
impl Subscriber for LogSubscriber {
  fn name(&self) -> &str { "log" }

  async fn deliver(&self, event: &NotificationEvent) -> Result<(), DeliveryError> {
    let id = event.id.as_str();
    let department = event.department;
    match &event.payload {
      Payload::ScoreChanged { person_id, old_score, new_score } => {
        info!(id, ?department, %person_id, old_score, new_score, "score changed");
      }
      Payload::AlertTransition { alert_id, from, to, snapshot } => {
        info!(
          id,
          ?department,
          %alert_id,
          from = ?from,
          %to,
          priority = %snapshot.priority,
          unit = snapshot.assigned_unit_id.as_deref(),
          "alert update"
        );
      }
      Payload::PersonStatusChanged { person_id, from, to } => {
        info!(id, ?department, %person_id, %from, %to, "person status changed");
      }
      Payload::DeliveryFailed { notification_id, recipient_class, subscriber, attempts } => {
        warn!(
          id,
          failed = %notification_id,
          %recipient_class,
          subscriber = subscriber.as_str(),
          attempts,
          "notification undeliverable"
        );
      }
    }
    Ok(())
  }
}
