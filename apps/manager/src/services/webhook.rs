//! [apps/manager/src/services/webhook.rs]
//!
//! Webhook dispatch (C6, spec.md §4.6). Fire-and-forget: one POST per
//! event, 2s timeout, no retry, failures logged and otherwise ignored —
//! a slow or dead webhook receiver must never slow down a poll cycle.

use std::time::Duration;

use tracing::warn;
use vm_domain::entities::Event;

const WEBHOOK_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Clone)]
pub struct WebhookNotifier {
    url: Option<String>,
    client: reqwest::Client,
}

impl WebhookNotifier {
    pub fn new(url: Option<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(WEBHOOK_TIMEOUT)
            .build()
            .expect("build webhook client");
        Self { url, client }
    }

    /// Spawns a detached POST of `event` and returns immediately. A no-op
    /// when no webhook URL is configured.
    pub fn notify(&self, event: &Event) {
        let Some(url) = self.url.clone() else {
            return;
        };
        let client = self.client.clone();
        let body = serde_json::json!({
            "event_id": event.id,
            "device_id": event.device_id,
            "event_type": event.event_type,
            "created_at": event.created_at,
            "old_state": event.old_state,
            "new_state": event.new_state,
            "message": event.message,
            "payload": event.payload,
        });
        tokio::spawn(async move {
            if let Err(e) = client.post(&url).json(&body).send().await {
                warn!(error = %e, url, "webhook delivery failed");
            }
        });
    }
}
