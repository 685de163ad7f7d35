//! Fire-and-forget webhook notifications
//!
//! When a session suspends on a human-in-the-loop interrupt and carries a
//! webhook URL, the interrupt payload is POSTed there so the operator does
//! not have to poll. Delivery is best effort: three attempts with
//! exponential backoff between them (1s, then 2s) and a 10s per-attempt
//! timeout; failure logs and nothing else.

use reqwest::Client;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};

const ATTEMPT_TIMEOUT: Duration = Duration::from_secs(10);
const MAX_ATTEMPTS: u32 = 3;

#[derive(Clone)]
pub struct WebhookNotifier {
    client: Client,
}

impl Default for WebhookNotifier {
    fn default() -> Self {
        Self::new()
    }
}

impl WebhookNotifier {
    pub fn new() -> Self {
        Self {
            client: Client::builder()
                .timeout(ATTEMPT_TIMEOUT)
                .build()
                .expect("Failed to create HTTP client"),
        }
    }

    /// Spawn delivery in the background and return immediately.
    pub fn notify(&self, url: String, payload: Value) {
        let client = self.client.clone();
        tokio::spawn(async move {
            for attempt in 0..MAX_ATTEMPTS {
                match client.post(&url).json(&payload).send().await {
                    Ok(response) if response.status().is_success() => {
                        debug!(url = %url, attempt, "Webhook delivered");
                        return;
                    }
                    Ok(response) => {
                        warn!(url = %url, attempt, status = %response.status(), "Webhook rejected");
                    }
                    Err(e) => {
                        warn!(url = %url, attempt, error = %e, "Webhook attempt failed");
                    }
                }
                if attempt + 1 < MAX_ATTEMPTS {
                    tokio::time::sleep(Duration::from_secs(1 << attempt)).await;
                }
            }
            warn!(url = %url, "Webhook delivery abandoned after {} attempts", MAX_ATTEMPTS);
        });
    }
}
