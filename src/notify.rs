//! Webhook notifications for pairs that configure one

use serde_json::json;
use std::time::Duration;

/// Fire-and-forget webhook client.
///
/// Delivery is best effort: failures are logged at warn and never touch
/// the trading path.
#[derive(Clone)]
pub struct WebhookNotifier {
    http: reqwest::Client,
}

impl WebhookNotifier {
    pub fn new() -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .expect("reqwest client with static config");
        Self { http }
    }

    /// POST an event payload to the pair's webhook
    pub fn notify(&self, url: &str, event: &str, account: &str, symbol: &str, detail: serde_json::Value) {
        let payload = json!({
            "event": event,
            "account": account,
            "symbol": symbol,
            "detail": detail,
            "timestamp": crate::clock::ist_now().format("%Y-%m-%d %H:%M:%S%.3f").to_string(),
        });
        let http = self.http.clone();
        let url = url.to_string();
        tokio::spawn(async move {
            let result = http.post(&url).json(&payload).send().await;
            match result.and_then(|r| r.error_for_status()) {
                Ok(_) => {}
                Err(e) => tracing::warn!(url = %url, error = %e, "webhook delivery failed"),
            }
        });
    }
}

impl Default for WebhookNotifier {
    fn default() -> Self {
        Self::new()
    }
}
