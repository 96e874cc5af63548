use crate::config::Config;

/// Fire-and-forget account event sink.
///
/// Ceremonies call this after the fact; delivery runs on a detached task
/// and any failure is logged and swallowed, never surfaced to the caller.
pub struct NotifyService;

impl NotifyService {
    pub fn notify(config: &Config, user_id: &str, event: &str) {
        let webhook_url = config.notify.webhook_url.clone();
        let user_id = user_id.to_string();
        let event = event.to_string();

        tokio::spawn(async move {
            tracing::info!(user_id = %user_id, event = %event, "account event");

            let Some(url) = webhook_url else {
                return;
            };

            let payload = serde_json::json!({
                "user_id": user_id,
                "event": event,
            });

            match reqwest::Client::new().post(&url).json(&payload).send().await {
                Ok(resp) if !resp.status().is_success() => {
                    tracing::warn!(
                        status = %resp.status(),
                        "notification webhook returned non-success"
                    );
                }
                Err(e) => {
                    tracing::warn!("notification webhook delivery failed: {:?}", e);
                }
                _ => {}
            }
        });
    }
}
