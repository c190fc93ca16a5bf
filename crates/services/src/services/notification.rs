//! Alert notifications: always logged, optionally pushed to a webhook.

use std::time::Duration;

use reqwest::Client;
use serde::Serialize;
use tracing::{debug, warn};

#[derive(Debug, Serialize)]
struct WebhookPayload<'a> {
    title: &'a str,
    message: &'a str,
}

#[derive(Debug, Clone)]
pub struct NotificationService {
    http: Client,
    webhook_url: Option<String>,
}

impl NotificationService {
    pub fn new(webhook_url: Option<String>) -> Self {
        let http = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_default();
        Self { http, webhook_url }
    }

    /// Delivery failures are logged, never returned
    pub async fn notify(&self, title: &str, message: &str) {
        warn!(title = %title, "{}", message);

        let Some(url) = self.webhook_url.as_deref() else {
            return;
        };

        match self
            .http
            .post(url)
            .json(&WebhookPayload { title, message })
            .send()
            .await
        {
            Ok(res) if res.status().is_success() => {
                debug!(webhook = %url, "Notification delivered");
            }
            Ok(res) => {
                warn!(webhook = %url, status = %res.status(), "Notification webhook rejected payload");
            }
            Err(e) => {
                warn!(webhook = %url, error = %e, "Notification webhook unreachable");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use axum::{Json, Router, extract::State, routing::post};

    use super::*;

    #[tokio::test]
    async fn test_notify_posts_to_webhook() {
        let received: Arc<Mutex<Vec<serde_json::Value>>> = Arc::default();
        let app = Router::new()
            .route(
                "/hook",
                post(
                    |State(received): State<Arc<Mutex<Vec<serde_json::Value>>>>,
                     Json(body): Json<serde_json::Value>| async move {
                        received.lock().unwrap().push(body);
                    },
                ),
            )
            .with_state(received.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let service = NotificationService::new(Some(format!("http://{addr}/hook")));
        service.notify("Event volume drop", "checkout_completed fell 80%").await;

        let bodies = received.lock().unwrap().clone();
        assert_eq!(
            bodies,
            vec![serde_json::json!({"title": "Event volume drop", "message": "checkout_completed fell 80%"})]
        );
    }

    #[tokio::test]
    async fn test_notify_without_webhook_or_with_dead_webhook_does_not_fail() {
        NotificationService::new(None).notify("t", "m").await;
        NotificationService::new(Some("http://127.0.0.1:9/unreachable".to_string()))
            .notify("t", "m")
            .await;
    }
}
