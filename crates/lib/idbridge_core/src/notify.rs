//! Notification gateway.
//!
//! The core never delivers email itself; it hands a [`Notification`] to a
//! [`Notifier`]. Delivery failures are reported back to the caller and do
//! not invalidate the token that was issued.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Serialize;
use thiserror::Error;
use tracing::info;

use crate::models::token::TokenType;

/// Webhook request timeout.
const WEBHOOK_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("Notifier setup failed: {0}")]
    Setup(String),

    #[error("Delivery failed: {0}")]
    Delivery(String),
}

/// A link to deliver to one end user.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub kind: TokenType,
    pub database_id: String,
    pub app_name: String,
    pub user_id: String,
    pub email: String,
    pub link: String,
    pub expires_at: DateTime<Utc>,
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, notification: &Notification) -> Result<(), NotifyError>;

    fn name(&self) -> &str;
}

/// Records the delivery request in the log and reports success.
///
/// The link carries the token secret, so only its recipient and kind are
/// logged.
#[derive(Debug, Default, Clone)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, notification: &Notification) -> Result<(), NotifyError> {
        info!(
            kind = %notification.kind,
            app = %notification.app_name,
            user_id = %notification.user_id,
            email = %notification.email,
            "notification requested (log notifier, not delivered)"
        );
        Ok(())
    }

    fn name(&self) -> &str {
        "log"
    }
}

/// POSTs each notification as JSON to an operator-supplied URL; any non-2xx
/// status is a delivery failure.
#[derive(Debug, Clone)]
pub struct WebhookNotifier {
    client: Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(url: &str) -> Result<Self, NotifyError> {
        let client = Client::builder()
            .timeout(WEBHOOK_TIMEOUT)
            .build()
            .map_err(|e| NotifyError::Setup(e.to_string()))?;
        Ok(Self {
            client,
            url: url.to_string(),
        })
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn send(&self, notification: &Notification) -> Result<(), NotifyError> {
        let resp = self
            .client
            .post(&self.url)
            .json(notification)
            .send()
            .await
            .map_err(|e| NotifyError::Delivery(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp
                .text()
                .await
                .unwrap_or_else(|_| "<no body>".to_string());
            return Err(NotifyError::Delivery(format!("webhook returned {status}: {body}")));
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "webhook"
    }
}
