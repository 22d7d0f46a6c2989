use async_trait::async_trait;
use reqwest::Client;
use ring::hmac;
use secrecy::{ExposeSecret, Secret};
use serde::Serialize;
use std::time::Duration;

pub const SIGNATURE_HEADER: &str = "X-Escrow-Signature";

#[derive(thiserror::Error, Debug)]
pub enum NotifyError {
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Webhook rejected notification: HTTP {0}")]
    Rejected(u16),

    #[error("Serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChoreEvent {
    Approved,
    Rejected,
    Completed,
}

/// Delivers workflow events to the trusted contact. Fire-and-forget from the
/// coordinator's point of view: failures are logged and never undo a commit.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(
        &self,
        event: ChoreEvent,
        contact_email: &str,
        payload: serde_json::Value,
    ) -> Result<(), NotifyError>;
}

/// Writes events to the log only
#[derive(Debug, Default, Clone)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(
        &self,
        event: ChoreEvent,
        contact_email: &str,
        payload: serde_json::Value,
    ) -> Result<(), NotifyError> {
        tracing::info!(?event, contact_email, %payload, "Notification");
        Ok(())
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct WebhookBody<'a> {
    event: ChoreEvent,
    contact_email: &'a str,
    payload: serde_json::Value,
}

/// POSTs events as JSON to an external delivery service
pub struct WebhookNotifier {
    client: Client,
    url: String,
    secret: Option<Secret<String>>,
}

impl WebhookNotifier {
    pub fn new(url: impl Into<String>, secret: Option<Secret<String>>) -> Self {
        Self {
            client: Client::new(),
            url: url.into(),
            secret,
        }
    }
}

/// Hex-encoded HMAC-SHA256 of `body`
pub fn sign_body(secret: &str, body: &[u8]) -> String {
    let key = hmac::Key::new(hmac::HMAC_SHA256, secret.as_bytes());
    hex::encode(hmac::sign(&key, body).as_ref())
}

#[async_trait]
impl Notifier for WebhookNotifier {
    #[tracing::instrument(skip(self, payload))]
    async fn notify(
        &self,
        event: ChoreEvent,
        contact_email: &str,
        payload: serde_json::Value,
    ) -> Result<(), NotifyError> {
        let body = serde_json::to_vec(&WebhookBody {
            event,
            contact_email,
            payload,
        })?;

        let mut request = self
            .client
            .post(&self.url)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .timeout(Duration::from_secs(5));

        if let Some(secret) = &self.secret {
            request = request.header(SIGNATURE_HEADER, sign_body(secret.expose_secret(), &body));
        }

        let response = request.body(body).send().await?;

        if !response.status().is_success() {
            return Err(NotifyError::Rejected(response.status().as_u16()));
        }

        tracing::debug!("Webhook notification delivered");
        Ok(())
    }
}
