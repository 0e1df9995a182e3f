use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use thiserror::Error;

use bulkpix_core::outbound::OutboundMessage;

use crate::messages::MessagePayload;

#[derive(Debug, Error)]
pub enum SendError {
    #[error("transport failure: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("cloud api rejected the message ({status}): {body}")]
    Api { status: u16, body: String },
}

#[async_trait]
pub trait MessageSender: Send + Sync {
    async fn send(&self, to: &str, message: &OutboundMessage) -> Result<(), SendError>;
}

/// Delivers messages through the Graph API `/{phone_number_id}/messages`
/// endpoint with bearer authentication.
pub struct CloudApiSender {
    http: reqwest::Client,
    api_base_url: String,
    phone_number_id: String,
    access_token: SecretString,
}

impl CloudApiSender {
    pub fn new(
        api_base_url: impl Into<String>,
        phone_number_id: impl Into<String>,
        access_token: SecretString,
    ) -> Result<Self, SendError> {
        let http = reqwest::Client::builder().timeout(Duration::from_secs(15)).build()?;
        Ok(Self {
            http,
            api_base_url: api_base_url.into(),
            phone_number_id: phone_number_id.into(),
            access_token,
        })
    }
}

#[async_trait]
impl MessageSender for CloudApiSender {
    async fn send(&self, to: &str, message: &OutboundMessage) -> Result<(), SendError> {
        let url = format!(
            "{}/{}/messages",
            self.api_base_url.trim_end_matches('/'),
            self.phone_number_id
        );

        let response = self
            .http
            .post(&url)
            .bearer_auth(self.access_token.expose_secret())
            .json(&MessagePayload::from_outbound(to, message))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(
                event_name = "whatsapp.send_rejected",
                to,
                status = status.as_u16(),
                body = %body,
                "cloud api rejected outbound message"
            );
            return Err(SendError::Api { status: status.as_u16(), body });
        }

        tracing::debug!(event_name = "whatsapp.message_sent", to, "outbound message delivered");
        Ok(())
    }
}

/// Captures outbound messages for assertions instead of sending them.
#[derive(Clone, Default)]
pub struct RecordingSender {
    sent: Arc<Mutex<Vec<(String, OutboundMessage)>>>,
}

impl RecordingSender {
    pub fn sent(&self) -> Vec<(String, OutboundMessage)> {
        match self.sent.lock() {
            Ok(sent) => sent.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

#[async_trait]
impl MessageSender for RecordingSender {
    async fn send(&self, to: &str, message: &OutboundMessage) -> Result<(), SendError> {
        match self.sent.lock() {
            Ok(mut sent) => sent.push((to.to_string(), message.clone())),
            Err(poisoned) => poisoned.into_inner().push((to.to_string(), message.clone())),
        }
        Ok(())
    }
}
