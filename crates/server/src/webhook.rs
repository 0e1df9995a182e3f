use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

use bulkpix_whatsapp::{parse_webhook, InboundEvent};

use crate::bootstrap::Runner;

#[derive(Clone)]
pub struct WebhookState {
    pub runner: Arc<Runner>,
    pub verify_token: SecretString,
}

pub fn router(state: WebhookState) -> Router {
    Router::new()
        .route("/webhook", get(verify).post(receive))
        .with_state(state)
}

/// Meta's webhook registration handshake: echo `hub.challenge` back when the
/// verify token matches.
#[derive(Debug, Deserialize)]
pub struct VerifyParams {
    #[serde(rename = "hub.mode")]
    mode: Option<String>,
    #[serde(rename = "hub.verify_token")]
    verify_token: Option<String>,
    #[serde(rename = "hub.challenge")]
    challenge: Option<String>,
}

pub async fn verify(
    State(state): State<WebhookState>,
    Query(params): Query<VerifyParams>,
) -> (StatusCode, String) {
    match check_verification(&params, state.verify_token.expose_secret()) {
        Some(challenge) => {
            tracing::info!(event_name = "webhook.verified", "webhook subscription verified");
            (StatusCode::OK, challenge)
        }
        None => {
            tracing::warn!(
                event_name = "webhook.verification_rejected",
                mode = ?params.mode,
                "webhook verification failed"
            );
            (StatusCode::FORBIDDEN, String::new())
        }
    }
}

fn check_verification(params: &VerifyParams, expected_token: &str) -> Option<String> {
    if params.mode.as_deref() != Some("subscribe") {
        return None;
    }
    if params.verify_token.as_deref() != Some(expected_token) {
        return None;
    }
    params.challenge.clone()
}

/// Inbound notifications. Always 200: Meta retries non-2xx deliveries, and a
/// retry of a payload that failed once will fail the same way again. One
/// task is spawned per user with that user's events handled in payload
/// order; slow pricing lookups for one user never delay the acknowledgement
/// or another user's messages.
pub async fn receive(
    State(state): State<WebhookState>,
    Json(payload): Json<serde_json::Value>,
) -> StatusCode {
    let events = parse_webhook(&payload);
    tracing::debug!(
        event_name = "webhook.received",
        event_count = events.len(),
        "webhook notification parsed"
    );

    for (_user_id, batch) in batch_by_user(events) {
        let runner = state.runner.clone();
        tokio::spawn(async move {
            for event in batch {
                runner.handle_event(event).await;
            }
        });
    }

    StatusCode::OK
}

/// Groups a payload's events by sender, keeping payload order within each
/// user's batch. Payloads carry a handful of events at most, so a linear
/// scan beats a map here.
fn batch_by_user(events: Vec<InboundEvent>) -> Vec<(String, Vec<InboundEvent>)> {
    let mut batches: Vec<(String, Vec<InboundEvent>)> = Vec::new();
    for event in events {
        let user_id = event.user_id().to_string();
        match batches.iter_mut().find(|(id, _)| *id == user_id) {
            Some((_, batch)) => batch.push(event),
            None => batches.push((user_id, vec![event])),
        }
    }
    batches
}

#[cfg(test)]
mod tests {
    use bulkpix_whatsapp::InboundEvent;

    use super::{batch_by_user, check_verification, VerifyParams};

    fn text(user_id: &str, text: &str) -> InboundEvent {
        InboundEvent::FreeText { user_id: user_id.to_string(), text: text.to_string() }
    }

    #[test]
    fn batching_keeps_each_users_events_in_payload_order() {
        let batches = batch_by_user(vec![
            text("447001", "bulk"),
            text("447002", "bulk"),
            text("447001", "50"),
        ]);

        assert_eq!(batches.len(), 2);
        assert_eq!(batches[0].0, "447001");
        assert_eq!(batches[0].1, vec![text("447001", "bulk"), text("447001", "50")]);
        assert_eq!(batches[1].1, vec![text("447002", "bulk")]);
    }

    fn params(mode: Option<&str>, token: Option<&str>, challenge: Option<&str>) -> VerifyParams {
        VerifyParams {
            mode: mode.map(str::to_string),
            verify_token: token.map(str::to_string),
            challenge: challenge.map(str::to_string),
        }
    }

    #[test]
    fn matching_token_echoes_the_challenge() {
        let result = check_verification(
            &params(Some("subscribe"), Some("hub-verify"), Some("1158201444")),
            "hub-verify",
        );
        assert_eq!(result, Some("1158201444".to_string()));
    }

    #[test]
    fn wrong_token_or_mode_is_rejected() {
        assert_eq!(
            check_verification(
                &params(Some("subscribe"), Some("wrong"), Some("1158201444")),
                "hub-verify",
            ),
            None
        );
        assert_eq!(
            check_verification(
                &params(Some("unsubscribe"), Some("hub-verify"), Some("1158201444")),
                "hub-verify",
            ),
            None
        );
        assert_eq!(
            check_verification(&params(Some("subscribe"), Some("hub-verify"), None), "hub-verify"),
            None
        );
    }
}
