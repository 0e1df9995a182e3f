use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Escalation record handed to the human support workflow when negotiation
/// fails. Carries a pre-rendered description plus individually addressable
/// fields so the ticket system can route and template on them.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EscalationRequest {
    pub user_id: String,
    pub subject: String,
    pub description: String,
    pub fields: BTreeMap<String, String>,
}

impl EscalationRequest {
    pub fn new(
        user_id: impl Into<String>,
        subject: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            subject: subject.into(),
            description: description.into(),
            fields: BTreeMap::new(),
        }
    }

    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EscalationOutcome {
    pub success: bool,
    pub ticket_id: Option<u64>,
    pub error: Option<String>,
}

impl EscalationOutcome {
    pub fn accepted(ticket_id: Option<u64>) -> Self {
        Self { success: true, ticket_id, error: None }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self { success: false, ticket_id: None, error: Some(error.into()) }
    }
}

/// Fire-and-forget submission to the external support desk. Callers must
/// not let a failed submit change the user-visible outcome.
#[async_trait]
pub trait EscalationService: Send + Sync {
    async fn submit(&self, request: &EscalationRequest) -> EscalationOutcome;
}

/// Stand-in used in tests and when no desk is configured.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopEscalationService;

#[async_trait]
impl EscalationService for NoopEscalationService {
    async fn submit(&self, request: &EscalationRequest) -> EscalationOutcome {
        tracing::info!(
            event_name = "escalation.noop_submit",
            user_id = %request.user_id,
            subject = %request.subject,
            "escalation submitted to noop desk"
        );
        EscalationOutcome::accepted(None)
    }
}

#[cfg(test)]
mod tests {
    use super::{EscalationOutcome, EscalationRequest, EscalationService, NoopEscalationService};

    #[tokio::test]
    async fn noop_service_always_accepts() {
        let request = EscalationRequest::new("447000000001", "Bulk order lead", "details")
            .with_field("quantity", "50");
        let outcome = NoopEscalationService.submit(&request).await;
        assert_eq!(outcome, EscalationOutcome::accepted(None));
    }
}
