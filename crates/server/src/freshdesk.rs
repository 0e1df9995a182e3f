use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;

use bulkpix_core::escalation::{EscalationOutcome, EscalationRequest, EscalationService};

/// Ticket source id Freshdesk assigns to WhatsApp-originated tickets.
const SOURCE_WHATSAPP: u32 = 13;
/// Created tickets land pre-closed; agents work them from the lead queue.
const STATUS_CLOSED: u32 = 5;
const PRIORITY_HIGH: u32 = 3;
const DEFAULT_RESPONDER_ID: u64 = 103_141_023_779;
const FALLBACK_EMAIL: &str = "whatsapp-bulk@printerpix.co.uk";

/// Escalation desk backed by the Freshdesk v2 tickets API with basic auth
/// (api key as username, literal "X" as password).
pub struct FreshdeskEscalationService {
    http: reqwest::Client,
    tickets_url: String,
    api_key: SecretString,
    responder_id: u64,
}

#[derive(Debug, Serialize)]
struct TicketPayload<'a> {
    email: &'a str,
    source: u32,
    tags: [&'static str; 1],
    status: u32,
    priority: u32,
    responder_id: u64,
    custom_fields: CustomFields,
    subject: &'a str,
    description: String,
}

#[derive(Debug, Serialize)]
struct CustomFields {
    cf_exclude_from_automations: bool,
    cf_noapi: bool,
}

impl FreshdeskEscalationService {
    pub fn new(
        domain: impl Into<String>,
        api_key: SecretString,
        responder_id: Option<u64>,
        timeout_secs: u64,
    ) -> Result<Self, reqwest::Error> {
        let http =
            reqwest::Client::builder().timeout(Duration::from_secs(timeout_secs.max(1))).build()?;
        Ok(Self {
            http,
            tickets_url: format!("https://{}/api/v2/tickets", domain.into()),
            api_key,
            responder_id: responder_id.unwrap_or(DEFAULT_RESPONDER_ID),
        })
    }

    fn payload<'a>(&self, request: &'a EscalationRequest) -> TicketPayload<'a> {
        TicketPayload {
            email: request
                .fields
                .get("email")
                .map(String::as_str)
                .filter(|email| !email.is_empty() && *email != "Not provided")
                .unwrap_or(FALLBACK_EMAIL),
            source: SOURCE_WHATSAPP,
            tags: ["WhatsAppBulk"],
            status: STATUS_CLOSED,
            priority: PRIORITY_HIGH,
            responder_id: self.responder_id,
            custom_fields: CustomFields { cf_exclude_from_automations: true, cf_noapi: true },
            subject: &request.subject,
            // Freshdesk renders the description as HTML.
            description: request.description.replace('\n', "<br>"),
        }
    }
}

#[async_trait]
impl EscalationService for FreshdeskEscalationService {
    async fn submit(&self, request: &EscalationRequest) -> EscalationOutcome {
        let response = self
            .http
            .post(&self.tickets_url)
            .basic_auth(self.api_key.expose_secret(), Some("X"))
            .json(&self.payload(request))
            .send()
            .await;

        let response = match response {
            Ok(response) => response,
            Err(err) => return EscalationOutcome::failed(err.to_string()),
        };

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return EscalationOutcome::failed(format!("freshdesk returned {status}: {body}"));
        }

        let ticket_id = response
            .json::<serde_json::Value>()
            .await
            .ok()
            .and_then(|ticket| ticket.get("id").and_then(serde_json::Value::as_u64));

        EscalationOutcome::accepted(ticket_id)
    }
}

#[cfg(test)]
mod tests {
    use secrecy::SecretString;

    use bulkpix_core::escalation::EscalationRequest;

    use super::FreshdeskEscalationService;

    fn service() -> FreshdeskEscalationService {
        FreshdeskEscalationService::new(
            "printerpix-support.freshdesk.com",
            SecretString::from("test-key"),
            None,
            10,
        )
        .expect("build service")
    }

    #[test]
    fn payload_carries_the_routing_constants() {
        let request = EscalationRequest::new(
            "447000000001",
            "Bulk Order Lead - WhatsApp",
            "BULK ORDER LEAD - 447000000001\nProduct: Blankets\nQuantity: 50",
        )
        .with_field("email", "buyer@example.com");

        let service = service();
        let value = serde_json::to_value(service.payload(&request)).expect("serialize");

        assert_eq!(value["email"], "buyer@example.com");
        assert_eq!(value["source"], 13);
        assert_eq!(value["status"], 5);
        assert_eq!(value["priority"], 3);
        assert_eq!(value["tags"][0], "WhatsAppBulk");
        assert_eq!(value["custom_fields"]["cf_exclude_from_automations"], true);
        assert_eq!(value["custom_fields"]["cf_noapi"], true);
        assert!(value["description"].as_str().expect("description").contains("<br>"));
    }

    #[test]
    fn skipped_email_falls_back_to_the_shared_inbox() {
        let request = EscalationRequest::new("447000000001", "Bulk Order Lead", "details")
            .with_field("email", "Not provided");

        let service = service();
        let value = serde_json::to_value(service.payload(&request)).expect("serialize");

        assert_eq!(value["email"], super::FALLBACK_EMAIL);
    }
}
