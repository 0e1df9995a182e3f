use serde::Deserialize;

/// One inbound user action, already stripped of Cloud API framing.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum InboundEvent {
    ButtonTap { user_id: String, button_id: String },
    ListSelection { user_id: String, row_id: String },
    FreeText { user_id: String, text: String },
}

impl InboundEvent {
    pub fn user_id(&self) -> &str {
        match self {
            Self::ButtonTap { user_id, .. }
            | Self::ListSelection { user_id, .. }
            | Self::FreeText { user_id, .. } => user_id,
        }
    }
}

#[derive(Debug, Deserialize)]
struct WebhookPayload {
    #[serde(default)]
    entry: Vec<Entry>,
}

#[derive(Debug, Deserialize)]
struct Entry {
    #[serde(default)]
    changes: Vec<Change>,
}

#[derive(Debug, Deserialize)]
struct Change {
    value: ChangeValue,
}

#[derive(Debug, Deserialize)]
struct ChangeValue {
    #[serde(default)]
    messages: Vec<InboundMessage>,
}

#[derive(Debug, Deserialize)]
struct InboundMessage {
    from: String,
    #[serde(rename = "type")]
    kind: String,
    text: Option<TextBody>,
    interactive: Option<Interactive>,
}

#[derive(Debug, Deserialize)]
struct TextBody {
    body: String,
}

#[derive(Debug, Deserialize)]
struct Interactive {
    button_reply: Option<InteractiveReply>,
    list_reply: Option<InteractiveReply>,
}

#[derive(Debug, Deserialize)]
struct InteractiveReply {
    id: String,
}

/// Extracts user actions from a webhook notification. Delivery status
/// updates, reactions and unsupported message types are skipped; a payload
/// with nothing actionable parses to an empty list rather than an error.
pub fn parse_webhook(payload: &serde_json::Value) -> Vec<InboundEvent> {
    let Ok(payload) = serde_json::from_value::<WebhookPayload>(payload.clone()) else {
        tracing::warn!(event_name = "webhook.unparseable_payload", "ignoring webhook payload");
        return Vec::new();
    };

    let mut events = Vec::new();
    for entry in payload.entry {
        for change in entry.changes {
            for message in change.value.messages {
                if let Some(event) = event_from_message(message) {
                    events.push(event);
                }
            }
        }
    }
    events
}

fn event_from_message(message: InboundMessage) -> Option<InboundEvent> {
    match message.kind.as_str() {
        "text" => {
            let text = message.text?.body;
            Some(InboundEvent::FreeText { user_id: message.from, text })
        }
        "interactive" => {
            let interactive = message.interactive?;
            if let Some(reply) = interactive.button_reply {
                return Some(InboundEvent::ButtonTap {
                    user_id: message.from,
                    button_id: reply.id,
                });
            }
            if let Some(reply) = interactive.list_reply {
                return Some(InboundEvent::ListSelection {
                    user_id: message.from,
                    row_id: reply.id,
                });
            }
            None
        }
        other => {
            tracing::debug!(
                event_name = "webhook.unsupported_message_type",
                message_type = other,
                "skipping message"
            );
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{parse_webhook, InboundEvent};

    fn wrap(messages: serde_json::Value) -> serde_json::Value {
        json!({
            "object": "whatsapp_business_account",
            "entry": [{
                "id": "123456",
                "changes": [{
                    "field": "messages",
                    "value": {
                        "messaging_product": "whatsapp",
                        "metadata": { "phone_number_id": "987654" },
                        "messages": messages
                    }
                }]
            }]
        })
    }

    #[test]
    fn text_messages_become_free_text_events() {
        let payload = wrap(json!([{
            "from": "447000000001",
            "id": "wamid.abc",
            "type": "text",
            "text": { "body": "50" }
        }]));

        let events = parse_webhook(&payload);
        assert_eq!(
            events,
            vec![InboundEvent::FreeText {
                user_id: "447000000001".to_string(),
                text: "50".to_string()
            }]
        );
    }

    #[test]
    fn button_and_list_replies_carry_their_ids() {
        let payload = wrap(json!([
            {
                "from": "447000000001",
                "id": "wamid.abc",
                "type": "interactive",
                "interactive": {
                    "type": "button_reply",
                    "button_reply": { "id": "discount_accept", "title": "Yes" }
                }
            },
            {
                "from": "447000000001",
                "id": "wamid.def",
                "type": "interactive",
                "interactive": {
                    "type": "list_reply",
                    "list_reply": { "id": "product_blankets", "title": "Blankets" }
                }
            }
        ]));

        let events = parse_webhook(&payload);
        assert_eq!(events.len(), 2);
        assert_eq!(
            events[0],
            InboundEvent::ButtonTap {
                user_id: "447000000001".to_string(),
                button_id: "discount_accept".to_string()
            }
        );
        assert_eq!(
            events[1],
            InboundEvent::ListSelection {
                user_id: "447000000001".to_string(),
                row_id: "product_blankets".to_string()
            }
        );
    }

    #[test]
    fn status_only_notifications_parse_to_no_events() {
        let payload = serde_json::json!({
            "object": "whatsapp_business_account",
            "entry": [{
                "id": "123456",
                "changes": [{
                    "field": "messages",
                    "value": {
                        "messaging_product": "whatsapp",
                        "statuses": [{ "id": "wamid.abc", "status": "delivered" }]
                    }
                }]
            }]
        });

        assert!(parse_webhook(&payload).is_empty());
    }

    #[test]
    fn unsupported_message_types_are_skipped() {
        let payload = wrap(serde_json::json!([{
            "from": "447000000001",
            "id": "wamid.abc",
            "type": "image",
            "image": { "id": "media-id" }
        }]));

        assert!(parse_webhook(&payload).is_empty());
    }

    #[test]
    fn garbage_payloads_are_ignored_without_panicking() {
        assert!(parse_webhook(&serde_json::json!({ "entry": "nope" })).is_empty());
        assert!(parse_webhook(&serde_json::json!(null)).is_empty());
    }
}
