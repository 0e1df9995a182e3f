use serde::Serialize;

use bulkpix_core::outbound::OutboundMessage;

/// Cloud API `/messages` request body.
#[derive(Debug, Serialize)]
pub struct MessagePayload {
    messaging_product: &'static str,
    recipient_type: &'static str,
    to: String,
    #[serde(rename = "type")]
    kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<TextPayload>,
    #[serde(skip_serializing_if = "Option::is_none")]
    interactive: Option<InteractivePayload>,
}

#[derive(Debug, Serialize)]
struct TextPayload {
    preview_url: bool,
    body: String,
}

#[derive(Debug, Serialize)]
struct InteractivePayload {
    #[serde(rename = "type")]
    kind: &'static str,
    body: BodyPayload,
    action: ActionPayload,
}

#[derive(Debug, Serialize)]
struct BodyPayload {
    text: String,
}

#[derive(Debug, Serialize)]
struct ActionPayload {
    #[serde(skip_serializing_if = "Option::is_none")]
    buttons: Option<Vec<ButtonPayload>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    button: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    sections: Option<Vec<SectionPayload>>,
}

#[derive(Debug, Serialize)]
struct ButtonPayload {
    #[serde(rename = "type")]
    kind: &'static str,
    reply: ReplyPayload,
}

#[derive(Debug, Serialize)]
struct ReplyPayload {
    id: String,
    title: String,
}

#[derive(Debug, Serialize)]
struct SectionPayload {
    #[serde(skip_serializing_if = "Option::is_none")]
    title: Option<String>,
    rows: Vec<RowPayload>,
}

#[derive(Debug, Serialize)]
struct RowPayload {
    id: String,
    title: String,
}

impl MessagePayload {
    pub fn from_outbound(to: &str, message: &OutboundMessage) -> Self {
        match message {
            OutboundMessage::Text { body } => Self {
                messaging_product: "whatsapp",
                recipient_type: "individual",
                to: to.to_string(),
                kind: "text",
                text: Some(TextPayload { preview_url: false, body: body.clone() }),
                interactive: None,
            },
            OutboundMessage::Buttons { body, buttons } => Self {
                messaging_product: "whatsapp",
                recipient_type: "individual",
                to: to.to_string(),
                kind: "interactive",
                text: None,
                interactive: Some(InteractivePayload {
                    kind: "button",
                    body: BodyPayload { text: body.clone() },
                    action: ActionPayload {
                        buttons: Some(
                            buttons
                                .iter()
                                .map(|button| ButtonPayload {
                                    kind: "reply",
                                    reply: ReplyPayload {
                                        id: button.id.clone(),
                                        title: button.title.clone(),
                                    },
                                })
                                .collect(),
                        ),
                        button: None,
                        sections: None,
                    },
                }),
            },
            OutboundMessage::List { body, button_text, sections } => Self {
                messaging_product: "whatsapp",
                recipient_type: "individual",
                to: to.to_string(),
                kind: "interactive",
                text: None,
                interactive: Some(InteractivePayload {
                    kind: "list",
                    body: BodyPayload { text: body.clone() },
                    action: ActionPayload {
                        buttons: None,
                        button: Some(button_text.clone()),
                        sections: Some(
                            sections
                                .iter()
                                .map(|section| SectionPayload {
                                    title: section.title.clone(),
                                    rows: section
                                        .rows
                                        .iter()
                                        .map(|row| RowPayload {
                                            id: row.id.clone(),
                                            title: row.title.clone(),
                                        })
                                        .collect(),
                                })
                                .collect(),
                        ),
                    },
                }),
            },
        }
    }
}
