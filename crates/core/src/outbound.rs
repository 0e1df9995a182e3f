use serde::{Deserialize, Serialize};

/// WhatsApp allows at most three reply buttons per interactive message.
pub const MAX_BUTTONS: usize = 3;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Button {
    pub id: String,
    pub title: String,
}

impl Button {
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self { id: id.into(), title: title.into() }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListRow {
    pub id: String,
    pub title: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListSection {
    pub title: Option<String>,
    pub rows: Vec<ListRow>,
}

impl ListSection {
    pub fn from_rows(rows: Vec<(String, String)>) -> Self {
        Self {
            title: None,
            rows: rows.into_iter().map(|(id, title)| ListRow { id, title }).collect(),
        }
    }
}

/// Transport-agnostic outbound message built by the state machine. The
/// messaging layer converts these into Cloud API payloads.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutboundMessage {
    Text { body: String },
    Buttons { body: String, buttons: Vec<Button> },
    List { body: String, button_text: String, sections: Vec<ListSection> },
}

impl OutboundMessage {
    pub fn text(body: impl Into<String>) -> Self {
        Self::Text { body: body.into() }
    }

    /// Extra buttons beyond the platform cap are dropped, never sent.
    pub fn buttons(body: impl Into<String>, buttons: Vec<Button>) -> Self {
        let mut buttons = buttons;
        buttons.truncate(MAX_BUTTONS);
        Self::Buttons { body: body.into(), buttons }
    }

    pub fn list(
        body: impl Into<String>,
        button_text: impl Into<String>,
        sections: Vec<ListSection>,
    ) -> Self {
        Self::List { body: body.into(), button_text: button_text.into(), sections }
    }
}

#[cfg(test)]
mod tests {
    use super::{Button, OutboundMessage};

    #[test]
    fn button_messages_are_capped_at_three() {
        let message = OutboundMessage::buttons(
            "pick one",
            vec![
                Button::new("a", "A"),
                Button::new("b", "B"),
                Button::new("c", "C"),
                Button::new("d", "D"),
            ],
        );
        let OutboundMessage::Buttons { buttons, .. } = message else {
            panic!("expected buttons");
        };
        assert_eq!(buttons.len(), 3);
    }
}
