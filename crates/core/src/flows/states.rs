use serde::{Deserialize, Serialize};

use crate::analytics::AnalyticsEvent;
use crate::escalation::EscalationRequest;
use crate::outbound::OutboundMessage;

/// Observable tag describing what a dispatch did. Every handler returns one
/// of these instead of raising, so the messaging layer can log uniformly.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Restarted,
    ProductSelected,
    ExtraListShown,
    ExtraSelected,
    SelectionStored,
    UnknownSelection,
    QuantityStored,
    QuantityTooLow,
    QuantityReprompted,
    QuantityChangeRequested,
    QuantityGoToWebsite,
    EmailStored,
    EmailSkipped,
    EmailReprompted,
    FirstDiscountOffered,
    SecondDiscountOffered,
    DiscountAccepted,
    DiscountDeclined,
    NotReady,
    NameRequested,
    Escalated,
    Reprompted,
    NotInFlow,
}

impl Outcome {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Restarted => "restarted",
            Self::ProductSelected => "product_selected",
            Self::ExtraListShown => "extra_list_shown",
            Self::ExtraSelected => "extra_selected",
            Self::SelectionStored => "selection_stored",
            Self::UnknownSelection => "unknown_selection",
            Self::QuantityStored => "quantity_stored",
            Self::QuantityTooLow => "quantity_too_low",
            Self::QuantityReprompted => "quantity_reprompted",
            Self::QuantityChangeRequested => "quantity_change_requested",
            Self::QuantityGoToWebsite => "quantity_go_to_website",
            Self::EmailStored => "email_stored",
            Self::EmailSkipped => "email_skipped",
            Self::EmailReprompted => "email_reprompted",
            Self::FirstDiscountOffered => "first_discount_offered",
            Self::SecondDiscountOffered => "second_discount_offered",
            Self::DiscountAccepted => "discount_accepted",
            Self::DiscountDeclined => "discount_declined",
            Self::NotReady => "not_ready",
            Self::NameRequested => "name_requested",
            Self::Escalated => "escalated",
            Self::Reprompted => "reprompted",
            Self::NotInFlow => "not_in_flow",
        }
    }
}

/// Side effects requested by a transition. The engine never performs I/O
/// beyond the session store itself; everything user-visible or fire-and-
/// forget comes back here for the caller to execute. A failed escalation or
/// analytics write is structurally unable to change the outcome.
#[derive(Clone, Debug, PartialEq)]
pub enum Effect {
    Reply(OutboundMessage),
    Escalate(EscalationRequest),
    Track(AnalyticsEvent),
}

#[derive(Clone, Debug, PartialEq)]
pub struct EngineReply {
    pub outcome: Outcome,
    pub effects: Vec<Effect>,
}

impl EngineReply {
    pub fn new(outcome: Outcome) -> Self {
        Self { outcome, effects: Vec::new() }
    }

    pub fn with_reply(mut self, message: OutboundMessage) -> Self {
        self.effects.push(Effect::Reply(message));
        self
    }

    pub fn with_effect(mut self, effect: Effect) -> Self {
        self.effects.push(effect);
        self
    }

    /// Outbound messages in the order they should be sent.
    pub fn replies(&self) -> impl Iterator<Item = &OutboundMessage> {
        self.effects.iter().filter_map(|effect| match effect {
            Effect::Reply(message) => Some(message),
            _ => None,
        })
    }

    pub fn escalations(&self) -> impl Iterator<Item = &EscalationRequest> {
        self.effects.iter().filter_map(|effect| match effect {
            Effect::Escalate(request) => Some(request),
            _ => None,
        })
    }
}
