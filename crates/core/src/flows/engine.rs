//! The bulk-order conversation state machine.
//!
//! Dispatch is keyed on the stored [`SessionState`]; each handler mutates the
//! session, persists it, and returns an [`EngineReply`] carrying the outcome
//! tag plus the effects (messages, escalation, analytics) for the caller to
//! execute. Input that makes no sense for the current state re-prompts and
//! leaves the session alone.

use std::time::Duration;

use crate::analytics::AnalyticsEvent;
use crate::domain::catalog::{
    Catalog, Product, SpecComponent, SpecQuestion, SpecStep, EXTRA_PREFIX, PRODUCT_PREFIX,
    SHOW_MORE_ID,
};
use crate::domain::quote::PriceQuote;
use crate::domain::session::{Selections, Session, SessionState, SessionStore};
use crate::domain::tier::DiscountTier;
use crate::errors::EngineError;
use crate::escalation::EscalationRequest;
use crate::flows::states::{Effect, EngineReply, Outcome};
use crate::outbound::{Button, ListSection, OutboundMessage};
use crate::pricing::resolver::QuoteResolver;

/// Bulk pricing only applies above this quantity.
pub const MIN_BULK_QUANTITY: u32 = 10;

pub const DEFAULT_SESSION_TTL: Duration = Duration::from_secs(3600);

const SKIP_SYNONYMS: &[&str] = &["skip", "no", "n", "none", "not needed"];
const RESTART_KEYWORDS: &[&str] = &["restart", "reset"];
const ACCEPT_KEYWORDS: &[&str] = &["yes", "yeah", "yep", "yup", "ok", "okay", "sure", "proceed"];
const DECLINE_KEYWORDS: &[&str] = &["no", "not", "nope", "nah", "decline"];
const NOT_READY_KEYWORDS: &[&str] = &["ready", "later", "yet", "soon", "wait", "thinking"];
const TOO_EXPENSIVE_KEYWORDS: &[&str] =
    &["expensive", "price", "cost", "cheaper", "pricey", "budget", "dear"];

const BTN_ACCEPT: &str = "discount_accept";
const BTN_DECLINE: &str = "discount_reject";
const BTN_NOT_READY: &str = "decline_not_ready";
const BTN_TOO_EXPENSIVE: &str = "decline_too_expensive";
const BTN_GO_WEBSITE: &str = "quantity_go_website";
const BTN_CHANGE_QUANTITY: &str = "quantity_change";

pub struct BulkOrderEngine<S, R> {
    store: S,
    resolver: R,
    catalog: Catalog,
    session_ttl: Duration,
}

impl<S, R> BulkOrderEngine<S, R>
where
    S: SessionStore,
    R: QuoteResolver,
{
    pub fn new(store: S, resolver: R) -> Self {
        Self { store, resolver, catalog: Catalog, session_ttl: DEFAULT_SESSION_TTL }
    }

    pub fn with_session_ttl(mut self, ttl: Duration) -> Self {
        self.session_ttl = ttl;
        self
    }

    /// Clears any prior session and renders the product picker. Idempotent.
    pub async fn start_flow(&self, user_id: &str) -> Result<EngineReply, EngineError> {
        self.store.clear(user_id).await?;
        let session = Session::new(SessionState::SelectingProduct);
        self.persist(user_id, &session).await?;

        Ok(EngineReply::new(Outcome::Restarted)
            .with_effect(Effect::Track(AnalyticsEvent::new("flow_started", user_id)))
            .with_reply(self.product_picker()))
    }

    /// Button tap or list selection.
    pub async fn handle_interactive(
        &self,
        user_id: &str,
        selection_id: &str,
    ) -> Result<EngineReply, EngineError> {
        let Some(mut session) = self.load(user_id).await? else {
            // No live session: a tap on a stale message restarts the flow.
            return self.start_flow(user_id).await;
        };

        match session.state {
            SessionState::SelectingProduct => {
                self.select_product(user_id, &mut session, selection_id).await
            }
            SessionState::SelectingSpecs => {
                self.select_spec(user_id, &mut session, selection_id).await
            }
            SessionState::HandlingQuantityLimit => {
                self.handle_quantity_limit(user_id, &mut session, selection_id).await
            }
            SessionState::OfferingFirstDiscount | SessionState::OfferingSecondDiscount => {
                match selection_id {
                    BTN_ACCEPT => self.accept_discount(user_id, &session).await,
                    BTN_DECLINE => self.decline_discount(user_id, &mut session).await,
                    _ => Ok(self.reprompt_offer(&session)),
                }
            }
            SessionState::AskingDeclineReason | SessionState::AskingAfterSecondDiscount => {
                match selection_id {
                    BTN_NOT_READY => self.end_not_ready(user_id).await,
                    BTN_TOO_EXPENSIVE => self.escalate_or_next_tier(user_id, &mut session).await,
                    _ => Ok(self.reprompt_decline_reason()),
                }
            }
            // Text-input states: an interactive payload here is a stale tap.
            SessionState::AskingQuantity
            | SessionState::AskingEmail
            | SessionState::AskingPostcode
            | SessionState::AskingNameForEscalation => {
                tracing::info!(
                    event_name = "flow.unexpected_interactive",
                    user_id,
                    selection_id,
                    state = ?session.state,
                    "interactive input in a text state, re-prompting"
                );
                Ok(EngineReply::new(Outcome::UnknownSelection)
                    .with_reply(self.prompt_for(&session)))
            }
        }
    }

    /// Free text. States that expect buttons still accept text via keyword
    /// classification so the flow is not strictly button-driven.
    pub async fn handle_free_text(
        &self,
        user_id: &str,
        text: &str,
    ) -> Result<EngineReply, EngineError> {
        let Some(mut session) = self.load(user_id).await? else {
            return Ok(EngineReply::new(Outcome::NotInFlow));
        };

        // Mid-flow restart keyword discards everything collected so far.
        if is_restart(text) {
            self.store.clear(user_id).await?;
            let fresh = Session::new(SessionState::SelectingProduct);
            self.persist(user_id, &fresh).await?;
            return Ok(EngineReply::new(Outcome::Restarted)
                .with_effect(Effect::Track(AnalyticsEvent::new("flow_restarted", user_id)))
                .with_reply(OutboundMessage::text(
                    "Got it! I've reset your bulk order. Let's start again. 🔄",
                ))
                .with_reply(self.product_picker()));
        }

        match session.state {
            SessionState::AskingQuantity => {
                self.handle_quantity_text(user_id, &mut session, text).await
            }
            SessionState::AskingEmail => self.handle_email_text(user_id, &mut session, text).await,
            SessionState::AskingPostcode => {
                self.handle_postcode_text(user_id, &mut session, text).await
            }
            SessionState::AskingNameForEscalation => {
                self.handle_name_text(user_id, &mut session, text).await
            }
            SessionState::OfferingFirstDiscount | SessionState::OfferingSecondDiscount => {
                match classify_accept_decline(text) {
                    Some(true) => self.accept_discount(user_id, &session).await,
                    Some(false) => self.decline_discount(user_id, &mut session).await,
                    None => Ok(self.reprompt_offer(&session)),
                }
            }
            SessionState::AskingDeclineReason | SessionState::AskingAfterSecondDiscount => {
                match classify_decline_reason(text) {
                    Some(DeclineReason::NotReady) => self.end_not_ready(user_id).await,
                    Some(DeclineReason::TooExpensive) => {
                        self.escalate_or_next_tier(user_id, &mut session).await
                    }
                    None => Ok(self.reprompt_decline_reason()),
                }
            }
            SessionState::SelectingProduct | SessionState::SelectingSpecs
            | SessionState::HandlingQuantityLimit => {
                Ok(EngineReply::new(Outcome::Reprompted).with_reply(self.prompt_for(&session)))
            }
        }
    }

    async fn select_product(
        &self,
        user_id: &str,
        session: &mut Session,
        selection_id: &str,
    ) -> Result<EngineReply, EngineError> {
        if let Some(extra_id) = selection_id.strip_prefix(EXTRA_PREFIX) {
            let Some(extra) = self.catalog.extra(extra_id) else {
                return Ok(self.unknown_selection(user_id, selection_id, session));
            };
            session.selections = Selections::for_product(extra.id);
            session.selections.catalogue_extra = true;
            session.state = SessionState::AskingQuantity;
            self.persist(user_id, session).await?;

            return Ok(EngineReply::new(Outcome::ExtraSelected)
                .with_effect(Effect::Track(
                    AnalyticsEvent::new("product_selected", user_id).with("product", extra.id),
                ))
                .with_reply(ask_quantity()));
        }

        if selection_id == SHOW_MORE_ID {
            // Sub-list of catalogue extras; state is unchanged.
            return Ok(EngineReply::new(Outcome::ExtraListShown).with_reply(
                OutboundMessage::list(
                    "Which product are you interested in?",
                    "Choose Product",
                    vec![ListSection::from_rows(self.catalog.extra_rows())],
                ),
            ));
        }

        if let Some(product_id) = selection_id.strip_prefix(PRODUCT_PREFIX) {
            let Some(product) = self.catalog.find(product_id) else {
                return Ok(self.unknown_selection(user_id, selection_id, session));
            };
            session.selections = Selections::for_product(product.id);

            let reply = if product.questions.is_empty() {
                session.state = SessionState::AskingQuantity;
                ask_quantity()
            } else {
                session.state = SessionState::SelectingSpecs;
                self.render_question(product, &session.selections)
            };
            self.persist(user_id, session).await?;

            return Ok(EngineReply::new(Outcome::ProductSelected)
                .with_effect(Effect::Track(
                    AnalyticsEvent::new("product_selected", user_id).with("product", product.id),
                ))
                .with_reply(reply));
        }

        Ok(self.unknown_selection(user_id, selection_id, session))
    }

    async fn select_spec(
        &self,
        user_id: &str,
        session: &mut Session,
        selection_id: &str,
    ) -> Result<EngineReply, EngineError> {
        let Some(product) = session
            .selections
            .product
            .as_ref()
            .and_then(|product| self.catalog.find(product.as_str()))
        else {
            // Product vanished from the session; only a restart makes sense.
            return self.start_flow(user_id).await;
        };

        // A selection must answer the step currently being asked, not any
        // step of the product.
        let Some(question) = self.catalog.next_question(product, &session.selections) else {
            session.state = SessionState::AskingQuantity;
            self.persist(user_id, session).await?;
            return Ok(EngineReply::new(Outcome::SelectionStored).with_reply(ask_quantity()));
        };

        if !question.accepts(selection_id) {
            return Ok(self.unknown_selection(user_id, selection_id, session));
        }

        session.selections.set_option(question.step, selection_id);
        let reply = if self.catalog.all_steps_answered(product, &session.selections) {
            session.state = SessionState::AskingQuantity;
            ask_quantity()
        } else {
            self.render_question(product, &session.selections)
        };
        self.persist(user_id, session).await?;

        Ok(EngineReply::new(Outcome::SelectionStored)
            .with_effect(Effect::Track(
                AnalyticsEvent::new("spec_selected", user_id)
                    .with("step", question.step.as_str())
                    .with("option", selection_id),
            ))
            .with_reply(reply))
    }

    async fn handle_quantity_text(
        &self,
        user_id: &str,
        session: &mut Session,
        text: &str,
    ) -> Result<EngineReply, EngineError> {
        let Some(quantity) = first_integer(text) else {
            return Ok(EngineReply::new(Outcome::QuantityReprompted).with_reply(
                OutboundMessage::text("Please enter a valid number. For example: 50, 100, etc."),
            ));
        };

        if quantity <= MIN_BULK_QUANTITY {
            session.state = SessionState::HandlingQuantityLimit;
            self.persist(user_id, session).await?;

            return Ok(EngineReply::new(Outcome::QuantityTooLow)
                .with_effect(Effect::Track(
                    AnalyticsEvent::new("quantity_too_low", user_id)
                        .with("quantity", quantity.to_string()),
                ))
                .with_reply(quantity_limit_buttons()));
        }

        session.selections.quantity = Some(quantity);
        session.state = SessionState::AskingEmail;
        self.persist(user_id, session).await?;

        Ok(EngineReply::new(Outcome::QuantityStored)
            .with_effect(Effect::Track(
                AnalyticsEvent::new("quantity_captured", user_id)
                    .with("quantity", quantity.to_string()),
            ))
            .with_reply(ask_email()))
    }

    async fn handle_quantity_limit(
        &self,
        user_id: &str,
        session: &mut Session,
        selection_id: &str,
    ) -> Result<EngineReply, EngineError> {
        match selection_id {
            BTN_GO_WEBSITE => {
                let url = self.catalog.product_url(&session.selections);
                self.store.clear(user_id).await?;

                Ok(EngineReply::new(Outcome::QuantityGoToWebsite)
                    .with_effect(Effect::Track(AnalyticsEvent::new("website_redirect", user_id)))
                    .with_reply(OutboundMessage::text(format!(
                        "No problem! For orders of {MIN_BULK_QUANTITY} units or fewer you can \
                         order directly on our website:\n\n{url}"
                    ))))
            }
            BTN_CHANGE_QUANTITY => {
                session.state = SessionState::AskingQuantity;
                self.persist(user_id, session).await?;
                Ok(EngineReply::new(Outcome::QuantityChangeRequested).with_reply(ask_quantity()))
            }
            _ => Ok(EngineReply::new(Outcome::UnknownSelection)
                .with_reply(quantity_limit_buttons())),
        }
    }

    async fn handle_email_text(
        &self,
        user_id: &str,
        session: &mut Session,
        text: &str,
    ) -> Result<EngineReply, EngineError> {
        let trimmed = text.trim();
        let outcome = if is_skip(trimmed) {
            Outcome::EmailSkipped
        } else if is_valid_email(trimmed) {
            session.selections.email = Some(trimmed.to_string());
            Outcome::EmailStored
        } else {
            return Ok(EngineReply::new(Outcome::EmailReprompted).with_reply(
                OutboundMessage::text(
                    "Please enter a valid email address. For example: yourname@example.com \
                     (or type 'skip')",
                ),
            ));
        };

        session.state = SessionState::AskingPostcode;
        self.persist(user_id, session).await?;

        Ok(EngineReply::new(outcome)
            .with_effect(Effect::Track(AnalyticsEvent::new("email_step_done", user_id)))
            .with_reply(ask_postcode()))
    }

    async fn handle_postcode_text(
        &self,
        user_id: &str,
        session: &mut Session,
        text: &str,
    ) -> Result<EngineReply, EngineError> {
        let trimmed = text.trim();
        if !is_skip(trimmed) {
            session.selections.postcode = Some(trimmed.to_uppercase());
        }

        // The postcode step always flows straight into the first offer;
        // the offer is the observable transition.
        self.render_offer(user_id, session, DiscountTier::First).await
    }

    async fn accept_discount(
        &self,
        user_id: &str,
        session: &Session,
    ) -> Result<EngineReply, EngineError> {
        let tier = self.current_tier(session);
        let url = self.catalog.product_url(&session.selections);
        self.store.clear(user_id).await?;

        Ok(EngineReply::new(Outcome::DiscountAccepted)
            .with_effect(Effect::Track(
                AnalyticsEvent::new("discount_accepted", user_id).with("tier", tier.as_str()),
            ))
            .with_reply(OutboundMessage::text(format!(
                "Perfect! Your discount code *{}* is ready to use on our website.\n\n\
                 Visit: {url}\n\n\
                 Apply the code at checkout. Happy to help with anything else!",
                tier.code()
            ))))
    }

    async fn decline_discount(
        &self,
        user_id: &str,
        session: &mut Session,
    ) -> Result<EngineReply, EngineError> {
        let tier = self.current_tier(session);
        session.state = match tier {
            DiscountTier::First => SessionState::AskingDeclineReason,
            DiscountTier::Second => SessionState::AskingAfterSecondDiscount,
        };
        self.persist(user_id, session).await?;

        Ok(EngineReply::new(Outcome::DiscountDeclined)
            .with_effect(Effect::Track(
                AnalyticsEvent::new("discount_declined", user_id).with("tier", tier.as_str()),
            ))
            .with_reply(decline_reason_buttons()))
    }

    async fn end_not_ready(&self, user_id: &str) -> Result<EngineReply, EngineError> {
        self.store.clear(user_id).await?;

        Ok(EngineReply::new(Outcome::NotReady)
            .with_effect(Effect::Track(AnalyticsEvent::new("flow_ended_not_ready", user_id)))
            .with_reply(OutboundMessage::text(
                "No problem at all! The quote will be here whenever you're ready. \
                 Just message us again to pick things up. 👋",
            )))
    }

    /// "Too expensive" advances to the next tier while one exists; past the
    /// last tier it enters the escalation branch.
    async fn escalate_or_next_tier(
        &self,
        user_id: &str,
        session: &mut Session,
    ) -> Result<EngineReply, EngineError> {
        let declined = match session.state {
            SessionState::AskingDeclineReason => DiscountTier::First,
            _ => DiscountTier::Second,
        };
        match declined.next() {
            Some(tier) => self.render_offer(user_id, session, tier).await,
            None => {
                session.state = SessionState::AskingNameForEscalation;
                session.pending_escalation = true;
                self.persist(user_id, session).await?;

                Ok(EngineReply::new(Outcome::NameRequested).with_reply(OutboundMessage::text(
                    "I understand. Let me connect you with our bulk-order specialist for \
                     the best possible rate.\n\n\
                     Before I pass this over, may I take your name? (or type 'skip')",
                )))
            }
        }
    }

    async fn handle_name_text(
        &self,
        user_id: &str,
        session: &mut Session,
        text: &str,
    ) -> Result<EngineReply, EngineError> {
        // One-shot digression: without the flag a stray message here must
        // not produce a second ticket.
        if !session.pending_escalation {
            self.store.clear(user_id).await?;
            return Ok(EngineReply::new(Outcome::NotInFlow));
        }

        let trimmed = text.trim();
        if !trimmed.is_empty() && !is_skip(trimmed) {
            session.selections.name = Some(trimmed.to_string());
        }
        session.pending_escalation = false;

        let request = self.escalation_request(user_id, session);
        self.store.clear(user_id).await?;

        Ok(EngineReply::new(Outcome::Escalated)
            .with_effect(Effect::Escalate(request))
            .with_effect(Effect::Track(AnalyticsEvent::new("escalated", user_id)))
            .with_reply(OutboundMessage::text(
                "Thanks! I've forwarded your details to our bulk-order specialist — \
                 they'll reach out shortly with our best rate. 🤝",
            )))
    }

    fn escalation_request(&self, user_id: &str, session: &Session) -> EscalationRequest {
        let selections = &session.selections;
        let product_name = self.catalog.display_name(selections);
        let quantity =
            selections.quantity.map_or_else(|| "unknown".to_string(), |q| q.to_string());
        let email = selections.email.as_deref().unwrap_or("Not provided");
        let postcode = selections.postcode.as_deref().unwrap_or("Not provided");
        let name = selections.name.as_deref().unwrap_or("Not provided");

        let description = format!(
            "BULK ORDER LEAD - {user_id}\n\n\
             Name: {name}\n\
             Product: {product_name}\n\
             Quantity: {quantity}\n\
             Email: {email}\n\
             Postcode: {postcode}\n\n\
             Customer declined both bulk discount tiers ({} / {}). \
             Please contact them with our best rate.",
            DiscountTier::First.code(),
            DiscountTier::Second.code(),
        );

        let mut request =
            EscalationRequest::new(user_id, format!("Bulk order lead - {product_name}"), description)
                .with_field("product", product_name)
                .with_field("quantity", quantity)
                .with_field("email", email)
                .with_field("postcode", postcode)
                .with_field("name", name)
                .with_field("tier_declined", DiscountTier::Second.as_str());

        for step in
            [SpecStep::Fabric, SpecStep::Size, SpecStep::Cover, SpecStep::Pages, SpecStep::MugType]
        {
            if let Some(option) = selections.option_for(step) {
                request = request.with_field(step.as_str(), option);
            }
        }
        request
    }

    async fn render_offer(
        &self,
        user_id: &str,
        session: &mut Session,
        tier: DiscountTier,
    ) -> Result<EngineReply, EngineError> {
        let quantity = session.selections.quantity.unwrap_or(0);
        let quote = self.resolver.resolve(&session.selections, quantity, tier).await;

        session.state = match tier {
            DiscountTier::First => SessionState::OfferingFirstDiscount,
            DiscountTier::Second => SessionState::OfferingSecondDiscount,
        };
        if !session.offered(tier) {
            session.discount_offers.push(tier);
        }
        self.persist(user_id, session).await?;

        let outcome = match tier {
            DiscountTier::First => Outcome::FirstDiscountOffered,
            DiscountTier::Second => Outcome::SecondDiscountOffered,
        };

        let track = AnalyticsEvent::new("quote_rendered", user_id)
            .with("tier", tier.as_str())
            .with("success", quote.success.to_string())
            .with("estimated", quote.is_estimated.to_string())
            .with("partial", quote.is_partial().to_string());

        let body = self.offer_body(session, tier, quantity, &quote);
        Ok(EngineReply::new(outcome).with_effect(Effect::Track(track)).with_reply(
            OutboundMessage::buttons(
                body,
                vec![Button::new(BTN_ACCEPT, "Yes"), Button::new(BTN_DECLINE, "No")],
            ),
        ))
    }

    fn offer_body(
        &self,
        session: &Session,
        tier: DiscountTier,
        quantity: u32,
        quote: &PriceQuote,
    ) -> String {
        let product_name = self.catalog.display_name(&session.selections);
        let header = match tier {
            DiscountTier::First => "Great! Here's your quick quote:",
            DiscountTier::Second => "I can extend a better bulk incentive today:",
        };

        let mut body = format!("{header}\n\nProduct: {product_name}\nQuantity: {quantity} units\n");

        match (&quote.unit_price, &quote.total_price, &quote.discount_percent) {
            (Some(unit), Some(total), Some(percent)) => {
                body.push_str(&format!(
                    "\nDiscount: {}% off\nPrice per unit: £{unit:.2}\nTotal for {quantity} \
                     units: £{total:.2}\n",
                    percent.normalize()
                ));
                if quote.is_estimated {
                    body.push_str("\n_Prices shown are estimates._\n");
                }
            }
            (None, _, Some(percent)) if quote.success => {
                body.push_str(&format!(
                    "\nDiscount: {}% off\n_Live pricing is temporarily unavailable — the \
                     discount still applies at checkout._\n",
                    percent.normalize()
                ));
            }
            _ => {
                // No live figures at all; the code alone is still worth
                // sending.
                body.push_str("\n_Live pricing is temporarily unavailable._\n");
            }
        }

        body.push_str(&format!(
            "\nUse discount code: *{}* for your bulk order on our website.\n\nReady to proceed?",
            tier.code()
        ));
        body
    }

    fn current_tier(&self, session: &Session) -> DiscountTier {
        match session.state {
            SessionState::OfferingSecondDiscount => DiscountTier::Second,
            _ => DiscountTier::First,
        }
    }

    fn product_picker(&self) -> OutboundMessage {
        OutboundMessage::list(
            "Welcome to Bulk Ordering 👋 I'll get you a quick quote.\n\n\
             Which product are you interested in?",
            "Choose Product",
            vec![ListSection::from_rows(self.catalog.product_rows())],
        )
    }

    fn render_question(&self, product: &'static Product, selections: &Selections) -> OutboundMessage {
        match self.catalog.next_question(product, selections) {
            Some(question) => render_spec_question(question),
            None => ask_quantity(),
        }
    }

    /// Re-render whatever the current state is waiting for.
    fn prompt_for(&self, session: &Session) -> OutboundMessage {
        match session.state {
            SessionState::SelectingProduct => self.product_picker(),
            SessionState::SelectingSpecs => {
                match session
                    .selections
                    .product
                    .as_ref()
                    .and_then(|product| self.catalog.find(product.as_str()))
                {
                    Some(product) => self.render_question(product, &session.selections),
                    None => self.product_picker(),
                }
            }
            SessionState::AskingQuantity => ask_quantity(),
            SessionState::HandlingQuantityLimit => quantity_limit_buttons(),
            SessionState::AskingEmail => ask_email(),
            SessionState::AskingPostcode => ask_postcode(),
            SessionState::OfferingFirstDiscount | SessionState::OfferingSecondDiscount => {
                offer_buttons_reprompt()
            }
            SessionState::AskingDeclineReason | SessionState::AskingAfterSecondDiscount => {
                decline_reason_buttons()
            }
            SessionState::AskingNameForEscalation => OutboundMessage::text(
                "May I take your name before I pass this over? (or type 'skip')",
            ),
        }
    }

    fn reprompt_offer(&self, _session: &Session) -> EngineReply {
        EngineReply::new(Outcome::Reprompted).with_reply(offer_buttons_reprompt())
    }

    fn reprompt_decline_reason(&self) -> EngineReply {
        EngineReply::new(Outcome::Reprompted).with_reply(decline_reason_buttons())
    }

    fn unknown_selection(
        &self,
        user_id: &str,
        selection_id: &str,
        session: &Session,
    ) -> EngineReply {
        tracing::warn!(
            event_name = "flow.unknown_selection",
            user_id,
            selection_id,
            state = ?session.state,
            "selection does not match the step being asked"
        );
        EngineReply::new(Outcome::UnknownSelection).with_reply(self.prompt_for(session))
    }

    async fn load(&self, user_id: &str) -> Result<Option<Session>, EngineError> {
        match self.store.get(user_id).await {
            Ok(session) => Ok(session),
            Err(err) => {
                // Degrade to memoryless: a broken read is treated as "not in
                // flow" so the user can start over, rather than crashing.
                tracing::error!(
                    event_name = "flow.session_read_failed",
                    user_id,
                    error = %err,
                    "session read failed, treating user as not in flow"
                );
                Ok(None)
            }
        }
    }

    async fn persist(&self, user_id: &str, session: &Session) -> Result<(), EngineError> {
        self.store.set(user_id, session, self.session_ttl).await?;
        Ok(())
    }
}

fn ask_quantity() -> OutboundMessage {
    OutboundMessage::text("How many units would you like to order?")
}

fn ask_email() -> OutboundMessage {
    OutboundMessage::text(
        "To send your discount code, we just need one more step: your email address. 👇️\n\n\
         Simply send it as a message in this chat, or type 'skip'.\n\n\
         _Please avoid quotation marks, emojis and the like - just the email. 🙏_",
    )
}

fn ask_postcode() -> OutboundMessage {
    OutboundMessage::text(
        "Please provide your delivery postcode (optional):\n\n\
         Send your postcode, or type 'skip' to continue without it.",
    )
}

fn quantity_limit_buttons() -> OutboundMessage {
    OutboundMessage::buttons(
        format!(
            "Bulk pricing applies to orders of more than {MIN_BULK_QUANTITY} units.\n\n\
             For smaller orders you can buy directly on our website, or change the quantity \
             to qualify for bulk rates."
        ),
        vec![
            Button::new(BTN_GO_WEBSITE, "Visit website"),
            Button::new(BTN_CHANGE_QUANTITY, "Change quantity"),
        ],
    )
}

fn decline_reason_buttons() -> OutboundMessage {
    OutboundMessage::buttons(
        "No problem! Can I ask what's holding you back?",
        vec![
            Button::new(BTN_NOT_READY, "Not ready yet"),
            Button::new(BTN_TOO_EXPENSIVE, "Too expensive"),
        ],
    )
}

fn offer_buttons_reprompt() -> OutboundMessage {
    OutboundMessage::buttons(
        "Sorry, I didn't catch that — ready to proceed with the discount code?",
        vec![Button::new(BTN_ACCEPT, "Yes"), Button::new(BTN_DECLINE, "No")],
    )
}

fn render_spec_question(question: &'static SpecQuestion) -> OutboundMessage {
    match question.component {
        SpecComponent::Buttons => OutboundMessage::buttons(
            question.prompt,
            question
                .options
                .iter()
                .map(|option| Button::new(option.id, option.title))
                .collect(),
        ),
        SpecComponent::List => OutboundMessage::list(
            question.prompt,
            "Choose Option",
            vec![ListSection::from_rows(
                question
                    .options
                    .iter()
                    .map(|option| (option.id.to_string(), option.title.to_string()))
                    .collect(),
            )],
        ),
    }
}

fn first_integer(text: &str) -> Option<u32> {
    let mut chars = text.char_indices().peekable();
    while let Some((start, ch)) = chars.next() {
        if !ch.is_ascii_digit() {
            continue;
        }
        let mut end = start + ch.len_utf8();
        while let Some((index, next)) = chars.peek().copied() {
            if next.is_ascii_digit() {
                end = index + next.len_utf8();
                chars.next();
            } else {
                break;
            }
        }
        return text[start..end].parse().ok();
    }
    None
}

fn is_skip(text: &str) -> bool {
    let lowered = text.trim().to_lowercase();
    SKIP_SYNONYMS.contains(&lowered.as_str())
}

fn is_restart(text: &str) -> bool {
    tokens(text).iter().any(|word| RESTART_KEYWORDS.contains(&word.as_str()))
}

fn is_valid_email(text: &str) -> bool {
    let Some((local, domain)) = text.split_once('@') else {
        return false;
    };
    if local.is_empty()
        || !local
            .chars()
            .all(|ch| ch.is_ascii_alphanumeric() || "._%+-".contains(ch))
    {
        return false;
    }
    let Some((host, tld)) = domain.rsplit_once('.') else {
        return false;
    };
    !host.is_empty()
        && host
            .split('.')
            .all(|label| !label.is_empty() && label.chars().all(|ch| ch.is_ascii_alphanumeric() || ch == '-'))
        && tld.len() >= 2
        && tld.chars().all(|ch| ch.is_ascii_alphabetic())
}

fn tokens(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|ch: char| !ch.is_ascii_alphanumeric())
        .filter(|token| !token.is_empty())
        .map(str::to_string)
        .collect()
}

fn classify_accept_decline(text: &str) -> Option<bool> {
    let words = tokens(text);
    let accepts = words.iter().any(|word| ACCEPT_KEYWORDS.contains(&word.as_str()));
    let declines = words.iter().any(|word| DECLINE_KEYWORDS.contains(&word.as_str()));
    match (accepts, declines) {
        (true, false) => Some(true),
        (false, true) => Some(false),
        _ => None,
    }
}

enum DeclineReason {
    NotReady,
    TooExpensive,
}

fn classify_decline_reason(text: &str) -> Option<DeclineReason> {
    let words = tokens(text);
    let not_ready = words.iter().any(|word| NOT_READY_KEYWORDS.contains(&word.as_str()));
    let too_expensive =
        words.iter().any(|word| TOO_EXPENSIVE_KEYWORDS.contains(&word.as_str()));
    match (not_ready, too_expensive) {
        (true, false) => Some(DeclineReason::NotReady),
        (false, true) => Some(DeclineReason::TooExpensive),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use rust_decimal::Decimal;

    use crate::domain::quote::{PriceQuote, ReferenceCode};
    use crate::domain::session::{InMemorySessionStore, Selections, SessionState};
    use crate::domain::tier::DiscountTier;
    use crate::flows::states::{Effect, Outcome};
    use crate::outbound::OutboundMessage;
    use crate::pricing::resolver::QuoteResolver;

    use super::{classify_accept_decline, first_integer, is_valid_email, BulkOrderEngine};

    /// Resolver stub that records every call and returns a canned quote.
    #[derive(Clone)]
    struct StubResolver {
        quote: PriceQuote,
        calls: Arc<Mutex<Vec<DiscountTier>>>,
    }

    impl StubResolver {
        fn priced() -> Self {
            Self {
                quote: PriceQuote::priced(
                    ReferenceCode("BlanketSherpafleece_30x40".to_string()),
                    Decimal::new(820, 1),
                    Decimal::new(7990, 2),
                    50,
                    false,
                ),
                calls: Arc::new(Mutex::new(Vec::new())),
            }
        }

        fn partial() -> Self {
            Self {
                quote: PriceQuote::discount_only(
                    ReferenceCode("BlanketSherpafleece_30x40".to_string()),
                    Decimal::new(60, 0),
                    false,
                ),
                calls: Arc::new(Mutex::new(Vec::new())),
            }
        }

        fn tiers_resolved(&self) -> Vec<DiscountTier> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl QuoteResolver for StubResolver {
        async fn resolve(
            &self,
            _selections: &Selections,
            _quantity: u32,
            tier: DiscountTier,
        ) -> PriceQuote {
            self.calls.lock().unwrap().push(tier);
            self.quote.clone()
        }
    }

    const USER: &str = "447700900123";

    fn engine(
        resolver: StubResolver,
    ) -> (BulkOrderEngine<InMemorySessionStore, StubResolver>, InMemorySessionStore) {
        let store = InMemorySessionStore::default();
        (BulkOrderEngine::new(store.clone(), resolver), store)
    }

    /// Drives a fresh session up to the first discount offer.
    async fn walk_to_first_offer(
        engine: &BulkOrderEngine<InMemorySessionStore, StubResolver>,
    ) {
        engine.start_flow(USER).await.unwrap();
        engine.handle_interactive(USER, "product_blankets").await.unwrap();
        engine.handle_interactive(USER, "fabric_sherpa").await.unwrap();
        engine.handle_interactive(USER, "size_med_30x40").await.unwrap();
        engine.handle_free_text(USER, "50").await.unwrap();
        engine.handle_free_text(USER, "buyer@example.com").await.unwrap();
        let reply = engine.handle_free_text(USER, "SW1A 1AA").await.unwrap();
        assert_eq!(reply.outcome, Outcome::FirstDiscountOffered);
    }

    fn body_of(message: &OutboundMessage) -> &str {
        match message {
            OutboundMessage::Text { body } => body,
            OutboundMessage::Buttons { body, .. } => body,
            OutboundMessage::List { body, .. } => body,
        }
    }

    #[tokio::test]
    async fn start_flow_is_idempotent_and_resets_selections() {
        let (engine, store) = engine(StubResolver::priced());

        engine.start_flow(USER).await.unwrap();
        engine.handle_interactive(USER, "product_blankets").await.unwrap();
        engine.handle_interactive(USER, "fabric_sherpa").await.unwrap();

        let reply = engine.start_flow(USER).await.unwrap();
        assert_eq!(reply.outcome, Outcome::Restarted);

        let session = store.snapshot(USER).unwrap();
        assert_eq!(session.state, SessionState::SelectingProduct);
        assert_eq!(session.selections, Selections::default());
        assert!(session.discount_offers.is_empty());
    }

    #[tokio::test]
    async fn spec_steps_are_asked_in_declared_order() {
        let (engine, store) = engine(StubResolver::priced());
        engine.start_flow(USER).await.unwrap();
        engine.handle_interactive(USER, "product_photobooks").await.unwrap();

        // The size option is valid for the product but the cover step is
        // asked first, so it must be rejected.
        let reply = engine.handle_interactive(USER, "size_8x8").await.unwrap();
        assert_eq!(reply.outcome, Outcome::UnknownSelection);
        assert!(store.snapshot(USER).unwrap().selections.size.is_none());

        engine.handle_interactive(USER, "cover_hard_cover").await.unwrap();
        let reply = engine.handle_interactive(USER, "size_8x8").await.unwrap();
        assert_eq!(reply.outcome, Outcome::SelectionStored);

        let reply = engine.handle_interactive(USER, "pages_20").await.unwrap();
        assert_eq!(reply.outcome, Outcome::SelectionStored);
        assert_eq!(store.snapshot(USER).unwrap().state, SessionState::AskingQuantity);
    }

    #[tokio::test]
    async fn catalogue_extras_skip_specs_entirely() {
        let (engine, store) = engine(StubResolver::priced());
        engine.start_flow(USER).await.unwrap();

        let reply = engine.handle_interactive(USER, "product_other").await.unwrap();
        assert_eq!(reply.outcome, Outcome::ExtraListShown);
        assert_eq!(store.snapshot(USER).unwrap().state, SessionState::SelectingProduct);

        let reply = engine.handle_interactive(USER, "other_mouse_mat").await.unwrap();
        assert_eq!(reply.outcome, Outcome::ExtraSelected);
        let session = store.snapshot(USER).unwrap();
        assert_eq!(session.state, SessionState::AskingQuantity);
        assert!(session.selections.catalogue_extra);
    }

    #[tokio::test]
    async fn quantity_boundary_routes_ten_and_below_to_the_limit_state() {
        let (engine, store) = engine(StubResolver::priced());

        for quantity in ["1", "10"] {
            engine.start_flow(USER).await.unwrap();
            engine.handle_interactive(USER, "other_mouse_mat").await.unwrap();
            let reply = engine.handle_free_text(USER, quantity).await.unwrap();
            assert_eq!(reply.outcome, Outcome::QuantityTooLow);
            let session = store.snapshot(USER).unwrap();
            assert_eq!(session.state, SessionState::HandlingQuantityLimit);
            assert!(session.selections.quantity.is_none());
        }

        engine.start_flow(USER).await.unwrap();
        engine.handle_interactive(USER, "other_mouse_mat").await.unwrap();
        let reply = engine.handle_free_text(USER, "11").await.unwrap();
        assert_eq!(reply.outcome, Outcome::QuantityStored);
        let session = store.snapshot(USER).unwrap();
        assert_eq!(session.state, SessionState::AskingEmail);
        assert_eq!(session.selections.quantity, Some(11));
    }

    #[tokio::test]
    async fn quantity_limit_buttons_branch_correctly() {
        let (engine, store) = engine(StubResolver::priced());
        engine.start_flow(USER).await.unwrap();
        engine.handle_interactive(USER, "other_mouse_mat").await.unwrap();
        engine.handle_free_text(USER, "5").await.unwrap();

        let reply = engine.handle_interactive(USER, "quantity_change").await.unwrap();
        assert_eq!(reply.outcome, Outcome::QuantityChangeRequested);
        assert_eq!(store.snapshot(USER).unwrap().state, SessionState::AskingQuantity);

        engine.handle_free_text(USER, "3").await.unwrap();
        let reply = engine.handle_interactive(USER, "quantity_go_website").await.unwrap();
        assert_eq!(reply.outcome, Outcome::QuantityGoToWebsite);
        assert!(store.snapshot(USER).is_none());
    }

    #[tokio::test]
    async fn invalid_quantity_reprompts_without_state_change() {
        let (engine, store) = engine(StubResolver::priced());
        engine.start_flow(USER).await.unwrap();
        engine.handle_interactive(USER, "other_mouse_mat").await.unwrap();

        let reply = engine.handle_free_text(USER, "a few").await.unwrap();
        assert_eq!(reply.outcome, Outcome::QuantityReprompted);
        assert_eq!(store.snapshot(USER).unwrap().state, SessionState::AskingQuantity);
    }

    #[tokio::test]
    async fn email_validation_and_skip_both_proceed_to_postcode() {
        let (engine, store) = engine(StubResolver::priced());
        engine.start_flow(USER).await.unwrap();
        engine.handle_interactive(USER, "other_mouse_mat").await.unwrap();
        engine.handle_free_text(USER, "25").await.unwrap();

        let reply = engine.handle_free_text(USER, "not-an-email").await.unwrap();
        assert_eq!(reply.outcome, Outcome::EmailReprompted);
        assert_eq!(store.snapshot(USER).unwrap().state, SessionState::AskingEmail);

        let reply = engine.handle_free_text(USER, "skip").await.unwrap();
        assert_eq!(reply.outcome, Outcome::EmailSkipped);
        let session = store.snapshot(USER).unwrap();
        assert_eq!(session.state, SessionState::AskingPostcode);
        assert!(session.selections.email.is_none());
    }

    #[tokio::test]
    async fn accepting_the_first_offer_is_terminal() {
        let resolver = StubResolver::priced();
        let (engine, store) = engine(resolver.clone());
        walk_to_first_offer(&engine).await;

        let reply = engine.handle_interactive(USER, "discount_accept").await.unwrap();
        assert_eq!(reply.outcome, Outcome::DiscountAccepted);
        let body = body_of(reply.replies().next().unwrap());
        assert!(body.contains(DiscountTier::First.code()));
        assert!(store.snapshot(USER).is_none());
        assert_eq!(resolver.tiers_resolved(), vec![DiscountTier::First]);
    }

    #[tokio::test]
    async fn offer_body_contains_the_quote_arithmetic() {
        let (engine, _store) = engine(StubResolver::priced());
        engine.start_flow(USER).await.unwrap();
        engine.handle_interactive(USER, "product_blankets").await.unwrap();
        engine.handle_interactive(USER, "fabric_sherpa").await.unwrap();
        engine.handle_interactive(USER, "size_med_30x40").await.unwrap();
        engine.handle_free_text(USER, "50").await.unwrap();
        engine.handle_free_text(USER, "skip").await.unwrap();
        let reply = engine.handle_free_text(USER, "skip").await.unwrap();

        let body = body_of(reply.replies().next().unwrap());
        assert!(body.contains("£14.38"), "unit price missing: {body}");
        assert!(body.contains("£719.10"), "total price missing: {body}");
        assert!(body.contains("82% off"), "discount missing: {body}");
    }

    #[tokio::test]
    async fn partial_quote_body_has_no_zero_placeholder() {
        let (engine, _store) = engine(StubResolver::partial());
        engine.start_flow(USER).await.unwrap();
        engine.handle_interactive(USER, "other_mouse_mat").await.unwrap();
        engine.handle_free_text(USER, "30").await.unwrap();
        engine.handle_free_text(USER, "skip").await.unwrap();
        let reply = engine.handle_free_text(USER, "skip").await.unwrap();

        let body = body_of(reply.replies().next().unwrap());
        assert!(body.contains("60% off"));
        assert!(!body.contains("£0"), "placeholder price rendered: {body}");
        assert!(body.contains("temporarily unavailable"));
    }

    #[tokio::test]
    async fn declining_twice_with_too_expensive_escalates_exactly_once() {
        let resolver = StubResolver::priced();
        let (engine, store) = engine(resolver.clone());
        walk_to_first_offer(&engine).await;

        let reply = engine.handle_interactive(USER, "discount_reject").await.unwrap();
        assert_eq!(reply.outcome, Outcome::DiscountDeclined);

        let reply = engine.handle_interactive(USER, "decline_too_expensive").await.unwrap();
        assert_eq!(reply.outcome, Outcome::SecondDiscountOffered);
        assert_eq!(
            resolver.tiers_resolved(),
            vec![DiscountTier::First, DiscountTier::Second]
        );

        let reply = engine.handle_interactive(USER, "discount_reject").await.unwrap();
        assert_eq!(reply.outcome, Outcome::DiscountDeclined);

        let reply = engine.handle_interactive(USER, "decline_too_expensive").await.unwrap();
        assert_eq!(reply.outcome, Outcome::NameRequested);
        assert!(store.snapshot(USER).unwrap().pending_escalation);

        let reply = engine.handle_free_text(USER, "Priya").await.unwrap();
        assert_eq!(reply.outcome, Outcome::Escalated);
        let escalations: Vec<_> = reply.escalations().collect();
        assert_eq!(escalations.len(), 1);
        assert_eq!(
            escalations[0].fields.get("name").map(String::as_str),
            Some("Priya")
        );
        assert_eq!(
            escalations[0].fields.get("quantity").map(String::as_str),
            Some("50")
        );

        // Terminal: the next message starts over instead of escalating again.
        assert!(store.snapshot(USER).is_none());
        let reply = engine.handle_free_text(USER, "hello?").await.unwrap();
        assert_eq!(reply.outcome, Outcome::NotInFlow);
        assert!(reply.escalations().next().is_none());
    }

    #[tokio::test]
    async fn skipping_the_name_still_escalates() {
        let (engine, _store) = engine(StubResolver::priced());
        walk_to_first_offer(&engine).await;
        engine.handle_interactive(USER, "discount_reject").await.unwrap();
        engine.handle_interactive(USER, "decline_too_expensive").await.unwrap();
        engine.handle_interactive(USER, "discount_reject").await.unwrap();
        engine.handle_interactive(USER, "decline_too_expensive").await.unwrap();

        let reply = engine.handle_free_text(USER, "skip").await.unwrap();
        assert_eq!(reply.outcome, Outcome::Escalated);
        let escalation = reply.escalations().next().unwrap();
        assert_eq!(escalation.fields.get("name").map(String::as_str), Some("Not provided"));
    }

    #[tokio::test]
    async fn not_ready_ends_the_flow_without_escalation() {
        let (engine, store) = engine(StubResolver::priced());
        walk_to_first_offer(&engine).await;
        engine.handle_interactive(USER, "discount_reject").await.unwrap();

        let reply = engine.handle_interactive(USER, "decline_not_ready").await.unwrap();
        assert_eq!(reply.outcome, Outcome::NotReady);
        assert!(reply.escalations().next().is_none());
        assert!(store.snapshot(USER).is_none());
    }

    #[tokio::test]
    async fn free_text_keywords_work_at_offer_states() {
        let (engine, store) = engine(StubResolver::priced());
        walk_to_first_offer(&engine).await;

        let reply = engine.handle_free_text(USER, "hmm maybe").await.unwrap();
        assert_eq!(reply.outcome, Outcome::Reprompted);
        assert_eq!(store.snapshot(USER).unwrap().state, SessionState::OfferingFirstDiscount);

        let reply = engine.handle_free_text(USER, "yes please").await.unwrap();
        assert_eq!(reply.outcome, Outcome::DiscountAccepted);
        assert!(store.snapshot(USER).is_none());
    }

    #[tokio::test]
    async fn decline_reason_free_text_classifies_both_branches() {
        let (engine, _store) = engine(StubResolver::priced());
        walk_to_first_offer(&engine).await;
        engine.handle_free_text(USER, "no thanks").await.unwrap();

        let reply = engine.handle_free_text(USER, "way too expensive for us").await.unwrap();
        assert_eq!(reply.outcome, Outcome::SecondDiscountOffered);
    }

    #[tokio::test]
    async fn second_tier_value_is_rendered_even_when_not_better() {
        // The stub returns the same quote for both tiers; the second offer
        // must still render the resolved value rather than assuming ordering.
        let resolver = StubResolver::priced();
        let (engine, _store) = engine(resolver.clone());
        walk_to_first_offer(&engine).await;
        engine.handle_interactive(USER, "discount_reject").await.unwrap();
        let reply = engine.handle_interactive(USER, "decline_too_expensive").await.unwrap();

        let body = body_of(reply.replies().next().unwrap());
        assert!(body.contains("82% off"));
        assert!(body.contains(DiscountTier::Second.code()));
    }

    #[tokio::test]
    async fn restart_keyword_discards_the_session_mid_flow() {
        let (engine, store) = engine(StubResolver::priced());
        engine.start_flow(USER).await.unwrap();
        engine.handle_interactive(USER, "other_mouse_mat").await.unwrap();
        engine.handle_free_text(USER, "25").await.unwrap();

        let reply = engine.handle_free_text(USER, "reset please").await.unwrap();
        assert_eq!(reply.outcome, Outcome::Restarted);

        let session = store.snapshot(USER).unwrap();
        assert_eq!(session.state, SessionState::SelectingProduct);
        assert_eq!(session.selections, Selections::default());
    }

    #[tokio::test]
    async fn interactive_without_a_session_restarts() {
        let (engine, store) = engine(StubResolver::priced());
        let reply = engine.handle_interactive(USER, "discount_accept").await.unwrap();
        assert_eq!(reply.outcome, Outcome::Restarted);
        assert_eq!(store.snapshot(USER).unwrap().state, SessionState::SelectingProduct);
    }

    #[tokio::test]
    async fn analytics_effects_accompany_major_transitions() {
        let (engine, _store) = engine(StubResolver::priced());
        let reply = engine.start_flow(USER).await.unwrap();
        assert!(reply.effects.iter().any(|effect| matches!(
            effect,
            Effect::Track(event) if event.event_type == "flow_started"
        )));
    }

    #[test]
    fn first_integer_extracts_the_first_run_of_digits() {
        assert_eq!(first_integer("50"), Some(50));
        assert_eq!(first_integer("about 100 units"), Some(100));
        assert_eq!(first_integer("12 or 15"), Some(12));
        assert_eq!(first_integer("lots"), None);
    }

    #[test]
    fn email_validator_accepts_plausible_addresses_only() {
        assert!(is_valid_email("buyer@example.com"));
        assert!(is_valid_email("first.last+tag@sub.example.co"));
        assert!(!is_valid_email("no-at-sign"));
        assert!(!is_valid_email("two@@example.com"));
        assert!(!is_valid_email("name@nodot"));
        assert!(!is_valid_email("name@host.1"));
    }

    #[test]
    fn accept_decline_classifier_requires_an_unambiguous_signal() {
        assert_eq!(classify_accept_decline("yes"), Some(true));
        assert_eq!(classify_accept_decline("ok sure"), Some(true));
        assert_eq!(classify_accept_decline("nope"), Some(false));
        assert_eq!(classify_accept_decline("yes and no"), None);
        assert_eq!(classify_accept_decline("not sure"), None);
        assert_eq!(classify_accept_decline("tell me more"), None);
    }
}
