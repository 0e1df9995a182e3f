use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use bulkpix_core::analytics::AnalyticsSink;
use bulkpix_core::domain::session::SessionStore;
use bulkpix_core::escalation::EscalationService;
use bulkpix_core::flows::engine::BulkOrderEngine;
use bulkpix_core::flows::states::{Effect, EngineReply, Outcome};
use bulkpix_core::outbound::OutboundMessage;
use bulkpix_core::pricing::resolver::QuoteResolver;
use bulkpix_core::EngineError;

use crate::events::InboundEvent;
use crate::sender::MessageSender;

/// Phrases that open a fresh flow when the user is not already in one.
/// Anything else outside a flow is silently ignored; another system owns
/// general conversation.
const START_KEYWORDS: &[&str] = &["bulk", "wholesale"];

/// Drives the state machine from inbound events and executes the effects it
/// returns. Events for the same user are serialized through a per-user lock
/// so rapid taps cannot interleave two transitions over one session.
pub struct FlowRunner<S, R>
where
    S: SessionStore,
    R: QuoteResolver,
{
    engine: BulkOrderEngine<S, R>,
    sender: Arc<dyn MessageSender>,
    escalations: Arc<dyn EscalationService>,
    analytics: Arc<dyn AnalyticsSink>,
    user_locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl<S, R> FlowRunner<S, R>
where
    S: SessionStore,
    R: QuoteResolver,
{
    pub fn new(
        engine: BulkOrderEngine<S, R>,
        sender: Arc<dyn MessageSender>,
        escalations: Arc<dyn EscalationService>,
        analytics: Arc<dyn AnalyticsSink>,
    ) -> Self {
        Self {
            engine,
            sender,
            escalations,
            analytics,
            user_locks: Mutex::new(HashMap::new()),
        }
    }

    pub async fn handle_event(&self, event: InboundEvent) {
        let user_id = event.user_id().to_string();
        let lock = self.user_lock(&user_id);

        {
            let _guard = lock.lock().await;

            let result = match &event {
                InboundEvent::ButtonTap { button_id, .. } => {
                    self.engine.handle_interactive(&user_id, button_id).await
                }
                InboundEvent::ListSelection { row_id, .. } => {
                    self.engine.handle_interactive(&user_id, row_id).await
                }
                InboundEvent::FreeText { text, .. } => self.handle_free_text(&user_id, text).await,
            };

            match result {
                Ok(reply) => {
                    tracing::info!(
                        event_name = "flow.dispatched",
                        user_id = %user_id,
                        outcome = reply.outcome.as_str(),
                        "inbound event handled"
                    );
                    self.run_effects(&user_id, reply).await;
                }
                Err(err) => {
                    // The session was left untouched, so the same input can
                    // be retried after the apology.
                    tracing::error!(
                        event_name = "flow.dispatch_failed",
                        user_id = %user_id,
                        error = %err,
                        "engine failure, sending generic apology"
                    );
                    self.send(&user_id, &OutboundMessage::text(err.user_message())).await;
                }
            }
        }

        self.release_user_lock(&user_id, lock);
    }

    async fn handle_free_text(
        &self,
        user_id: &str,
        text: &str,
    ) -> Result<EngineReply, EngineError> {
        let reply = self.engine.handle_free_text(user_id, text).await?;
        if reply.outcome == Outcome::NotInFlow && wants_flow_start(text) {
            return self.engine.start_flow(user_id).await;
        }
        Ok(reply)
    }

    /// Replies go out in order; escalation and analytics outcomes are logged
    /// but never alter what the user already saw.
    async fn run_effects(&self, user_id: &str, reply: EngineReply) {
        for effect in reply.effects {
            match effect {
                Effect::Reply(message) => self.send(user_id, &message).await,
                Effect::Escalate(request) => {
                    let outcome = self.escalations.submit(&request).await;
                    if outcome.success {
                        tracing::info!(
                            event_name = "escalation.submitted",
                            user_id = %user_id,
                            ticket_id = ?outcome.ticket_id,
                            "escalation accepted"
                        );
                    } else {
                        tracing::error!(
                            event_name = "escalation.submit_failed",
                            user_id = %user_id,
                            error = ?outcome.error,
                            "escalation lost, details remain in the analytics trail"
                        );
                    }
                }
                Effect::Track(event) => self.analytics.record(event),
            }
        }
    }

    async fn send(&self, user_id: &str, message: &OutboundMessage) {
        if let Err(err) = self.sender.send(user_id, message).await {
            tracing::error!(
                event_name = "flow.reply_send_failed",
                user_id = %user_id,
                error = %err,
                "failed to deliver reply"
            );
        }
    }

    fn user_lock(&self, user_id: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = match self.user_locks.lock() {
            Ok(locks) => locks,
            Err(poisoned) => poisoned.into_inner(),
        };
        locks.entry(user_id.to_string()).or_default().clone()
    }

    /// Drops this task's handle and evicts the map entry once no other task
    /// holds it, so the map only tracks users with an event in flight.
    fn release_user_lock(&self, user_id: &str, lock: Arc<tokio::sync::Mutex<()>>) {
        drop(lock);
        let mut locks = match self.user_locks.lock() {
            Ok(locks) => locks,
            Err(poisoned) => poisoned.into_inner(),
        };
        // Clones are only handed out under the same map mutex, so a count of
        // one here means the map holds the last reference.
        if locks.get(user_id).is_some_and(|entry| Arc::strong_count(entry) == 1) {
            locks.remove(user_id);
        }
    }
}

fn wants_flow_start(text: &str) -> bool {
    let lowered = text.to_lowercase();
    START_KEYWORDS.iter().any(|keyword| lowered.contains(keyword))
}
