use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::catalog::{ProductId, SpecStep};
use crate::domain::tier::DiscountTier;
use crate::errors::SessionStoreError;

/// Where the user currently is in the bulk-order flow. Absence of a session
/// is the initial state; every terminal transition clears the session.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    SelectingProduct,
    SelectingSpecs,
    AskingQuantity,
    HandlingQuantityLimit,
    AskingEmail,
    AskingPostcode,
    OfferingFirstDiscount,
    AskingDeclineReason,
    OfferingSecondDiscount,
    AskingAfterSecondDiscount,
    AskingNameForEscalation,
}

/// Everything collected from the customer so far. A closed struct rather
/// than an open map so every key the state machine reads is compile-checked.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Selections {
    pub product: Option<ProductId>,
    pub fabric: Option<String>,
    pub size: Option<String>,
    pub cover: Option<String>,
    pub pages: Option<String>,
    pub mug_type: Option<String>,
    pub quantity: Option<u32>,
    pub email: Option<String>,
    pub postcode: Option<String>,
    pub name: Option<String>,
    /// Set for catalogue extras, which declare zero spec steps.
    pub catalogue_extra: bool,
}

impl Selections {
    pub fn for_product(product_id: &str) -> Self {
        Self { product: Some(ProductId(product_id.to_string())), ..Self::default() }
    }

    pub fn option_for(&self, step: SpecStep) -> Option<&str> {
        match step {
            SpecStep::Fabric => self.fabric.as_deref(),
            SpecStep::Size => self.size.as_deref(),
            SpecStep::Cover => self.cover.as_deref(),
            SpecStep::Pages => self.pages.as_deref(),
            SpecStep::MugType => self.mug_type.as_deref(),
        }
    }

    pub fn set_option(&mut self, step: SpecStep, option_id: impl Into<String>) {
        let slot = match step {
            SpecStep::Fabric => &mut self.fabric,
            SpecStep::Size => &mut self.size,
            SpecStep::Cover => &mut self.cover,
            SpecStep::Pages => &mut self.pages,
            SpecStep::MugType => &mut self.mug_type,
        };
        *slot = Some(option_id.into());
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub state: SessionState,
    pub selections: Selections,
    /// Append-only record of the tiers already shown, in offer order.
    pub discount_offers: Vec<DiscountTier>,
    /// Distinguishes "returning from the optional name capture" from a
    /// fresh escalation decline, so a session escalates at most once.
    pub pending_escalation: bool,
}

impl Session {
    pub fn new(state: SessionState) -> Self {
        Self {
            state,
            selections: Selections::default(),
            discount_offers: Vec::new(),
            pending_escalation: false,
        }
    }

    pub fn offered(&self, tier: DiscountTier) -> bool {
        self.discount_offers.contains(&tier)
    }
}

/// Durable per-user session storage with TTL expiry. Expired entries read
/// back as absent; the next inbound message then starts a fresh flow.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn get(&self, user_id: &str) -> Result<Option<Session>, SessionStoreError>;
    async fn set(
        &self,
        user_id: &str,
        session: &Session,
        ttl: Duration,
    ) -> Result<(), SessionStoreError>;
    async fn clear(&self, user_id: &str) -> Result<(), SessionStoreError>;
}

/// Map-backed store for engine unit tests. Ignores TTL.
#[derive(Clone, Default)]
pub struct InMemorySessionStore {
    sessions: Arc<Mutex<HashMap<String, Session>>>,
}

impl InMemorySessionStore {
    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Session>> {
        match self.sessions.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub fn snapshot(&self, user_id: &str) -> Option<Session> {
        self.lock().get(user_id).cloned()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn get(&self, user_id: &str) -> Result<Option<Session>, SessionStoreError> {
        Ok(self.lock().get(user_id).cloned())
    }

    async fn set(
        &self,
        user_id: &str,
        session: &Session,
        _ttl: Duration,
    ) -> Result<(), SessionStoreError> {
        self.lock().insert(user_id.to_string(), session.clone());
        Ok(())
    }

    async fn clear(&self, user_id: &str) -> Result<(), SessionStoreError> {
        self.lock().remove(user_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use crate::domain::catalog::SpecStep;
    use crate::domain::tier::DiscountTier;

    use super::{InMemorySessionStore, Selections, Session, SessionState, SessionStore};

    #[test]
    fn selections_round_trip_per_step_options() {
        let mut selections = Selections::for_product("blankets");
        assert_eq!(selections.option_for(SpecStep::Fabric), None);

        selections.set_option(SpecStep::Fabric, "fabric_sherpa");
        assert_eq!(selections.option_for(SpecStep::Fabric), Some("fabric_sherpa"));
        assert_eq!(selections.option_for(SpecStep::Size), None);
    }

    #[test]
    fn session_tracks_offered_tiers() {
        let mut session = Session::new(SessionState::OfferingFirstDiscount);
        assert!(!session.offered(DiscountTier::First));
        session.discount_offers.push(DiscountTier::First);
        assert!(session.offered(DiscountTier::First));
        assert!(!session.offered(DiscountTier::Second));
    }

    #[tokio::test]
    async fn in_memory_store_set_get_clear() {
        let store = InMemorySessionStore::default();
        let session = Session::new(SessionState::SelectingProduct);

        store.set("447000000001", &session, Duration::from_secs(3600)).await.expect("set");
        let loaded = store.get("447000000001").await.expect("get").expect("present");
        assert_eq!(loaded.state, SessionState::SelectingProduct);

        store.clear("447000000001").await.expect("clear");
        assert!(store.get("447000000001").await.expect("get").is_none());
    }

    #[test]
    fn session_payload_survives_json_round_trip() {
        let mut session = Session::new(SessionState::AskingQuantity);
        session.selections = Selections::for_product("mugs");
        session.selections.set_option(SpecStep::MugType, "type_latte_mug");
        session.selections.quantity = Some(40);
        session.discount_offers.push(DiscountTier::First);

        let raw = serde_json::to_string(&session).expect("serialize");
        let decoded: Session = serde_json::from_str(&raw).expect("deserialize");
        assert_eq!(decoded, session);
    }
}
