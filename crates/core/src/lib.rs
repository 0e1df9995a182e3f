pub mod analytics;
pub mod config;
pub mod domain;
pub mod errors;
pub mod escalation;
pub mod flows;
pub mod outbound;
pub mod pricing;

pub use analytics::{AnalyticsEvent, AnalyticsSink, InMemoryAnalyticsSink, TracingAnalyticsSink};
pub use domain::catalog::{Catalog, Product, ProductId, SpecOption, SpecQuestion, SpecStep};
pub use domain::quote::{PriceQuote, ReferenceCode};
pub use domain::session::{
    InMemorySessionStore, Selections, Session, SessionState, SessionStore,
};
pub use domain::tier::DiscountTier;
pub use errors::{EngineError, SessionStoreError, SourceError};
pub use escalation::{
    EscalationOutcome, EscalationRequest, EscalationService, NoopEscalationService,
};
pub use flows::engine::BulkOrderEngine;
pub use flows::states::{Effect, EngineReply, Outcome};
pub use outbound::{Button, ListRow, ListSection, OutboundMessage};
pub use pricing::resolver::{PriceResolver, QuoteResolver};
