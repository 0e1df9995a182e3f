pub mod analytics;
pub mod pricing;
pub mod session;

pub use analytics::SqlAnalyticsSink;
pub use pricing::SqlDiscountRateSource;
pub use session::SqlSessionStore;
