//! Multi-source quote resolution.
//!
//! `resolve` is read-only and idempotent: it may be called repeatedly for
//! the same inputs, and every failure mode comes back as a field on the
//! returned [`PriceQuote`] rather than an error.

use std::sync::Arc;

use async_trait::async_trait;
use rust_decimal::Decimal;

use crate::domain::catalog::Catalog;
use crate::domain::quote::PriceQuote;
use crate::domain::session::Selections;
use crate::domain::tier::DiscountTier;
use crate::pricing::sources::{BasePriceSource, DiscountRateSource};

/// Discount applied when the rate source has no row, so the conversation can
/// still proceed. Quotes built on it are flagged as estimates.
pub const FALLBACK_DISCOUNT_PERCENT: Decimal = Decimal::from_parts(15, 0, 0, false, 0);

#[async_trait]
pub trait QuoteResolver: Send + Sync {
    async fn resolve(&self, selections: &Selections, quantity: u32, tier: DiscountTier)
        -> PriceQuote;
}

pub struct PriceResolver {
    catalog: Catalog,
    discounts: Arc<dyn DiscountRateSource>,
    sources: Vec<Arc<dyn BasePriceSource>>,
}

impl PriceResolver {
    /// `sources` are consulted in order; the first positive price wins.
    pub fn new(discounts: Arc<dyn DiscountRateSource>, sources: Vec<Arc<dyn BasePriceSource>>) -> Self {
        Self { catalog: Catalog, discounts, sources }
    }

    async fn base_price(&self, code: &crate::ReferenceCode, selections: &Selections) -> Option<Decimal> {
        for source in &self.sources {
            match source.base_price(code, selections).await {
                Ok(Some(price)) if price > Decimal::ZERO => {
                    tracing::info!(
                        event_name = "pricing.base_price_resolved",
                        source = source.name(),
                        reference_code = %code,
                        price = %price,
                        "base price resolved"
                    );
                    return Some(price);
                }
                Ok(_) => {
                    tracing::debug!(
                        event_name = "pricing.base_price_miss",
                        source = source.name(),
                        reference_code = %code,
                        "source has no price, trying next"
                    );
                }
                Err(err) => {
                    tracing::warn!(
                        event_name = "pricing.base_price_source_failed",
                        source = source.name(),
                        reference_code = %code,
                        error = %err,
                        "source failed, trying next"
                    );
                }
            }
        }
        None
    }
}

#[async_trait]
impl QuoteResolver for PriceResolver {
    async fn resolve(
        &self,
        selections: &Selections,
        quantity: u32,
        tier: DiscountTier,
    ) -> PriceQuote {
        let mut is_estimated = false;

        let code = match self.catalog.reference_code(selections) {
            Some(code) => code,
            None => match self.catalog.reference_code_with_defaults(selections) {
                Some(code) => {
                    tracing::info!(
                        event_name = "pricing.default_reference_code",
                        reference_code = %code,
                        "substituted default option for missing spec step"
                    );
                    is_estimated = true;
                    code
                }
                None => {
                    return PriceQuote::failure(
                        "Product reference code not found (missing spec selections?)",
                    );
                }
            },
        };

        let discount = match self.discounts.discount_percent(&code, tier.price_point()).await {
            Ok(found) => found,
            Err(err) => {
                tracing::warn!(
                    event_name = "pricing.discount_lookup_failed",
                    reference_code = %code,
                    price_point = tier.price_point(),
                    error = %err,
                    "discount lookup failed"
                );
                None
            }
        };

        let (discount_percent, discount_resolved) = match discount {
            Some(percent) => (percent, true),
            None => {
                tracing::warn!(
                    event_name = "pricing.fallback_discount_used",
                    reference_code = %code,
                    price_point = tier.price_point(),
                    fallback_percent = %FALLBACK_DISCOUNT_PERCENT,
                    "no discount row, using fallback estimate"
                );
                is_estimated = true;
                (FALLBACK_DISCOUNT_PERCENT, false)
            }
        };

        match self.base_price(&code, selections).await {
            Some(base_price) => {
                PriceQuote::priced(code, discount_percent, base_price, quantity, is_estimated)
            }
            None if discount_resolved => {
                PriceQuote::discount_only(code, discount_percent, is_estimated)
            }
            None => PriceQuote::failure(format!(
                "No pricing data available for {}",
                code.as_str()
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use rust_decimal::Decimal;

    use crate::domain::quote::ReferenceCode;
    use crate::domain::session::Selections;
    use crate::domain::tier::DiscountTier;
    use crate::errors::SourceError;
    use crate::pricing::sources::{BasePriceSource, DiscountRateSource};

    use super::{PriceResolver, QuoteResolver, FALLBACK_DISCOUNT_PERCENT};

    struct FixedDiscount(Option<Decimal>);

    #[async_trait]
    impl DiscountRateSource for FixedDiscount {
        async fn discount_percent(
            &self,
            _code: &ReferenceCode,
            _price_point: &str,
        ) -> Result<Option<Decimal>, SourceError> {
            Ok(self.0)
        }
    }

    struct FailingDiscount;

    #[async_trait]
    impl DiscountRateSource for FailingDiscount {
        async fn discount_percent(
            &self,
            _code: &ReferenceCode,
            _price_point: &str,
        ) -> Result<Option<Decimal>, SourceError> {
            Err(SourceError::Unreachable { origin: "discounts", detail: "down".to_string() })
        }
    }

    struct FixedPrice(&'static str, Option<Decimal>);

    #[async_trait]
    impl BasePriceSource for FixedPrice {
        fn name(&self) -> &'static str {
            self.0
        }

        async fn base_price(
            &self,
            _code: &ReferenceCode,
            _selections: &Selections,
        ) -> Result<Option<Decimal>, SourceError> {
            Ok(self.1)
        }
    }

    struct FailingPrice;

    #[async_trait]
    impl BasePriceSource for FailingPrice {
        fn name(&self) -> &'static str {
            "failing"
        }

        async fn base_price(
            &self,
            _code: &ReferenceCode,
            _selections: &Selections,
        ) -> Result<Option<Decimal>, SourceError> {
            Err(SourceError::Timeout { origin: "failing" })
        }
    }

    fn blanket_selections() -> Selections {
        let mut selections = Selections::for_product("blankets");
        selections.fabric = Some("fabric_sherpa".to_string());
        selections.size = Some("size_med_30x40".to_string());
        selections
    }

    #[tokio::test]
    async fn full_quote_uses_the_first_source_with_a_price() {
        let resolver = PriceResolver::new(
            Arc::new(FixedDiscount(Some(Decimal::new(820, 1)))),
            vec![
                Arc::new(FixedPrice("first", None)),
                Arc::new(FixedPrice("second", Some(Decimal::new(7990, 2)))),
                Arc::new(FixedPrice("third", Some(Decimal::new(100, 0)))),
            ],
        );

        let quote = resolver.resolve(&blanket_selections(), 50, DiscountTier::First).await;
        assert!(quote.success);
        assert!(!quote.is_estimated);
        assert_eq!(quote.base_price, Some(Decimal::new(7990, 2)));
        assert_eq!(quote.unit_price, Some(Decimal::new(1438, 2)));
        assert_eq!(quote.total_price, Some(Decimal::new(71910, 2)));
    }

    #[tokio::test]
    async fn source_errors_do_not_stop_the_chain() {
        let resolver = PriceResolver::new(
            Arc::new(FixedDiscount(Some(Decimal::new(50, 0)))),
            vec![
                Arc::new(FailingPrice),
                Arc::new(FixedPrice("second", Some(Decimal::new(2000, 2)))),
            ],
        );

        let quote = resolver.resolve(&blanket_selections(), 10, DiscountTier::Second).await;
        assert!(quote.success);
        assert_eq!(quote.unit_price, Some(Decimal::new(1000, 2)));
    }

    #[tokio::test]
    async fn discount_only_quote_is_a_partial_success() {
        let resolver = PriceResolver::new(
            Arc::new(FixedDiscount(Some(Decimal::new(60, 0)))),
            vec![Arc::new(FixedPrice("only", None))],
        );

        let quote = resolver.resolve(&blanket_selections(), 25, DiscountTier::First).await;
        assert!(quote.success);
        assert!(quote.is_partial());
        assert_eq!(quote.base_price, None);
        assert_eq!(quote.unit_price, None);
        assert_eq!(quote.discount_percent, Some(Decimal::new(60, 0)));
        assert!(quote.error_message.is_some());
    }

    #[tokio::test]
    async fn missing_discount_row_falls_back_to_an_estimate() {
        let resolver = PriceResolver::new(
            Arc::new(FixedDiscount(None)),
            vec![Arc::new(FixedPrice("only", Some(Decimal::new(10000, 2))))],
        );

        let quote = resolver.resolve(&blanket_selections(), 20, DiscountTier::First).await;
        assert!(quote.success);
        assert!(quote.is_estimated);
        assert_eq!(quote.discount_percent, Some(FALLBACK_DISCOUNT_PERCENT));
        assert_eq!(quote.unit_price, Some(Decimal::new(8500, 2)));
    }

    #[tokio::test]
    async fn all_sources_unavailable_yields_failure_not_panic() {
        let resolver = PriceResolver::new(
            Arc::new(FailingDiscount),
            vec![
                Arc::new(FailingPrice),
                Arc::new(FixedPrice("empty_a", None)),
                Arc::new(FixedPrice("empty_b", None)),
                Arc::new(FixedPrice("empty_c", None)),
            ],
        );

        let quote = resolver.resolve(&blanket_selections(), 15, DiscountTier::First).await;
        assert!(!quote.success);
        assert!(quote.error_message.is_some());
    }

    #[tokio::test]
    async fn underivable_reference_code_is_an_explicit_failure() {
        let resolver = PriceResolver::new(
            Arc::new(FixedDiscount(Some(Decimal::new(50, 0)))),
            vec![Arc::new(FixedPrice("only", Some(Decimal::new(1000, 2))))],
        );

        // No product selected at all.
        let quote = resolver.resolve(&Selections::default(), 5, DiscountTier::First).await;
        assert!(!quote.success);
        assert!(quote.error_message.is_some());
    }

    #[tokio::test]
    async fn incomplete_selections_resolve_with_defaults_as_an_estimate() {
        let mut selections = Selections::for_product("blankets");
        selections.fabric = Some("fabric_fleece".to_string());

        let resolver = PriceResolver::new(
            Arc::new(FixedDiscount(Some(Decimal::new(40, 0)))),
            vec![Arc::new(FixedPrice("only", Some(Decimal::new(2999, 2))))],
        );

        let quote = resolver.resolve(&selections, 12, DiscountTier::First).await;
        assert!(quote.success);
        assert!(quote.is_estimated);
        assert_eq!(
            quote.reference_code.as_ref().map(|code| code.as_str()),
            Some("BlanketFlannelfleece_30x40")
        );
    }
}
