use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Canonical product identifier used as the key into every price and
/// discount lookup (e.g. `BlanketSherpafleece_25x20`).
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ReferenceCode(pub String);

impl ReferenceCode {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ReferenceCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Transient priced result for one (reference code, quantity, tier) request.
///
/// `success` with `base_price: None` is the explicit partial state: the
/// discount is known but no source could produce a base price. Callers must
/// render a discount-only message for it, never an error.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PriceQuote {
    pub success: bool,
    pub reference_code: Option<ReferenceCode>,
    pub discount_percent: Option<Decimal>,
    pub base_price: Option<Decimal>,
    pub unit_price: Option<Decimal>,
    pub total_price: Option<Decimal>,
    /// True when the quote was produced via a substituted default option or
    /// the fallback discount percent rather than the customer's exact spec.
    pub is_estimated: bool,
    pub error_message: Option<String>,
}

impl PriceQuote {
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            reference_code: None,
            discount_percent: None,
            base_price: None,
            unit_price: None,
            total_price: None,
            is_estimated: false,
            error_message: Some(message.into()),
        }
    }

    /// Discount resolved but no base price. Still a success for callers.
    pub fn discount_only(
        reference_code: ReferenceCode,
        discount_percent: Decimal,
        is_estimated: bool,
    ) -> Self {
        Self {
            success: true,
            reference_code: Some(reference_code),
            discount_percent: Some(discount_percent),
            base_price: None,
            unit_price: None,
            total_price: None,
            is_estimated,
            error_message: Some("Base price unavailable, showing discount only".to_string()),
        }
    }

    pub fn priced(
        reference_code: ReferenceCode,
        discount_percent: Decimal,
        base_price: Decimal,
        quantity: u32,
        is_estimated: bool,
    ) -> Self {
        let unit_price =
            (base_price * (Decimal::ONE - discount_percent / Decimal::from(100))).round_dp(2);
        let total_price = (unit_price * Decimal::from(quantity)).round_dp(2);
        Self {
            success: true,
            reference_code: Some(reference_code),
            discount_percent: Some(discount_percent),
            base_price: Some(base_price),
            unit_price: Some(unit_price),
            total_price: Some(total_price),
            is_estimated,
            error_message: None,
        }
    }

    pub fn is_partial(&self) -> bool {
        self.success && self.base_price.is_none()
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use super::{PriceQuote, ReferenceCode};

    fn code() -> ReferenceCode {
        ReferenceCode("BlanketSherpafleece_25x20".to_string())
    }

    #[test]
    fn quote_arithmetic_rounds_each_step_to_two_places() {
        let quote = PriceQuote::priced(
            code(),
            Decimal::new(820, 1), // 82.0%
            Decimal::new(7990, 2), // 79.90
            50,
            false,
        );

        assert!(quote.success);
        assert_eq!(quote.unit_price, Some(Decimal::new(1438, 2)));
        assert_eq!(quote.total_price, Some(Decimal::new(71910, 2)));
    }

    #[test]
    fn discount_only_is_success_without_numbers() {
        let quote = PriceQuote::discount_only(code(), Decimal::from(15), true);

        assert!(quote.success);
        assert!(quote.is_partial());
        assert_eq!(quote.base_price, None);
        assert_eq!(quote.unit_price, None);
        assert_eq!(quote.total_price, None);
        assert!(quote.error_message.is_some());
    }

    #[test]
    fn failure_always_carries_a_message() {
        let quote = PriceQuote::failure("no reference code");
        assert!(!quote.success);
        assert_eq!(quote.error_message.as_deref(), Some("no reference code"));
    }

    #[test]
    fn zero_and_full_discount_edge_cases() {
        let zero = PriceQuote::priced(code(), Decimal::ZERO, Decimal::new(1000, 2), 20, false);
        assert_eq!(zero.unit_price, Some(Decimal::new(1000, 2)));
        assert_eq!(zero.total_price, Some(Decimal::new(20000, 2)));

        let full = PriceQuote::priced(code(), Decimal::from(100), Decimal::new(1000, 2), 20, false);
        assert_eq!(full.unit_price, Some(Decimal::new(0, 2)));
        assert_eq!(full.total_price, Some(Decimal::new(0, 2)));
    }
}
