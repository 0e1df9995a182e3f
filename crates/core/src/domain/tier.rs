use serde::{Deserialize, Serialize};

/// Discount tiers are offered in a fixed order: the worse offer first, the
/// better one only after the customer objects to the first.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscountTier {
    First,
    Second,
}

impl DiscountTier {
    /// Checkout code the customer applies on the website.
    pub fn code(self) -> &'static str {
        match self {
            Self::First => "2BULK103025CSR",
            Self::Second => "BULK103025CS",
        }
    }

    /// Price-point key used by the discount-rate table.
    pub fn price_point(self) -> &'static str {
        match self {
            Self::First => "D",
            Self::Second => "B",
        }
    }

    pub fn next(self) -> Option<Self> {
        match self {
            Self::First => Some(Self::Second),
            Self::Second => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::First => "first_offer",
            Self::Second => "second_offer",
        }
    }
}
