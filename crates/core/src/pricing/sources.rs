//! Price-data sources, ordered from most to least trusted.
//!
//! A [`PriceResolver`](crate::pricing::resolver::PriceResolver) walks a list
//! of [`BasePriceSource`]s and takes the first positive price. Every source
//! is allowed to fail; none is allowed to take the conversation down with it.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::Deserialize;

use crate::domain::catalog::Catalog;
use crate::domain::quote::ReferenceCode;
use crate::domain::session::Selections;
use crate::errors::SourceError;
use crate::pricing::matching;

/// One SKU row returned by the tier-pricing API, with its quantity breaks.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TierPricing {
    pub candidate_id: String,
    pub prices: Vec<QuantityPrice>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct QuantityPrice {
    pub quantity: u32,
    pub price: Decimal,
}

/// Single-unit base price lookup. `Ok(None)` means "not known here, try the
/// next source"; `Err` means the source itself misbehaved.
#[async_trait]
pub trait BasePriceSource: Send + Sync {
    fn name(&self) -> &'static str;

    async fn base_price(
        &self,
        code: &ReferenceCode,
        selections: &Selections,
    ) -> Result<Option<Decimal>, SourceError>;
}

/// Negotiated discount rate for a reference code at a given price point.
/// Rates are returned as percentages (82.0 means 82%).
#[async_trait]
pub trait DiscountRateSource: Send + Sync {
    async fn discount_percent(
        &self,
        code: &ReferenceCode,
        price_point: &str,
    ) -> Result<Option<Decimal>, SourceError>;
}

/// Maps a reference code to the storefront page id the tier-pricing API
/// keys on.
#[async_trait]
pub trait PageIdSource: Send + Sync {
    async fn page_id(&self, code: &ReferenceCode) -> Result<Option<String>, SourceError>;
}

/// Remote tier-pricing endpoint: page id in, every SKU on that page out.
#[async_trait]
pub trait TierPricingApi: Send + Sync {
    async fn tier_pricing(&self, page_id: &str) -> Result<Vec<TierPricing>, SourceError>;
}

#[derive(Debug, Deserialize)]
struct DatasetRow {
    #[serde(rename = "platinumProductReferenceId")]
    reference_id: String,
    price: String,
}

/// Curated CSV of single-unit prices, keyed by reference code. Loaded once
/// at startup; rows with missing or non-positive prices are skipped.
#[derive(Clone, Debug, Default)]
pub struct DatasetPriceSource {
    prices: HashMap<String, Decimal>,
}

impl DatasetPriceSource {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, SourceError> {
        let mut reader = csv::Reader::from_path(path.as_ref()).map_err(|err| {
            SourceError::Unreachable { origin: "dataset", detail: err.to_string() }
        })?;

        let mut prices = HashMap::new();
        for row in reader.deserialize::<DatasetRow>() {
            let row = row.map_err(|err| SourceError::Malformed {
                origin: "dataset",
                detail: err.to_string(),
            })?;
            let Ok(price) = row.price.trim().parse::<Decimal>() else {
                continue;
            };
            if price > Decimal::ZERO {
                prices.insert(row.reference_id.to_ascii_lowercase(), price);
            }
        }

        tracing::info!(
            event_name = "pricing.dataset_loaded",
            entries = prices.len(),
            "bulk price dataset loaded"
        );
        Ok(Self { prices })
    }

    pub fn from_pairs(pairs: impl IntoIterator<Item = (String, Decimal)>) -> Self {
        Self {
            prices: pairs
                .into_iter()
                .map(|(code, price)| (code.to_ascii_lowercase(), price))
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.prices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.prices.is_empty()
    }
}

#[async_trait]
impl BasePriceSource for DatasetPriceSource {
    fn name(&self) -> &'static str {
        "dataset"
    }

    async fn base_price(
        &self,
        code: &ReferenceCode,
        _selections: &Selections,
    ) -> Result<Option<Decimal>, SourceError> {
        Ok(self.prices.get(&code.as_str().to_ascii_lowercase()).copied())
    }
}

/// Remote tier-pricing lookup. Resolves the page id first (relational table,
/// then the built-in catalog mapping), then matches our reference code
/// against the returned SKUs.
pub struct ApiPriceSource {
    page_ids: Arc<dyn PageIdSource>,
    api: Arc<dyn TierPricingApi>,
    catalog: Catalog,
}

impl ApiPriceSource {
    pub fn new(page_ids: Arc<dyn PageIdSource>, api: Arc<dyn TierPricingApi>) -> Self {
        Self { page_ids, api, catalog: Catalog::default() }
    }

    async fn resolve_page_id(
        &self,
        code: &ReferenceCode,
        selections: &Selections,
    ) -> Option<String> {
        match self.page_ids.page_id(code).await {
            Ok(Some(page_id)) => return Some(page_id),
            Ok(None) => {}
            Err(err) => {
                tracing::warn!(
                    event_name = "pricing.page_id_lookup_failed",
                    reference_code = %code,
                    error = %err,
                    "page id lookup failed, falling back to static mapping"
                );
            }
        }
        self.catalog.page_id(selections).map(str::to_string)
    }
}

#[async_trait]
impl BasePriceSource for ApiPriceSource {
    fn name(&self) -> &'static str {
        "tier_pricing_api"
    }

    async fn base_price(
        &self,
        code: &ReferenceCode,
        selections: &Selections,
    ) -> Result<Option<Decimal>, SourceError> {
        let Some(page_id) = self.resolve_page_id(code, selections).await else {
            return Ok(None);
        };

        let candidates = self.api.tier_pricing(&page_id).await?;
        Ok(matching::unit_price_for(code, &candidates))
    }
}

/// Built-in single-unit prices, maintained by hand. Third in the chain;
/// current as of the last catalogue review rather than live.
#[derive(Clone, Copy, Debug, Default)]
pub struct StaticTablePriceSource;

/// Regular retail prices in pence, before any bulk discount.
const STATIC_PRICES: &[(&str, i64)] = &[
    // Blankets: fleece, mink touch, sherpa, double sided.
    ("BlanketFlannelfleece_25x20", 1999),
    ("BlanketFlannelfleece_30x40", 2999),
    ("BlanketFlannelfleece_50x60", 3999),
    ("BlanketFlannelfleece_60x80", 4999),
    ("BlanketPolarfleece_25x20", 2499),
    ("BlanketPolarfleece_30x40", 3499),
    ("BlanketPolarfleece_50x60", 4499),
    ("BlanketPolarfleece_60x80", 5499),
    ("BlanketSherpafleece_25x20", 2499),
    ("BlanketSherpafleece_30x40", 3499),
    ("BlanketSherpafleece_50x60", 4499),
    ("BlanketSherpafleece_60x80", 5499),
    ("DoubleSideBlanketFlannel_25x20", 2999),
    ("DoubleSideBlanketFlannel_30x40", 3999),
    ("DoubleSideBlanketFlannel_50x60", 4999),
    ("DoubleSideBlanketFlannel_60x80", 5999),
    // Canvas prints.
    ("Canvas_F18_10x10", 1999),
    ("Canvas_F18_12x12", 2499),
    ("Canvas_F18_16x20", 3499),
    ("Canvas_F18_30x40", 6999),
    // Photo books.
    ("PB_CailuxCover_8x6_Black_20pp", 1999),
    ("PB_CailuxCover_8x8_Black_20pp", 2499),
    ("PB_CailuxCover_11x11_Black_20pp", 3499),
    ("PB_PhotoHardCover_12x8_50pp", 4999),
    ("PB_LeatherCover_8x6_60pp", 3999),
    ("PB_LeatherCover_8x8_100pp", 5999),
    ("PB_LeatherCover_12x8_50pp", 5499),
    ("PB_LeatherCover_11x11_100pp", 6999),
    // Mugs.
    ("Mug_Basic_White_PackOf2", 2499),
    ("Mug_Basic20oz_White_PackOf2", 2999),
    // Catalogue extras.
    ("Cal_WallSS_12x17", 1499),
    ("Frame_Wooden_12x8_Oak_PackOf3", 3999),
    ("BoxedPuzzle_Board_15x11", 1999),
    ("Slate_Rect_12x12", 2999),
    ("MouseMat", 1299),
    ("CushionPolyester_18x12", 2499),
    ("MetalPrint_12x12", 4999),
];

#[async_trait]
impl BasePriceSource for StaticTablePriceSource {
    fn name(&self) -> &'static str {
        "static_table"
    }

    async fn base_price(
        &self,
        code: &ReferenceCode,
        _selections: &Selections,
    ) -> Result<Option<Decimal>, SourceError> {
        Ok(STATIC_PRICES
            .iter()
            .find(|(known, _)| known.eq_ignore_ascii_case(code.as_str()))
            .map(|(_, pence)| Decimal::new(*pence, 2)))
    }
}
