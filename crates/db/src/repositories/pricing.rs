use std::str::FromStr;

use async_trait::async_trait;
use rust_decimal::Decimal;
use sqlx::Row;

use bulkpix_core::domain::quote::ReferenceCode;
use bulkpix_core::domain::session::Selections;
use bulkpix_core::errors::SourceError;
use bulkpix_core::pricing::sources::{BasePriceSource, DiscountRateSource, PageIdSource};

use crate::DbPool;

const SOURCE: &str = "discount_rates";

/// Lookups against the negotiated `discount_rates` table. The same table
/// carries the discount fraction, the optional product page id used by the
/// tier-pricing API, and an optional base price that serves as the final
/// entry in the base-price chain.
pub struct SqlDiscountRateSource {
    pool: DbPool,
}

impl SqlDiscountRateSource {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn unreachable_err(err: sqlx::Error) -> SourceError {
    SourceError::Unreachable { origin: SOURCE, detail: err.to_string() }
}

fn parse_decimal(column: &str, raw: &str) -> Result<Decimal, SourceError> {
    Decimal::from_str(raw).map_err(|err| SourceError::Malformed {
        origin: SOURCE,
        detail: format!("{column} `{raw}`: {err}"),
    })
}

#[async_trait]
impl DiscountRateSource for SqlDiscountRateSource {
    async fn discount_percent(
        &self,
        code: &ReferenceCode,
        price_point: &str,
    ) -> Result<Option<Decimal>, SourceError> {
        let row = sqlx::query(
            "SELECT percent_discount FROM discount_rates
             WHERE reference_code = ? COLLATE NOCASE AND price_point = ?",
        )
        .bind(code.as_str())
        .bind(price_point)
        .fetch_optional(&self.pool)
        .await
        .map_err(unreachable_err)?;

        let Some(row) = row else {
            return Ok(None);
        };

        // Stored as a fraction (0.82); callers work in percent units (82.0).
        let fraction = parse_decimal("percent_discount", &row.get::<String, _>("percent_discount"))?;
        Ok(Some(fraction * Decimal::from(100)))
    }
}

#[async_trait]
impl PageIdSource for SqlDiscountRateSource {
    async fn page_id(&self, code: &ReferenceCode) -> Result<Option<String>, SourceError> {
        let row = sqlx::query(
            "SELECT page_id FROM discount_rates
             WHERE reference_code = ? COLLATE NOCASE AND page_id IS NOT NULL
             LIMIT 1",
        )
        .bind(code.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(unreachable_err)?;

        Ok(row.map(|row| row.get::<String, _>("page_id")))
    }
}

#[async_trait]
impl BasePriceSource for SqlDiscountRateSource {
    fn name(&self) -> &'static str {
        SOURCE
    }

    async fn base_price(
        &self,
        code: &ReferenceCode,
        _selections: &Selections,
    ) -> Result<Option<Decimal>, SourceError> {
        let row = sqlx::query(
            "SELECT base_price FROM discount_rates
             WHERE reference_code = ? COLLATE NOCASE AND base_price IS NOT NULL
             LIMIT 1",
        )
        .bind(code.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(unreachable_err)?;

        match row {
            Some(row) => {
                let price = parse_decimal("base_price", &row.get::<String, _>("base_price"))?;
                Ok(Some(price))
            }
            None => Ok(None),
        }
    }
}
