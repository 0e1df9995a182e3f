use std::time::Duration;

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::Deserialize;

use bulkpix_core::errors::SourceError;
use bulkpix_core::pricing::sources::{QuantityPrice, TierPricing, TierPricingApi};

const SOURCE: &str = "tier_pricing_api";

/// Client for the storefront `GetProductsAndTierPricingV2` endpoint. The API
/// takes its arguments as query parameters and an empty JSON body.
pub struct TierPricingClient {
    http: reqwest::Client,
    base_url: String,
}

impl TierPricingClient {
    pub fn new(base_url: impl Into<String>, timeout_secs: u64) -> Result<Self, reqwest::Error> {
        let http =
            reqwest::Client::builder().timeout(Duration::from_secs(timeout_secs.max(1))).build()?;
        Ok(Self { http, base_url: base_url.into() })
    }
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    #[serde(rename = "Status", default)]
    status: Option<String>,
    #[serde(rename = "Message", default)]
    message: Option<String>,
    #[serde(default)]
    data: Option<ApiData>,
}

#[derive(Debug, Deserialize)]
struct ApiData {
    #[serde(rename = "tierPricings", default)]
    tier_pricings: Vec<ApiTierPricing>,
}

#[derive(Debug, Deserialize)]
struct ApiTierPricing {
    #[serde(rename = "platinumProductReferenceId", default)]
    platinum_product_reference_id: String,
    #[serde(default)]
    prices: Vec<ApiPrice>,
}

#[derive(Debug, Deserialize)]
struct ApiPrice {
    quantity: u32,
    price: f64,
}

fn candidates_from(response: ApiResponse) -> Result<Vec<TierPricing>, SourceError> {
    if let Some(status) = response.status.as_deref() {
        // A "Status": "ERROR" envelope comes back with HTTP 200.
        if status.eq_ignore_ascii_case("error") {
            return Err(SourceError::Malformed {
                origin: SOURCE,
                detail: response.message.unwrap_or_else(|| "api reported an error".to_string()),
            });
        }
    }

    let tier_pricings = response.data.map(|data| data.tier_pricings).unwrap_or_default();
    Ok(tier_pricings
        .into_iter()
        .filter(|tier| !tier.platinum_product_reference_id.is_empty())
        .map(|tier| TierPricing {
            candidate_id: tier.platinum_product_reference_id,
            prices: tier
                .prices
                .into_iter()
                .filter_map(|entry| {
                    Decimal::try_from(entry.price)
                        .ok()
                        .map(|price| QuantityPrice { quantity: entry.quantity, price })
                })
                .collect(),
        })
        .collect())
}

#[async_trait]
impl TierPricingApi for TierPricingClient {
    async fn tier_pricing(&self, page_id: &str) -> Result<Vec<TierPricing>, SourceError> {
        let url = format!("{}/GetProductsAndTierPricingV2/", self.base_url.trim_end_matches('/'));

        let response = self
            .http
            .post(&url)
            .query(&[
                ("productPageId", page_id),
                ("couponCode", ""),
                ("couponProductId", ""),
                ("vc", ""),
                ("affCoupon", ""),
                ("photoW", "0"),
                ("photoH", "0"),
                ("defaultSorting", "false"),
                ("preselectedRefId", ""),
            ])
            .json(&serde_json::json!({}))
            .send()
            .await
            .map_err(|err| {
                if err.is_timeout() {
                    SourceError::Timeout { origin: SOURCE }
                } else {
                    SourceError::Unreachable { origin: SOURCE, detail: err.to_string() }
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(SourceError::Unreachable {
                origin: SOURCE,
                detail: format!("http status {status}"),
            });
        }

        let parsed = response.json::<ApiResponse>().await.map_err(|err| {
            SourceError::Malformed { origin: SOURCE, detail: err.to_string() }
        })?;

        candidates_from(parsed)
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use super::{candidates_from, ApiResponse};

    fn parse(raw: &str) -> ApiResponse {
        serde_json::from_str(raw).expect("parse fixture")
    }

    #[test]
    fn successful_response_maps_to_candidates() {
        let response = parse(
            r#"{
                "Status": "OK",
                "data": {
                    "tierPricings": [
                        {
                            "platinumProductReferenceId": "BlanketSherpafleece_76x102",
                            "prices": [
                                { "quantity": 1, "price": 79.90 },
                                { "quantity": 5, "price": 75.00 }
                            ]
                        },
                        {
                            "platinumProductReferenceId": "",
                            "prices": [ { "quantity": 1, "price": 10.0 } ]
                        }
                    ]
                }
            }"#,
        );

        let candidates = candidates_from(response).expect("candidates");
        assert_eq!(candidates.len(), 1, "nameless candidates are dropped");
        assert_eq!(candidates[0].candidate_id, "BlanketSherpafleece_76x102");
        assert_eq!(candidates[0].prices.len(), 2);
        assert_eq!(candidates[0].prices[0].quantity, 1);
        assert_eq!(candidates[0].prices[0].price.round_dp(2), Decimal::new(7990, 2));
    }

    #[test]
    fn error_envelope_with_http_200_is_a_source_error() {
        let response = parse(r#"{ "Status": "ERROR", "Message": "internal fault" }"#);
        let error = candidates_from(response).expect_err("should fail");
        assert!(error.to_string().contains("internal fault"));
    }

    #[test]
    fn missing_data_section_yields_no_candidates() {
        let response = parse(r#"{ "Status": "OK" }"#);
        assert!(candidates_from(response).expect("candidates").is_empty());
    }
}
