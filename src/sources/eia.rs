use crate::core::units::to_decimal;
use crate::errors::SourceError;
use crate::sources::{Location, Provider, RateSource, SourceFuture};
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::Value;

/// This module looks up the latest average residential electricity price for a state from the
/// US Energy Information Administration retail-sales API.

const BASE_URL: &str = "https://api.eia.gov/v2/electricity/retail-sales/data/";
const PROVIDER: &str = "eia";
pub const API_KEY_ENV_VAR: &str = "EIA_API_KEY";

#[derive(Clone, Debug)]
pub struct EiaRateSource {
    client: reqwest::Client,
    api_key: String,
}

impl EiaRateSource {
    pub fn new(client: reqwest::Client, api_key: impl Into<String>) -> Self {
        Self {
            client,
            api_key: api_key.into(),
        }
    }

    /// Build from the `EIA_API_KEY` environment variable, if set.
    pub fn from_env(client: reqwest::Client) -> Option<Self> {
        std::env::var(API_KEY_ENV_VAR)
            .ok()
            .filter(|key| !key.trim().is_empty())
            .map(|key| Self::new(client, key))
    }

    fn query(&self, state: &str) -> Vec<(&'static str, String)> {
        vec![
            ("api_key", self.api_key.clone()),
            ("frequency", "monthly".to_string()),
            ("data[0]", "price".to_string()),
            ("facets[stateid][]", state.to_ascii_uppercase()),
            ("facets[sectorid][]", "RES".to_string()),
            ("sort[0][column]", "period".to_string()),
            ("sort[0][direction]", "desc".to_string()),
            ("length", "1".to_string()),
        ]
    }
}

impl Provider for EiaRateSource {
    fn name(&self) -> &'static str {
        PROVIDER
    }
}

impl RateSource for EiaRateSource {
    fn electricity_rate<'a>(&'a self, location: &'a Location) -> SourceFuture<'a, Decimal> {
        Box::pin(async move {
            let state = location
                .state
                .as_deref()
                .filter(|state| state.trim().len() == 2)
                .ok_or_else(|| SourceError::Unavailable {
                    provider: PROVIDER,
                    reason: "a two-letter state code is required".to_string(),
                })?;
            let body = self
                .client
                .get(BASE_URL)
                .query(&self.query(state.trim()))
                .send()
                .await
                .and_then(|response| response.error_for_status())
                .map_err(SourceError::http(PROVIDER))?
                .text()
                .await
                .map_err(SourceError::http(PROVIDER))?;

            parse_latest_price(&body, state)
        })
    }
}

#[derive(Debug, Deserialize)]
struct RetailSalesResponse {
    response: RetailSalesData,
}

#[derive(Debug, Deserialize)]
struct RetailSalesData {
    data: Vec<RetailSalesRow>,
}

#[derive(Debug, Deserialize)]
struct RetailSalesRow {
    /// Cents per kWh; the API returns either a string or a number.
    price: Value,
}

/// The most recent price in the response, converted from cents to dollars per kWh.
fn parse_latest_price(body: &str, state: &str) -> Result<Decimal, SourceError> {
    let response: RetailSalesResponse =
        serde_json::from_str(body).map_err(|e| SourceError::parse(PROVIDER, e.to_string()))?;
    let row = response
        .response
        .data
        .into_iter()
        .next()
        .ok_or_else(|| SourceError::NotFound {
            provider: PROVIDER,
            key: state.to_string(),
        })?;
    let cents = match &row.price {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text.trim().parse::<f64>().ok(),
        _ => None,
    }
    .filter(|cents| cents.is_finite() && *cents > 0.)
    .ok_or_else(|| SourceError::parse(PROVIDER, format!("unusable price {}", row.price)))?;

    Ok(to_decimal(cents / 100.))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::*;

    #[rstest]
    #[case::string(r#"{"response": {"data": [{"period": "2026-07", "stateid": "CO", "price": "15.52"}]}}"#)]
    #[case::number(r#"{"response": {"data": [{"period": "2026-07", "stateid": "CO", "price": 15.52}]}}"#)]
    fn should_convert_cents_to_dollars(#[case] body: &str) {
        assert_eq!(parse_latest_price(body, "CO").unwrap(), Decimal::new(1552, 4));
    }

    #[rstest]
    fn should_report_missing_state() {
        let body = r#"{"response": {"total": 0, "data": []}}"#;
        assert!(matches!(
            parse_latest_price(body, "ZZ"),
            Err(SourceError::NotFound { .. })
        ));
    }

    #[rstest]
    #[case(r#"{"response": {"data": [{"price": null}]}}"#)]
    #[case(r#"{"response": {"data": [{"price": "n/a"}]}}"#)]
    #[case(r#"{"error": "invalid api_key"}"#)]
    fn should_reject_unusable_prices(#[case] body: &str) {
        assert!(matches!(
            parse_latest_price(body, "CO"),
            Err(SourceError::Parse { .. })
        ));
    }

    #[rstest]
    #[tokio::test]
    async fn should_require_a_state_code() {
        let source = EiaRateSource::new(reqwest::Client::new(), "key");
        let result = source
            .electricity_rate(&Location::new(39.74, -104.99))
            .await;
        assert!(matches!(result, Err(SourceError::Unavailable { .. })));
    }

    #[rstest]
    #[tokio::test]
    async fn failed_request_should_not_expose_api_key() {
        let source = EiaRateSource::new(reqwest::Client::new(), "SECRET123");
        let error = source
            .client
            .get("http://127.0.0.1:1/v2/electricity/retail-sales/data/")
            .query(&source.query("CO"))
            .send()
            .await
            .map_err(SourceError::http(PROVIDER))
            .unwrap_err();

        assert!(matches!(error, SourceError::Http { provider: "eia", .. }));
        assert!(!error.to_string().contains("SECRET123"));
        assert!(!format!("{error:?}").contains("SECRET123"));
    }
}
