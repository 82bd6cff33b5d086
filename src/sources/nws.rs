use crate::core::weather::HourlySample;
use crate::errors::SourceError;
use crate::forecast_window::ForecastWindow;
use crate::sources::{Location, Provider, SourceFuture, WeatherSource};
use chrono::DateTime;
use serde::Deserialize;

/// This module fetches the hourly forecast from the US National Weather Service
/// (api.weather.gov). It is used as a fallback forecast provider; it covers about a week.

const BASE_URL: &str = "https://api.weather.gov";
const PROVIDER: &str = "nws";
const DEFAULT_RELATIVE_HUMIDITY_PCT: f64 = 60.;

#[derive(Clone, Debug)]
pub struct NwsForecastSource {
    client: reqwest::Client,
}

impl NwsForecastSource {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }

    async fn get(&self, url: &str) -> Result<String, SourceError> {
        self.client
            .get(url)
            .header(reqwest::header::ACCEPT, "application/geo+json")
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .map_err(SourceError::http(PROVIDER))?
            .text()
            .await
            .map_err(SourceError::http(PROVIDER))
    }
}

impl Provider for NwsForecastSource {
    fn name(&self) -> &'static str {
        PROVIDER
    }
}

impl WeatherSource for NwsForecastSource {
    fn hourly<'a>(
        &'a self,
        location: &'a Location,
        window: &'a ForecastWindow,
    ) -> SourceFuture<'a, Vec<HourlySample>> {
        Box::pin(async move {
            let points_url = format!(
                "{BASE_URL}/points/{:.4},{:.4}",
                location.latitude, location.longitude
            );
            let forecast_url = parse_forecast_hourly_url(&self.get(&points_url).await?)?;
            let samples = parse_hourly_periods(&self.get(&forecast_url).await?)?;

            Ok(samples
                .into_iter()
                .filter(|sample| window.contains(sample.timestamp()))
                .collect())
        })
    }
}

#[derive(Debug, Deserialize)]
struct PointsResponse {
    properties: PointsProperties,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PointsProperties {
    forecast_hourly: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ForecastResponse {
    properties: ForecastProperties,
}

#[derive(Debug, Deserialize)]
struct ForecastProperties {
    periods: Vec<Period>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Period {
    start_time: String,
    temperature: f64,
    #[serde(default)]
    temperature_unit: Option<String>,
    #[serde(default)]
    relative_humidity: Option<QuantitativeValue>,
}

#[derive(Debug, Deserialize)]
struct QuantitativeValue {
    value: Option<f64>,
}

fn parse_forecast_hourly_url(body: &str) -> Result<String, SourceError> {
    let response: PointsResponse =
        serde_json::from_str(body).map_err(|e| SourceError::parse(PROVIDER, e.to_string()))?;
    response
        .properties
        .forecast_hourly
        .ok_or_else(|| SourceError::NotFound {
            provider: PROVIDER,
            key: "forecastHourly".to_string(),
        })
}

/// Periods are stamped with the station's UTC offset; their local wall-clock hour is kept.
fn parse_hourly_periods(body: &str) -> Result<Vec<HourlySample>, SourceError> {
    let response: ForecastResponse =
        serde_json::from_str(body).map_err(|e| SourceError::parse(PROVIDER, e.to_string()))?;

    response
        .properties
        .periods
        .into_iter()
        .map(|period| {
            let start = DateTime::parse_from_rfc3339(&period.start_time).map_err(|e| {
                SourceError::parse(PROVIDER, format!("bad startTime {:?}: {e}", period.start_time))
            })?;
            let temperature_f = match period.temperature_unit.as_deref() {
                Some("C") => crate::core::units::celsius_to_fahrenheit(period.temperature),
                _ => period.temperature,
            };
            let humidity = period
                .relative_humidity
                .and_then(|rh| rh.value)
                .unwrap_or(DEFAULT_RELATIVE_HUMIDITY_PCT);
            Ok(HourlySample::forecast(
                start.naive_local(),
                temperature_f,
                humidity,
            ))
        })
        .collect()
}
