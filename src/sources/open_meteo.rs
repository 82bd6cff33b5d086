use crate::core::weather::{HourlySample, Provenance};
use crate::errors::SourceError;
use crate::forecast_window::ForecastWindow;
use crate::sources::{Location, Provider, SourceFuture, WeatherSource};
use chrono::{Duration, NaiveDate, NaiveDateTime};
use serde::Deserialize;

/// This module fetches hourly temperature and humidity from Open-Meteo: observed history from
/// the archive API and a 16-day forecast from the forecast API.

const ARCHIVE_URL: &str = "https://archive-api.open-meteo.com/v1/archive";
const FORECAST_URL: &str = "https://api.open-meteo.com/v1/forecast";
const FORECAST_DAYS: u32 = 16;
const TIME_FORMAT: &str = "%Y-%m-%dT%H:%M";
const DEFAULT_RELATIVE_HUMIDITY_PCT: f64 = 60.;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Api {
    Archive,
    Forecast,
}

#[derive(Clone, Debug)]
pub struct OpenMeteoSource {
    client: reqwest::Client,
    api: Api,
}

impl OpenMeteoSource {
    /// Observed hours, returned with `Actual` provenance.
    pub fn archive(client: reqwest::Client) -> Self {
        Self {
            client,
            api: Api::Archive,
        }
    }

    /// Forecast hours, returned with `Forecast` provenance.
    pub fn forecast(client: reqwest::Client) -> Self {
        Self {
            client,
            api: Api::Forecast,
        }
    }

    fn url(&self) -> &'static str {
        match self.api {
            Api::Archive => ARCHIVE_URL,
            Api::Forecast => FORECAST_URL,
        }
    }

    fn provenance(&self) -> Provenance {
        match self.api {
            Api::Archive => Provenance::Actual,
            Api::Forecast => Provenance::Forecast,
        }
    }
}

/// Dates to ask the archive for: the window's first day through the last day that ends
/// inside the window. `None` when no day ends inside it.
fn archive_dates(window: &ForecastWindow) -> Option<(NaiveDate, NaiveDate)> {
    let first = window.start().date();
    let last = (window.end() - Duration::days(1)).date();
    (last >= first).then_some((first, last))
}

impl OpenMeteoSource {
    fn query(&self, location: &Location, window: &ForecastWindow) -> Vec<(&'static str, String)> {
        let mut query = vec![
            ("latitude", location.latitude.to_string()),
            ("longitude", location.longitude.to_string()),
            ("hourly", "temperature_2m,relative_humidity_2m".to_string()),
            ("temperature_unit", "fahrenheit".to_string()),
            ("timezone", "auto".to_string()),
        ];
        match self.api {
            Api::Archive => {
                if let Some((first, last)) = archive_dates(window) {
                    query.push(("start_date", first.to_string()));
                    query.push(("end_date", last.to_string()));
                }
            }
            Api::Forecast => query.push(("forecast_days", FORECAST_DAYS.to_string())),
        }
        query
    }
}

impl Provider for OpenMeteoSource {
    fn name(&self) -> &'static str {
        match self.api {
            Api::Archive => "open-meteo-archive",
            Api::Forecast => "open-meteo-forecast",
        }
    }
}

impl WeatherSource for OpenMeteoSource {
    fn hourly<'a>(
        &'a self,
        location: &'a Location,
        window: &'a ForecastWindow,
    ) -> SourceFuture<'a, Vec<HourlySample>> {
        Box::pin(async move {
            if self.api == Api::Archive && archive_dates(window).is_none() {
                return Ok(vec![]);
            }
            let body = self
                .client
                .get(self.url())
                .query(&self.query(location, window))
                .send()
                .await
                .and_then(|response| response.error_for_status())
                .map_err(SourceError::http(self.name()))?
                .text()
                .await
                .map_err(SourceError::http(self.name()))?;

            let samples = parse_hourly(self.name(), &body, self.provenance())?;
            Ok(samples
                .into_iter()
                .filter(|sample| window.contains(sample.timestamp()))
                .collect())
        })
    }
}

#[derive(Debug, Deserialize)]
struct HourlyResponse {
    hourly: HourlyColumns,
}

#[derive(Debug, Deserialize)]
struct HourlyColumns {
    time: Vec<String>,
    temperature_2m: Vec<Option<f64>>,
    #[serde(default)]
    relative_humidity_2m: Vec<Option<f64>>,
}

/// Parse an Open-Meteo hourly response. Hours with no temperature are skipped; missing
/// humidity falls back to 60%.
pub(crate) fn parse_hourly(
    provider: &'static str,
    body: &str,
    provenance: Provenance,
) -> Result<Vec<HourlySample>, SourceError> {
    let response: HourlyResponse =
        serde_json::from_str(body).map_err(|e| SourceError::parse(provider, e.to_string()))?;
    let columns = response.hourly;
    if columns.temperature_2m.len() != columns.time.len() {
        return Err(SourceError::parse(
            provider,
            format!(
                "{} timestamps but {} temperatures",
                columns.time.len(),
                columns.temperature_2m.len()
            ),
        ));
    }

    columns
        .time
        .iter()
        .zip(columns.temperature_2m)
        .enumerate()
        .filter_map(|(i, (time, temperature))| temperature.map(|t| (i, time, t)))
        .map(|(i, time, temperature)| {
            let timestamp = NaiveDateTime::parse_from_str(time, TIME_FORMAT)
                .map_err(|e| SourceError::parse(provider, format!("bad time {time:?}: {e}")))?;
            let humidity = columns
                .relative_humidity_2m
                .get(i)
                .copied()
                .flatten()
                .unwrap_or(DEFAULT_RELATIVE_HUMIDITY_PCT);
            Ok(HourlySample::new(timestamp, temperature, humidity, provenance))
        })
        .collect()
}
