use crate::core::weather::{HourlySample, Provenance};
use crate::errors::SourceError;
use crate::forecast_window::ForecastWindow;
use crate::sources::{Location, Provider, SourceFuture, WeatherSource};
use anyhow::{anyhow, Context};
use chrono::NaiveDateTime;
use csv::ReaderBuilder as CsvReaderBuilder;
use serde::Deserialize;
use std::io::Read;

/// This module reads hourly weather from CSV files with the columns
/// `time,temperature_f,relative_humidity_pct`, for running forecasts offline.

const TIME_FORMATS: [&str; 3] = ["%Y-%m-%dT%H:%M", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M"];
const DEFAULT_RELATIVE_HUMIDITY_PCT: f64 = 60.;

#[derive(Debug, Deserialize)]
struct WeatherRow {
    time: String,
    temperature_f: f64,
    relative_humidity_pct: Option<f64>,
}

fn parse_time(time: &str) -> anyhow::Result<NaiveDateTime> {
    TIME_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(time.trim(), format).ok())
        .ok_or_else(|| anyhow!("Unrecognised timestamp {time:?}"))
}

/// Read every row of an hourly weather CSV, tagging samples with `provenance`.
pub fn weather_data_to_samples(
    file: impl Read,
    provenance: Provenance,
) -> anyhow::Result<Vec<HourlySample>> {
    let mut reader = CsvReaderBuilder::new().trim(csv::Trim::All).from_reader(file);

    reader
        .deserialize::<WeatherRow>()
        .enumerate()
        .map(|(i, row)| {
            let row = row.with_context(|| format!("Weather file row {} is invalid", i + 1))?;
            Ok(HourlySample::new(
                parse_time(&row.time)?,
                row.temperature_f,
                row.relative_humidity_pct
                    .unwrap_or(DEFAULT_RELATIVE_HUMIDITY_PCT),
                provenance,
            ))
        })
        .collect()
}

/// A weather source answering from samples already in memory, e.g. read from a file.
#[derive(Clone, Debug)]
pub struct StaticWeatherSource {
    name: &'static str,
    samples: Vec<HourlySample>,
}

impl StaticWeatherSource {
    pub fn new(name: &'static str, samples: Vec<HourlySample>) -> Self {
        Self { name, samples }
    }
}

impl Provider for StaticWeatherSource {
    fn name(&self) -> &'static str {
        self.name
    }
}

impl WeatherSource for StaticWeatherSource {
    fn hourly<'a>(
        &'a self,
        _location: &'a Location,
        window: &'a ForecastWindow,
    ) -> SourceFuture<'a, Vec<HourlySample>> {
        Box::pin(async move {
            let samples = self
                .samples
                .iter()
                .filter(|sample| window.contains(sample.timestamp()))
                .copied()
                .collect::<Vec<_>>();
            if samples.is_empty() {
                return Err(SourceError::NotFound {
                    provider: self.name,
                    key: format!("{} to {}", window.start(), window.end()),
                });
            }
            Ok(samples)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use pretty_assertions::assert_eq;
    use rstest::*;
    use std::io::Cursor;

    const CSV: &str = "time,temperature_f,relative_humidity_pct
2026-11-01T00:00,38.5,71
2026-11-01 01:00, 37.0 ,
2026-11-01T02:00:00,36.2,80
";

    #[rstest]
    fn should_read_hourly_rows() {
        let samples = weather_data_to_samples(Cursor::new(CSV), Provenance::Actual).unwrap();
        let midnight = NaiveDate::from_ymd_opt(2026, 11, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        assert_eq!(samples.len(), 3);
        assert_eq!(samples[0], HourlySample::actual(midnight, 38.5, 71.));
        assert_eq!(samples[1].relative_humidity_pct(), 60.);
        assert_eq!(samples[1].outdoor_temp_f(), 37.);
        assert_eq!(
            samples[2].timestamp(),
            midnight + chrono::Duration::hours(2)
        );
    }

    #[rstest]
    fn should_name_the_bad_row() {
        let csv = "time,temperature_f,relative_humidity_pct\n2026-11-01T00:00,cold,50\n";
        let error = weather_data_to_samples(Cursor::new(csv), Provenance::Actual).unwrap_err();
        assert!(error.to_string().contains("row 1"));
    }

    #[rstest]
    fn should_reject_unknown_timestamps() {
        let csv = "time,temperature_f,relative_humidity_pct\nlast tuesday,40,50\n";
        assert!(weather_data_to_samples(Cursor::new(csv), Provenance::Forecast).is_err());
    }

    #[rstest]
    #[tokio::test]
    async fn static_source_should_serve_window_only() {
        let samples = weather_data_to_samples(Cursor::new(CSV), Provenance::Actual).unwrap();
        let source = StaticWeatherSource::new("file", samples);
        let location = Location::new(0., 0.);

        let november = ForecastWindow::month(2026, 11).unwrap();
        assert_eq!(source.hourly(&location, &november).await.unwrap().len(), 3);

        let december = ForecastWindow::month(2026, 12).unwrap();
        assert!(matches!(
            source.hourly(&location, &december).await,
            Err(SourceError::NotFound { .. })
        ));
    }
}
