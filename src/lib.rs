pub mod core;
pub mod errors;
pub mod fetch;
pub mod forecast;
pub mod forecast_window;
pub mod input;
pub mod output;
pub mod read_weather_file;
pub mod report;
pub mod resolver;
pub mod sources;
mod statistics;


extern crate lazy_static;

pub use crate::errors::ForecastError;
pub use crate::forecast::{forecast, ForecastConfig, ForecastEngine, WeatherInputs};
pub use crate::report::{BridgeSummary, ForecastReport};

use crate::core::weather::HourlySample;
use crate::fetch::{RequestCoordinator, WeatherFetcher};
use crate::input::{ingest_for_processing, ForecastInput};
use crate::output::Output;
use crate::read_weather_file::StaticWeatherSource;
use crate::resolver::RateAndClimateResolver;
use crate::sources::eia::EiaRateSource;
use crate::sources::nws::NwsForecastSource;
use crate::sources::open_meteo::OpenMeteoSource;
use crate::sources::state_table::StateTableSource;
use crate::sources::{ClimateSource, RateSource, WeatherSource};
use chrono::NaiveDateTime;
use csv::WriterBuilder;
use std::io::Read;
use std::sync::Arc;
use tracing::info;

/// Gathers weather, rates and climate for forecast requests and runs them, letting only the
/// most recent request finish.
pub struct ForecastService {
    coordinator: RequestCoordinator,
    fetcher: WeatherFetcher,
    resolver: RateAndClimateResolver,
    engine: ForecastEngine,
}

impl ForecastService {
    pub fn new(fetcher: WeatherFetcher, resolver: RateAndClimateResolver) -> Self {
        Self {
            coordinator: RequestCoordinator::new(),
            fetcher,
            resolver,
            engine: ForecastEngine::default(),
        }
    }

    /// Weather from Open-Meteo (falling back to the National Weather Service for the
    /// forecast), rates from the EIA when an API key is configured, then state averages.
    pub fn online(client: reqwest::Client) -> Self {
        let historical: Vec<Arc<dyn WeatherSource>> =
            vec![Arc::new(OpenMeteoSource::archive(client.clone()))];
        let forecast: Vec<Arc<dyn WeatherSource>> = vec![
            Arc::new(OpenMeteoSource::forecast(client.clone())),
            Arc::new(NwsForecastSource::new(client.clone())),
        ];

        let mut rates: Vec<Arc<dyn RateSource>> = vec![];
        if let Some(eia) = EiaRateSource::from_env(client) {
            rates.push(Arc::new(eia));
        }
        rates.push(Arc::new(StateTableSource));
        let climate: Vec<Arc<dyn ClimateSource>> = vec![Arc::new(StateTableSource)];

        Self::new(
            WeatherFetcher::new(historical, forecast),
            RateAndClimateResolver::new(rates, climate),
        )
    }

    /// Weather from samples already loaded, e.g. from files; rates and climate from the
    /// state-average table.
    pub fn offline(historical: Vec<HourlySample>, forecast: Vec<HourlySample>) -> Self {
        let from_file = |name: &'static str, samples: Vec<HourlySample>| {
            let sources: Vec<Arc<dyn WeatherSource>> = if samples.is_empty() {
                vec![]
            } else {
                vec![Arc::new(StaticWeatherSource::new(name, samples))]
            };
            sources
        };

        Self::new(
            WeatherFetcher::new(
                from_file("historical-file", historical),
                from_file("forecast-file", forecast),
            ),
            RateAndClimateResolver::new(
                vec![Arc::new(StateTableSource)],
                vec![Arc::new(StateTableSource)],
            ),
        )
    }

    /// Run a forecast. Fails with `Superseded` if another request starts before this one
    /// finishes.
    pub async fn run(
        &self,
        input: ForecastInput,
        now: NaiveDateTime,
    ) -> Result<Arc<ForecastReport>, ForecastError> {
        let mut ticket = self.coordinator.begin();
        ticket.run(self.gather_and_forecast(input, now)).await?
    }

    async fn gather_and_forecast(
        &self,
        input: ForecastInput,
        now: NaiveDateTime,
    ) -> Result<Arc<ForecastReport>, ForecastError> {
        let now = input.now.unwrap_or(now);
        let window = input.window.resolve(now)?;
        info!(
            location = %input.location.label(),
            start = %window.start(),
            end = %window.end(),
            "forecast requested"
        );

        let (weather, rate, degree_days) = tokio::join!(
            self.fetcher.fetch(&input.location, &window, now),
            self.resolver
                .electricity_rate(&input.location, input.home.user_electricity_rate()),
            self.resolver.annual_degree_days(&input.location),
        );
        let config = input.into_config(now, rate, degree_days)?;

        self.engine.forecast(&config, &weather.into())
    }
}

/// Read a forecast input, run it and write its outputs. `seed` replaces the input's
/// synthetic weather seed when given.
pub async fn run_project(
    input: impl Read,
    output: impl Output,
    service: &ForecastService,
    now: NaiveDateTime,
    seed: Option<u64>,
) -> anyhow::Result<Arc<ForecastReport>> {
    let mut input = ingest_for_processing(input)?;
    if let Some(seed) = seed {
        input.generator.seed = seed;
    }
    let report = service.run(input, now).await?;
    write_forecast_outputs(&report, output)?;

    Ok(report)
}

/// Write the report JSON, the bridge summary JSON and the hourly CSV.
pub fn write_forecast_outputs(
    report: &ForecastReport,
    output: impl Output,
) -> Result<(), anyhow::Error> {
    if output.is_noop() {
        return Ok(());
    }

    info!("writing out forecast report");
    let writer = output.writer_for_location_key("report", "json")?;
    serde_json::to_writer_pretty(writer, report)?;

    let writer = output.writer_for_location_key("summary", "json")?;
    serde_json::to_writer_pretty(writer, &report.bridge_summary())?;

    let writer = output.writer_for_location_key("hourly", "csv")?;
    let mut writer = WriterBuilder::new().from_writer(writer);
    for record in &report.hourly {
        writer.serialize(record)?;
    }
    writer.flush()?;

    Ok(())
}
