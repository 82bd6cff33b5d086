use crate::core::weather::HourlySample;
use crate::errors::ForecastError;
use crate::forecast_window::ForecastWindow;
use crate::sources::{first_success, with_timeout, Location, ProviderFailure, WeatherSource};
use chrono::NaiveDateTime;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info};

/// This module fetches real weather for a forecast window and makes sure only the newest
/// forecast request gets to finish.

pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(20);

/// Hands out request tickets. Starting a new request supersedes every earlier one.
#[derive(Debug)]
pub struct RequestCoordinator {
    generation: watch::Sender<u64>,
}

impl Default for RequestCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

impl RequestCoordinator {
    pub fn new() -> Self {
        let (generation, _) = watch::channel(0);
        Self { generation }
    }

    pub fn begin(&self) -> RequestTicket {
        self.generation.send_modify(|generation| *generation += 1);
        let receiver = self.generation.subscribe();
        let id = *receiver.borrow();
        debug!(request = id, "began forecast request");
        RequestTicket { id, receiver }
    }
}

#[derive(Debug)]
pub struct RequestTicket {
    id: u64,
    receiver: watch::Receiver<u64>,
}

impl RequestTicket {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn is_current(&self) -> bool {
        *self.receiver.borrow() == self.id
    }

    /// Drive `work` to completion unless a newer request begins first, in which case `work`
    /// is dropped and `Superseded` returned.
    pub async fn run<F: Future>(&mut self, work: F) -> Result<F::Output, ForecastError> {
        if !self.is_current() {
            return Err(ForecastError::Superseded(self.id));
        }
        let id = self.id;

        let output = tokio::select! {
            biased;
            _ = superseded(&mut self.receiver, id) => None,
            output = work => Some(output),
        };

        match output {
            Some(output) if self.is_current() => Ok(output),
            _ => {
                info!(request = id, "forecast request superseded");
                Err(ForecastError::Superseded(id))
            }
        }
    }
}

async fn superseded(receiver: &mut watch::Receiver<u64>, id: u64) {
    loop {
        if *receiver.borrow_and_update() != id {
            return;
        }
        if receiver.changed().await.is_err() {
            // coordinator dropped; nothing can supersede us any more
            std::future::pending::<()>().await;
        }
    }
}

/// Real weather gathered for one window.
#[derive(Clone, Debug, Default)]
pub struct FetchedWeather {
    pub historical: Vec<HourlySample>,
    pub forecast: Vec<HourlySample>,
    pub historical_provider: Option<&'static str>,
    pub forecast_provider: Option<&'static str>,
    pub failures: Vec<ProviderFailure>,
}

/// Fetches history and forecast concurrently, each through its own fallback chain.
pub struct WeatherFetcher {
    historical_sources: Vec<Arc<dyn WeatherSource>>,
    forecast_sources: Vec<Arc<dyn WeatherSource>>,
    timeout: Duration,
}

impl WeatherFetcher {
    pub fn new(
        historical_sources: Vec<Arc<dyn WeatherSource>>,
        forecast_sources: Vec<Arc<dyn WeatherSource>>,
    ) -> Self {
        Self {
            historical_sources,
            forecast_sources,
            timeout: DEFAULT_FETCH_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// History is only requested for the part of the window before `now`, and the forecast
    /// only when the window has not yet ended.
    pub async fn fetch(
        &self,
        location: &Location,
        window: &ForecastWindow,
        now: NaiveDateTime,
    ) -> FetchedWeather {
        let elapsed = window.until(now);
        let upcoming = (now < window.end()).then_some(window);

        let (historical, forecast) = tokio::join!(
            self.fetch_chain(&self.historical_sources, location, elapsed.as_ref()),
            self.fetch_chain(&self.forecast_sources, location, upcoming),
        );

        let mut fetched = FetchedWeather::default();
        if let Some((samples, provider)) = historical.0 {
            fetched.historical = samples;
            fetched.historical_provider = Some(provider);
        }
        if let Some((samples, provider)) = forecast.0 {
            fetched.forecast = samples;
            fetched.forecast_provider = Some(provider);
        }
        fetched.failures = historical.1.into_iter().chain(forecast.1).collect();
        info!(
            historical_hours = fetched.historical.len(),
            forecast_hours = fetched.forecast.len(),
            failures = fetched.failures.len(),
            "fetched weather"
        );

        fetched
    }

    async fn fetch_chain(
        &self,
        sources: &[Arc<dyn WeatherSource>],
        location: &Location,
        window: Option<&ForecastWindow>,
    ) -> (Option<(Vec<HourlySample>, &'static str)>, Vec<ProviderFailure>) {
        let Some(window) = window.filter(|_| !sources.is_empty()) else {
            return (None, vec![]);
        };
        let timeout = self.timeout;
        first_success(sources.iter().map(|source| source.as_ref()), |source| {
            Box::pin(with_timeout(
                source.name(),
                timeout,
                source.hourly(location, window),
            ))
        })
        .await
        .into_parts()
    }
}
