pub mod eia;
pub mod nws;
pub mod open_meteo;
pub mod state_table;

use crate::core::climate::AnnualDegreeDays;
use crate::core::weather::HourlySample;
use crate::errors::SourceError;
use crate::forecast_window::ForecastWindow;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;
use strum::Display;
use tracing::warn;

/// This module defines the external data providers the forecast draws on and how a list of
/// them is tried in order until one succeeds.

pub type SourceFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, SourceError>> + Send + 'a>>;

pub(crate) const USER_AGENT: &str = concat!("thermcast/", env!("CARGO_PKG_VERSION"));

/// Shared client for the HTTP providers. Some (NWS) reject requests without a user agent.
pub fn http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .build()
        .unwrap_or_else(|_| reqwest::Client::new())
}

/// Where a home is. Weather providers use the coordinates, rate and climate tables the state.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Location {
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
}

impl Location {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
            city: None,
            state: None,
        }
    }

    pub fn with_state(mut self, state: impl Into<String>) -> Self {
        self.state = Some(state.into());
        self
    }

    /// "City, ST" for display.
    pub fn label(&self) -> String {
        match (self.city.as_deref(), self.state.as_deref()) {
            (Some(city), Some(state)) => format!("{city}, {state}"),
            (Some(place), None) | (None, Some(place)) => place.to_string(),
            (None, None) => "Unknown".to_string(),
        }
    }

    /// Key identifying this location in lookup caches: coordinates to ~1km plus state.
    pub(crate) fn cache_key(&self) -> String {
        format!(
            "{:.2},{:.2},{}",
            self.latitude,
            self.longitude,
            self.state.as_deref().unwrap_or_default().to_ascii_uppercase()
        )
    }
}

/// How trustworthy a resolved value is, from most to least.
#[derive(Clone, Copy, Debug, Deserialize, Display, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ResolutionTier {
    UserSupplied,
    Live,
    StateAverage,
    BuiltInDefault,
}

/// Anything that can be named in fallback diagnostics.
pub trait Provider: Send + Sync {
    fn name(&self) -> &'static str;

    fn tier(&self) -> ResolutionTier {
        ResolutionTier::Live
    }
}

/// Hourly outdoor conditions for a location over a window.
pub trait WeatherSource: Provider {
    fn hourly<'a>(
        &'a self,
        location: &'a Location,
        window: &'a ForecastWindow,
    ) -> SourceFuture<'a, Vec<HourlySample>>;
}

/// Residential electricity rate in $/kWh.
pub trait RateSource: Provider {
    fn electricity_rate<'a>(&'a self, location: &'a Location) -> SourceFuture<'a, Decimal>;
}

/// Annual heating and cooling degree-days.
pub trait ClimateSource: Provider {
    fn annual_degree_days<'a>(&'a self, location: &'a Location)
        -> SourceFuture<'a, AnnualDegreeDays>;
}

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderFailure {
    pub provider: String,
    pub reason: String,
}

/// Result of trying an ordered list of providers.
#[derive(Debug)]
pub enum Outcome<T> {
    /// The first provider answered.
    Success { value: T, provider: &'static str },
    /// A later provider answered after earlier ones failed.
    FallbackUsed {
        value: T,
        provider: &'static str,
        failures: Vec<ProviderFailure>,
    },
    /// Every provider failed, or there were none.
    Failed { failures: Vec<ProviderFailure> },
}

impl<T> Outcome<T> {
    pub fn value(self) -> Option<T> {
        match self {
            Outcome::Success { value, .. } | Outcome::FallbackUsed { value, .. } => Some(value),
            Outcome::Failed { .. } => None,
        }
    }

    pub fn provider(&self) -> Option<&'static str> {
        match self {
            Outcome::Success { provider, .. } | Outcome::FallbackUsed { provider, .. } => {
                Some(provider)
            }
            Outcome::Failed { .. } => None,
        }
    }

    pub fn failures(&self) -> &[ProviderFailure] {
        match self {
            Outcome::Success { .. } => &[],
            Outcome::FallbackUsed { failures, .. } | Outcome::Failed { failures } => failures,
        }
    }

    /// Split into the answer (if any), who gave it and who failed on the way.
    pub fn into_parts(self) -> (Option<(T, &'static str)>, Vec<ProviderFailure>) {
        match self {
            Outcome::Success { value, provider } => (Some((value, provider)), vec![]),
            Outcome::FallbackUsed {
                value,
                provider,
                failures,
            } => (Some((value, provider)), failures),
            Outcome::Failed { failures } => (None, failures),
        }
    }
}

/// Try `providers` in order, returning the first successful answer. Failures are logged and
/// collected, never propagated.
pub async fn first_success<'a, P, T, F>(
    providers: impl IntoIterator<Item = &'a P>,
    mut invoke: F,
) -> Outcome<T>
where
    P: Provider + ?Sized + 'a,
    F: FnMut(&'a P) -> SourceFuture<'a, T>,
{
    let mut failures = vec![];

    for provider in providers {
        match invoke(provider).await {
            Ok(value) if failures.is_empty() => {
                return Outcome::Success {
                    value,
                    provider: provider.name(),
                }
            }
            Ok(value) => {
                warn!(
                    provider = provider.name(),
                    failed = failures.len(),
                    "fell back to a later provider"
                );
                return Outcome::FallbackUsed {
                    value,
                    provider: provider.name(),
                    failures,
                };
            }
            Err(error) => {
                warn!(provider = provider.name(), %error, "provider failed");
                failures.push(ProviderFailure {
                    provider: provider.name().to_string(),
                    reason: error.to_string(),
                });
            }
        }
    }

    Outcome::Failed { failures }
}

/// Bound a provider call by `timeout`.
pub async fn with_timeout<T>(
    provider: &'static str,
    timeout: Duration,
    call: impl Future<Output = Result<T, SourceError>>,
) -> Result<T, SourceError> {
    tokio::time::timeout(timeout, call)
        .await
        .map_err(|_| SourceError::Timeout(provider, timeout))?
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use parking_lot::Mutex;
    use pretty_assertions::assert_eq;
    use rstest::*;

    /// A rate source that answers (or fails) from a fixed value and counts its calls.
    pub(crate) struct FixedRate {
        pub(crate) name: &'static str,
        pub(crate) rate: Option<Decimal>,
        pub(crate) delay: Duration,
        pub(crate) calls: Mutex<usize>,
    }

    impl FixedRate {
        pub(crate) fn answering(name: &'static str, rate: Decimal) -> Self {
            Self {
                name,
                rate: Some(rate),
                delay: Duration::ZERO,
                calls: Mutex::new(0),
            }
        }

        pub(crate) fn failing(name: &'static str) -> Self {
            Self {
                name,
                rate: None,
                delay: Duration::ZERO,
                calls: Mutex::new(0),
            }
        }

        pub(crate) fn calls(&self) -> usize {
            *self.calls.lock()
        }
    }

    impl Provider for FixedRate {
        fn name(&self) -> &'static str {
            self.name
        }
    }

    impl RateSource for FixedRate {
        fn electricity_rate<'a>(&'a self, _location: &'a Location) -> SourceFuture<'a, Decimal> {
            Box::pin(async move {
                *self.calls.lock() += 1;
                if !self.delay.is_zero() {
                    tokio::time::sleep(self.delay).await;
                }
                self.rate.ok_or_else(|| SourceError::Unavailable {
                    provider: self.name,
                    reason: "offline".to_string(),
                })
            })
        }
    }

    #[fixture]
    fn location() -> Location {
        Location::new(39.74, -104.99).with_state("CO")
    }

    #[rstest]
    #[tokio::test]
    async fn first_success_should_report_primary_provider(location: Location) {
        let providers = [
            FixedRate::answering("primary", Decimal::new(15, 2)),
            FixedRate::answering("secondary", Decimal::new(20, 2)),
        ];
        let outcome =
            first_success(providers.iter(), |p| p.electricity_rate(&location)).await;
        assert!(matches!(outcome, Outcome::Success { provider: "primary", .. }));
        assert_eq!(providers[1].calls(), 0);
    }

    #[rstest]
    #[tokio::test]
    async fn first_success_should_fall_back_in_order(location: Location) {
        let providers = [
            FixedRate::failing("primary"),
            FixedRate::answering("secondary", Decimal::new(20, 2)),
            FixedRate::answering("tertiary", Decimal::new(30, 2)),
        ];
        let outcome =
            first_success(providers.iter(), |p| p.electricity_rate(&location)).await;
        assert_eq!(outcome.provider(), Some("secondary"));
        assert_eq!(outcome.failures().len(), 1);
        assert_eq!(outcome.failures()[0].provider, "primary");
        assert_eq!(outcome.value(), Some(Decimal::new(20, 2)));
        assert_eq!(providers[2].calls(), 0);
    }

    #[rstest]
    #[tokio::test]
    async fn first_success_should_collect_every_failure(location: Location) {
        let providers = [FixedRate::failing("a"), FixedRate::failing("b")];
        let outcome =
            first_success(providers.iter(), |p| p.electricity_rate(&location)).await;
        assert!(matches!(outcome, Outcome::Failed { .. }));
        assert_eq!(outcome.failures().len(), 2);
    }

    #[rstest]
    #[tokio::test]
    async fn with_timeout_should_fail_slow_providers(location: Location) {
        let slow = FixedRate {
            delay: Duration::from_secs(5),
            ..FixedRate::answering("slow", Decimal::ONE)
        };
        let result = with_timeout(
            "slow",
            Duration::from_millis(10),
            slow.electricity_rate(&location),
        )
        .await;
        assert!(matches!(result, Err(SourceError::Timeout("slow", _))));
    }

    #[rstest]
    fn location_label_and_cache_key() {
        let location = Location {
            city: Some("Denver".to_string()),
            ..Location::new(39.7392, -104.9903).with_state("co")
        };
        assert_eq!(location.label(), "Denver, co");
        assert_eq!(location.cache_key(), "39.74,-104.99,CO");
    }
}
