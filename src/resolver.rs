use crate::core::climate::AnnualDegreeDays;
use crate::sources::{
    first_success, with_timeout, ClimateSource, Location, ProviderFailure, RateSource,
    ResolutionTier, SourceFuture,
};
use parking_lot::RwLock;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// This module resolves the electricity rate and annual degree-days for a location through
/// ordered fallback chains, ending in built-in defaults so a forecast can always be made.

/// Dollars per kWh used when no rate can be found.
pub const DEFAULT_ELECTRICITY_RATE: Decimal = Decimal::from_parts(15, 0, 0, false, 2);
pub const DEFAULT_LOOKUP_TIMEOUT: Duration = Duration::from_secs(10);

const USER_SUPPLIED: &str = "user";
const BUILT_IN_DEFAULT: &str = "built-in-default";

/// A looked-up value with where it came from and which providers failed first.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Resolved<T> {
    pub value: T,
    pub tier: ResolutionTier,
    pub provider: String,
    pub failures: Vec<ProviderFailure>,
}

impl<T> Resolved<T> {
    fn new(value: T, tier: ResolutionTier, provider: &str, failures: Vec<ProviderFailure>) -> Self {
        Self {
            value,
            tier,
            provider: provider.to_string(),
            failures,
        }
    }

    pub fn is_default(&self) -> bool {
        self.tier == ResolutionTier::BuiltInDefault
    }
}

pub struct RateAndClimateResolver {
    rate_sources: Vec<Arc<dyn RateSource>>,
    climate_sources: Vec<Arc<dyn ClimateSource>>,
    timeout: Duration,
    rate_cache: RwLock<HashMap<String, Resolved<Decimal>>>,
    climate_cache: RwLock<HashMap<String, Resolved<AnnualDegreeDays>>>,
}

impl RateAndClimateResolver {
    /// Build a resolver that tries `rate_sources` and `climate_sources` in the given order.
    pub fn new(
        rate_sources: Vec<Arc<dyn RateSource>>,
        climate_sources: Vec<Arc<dyn ClimateSource>>,
    ) -> Self {
        Self {
            rate_sources,
            climate_sources,
            timeout: DEFAULT_LOOKUP_TIMEOUT,
            rate_cache: Default::default(),
            climate_cache: Default::default(),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Electricity rate for `location`. A user-supplied rate always wins and is never cached.
    pub async fn electricity_rate(
        &self,
        location: &Location,
        user_supplied: Option<Decimal>,
    ) -> Resolved<Decimal> {
        if let Some(rate) = user_supplied.filter(|rate| *rate > Decimal::ZERO) {
            return Resolved::new(rate, ResolutionTier::UserSupplied, USER_SUPPLIED, vec![]);
        }

        let timeout = self.timeout;
        resolve_cached(
            &self.rate_cache,
            location,
            DEFAULT_ELECTRICITY_RATE,
            self.rate_sources.iter().map(|source| source.as_ref()),
            |source| {
                Box::pin(async move {
                    let rate =
                        with_timeout(source.name(), timeout, source.electricity_rate(location))
                            .await?;
                    Ok((rate, source.tier()))
                })
            },
        )
        .await
    }

    /// Annual heating and cooling degree-days for `location`.
    pub async fn annual_degree_days(&self, location: &Location) -> Resolved<AnnualDegreeDays> {
        let timeout = self.timeout;
        resolve_cached(
            &self.climate_cache,
            location,
            AnnualDegreeDays::DEFAULT,
            self.climate_sources.iter().map(|source| source.as_ref()),
            |source| {
                Box::pin(async move {
                    let degree_days = with_timeout(
                        source.name(),
                        timeout,
                        source.annual_degree_days(location),
                    )
                    .await?;
                    Ok((degree_days, source.tier()))
                })
            },
        )
        .await
    }
}

async fn resolve_cached<'a, P, T, F>(
    cache: &RwLock<HashMap<String, Resolved<T>>>,
    location: &Location,
    default: T,
    providers: impl IntoIterator<Item = &'a P>,
    invoke: F,
) -> Resolved<T>
where
    P: crate::sources::Provider + ?Sized + 'a,
    T: Clone,
    F: FnMut(&'a P) -> SourceFuture<'a, (T, ResolutionTier)>,
{
    let key = location.cache_key();
    if let Some(hit) = cache.read().get(&key) {
        debug!(%key, provider = %hit.provider, "lookup cache hit");
        return hit.clone();
    }

    let (answer, failures) = first_success(providers, invoke).await.into_parts();
    let resolved = match answer {
        Some(((value, tier), provider)) => Resolved::new(value, tier, provider, failures),
        None => {
            warn!(
                location = %location.label(),
                failed = failures.len(),
                "every provider failed; using built-in default"
            );
            Resolved::new(default, ResolutionTier::BuiltInDefault, BUILT_IN_DEFAULT, failures)
        }
    };

    if !resolved.is_default() {
        cache.write().entry(key).or_insert_with(|| resolved.clone());
    }
    resolved
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::state_table::StateTableSource;
    use crate::sources::tests::FixedRate;
    use pretty_assertions::assert_eq;
    use rstest::*;

    #[fixture]
    fn location() -> Location {
        Location::new(39.74, -104.99).with_state("CO")
    }

    fn resolver_with(rate_sources: Vec<Arc<dyn RateSource>>) -> RateAndClimateResolver {
        RateAndClimateResolver::new(rate_sources, vec![Arc::new(StateTableSource)])
    }

    #[rstest]
    #[tokio::test]
    async fn user_supplied_rate_should_win(location: Location) {
        let live = Arc::new(FixedRate::answering("live", Decimal::new(20, 2)));
        let resolver = resolver_with(vec![live.clone()]);
        let resolved = resolver
            .electricity_rate(&location, Some(Decimal::new(12, 2)))
            .await;
        assert_eq!(resolved.tier, ResolutionTier::UserSupplied);
        assert_eq!(resolved.value, Decimal::new(12, 2));
        assert_eq!(live.calls(), 0);
    }

    #[rstest]
    #[tokio::test]
    async fn should_fall_back_from_live_to_state_average(location: Location) {
        let resolver = resolver_with(vec![
            Arc::new(FixedRate::failing("live")),
            Arc::new(StateTableSource),
        ]);
        let resolved = resolver.electricity_rate(&location, None).await;
        assert_eq!(resolved.tier, ResolutionTier::StateAverage);
        assert_eq!(resolved.value, Decimal::new(152, 3));
        assert_eq!(resolved.failures.len(), 1);
    }

    #[rstest]
    #[tokio::test]
    async fn should_use_defaults_when_everything_fails() {
        let resolver = resolver_with(vec![
            Arc::new(FixedRate::failing("live")),
            Arc::new(StateTableSource),
        ]);
        let nowhere = Location::new(0., 0.);
        let rate = resolver.electricity_rate(&nowhere, None).await;
        assert!(rate.is_default());
        assert_eq!(rate.value, Decimal::new(15, 2));
        assert_eq!(rate.failures.len(), 2);

        let climate = resolver.annual_degree_days(&nowhere).await;
        assert!(climate.is_default());
        assert_eq!(climate.value, AnnualDegreeDays::DEFAULT);
    }

    #[rstest]
    #[tokio::test]
    async fn should_cache_resolved_values_per_location(location: Location) {
        let live = Arc::new(FixedRate::answering("live", Decimal::new(20, 2)));
        let resolver = resolver_with(vec![live.clone()]);

        let first = resolver.electricity_rate(&location, None).await;
        let second = resolver.electricity_rate(&location, None).await;
        assert_eq!(first, second);
        assert_eq!(first.tier, ResolutionTier::Live);
        assert_eq!(live.calls(), 1);

        let elsewhere = Location::new(44.98, -93.27).with_state("MN");
        resolver.electricity_rate(&elsewhere, None).await;
        assert_eq!(live.calls(), 2);
    }

    #[rstest]
    #[tokio::test]
    async fn should_not_cache_defaults() {
        let live = Arc::new(FixedRate::failing("live"));
        let resolver = resolver_with(vec![live.clone()]);
        let nowhere = Location::new(0., 0.);
        resolver.electricity_rate(&nowhere, None).await;
        resolver.electricity_rate(&nowhere, None).await;
        assert_eq!(live.calls(), 2);
    }

    #[rstest]
    #[tokio::test]
    async fn should_time_out_slow_providers(location: Location) {
        let slow = FixedRate {
            delay: Duration::from_secs(5),
            ..FixedRate::answering("slow", Decimal::ONE)
        };
        let resolver = resolver_with(vec![Arc::new(slow), Arc::new(StateTableSource)])
            .with_timeout(Duration::from_millis(10));
        let resolved = resolver.electricity_rate(&location, None).await;
        assert_eq!(resolved.tier, ResolutionTier::StateAverage);
        assert!(resolved.failures[0].reason.contains("timed out"));
    }

    #[rstest]
    #[tokio::test]
    async fn should_resolve_state_climate(location: Location) {
        let resolver = resolver_with(vec![]);
        let climate = resolver.annual_degree_days(&location).await;
        assert_eq!(climate.tier, ResolutionTier::StateAverage);
        assert_eq!(
            climate.value,
            AnnualDegreeDays {
                heating: 6000.,
                cooling: 700.
            }
        );
    }
}
