use crate::core::climate::AnnualDegreeDays;
use crate::core::energy_supply::state_data::{StateAverage, StateAverages};
use crate::errors::SourceError;
use crate::sources::{ClimateSource, Location, Provider, RateSource, ResolutionTier, SourceFuture};
use rust_decimal::Decimal;

const PROVIDER: &str = "state-average-table";

/// Rates and degree-days from the state-average table compiled into the crate.
#[derive(Clone, Copy, Debug, Default)]
pub struct StateTableSource;

impl StateTableSource {
    fn lookup(&self, location: &Location) -> Result<&'static StateAverage, SourceError> {
        let table = StateAverages::embedded().map_err(|e| SourceError::Unavailable {
            provider: PROVIDER,
            reason: e.to_string(),
        })?;
        let state = location
            .state
            .as_deref()
            .ok_or_else(|| SourceError::NotFound {
                provider: PROVIDER,
                key: "location without a state".to_string(),
            })?;
        table.get(state).ok_or_else(|| SourceError::NotFound {
            provider: PROVIDER,
            key: state.to_string(),
        })
    }
}

impl Provider for StateTableSource {
    fn name(&self) -> &'static str {
        PROVIDER
    }

    fn tier(&self) -> ResolutionTier {
        ResolutionTier::StateAverage
    }
}

impl RateSource for StateTableSource {
    fn electricity_rate<'a>(&'a self, location: &'a Location) -> SourceFuture<'a, Decimal> {
        Box::pin(async move { Ok(self.lookup(location)?.electricity_rate) })
    }
}

impl ClimateSource for StateTableSource {
    fn annual_degree_days<'a>(
        &'a self,
        location: &'a Location,
    ) -> SourceFuture<'a, AnnualDegreeDays> {
        Box::pin(async move { Ok(self.lookup(location)?.degree_days) })
    }
}
