pub mod synthetic;
pub mod timeline;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use strum::Display;

/// Where an hourly sample came from. Ordered by merge priority: a later variant wins a
/// timestamp collision.
#[derive(
    Clone, Copy, Debug, Deserialize, Display, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize,
)]
#[serde(rename_all = "camelCase")]
pub enum Provenance {
    Synthetic,
    Forecast,
    Actual,
}

impl Provenance {
    /// Whether values derived from this sample are estimates rather than measurements.
    pub fn is_estimated(&self) -> bool {
        !matches!(self, Provenance::Actual)
    }
}

/// One hour of outdoor conditions. The provenance is fixed at construction.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HourlySample {
    timestamp: NaiveDateTime,
    outdoor_temp_f: f64,
    relative_humidity_pct: f64,
    provenance: Provenance,
}

impl HourlySample {
    pub fn new(
        timestamp: NaiveDateTime,
        outdoor_temp_f: f64,
        relative_humidity_pct: f64,
        provenance: Provenance,
    ) -> Self {
        Self {
            timestamp,
            outdoor_temp_f,
            relative_humidity_pct,
            provenance,
        }
    }

    pub fn actual(
        timestamp: NaiveDateTime,
        outdoor_temp_f: f64,
        relative_humidity_pct: f64,
    ) -> Self {
        Self::new(timestamp, outdoor_temp_f, relative_humidity_pct, Provenance::Actual)
    }

    pub fn forecast(
        timestamp: NaiveDateTime,
        outdoor_temp_f: f64,
        relative_humidity_pct: f64,
    ) -> Self {
        Self::new(timestamp, outdoor_temp_f, relative_humidity_pct, Provenance::Forecast)
    }

    pub fn timestamp(&self) -> NaiveDateTime {
        self.timestamp
    }

    pub fn outdoor_temp_f(&self) -> f64 {
        self.outdoor_temp_f
    }

    pub fn relative_humidity_pct(&self) -> f64 {
        self.relative_humidity_pct
    }

    pub fn provenance(&self) -> Provenance {
        self.provenance
    }

    /// The same sample re-keyed to the start of its hour.
    pub(crate) fn aligned_to_hour(self) -> Self {
        Self {
            timestamp: crate::forecast_window::truncate_to_hour(self.timestamp),
            ..self
        }
    }
}
