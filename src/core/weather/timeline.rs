use crate::core::climate::ClimateNormals;
use crate::core::weather::synthetic::{
    generate_month, CalibrationOutcome, GeneratorParams, TemperatureEnvelope,
};
use crate::core::weather::{HourlySample, Provenance};
use crate::errors::ConfigurationError;
use crate::forecast_window::ForecastWindow;
use crate::statistics::summarise;
use chrono::{Datelike, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// Number of most recent real hours that seed the synthetic envelope.
const SEED_HOURS: usize = 48;

#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MonthCalibration {
    pub year: i32,
    pub month: u32,
    pub outcome: CalibrationOutcome,
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TimelineDiagnostics {
    pub actual_hours: usize,
    pub forecast_hours: usize,
    pub synthetic_hours: usize,
    /// Samples that landed on an hour already covered; resolved by provenance priority.
    pub collisions: usize,
    /// Samples discarded for falling outside their source's partition of the window.
    pub dropped: usize,
    pub seed_envelope: Option<TemperatureEnvelope>,
    pub calibrations: Vec<MonthCalibration>,
}

/// One gapless, strictly ascending hourly timeline for a coverage window.
#[derive(Clone, Debug)]
pub struct WeatherTimeline {
    samples: Vec<HourlySample>,
    diagnostics: TimelineDiagnostics,
}

impl WeatherTimeline {
    pub fn samples(&self) -> &[HourlySample] {
        &self.samples
    }

    pub fn diagnostics(&self) -> &TimelineDiagnostics {
        &self.diagnostics
    }

    pub fn into_parts(self) -> (Vec<HourlySample>, TimelineDiagnostics) {
        (self.samples, self.diagnostics)
    }
}

/// Merge historical and forecast samples with a synthetic fill into one sample per hour of
/// `window`.
///
/// Historical samples strictly before `now` and forecast samples at or after `now` are kept
/// verbatim; every other hour is synthesised from the month's climate normals, shaped by the
/// most recent real hours available.
pub fn build_timeline(
    window: &ForecastWindow,
    now: NaiveDateTime,
    historical: &[HourlySample],
    forecast: &[HourlySample],
    climate: &ClimateNormals,
    params: &GeneratorParams,
) -> Result<WeatherTimeline, ConfigurationError> {
    let mut diagnostics = TimelineDiagnostics::default();
    let mut merged: BTreeMap<NaiveDateTime, HourlySample> = BTreeMap::new();

    let historical_in_partition = historical
        .iter()
        .map(|sample| sample.aligned_to_hour())
        .filter(|sample| sample.timestamp() < now && window.contains(sample.timestamp()));
    let forecast_in_partition = forecast
        .iter()
        .map(|sample| sample.aligned_to_hour())
        .filter(|sample| sample.timestamp() >= now && window.contains(sample.timestamp()));
    let kept = historical_in_partition
        .chain(forecast_in_partition)
        .collect::<Vec<_>>();
    diagnostics.dropped = historical.len() + forecast.len() - kept.len();
    if diagnostics.dropped > 0 {
        debug!(
            dropped = diagnostics.dropped,
            "discarded samples outside their partition of the window"
        );
    }
    for sample in kept {
        merge(&mut merged, sample, &mut diagnostics.collisions);
    }

    let missing = window
        .iter()
        .filter(|hour| !merged.contains_key(&hour.time))
        .collect::<Vec<_>>();

    if !missing.is_empty() {
        let seed_envelope = recent_envelope(historical, forecast);
        diagnostics.seed_envelope = seed_envelope;
        for (year, month) in window.months() {
            let gaps = missing
                .iter()
                .filter(|hour| hour.time.year() == year && hour.time.month() == month)
                .collect::<Vec<_>>();
            if gaps.is_empty() {
                continue;
            }
            let target = climate.month_target(year, month);
            let envelope =
                seed_envelope.unwrap_or_else(|| ClimateNormals::default_envelope(&target));
            let generated = generate_month(&target, &envelope, params)?;
            diagnostics.calibrations.push(MonthCalibration {
                year,
                month,
                outcome: generated.calibration,
            });
            for hour in gaps {
                if let Some(sample) = generated.samples.get(hour.hour_of_month()) {
                    merge(&mut merged, *sample, &mut diagnostics.collisions);
                }
            }
        }
    }

    let samples = merged.into_values().collect::<Vec<_>>();
    for sample in &samples {
        match sample.provenance() {
            Provenance::Actual => diagnostics.actual_hours += 1,
            Provenance::Forecast => diagnostics.forecast_hours += 1,
            Provenance::Synthetic => diagnostics.synthetic_hours += 1,
        }
    }
    if diagnostics.collisions > 0 {
        warn!(
            collisions = diagnostics.collisions,
            "weather sources overlapped; kept the highest-priority sample for each hour"
        );
    }

    Ok(WeatherTimeline {
        samples,
        diagnostics,
    })
}

/// Insert a sample, resolving a timestamp collision in favour of the higher (or equal, later)
/// provenance priority.
fn merge(
    merged: &mut BTreeMap<NaiveDateTime, HourlySample>,
    sample: HourlySample,
    collisions: &mut usize,
) {
    match merged.entry(sample.timestamp()) {
        Entry::Vacant(entry) => {
            entry.insert(sample);
        }
        Entry::Occupied(mut entry) => {
            *collisions += 1;
            warn!(
                timestamp = %sample.timestamp(),
                existing = %entry.get().provenance(),
                incoming = %sample.provenance(),
                "duplicate weather sample for hour"
            );
            if sample.provenance() >= entry.get().provenance() {
                entry.insert(sample);
            }
        }
    }
}

/// Average, min and max of the most recent real hours supplied by either source.
fn recent_envelope(
    historical: &[HourlySample],
    forecast: &[HourlySample],
) -> Option<TemperatureEnvelope> {
    let mut real = historical
        .iter()
        .chain(forecast)
        .filter(|sample| sample.provenance() != Provenance::Synthetic)
        .collect::<Vec<_>>();
    real.sort_by_key(|sample| sample.timestamp());
    let recent = real
        .iter()
        .rev()
        .take(SEED_HOURS)
        .map(|sample| sample.outdoor_temp_f())
        .filter(|temp| temp.is_finite())
        .collect::<Vec<_>>();

    summarise(&recent).map(|summary| TemperatureEnvelope {
        avg: summary.mean,
        min: summary.min,
        max: summary.max,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::climate::AnnualDegreeDays;
    use crate::statistics::heating_degree_days;
    use chrono::{Duration, NaiveDate};
    use itertools::Itertools;
    use pretty_assertions::assert_eq;
    use rstest::*;

    fn at(d: u32, h: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 11, d)
            .unwrap()
            .and_hms_opt(h, 0, 0)
            .unwrap()
    }

    #[fixture]
    fn window() -> ForecastWindow {
        ForecastWindow::month(2026, 11).unwrap()
    }

    #[fixture]
    fn climate() -> ClimateNormals {
        ClimateNormals::new(AnnualDegreeDays::DEFAULT, 65., 65.)
    }

    #[fixture]
    fn now() -> NaiveDateTime {
        at(10, 12)
    }

    fn hourly(
        from: NaiveDateTime,
        hours: usize,
        make: fn(NaiveDateTime, f64, f64) -> HourlySample,
    ) -> Vec<HourlySample> {
        (0..hours)
            .map(|i| make(from + Duration::hours(i as i64), 40. + (i % 24) as f64 * 0.5, 70.))
            .collect()
    }

    fn assert_gapless(timeline: &WeatherTimeline, window: &ForecastWindow) {
        let samples = timeline.samples();
        assert_eq!(samples.len(), window.total_hours());
        assert_eq!(samples[0].timestamp(), window.start());
        assert!(samples
            .iter()
            .tuple_windows()
            .all(|(a, b)| b.timestamp() - a.timestamp() == Duration::hours(1)));
    }

    #[rstest]
    fn should_cover_window_for_every_source_combination(
        window: ForecastWindow,
        climate: ClimateNormals,
        now: NaiveDateTime,
        #[values(true, false)] with_history: bool,
        #[values(true, false)] with_forecast: bool,
    ) {
        let historical = if with_history {
            hourly(at(1, 0), 9 * 24 + 12, HourlySample::actual)
        } else {
            vec![]
        };
        let forecast = if with_forecast {
            hourly(now, 7 * 24, HourlySample::forecast)
        } else {
            vec![]
        };
        let timeline = build_timeline(
            &window,
            now,
            &historical,
            &forecast,
            &climate,
            &GeneratorParams::default(),
        )
        .unwrap();

        assert_gapless(&timeline, &window);
        let diagnostics = timeline.diagnostics();
        assert_eq!(diagnostics.actual_hours, historical.len());
        assert_eq!(diagnostics.forecast_hours, forecast.len());
        assert_eq!(
            diagnostics.synthetic_hours,
            window.total_hours() - historical.len() - forecast.len()
        );
        assert_eq!(diagnostics.collisions, 0);
    }

    #[rstest]
    fn should_keep_real_samples_verbatim(
        window: ForecastWindow,
        climate: ClimateNormals,
        now: NaiveDateTime,
    ) {
        let historical = vec![HourlySample::actual(at(3, 5), 12.5, 81.)];
        let timeline = build_timeline(
            &window,
            now,
            &historical,
            &[],
            &climate,
            &GeneratorParams::default(),
        )
        .unwrap();
        let kept = timeline.samples()[2 * 24 + 5];
        assert_eq!(kept, historical[0]);
    }

    #[rstest]
    fn should_partition_sources_by_now(
        window: ForecastWindow,
        climate: ClimateNormals,
        now: NaiveDateTime,
    ) {
        // A "historical" sample in the future and a forecast sample in the past are both
        // outside their partitions.
        let historical = vec![HourlySample::actual(at(20, 0), 30., 60.)];
        let forecast = vec![HourlySample::forecast(at(2, 0), 30., 60.)];
        let timeline = build_timeline(
            &window,
            now,
            &historical,
            &forecast,
            &climate,
            &GeneratorParams::default(),
        )
        .unwrap();
        assert_eq!(timeline.diagnostics().dropped, 2);
        assert_eq!(timeline.diagnostics().synthetic_hours, window.total_hours());
    }

    #[rstest]
    fn should_resolve_collisions_by_provenance_priority(
        window: ForecastWindow,
        climate: ClimateNormals,
        now: NaiveDateTime,
    ) {
        let historical = vec![
            HourlySample::actual(at(4, 6), 20., 60.),
            HourlySample::new(at(4, 6), 25., 60., Provenance::Synthetic),
            HourlySample::actual(at(4, 7) + Duration::minutes(20), 21., 60.),
            HourlySample::actual(at(4, 7), 22., 60.),
        ];
        let timeline = build_timeline(
            &window,
            now,
            &historical,
            &[],
            &climate,
            &GeneratorParams::default(),
        )
        .unwrap();

        assert_gapless(&timeline, &window);
        assert_eq!(timeline.diagnostics().collisions, 2);
        let six = timeline.samples()[3 * 24 + 6];
        assert_eq!(six.outdoor_temp_f(), 20.);
        assert_eq!(six.provenance(), Provenance::Actual);
        let seven = timeline.samples()[3 * 24 + 7];
        assert_eq!(seven.outdoor_temp_f(), 22.);
    }

    #[rstest]
    fn fully_synthetic_month_should_still_be_calibrated(
        window: ForecastWindow,
        climate: ClimateNormals,
        now: NaiveDateTime,
    ) {
        let timeline =
            build_timeline(&window, now, &[], &[], &climate, &GeneratorParams::default()).unwrap();
        assert_gapless(&timeline, &window);
        assert!(timeline
            .samples()
            .iter()
            .all(|s| s.provenance() == Provenance::Synthetic));
        assert_eq!(timeline.diagnostics().seed_envelope, None);

        let target = climate.month_target(2026, 11).heating_degree_days;
        let achieved =
            heating_degree_days(timeline.samples().iter().map(|s| s.outdoor_temp_f()), 65.);
        assert!((achieved - target).abs() / target <= 0.01);
    }

    #[rstest]
    fn should_seed_envelope_from_most_recent_real_hours(
        window: ForecastWindow,
        climate: ClimateNormals,
        now: NaiveDateTime,
    ) {
        let mut historical = (0..24)
            .map(|i| HourlySample::actual(at(1, 0) + Duration::hours(i), -50., 60.))
            .collect::<Vec<_>>();
        historical.extend(hourly(at(8, 12), 48, HourlySample::actual));
        let timeline = build_timeline(
            &window,
            now,
            &historical,
            &[],
            &climate,
            &GeneratorParams::default(),
        )
        .unwrap();
        let envelope = timeline.diagnostics().seed_envelope.unwrap();
        assert_eq!(envelope.min, 40.);
        assert_eq!(envelope.max, 51.5);
    }
}
