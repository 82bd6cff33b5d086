use crate::core::units::HOURS_PER_DAY;
use crate::errors::ConfigurationError;
use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use serde::{Deserialize, Serialize};

/// Truncate a location-local timestamp down to the start of its hour.
pub fn truncate_to_hour(timestamp: NaiveDateTime) -> NaiveDateTime {
    timestamp
        .date()
        .and_time(NaiveTime::MIN)
        .checked_add_signed(Duration::hours(timestamp.hour() as i64))
        .unwrap_or(timestamp)
}

pub fn first_of_month(year: i32, month: u32) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(year, month, 1)
}

pub fn days_in_month(year: i32, month: u32) -> u32 {
    let Some(start) = first_of_month(year, month) else {
        return 0;
    };
    let next = if month == 12 {
        first_of_month(year + 1, 1)
    } else {
        first_of_month(year, month + 1)
    };
    next.map(|next| (next - start).num_days() as u32)
        .unwrap_or(31)
}

/// A half-open, hour-aligned coverage window `[start, end)` in location-local time.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ForecastWindow {
    start: NaiveDateTime,
    end: NaiveDateTime,
}

impl ForecastWindow {
    pub fn new(start: NaiveDateTime, end: NaiveDateTime) -> Result<Self, ConfigurationError> {
        let start = truncate_to_hour(start);
        let end = truncate_to_hour(end);
        if end <= start {
            return Err(ConfigurationError::new(
                "window",
                format!("window end {end} must be after its start {start}"),
            ));
        }
        Ok(Self { start, end })
    }

    /// Every hour of the given calendar month.
    pub fn month(year: i32, month: u32) -> Result<Self, ConfigurationError> {
        let start = first_of_month(year, month)
            .ok_or_else(|| {
                ConfigurationError::new("window", format!("{year}-{month} is not a month"))
            })?;
        let end = start + Duration::days(days_in_month(year, month) as i64);
        Self::new(start.and_time(NaiveTime::MIN), end.and_time(NaiveTime::MIN))
    }

    /// From the hour containing `now` to the end of its calendar month.
    pub fn remainder_of_month(now: NaiveDateTime) -> Result<Self, ConfigurationError> {
        let month = Self::month(now.year(), now.month())?;
        Self::new(now, month.end)
    }

    pub fn start(&self) -> NaiveDateTime {
        self.start
    }

    pub fn end(&self) -> NaiveDateTime {
        self.end
    }

    /// The part of this window that begins before `cutoff`, rounded out to the hour containing
    /// it. `None` if the window starts at or after `cutoff`.
    pub fn until(&self, cutoff: NaiveDateTime) -> Option<Self> {
        let mut end = truncate_to_hour(cutoff);
        if end < cutoff {
            end += Duration::hours(1);
        }
        let end = end.min(self.end);
        (end > self.start).then_some(Self {
            start: self.start,
            end,
        })
    }

    pub fn total_hours(&self) -> usize {
        (self.end - self.start).num_hours() as usize
    }

    pub fn contains(&self, timestamp: NaiveDateTime) -> bool {
        timestamp >= self.start && timestamp < self.end
    }

    /// Calendar months touched by this window, in order.
    pub fn months(&self) -> Vec<(i32, u32)> {
        let mut months: Vec<(i32, u32)> = vec![];
        for hour in self.iter() {
            let key = (hour.time.year(), hour.time.month());
            if months.last() != Some(&key) {
                months.push(key);
            }
        }
        months
    }

    pub fn iter(&self) -> ForecastWindowIterator {
        ForecastWindowIterator {
            current_index: 0,
            window: *self,
        }
    }
}

#[derive(Clone)]
pub struct ForecastWindowIterator {
    current_index: usize,
    window: ForecastWindow,
}

impl Iterator for ForecastWindowIterator {
    type Item = ForecastHour;

    fn next(&mut self) -> Option<Self::Item> {
        let time = self.window.start + Duration::hours(self.current_index as i64);
        if time >= self.window.end {
            return None;
        }
        let item = ForecastHour {
            index: self.current_index,
            time,
        };
        self.current_index += 1;
        Some(item)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.window.total_hours().saturating_sub(self.current_index);
        (remaining, Some(remaining))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ForecastHour {
    pub index: usize,
    pub time: NaiveDateTime,
}

impl ForecastHour {
    pub fn hour_of_day(&self) -> u32 {
        self.time.hour()
    }

    pub fn date(&self) -> NaiveDate {
        self.time.date()
    }

    /// Index of this hour within its calendar month, as laid out by a generated month.
    pub fn hour_of_month(&self) -> usize {
        (self.time.day0() * HOURS_PER_DAY + self.time.hour()) as usize
    }
}
