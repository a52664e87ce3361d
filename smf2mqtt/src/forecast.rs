use std::collections::BTreeMap;
use std::ops::Bound::{Excluded, Included};

use chrono::{DateTime, DurationRound, NaiveDateTime, TimeDelta, TimeZone, Utc};
use chrono_tz::Tz;
use serde_derive::Deserialize;

use crate::error::ForecastError;

/// Resolution of the Solar Manager forecast.
pub const DEFAULT_INTERVAL: TimeDelta = TimeDelta::minutes(15);

/// Number of quarter hours in the look-ahead list of the 24 h sensor.
pub const NEXT_24H_STEPS: i64 = 24 * 4;

/// One raw element of the `data` array returned by the forecast endpoint.
#[derive(Debug, Default, Deserialize)]
pub struct ForecastEntry {
    #[serde(default)]
    pub t: Option<String>,
    #[serde(rename = "pW", default)]
    pub power_w: Option<f64>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ForecastPoint {
    pub timestamp: DateTime<Tz>,
    pub power_watts: i64,
    /// Energy of the bucket starting at `timestamp`.
    pub energy_wh: i64,
}

/// A complete forecast as returned by one successful update.
///
/// Points are kept in ascending timestamp order and expressed in the
/// configured time zone, which also defines the hour buckets used for the
/// energy dashboard.
#[derive(Clone, Debug)]
pub struct Estimate {
    timezone: Tz,
    points: Vec<ForecastPoint>,
    wh_hours: BTreeMap<DateTime<Tz>, i64>,
}

impl Estimate {
    pub fn from_entries(
        entries: Vec<ForecastEntry>,
        timezone: Tz,
        default_interval: TimeDelta,
    ) -> Result<Self, ForecastError> {
        // sorted by time, a repeated timestamp keeps the last value
        let mut watts = BTreeMap::new();
        for entry in entries {
            let Some(t) = entry.t.filter(|t| !t.is_empty()) else {
                continue;
            };
            let timestamp = parse_timestamp(&t)?.with_timezone(&timezone);
            let power_watts = entry.power_w.map_or(0, |power| power.trunc() as i64);
            watts.insert(timestamp, power_watts);
        }
        let watts: Vec<(DateTime<Tz>, i64)> = watts.into_iter().collect();

        let mut points = Vec::with_capacity(watts.len());
        let mut wh_hours_acc: BTreeMap<DateTime<Tz>, f64> = BTreeMap::new();
        for (idx, &(timestamp, power_watts)) in watts.iter().enumerate() {
            let end = watts
                .get(idx + 1)
                .map_or(timestamp + default_interval, |&(next, _)| next);
            let hours = (end - timestamp).num_milliseconds() as f64 / 3_600_000.0;
            let wh = power_watts as f64 * hours;

            *wh_hours_acc.entry(hour_start(&timestamp)?).or_default() += wh;
            points.push(ForecastPoint {
                timestamp,
                power_watts,
                energy_wh: wh.round() as i64,
            });
        }

        let wh_hours = wh_hours_acc
            .into_iter()
            .map(|(hour, wh)| (hour, wh.round() as i64))
            .collect();

        Ok(Self {
            timezone,
            points,
            wh_hours,
        })
    }

    pub fn timezone(&self) -> Tz {
        self.timezone
    }

    pub fn points(&self) -> &[ForecastPoint] {
        &self.points
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn watts(&self) -> impl Iterator<Item = (DateTime<Tz>, i64)> + '_ {
        self.points.iter().map(|p| (p.timestamp, p.power_watts))
    }

    pub fn wh_period(&self) -> impl Iterator<Item = (DateTime<Tz>, i64)> + '_ {
        self.points.iter().map(|p| (p.timestamp, p.energy_wh))
    }

    /// Energy per local hour, keyed by the start of the hour.
    pub fn wh_hours(&self) -> &BTreeMap<DateTime<Tz>, i64> {
        &self.wh_hours
    }

    /// Power of the last point at or before `at`, without interpolation.
    ///
    /// Times before the first point report the first value and times after
    /// the last point keep reporting the last value. An empty forecast
    /// reports 0 W.
    pub fn power_production_at<T: TimeZone>(&self, at: &DateTime<T>) -> i64 {
        let at = at.with_timezone(&self.timezone);
        let after = self.points.partition_point(|p| p.timestamp <= at);
        match after {
            0 => self.points.first().map_or(0, |p| p.power_watts),
            n => self.points[n - 1].power_watts,
        }
    }

    /// Power for the next 24 hours in quarter hour steps, starting at `now`.
    pub fn power_production_next_24h(&self, now: DateTime<Utc>) -> Vec<i64> {
        (0..NEXT_24H_STEPS)
            .map(|i| self.power_production_at(&(now + DEFAULT_INTERVAL * i as i32)))
            .collect()
    }

    /// Energy of the hour buckets following the current hour, up to
    /// `period_hours` hours ahead.
    pub fn sum_energy_production(&self, now: DateTime<Utc>, period_hours: u32) -> i64 {
        let Ok(start) = hour_start(&now.with_timezone(&self.timezone)) else {
            return 0;
        };
        let until = start + TimeDelta::hours(i64::from(period_hours));
        self.wh_hours
            .range((Excluded(start), Included(until)))
            .map(|(_, wh)| wh)
            .sum()
    }
}

fn parse_timestamp(t: &str) -> Result<DateTime<Utc>, ForecastError> {
    if let Ok(timestamp) = DateTime::parse_from_rfc3339(t) {
        return Ok(timestamp.with_timezone(&Utc));
    }
    // timestamps without an offset are UTC
    NaiveDateTime::parse_from_str(t, "%Y-%m-%dT%H:%M:%S%.f")
        .map(|naive| naive.and_utc())
        .map_err(|e| ForecastError::Parse(format!("invalid timestamp '{t}': {e}")))
}

fn hour_start(timestamp: &DateTime<Tz>) -> Result<DateTime<Tz>, ForecastError> {
    timestamp
        .duration_trunc(TimeDelta::hours(1))
        .map_err(|e| ForecastError::Parse(format!("timestamp {timestamp} out of range: {e}")))
}
