use std::collections::BTreeMap;

use serde::Serialize;

use crate::forecast::Estimate;

/// Forecast in the shape the Home Assistant energy dashboard draws its
/// dotted solar line from.
#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct SolarForecast {
    /// Energy per hour, keyed by the ISO 8601 start of the hour.
    pub wh_hours: BTreeMap<String, i64>,
    /// Energy per forecast bucket (15 minutes).
    pub wh_period: BTreeMap<String, i64>,
}

/// `None` until there is a forecast with at least one hour bucket.
///
/// This keeps serving the last good estimate after failed updates.
pub fn solar_forecast(estimate: Option<&Estimate>) -> Option<SolarForecast> {
    let estimate = estimate?;
    if estimate.wh_hours().is_empty() {
        return None;
    }
    Some(SolarForecast {
        wh_hours: estimate
            .wh_hours()
            .iter()
            .map(|(hour, wh)| (hour.to_rfc3339(), *wh))
            .collect(),
        wh_period: estimate
            .wh_period()
            .map(|(start, wh)| (start.to_rfc3339(), wh))
            .collect(),
    })
}
