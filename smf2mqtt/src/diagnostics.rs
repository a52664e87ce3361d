use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

use crate::coordinator::{Snapshot, UpdateStatus};
use crate::entry::ConfigEntry;
use crate::forecast::Estimate;

#[derive(Serialize)]
pub struct Diagnostics {
    entry: EntryDiagnostics,
    status: StatusDiagnostics,
    data: Option<EstimateDiagnostics>,
    account: Option<AccountDiagnostics>,
}

#[derive(Serialize)]
struct EntryDiagnostics {
    title: String,
    data: Value,
}

#[derive(Serialize)]
struct StatusDiagnostics {
    status: String,
    last_error: Option<String>,
    last_success: Option<DateTime<Utc>>,
    consecutive_failures: u32,
}

#[derive(Serialize)]
struct EstimateDiagnostics {
    power_production_now: i64,
    watts: BTreeMap<String, i64>,
    wh_period: BTreeMap<String, i64>,
    wh_hours: BTreeMap<String, i64>,
}

#[derive(Serialize)]
struct AccountDiagnostics {
    timezone: String,
}

impl Diagnostics {
    pub fn new(entry: &ConfigEntry, snapshot: &Snapshot) -> Self {
        let estimate = snapshot.estimate.as_deref();
        Self {
            entry: EntryDiagnostics {
                title: entry.title().to_string(),
                data: entry.redacted(),
            },
            status: StatusDiagnostics {
                status: status_name(snapshot.status).to_string(),
                last_error: snapshot.last_error.clone(),
                last_success: snapshot.last_success,
                consecutive_failures: snapshot.consecutive_failures,
            },
            data: estimate.map(|estimate| EstimateDiagnostics::new(estimate, snapshot.now)),
            account: estimate.map(|estimate| AccountDiagnostics {
                timezone: estimate.timezone().name().to_string(),
            }),
        }
    }
}

impl EstimateDiagnostics {
    fn new(estimate: &Estimate, now: DateTime<Utc>) -> Self {
        Self {
            power_production_now: estimate.power_production_at(&now),
            watts: estimate
                .watts()
                .map(|(t, w)| (t.to_rfc3339(), w))
                .collect(),
            wh_period: estimate
                .wh_period()
                .map(|(t, wh)| (t.to_rfc3339(), wh))
                .collect(),
            wh_hours: estimate
                .wh_hours()
                .iter()
                .map(|(t, wh)| (t.to_rfc3339(), *wh))
                .collect(),
        }
    }
}

fn status_name(status: UpdateStatus) -> &'static str {
    match status {
        UpdateStatus::Pending => "pending",
        UpdateStatus::Ok => "ok",
        UpdateStatus::Failed => "failed",
        UpdateStatus::ReauthRequired => "reauth_required",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordinator::ForecastStore;

    #[test]
    fn no_data_before_the_first_update() {
        let entry = ConfigEntry {
            smid: Some("SM-1".to_string()),
            password: Some("hunter2".to_string()),
            ..Default::default()
        };
        let snapshot = ForecastStore::default().snapshot(Utc::now());
        let json = serde_json::to_value(Diagnostics::new(&entry, &snapshot)).unwrap();

        assert_eq!(json["entry"]["title"], "Solar Manager Forecast");
        assert_eq!(json["status"]["status"], "pending");
        assert_eq!(json["data"], Value::Null);
        assert!(!json.to_string().contains("hunter2"));
        assert!(!json.to_string().contains("SM-1"));
    }
}
