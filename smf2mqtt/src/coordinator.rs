use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::thread;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use log::{debug, error, info, warn};

use crate::error::ForecastError;
use crate::forecast::Estimate;

const WAIT_SLICE: Duration = Duration::from_secs(1);

/// Anything able to produce a fresh forecast estimate.
pub trait ForecastSource {
    fn estimate(&self) -> Result<Estimate, ForecastError>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UpdateStatus {
    /// No update has completed yet.
    Pending,
    Ok,
    Failed,
    /// The last update was rejected because of the credentials.
    ReauthRequired,
}

#[derive(Clone, Debug)]
struct StoreState {
    estimate: Option<Arc<Estimate>>,
    status: UpdateStatus,
    last_error: Option<String>,
    last_success: Option<DateTime<Utc>>,
    consecutive_failures: u32,
    generation: u64,
}

/// Point-in-time view of the store handed to publishers.
#[derive(Clone, Debug)]
pub struct Snapshot {
    pub estimate: Option<Arc<Estimate>>,
    pub status: UpdateStatus,
    pub last_error: Option<String>,
    pub last_success: Option<DateTime<Utc>>,
    pub consecutive_failures: u32,
    /// Bumped every time a new estimate replaces the current one.
    pub generation: u64,
    pub now: DateTime<Utc>,
}

impl Snapshot {
    /// Entities only report values while the last update succeeded.
    pub fn is_available(&self) -> bool {
        self.status == UpdateStatus::Ok && self.estimate.is_some()
    }
}

/// Holds the current estimate. Cloning the store shares it; the estimate
/// itself is only ever replaced, never modified.
#[derive(Clone, Debug)]
pub struct ForecastStore {
    inner: Arc<RwLock<StoreState>>,
}

impl Default for ForecastStore {
    fn default() -> Self {
        Self {
            inner: Arc::new(RwLock::new(StoreState {
                estimate: None,
                status: UpdateStatus::Pending,
                last_error: None,
                last_success: None,
                consecutive_failures: 0,
                generation: 0,
            })),
        }
    }
}

impl ForecastStore {
    pub fn current(&self) -> Option<Arc<Estimate>> {
        self.read().estimate.clone()
    }

    pub fn status(&self) -> UpdateStatus {
        self.read().status
    }

    pub fn snapshot(&self, now: DateTime<Utc>) -> Snapshot {
        let state = self.read();
        Snapshot {
            estimate: state.estimate.clone(),
            status: state.status,
            last_error: state.last_error.clone(),
            last_success: state.last_success,
            consecutive_failures: state.consecutive_failures,
            generation: state.generation,
            now,
        }
    }

    fn replace(&self, estimate: Estimate, at: DateTime<Utc>) -> Arc<Estimate> {
        let estimate = Arc::new(estimate);
        let mut state = self.write();
        if state.status == UpdateStatus::Failed || state.status == UpdateStatus::ReauthRequired {
            info!("Fetching Solar Manager forecast recovered");
        }
        state.estimate = Some(Arc::clone(&estimate));
        state.status = UpdateStatus::Ok;
        state.last_error = None;
        state.last_success = Some(at);
        state.consecutive_failures = 0;
        state.generation += 1;
        estimate
    }

    fn record_failure(&self, err: &ForecastError) {
        let status = if err.requires_reauth() {
            UpdateStatus::ReauthRequired
        } else {
            UpdateStatus::Failed
        };
        let mut state = self.write();
        if state.status == status {
            debug!("Forecast update failed again: {err}");
        } else if status == UpdateStatus::ReauthRequired {
            error!(
                "Solar Manager rejected the credentials, please update username and password: {err}"
            );
        } else {
            error!("Error communicating with Solar Manager forecast API: {err}");
        }
        state.status = status;
        state.last_error = Some(err.to_string());
        state.consecutive_failures = state.consecutive_failures.saturating_add(1);
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, StoreState> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, StoreState> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Periodically refreshes the forecast and is the only writer of its store.
pub struct Coordinator<S: ForecastSource> {
    source: S,
    store: ForecastStore,
    update_interval: Duration,
}

impl<S: ForecastSource> Coordinator<S> {
    pub fn new(source: S, update_interval: Duration) -> Self {
        Self {
            source,
            store: ForecastStore::default(),
            update_interval,
        }
    }

    /// A read handle on the estimates produced by this coordinator.
    pub fn store(&self) -> ForecastStore {
        self.store.clone()
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn update_interval(&self) -> Duration {
        self.update_interval
    }

    /// Fetch once. On failure the previous estimate stays current.
    pub fn refresh(&self) -> Result<Arc<Estimate>, ForecastError> {
        match self.source.estimate() {
            Ok(estimate) => {
                if estimate.is_empty() {
                    warn!("Solar Manager returned an empty forecast");
                }
                let estimate = self.store.replace(estimate, Utc::now());
                debug!(
                    "Forecast updated with {} points",
                    estimate.points().len()
                );
                Ok(estimate)
            }
            Err(err) => {
                self.store.record_failure(&err);
                Err(err)
            }
        }
    }

    /// Refresh every update interval until `shutdown` is set. The first
    /// refresh happens one interval after the call.
    pub fn run(&self, shutdown: &AtomicBool) {
        loop {
            if !sleep_until(Instant::now() + self.update_interval, shutdown) {
                break;
            }
            // failures are recorded in the store
            let _ = self.refresh();
        }
        debug!("Forecast coordinator stopped");
    }
}

/// Sleep until `deadline`, waking up regularly to check `shutdown`.
/// Returns `false` when interrupted by a shutdown request.
pub fn sleep_until(deadline: Instant, shutdown: &AtomicBool) -> bool {
    loop {
        if shutdown.load(Ordering::Relaxed) {
            return false;
        }
        let now = Instant::now();
        if now >= deadline {
            return true;
        }
        thread::sleep(WAIT_SLICE.min(deadline - now));
    }
}
