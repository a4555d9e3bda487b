use crate::derived::enrich;
use crate::error::Result;
use crate::meter::MeterSource;
use crate::models::DerivedPoint;
use crate::repositories::MeasurementStore;
use crate::ws::Broadcaster;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CollectorState {
    Idle,
    Fetching,
    Sleeping,
}

#[derive(Debug, Clone, Serialize)]
pub struct CollectorStatus {
    pub state: CollectorState,
    pub cycles: u64,
    pub consecutive_failures: u32,
    pub last_success_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

impl Default for CollectorStatus {
    fn default() -> Self {
        Self {
            state: CollectorState::Idle,
            cycles: 0,
            consecutive_failures: 0,
            last_success_at: None,
            last_error: None,
        }
    }
}

/// Polls the meter on a fixed interval, stores each reading and pushes it
/// to live viewers. A failed cycle is logged and leaves a gap; it never
/// stops the loop.
pub struct Collector {
    meter: Arc<dyn MeterSource>,
    store: Arc<dyn MeasurementStore>,
    broadcaster: Broadcaster,
    interval: Duration,
    status: watch::Sender<CollectorStatus>,
}

impl Collector {
    pub fn new(
        meter: Arc<dyn MeterSource>,
        store: Arc<dyn MeasurementStore>,
        broadcaster: Broadcaster,
        interval: Duration,
    ) -> Self {
        let (status, _) = watch::channel(CollectorStatus::default());
        Self {
            meter,
            store,
            broadcaster,
            interval,
            status,
        }
    }

    pub fn status(&self) -> watch::Receiver<CollectorStatus> {
        self.status.subscribe()
    }

    /// One Fetching step. On success the reading has been stored and
    /// published; on failure nothing was published.
    pub async fn run_cycle(&self) -> Result<DerivedPoint> {
        self.set_state(CollectorState::Fetching);

        let outcome = self.fetch_and_store().await;

        self.status.send_modify(|s| {
            s.cycles += 1;
            match &outcome {
                Ok(point) => {
                    s.consecutive_failures = 0;
                    s.last_success_at = Some(point.measurement.measured_at);
                    s.last_error = None;
                }
                Err(e) => {
                    s.consecutive_failures += 1;
                    s.last_error = Some(e.to_string());
                }
            }
        });

        let point = outcome?;
        let delivered = self.broadcaster.publish(Arc::new(point.clone()));
        debug!(
            measured_at = %point.measurement.measured_at,
            subscribers = delivered,
            "collector cycle complete"
        );
        Ok(point)
    }

    async fn fetch_and_store(&self) -> Result<DerivedPoint> {
        let raw = self.meter.fetch().await?;
        let measurement = raw.into_measurement(now_millis());
        self.store.insert(&measurement).await?;
        Ok(enrich(measurement))
    }

    /// Run until the task is dropped. Cycles are sequential, so at most one
    /// fetch is ever in flight.
    pub async fn run(self) {
        info!(interval = ?self.interval, "collector started");
        loop {
            if let Err(e) = self.run_cycle().await {
                let failures = self.status.borrow().consecutive_failures;
                warn!(error = %e, consecutive_failures = failures, "collector cycle failed");
            }
            self.set_state(CollectorState::Sleeping);
            tokio::time::sleep(self.interval).await;
        }
    }

    fn set_state(&self, state: CollectorState) {
        self.status.send_modify(|s| s.state = state);
    }
}

/// Stored timestamps have millisecond resolution; stamp readings to match.
fn now_millis() -> DateTime<Utc> {
    let now = Utc::now();
    DateTime::from_timestamp_millis(now.timestamp_millis()).unwrap_or(now)
}
