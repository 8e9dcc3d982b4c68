//! Sliding-window anomaly polling.
//!
//! Every tick queries the trailing window `[now - window, now)`. Because the
//! window is longer than the interval, consecutive windows overlap and an
//! event is normally returned by several polls. The [`AnomalyDeduplicator`]
//! makes sure each one is delivered downstream exactly once.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use telewatch_types::{decode_anomaly, AnomalyEvent, QueryRange};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use crate::clock::{Clock, SystemClock};
use crate::dedup::AnomalyDeduplicator;
use crate::error::{ConfigError, PollError};
use crate::scheduler::{CancelHandle, Scheduler};
use crate::source::{with_timeout, TelemetrySource};
use crate::upstream::DEFAULT_REQUEST_TIMEOUT;

/// Default anomaly poll interval.
pub const DEFAULT_ANOMALY_INTERVAL: Duration = Duration::from_millis(2_000);
/// Default trailing window width.
pub const DEFAULT_ANOMALY_WINDOW: Duration = Duration::from_millis(5_000);

/// Health of the anomaly feed after the last tick.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum PollStatus {
    /// No tick has completed yet.
    #[default]
    Pending,
    /// The last tick succeeded.
    Healthy {
        window: QueryRange,
        /// Events returned by the upstream for the window.
        received: usize,
        /// Events that had not been delivered before.
        novel: usize,
        /// Events dropped because they failed to decode.
        rejected: usize,
    },
    /// The last tick failed. The next tick retries.
    Failed(PollError),
}

/// Polls anomalies over a trailing window and forwards novel events.
#[derive(Debug)]
pub struct AnomalyWindowPoller {
    source: Arc<dyn TelemetrySource>,
    clock: Arc<dyn Clock>,
    interval: Duration,
    window: Duration,
    request_timeout: Duration,
    dedup: Mutex<AnomalyDeduplicator>,
    sink: mpsc::Sender<AnomalyEvent>,
    status: watch::Sender<PollStatus>,
}

impl AnomalyWindowPoller {
    /// Create a new builder for configuring the poller.
    pub fn builder(source: Arc<dyn TelemetrySource>) -> AnomalyWindowPollerBuilder {
        AnomalyWindowPollerBuilder {
            source,
            clock: Arc::new(SystemClock),
            interval: DEFAULT_ANOMALY_INTERVAL,
            window: DEFAULT_ANOMALY_WINDOW,
            retention: None,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Subscribe to health changes.
    pub fn subscribe(&self) -> watch::Receiver<PollStatus> {
        self.status.subscribe()
    }

    pub fn status(&self) -> PollStatus {
        self.status.borrow().clone()
    }

    /// Number of keys the deduplicator currently remembers.
    pub fn remembered(&self) -> usize {
        self.dedup.lock().len()
    }

    /// Run one tick and return the novel events it delivered.
    ///
    /// Undecodable events are dropped with a warning; the rest of the batch
    /// still goes through.
    pub async fn poll_once(&self) -> Result<Vec<AnomalyEvent>, PollError> {
        let window = QueryRange::trailing(self.clock.now(), self.window);

        let raw = match with_timeout(self.request_timeout, self.source.anomalies(window)).await {
            Ok(raw) => raw,
            Err(e) => {
                warn!(error = %e, %window, "Anomaly fetch failed");
                let err = PollError::from(e);
                self.status.send_replace(PollStatus::Failed(err.clone()));
                return Err(err);
            }
        };

        let received = raw.len();
        let mut rejected = 0usize;
        let batch: Vec<AnomalyEvent> = raw
            .iter()
            .filter_map(|item| match decode_anomaly(item) {
                Ok(event) => Some(event),
                Err(e) => {
                    rejected += 1;
                    warn!(error = %e, "Dropping undecodable anomaly");
                    None
                }
            })
            .collect();

        let novel = self.dedup.lock().ingest(batch);

        for event in &novel {
            info!(field = %event.field, value = event.value, timestamp = event.timestamp, "Anomaly detected");
            if self.sink.send(*event).await.is_err() {
                debug!("Anomaly receiver dropped");
                break;
            }
        }

        self.status.send_replace(PollStatus::Healthy {
            window,
            received,
            novel: novel.len(),
            rejected,
        });
        Ok(novel)
    }

    /// Start polling on `scheduler`.
    pub fn start(self: &Arc<Self>, scheduler: &Scheduler) -> Result<CancelHandle, ConfigError> {
        let poller = self.clone();
        scheduler.schedule("anomaly-window", self.interval, move || {
            let poller = poller.clone();
            async move {
                let _ = poller.poll_once().await;
            }
        })
    }
}

/// Builder for AnomalyWindowPoller.
#[derive(Debug)]
pub struct AnomalyWindowPollerBuilder {
    source: Arc<dyn TelemetrySource>,
    clock: Arc<dyn Clock>,
    interval: Duration,
    window: Duration,
    retention: Option<Duration>,
    request_timeout: Duration,
}

impl AnomalyWindowPollerBuilder {
    /// Set the poll interval. Defaults to 2 seconds.
    pub fn interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Set the trailing window width. Defaults to 5 seconds.
    pub fn window(mut self, window: Duration) -> Self {
        self.window = window;
        self
    }

    /// Set how long emitted keys are remembered. Defaults to twice the window.
    pub fn retention(mut self, retention: Duration) -> Self {
        self.retention = Some(retention);
        self
    }

    /// Set the per-request timeout. Defaults to 5 seconds.
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Set the clock used to place windows.
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Validate the configuration and build a poller sending to `sink`.
    pub fn build(self, sink: mpsc::Sender<AnomalyEvent>) -> Result<AnomalyWindowPoller, ConfigError> {
        if self.interval.is_zero() {
            return Err(ConfigError::ZeroDuration("anomaly interval"));
        }
        if self.request_timeout.is_zero() {
            return Err(ConfigError::ZeroDuration("request timeout"));
        }
        if self.window <= self.interval {
            return Err(ConfigError::WindowNotOverlapping {
                window: self.window,
                interval: self.interval,
            });
        }

        let required = self.window * 2;
        let retention = self.retention.unwrap_or(required);
        if retention < required {
            return Err(ConfigError::RetentionTooShort {
                retention,
                required,
            });
        }

        Ok(AnomalyWindowPoller {
            source: self.source,
            clock: self.clock,
            interval: self.interval,
            window: self.window,
            request_timeout: self.request_timeout,
            dedup: Mutex::new(AnomalyDeduplicator::new(retention)),
            sink,
            status: watch::channel(PollStatus::Pending).0,
        })
    }
}
