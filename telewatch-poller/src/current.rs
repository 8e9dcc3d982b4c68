//! Polling of the most recent packet.

use std::sync::Arc;
use std::time::Duration;

use telewatch_types::{decode_packet, TelemetryPacket};
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::error::{ConfigError, FetchError, PollError};
use crate::scheduler::{CancelHandle, Scheduler};
use crate::source::{with_timeout, TelemetrySource};
use crate::upstream::DEFAULT_REQUEST_TIMEOUT;

/// Default current-value poll interval.
pub const DEFAULT_CURRENT_INTERVAL: Duration = Duration::from_millis(1_000);

/// What the current-value poller last observed.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum CurrentState {
    /// No tick has completed yet.
    #[default]
    Pending,
    /// The latest packet.
    Ready(TelemetryPacket),
    /// The upstream has no packet yet.
    Empty,
    /// The last tick failed. The next tick retries.
    Failed(PollError),
}

impl CurrentState {
    pub fn packet(&self) -> Option<&TelemetryPacket> {
        match self {
            CurrentState::Ready(packet) => Some(packet),
            _ => None,
        }
    }
}

/// Polls the latest packet and publishes it on a watch channel.
#[derive(Debug)]
pub struct CurrentValuePoller {
    source: Arc<dyn TelemetrySource>,
    interval: Duration,
    request_timeout: Duration,
    state: watch::Sender<CurrentState>,
}

impl CurrentValuePoller {
    /// Create a poller with the default interval and timeout.
    pub fn new(source: Arc<dyn TelemetrySource>) -> Self {
        Self {
            source,
            interval: DEFAULT_CURRENT_INTERVAL,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            state: watch::channel(CurrentState::Pending).0,
        }
    }

    /// Set the poll interval. Must be non-zero.
    pub fn with_interval(mut self, interval: Duration) -> Result<Self, ConfigError> {
        if interval.is_zero() {
            return Err(ConfigError::ZeroDuration("current interval"));
        }
        self.interval = interval;
        Ok(self)
    }

    /// Set the per-request timeout. Must be non-zero.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Result<Self, ConfigError> {
        if timeout.is_zero() {
            return Err(ConfigError::ZeroDuration("request timeout"));
        }
        self.request_timeout = timeout;
        Ok(self)
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Subscribe to state changes.
    pub fn subscribe(&self) -> watch::Receiver<CurrentState> {
        self.state.subscribe()
    }

    /// The most recently published state.
    pub fn state(&self) -> CurrentState {
        self.state.borrow().clone()
    }

    /// Run one tick: fetch, decode, publish.
    pub async fn poll_once(&self) -> CurrentState {
        let next = match with_timeout(self.request_timeout, self.source.latest()).await {
            Ok(None) => CurrentState::Empty,
            Ok(Some(raw)) => match decode_packet(&raw) {
                Ok(packet) => CurrentState::Ready(packet),
                Err(e) => {
                    warn!(error = %e, "Dropping undecodable current packet");
                    CurrentState::Failed(e.into())
                }
            },
            Err(e) => {
                log_fetch_failure(&e);
                CurrentState::Failed(e.into())
            }
        };

        self.state.send_replace(next.clone());
        next
    }

    /// Start polling on `scheduler`.
    pub fn start(self: &Arc<Self>, scheduler: &Scheduler) -> Result<CancelHandle, ConfigError> {
        let poller = self.clone();
        scheduler.schedule("current-value", self.interval, move || {
            let poller = poller.clone();
            async move {
                poller.poll_once().await;
            }
        })
    }
}

fn log_fetch_failure(err: &FetchError) {
    match err {
        FetchError::Timeout | FetchError::Connection(_) => {
            debug!(error = %err, "Current value fetch failed")
        }
        _ => warn!(error = %err, "Current value fetch failed"),
    }
}
