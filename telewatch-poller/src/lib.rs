//! # telewatch-poller
//!
//! The timing core of telewatch: fixed-interval polling that never overlaps
//! itself, anomaly polling over overlapping windows with exactly-once
//! delivery, and on-demand range fetching that ignores stale responses.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use telewatch_poller::{AnomalyWindowPoller, CurrentValuePoller, Scheduler, UpstreamClient};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let source = Arc::new(UpstreamClient::builder().base_url("http://localhost:8090").build()?);
//!     let scheduler = Scheduler::new();
//!
//!     let current = Arc::new(CurrentValuePoller::new(source.clone()));
//!     current.start(&scheduler)?;
//!
//!     let (tx, mut anomalies) = tokio::sync::mpsc::channel(64);
//!     let poller = Arc::new(AnomalyWindowPoller::builder(source).build(tx)?);
//!     poller.start(&scheduler)?;
//!
//!     while let Some(event) = anomalies.recv().await {
//!         println!("{event}");
//!     }
//!
//!     scheduler.shutdown();
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - **Skip-if-busy scheduling**: a tick that finds the previous run in flight is dropped
//! - **Exactly-once anomalies**: overlapping windows are deduplicated by field and timestamp
//! - **Stale-response gating**: only the latest historical request may publish
//! - **Pluggable upstream**: pollers talk to a [`TelemetrySource`], not to HTTP directly

mod anomaly;
mod clock;
mod current;
mod dedup;
mod error;
mod history;
mod scheduler;
mod source;
mod upstream;

pub use anomaly::{
    AnomalyWindowPoller, AnomalyWindowPollerBuilder, PollStatus, DEFAULT_ANOMALY_INTERVAL,
    DEFAULT_ANOMALY_WINDOW,
};
pub use clock::{Clock, ManualClock, SystemClock};
pub use current::{CurrentState, CurrentValuePoller, DEFAULT_CURRENT_INTERVAL};
pub use dedup::AnomalyDeduplicator;
pub use error::{ConfigError, FetchError, PollError};
pub use history::{FetchOutcome, HistoricalRangeFetcher, RangeState};
pub use scheduler::{schedule, CancelHandle, ScheduleStats, Scheduler};
pub use source::TelemetrySource;
pub use upstream::{PathStyle, UpstreamClient, UpstreamClientBuilder, DEFAULT_REQUEST_TIMEOUT};

// Re-export types for convenience
pub use telewatch_types::{AnomalyEvent, AnomalyField, DedupKey, QueryRange, TelemetryPacket};
