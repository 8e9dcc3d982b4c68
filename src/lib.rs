//! # telewatch
//!
//! A headless watcher for spacecraft telemetry. It polls the latest packet,
//! raises each anomaly exactly once even though anomaly windows overlap,
//! fetches historical ranges on demand, and can serve a local read-only proxy
//! in front of the telemetry API.
//!
//! ## Architecture
//!
//! ```text
//! settings ──▶ dashboard ──▶ report ──▶ stdout
//!                  │
//!                  ▼
//!            telewatch-poller
//!              Scheduler ──▶ CurrentValuePoller
//!                        └─▶ AnomalyWindowPoller ──▶ AnomalyDeduplicator
//!              HistoricalRangeFetcher
//!                  │
//!                  ▼
//!            UpstreamClient ──▶ telemetry API ◀── telewatch-proxy ◀── browsers
//! ```
//!
//! - **[`settings`]**: Layered configuration (defaults, TOML, environment, flags)
//! - **[`dashboard`]**: Runs both pollers and prints what they publish
//! - **[`report`]**: Text and JSON rendering of packets, anomalies and history
//! - **[`data`]**: Duration and timestamp parsing helpers
//!
//! ## Usage
//!
//! ```bash
//! # Live values and anomaly alerts
//! telewatch watch --base-url http://localhost:8090
//!
//! # One historical range with per-field aggregates
//! telewatch history --start 2024-06-10T06:00:00Z --end 2024-06-10T07:00:00Z --json
//!
//! # Local proxy on 127.0.0.1:3000
//! telewatch proxy
//! ```

pub mod dashboard;
pub mod data;
pub mod report;
pub mod settings;

pub use dashboard::{Dashboard, WatchSummary};
pub use report::HistoryReport;
pub use settings::{Overrides, Settings};
