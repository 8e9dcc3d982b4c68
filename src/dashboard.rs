//! The headless dashboard behind `telewatch watch`.
//!
//! Owns both pollers and the scheduler they run on, and writes each published
//! update as a line of text until told to stop.

use std::future::Future;
use std::io::Write;
use std::sync::Arc;

use anyhow::Result;
use telewatch_poller::{
    AnomalyEvent, AnomalyWindowPoller, ConfigError, CurrentValuePoller, Scheduler, TelemetrySource,
};
use tokio::sync::mpsc;
use tracing::info;

use crate::data::format_duration;
use crate::report::{render_anomaly, render_anomaly_status, render_current};
use crate::settings::Settings;

/// Capacity of the novel-anomaly channel.
const EVENT_BUFFER: usize = 256;

/// Counts of what a watch session printed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WatchSummary {
    pub current_updates: u64,
    pub anomalies: u64,
    pub feed_errors: u64,
}

/// Both pollers plus the scheduler that drives them.
#[derive(Debug)]
pub struct Dashboard {
    scheduler: Scheduler,
    current: Arc<CurrentValuePoller>,
    anomalies: Arc<AnomalyWindowPoller>,
    events: mpsc::Receiver<AnomalyEvent>,
}

impl Dashboard {
    /// Build the pollers from `settings`. Nothing runs until [`Dashboard::run`].
    pub fn new(settings: &Settings, source: Arc<dyn TelemetrySource>) -> Result<Self, ConfigError> {
        let (tx, events) = mpsc::channel(EVENT_BUFFER);
        let current = Arc::new(settings.current_poller(source.clone())?);
        let anomalies = Arc::new(settings.anomaly_poller(source, tx)?);

        Ok(Self {
            scheduler: Scheduler::new(),
            current,
            anomalies,
            events,
        })
    }

    /// Start both pollers and write updates to `out` until `shutdown`
    /// resolves. Every scheduled task is cancelled before this returns.
    pub async fn run<W: Write>(
        mut self,
        out: &mut W,
        shutdown: impl Future<Output = ()>,
    ) -> Result<WatchSummary> {
        self.current.start(&self.scheduler)?;
        self.anomalies.start(&self.scheduler)?;
        info!(
            current_interval = %format_duration(self.current.interval()),
            anomaly_interval = %format_duration(self.anomalies.interval()),
            anomaly_window = %format_duration(self.anomalies.window()),
            "Watching telemetry"
        );

        let mut current_rx = self.current.subscribe();
        let mut status_rx = self.anomalies.subscribe();
        let mut summary = WatchSummary::default();
        tokio::pin!(shutdown);

        let result: Result<()> = async {
            loop {
                tokio::select! {
                    _ = &mut shutdown => break,
                    Some(event) = self.events.recv() => {
                        writeln!(out, "{}", render_anomaly(&event))?;
                        summary.anomalies += 1;
                    }
                    Ok(()) = current_rx.changed() => {
                        let state = current_rx.borrow_and_update().clone();
                        if let Some(line) = render_current(&state) {
                            writeln!(out, "{line}")?;
                            summary.current_updates += 1;
                        }
                    }
                    Ok(()) = status_rx.changed() => {
                        let status = status_rx.borrow_and_update().clone();
                        if let Some(line) = render_anomaly_status(&status) {
                            writeln!(out, "{line}")?;
                            summary.feed_errors += 1;
                        }
                    }
                }
            }
            Ok(())
        }
        .await;

        self.shutdown();
        result.map(|()| summary)
    }

    /// Cancel every scheduled task. Idempotent.
    pub fn shutdown(&self) {
        self.scheduler.shutdown();
    }
}
