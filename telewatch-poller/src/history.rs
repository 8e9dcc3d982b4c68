//! On-demand historical range fetching with stale-response gating.
//!
//! Every call to [`HistoricalRangeFetcher::fetch`] is tagged with a sequence
//! number at call time. When a response arrives it is applied only if its
//! sequence number is still the latest issued; otherwise a newer request has
//! superseded it and the response is discarded. The check and the publish
//! happen under one lock, so a stale response can never overwrite a newer one
//! regardless of the order in which they complete.
//!
//! A fetch future dropped before it completes (a caller-side timeout, say)
//! publishes [`RangeState::Cancelled`] if it was still the latest request.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use telewatch_types::{decode_packet, QueryRange, TelemetryPacket};
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::error::{ConfigError, FetchError};
use crate::source::{with_timeout, TelemetrySource};
use crate::upstream::DEFAULT_REQUEST_TIMEOUT;

/// Published state of the historical view.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum RangeState {
    /// Nothing requested yet, or cleared.
    #[default]
    Idle,
    /// Request `seq` is in flight.
    Fetching { seq: u64, range: QueryRange },
    /// Request `seq` completed.
    Ready {
        seq: u64,
        range: QueryRange,
        packets: Vec<TelemetryPacket>,
    },
    /// Request `seq` failed.
    Failed { seq: u64, error: FetchError },
    /// Request `seq` was dropped by its caller before it completed.
    Cancelled { seq: u64, range: QueryRange },
}

impl RangeState {
    /// The sequence number this state belongs to, if any.
    pub fn seq(&self) -> Option<u64> {
        match self {
            RangeState::Idle => None,
            RangeState::Fetching { seq, .. }
            | RangeState::Ready { seq, .. }
            | RangeState::Failed { seq, .. }
            | RangeState::Cancelled { seq, .. } => Some(*seq),
        }
    }
}

/// Result of a completed fetch.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome {
    /// The response was the latest and has been published.
    Applied(Vec<TelemetryPacket>),
    /// A newer request was issued first; the response was discarded.
    Superseded,
}

impl FetchOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, FetchOutcome::Applied(_))
    }
}

/// Fetches packet ranges on demand, applying only the latest response.
#[derive(Debug)]
pub struct HistoricalRangeFetcher {
    source: Arc<dyn TelemetrySource>,
    request_timeout: Duration,
    latest: Mutex<u64>,
    state: watch::Sender<RangeState>,
}

impl HistoricalRangeFetcher {
    pub fn new(source: Arc<dyn TelemetrySource>) -> Self {
        Self {
            source,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            latest: Mutex::new(0),
            state: watch::channel(RangeState::Idle).0,
        }
    }

    /// Set the per-request timeout. Must be non-zero.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Result<Self, ConfigError> {
        if timeout.is_zero() {
            return Err(ConfigError::ZeroDuration("request timeout"));
        }
        self.request_timeout = timeout;
        Ok(self)
    }

    /// Subscribe to state changes.
    pub fn subscribe(&self) -> watch::Receiver<RangeState> {
        self.state.subscribe()
    }

    pub fn state(&self) -> RangeState {
        self.state.borrow().clone()
    }

    /// The most recently issued sequence number (0 before the first fetch).
    pub fn current_seq(&self) -> u64 {
        *self.latest.lock()
    }

    /// Fetch `range`.
    ///
    /// The sequence number is issued when this is called, not when the
    /// returned future is first polled, so call order decides which request
    /// is the latest. An invalid range fails immediately without contacting
    /// the upstream, but still supersedes any request in flight.
    ///
    /// Dropping the returned future early, polled or not, publishes
    /// [`RangeState::Cancelled`] unless a newer request has been issued.
    pub fn fetch(
        &self,
        range: QueryRange,
    ) -> impl Future<Output = Result<FetchOutcome, FetchError>> + Send + '_ {
        let in_flight = self.issue(range).map(|seq| InFlight {
            fetcher: self,
            seq,
            range,
            done: false,
        });

        async move {
            let mut in_flight = in_flight?;
            let result = with_timeout(self.request_timeout, self.source.packets(range)).await;
            in_flight.done = true;
            self.complete(in_flight.seq, range, result)
        }
    }

    /// Drop whatever is shown and invalidate any request in flight.
    pub fn clear(&self) {
        let mut latest = self.latest.lock();
        *latest += 1;
        self.state.send_replace(RangeState::Idle);
    }

    fn issue(&self, range: QueryRange) -> Result<u64, FetchError> {
        let mut latest = self.latest.lock();
        *latest += 1;
        let seq = *latest;

        if !range.is_valid() {
            let error = FetchError::InvalidRange(range);
            debug!(seq, %range, "Rejecting invalid range");
            self.state.send_replace(RangeState::Failed {
                seq,
                error: error.clone(),
            });
            return Err(error);
        }

        self.state.send_replace(RangeState::Fetching { seq, range });
        Ok(seq)
    }

    fn abandon(&self, seq: u64, range: QueryRange) {
        let latest = self.latest.lock();
        if *latest == seq {
            debug!(seq, %range, "Range fetch cancelled");
            self.state.send_replace(RangeState::Cancelled { seq, range });
        }
    }

    fn complete(
        &self,
        seq: u64,
        range: QueryRange,
        result: Result<Vec<serde_json::Value>, FetchError>,
    ) -> Result<FetchOutcome, FetchError> {
        // Decode before taking the lock.
        let result = result.map(|raw| {
            raw.iter()
                .filter_map(|item| match decode_packet(item) {
                    Ok(packet) => Some(packet),
                    Err(e) => {
                        warn!(seq, error = %e, "Dropping undecodable packet");
                        None
                    }
                })
                .collect::<Vec<_>>()
        });

        let latest = self.latest.lock();
        if *latest != seq {
            debug!(seq, latest = *latest, "Discarding superseded range response");
            return Ok(FetchOutcome::Superseded);
        }

        match result {
            Ok(packets) => {
                debug!(seq, %range, packets = packets.len(), "Range fetched");
                self.state.send_replace(RangeState::Ready {
                    seq,
                    range,
                    packets: packets.clone(),
                });
                Ok(FetchOutcome::Applied(packets))
            }
            Err(error) => {
                warn!(seq, %range, error = %error, "Range fetch failed");
                self.state.send_replace(RangeState::Failed {
                    seq,
                    error: error.clone(),
                });
                Err(error)
            }
        }
    }
}

/// Marks a fetch as cancelled if it is dropped before its response arrives.
struct InFlight<'a> {
    fetcher: &'a HistoricalRangeFetcher,
    seq: u64,
    range: QueryRange,
    done: bool,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if !self.done {
            self.fetcher.abandon(self.seq, self.range);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::{DateTime, TimeZone, Utc};
    use serde_json::{json, Value};
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::oneshot;

    /// Answers each range only once the test releases it.
    #[derive(Debug, Default)]
    struct Gated {
        gates: parking_lot::Mutex<HashMap<QueryRange, oneshot::Receiver<Result<Vec<Value>, FetchError>>>>,
        calls: AtomicUsize,
    }

    impl Gated {
        fn gate(&self, range: QueryRange) -> oneshot::Sender<Result<Vec<Value>, FetchError>> {
            let (tx, rx) = oneshot::channel();
            self.gates.lock().insert(range, rx);
            tx
        }
    }

    #[async_trait]
    impl TelemetrySource for Gated {
        async fn latest(&self) -> Result<Option<Value>, FetchError> {
            Ok(None)
        }

        async fn packets(&self, range: QueryRange) -> Result<Vec<Value>, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let gate = self.gates.lock().remove(&range);
            match gate {
                Some(rx) => rx.await.unwrap_or(Err(FetchError::Connection("gate dropped".into()))),
                None => Ok(Vec::new()),
            }
        }

        async fn anomalies(&self, _range: QueryRange) -> Result<Vec<Value>, FetchError> {
            Ok(Vec::new())
        }
    }

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    fn raw_packet(timestamp: u64) -> Value {
        json!({
            "ccsdsPrimaryHeader": { "packetId": 1, "packetSeqCtrl": 2, "packetLength": 3 },
            "ccsdsSecondaryHeader": { "timestamp": timestamp, "subsystemId": 4 },
            "telemetryPayload": { "temperature": 20.0, "battery": 80.0, "altitude": 500.0, "signal": -60.0 }
        })
    }

    #[tokio::test]
    async fn late_response_for_old_range_is_discarded() {
        let source = Arc::new(Gated::default());
        let fetcher = HistoricalRangeFetcher::new(source.clone());
        let range_a = QueryRange::new(at(0), at(100));
        let range_b = QueryRange::new(at(100), at(200));
        let release_a = source.gate(range_a);
        let release_b = source.gate(range_b);

        let fetch_a = fetcher.fetch(range_a);
        let fetch_b = fetcher.fetch(range_b);
        assert_eq!(fetcher.current_seq(), 2);

        // B resolves first, A afterwards.
        release_b.send(Ok(vec![raw_packet(150)])).unwrap();
        let (out_a, out_b) = tokio::join!(fetch_a, async {
            let out = fetch_b.await;
            release_a.send(Ok(vec![raw_packet(50)])).unwrap();
            out
        });

        assert_eq!(out_a, Ok(FetchOutcome::Superseded));
        let FetchOutcome::Applied(packets) = out_b.unwrap() else {
            panic!("latest fetch was not applied");
        };
        assert_eq!(packets[0].timestamp(), 150.0);

        match fetcher.state() {
            RangeState::Ready { seq, range, packets } => {
                assert_eq!(seq, 2);
                assert_eq!(range, range_b);
                assert_eq!(packets[0].timestamp(), 150.0);
            }
            other => panic!("unexpected state {other:?}"),
        }
    }

    #[tokio::test]
    async fn stale_error_does_not_overwrite_newer_result() {
        let source = Arc::new(Gated::default());
        let fetcher = HistoricalRangeFetcher::new(source.clone());
        let range_a = QueryRange::new(at(0), at(10));
        let range_b = QueryRange::new(at(10), at(20));
        let release_a = source.gate(range_a);

        let fetch_a = fetcher.fetch(range_a);
        let out_b = fetcher.fetch(range_b).await;
        assert!(out_b.unwrap().is_applied());

        release_a.send(Err(FetchError::Timeout)).unwrap();
        assert_eq!(fetch_a.await, Ok(FetchOutcome::Superseded));
        assert!(matches!(fetcher.state(), RangeState::Ready { seq: 2, .. }));
    }

    #[tokio::test]
    async fn invalid_range_fails_without_a_request() {
        let source = Arc::new(Gated::default());
        let fetcher = HistoricalRangeFetcher::new(source.clone());

        let inverted = QueryRange::new(at(20), at(10));
        let err = fetcher.fetch(inverted).await.unwrap_err();
        assert_eq!(err, FetchError::InvalidRange(inverted));

        let empty = QueryRange::new(at(10), at(10));
        assert!(fetcher.fetch(empty).await.is_err());

        assert_eq!(source.calls.load(Ordering::SeqCst), 0);
        assert_eq!(
            fetcher.state(),
            RangeState::Failed {
                seq: 2,
                error: FetchError::InvalidRange(empty)
            }
        );
    }

    #[tokio::test]
    async fn invalid_range_supersedes_in_flight_request() {
        let source = Arc::new(Gated::default());
        let fetcher = HistoricalRangeFetcher::new(source.clone());
        let valid = QueryRange::new(at(0), at(10));
        let release = source.gate(valid);

        let pending = fetcher.fetch(valid);
        assert!(fetcher.fetch(QueryRange::new(at(5), at(1))).await.is_err());

        release.send(Ok(vec![raw_packet(3)])).unwrap();
        assert_eq!(pending.await, Ok(FetchOutcome::Superseded));
        assert!(matches!(fetcher.state(), RangeState::Failed { seq: 2, .. }));
    }

    #[tokio::test]
    async fn latest_failure_is_published() {
        let source = Arc::new(Gated::default());
        let fetcher = HistoricalRangeFetcher::new(source.clone());
        let range = QueryRange::new(at(0), at(10));
        let release = source.gate(range);
        let mut rx = fetcher.subscribe();

        let pending = fetcher.fetch(range);
        assert_eq!(*rx.borrow_and_update(), RangeState::Fetching { seq: 1, range });

        release
            .send(Err(FetchError::Status { status: 500, body: "boom".into() }))
            .unwrap();
        assert!(pending.await.is_err());
        assert!(matches!(
            fetcher.state(),
            RangeState::Failed { seq: 1, error: FetchError::Status { status: 500, .. } }
        ));
    }

    #[tokio::test]
    async fn undecodable_packets_are_skipped() {
        let source = Arc::new(Gated::default());
        let fetcher = HistoricalRangeFetcher::new(source.clone());
        let range = QueryRange::new(at(0), at(10));
        let release = source.gate(range);

        let pending = fetcher.fetch(range);
        release
            .send(Ok(vec![raw_packet(1), json!({ "nope": true }), raw_packet(2)]))
            .unwrap();
        let FetchOutcome::Applied(packets) = pending.await.unwrap() else {
            panic!("fetch was not applied");
        };
        assert_eq!(packets.len(), 2);
    }

    #[tokio::test]
    async fn clear_invalidates_in_flight_request() {
        let source = Arc::new(Gated::default());
        let fetcher = HistoricalRangeFetcher::new(source.clone());
        let range = QueryRange::new(at(0), at(10));
        let release = source.gate(range);

        let pending = fetcher.fetch(range);
        fetcher.clear();
        release.send(Ok(vec![raw_packet(1)])).unwrap();

        assert_eq!(pending.await, Ok(FetchOutcome::Superseded));
        assert_eq!(fetcher.state(), RangeState::Idle);
        assert_eq!(fetcher.state().seq(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn timed_out_caller_leaves_cancelled_state() {
        let source = Arc::new(Gated::default());
        let fetcher = HistoricalRangeFetcher::new(source.clone())
            .with_request_timeout(Duration::from_secs(60))
            .unwrap();
        let range = QueryRange::new(at(0), at(10));
        let _release = source.gate(range);

        let out = tokio::time::timeout(Duration::from_millis(100), fetcher.fetch(range)).await;
        assert!(out.is_err());
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
        assert_eq!(fetcher.state(), RangeState::Cancelled { seq: 1, range });
        assert_eq!(fetcher.state().seq(), Some(1));
    }

    #[tokio::test]
    async fn dropping_an_unpolled_fetch_cancels_it() {
        let source = Arc::new(Gated::default());
        let fetcher = HistoricalRangeFetcher::new(source.clone());
        let range = QueryRange::new(at(0), at(10));

        drop(fetcher.fetch(range));
        assert_eq!(source.calls.load(Ordering::SeqCst), 0);
        assert_eq!(fetcher.state(), RangeState::Cancelled { seq: 1, range });
    }

    #[tokio::test]
    async fn dropping_a_superseded_fetch_keeps_the_newer_state() {
        let source = Arc::new(Gated::default());
        let fetcher = HistoricalRangeFetcher::new(source.clone());
        let range_a = QueryRange::new(at(0), at(10));
        let range_b = QueryRange::new(at(10), at(20));

        let fetch_a = fetcher.fetch(range_a);
        let _fetch_b = fetcher.fetch(range_b);
        drop(fetch_a);

        assert_eq!(
            fetcher.state(),
            RangeState::Fetching {
                seq: 2,
                range: range_b
            }
        );
    }

    #[tokio::test]
    async fn completed_fetch_is_not_cancelled_on_drop() {
        let source = Arc::new(Gated::default());
        let fetcher = HistoricalRangeFetcher::new(source.clone());
        let range = QueryRange::new(at(0), at(10));

        assert!(fetcher.fetch(range).await.unwrap().is_applied());
        assert!(matches!(fetcher.state(), RangeState::Ready { seq: 1, .. }));
    }
}
