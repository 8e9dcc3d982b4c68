//! Deduplication of anomaly events across overlapping windows.
//!
//! Consecutive anomaly polls query overlapping windows, so the same event is
//! usually returned several times. The deduplicator remembers every key it has
//! emitted for a bounded retention period and only lets unseen keys through.

use std::collections::{HashMap, HashSet, VecDeque};
use std::time::Duration;

use telewatch_types::{AnomalyEvent, DedupKey};
use tokio::time::Instant;
use tracing::trace;

/// Bounded memory of already-emitted anomaly keys.
///
/// Every key is kept for at least `retention` after it was first seen and is
/// pruned once it is older than that. With a retention of at least twice the
/// query window, an event cannot be forgotten while a window can still return
/// it.
#[derive(Debug)]
pub struct AnomalyDeduplicator {
    retention: Duration,
    seen: HashMap<DedupKey, Instant>,
    order: VecDeque<(Instant, DedupKey)>,
    last_now: Option<Instant>,
}

impl AnomalyDeduplicator {
    pub fn new(retention: Duration) -> Self {
        Self {
            retention,
            seen: HashMap::new(),
            order: VecDeque::new(),
            last_now: None,
        }
    }

    /// Filter a batch down to the events not emitted before.
    ///
    /// Novel events are returned in batch order. Duplicates within the batch
    /// collapse to their first occurrence.
    pub fn ingest(&mut self, batch: impl IntoIterator<Item = AnomalyEvent>) -> Vec<AnomalyEvent> {
        self.ingest_at(batch, Instant::now())
    }

    /// [`ingest`](Self::ingest) with an explicit "now".
    ///
    /// A `now` earlier than a previous call is treated as the previous value.
    pub fn ingest_at(
        &mut self,
        batch: impl IntoIterator<Item = AnomalyEvent>,
        now: Instant,
    ) -> Vec<AnomalyEvent> {
        let now = match self.last_now {
            Some(last) if last > now => last,
            _ => now,
        };
        self.last_now = Some(now);

        let mut novel = Vec::new();
        for event in batch {
            let key = event.key();
            if self.seen.contains_key(&key) {
                continue;
            }
            self.seen.insert(key, now);
            self.order.push_back((now, key));
            novel.push(event);
        }

        self.prune(now);
        novel
    }

    fn prune(&mut self, now: Instant) {
        let mut pruned = 0usize;
        while let Some(&(seen_at, key)) = self.order.front() {
            if now.saturating_duration_since(seen_at) <= self.retention {
                break;
            }
            self.order.pop_front();
            self.seen.remove(&key);
            pruned += 1;
        }
        if pruned > 0 {
            trace!(pruned, remaining = self.seen.len(), "Pruned dedup entries");
        }
    }

    pub fn contains(&self, key: &DedupKey) -> bool {
        self.seen.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }

    pub fn retention(&self) -> Duration {
        self.retention
    }

    /// Age of the oldest retained entry relative to `now`.
    pub fn oldest_age(&self, now: Instant) -> Option<Duration> {
        self.order
            .front()
            .map(|(seen_at, _)| now.saturating_duration_since(*seen_at))
    }

    /// Keys currently retained, in no particular order.
    pub fn keys(&self) -> HashSet<DedupKey> {
        self.seen.keys().copied().collect()
    }
}
