//! Query ranges for historical and windowed requests.

use core::fmt;
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};

/// Name of the range start query parameter.
pub const START_PARAM: &str = "start_time";
/// Name of the range end query parameter.
pub const END_PARAM: &str = "end_time";

/// A half-open time range `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct QueryRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl QueryRange {
    /// Create a range. No validation happens here; see [`QueryRange::is_valid`].
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    /// The trailing window `[now - width, now)`.
    pub fn trailing(now: DateTime<Utc>, width: Duration) -> Self {
        let start = chrono::Duration::from_std(width)
            .ok()
            .and_then(|width| now.checked_sub_signed(width))
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        Self { start, end: now }
    }

    /// A range is valid when `end` is strictly after `start`.
    pub fn is_valid(&self) -> bool {
        self.end > self.start
    }

    /// Width of the range, or zero when it is not valid.
    pub fn width(&self) -> Duration {
        (self.end - self.start).to_std().unwrap_or_default()
    }

    /// Query parameters in wire format (RFC 3339, millisecond precision, `Z`).
    pub fn query_pairs(&self) -> [(&'static str, String); 2] {
        [
            (START_PARAM, format_instant(self.start)),
            (END_PARAM, format_instant(self.end)),
        ]
    }
}

impl fmt::Display for QueryRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}, {})",
            format_instant(self.start),
            format_instant(self.end)
        )
    }
}

/// Format an instant the way the upstream API expects it.
pub fn format_instant(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}
