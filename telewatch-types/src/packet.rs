//! Telemetry packet - one decoded CCSDS-framed reading.

use crate::UnixSeconds;

/// CCSDS primary header: routing and length.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PrimaryHeader {
    /// Application process identifier.
    pub packet_id: u32,
    /// Sequence flags and count.
    pub seq_control: u32,
    /// Payload length as declared upstream. Never recomputed locally.
    pub length: u32,
}

/// CCSDS secondary header: time and origin.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SecondaryHeader {
    /// Ordering key across packets. Not guaranteed monotonic between polls.
    pub timestamp: UnixSeconds,
    /// Subsystem that produced the packet.
    pub subsystem_id: u32,
}

/// Instrument readings carried by a packet.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Payload {
    /// Degrees Celsius.
    pub temperature: f64,
    /// Percent charge.
    pub battery: f64,
    /// Kilometres.
    pub altitude: f64,
    /// Decibels.
    pub signal: f64,
}

/// A decoded telemetry packet.
///
/// Packets are transient: one is built per poll response entry and dropped
/// once the consumer has taken it.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TelemetryPacket {
    pub primary_header: PrimaryHeader,
    pub secondary_header: SecondaryHeader,
    pub payload: Payload,
}

impl TelemetryPacket {
    /// The packet timestamp in Unix seconds.
    pub fn timestamp(&self) -> UnixSeconds {
        self.secondary_header.timestamp
    }

    /// The packet timestamp as a UTC instant, if it is representable.
    pub fn time(&self) -> Option<chrono::DateTime<chrono::Utc>> {
        let ts = self.timestamp();
        if !ts.is_finite() {
            return None;
        }
        let secs = ts.floor();
        let nanos = ((ts - secs) * 1e9).round() as u32;
        chrono::DateTime::from_timestamp(secs as i64, nanos.min(999_999_999))
    }
}
