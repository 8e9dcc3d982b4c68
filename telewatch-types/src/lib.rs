//! # telewatch-types
//!
//! Core types for spacecraft telemetry monitoring. This crate defines the
//! record shapes every other telewatch crate works with, the single lookup
//! table that maps anomaly field codes to fields, and the decoder that turns
//! raw upstream JSON into those records.
//!
//! ## Design Goals
//!
//! - **One source of truth**: the anomaly field-code table lives here and nowhere else
//! - **Closed errors**: decoding fails with a [`DecodeError`] naming the offending field
//! - **Pure decoding**: [`decode_packet`] and [`decode_anomaly`] have no side effects
//! - **Optional serialization**: enable `serde` to serialize decoded records
//!
//! ## Example
//!
//! ```rust
//! use telewatch_types::{decode_anomaly, decode_packet, AnomalyField};
//!
//! let raw = serde_json::json!({
//!     "ccsdsPrimaryHeader": { "packetId": 7, "packetSeqCtrl": 12, "packetLength": 32 },
//!     "ccsdsSecondaryHeader": { "timestamp": 1700000000, "subsystemId": 2 },
//!     "telemetryPayload": { "temperature": 21.5, "battery": 88.0, "altitude": 512.3, "signal": -61.0 }
//! });
//! let packet = decode_packet(&raw).unwrap();
//! assert_eq!(packet.primary_header.packet_id, 7);
//!
//! let anomaly = decode_anomaly(&serde_json::json!({
//!     "field": 2, "value": 4.5, "timestamp": 1700000001
//! }))
//! .unwrap();
//! assert_eq!(anomaly.field, AnomalyField::Battery);
//! ```

mod anomaly;
mod api;
mod decode;
mod error;
mod packet;
mod range;
mod stats;

pub use anomaly::*;
pub use api::*;
pub use decode::*;
pub use error::*;
pub use packet::*;
pub use range::*;
pub use stats::*;

/// Seconds since the Unix epoch, as delivered upstream.
///
/// Upstream sends whole seconds today but the wire type is a JSON number, so
/// fractional values are preserved rather than truncated.
pub type UnixSeconds = f64;
