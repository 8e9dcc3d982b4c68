//! Decoder from upstream JSON to telemetry records.
//!
//! The upstream wire shape for a packet is:
//!
//! ```text
//! { ccsdsPrimaryHeader:   { packetId, packetSeqCtrl, packetLength },
//!   ccsdsSecondaryHeader: { timestamp, subsystemId },
//!   telemetryPayload:     { temperature, battery, altitude, signal } }
//! ```
//!
//! for an anomaly `{ field: <code>, value, timestamp }`, and for a range
//! aggregate a flat object of `min`/`max`/`avg` keys per payload field
//! (`minTemperature`, `avgSignal`, ...). Field names in
//! errors use the dotted wire path so a log line points at the exact key.

use serde_json::Value;

use crate::{
    AnomalyEvent, AnomalyField, DecodeError, FieldStats, Payload, PayloadStats, PrimaryHeader,
    SecondaryHeader, TelemetryPacket,
};

const PRIMARY: &str = "ccsdsPrimaryHeader";
const SECONDARY: &str = "ccsdsSecondaryHeader";
const PAYLOAD: &str = "telemetryPayload";

/// Decode one raw packet.
///
/// Fails with [`DecodeError::MissingField`] if any header or payload field is
/// absent, and [`DecodeError::TypeMismatch`] if a field is not numeric (or, for
/// header fields, not an unsigned 32-bit integer).
pub fn decode_packet(raw: &Value) -> Result<TelemetryPacket, DecodeError> {
    let primary = section(raw, PRIMARY)?;
    let secondary = section(raw, SECONDARY)?;
    let payload = section(raw, PAYLOAD)?;

    Ok(TelemetryPacket {
        primary_header: PrimaryHeader {
            packet_id: uint(primary, PRIMARY, "packetId")?,
            seq_control: uint(primary, PRIMARY, "packetSeqCtrl")?,
            length: uint(primary, PRIMARY, "packetLength")?,
        },
        secondary_header: SecondaryHeader {
            timestamp: number(secondary, Some(SECONDARY), "timestamp")?,
            subsystem_id: uint(secondary, SECONDARY, "subsystemId")?,
        },
        payload: Payload {
            temperature: number(payload, Some(PAYLOAD), "temperature")?,
            battery: number(payload, Some(PAYLOAD), "battery")?,
            altitude: number(payload, Some(PAYLOAD), "altitude")?,
            signal: number(payload, Some(PAYLOAD), "signal")?,
        },
    })
}

/// Decode one raw anomaly, resolving its field code through the shared table.
///
/// Any integer code without a table entry, negative ones included, is
/// [`DecodeError::UnknownField`]. A non-integer code is a type mismatch.
pub fn decode_anomaly(raw: &Value) -> Result<AnomalyEvent, DecodeError> {
    let field = match lookup(raw, None, "field")? {
        Value::Number(n) if n.is_u64() || n.is_i64() => n
            .as_u64()
            .and_then(AnomalyField::from_code)
            .ok_or_else(|| DecodeError::UnknownField(n.clone()))?,
        _ => return Err(DecodeError::TypeMismatch("field".to_string())),
    };

    Ok(AnomalyEvent {
        field,
        value: number(raw, None, "value")?,
        timestamp: number(raw, None, "timestamp")?,
    })
}

/// Decode the upstream's aggregate for a range into [`PayloadStats`].
///
/// The upstream does not report how many packets it aggregated, so `count`
/// is `None`.
pub fn decode_aggregate(raw: &Value) -> Result<PayloadStats, DecodeError> {
    let field = |name: &str| -> Result<FieldStats, DecodeError> {
        Ok(FieldStats {
            min: number(raw, None, &format!("min{name}"))?,
            max: number(raw, None, &format!("max{name}"))?,
            avg: number(raw, None, &format!("avg{name}"))?,
        })
    };

    Ok(PayloadStats {
        count: None,
        temperature: field("Temperature")?,
        battery: field("Battery")?,
        altitude: field("Altitude")?,
        signal: field("Signal")?,
    })
}

fn path(parent: Option<&str>, key: &str) -> String {
    match parent {
        Some(parent) => format!("{}.{}", parent, key),
        None => key.to_string(),
    }
}

fn lookup<'a>(obj: &'a Value, parent: Option<&str>, key: &str) -> Result<&'a Value, DecodeError> {
    match obj.get(key) {
        None | Some(Value::Null) => Err(DecodeError::MissingField(path(parent, key))),
        Some(value) => Ok(value),
    }
}

fn section<'a>(raw: &'a Value, key: &str) -> Result<&'a Value, DecodeError> {
    let value = lookup(raw, None, key)?;
    if value.is_object() {
        Ok(value)
    } else {
        Err(DecodeError::TypeMismatch(key.to_string()))
    }
}

fn number(obj: &Value, parent: Option<&str>, key: &str) -> Result<f64, DecodeError> {
    lookup(obj, parent, key)?
        .as_f64()
        .ok_or_else(|| DecodeError::TypeMismatch(path(parent, key)))
}

fn uint(obj: &Value, parent: &str, key: &str) -> Result<u32, DecodeError> {
    lookup(obj, Some(parent), key)?
        .as_u64()
        .and_then(|v| u32::try_from(v).ok())
        .ok_or_else(|| DecodeError::TypeMismatch(path(Some(parent), key)))
}
