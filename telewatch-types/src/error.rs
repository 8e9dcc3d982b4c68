//! Error types for decoding upstream payloads.

use thiserror::Error;

/// Errors that can occur when decoding a raw packet or anomaly.
///
/// A decode error is always local to one record: callers drop that record and
/// keep going.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// A required field (or the object containing it) is absent or null.
    #[error("missing field: {0}")]
    MissingField(String),

    /// A field is present but not a number of the expected kind.
    #[error("field {0} has the wrong type")]
    TypeMismatch(String),

    /// An integer anomaly field code has no entry in the field table.
    #[error("unknown anomaly field code: {0}")]
    UnknownField(serde_json::Number),
}
