//! Anomaly events and the field-code table.

use core::fmt;

use crate::UnixSeconds;

/// Instrument field an anomaly refers to.
///
/// The upstream sends a small integer code instead of a name. The mapping is
/// fixed by the upstream schema and lives only in [`AnomalyField::from_code`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "SCREAMING_SNAKE_CASE"))]
pub enum AnomalyField {
    Temperature,
    Battery,
    Altitude,
    Signal,
}

/// Wire code table. Order matches the upstream enum, not the field names.
const FIELD_CODES: &[(u64, AnomalyField)] = &[
    (1, AnomalyField::Temperature),
    (2, AnomalyField::Battery),
    (3, AnomalyField::Altitude),
    (4, AnomalyField::Signal),
];

impl AnomalyField {
    /// All fields, in wire-code order.
    pub const ALL: [AnomalyField; 4] = [
        AnomalyField::Temperature,
        AnomalyField::Battery,
        AnomalyField::Altitude,
        AnomalyField::Signal,
    ];

    /// Resolve a wire code. Returns `None` for codes outside the table.
    pub fn from_code(code: u64) -> Option<Self> {
        FIELD_CODES
            .iter()
            .find(|(c, _)| *c == code)
            .map(|(_, field)| *field)
    }

    /// The wire code for this field.
    pub fn code(self) -> u64 {
        FIELD_CODES
            .iter()
            .find(|(_, f)| *f == self)
            .map(|(c, _)| *c)
            .unwrap_or_default()
    }

    /// Upper-case display name, as shown in alerts.
    pub fn name(self) -> &'static str {
        match self {
            AnomalyField::Temperature => "TEMPERATURE",
            AnomalyField::Battery => "BATTERY",
            AnomalyField::Altitude => "ALTITUDE",
            AnomalyField::Signal => "SIGNAL",
        }
    }
}

impl fmt::Display for AnomalyField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// An out-of-range reading reported by the upstream.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AnomalyEvent {
    pub field: AnomalyField,
    /// The out-of-range reading.
    pub value: f64,
    pub timestamp: UnixSeconds,
}

impl AnomalyEvent {
    pub fn new(field: AnomalyField, value: f64, timestamp: UnixSeconds) -> Self {
        Self {
            field,
            value,
            timestamp,
        }
    }

    /// Identity of the logical anomaly this event reports.
    pub fn key(&self) -> DedupKey {
        DedupKey::new(self.field, self.timestamp)
    }
}

impl fmt::Display for AnomalyEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{} = {}", self.field, self.timestamp, self.value)
    }
}

/// Identity of a logical anomaly: `(field, timestamp)`.
///
/// Two deliveries with the same key are the same anomaly even if their values
/// differ. Timestamps compare by bit pattern with `-0.0` folded into `0.0`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DedupKey {
    field: AnomalyField,
    timestamp_bits: u64,
}

impl DedupKey {
    pub fn new(field: AnomalyField, timestamp: UnixSeconds) -> Self {
        let normalized = if timestamp == 0.0 { 0.0 } else { timestamp };
        Self {
            field,
            timestamp_bits: normalized.to_bits(),
        }
    }

    pub fn field(&self) -> AnomalyField {
        self.field
    }

    pub fn timestamp(&self) -> UnixSeconds {
        f64::from_bits(self.timestamp_bits)
    }
}

impl fmt::Display for DedupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.field, self.timestamp())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn code_table_matches_upstream_schema() {
        assert_eq!(AnomalyField::from_code(1), Some(AnomalyField::Temperature));
        assert_eq!(AnomalyField::from_code(2), Some(AnomalyField::Battery));
        assert_eq!(AnomalyField::from_code(3), Some(AnomalyField::Altitude));
        assert_eq!(AnomalyField::from_code(4), Some(AnomalyField::Signal));
    }

    #[test]
    fn unknown_codes_are_not_mapped() {
        assert_eq!(AnomalyField::from_code(0), None);
        assert_eq!(AnomalyField::from_code(5), None);
        assert_eq!(AnomalyField::from_code(u64::MAX), None);
    }

    #[test]
    fn code_is_inverse_of_from_code() {
        for field in AnomalyField::ALL {
            assert_eq!(AnomalyField::from_code(field.code()), Some(field));
        }
    }

    #[test]
    fn key_ignores_value() {
        let a = AnomalyEvent::new(AnomalyField::Signal, -120.0, 1_700_000_000.0);
        let b = AnomalyEvent::new(AnomalyField::Signal, -95.0, 1_700_000_000.0);
        assert_eq!(a.key(), b.key());
    }

    #[test]
    fn key_distinguishes_field_and_timestamp() {
        let base = DedupKey::new(AnomalyField::Battery, 10.0);
        assert_ne!(base, DedupKey::new(AnomalyField::Altitude, 10.0));
        assert_ne!(base, DedupKey::new(AnomalyField::Battery, 10.5));
    }

    #[test]
    fn negative_zero_folds_into_zero() {
        assert_eq!(
            DedupKey::new(AnomalyField::Battery, -0.0),
            DedupKey::new(AnomalyField::Battery, 0.0)
        );
    }

    #[test]
    fn display_uses_upper_case_names() {
        let event = AnomalyEvent::new(AnomalyField::Temperature, 42.0, 1000.0);
        assert_eq!(event.key().to_string(), "TEMPERATURE@1000");
        assert_eq!(event.to_string(), "TEMPERATURE@1000 = 42");
    }
}
