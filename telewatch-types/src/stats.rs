//! Per-field aggregates over a set of packets.

use crate::{AnomalyField, TelemetryPacket};

/// Minimum, maximum and mean of one payload field.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FieldStats {
    pub min: f64,
    pub max: f64,
    pub avg: f64,
}

impl FieldStats {
    fn from_values(values: impl Iterator<Item = f64>) -> Option<Self> {
        let mut count = 0usize;
        let mut sum = 0.0;
        let mut min = f64::INFINITY;
        let mut max = f64::NEG_INFINITY;

        for v in values {
            count += 1;
            sum += v;
            min = min.min(v);
            max = max.max(v);
        }

        (count > 0).then(|| FieldStats {
            min,
            max,
            avg: sum / count as f64,
        })
    }
}

/// Aggregates for every payload field over a packet set.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PayloadStats {
    /// Number of packets aggregated. `None` for aggregates computed upstream,
    /// which do not report it.
    pub count: Option<usize>,
    pub temperature: FieldStats,
    pub battery: FieldStats,
    pub altitude: FieldStats,
    pub signal: FieldStats,
}

impl PayloadStats {
    /// Aggregate a packet set. Returns `None` for an empty set.
    pub fn from_packets(packets: &[TelemetryPacket]) -> Option<Self> {
        let field = |f: fn(&TelemetryPacket) -> f64| FieldStats::from_values(packets.iter().map(f));

        Some(PayloadStats {
            count: Some(packets.len()),
            temperature: field(|p| p.payload.temperature)?,
            battery: field(|p| p.payload.battery)?,
            altitude: field(|p| p.payload.altitude)?,
            signal: field(|p| p.payload.signal)?,
        })
    }

    /// Stats for one field, addressed the same way anomalies are.
    pub fn get(&self, field: AnomalyField) -> &FieldStats {
        match field {
            AnomalyField::Temperature => &self.temperature,
            AnomalyField::Battery => &self.battery,
            AnomalyField::Altitude => &self.altitude,
            AnomalyField::Signal => &self.signal,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Payload;

    fn packet(temperature: f64, battery: f64) -> TelemetryPacket {
        TelemetryPacket {
            payload: Payload {
                temperature,
                battery,
                altitude: 500.0,
                signal: -70.0,
            },
            ..Default::default()
        }
    }

    #[test]
    fn empty_set_has_no_stats() {
        assert_eq!(PayloadStats::from_packets(&[]), None);
    }

    #[test]
    fn aggregates_each_field() {
        let stats =
            PayloadStats::from_packets(&[packet(10.0, 90.0), packet(30.0, 70.0), packet(20.0, 80.0)])
                .unwrap();

        assert_eq!(stats.count, Some(3));
        assert_eq!(stats.temperature.min, 10.0);
        assert_eq!(stats.temperature.max, 30.0);
        assert_eq!(stats.temperature.avg, 20.0);
        assert_eq!(stats.get(AnomalyField::Battery).min, 70.0);
        assert_eq!(stats.get(AnomalyField::Battery).max, 90.0);
        assert_eq!(stats.altitude.avg, 500.0);
        assert_eq!(stats.signal.avg, -70.0);
    }
}
