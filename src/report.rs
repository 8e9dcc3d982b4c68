//! Plain-text and JSON rendering of what the pollers publish.

use serde::Serialize;
use telewatch_poller::{CurrentState, PollStatus};
use telewatch_types::{
    format_instant, AnomalyEvent, AnomalyField, FieldStats, PayloadStats, QueryRange,
    TelemetryPacket,
};

/// One line summarising a packet.
pub fn render_packet(packet: &TelemetryPacket) -> String {
    let when = packet
        .time()
        .map(format_instant)
        .unwrap_or_else(|| packet.timestamp().to_string());
    let p = &packet.payload;
    format!(
        "{when}  id={} seq={} sub={}  temp={:.2}°C  batt={:.2}%  alt={:.2}km  sig={:.2}dB",
        packet.primary_header.packet_id,
        packet.primary_header.seq_control,
        packet.secondary_header.subsystem_id,
        p.temperature,
        p.battery,
        p.altitude,
        p.signal,
    )
}

/// A line for a current-value update, or `None` for states not worth printing.
pub fn render_current(state: &CurrentState) -> Option<String> {
    match state {
        CurrentState::Pending => None,
        CurrentState::Ready(packet) => Some(format!("current   {}", render_packet(packet))),
        CurrentState::Empty => Some("current   no telemetry yet".to_string()),
        CurrentState::Failed(e) => Some(format!("current   unavailable: {e}")),
    }
}

/// An alert line for a novel anomaly.
pub fn render_anomaly(event: &AnomalyEvent) -> String {
    format!("ANOMALY   {} value={}", event.key(), event.value)
}

/// A line when the anomaly feed goes unhealthy, `None` otherwise.
pub fn render_anomaly_status(status: &PollStatus) -> Option<String> {
    match status {
        PollStatus::Failed(e) => Some(format!("anomalies unavailable: {e}")),
        _ => None,
    }
}

/// The `history` command's output.
#[derive(Debug, Clone, Serialize)]
pub struct HistoryReport {
    pub range: QueryRange,
    pub packets: Vec<TelemetryPacket>,
    pub stats: Option<PayloadStats>,
    /// The upstream's own aggregate for the range, when requested.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server_stats: Option<PayloadStats>,
}

impl HistoryReport {
    pub fn new(range: QueryRange, packets: Vec<TelemetryPacket>) -> Self {
        let stats = PayloadStats::from_packets(&packets);
        Self {
            range,
            packets,
            stats,
            server_stats: None,
        }
    }

    pub fn with_server_stats(mut self, server_stats: Option<PayloadStats>) -> Self {
        self.server_stats = server_stats;
        self
    }

    /// Human-readable rendering: one line per packet, then the aggregates.
    /// Upstream aggregates follow the local ones, one `upstream` row per field.
    pub fn render_text(&self) -> String {
        let mut out = format!("{} packets in {}\n", self.packets.len(), self.range);
        for packet in &self.packets {
            out.push_str(&render_packet(packet));
            out.push('\n');
        }

        if self.stats.is_none() && self.server_stats.is_none() {
            return out;
        }

        out.push_str(&format!("{:<12} {:>10} {:>10} {:>10}\n", "field", "min", "max", "avg"));
        for field in AnomalyField::ALL {
            let name = field.name().to_ascii_lowercase();
            if let Some(stats) = &self.stats {
                out.push_str(&stats_row(&name, stats.get(field)));
            }
            if let Some(server) = &self.server_stats {
                out.push_str(&stats_row("  upstream", server.get(field)));
            }
        }
        out
    }

    pub fn render_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

fn stats_row(label: &str, field: &FieldStats) -> String {
    format!(
        "{:<12} {:>10.2} {:>10.2} {:>10.2}\n",
        label, field.min, field.max, field.avg
    )
}
