//! Endpoint paths shared by the HTTP client and the local proxy.

/// One read-only feed exposed by the telemetry API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoint {
    /// Packets in a time range.
    Packets,
    /// The most recent packet.
    Current,
    /// Anomalies in a time range.
    Anomalies,
    /// Per-field min/max/avg over a time range.
    Aggregation,
}

impl Endpoint {
    pub const ALL: [Endpoint; 4] = [
        Endpoint::Packets,
        Endpoint::Current,
        Endpoint::Anomalies,
        Endpoint::Aggregation,
    ];

    /// Path on the local proxy.
    pub fn proxy_path(self) -> &'static str {
        match self {
            Endpoint::Packets => "/api/telemetry",
            Endpoint::Current => "/api/telemetry/current",
            Endpoint::Anomalies => "/api/telemetry/anomalies",
            Endpoint::Aggregation => "/api/telemetry/aggregation",
        }
    }

    /// Path on the upstream service.
    pub fn upstream_path(self) -> &'static str {
        match self {
            Endpoint::Packets => "/api/v1/telemetry",
            Endpoint::Current => "/api/v1/telemetry/current",
            Endpoint::Anomalies => "/api/v1/telemetry/anomaly",
            Endpoint::Aggregation => "/api/v1/telemetry/aggregation",
        }
    }

    /// Whether the endpoint needs `start_time` and `end_time`.
    pub fn requires_range(self) -> bool {
        !matches!(self, Endpoint::Current)
    }

    /// Look up the endpoint served at a proxy path.
    pub fn from_proxy_path(path: &str) -> Option<Self> {
        let path = match path.strip_suffix('/') {
            Some(trimmed) if !trimmed.is_empty() => trimmed,
            _ => path,
        };
        Self::ALL.into_iter().find(|e| e.proxy_path() == path)
    }
}
