use anyhow::{Context, Result};
use chrono::{DateTime, Utc};

/// Parse an RFC 3339 instant given on the command line (e.g. "2024-06-10T06:13:20Z")
pub fn parse_instant(s: &str) -> Result<DateTime<Utc>> {
    let parsed = DateTime::parse_from_rfc3339(s.trim())
        .with_context(|| format!("Invalid RFC 3339 timestamp: {}", s))?;
    Ok(parsed.with_timezone(&Utc))
}
