//! The seam between pollers and whatever serves telemetry.

use std::fmt::Debug;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use telewatch_types::QueryRange;

use crate::error::FetchError;

/// A read-only telemetry feed returning raw JSON records.
///
/// Decoding happens in the pollers, so implementations only move bytes.
/// [`UpstreamClient`](crate::UpstreamClient) is the HTTP implementation; tests
/// use in-memory fakes.
#[async_trait]
pub trait TelemetrySource: Send + Sync + Debug {
    /// The most recent packet, or `None` when there is none yet.
    async fn latest(&self) -> Result<Option<Value>, FetchError>;

    /// Packets in `range`.
    async fn packets(&self, range: QueryRange) -> Result<Vec<Value>, FetchError>;

    /// Anomalies in `range`.
    async fn anomalies(&self, range: QueryRange) -> Result<Vec<Value>, FetchError>;
}

#[async_trait]
impl<T: TelemetrySource + ?Sized> TelemetrySource for Arc<T> {
    async fn latest(&self) -> Result<Option<Value>, FetchError> {
        (**self).latest().await
    }

    async fn packets(&self, range: QueryRange) -> Result<Vec<Value>, FetchError> {
        (**self).packets(range).await
    }

    async fn anomalies(&self, range: QueryRange) -> Result<Vec<Value>, FetchError> {
        (**self).anomalies(range).await
    }
}

/// Bound a fetch by `limit`, mapping expiry to [`FetchError::Timeout`].
pub(crate) async fn with_timeout<T>(
    limit: Duration,
    fetch: impl Future<Output = Result<T, FetchError>>,
) -> Result<T, FetchError> {
    match tokio::time::timeout(limit, fetch).await {
        Ok(result) => result,
        Err(_) => Err(FetchError::Timeout),
    }
}
