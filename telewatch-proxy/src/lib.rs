//! # telewatch-proxy
//!
//! A small read-only HTTP proxy that exposes the telemetry API's feeds under
//! local paths, so dashboards never talk to the upstream directly.
//!
//! | Local path                   | Upstream path                   | Range required |
//! |------------------------------|---------------------------------|----------------|
//! | `/api/telemetry`             | `/api/v1/telemetry`             | yes            |
//! | `/api/telemetry/current`     | `/api/v1/telemetry/current`     | no             |
//! | `/api/telemetry/anomalies`   | `/api/v1/telemetry/anomaly`     | yes            |
//! | `/api/telemetry/aggregation` | `/api/v1/telemetry/aggregation` | yes            |
//!
//! Upstream status and body are passed through unchanged with
//! `content-type: application/json`.
//!
//! ## Example
//!
//! ```rust,no_run
//! use telewatch_proxy::{ProxyConfig, ProxyServer};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ProxyConfig::builder()
//!         .listen_addr("127.0.0.1:3000")
//!         .upstream_base_url("http://localhost:8090")
//!         .build();
//!
//!     let server = ProxyServer::bind(config).await?;
//!     server
//!         .serve(async {
//!             let _ = tokio::signal::ctrl_c().await;
//!         })
//!         .await?;
//!     Ok(())
//! }
//! ```

mod error;
mod route;
mod server;

pub use error::ProxyError;
pub use route::{route, Rejection};
pub use server::{ProxyConfig, ProxyConfigBuilder, ProxyHandle, ProxyServer};
