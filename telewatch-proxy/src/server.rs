//! The proxy HTTP server.

use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use http_body_util::Full;
use hyper::body::{Bytes, Incoming};
use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{debug, info, warn};
use url::Url;

use crate::error::ProxyError;
use crate::route::{error_body, route};

/// Configuration for the proxy.
#[derive(Debug, Clone)]
pub struct ProxyConfig {
    /// Address to listen on (e.g., "127.0.0.1:3000")
    pub listen_addr: String,
    /// Upstream base URL. When unset every forwarded request answers 500.
    pub upstream_base_url: Option<String>,
    /// Timeout for each upstream request.
    pub request_timeout: Duration,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            listen_addr: "127.0.0.1:3000".to_string(),
            upstream_base_url: None,
            request_timeout: Duration::from_secs(5),
        }
    }
}

impl ProxyConfig {
    /// Create a builder for the configuration.
    pub fn builder() -> ProxyConfigBuilder {
        ProxyConfigBuilder::default()
    }
}

/// Builder for ProxyConfig.
#[derive(Debug, Default)]
pub struct ProxyConfigBuilder {
    config: ProxyConfig,
}

impl ProxyConfigBuilder {
    /// Set the listen address.
    pub fn listen_addr(mut self, addr: impl Into<String>) -> Self {
        self.config.listen_addr = addr.into();
        self
    }

    /// Set the upstream base URL.
    pub fn upstream_base_url(mut self, url: impl Into<String>) -> Self {
        self.config.upstream_base_url = Some(url.into());
        self
    }

    /// Set the upstream request timeout.
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.config.request_timeout = timeout;
        self
    }

    /// Build the configuration.
    pub fn build(self) -> ProxyConfig {
        self.config
    }
}

#[derive(Debug)]
struct ProxyState {
    upstream: Option<Url>,
    client: reqwest::Client,
}

/// A bound, not yet serving, proxy.
#[derive(Debug)]
pub struct ProxyServer {
    listener: TcpListener,
    state: Arc<ProxyState>,
}

impl ProxyServer {
    /// Validate the configuration and bind the listener.
    pub async fn bind(config: ProxyConfig) -> Result<Self, ProxyError> {
        let addr: SocketAddr =
            config
                .listen_addr
                .parse()
                .map_err(|source| ProxyError::InvalidListenAddr {
                    addr: config.listen_addr.clone(),
                    source,
                })?;

        let upstream = match config.upstream_base_url.as_deref().map(str::trim) {
            None | Some("") => {
                warn!("No upstream base URL configured; requests will fail with 500");
                None
            }
            Some(raw) => Some(Url::parse(raw).map_err(|e| ProxyError::InvalidBaseUrl {
                url: raw.to_string(),
                reason: e.to_string(),
            })?),
        };

        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| ProxyError::Client(e.to_string()))?;

        let listener = TcpListener::bind(addr).await?;
        info!(
            addr = %listener.local_addr()?,
            upstream = upstream.as_ref().map(Url::as_str).unwrap_or("<unset>"),
            "Telemetry proxy listening"
        );

        Ok(Self {
            listener,
            state: Arc::new(ProxyState { upstream, client }),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, ProxyError> {
        Ok(self.listener.local_addr()?)
    }

    /// Serve until `shutdown` completes.
    pub async fn serve(self, shutdown: impl Future<Output = ()>) -> Result<(), ProxyError> {
        tokio::pin!(shutdown);

        loop {
            let (stream, peer) = tokio::select! {
                accepted = self.listener.accept() => accepted?,
                _ = &mut shutdown => {
                    info!("Telemetry proxy shutting down");
                    return Ok(());
                }
            };
            let io = TokioIo::new(stream);
            let state = self.state.clone();

            tokio::spawn(async move {
                let service = service_fn(move |req: Request<Incoming>| {
                    let state = state.clone();
                    async move { handle_request(req, &state).await }
                });

                if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                    debug!(%peer, error = %e, "Proxy connection error");
                }
            });
        }
    }

    /// Serve in a background task.
    pub fn spawn(self) -> Result<ProxyHandle, ProxyError> {
        let addr = self.local_addr()?;
        let (stop_tx, mut stop_rx) = watch::channel(false);

        let task = tokio::spawn(async move {
            // Resolves on stop() or when the handle is dropped.
            let stopped = async move {
                let _ = stop_rx.changed().await;
            };
            if let Err(e) = self.serve(stopped).await {
                warn!(error = %e, "Telemetry proxy stopped with error");
            }
        });

        Ok(ProxyHandle {
            addr,
            stop_tx,
            task,
        })
    }
}

/// Handle to a proxy running in the background.
///
/// Dropping the handle stops the proxy.
#[derive(Debug)]
pub struct ProxyHandle {
    addr: SocketAddr,
    stop_tx: watch::Sender<bool>,
    task: tokio::task::JoinHandle<()>,
}

impl ProxyHandle {
    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    /// Stop accepting connections and wait for the accept loop to exit.
    pub async fn stop(self) {
        let _ = self.stop_tx.send(true);
        let _ = self.task.await;
    }
}

async fn handle_request(
    req: Request<Incoming>,
    state: &ProxyState,
) -> Result<Response<Full<Bytes>>, Infallible> {
    let target = match route(
        req.method(),
        req.uri().path(),
        req.uri().query(),
        state.upstream.as_ref(),
    ) {
        Ok(target) => target,
        Err(rejection) => {
            debug!(
                method = %req.method(),
                path = req.uri().path(),
                status = rejection.status.as_u16(),
                reason = %rejection.message,
                "Rejected proxy request"
            );
            return Ok(json_response(rejection.status, rejection.body()));
        }
    };

    Ok(forward(&state.client, target).await)
}

/// Forward a GET and pass the upstream status and body through.
async fn forward(client: &reqwest::Client, target: Url) -> Response<Full<Bytes>> {
    debug!(%target, "Forwarding to upstream");

    let response = match client.get(target.clone()).send().await {
        Ok(response) => response,
        Err(e) => {
            let status = if e.is_timeout() {
                StatusCode::GATEWAY_TIMEOUT
            } else {
                StatusCode::BAD_GATEWAY
            };
            warn!(%target, error = %e, "Upstream request failed");
            return json_response(status, error_body(&format!("upstream request failed: {e}")));
        }
    };

    let status = StatusCode::from_u16(response.status().as_u16()).unwrap_or(StatusCode::BAD_GATEWAY);
    match response.bytes().await {
        Ok(body) => json_response(status, body),
        Err(e) => {
            warn!(%target, error = %e, "Failed to read upstream body");
            json_response(
                StatusCode::BAD_GATEWAY,
                error_body(&format!("failed to read upstream body: {e}")),
            )
        }
    }
}

fn json_response(status: StatusCode, body: impl Into<Bytes>) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(body.into()));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    response
}
