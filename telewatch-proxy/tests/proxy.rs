//! The proxy in front of a loopback fake upstream.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use http_body_util::Full;
use hyper::body::{Bytes, Incoming};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use telewatch_proxy::{ProxyConfig, ProxyHandle, ProxyServer};
use tokio::net::TcpListener;

/// Request targets seen by the fake upstream.
#[derive(Debug, Default)]
struct Seen(Mutex<Vec<String>>);

impl Seen {
    fn push(&self, target: String) {
        self.0.lock().unwrap().push(target);
    }

    fn all(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }
}

fn canned(path: &str) -> (StatusCode, &'static str) {
    match path {
        "/api/v1/telemetry/current" => (StatusCode::NO_CONTENT, ""),
        "/api/v1/telemetry" => (StatusCode::OK, r#"[{"ccsdsPrimaryHeader":{"packetId":1}}]"#),
        "/api/v1/telemetry/anomaly" => (StatusCode::SERVICE_UNAVAILABLE, r#"{"message":"store offline"}"#),
        "/api/v1/telemetry/aggregation" => (StatusCode::OK, r#"{"minTemperature":1.5}"#),
        _ => (StatusCode::NOT_FOUND, "{}"),
    }
}

async fn fake_upstream() -> (SocketAddr, Arc<Seen>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let seen = Arc::new(Seen::default());
    let recorder = seen.clone();

    tokio::spawn(async move {
        loop {
            let Ok((stream, _)) = listener.accept().await else {
                return;
            };
            let recorder = recorder.clone();
            tokio::spawn(async move {
                let service = service_fn(move |req: Request<Incoming>| {
                    let recorder = recorder.clone();
                    async move {
                        let target = req
                            .uri()
                            .path_and_query()
                            .map(|pq| pq.as_str().to_string())
                            .unwrap_or_default();
                        recorder.push(target);
                        let (status, body) = canned(req.uri().path());
                        let mut response = Response::new(Full::new(Bytes::from_static(body.as_bytes())));
                        *response.status_mut() = status;
                        Ok::<_, Infallible>(response)
                    }
                });
                let _ = http1::Builder::new()
                    .serve_connection(TokioIo::new(stream), service)
                    .await;
            });
        }
    });

    (addr, seen)
}

/// An upstream that accepts connections and never answers.
async fn stalled_upstream() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((stream, _)) = listener.accept().await {
            held.push(stream);
        }
    });
    addr
}

async fn start_proxy(upstream: Option<String>) -> ProxyHandle {
    start_proxy_with(upstream, ProxyConfig::default().request_timeout).await
}

async fn start_proxy_with(upstream: Option<String>, request_timeout: Duration) -> ProxyHandle {
    let mut builder = ProxyConfig::builder()
        .listen_addr("127.0.0.1:0")
        .request_timeout(request_timeout);
    if let Some(upstream) = upstream {
        builder = builder.upstream_base_url(upstream);
    }
    ProxyServer::bind(builder.build()).await.unwrap().spawn().unwrap()
}

async fn get(proxy: &ProxyHandle, path_and_query: &str) -> (StatusCode, String, String) {
    let response = reqwest::get(format!("http://{}{}", proxy.local_addr(), path_and_query))
        .await
        .unwrap();
    let status = StatusCode::from_u16(response.status().as_u16()).unwrap();
    let content_type = response
        .headers()
        .get("content-type")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    (status, content_type, response.text().await.unwrap())
}

const RANGE: &str = "start_time=2024-06-10T06:13:20.000Z&end_time=2024-06-10T06:13:25.000Z";

#[tokio::test]
async fn passes_status_and_body_through() {
    let (upstream, seen) = fake_upstream().await;
    let proxy = start_proxy(Some(format!("http://{upstream}"))).await;

    let (status, content_type, body) = get(&proxy, &format!("/api/telemetry?{RANGE}")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(content_type, "application/json");
    assert_eq!(body, r#"[{"ccsdsPrimaryHeader":{"packetId":1}}]"#);

    let (status, _, body) = get(&proxy, &format!("/api/telemetry/anomalies?{RANGE}")).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body, r#"{"message":"store offline"}"#);

    let (status, content_type, body) = get(&proxy, "/api/telemetry/current").await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    assert_eq!(content_type, "application/json");
    assert!(body.is_empty());

    let (status, _, body) = get(&proxy, &format!("/api/telemetry/aggregation?{RANGE}")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, r#"{"minTemperature":1.5}"#);

    let seen = seen.all();
    assert_eq!(seen.len(), 4);
    assert_eq!(
        seen[0],
        "/api/v1/telemetry?start_time=2024-06-10T06%3A13%3A20.000Z&end_time=2024-06-10T06%3A13%3A25.000Z"
    );
    assert!(seen[1].starts_with("/api/v1/telemetry/anomaly?start_time="));
    assert_eq!(seen[2], "/api/v1/telemetry/current");

    proxy.stop().await;
}

#[tokio::test]
async fn missing_range_never_reaches_upstream() {
    let (upstream, seen) = fake_upstream().await;
    let proxy = start_proxy(Some(format!("http://{upstream}"))).await;

    let (status, content_type, body) = get(&proxy, "/api/telemetry?start_time=2024-06-10T06:13:20.000Z").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(content_type, "application/json");
    let body: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert_eq!(body["error"], "`start_time` and `end_time` are required");
    assert!(seen.all().is_empty());

    proxy.stop().await;
}

#[tokio::test]
async fn unconfigured_upstream_answers_500() {
    let proxy = start_proxy(None).await;
    let (status, _, body) = get(&proxy, "/api/telemetry/current").await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body.contains("not configured"));
    proxy.stop().await;
}

#[tokio::test]
async fn unknown_paths_and_methods_are_rejected() {
    let (upstream, seen) = fake_upstream().await;
    let proxy = start_proxy(Some(format!("http://{upstream}"))).await;

    let (status, _, _) = get(&proxy, "/api/telemetry/everything").await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let response = reqwest::Client::new()
        .post(format!("http://{}/api/telemetry/current", proxy.local_addr()))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 405);
    assert!(seen.all().is_empty());

    proxy.stop().await;
}

#[tokio::test]
async fn unreachable_upstream_is_bad_gateway() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let dead = listener.local_addr().unwrap();
    drop(listener);

    let proxy = start_proxy(Some(format!("http://{dead}"))).await;
    let (status, content_type, body) = get(&proxy, "/api/telemetry/current").await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(content_type, "application/json");
    assert!(body.contains("upstream request failed"));
    proxy.stop().await;
}

#[tokio::test]
async fn slow_upstream_is_gateway_timeout() {
    let upstream = stalled_upstream().await;
    let proxy = start_proxy_with(Some(format!("http://{upstream}")), Duration::from_millis(200)).await;

    let started = Instant::now();
    let (status, content_type, body) = get(&proxy, &format!("/api/telemetry?{RANGE}")).await;
    assert_eq!(status, StatusCode::GATEWAY_TIMEOUT);
    assert_eq!(content_type, "application/json");
    let body: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert!(body["error"]
        .as_str()
        .unwrap()
        .starts_with("upstream request failed"));
    assert!(started.elapsed() < Duration::from_secs(5));

    proxy.stop().await;
}
