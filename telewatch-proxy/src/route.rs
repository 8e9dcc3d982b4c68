//! Request routing: maps an incoming proxy request to an upstream URL.
//!
//! Routing is pure so every rejection can be tested without a socket.

use hyper::{Method, StatusCode};
use telewatch_types::{Endpoint, END_PARAM, START_PARAM};
use url::{form_urlencoded, Url};

/// A request the proxy refuses to forward.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejection {
    pub status: StatusCode,
    pub message: String,
}

impl Rejection {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    /// JSON body `{"error": "<message>"}`.
    pub fn body(&self) -> String {
        error_body(&self.message)
    }
}

pub(crate) fn error_body(message: &str) -> String {
    serde_json::json!({ "error": message }).to_string()
}

/// Resolve the upstream URL for a request.
///
/// Checks, in order: known path (404), GET method (405), upstream configured
/// (500), and for ranged endpoints non-empty `start_time` and `end_time` (400).
/// Range values are forwarded exactly as received; any other query parameters
/// are dropped.
pub fn route(
    method: &Method,
    path: &str,
    query: Option<&str>,
    upstream: Option<&Url>,
) -> Result<Url, Rejection> {
    let endpoint = Endpoint::from_proxy_path(path)
        .ok_or_else(|| Rejection::new(StatusCode::NOT_FOUND, format!("no route for {path}")))?;

    if *method != Method::GET {
        return Err(Rejection::new(
            StatusCode::METHOD_NOT_ALLOWED,
            format!("{method} is not supported"),
        ));
    }

    let base = upstream.ok_or_else(|| {
        Rejection::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "upstream base URL is not configured",
        )
    })?;

    let mut target = base.join(endpoint.upstream_path()).map_err(|e| {
        Rejection::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("cannot build upstream URL: {e}"),
        )
    })?;

    if endpoint.requires_range() {
        let (start, end) = range_params(query.unwrap_or_default());
        match (start, end) {
            (Some(start), Some(end)) => {
                target
                    .query_pairs_mut()
                    .append_pair(START_PARAM, &start)
                    .append_pair(END_PARAM, &end);
            }
            _ => {
                return Err(Rejection::new(
                    StatusCode::BAD_REQUEST,
                    format!("`{START_PARAM}` and `{END_PARAM}` are required"),
                ))
            }
        }
    }

    Ok(target)
}

/// First non-empty value of each range parameter.
fn range_params(query: &str) -> (Option<String>, Option<String>) {
    let mut start = None;
    let mut end = None;
    for (key, value) in form_urlencoded::parse(query.as_bytes()) {
        if value.is_empty() {
            continue;
        }
        if key == START_PARAM && start.is_none() {
            start = Some(value.into_owned());
        } else if key == END_PARAM && end.is_none() {
            end = Some(value.into_owned());
        }
    }
    (start, end)
}
