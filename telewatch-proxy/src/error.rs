//! Error types for the proxy.

use thiserror::Error;

/// Errors that stop the proxy from starting.
#[derive(Debug, Error)]
pub enum ProxyError {
    /// The listen address did not parse.
    #[error("invalid listen address {addr}: {source}")]
    InvalidListenAddr {
        addr: String,
        #[source]
        source: std::net::AddrParseError,
    },

    /// The upstream base URL is set but unparsable.
    #[error("invalid upstream base URL {url}: {reason}")]
    InvalidBaseUrl { url: String, reason: String },

    /// The HTTP client could not be built.
    #[error("failed to build HTTP client: {0}")]
    Client(String),

    /// I/O error binding or accepting.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
