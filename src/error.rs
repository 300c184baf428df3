//! Error types for traefik-dns.

use thiserror::Error;

/// Errors that can occur while configuring or running the DNS server.
#[derive(Debug, Error)]
pub enum DnsError {
    /// IO error (network, file, etc.)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP client construction error
    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// DNS protocol error
    #[error("DNS protocol error: {0}")]
    Proto(#[from] hickory_proto::ProtoError),

    /// Failed to parse address
    #[error("Invalid address: {0}")]
    InvalidAddress(String),
}

/// Errors returned by a [`RuleSource`](crate::source::RuleSource) fetch.
///
/// None of these are fatal: the reconciler logs them and retries on the
/// next tick while the existing mappings keep answering queries.
#[derive(Debug, Error)]
pub enum FetchError {
    /// The request never produced a response (connect, TLS, timeout).
    #[error("request to {url} failed: {source}")]
    Request {
        /// Endpoint that was queried.
        url: String,
        /// Underlying transport error.
        #[source]
        source: reqwest::Error,
    },

    /// The API answered with a non-success status.
    #[error("received {status} response from {url}{}", body_suffix(.body))]
    Status {
        /// Endpoint that was queried.
        url: String,
        /// HTTP status code.
        status: u16,
        /// Response body, possibly empty.
        body: String,
    },

    /// The response body was not a valid router list.
    #[error("failed to parse router list from {url}: {source}")]
    Decode {
        /// Endpoint that was queried.
        url: String,
        /// JSON decoding error.
        #[source]
        source: serde_json::Error,
    },
}

fn body_suffix(body: &str) -> String {
    if body.is_empty() {
        String::new()
    } else {
        format!(": {body}")
    }
}
