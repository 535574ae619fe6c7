#![cfg(feature = "net")]

use thiserror::Error;

pub mod cluster_api;
pub mod featuregates;
mod http;
mod server;
pub mod tls;

pub use cluster_api::{HttpClusterApi, HttpClusterApiBuilder};
#[cfg(feature = "async-net")]
pub use featuregates::{AsyncFeatureGatesHttpServer, AsyncFeatureGatesHttpServerHandle};
pub use featuregates::{
    FeatureGatesHttpServer, FeatureGatesHttpServerConfig, FeatureGatesHttpServerHandle,
};
pub use http::{read_request, SimpleHttpRequest};
pub use tls::{load_trust_store_from_pem, load_trust_store_from_pem_bytes, TlsTrustStore};

/// Errors emitted by the built-in networking helpers.
#[derive(Debug, Error)]
pub enum NetError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TLS error: {0}")]
    Tls(#[from] rustls::Error),
    #[error("certificate error: {0}")]
    Certificate(#[from] CertificateError),
    #[error("HTTP error: {0}")]
    Http(#[from] HttpError),
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),
    #[error("URL error: {0}")]
    Url(#[from] url::ParseError),
}

#[derive(Debug, Error)]
pub enum CertificateError {
    #[error("failed to read trust bundle")]
    TrustBundleRead,
    #[error("trust bundle is empty")]
    TrustBundleEmpty,
    #[error("trust bundle does not contain parsable certificates")]
    TrustBundleUnparsable,
    #[error("invalid server name `{host}` for certificate")]
    InvalidServerName { host: String },
}

#[derive(Debug, Error)]
pub enum HttpError {
    #[error("connection closed while reading headers")]
    ConnectionClosedBeforeHeaders,
    #[error("HTTP headers exceed limit")]
    HeadersTooLarge,
    #[error("partial HTTP request received")]
    PartialRequest,
    #[error("HTTP request timed out")]
    RequestTimeout,
    #[error("HTTP request parse error: {0:?}")]
    RequestParse(httparse::Error),
    #[error("HTTP method missing")]
    MissingMethod,
    #[error("HTTP path missing")]
    MissingPath,
    #[error("invalid header value for {name}")]
    InvalidHeaderValue { name: String },
    #[error("invalid Content-Length header value")]
    InvalidContentLengthValue,
    #[error("chunked request bodies are not accepted")]
    ChunkedRequestBody,
    #[error("HTTP body exceeds limit")]
    BodyTooLarge,
    #[error("connection closed before HTTP body completed")]
    ConnectionClosedBeforeBody,
    #[error("JSON serialization error: {0}")]
    JsonSerialize(#[from] serde_json::Error),
    #[error("HTTP response write timed out")]
    ResponseTimeout,
    #[error("cluster API requires https scheme (found {scheme})")]
    UnsupportedScheme { scheme: String },
    #[error("trust store not provided")]
    MissingTrustStore,
    #[error("cluster API URL missing host")]
    MissingHost,
    #[error("cluster API returned HTTP {status}")]
    UnexpectedStatus { status: u16 },
    #[error("invalid endpoint path: {0}")]
    InvalidEndpointPath(url::ParseError),
    #[error("endpoint path attempted to change host")]
    HostMismatch,
    #[error("failed to parse HTTP response")]
    ResponseParse,
    #[error("HTTP response missing status code")]
    MissingStatusCode,
    #[error("invalid Content-Length header")]
    InvalidContentLengthHeader,
    #[error("malformed chunked transfer coding")]
    InvalidChunk,
    #[error("truncated HTTP body")]
    TruncatedBody,
}

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("service lock poisoned ({context})")]
    Poisoned { context: &'static str },
    #[error("{context} server shutdown timed out")]
    ShutdownTimeout { context: &'static str },
}
