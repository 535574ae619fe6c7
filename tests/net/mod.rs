#[cfg(feature = "net")]
#[path = "../common/http.rs"]
pub mod http_client;

#[cfg(feature = "net")]
#[path = "../common/net.rs"]
pub mod tls_support;

#[cfg(feature = "net")]
#[path = "../support/net/apiserver.rs"]
pub mod apiserver_support;

mod cluster_api_it;
mod featuregates_http;
