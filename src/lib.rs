//! Feature-gate introspection for Antrea components.
//!
//! The crate holds the compiled registry of feature gates, resolves the
//! effective state for a component role from its deployed configuration,
//! and serves the result as JSON over `GET /featuregates`.

pub mod config;
pub mod discovery;
pub mod handler;
#[cfg(feature = "net")]
pub mod net;
pub mod overrides;
pub mod registry;
pub mod resolver;
pub mod timeouts;

pub use config::{load_settings, ClusterApiSettings, ConfigError, Settings};
pub use discovery::{
    discover, ClusterApi, ClusterApiError, ConfigMap, DiscoveredConfig, DiscoveryCache,
    DiscoveryEnv, DiscoveryError, InMemoryClusterApi, Pod,
};
pub use handler::FeatureGatesHandler;
#[cfg(feature = "async-net")]
pub use net::{AsyncFeatureGatesHttpServer, AsyncFeatureGatesHttpServerHandle};
#[cfg(feature = "net")]
pub use net::{
    load_trust_store_from_pem, FeatureGatesHttpServer, FeatureGatesHttpServerConfig,
    FeatureGatesHttpServerHandle, HttpClusterApi, HttpClusterApiBuilder, NetError, TlsTrustStore,
};
pub use overrides::{extract_feature_gates, OverrideExtraction, SkipReason, SkippedOverride};
pub use registry::{
    ComponentRole, DefaultState, FeatureGateDefinition, FeatureGateRegistry,
    FeatureGateRegistryBuilder, Maturity, Platform, RegistryError,
};
pub use resolver::{resolve, unknown_overrides, GateStatus, OverrideMap, Response};
