//! Self-discovery of the running instance's feature-gate overrides.
//!
//! The instance locates its own configuration through the cluster object
//! graph: own pod -> config-map volume -> config map -> role entry. Every
//! lookup is a read-only call through the [`ClusterApi`] capability.

pub mod cache;
pub mod memory;
pub mod objects;

use crate::overrides::{extract_feature_gates, OverrideExtraction};
use crate::registry::ComponentRole;
use log::{debug, warn};
use std::env;
use thiserror::Error;

pub use cache::DiscoveryCache;
pub use memory::InMemoryClusterApi;
pub use objects::{ConfigMap, ConfigMapVolumeSource, ObjectKind, ObjectMeta, Pod, PodSpec, Volume};

pub const POD_NAME_ENV: &str = "POD_NAME";
pub const CONFIG_MAP_NAME_ENV: &str = "ANTREA_CONFIG_MAP_NAME";
pub const POD_NAMESPACE_ENV: &str = "POD_NAMESPACE";
pub const DEFAULT_NAMESPACE: &str = "kube-system";

const AGENT_POD_PREFIX: &str = "antrea-agent";
const OS_NODE_SELECTOR: &str = "kubernetes.io/os";

/// Read-only access to the orchestration API.
pub trait ClusterApi: Send + Sync {
    fn fetch_pod(&self, namespace: &str, name: &str) -> Result<Pod, ClusterApiError>;

    fn fetch_config_map(&self, namespace: &str, name: &str)
        -> Result<ConfigMap, ClusterApiError>;
}

#[derive(Debug, Error)]
pub enum ClusterApiError {
    #[error("{kind} {namespace}/{name} not found")]
    NotFound {
        kind: ObjectKind,
        namespace: String,
        name: String,
    },
    #[error("cluster API transport error: {details}")]
    Transport { details: String },
    #[error("failed to decode {kind} {namespace}/{name}: {details}")]
    Decode {
        kind: ObjectKind,
        namespace: String,
        name: String,
        details: String,
    },
}

#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("environment variable {name} is not set")]
    MissingEnv { name: &'static str },
    #[error("pod {namespace}/{name} not found")]
    PodNotFound { namespace: String, name: String },
    #[error("pod {pod} mounts no volume from config map {config_map}")]
    VolumeNotFound { pod: String, config_map: String },
    #[error("config map {namespace}/{name} not found")]
    ConfigMapNotFound { namespace: String, name: String },
    #[error("config map {config_map} has no entry {entry}")]
    EntryNotFound {
        config_map: String,
        entry: &'static str,
    },
    #[error(transparent)]
    ClusterApi(#[from] ClusterApiError),
}

/// Identity values handed to the process at start-up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveryEnv {
    pub pod_name: String,
    pub config_map_name: String,
    pub namespace: String,
}

impl DiscoveryEnv {
    pub fn new(pod_name: impl Into<String>, config_map_name: impl Into<String>) -> Self {
        Self {
            pod_name: pod_name.into(),
            config_map_name: config_map_name.into(),
            namespace: DEFAULT_NAMESPACE.to_string(),
        }
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    pub fn from_env() -> Result<Self, DiscoveryError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, DiscoveryError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |name: &'static str| {
            lookup(name)
                .filter(|value| !value.trim().is_empty())
                .ok_or(DiscoveryError::MissingEnv { name })
        };
        let pod_name = required(POD_NAME_ENV)?;
        let config_map_name = required(CONFIG_MAP_NAME_ENV)?;
        let namespace = lookup(POD_NAMESPACE_ENV)
            .filter(|value| !value.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_NAMESPACE.to_string());
        Ok(Self {
            pod_name,
            config_map_name,
            namespace,
        })
    }
}

/// Outcome of one discovery pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredConfig {
    pub role: ComponentRole,
    pub extraction: OverrideExtraction,
}

/// Role served by the process owning `pod`.
pub fn role_for_pod(pod: &Pod) -> ComponentRole {
    if !pod.metadata.name.starts_with(AGENT_POD_PREFIX) {
        return ComponentRole::Controller;
    }
    let windows = pod
        .spec
        .node_selector
        .get(OS_NODE_SELECTOR)
        .map(|os| os.eq_ignore_ascii_case("windows"))
        .unwrap_or(false);
    if windows {
        ComponentRole::AgentWindows
    } else {
        ComponentRole::Agent
    }
}

pub fn discover(
    api: &dyn ClusterApi,
    env: &DiscoveryEnv,
) -> Result<DiscoveredConfig, DiscoveryError> {
    let pod = api
        .fetch_pod(&env.namespace, &env.pod_name)
        .map_err(|err| match err {
            ClusterApiError::NotFound { namespace, name, .. } => {
                DiscoveryError::PodNotFound { namespace, name }
            }
            other => DiscoveryError::from(other),
        })?;
    let volume = pod.config_map_volume(&env.config_map_name).ok_or_else(|| {
        DiscoveryError::VolumeNotFound {
            pod: env.pod_name.clone(),
            config_map: env.config_map_name.clone(),
        }
    })?;
    debug!(
        "event=featuregates_volume_found pod={} volume={} config_map={}",
        env.pod_name, volume.name, env.config_map_name
    );
    let role = role_for_pod(&pod);
    let config_map = api
        .fetch_config_map(&env.namespace, &env.config_map_name)
        .map_err(|err| match err {
            ClusterApiError::NotFound { namespace, name, .. } => {
                DiscoveryError::ConfigMapNotFound { namespace, name }
            }
            other => DiscoveryError::from(other),
        })?;
    let entry_key = role.config_entry();
    let entry = config_map
        .entry(entry_key)
        .ok_or_else(|| DiscoveryError::EntryNotFound {
            config_map: env.config_map_name.clone(),
            entry: entry_key,
        })?;
    let extraction = extract_feature_gates(entry);
    for skipped in &extraction.skipped {
        warn!(
            "event=featuregates_override_skipped config_map={} entry={} reason={} text={:?}",
            env.config_map_name,
            entry_key,
            skipped.reason.as_str(),
            skipped.text
        );
    }
    debug!(
        "event=featuregates_discovered pod={} role={} overrides={}",
        env.pod_name,
        role,
        extraction.overrides.len()
    );
    Ok(DiscoveredConfig { role, extraction })
}
