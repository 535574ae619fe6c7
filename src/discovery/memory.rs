use super::objects::{ConfigMap, ObjectKind, Pod};
use super::{ClusterApi, ClusterApiError};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Fixed set of cluster objects served from memory.
///
/// Useful wherever a real API server is not available; an instance built
/// with [`InMemoryClusterApi::unreachable`] fails every call with a
/// transport error instead.
#[derive(Debug, Default)]
pub struct InMemoryClusterApi {
    pods: BTreeMap<(String, String), Pod>,
    config_maps: BTreeMap<(String, String), ConfigMap>,
    unreachable: Option<String>,
    calls: AtomicUsize,
}

impl InMemoryClusterApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn unreachable(details: impl Into<String>) -> Self {
        Self {
            unreachable: Some(details.into()),
            ..Self::default()
        }
    }

    pub fn with_pod(mut self, pod: Pod) -> Self {
        let key = (pod.metadata.namespace.clone(), pod.metadata.name.clone());
        self.pods.insert(key, pod);
        self
    }

    pub fn with_config_map(mut self, config_map: ConfigMap) -> Self {
        let key = (
            config_map.metadata.namespace.clone(),
            config_map.metadata.name.clone(),
        );
        self.config_maps.insert(key, config_map);
        self
    }

    /// Number of fetches served so far, failed ones included.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::Relaxed)
    }

    fn check_reachable(&self) -> Result<(), ClusterApiError> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        match &self.unreachable {
            Some(details) => Err(ClusterApiError::Transport {
                details: details.clone(),
            }),
            None => Ok(()),
        }
    }
}

impl ClusterApi for InMemoryClusterApi {
    fn fetch_pod(&self, namespace: &str, name: &str) -> Result<Pod, ClusterApiError> {
        self.check_reachable()?;
        self.pods
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
            .ok_or_else(|| not_found(ObjectKind::Pod, namespace, name))
    }

    fn fetch_config_map(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<ConfigMap, ClusterApiError> {
        self.check_reachable()?;
        self.config_maps
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
            .ok_or_else(|| not_found(ObjectKind::ConfigMap, namespace, name))
    }
}

fn not_found(kind: ObjectKind, namespace: &str, name: &str) -> ClusterApiError {
    ClusterApiError::NotFound {
        kind,
        namespace: namespace.to_string(),
        name: name.to_string(),
    }
}
