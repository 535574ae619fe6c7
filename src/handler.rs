use crate::discovery::{
    discover, ClusterApi, DiscoveredConfig, DiscoveryCache, DiscoveryEnv, DiscoveryError,
};
use crate::registry::FeatureGateRegistry;
use crate::resolver::{resolve, unknown_overrides, Response};
use log::debug;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Answers feature-gate status queries for the running instance.
///
/// Holds only immutable collaborators (plus the optional discovery cache),
/// so one handler is shared by every concurrent request.
pub struct FeatureGatesHandler {
    registry: Arc<FeatureGateRegistry>,
    api: Arc<dyn ClusterApi>,
    env: DiscoveryEnv,
    cache: Option<DiscoveryCache>,
}

impl FeatureGatesHandler {
    pub fn new(
        registry: Arc<FeatureGateRegistry>,
        api: Arc<dyn ClusterApi>,
        env: DiscoveryEnv,
    ) -> Self {
        Self {
            registry,
            api,
            env,
            cache: None,
        }
    }

    /// Reuses a discovery result for up to `ttl`; zero disables caching.
    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache = if ttl.is_zero() {
            None
        } else {
            Some(DiscoveryCache::new(ttl))
        };
        self
    }

    pub fn registry(&self) -> &FeatureGateRegistry {
        &self.registry
    }

    pub fn env(&self) -> &DiscoveryEnv {
        &self.env
    }

    /// Discovers overrides and resolves the report. Any discovery failure is
    /// returned as-is; no partial report is produced.
    pub fn report(&self) -> Result<Vec<Response>, DiscoveryError> {
        let discovered = self.discover(Instant::now())?;
        let overrides = &discovered.extraction.overrides;
        let ignored = unknown_overrides(&self.registry, discovered.role, overrides);
        if !ignored.is_empty() {
            debug!(
                "event=featuregates_unknown_overrides role={} names={}",
                discovered.role,
                ignored.join(",")
            );
        }
        Ok(resolve(&self.registry, discovered.role, overrides))
    }

    fn discover(&self, now: Instant) -> Result<DiscoveredConfig, DiscoveryError> {
        match &self.cache {
            Some(cache) => cache.get_or_discover(now, || discover(self.api.as_ref(), &self.env)),
            None => discover(self.api.as_ref(), &self.env),
        }
    }
}
