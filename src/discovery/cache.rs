use super::{DiscoveredConfig, DiscoveryError};
use crate::timeouts::MAX_DISCOVERY_CACHE_TTL;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Short-lived memo of the last successful discovery.
///
/// Entries are served for at most `ttl` (capped at
/// [`MAX_DISCOVERY_CACHE_TTL`]); failures are never stored, so a broken
/// configuration is reported on the very next request.
#[derive(Debug)]
pub struct DiscoveryCache {
    ttl: Duration,
    entry: Mutex<Option<CachedDiscovery>>,
}

#[derive(Debug, Clone)]
struct CachedDiscovery {
    stored_at: Instant,
    config: DiscoveredConfig,
}

impl DiscoveryCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl: ttl.min(MAX_DISCOVERY_CACHE_TTL),
            entry: Mutex::new(None),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn get_or_discover<F>(
        &self,
        now: Instant,
        discover: F,
    ) -> Result<DiscoveredConfig, DiscoveryError>
    where
        F: FnOnce() -> Result<DiscoveredConfig, DiscoveryError>,
    {
        if let Some(config) = self.fresh(now) {
            return Ok(config);
        }
        let config = discover()?;
        let mut guard = match self.entry.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *guard = Some(CachedDiscovery {
            stored_at: now,
            config: config.clone(),
        });
        Ok(config)
    }

    fn fresh(&self, now: Instant) -> Option<DiscoveredConfig> {
        let guard = match self.entry.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        guard
            .as_ref()
            .filter(|cached| now.saturating_duration_since(cached.stored_at) < self.ttl)
            .map(|cached| cached.config.clone())
    }
}
