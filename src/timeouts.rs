//! Centralized timeout and shutdown policies.
//!
//! Keeping these values in one place makes it clear which parts of the
//! system share behaviour (HTTP deadlines, cluster-API calls, graceful
//! shutdown windows).

use std::time::Duration;

/// Maximum time a feature-gate report request is allowed to run, cluster-API
/// round trips included.
pub const FEATURE_GATES_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
/// Socket timeout for a single cluster-API call.
pub const CLUSTER_API_TIMEOUT: Duration = Duration::from_secs(5);
/// Grace period granted to blocking servers when asked to shut down.
pub const SERVER_SHUTDOWN_GRACE: Duration = Duration::from_secs(5);
/// Upper bound on how stale a cached discovery result may be.
pub const MAX_DISCOVERY_CACHE_TTL: Duration = Duration::from_secs(60);
