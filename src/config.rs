//! Settings file for the `antrea-featuregates` process.
//!
//! Every field is optional; an absent file is equivalent to `Settings::default()`.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_BIND: &str = "0.0.0.0:10350";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read settings {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse settings {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("invalid bind address `{value}`")]
    InvalidBind { value: String },
    #[error("`{field}` must be greater than zero")]
    ZeroTimeout { field: &'static str },
    #[error("`{field}` must use an https URL (found `{value}`)")]
    InsecureServer { field: &'static str, value: String },
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    pub bind: Option<String>,
    pub max_connections: Option<usize>,
    pub request_timeout_secs: Option<u64>,
    /// Reuse a discovery result for this many seconds; capped at 60.
    pub cache_ttl_secs: Option<u64>,
    pub namespace: Option<String>,
    pub cluster_api: Option<ClusterApiSettings>,
}

/// Explicit API server connection. Without it the process uses the pod's
/// service-account mount.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ClusterApiSettings {
    pub server: String,
    pub ca_file: PathBuf,
    pub token_file: Option<PathBuf>,
    pub timeout_secs: Option<u64>,
}

impl Settings {
    /// Bind address, with `override_bind` (from the command line) taking
    /// precedence over the file.
    pub fn bind_addr(&self, override_bind: Option<&str>) -> Result<SocketAddr, ConfigError> {
        let value = override_bind
            .or(self.bind.as_deref())
            .unwrap_or(DEFAULT_BIND);
        value.parse().map_err(|_| ConfigError::InvalidBind {
            value: value.to_string(),
        })
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_secs.map(Duration::from_secs)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs.unwrap_or(0))
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if let Some(bind) = &self.bind {
            self.bind_addr(Some(bind))?;
        }
        if self.request_timeout_secs == Some(0) {
            return Err(ConfigError::ZeroTimeout {
                field: "request_timeout_secs",
            });
        }
        if let Some(api) = &self.cluster_api {
            if !api.server.starts_with("https://") {
                return Err(ConfigError::InsecureServer {
                    field: "cluster_api.server",
                    value: api.server.clone(),
                });
            }
            if api.timeout_secs == Some(0) {
                return Err(ConfigError::ZeroTimeout {
                    field: "cluster_api.timeout_secs",
                });
            }
        }
        Ok(())
    }
}

impl ClusterApiSettings {
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }
}

/// Loads settings from `path`, resolving relative file paths against the
/// directory containing it.
pub fn load_settings(path: &Path) -> Result<Settings, ConfigError> {
    let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let mut settings: Settings = if raw.trim().is_empty() {
        Settings::default()
    } else {
        serde_yaml::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?
    };
    let base = path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));
    if let Some(api) = settings.cluster_api.as_mut() {
        api.ca_file = resolve_relative(&base, &api.ca_file);
        if let Some(token) = api.token_file.take() {
            api.token_file = Some(resolve_relative(&base, &token));
        }
    }
    settings.validate()?;
    Ok(settings)
}

/// If `path` is relative, joins it to `base`; otherwise returns it unchanged.
pub fn resolve_relative(base: &Path, path: &Path) -> PathBuf {
    if path.is_relative() {
        base.join(path)
    } else {
        path.to_path_buf()
    }
}
