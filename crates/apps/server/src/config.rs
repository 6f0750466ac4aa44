//! Environment configuration.
//!
//! | Variable | Default |
//! |---|---|
//! | `PLAYMAP_ADDR` | `127.0.0.1:9200` |
//! | `PLAYMAP_BACKEND_URL` | unset: serve `PLAYMAP_DEMO_FILE` from memory |
//! | `PLAYMAP_DEMO_FILE` | unset: start with no facilities |
//! | `PLAYMAP_HTTP_TIMEOUT_MS` | `5000` |
//! | `PLAYMAP_JOIN_TIMEOUT_MS` | `10000` |
//! | `PLAYMAP_MAX_FACILITIES` | unset: no fan-out cap |
//! | `PLAYMAP_CLUSTER_RADIUS_PX` | `44` |

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use streaming::SessionConfig;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid PLAYMAP_ADDR {value:?}: {source}")]
    Addr {
        value: String,
        source: std::net::AddrParseError,
    },
}

/// Where facility data comes from.
#[derive(Debug, Clone, PartialEq)]
pub enum SourceConfig {
    Backend { base_url: String, http_timeout: Duration },
    Demo { file: Option<PathBuf> },
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub addr: SocketAddr,
    pub source: SourceConfig,
    pub session: SessionConfig,
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let raw_addr = lookup("PLAYMAP_ADDR").unwrap_or_else(|| "127.0.0.1:9200".to_string());
        let addr = raw_addr.parse().map_err(|source| ConfigError::Addr {
            value: raw_addr.clone(),
            source,
        })?;

        let source = match lookup("PLAYMAP_BACKEND_URL").filter(|v| !v.trim().is_empty()) {
            Some(base_url) => SourceConfig::Backend {
                base_url,
                http_timeout: Duration::from_millis(env_var_u64(
                    &lookup,
                    "PLAYMAP_HTTP_TIMEOUT_MS",
                    5_000,
                )),
            },
            None => SourceConfig::Demo {
                file: lookup("PLAYMAP_DEMO_FILE").map(PathBuf::from),
            },
        };

        let mut session = SessionConfig::default();
        session.coordinator.join_timeout =
            Duration::from_millis(env_var_u64(&lookup, "PLAYMAP_JOIN_TIMEOUT_MS", 10_000));
        session.coordinator.max_facilities = env_var_usize(&lookup, "PLAYMAP_MAX_FACILITIES");
        session.cluster.radius_px =
            env_var_f64(&lookup, "PLAYMAP_CLUSTER_RADIUS_PX", 44.0).max(0.0) as f32;

        Ok(Self {
            addr,
            source,
            session,
        })
    }
}

fn env_var_u64(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: u64) -> u64 {
    lookup(key).and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_var_usize(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<usize> {
    lookup(key).and_then(|v| v.trim().parse().ok())
}

fn env_var_f64(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: f64) -> f64 {
    lookup(key)
        .and_then(|v| v.parse::<f64>().ok())
        .filter(|v| v.is_finite())
        .unwrap_or(default)
}
