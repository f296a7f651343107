//! Client configuration.
//!
//! Layered resolution: built-in defaults, then an optional TOML file
//! (`<config dir>/parley/config.toml` unless overridden), then `PARLEY_*`
//! environment variables with `__` separating nested keys (for example
//! `PARLEY_CONNECTION__OUTBOUND_BUFFER=128`).

use std::path::{Path, PathBuf};

use config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};

use crate::error::ClientResult;

/// Environment variable prefix for overrides.
const ENV_PREFIX: &str = "PARLEY";

/// The agent backend's well-known endpoint.
pub const DEFAULT_AGENT_URL: &str = "ws://localhost:8000/ws";

/// Top-level client configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// WebSocket endpoint of the agent backend.
    pub agent_url: String,
    pub connection: ConnectionConfig,
    pub logging: LoggingConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            agent_url: DEFAULT_AGENT_URL.to_string(),
            connection: ConnectionConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

/// Tunables for the socket session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    /// Seconds to wait for the WebSocket handshake before giving up and
    /// closing the session. Unset waits indefinitely, which is what the
    /// wire protocol itself specifies.
    pub connect_timeout_secs: Option<u64>,

    /// Buffer size for queued outbound frames.
    pub outbound_buffer: usize,

    /// Buffer size for the transcript's appended-entry broadcast channel.
    pub event_buffer: usize,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: Some(30),
            outbound_buffer: 64,
            event_buffer: 256,
        }
    }
}

/// Logging defaults applied when `RUST_LOG` is not set.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default log level: off, error, warn, info, debug, or trace.
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl ClientConfig {
    /// Load configuration, layering file and environment over defaults.
    pub fn load(override_path: Option<&Path>) -> ClientResult<Self> {
        let mut builder = Config::builder();

        if let Some(path) = resolve_config_path(override_path) {
            builder = builder.add_source(
                File::from(path.as_path())
                    .format(FileFormat::Toml)
                    .required(false),
            );
        }

        let built = builder
            .add_source(Environment::with_prefix(ENV_PREFIX).separator("__"))
            .build()?;

        Ok(built.try_deserialize()?)
    }
}

/// The config file path that `load` will read: the override if given
/// (tilde-expanded), otherwise the per-user default location.
pub fn resolve_config_path(override_path: Option<&Path>) -> Option<PathBuf> {
    match override_path {
        Some(path) => Some(expand_path(path)),
        None => default_config_path(),
    }
}

/// Per-user default config file location.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("parley").join("config.toml"))
}

fn expand_path(path: &Path) -> PathBuf {
    let raw = path.to_string_lossy();
    PathBuf::from(shellexpand::tilde(raw.as_ref()).into_owned())
}
