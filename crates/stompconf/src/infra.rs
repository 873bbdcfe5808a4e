//! Infrastructure configuration - where the engine lives and where we keep state.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// The effects engine's HTTP gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Base URL of the engine gateway.
    /// Default: http://127.0.0.1:3000
    #[serde(default = "EngineConfig::default_url")]
    pub url: String,

    /// Per-request timeout in milliseconds.
    /// Default: 3000
    #[serde(default = "EngineConfig::default_timeout_ms")]
    pub timeout_ms: u64,
}

impl EngineConfig {
    fn default_url() -> String {
        "http://127.0.0.1:3000".to_string()
    }

    fn default_timeout_ms() -> u64 {
        3_000
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            url: Self::default_url(),
            timeout_ms: Self::default_timeout_ms(),
        }
    }
}

/// Filesystem paths for client-side state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Directory holding the persisted client state (last poll mode).
    /// Default: ~/.local/share/stompdeck
    #[serde(default = "PathsConfig::default_state_dir")]
    pub state_dir: PathBuf,
}

impl PathsConfig {
    fn default_state_dir() -> PathBuf {
        directories::BaseDirs::new()
            .map(|dirs| dirs.home_dir().join(".local/share/stompdeck"))
            .unwrap_or_else(|| PathBuf::from(".local/share/stompdeck"))
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            state_dir: Self::default_state_dir(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// Log level or `EnvFilter` directive string.
    /// Default: info
    #[serde(default = "TelemetryConfig::default_log_level")]
    pub log_level: String,
}

impl TelemetryConfig {
    fn default_log_level() -> String {
        "info".to_string()
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: Self::default_log_level(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InfraConfig {
    #[serde(default)]
    pub engine: EngineConfig,

    #[serde(default)]
    pub paths: PathsConfig,

    #[serde(default)]
    pub telemetry: TelemetryConfig,
}
