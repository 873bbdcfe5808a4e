//! Layered configuration loading for stompdeck.
//!
//! Configuration is split into two categories:
//!
//! - **Infrastructure** (`InfraConfig`): where the engine lives, where client
//!   state is persisted, how loudly to log.
//!
//! - **Tuning** (`TuningConfig`): poll intervals, confirmation budgets and
//!   the shadow-stage identities. These shape the reconciliation engine but
//!   never change what the engine itself holds.
//!
//! # Usage
//!
//! ```rust,no_run
//! use stompconf::StompConfig;
//!
//! let config = StompConfig::load().expect("Failed to load config");
//!
//! println!("Engine: {}", config.infra.engine.url);
//! println!("Preset watch: {}ms", config.tuning.polling.preset_watch_interval_ms);
//! ```
//!
//! # Config File Locations
//!
//! Files are loaded in order (later wins):
//! 1. `/etc/stompdeck/config.toml` (system)
//! 2. `~/.config/stompdeck/config.toml` (user)
//! 3. `./stompdeck.toml` (local override, or the `--config` path)
//! 4. Environment variables (`STOMPDECK_*`)
//!
//! # Example Config
//!
//! ```toml
//! [engine]
//! url = "http://pedal.local:3000"
//! timeout_ms = 3000
//!
//! [paths]
//! state_dir = "~/.local/share/stompdeck"
//!
//! [telemetry]
//! log_level = "info"
//!
//! [polling]
//! status_interval_ms = 750
//! preset_watch_interval_ms = 300
//!
//! [reconcile]
//! preset_attempts = 10
//! preset_interval_ms = 150
//! param_attempts = 12
//! param_interval_ms = 120
//!
//! [shadow]
//! input_plugin = "Input"
//! input_param = "Gain"
//! master_plugin = "Master"
//! master_param = "Volume"
//! mute_floor = -60.0
//! ```

pub mod infra;
pub mod loader;
pub mod tuning;

pub use infra::{EngineConfig, InfraConfig, PathsConfig, TelemetryConfig};
pub use loader::{discover_config_files_with_override, ConfigSources};
pub use tuning::{PollingConfig, ReconcileConfig, ShadowConfig, TuningConfig};

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// Configuration loading errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {message}")]
    Parse { path: PathBuf, message: String },
}

/// Complete stompdeck configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct StompConfig {
    #[serde(flatten)]
    pub infra: InfraConfig,

    #[serde(flatten)]
    pub tuning: TuningConfig,
}

impl StompConfig {
    /// Load configuration from all sources.
    pub fn load() -> Result<Self, ConfigError> {
        let (config, _sources) = Self::load_with_sources_from(None)?;
        Ok(config)
    }

    /// Load configuration from a specific file path, then apply env overrides.
    ///
    /// If `config_path` is provided, it takes precedence over the local
    /// `./stompdeck.toml` override. System and user configs still load first.
    pub fn load_from(config_path: Option<&std::path::Path>) -> Result<Self, ConfigError> {
        let (config, _sources) = Self::load_with_sources_from(config_path)?;
        Ok(config)
    }

    /// Load configuration from optional path and return information about sources.
    pub fn load_with_sources_from(
        config_path: Option<&std::path::Path>,
    ) -> Result<(Self, ConfigSources), ConfigError> {
        let mut sources = ConfigSources::default();
        let mut config = StompConfig::default();

        for path in loader::discover_config_files_with_override(config_path) {
            loader::apply_file(&mut config, &path)?;
            sources.files.push(path);
        }

        loader::apply_env_overrides(&mut config, &mut sources, |key| std::env::var(key).ok());

        Ok((config, sources))
    }

    /// Render the effective config as TOML.
    pub fn to_toml(&self) -> String {
        let mut output = String::new();

        output.push_str("# stompdeck configuration\n\n");

        output.push_str("[engine]\n");
        output.push_str(&format!("url = \"{}\"\n", self.infra.engine.url));
        output.push_str(&format!("timeout_ms = {}\n", self.infra.engine.timeout_ms));

        output.push_str("\n[paths]\n");
        output.push_str(&format!(
            "state_dir = \"{}\"\n",
            self.infra.paths.state_dir.display()
        ));

        output.push_str("\n[telemetry]\n");
        output.push_str(&format!(
            "log_level = \"{}\"\n",
            self.infra.telemetry.log_level
        ));

        let polling = &self.tuning.polling;
        output.push_str("\n[polling]\n");
        output.push_str(&format!("status_interval_ms = {}\n", polling.status_interval_ms));
        output.push_str(&format!(
            "preset_watch_interval_ms = {}\n",
            polling.preset_watch_interval_ms
        ));

        let reconcile = &self.tuning.reconcile;
        output.push_str("\n[reconcile]\n");
        output.push_str(&format!("preset_attempts = {}\n", reconcile.preset_attempts));
        output.push_str(&format!("preset_interval_ms = {}\n", reconcile.preset_interval_ms));
        output.push_str(&format!("param_attempts = {}\n", reconcile.param_attempts));
        output.push_str(&format!("param_interval_ms = {}\n", reconcile.param_interval_ms));

        let shadow = &self.tuning.shadow;
        output.push_str("\n[shadow]\n");
        output.push_str(&format!("input_plugin = \"{}\"\n", shadow.input_plugin));
        output.push_str(&format!("input_param = \"{}\"\n", shadow.input_param));
        output.push_str(&format!("master_plugin = \"{}\"\n", shadow.master_plugin));
        output.push_str(&format!("master_param = \"{}\"\n", shadow.master_param));
        output.push_str(&format!("mute_floor = {:?}\n", shadow.mute_floor));

        output
    }
}
