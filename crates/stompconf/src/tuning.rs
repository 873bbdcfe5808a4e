//! Reconciliation tuning - poll cadence, confirmation budgets, shadow stages.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Background poll cadence used while the client is in live mode.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollingConfig {
    /// Status strip poll interval.
    /// Default: 750
    #[serde(default = "PollingConfig::default_status_interval_ms")]
    pub status_interval_ms: u64,

    /// Current-preset watch interval. Faster than the status poll so hardware
    /// preset switches show up promptly.
    /// Default: 300
    #[serde(default = "PollingConfig::default_preset_watch_interval_ms")]
    pub preset_watch_interval_ms: u64,
}

impl PollingConfig {
    fn default_status_interval_ms() -> u64 {
        750
    }

    fn default_preset_watch_interval_ms() -> u64 {
        300
    }

    pub fn status_interval(&self) -> Duration {
        Duration::from_millis(self.status_interval_ms)
    }

    pub fn preset_watch_interval(&self) -> Duration {
        Duration::from_millis(self.preset_watch_interval_ms)
    }
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            status_interval_ms: Self::default_status_interval_ms(),
            preset_watch_interval_ms: Self::default_preset_watch_interval_ms(),
        }
    }
}

/// Attempt budgets for post-write confirmation polling.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconcileConfig {
    #[serde(default = "ReconcileConfig::default_preset_attempts")]
    pub preset_attempts: u32,

    #[serde(default = "ReconcileConfig::default_preset_interval_ms")]
    pub preset_interval_ms: u64,

    #[serde(default = "ReconcileConfig::default_param_attempts")]
    pub param_attempts: u32,

    #[serde(default = "ReconcileConfig::default_param_interval_ms")]
    pub param_interval_ms: u64,
}

impl ReconcileConfig {
    fn default_preset_attempts() -> u32 {
        10
    }

    fn default_preset_interval_ms() -> u64 {
        150
    }

    fn default_param_attempts() -> u32 {
        12
    }

    fn default_param_interval_ms() -> u64 {
        120
    }
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            preset_attempts: Self::default_preset_attempts(),
            preset_interval_ms: Self::default_preset_interval_ms(),
            param_attempts: Self::default_param_attempts(),
            param_interval_ms: Self::default_param_interval_ms(),
        }
    }
}

/// Identities of the engine stages that never appear in the program dump.
///
/// The plugin/param pairs are used both for metadata lookup (defaults,
/// minimum) and as the write target when the user moves the fader.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShadowConfig {
    #[serde(default = "ShadowConfig::default_input_plugin")]
    pub input_plugin: String,

    #[serde(default = "ShadowConfig::default_input_param")]
    pub input_param: String,

    #[serde(default = "ShadowConfig::default_master_plugin")]
    pub master_plugin: String,

    #[serde(default = "ShadowConfig::default_master_param")]
    pub master_param: String,

    /// Value forced on mute when the metadata publishes no minimum.
    /// Default: -60.0
    #[serde(default = "ShadowConfig::default_mute_floor")]
    pub mute_floor: f64,
}

impl ShadowConfig {
    fn default_input_plugin() -> String {
        "Input".to_string()
    }

    fn default_input_param() -> String {
        "Gain".to_string()
    }

    fn default_master_plugin() -> String {
        "Master".to_string()
    }

    fn default_master_param() -> String {
        "Volume".to_string()
    }

    fn default_mute_floor() -> f64 {
        -60.0
    }
}

impl Default for ShadowConfig {
    fn default() -> Self {
        Self {
            input_plugin: Self::default_input_plugin(),
            input_param: Self::default_input_param(),
            master_plugin: Self::default_master_plugin(),
            master_param: Self::default_master_param(),
            mute_floor: Self::default_mute_floor(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TuningConfig {
    #[serde(default)]
    pub polling: PollingConfig,

    #[serde(default)]
    pub reconcile: ReconcileConfig,

    #[serde(default)]
    pub shadow: ShadowConfig,
}
