//! Client-side state for engine stages that never appear in the dump.
//!
//! The input-gain and master-volume stages live in the engine, but the
//! program dump says nothing about them. Their displayed values are seeded
//! once from metadata defaults and afterwards change only through user
//! actions.

use std::str::FromStr;
use std::sync::{Mutex, PoisonError};
use stompconf::ShadowConfig;
use stompproto::ConfigDump;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShadowStage {
    Input,
    Master,
}

impl ShadowStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            ShadowStage::Input => "input",
            ShadowStage::Master => "master",
        }
    }
}

impl std::fmt::Display for ShadowStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ShadowStage {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "input" => Ok(ShadowStage::Input),
            "master" => Ok(ShadowStage::Master),
            other => Err(format!("unknown stage: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StageState {
    pub value: f64,
    pub muted: bool,
    /// Value to restore on unmute.
    pub last_value: Option<f64>,
}

impl Default for StageState {
    fn default() -> Self {
        Self {
            value: 0.0,
            muted: false,
            last_value: None,
        }
    }
}

/// Before and after of one shadow mutation, for rollback.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShadowChange {
    pub stage: ShadowStage,
    pub previous: StageState,
    pub current: StageState,
}

#[derive(Debug, Default)]
struct Stages {
    seeded: bool,
    input: StageState,
    master: StageState,
}

impl Stages {
    fn get_mut(&mut self, stage: ShadowStage) -> &mut StageState {
        match stage {
            ShadowStage::Input => &mut self.input,
            ShadowStage::Master => &mut self.master,
        }
    }
}

pub struct ShadowStore {
    config: ShadowConfig,
    stages: Mutex<Stages>,
}

impl ShadowStore {
    pub fn new(config: ShadowConfig) -> Self {
        Self {
            config,
            stages: Mutex::new(Stages::default()),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Stages> {
        self.stages.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// The (plugin, param) the stage maps to in the engine.
    pub fn identity(&self, stage: ShadowStage) -> (&str, &str) {
        match stage {
            ShadowStage::Input => (&self.config.input_plugin, &self.config.input_param),
            ShadowStage::Master => (&self.config.master_plugin, &self.config.master_param),
        }
    }

    /// Seed both stages from metadata defaults. Only the first call has any
    /// effect; returns whether this call seeded.
    pub fn seed_from(&self, config: &ConfigDump) -> bool {
        let defaults = [ShadowStage::Input, ShadowStage::Master].map(|stage| {
            let (plugin, param) = self.identity(stage);
            config
                .param_meta(plugin, param)
                .and_then(|m| m.default)
                .unwrap_or(0.0)
        });

        let mut stages = self.lock();
        if stages.seeded {
            return false;
        }
        stages.input = StageState {
            value: defaults[0],
            ..StageState::default()
        };
        stages.master = StageState {
            value: defaults[1],
            ..StageState::default()
        };
        stages.seeded = true;
        true
    }

    pub fn is_seeded(&self) -> bool {
        self.lock().seeded
    }

    pub fn get(&self, stage: ShadowStage) -> StageState {
        *self.lock().get_mut(stage)
    }

    /// Flip mute. Muting remembers the current value and drops to `floor`
    /// (the metadata minimum, or the configured fallback when there is none).
    /// Unmuting restores the remembered value, or 0.0.
    pub fn toggle_mute(&self, stage: ShadowStage, meta_min: Option<f64>) -> ShadowChange {
        let floor = meta_min
            .filter(|m| m.is_finite())
            .unwrap_or(self.config.mute_floor);

        let mut stages = self.lock();
        let state = stages.get_mut(stage);
        let previous = *state;

        *state = if previous.muted {
            StageState {
                value: previous.last_value.unwrap_or(0.0),
                muted: false,
                last_value: None,
            }
        } else {
            StageState {
                value: floor,
                muted: true,
                last_value: Some(previous.value),
            }
        };

        ShadowChange {
            stage,
            previous,
            current: *state,
        }
    }

    /// Fader drag. Sets the value and clears any mute.
    pub fn set_value(&self, stage: ShadowStage, value: f64) -> ShadowChange {
        let mut stages = self.lock();
        let state = stages.get_mut(stage);
        let previous = *state;
        *state = StageState {
            value,
            muted: false,
            last_value: None,
        };
        ShadowChange {
            stage,
            previous,
            current: *state,
        }
    }

    /// Undo a change whose engine write failed.
    /// Undo `change` if nothing has been layered on top of it since.
    /// Returns whether the stage was restored.
    pub fn rollback(&self, change: &ShadowChange) -> bool {
        let mut stages = self.lock();
        let state = stages.get_mut(change.stage);
        if *state != change.current {
            return false;
        }
        *state = change.previous;
        true
    }
}
