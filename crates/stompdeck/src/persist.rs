//! Client-side state that survives restarts.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::error::{DeckError, Result};
use crate::supervisor::PollMode;

const STATE_FILE: &str = "client-state.json";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientState {
    pub poll_mode: PollMode,
}

/// `<state_dir>/client-state.json`
#[derive(Debug, Clone)]
pub struct StateFile {
    path: PathBuf,
}

impl StateFile {
    pub fn new(state_dir: impl AsRef<Path>) -> Self {
        Self {
            path: state_dir.as_ref().join(STATE_FILE),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Missing or unreadable state yields the default.
    pub fn load(&self) -> ClientState {
        let contents = match fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "no saved client state");
                return ClientState::default();
            }
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "could not read client state");
                return ClientState::default();
            }
        };

        serde_json::from_str(&contents).unwrap_or_else(|e| {
            warn!(path = %self.path.display(), error = %e, "corrupt client state, using defaults");
            ClientState::default()
        })
    }

    /// Write via a staging file and rename so a crash never leaves a torn file.
    pub fn save(&self, state: &ClientState) -> Result<()> {
        let persist_err = |source| DeckError::Persist {
            path: self.path.clone(),
            source,
        };

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(persist_err)?;
        }

        let json = serde_json::to_string_pretty(state)
            .map_err(|e| persist_err(std::io::Error::other(e)))?;
        let staging = self.path.with_extension("json.tmp");
        fs::write(&staging, json).map_err(persist_err)?;
        fs::rename(&staging, &self.path).map_err(persist_err)?;

        debug!(path = %self.path.display(), mode = %state.poll_mode, "client state saved");
        Ok(())
    }
}
