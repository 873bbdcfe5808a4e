//! User actions against the engine.
//!
//! Every action follows the same shape: validate locally, write, then
//! reconcile by re-reading the engine. A failed write surfaces to the caller
//! of that one action, sets the passive status to `Error`, and rolls back any
//! optimistic local state. Nothing here retries on its own.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use stompconf::StompConfig;
use stompproto::value::{clamp_to_meta, format_param_value, is_on, parse_user_number};
use stompproto::ParamKind;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::coalescer::{DrainError, ParamSink, WriteCoalescer};
use crate::confirm::{confirm_until, param_equals, preset_is, ConfirmBudget, Confirmation};
use crate::error::{DeckError, Result};
use crate::persist::{ClientState, StateFile};
use crate::shadow::{ShadowChange, ShadowStage, ShadowStore, StageState};
use crate::store::{RefreshOutcome, Snapshot, StateStore, UpdateOrigin};
use crate::supervisor::{PollMode, StatusStrip, Supervisor};
use crate::transport::{HttpTransport, Transport};

/// Placeholder entry shown at the top of a preset picker.
const PRESET_PLACEHOLDER: &str = "---";
const MAX_PRESET_NAME: usize = 200;

/// Passive status line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeckStatus {
    Idle,
    Ok,
    Loading,
    /// The load was accepted but the engine never reported the new preset
    /// within the confirmation budget.
    LoadedUnconfirmed,
    Error(String),
}

impl std::fmt::Display for DeckStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeckStatus::Idle => write!(f, "idle"),
            DeckStatus::Ok => write!(f, "ok"),
            DeckStatus::Loading => write!(f, "loading"),
            DeckStatus::LoadedUnconfirmed => write!(f, "loaded (unconfirmed)"),
            DeckStatus::Error(msg) => write!(f, "error: {msg}"),
        }
    }
}

/// Per-control interaction state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ControlState {
    #[default]
    Idle,
    /// A write is in flight; the control shows `optimistic` until it settles.
    Busy { optimistic: bool },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveDirection {
    Up,
    Down,
}

type ParamChannel = (String, String);

pub struct Deck {
    transport: Arc<dyn Transport>,
    store: Arc<StateStore>,
    shadow: Arc<ShadowStore>,
    supervisor: Supervisor,
    params: Mutex<HashMap<ParamChannel, Arc<WriteCoalescer<f64>>>>,
    toggles: Mutex<HashMap<String, ControlState>>,
    status: watch::Sender<DeckStatus>,
    preset_budget: ConfirmBudget,
    param_budget: ConfirmBudget,
    state_file: StateFile,
}

/// Returns a toggle to idle when the action ends, however it ends.
struct ToggleGuard<'a> {
    toggles: &'a Mutex<HashMap<String, ControlState>>,
    plugin: String,
}

impl Drop for ToggleGuard<'_> {
    fn drop(&mut self) {
        lock(self.toggles).remove(&self.plugin);
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Deck {
    pub fn new(transport: Arc<dyn Transport>, config: &StompConfig) -> Self {
        let shadow = Arc::new(ShadowStore::new(config.tuning.shadow.clone()));
        let store = Arc::new(StateStore::new(transport.clone(), shadow.clone()));
        let supervisor = Supervisor::new(
            transport.clone(),
            store.clone(),
            config.tuning.polling.clone(),
        );
        let (status, _) = watch::channel(DeckStatus::Idle);

        Self {
            transport,
            store,
            shadow,
            supervisor,
            params: Mutex::new(HashMap::new()),
            toggles: Mutex::new(HashMap::new()),
            status,
            preset_budget: ConfirmBudget::preset(&config.tuning.reconcile),
            param_budget: ConfirmBudget::param(&config.tuning.reconcile),
            state_file: StateFile::new(&config.infra.paths.state_dir),
        }
    }

    /// Deck talking HTTP to the configured engine.
    pub fn from_config(config: &StompConfig) -> Result<Self> {
        let transport = HttpTransport::from_config(&config.infra.engine)?;
        Ok(Self::new(Arc::new(transport), config))
    }

    /// Restore the persisted poll mode and load the initial state.
    pub async fn start(&self) -> Result<PollMode> {
        let mode = self.state_file.load().poll_mode;
        debug!(%mode, "restoring poll mode");
        self.supervisor.set_mode(mode).await;
        self.refresh(UpdateOrigin::Programmatic).await?;
        Ok(mode)
    }

    pub fn shutdown(&self) {
        self.supervisor.shutdown();
    }

    // --- observation ---

    pub fn status(&self) -> DeckStatus {
        self.status.borrow().clone()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<DeckStatus> {
        self.status.subscribe()
    }

    pub fn snapshot(&self) -> Arc<Snapshot> {
        self.store.snapshot()
    }

    pub fn subscribe(&self) -> watch::Receiver<Arc<Snapshot>> {
        self.store.subscribe()
    }

    pub fn status_strip(&self) -> watch::Receiver<Option<StatusStrip>> {
        self.supervisor.subscribe_status()
    }

    pub fn supervisor(&self) -> &Supervisor {
        &self.supervisor
    }

    fn set_status(&self, status: DeckStatus) {
        self.status.send_replace(status);
    }

    fn fail<T>(&self, err: impl Into<DeckError>) -> Result<T> {
        let err = err.into();
        self.set_status(DeckStatus::Error(err.to_string()));
        Err(err)
    }

    // --- refresh ---

    pub async fn refresh(&self, origin: UpdateOrigin) -> Result<RefreshOutcome> {
        match self.store.refresh(origin).await {
            Ok(outcome) => Ok(outcome),
            Err(e) => self.fail(e),
        }
    }

    /// Best-effort refresh after a write the engine already accepted.
    async fn resync(&self) {
        if let Err(e) = self.store.refresh(UpdateOrigin::Programmatic).await {
            warn!(error = %e, "resync after write failed");
        }
    }

    async fn confirm(
        &self,
        predicate: impl Fn(&stompproto::Program) -> bool,
        budget: ConfirmBudget,
    ) -> Confirmation {
        let store = &self.store;
        confirm_until(
            move || store.refresh(UpdateOrigin::Programmatic),
            predicate,
            budget,
        )
        .await
    }

    // --- presets ---

    /// Load a preset the user picked. Selections that did not come from the
    /// user, and the placeholder entry, are ignored and return `None`.
    pub async fn select_preset(
        &self,
        name: &str,
        origin: UpdateOrigin,
    ) -> Result<Option<Confirmation>> {
        if origin != UpdateOrigin::User {
            debug!(%origin, name, "ignoring non-user preset selection");
            return Ok(None);
        }
        let name = name.trim();
        if name.is_empty() || name == PRESET_PLACEHOLDER {
            return Ok(None);
        }

        self.set_status(DeckStatus::Loading);
        if let Err(e) = self.transport.load_preset(name).await {
            return self.fail(e);
        }
        // our own change must not look external to the preset watch
        self.supervisor.set_baseline(Some(name.to_string()));

        let confirmation = self.confirm(preset_is(name), self.preset_budget).await;
        if confirmation.is_confirmed() {
            info!(preset = name, attempts = confirmation.attempts(), "preset loaded");
            self.set_status(DeckStatus::Ok);
        } else {
            warn!(preset = name, attempts = confirmation.attempts(), "preset load not confirmed");
            self.set_status(DeckStatus::LoadedUnconfirmed);
        }
        Ok(Some(confirmation))
    }

    /// Save over a preset; `None` saves over the active one.
    pub async fn save_preset(&self, name: Option<&str>) -> Result<String> {
        let name = match name {
            Some(n) => n.to_string(),
            None => match self.snapshot().program.preset.clone() {
                Some(current) => current,
                None => {
                    return Err(DeckError::InvalidPresetName {
                        name: String::new(),
                        reason: "no preset is active",
                    })
                }
            },
        };
        let name = validate_preset_name(&name)?;

        if let Err(e) = self.transport.save_preset(&name).await {
            return self.fail(e);
        }
        info!(preset = %name, "preset saved");
        self.resync().await;
        self.set_status(DeckStatus::Ok);
        Ok(name)
    }

    pub async fn save_preset_as(&self, name: &str) -> Result<String> {
        let name = validate_preset_name(name)?;
        if let Err(e) = self.transport.save_preset_as(&name).await {
            return self.fail(e);
        }
        info!(preset = %name, "preset saved as new");
        self.resync().await;
        self.set_status(DeckStatus::Ok);
        Ok(name)
    }

    pub async fn delete_preset(&self, name: &str) -> Result<()> {
        let name = validate_preset_name(name)?;
        if let Err(e) = self.transport.delete_preset(&name).await {
            return self.fail(e);
        }
        info!(preset = %name, "preset deleted");
        self.resync().await;
        self.set_status(DeckStatus::Ok);
        Ok(())
    }

    // --- parameters ---

    fn coalescer(&self, plugin: &str, param: &str) -> Arc<WriteCoalescer<f64>> {
        lock(&self.params)
            .entry((plugin.to_string(), param.to_string()))
            .or_insert_with(|| {
                let sink = ParamSink::new(self.transport.clone(), plugin, param);
                Arc::new(WriteCoalescer::new(format!("{plugin}.{param}"), Arc::new(sink)))
            })
            .clone()
    }

    /// Write a numeric parameter from user input.
    ///
    /// Malformed input is rejected before anything is sent; the error
    /// carries the last value the engine reported.
    pub async fn set_param(&self, plugin: &str, param: &str, input: &str) -> Result<Confirmation> {
        let snapshot = self.snapshot();
        let value = parse_user_number(input).map_err(|_| DeckError::InvalidNumber {
            input: input.to_string(),
            last_good: snapshot.program.param(plugin, param).map(str::to_string),
        })?;
        let value = clamp_to_meta(value, snapshot.config.param_meta(plugin, param));

        if let Err(e) = self.coalescer(plugin, param).enqueue(value).await {
            if !e.landed {
                return self.fail(e.error);
            }
            warn!(plugin, param, error = %e, "superseded parameter write failed");
        }

        let expected = format_param_value(value);
        let confirmation = self
            .confirm(param_equals(plugin, param, &expected), self.param_budget)
            .await;
        if confirmation.is_confirmed() {
            self.set_status(DeckStatus::Ok);
        } else {
            warn!(plugin, param, expected = %expected, "parameter write not confirmed");
        }
        Ok(confirmation)
    }

    /// Pick a file-type value. Only user selections are written.
    pub async fn set_file_param(
        &self,
        plugin: &str,
        param: &str,
        value: &str,
        origin: UpdateOrigin,
    ) -> Result<Option<Confirmation>> {
        if origin != UpdateOrigin::User {
            debug!(%origin, plugin, param, "ignoring non-user file selection");
            return Ok(None);
        }
        self.write_file_param(plugin, param, value).await.map(Some)
    }

    async fn write_file_param(&self, plugin: &str, param: &str, value: &str) -> Result<Confirmation> {
        if let Err(e) = self.transport.set_file_param(plugin, param, value).await {
            return self.fail(e);
        }
        let confirmation = self
            .confirm(param_equals(plugin, param, value), self.param_budget)
            .await;
        if confirmation.is_confirmed() {
            self.set_status(DeckStatus::Ok);
        } else {
            warn!(plugin, param, value, "file parameter write not confirmed");
        }
        Ok(confirmation)
    }

    /// Route a value to the endpoint its metadata calls for. File parameters
    /// always go to the file endpoint.
    pub async fn commit_param(&self, plugin: &str, param: &str, value: &str) -> Result<Confirmation> {
        let is_file = self
            .snapshot()
            .config
            .param_meta(plugin, param)
            .is_some_and(|m| m.kind == ParamKind::File);

        if is_file {
            self.write_file_param(plugin, param, value).await
        } else {
            self.set_param(plugin, param, value).await
        }
    }

    // --- enable toggles ---

    pub fn control_state(&self, plugin: &str) -> ControlState {
        lock(&self.toggles).get(plugin).copied().unwrap_or_default()
    }

    /// The value an enable switch should show: the optimistic one while a
    /// toggle is in flight, otherwise what the engine reported.
    pub fn enabled_view(&self, plugin: &str) -> Option<bool> {
        if let ControlState::Busy { optimistic } = self.control_state(plugin) {
            return Some(optimistic);
        }
        self.snapshot().program.param(plugin, "Enabled").map(is_on)
    }

    /// Flip a plugin's enabled flag. Returns the value written.
    pub async fn toggle_plugin(&self, plugin: &str) -> Result<bool> {
        let target = {
            let mut toggles = lock(&self.toggles);
            if toggles.contains_key(plugin) {
                return Err(DeckError::Busy(plugin.to_string()));
            }
            let current = self
                .snapshot()
                .program
                .param(plugin, "Enabled")
                .is_some_and(is_on);
            toggles.insert(
                plugin.to_string(),
                ControlState::Busy {
                    optimistic: !current,
                },
            );
            !current
        };
        let _guard = ToggleGuard {
            toggles: &self.toggles,
            plugin: plugin.to_string(),
        };

        if let Err(e) = self.transport.set_enabled(plugin, target).await {
            warn!(plugin, error = %e, "toggle failed, rolling back");
            return self.fail(e);
        }

        self.resync().await;
        self.set_status(DeckStatus::Ok);
        Ok(target)
    }

    // --- chains ---

    fn chain_items(&self, chain: &str) -> Result<Vec<String>> {
        self.snapshot()
            .program
            .chain(chain)
            .map(<[String]>::to_vec)
            .ok_or_else(|| DeckError::UnknownChain(chain.to_string()))
    }

    /// Replace a chain's membership and order. Blank entries are dropped.
    pub async fn set_chain(&self, chain: &str, items: &[String]) -> Result<()> {
        let items: Vec<String> = items
            .iter()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        if let Err(e) = self.transport.set_chain(chain, &items).await {
            return self.fail(e);
        }
        info!(chain, plugins = ?items, "chain updated");
        self.resync().await;
        self.set_status(DeckStatus::Ok);
        Ok(())
    }

    /// Append a new instance of `base_type`; the engine names the instance.
    pub async fn add_plugin(&self, chain: &str, base_type: &str) -> Result<()> {
        let mut items = self.chain_items(chain)?;
        items.push(base_type.to_string());
        self.set_chain(chain, &items).await
    }

    /// Returns `false` when `index` is out of range and nothing was sent.
    pub async fn remove_plugin(&self, chain: &str, index: usize) -> Result<bool> {
        let mut items = self.chain_items(chain)?;
        if index >= items.len() {
            return Ok(false);
        }
        items.remove(index);
        self.set_chain(chain, &items).await?;
        Ok(true)
    }

    /// Returns `false` when the move would leave the chain and nothing was sent.
    pub async fn move_plugin(&self, chain: &str, from: usize, direction: MoveDirection) -> Result<bool> {
        let items = self.chain_items(chain)?;
        let Some(items) = moved(&items, from, direction) else {
            return Ok(false);
        };
        self.set_chain(chain, &items).await?;
        Ok(true)
    }

    pub async fn release_plugin(&self, plugin: &str) -> Result<()> {
        if let Err(e) = self.transport.release_plugin(plugin).await {
            return self.fail(e);
        }
        info!(plugin, "plugin released");
        self.resync().await;
        self.set_status(DeckStatus::Ok);
        Ok(())
    }

    // --- shadow stages ---

    pub fn shadow_view(&self, stage: ShadowStage) -> StageState {
        self.shadow.get(stage)
    }

    pub async fn shadow_toggle_mute(&self, stage: ShadowStage) -> Result<StageState> {
        let (plugin, param) = self.shadow.identity(stage);
        let (plugin, param) = (plugin.to_string(), param.to_string());
        let meta_min = self
            .snapshot()
            .config
            .param_meta(&plugin, &param)
            .and_then(|m| m.min);

        let change = self.shadow.toggle_mute(stage, meta_min);
        let written = self.coalescer(&plugin, &param).enqueue(change.current.value).await;
        self.settle_shadow(&change, written)?;
        debug!(%stage, muted = change.current.muted, "shadow mute");
        Ok(self.shadow.get(stage))
    }

    pub async fn shadow_set_value(&self, stage: ShadowStage, value: f64) -> Result<StageState> {
        let (plugin, param) = self.shadow.identity(stage);
        let (plugin, param) = (plugin.to_string(), param.to_string());
        let value = clamp_to_meta(value, self.snapshot().config.param_meta(&plugin, &param));

        let change = self.shadow.set_value(stage, value);
        let written = self.coalescer(&plugin, &param).enqueue(value).await;
        self.settle_shadow(&change, written)?;
        Ok(self.shadow.get(stage))
    }

    /// Apply the outcome of a shadow write. A failure only rolls the stage
    /// back when the failed value is still the one shown; a failure that a
    /// later successful write superseded is logged and dropped.
    fn settle_shadow(
        &self,
        change: &ShadowChange,
        written: std::result::Result<(), DrainError>,
    ) -> Result<()> {
        let Err(e) = written else {
            return Ok(());
        };
        if e.landed {
            warn!(stage = %change.stage, error = %e, "superseded shadow write failed");
            return Ok(());
        }
        if !self.shadow.rollback(change) {
            debug!(stage = %change.stage, "shadow stage moved on, keeping newer value");
        }
        self.fail(e.error)
    }

    // --- poll mode ---

    pub fn poll_mode(&self) -> PollMode {
        self.supervisor.mode()
    }

    /// Switch poll mode and remember it for the next start.
    pub async fn set_poll_mode(&self, mode: PollMode) -> Result<()> {
        self.supervisor.set_mode(mode).await;
        self.state_file.save(&ClientState { poll_mode: mode })
    }
}

/// Trim and check a preset name before it goes anywhere near the engine.
pub fn validate_preset_name(name: &str) -> Result<String> {
    let trimmed = name.trim();
    let invalid = |reason| {
        Err(DeckError::InvalidPresetName {
            name: name.to_string(),
            reason,
        })
    };

    if trimmed.is_empty() {
        return invalid("empty");
    }
    if trimmed.contains('/') || trimmed.contains('\\') {
        return invalid("contains a path separator");
    }
    if trimmed.contains("..") {
        return invalid("contains '..'");
    }
    if trimmed.chars().any(char::is_control) {
        return invalid("contains control characters");
    }
    if trimmed.chars().count() > MAX_PRESET_NAME {
        return invalid("longer than 200 characters");
    }
    Ok(trimmed.to_string())
}

/// `items` with the entry at `from` moved one step, or `None` if it can't move.
fn moved(items: &[String], from: usize, direction: MoveDirection) -> Option<Vec<String>> {
    if from >= items.len() {
        return None;
    }
    let to = match direction {
        MoveDirection::Up => from.checked_sub(1)?,
        MoveDirection::Down => Some(from + 1).filter(|&i| i < items.len())?,
    };
    let mut items = items.to_vec();
    items.swap(from, to);
    Some(items)
}
