//! Full-state refresh and the current decoded snapshot.
//!
//! A refresh fetches `/api/state`, decodes all three dumps, and swaps in a
//! brand-new [`Snapshot`]. Only one refresh runs at a time; a request that
//! arrives while one is in flight is dropped, not queued.

use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use stompproto::payload::DumpSection;
use stompproto::{decode_config, decode_program, parse_preset_list, sort_presets, ConfigDump, Program};
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::shadow::ShadowStore;
use crate::transport::{Transport, TransportError};

/// Who caused an update. Handlers use this instead of global flags to tell
/// a user's selection apart from the client's own follow-up refreshes and
/// from changes made on the hardware.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOrigin {
    User,
    Programmatic,
    External,
}

impl UpdateOrigin {
    pub fn as_str(&self) -> &'static str {
        match self {
            UpdateOrigin::User => "user",
            UpdateOrigin::Programmatic => "programmatic",
            UpdateOrigin::External => "external",
        }
    }
}

impl std::fmt::Display for UpdateOrigin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Gateway timing and error for one dump section.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SectionInfo {
    pub duration: String,
    pub error: Option<String>,
}

impl From<&DumpSection> for SectionInfo {
    fn from(section: &DumpSection) -> Self {
        Self {
            duration: section.duration.clone(),
            error: section.error.clone().filter(|e| !e.is_empty()),
        }
    }
}

/// Everything one refresh produced. Never mutated after construction.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub program: Program,
    pub config: ConfigDump,
    pub presets: Vec<String>,
    /// `None` only for the empty snapshot before the first refresh.
    pub fetched_at: Option<DateTime<Utc>>,
    /// Gateway clock at fetch time, as reported.
    pub engine_time: String,
    pub program_section: SectionInfo,
    pub config_section: SectionInfo,
    pub presets_section: SectionInfo,
    pub origin: UpdateOrigin,
}

impl Snapshot {
    pub fn empty() -> Self {
        Self {
            program: Program::default(),
            config: ConfigDump::default(),
            presets: Vec::new(),
            fetched_at: None,
            engine_time: String::new(),
            program_section: SectionInfo::default(),
            config_section: SectionInfo::default(),
            presets_section: SectionInfo::default(),
            origin: UpdateOrigin::Programmatic,
        }
    }

    /// Build from a gateway response.
    ///
    /// A section the gateway failed to fetch keeps the previous snapshot's
    /// decoded value, so a flaky config dump does not wipe the metadata.
    pub fn decode(
        state: &stompproto::StateResponse,
        previous: &Snapshot,
        origin: UpdateOrigin,
    ) -> Self {
        let program = match state.program.text() {
            Some(raw) => decode_program(raw),
            None => previous.program.clone(),
        };
        let config = match state.dump_config.text() {
            Some(raw) => decode_config(raw),
            None => previous.config.clone(),
        };
        let presets = match state.presets.text() {
            Some(raw) => {
                let mut names = parse_preset_list(raw);
                sort_presets(&mut names);
                names
            }
            None => previous.presets.clone(),
        };

        Self {
            program,
            config,
            presets,
            fetched_at: Some(Utc::now()),
            engine_time: state.meta.now.clone(),
            program_section: SectionInfo::from(&state.program),
            config_section: SectionInfo::from(&state.dump_config),
            presets_section: SectionInfo::from(&state.presets),
            origin,
        }
    }
}

#[derive(Debug, Clone)]
pub enum RefreshOutcome {
    Refreshed(Arc<Snapshot>),
    /// Another refresh was already in flight.
    Skipped,
}

impl RefreshOutcome {
    pub fn snapshot(&self) -> Option<&Arc<Snapshot>> {
        match self {
            RefreshOutcome::Refreshed(s) => Some(s),
            RefreshOutcome::Skipped => None,
        }
    }
}

/// Clears the reentrancy flag when the refresh ends, however it ends.
struct RefreshGuard<'a>(&'a AtomicBool);

impl Drop for RefreshGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct StateStore {
    transport: Arc<dyn Transport>,
    shadow: Arc<ShadowStore>,
    refreshing: AtomicBool,
    current: watch::Sender<Arc<Snapshot>>,
}

impl StateStore {
    pub fn new(transport: Arc<dyn Transport>, shadow: Arc<ShadowStore>) -> Self {
        let (current, _) = watch::channel(Arc::new(Snapshot::empty()));
        Self {
            transport,
            shadow,
            refreshing: AtomicBool::new(false),
            current,
        }
    }

    pub fn snapshot(&self) -> Arc<Snapshot> {
        self.current.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Arc<Snapshot>> {
        self.current.subscribe()
    }

    pub fn is_refreshing(&self) -> bool {
        self.refreshing.load(Ordering::Acquire)
    }

    /// Fetch, decode and publish a new snapshot.
    pub async fn refresh(&self, origin: UpdateOrigin) -> Result<RefreshOutcome, TransportError> {
        if self
            .refreshing
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!(%origin, "refresh already in flight, skipping");
            return Ok(RefreshOutcome::Skipped);
        }
        let _guard = RefreshGuard(&self.refreshing);

        let state = self.transport.state().await.inspect_err(|e| {
            warn!(%origin, error = %e, "state refresh failed");
        })?;

        let previous = self.snapshot();
        let snapshot = Arc::new(Snapshot::decode(&state, &previous, origin));

        if snapshot.config_section.error.is_none() && self.shadow.seed_from(&snapshot.config) {
            debug!("shadow stages seeded from config metadata");
        }

        debug!(
            %origin,
            preset = snapshot.program.preset.as_deref().unwrap_or("-"),
            chains = snapshot.program.chains.len(),
            "snapshot refreshed"
        );
        self.current.send_replace(snapshot.clone());

        Ok(RefreshOutcome::Refreshed(snapshot))
    }
}
