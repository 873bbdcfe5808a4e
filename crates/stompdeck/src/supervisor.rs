//! Live/Research background polling.
//!
//! In live mode two tasks run: a status-strip poll and a faster watch on the
//! current preset name that triggers an `External` refresh when the name
//! changes underneath us (someone stomped a footswitch). Research mode runs
//! nothing; every refresh is user-driven.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use stompconf::PollingConfig;
use stompproto::SystemSnapshot;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::store::{StateStore, UpdateOrigin};
use crate::transport::Transport;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PollMode {
    #[default]
    Live,
    Research,
}

impl PollMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            PollMode::Live => "live",
            PollMode::Research => "research",
        }
    }
}

impl std::fmt::Display for PollMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for PollMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "live" => Ok(PollMode::Live),
            "research" => Ok(PollMode::Research),
            other => Err(format!("unknown poll mode: {other} (expected live or research)")),
        }
    }
}

/// A periodic background task with explicit cancellation.
pub struct ScheduledTask {
    name: &'static str,
    handle: JoinHandle<()>,
    token: CancellationToken,
}

impl ScheduledTask {
    /// Run `tick` every `period`, first tick immediately. Missed ticks are
    /// skipped rather than bunched up.
    pub fn spawn<F, Fut>(name: &'static str, period: Duration, tick: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let token = CancellationToken::new();
        let cancel = token.clone();
        let period = period.max(Duration::from_millis(1));

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => {
                        debug!(task = name, "scheduled task cancelled");
                        break;
                    }
                    _ = ticker.tick() => {
                        tick().await;
                    }
                }
            }
        });

        Self {
            name,
            handle,
            token,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Stop scheduling ticks. A tick already running finishes first.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl Drop for ScheduledTask {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// What the status strip shows, condensed from `/api/system`.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusStrip {
    pub at: Option<DateTime<Utc>>,
    pub engine_running: bool,
    pub xruns: u64,
    pub xruns_delta: i64,
    pub routing_ok: bool,
    pub midi_connected: bool,
    pub audio_interfaces: Vec<String>,
    pub errors: Vec<String>,
}

impl From<&SystemSnapshot> for StatusStrip {
    fn from(sys: &SystemSnapshot) -> Self {
        Self {
            at: Utc.timestamp_opt(sys.ts, 0).single(),
            engine_running: sys.jack.running,
            xruns: sys.jack.xruns,
            xruns_delta: sys.jack.xruns_delta,
            routing_ok: sys.routing.ok,
            midi_connected: sys.midi.connected,
            audio_interfaces: sys.audio_if.asound_cards.clone(),
            errors: sys.errors.clone(),
        }
    }
}

impl std::fmt::Display for StatusStrip {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "engine {} | xruns {} ({:+}) | routing {} | midi {}",
            if self.engine_running { "up" } else { "DOWN" },
            self.xruns,
            self.xruns_delta,
            if self.routing_ok { "ok" } else { "BROKEN" },
            if self.midi_connected { "connected" } else { "none" },
        )?;
        if !self.errors.is_empty() {
            write!(f, " | {} error(s)", self.errors.len())?;
        }
        Ok(())
    }
}

/// Last preset name the watch has seen.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Baseline {
    /// Not primed; the next observation becomes the baseline without
    /// triggering a refresh.
    Unknown,
    Known(Option<String>),
}

/// The baseline plus an epoch bumped on every outside write, so a watch
/// tick can tell its reading went stale while it was fetching.
#[derive(Debug)]
struct WatchBaseline {
    baseline: Baseline,
    epoch: u64,
}

impl WatchBaseline {
    fn replace(&mut self, baseline: Baseline) {
        self.baseline = baseline;
        self.epoch += 1;
    }
}

struct ModeState {
    mode: PollMode,
    status_task: Option<ScheduledTask>,
    watch_task: Option<ScheduledTask>,
    /// Bumped on every transition so a slow baseline fetch from a superseded
    /// transition cannot start timers.
    generation: u64,
}

impl ModeState {
    fn clear(&mut self) {
        for task in [self.status_task.take(), self.watch_task.take()]
            .into_iter()
            .flatten()
        {
            debug!(task = task.name(), "stopping");
            task.cancel();
        }
    }
}

/// Clears the preset-watch reentrancy flag.
struct WatchGuard(Arc<AtomicBool>);

impl Drop for WatchGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct Supervisor {
    transport: Arc<dyn Transport>,
    store: Arc<StateStore>,
    polling: PollingConfig,
    state: Mutex<ModeState>,
    baseline: Arc<Mutex<WatchBaseline>>,
    watch_busy: Arc<AtomicBool>,
    status_tx: watch::Sender<Option<StatusStrip>>,
}

impl Supervisor {
    /// Starts in Research with nothing running; call [`set_mode`] to go live.
    ///
    /// [`set_mode`]: Supervisor::set_mode
    pub fn new(transport: Arc<dyn Transport>, store: Arc<StateStore>, polling: PollingConfig) -> Self {
        let (status_tx, _) = watch::channel(None);
        Self {
            transport,
            store,
            polling,
            state: Mutex::new(ModeState {
                mode: PollMode::Research,
                status_task: None,
                watch_task: None,
                generation: 0,
            }),
            baseline: Arc::new(Mutex::new(WatchBaseline {
                baseline: Baseline::Unknown,
                epoch: 0,
            })),
            watch_busy: Arc::new(AtomicBool::new(false)),
            status_tx,
        }
    }

    fn lock(&self) -> MutexGuard<'_, ModeState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn mode(&self) -> PollMode {
        self.lock().mode
    }

    /// Number of background timers currently running.
    pub fn active_timers(&self) -> usize {
        let state = self.lock();
        [&state.status_task, &state.watch_task]
            .into_iter()
            .flatten()
            .filter(|t| !t.is_finished())
            .count()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<Option<StatusStrip>> {
        self.status_tx.subscribe()
    }

    /// Record the preset the client itself just loaded so the watch does not
    /// report it as an external change.
    pub fn set_baseline(&self, preset: Option<String>) {
        lock_baseline(&self.baseline).replace(Baseline::Known(preset));
    }

    /// Enter `mode`. Existing timers are always stopped first, so entering
    /// the same mode twice never duplicates them.
    pub async fn set_mode(&self, mode: PollMode) {
        let generation = {
            let mut state = self.lock();
            state.clear();
            state.mode = mode;
            state.generation += 1;
            state.generation
        };
        info!(%mode, "poll mode");

        if mode == PollMode::Research {
            return;
        }

        // prime before any watch tick can compare
        let baseline = match self.transport.current_preset().await {
            Ok(preset) => Baseline::Known(preset),
            Err(e) => {
                warn!(error = %e, "could not prime preset baseline");
                Baseline::Unknown
            }
        };

        let mut state = self.lock();
        if state.generation != generation {
            debug!("mode transition superseded before timers started");
            return;
        }
        lock_baseline(&self.baseline).replace(baseline);

        state.clear();
        state.status_task = Some(self.spawn_status());
        state.watch_task = Some(self.spawn_watch());
    }

    /// Stop all timers without changing the recorded mode.
    pub fn shutdown(&self) {
        let mut state = self.lock();
        state.generation += 1;
        state.clear();
    }

    fn spawn_status(&self) -> ScheduledTask {
        let transport = self.transport.clone();
        let status_tx = self.status_tx.clone();

        ScheduledTask::spawn("status-poll", self.polling.status_interval(), move || {
            let transport = transport.clone();
            let status_tx = status_tx.clone();
            async move {
                match transport.system().await {
                    Ok(sys) => {
                        let strip = StatusStrip::from(&sys);
                        debug!(running = strip.engine_running, xruns = strip.xruns, "status tick");
                        status_tx.send_replace(Some(strip));
                    }
                    Err(e) => warn!(error = %e, "status poll failed"),
                }
            }
        })
    }

    fn spawn_watch(&self) -> ScheduledTask {
        let transport = self.transport.clone();
        let store = self.store.clone();
        let baseline = self.baseline.clone();
        let busy = self.watch_busy.clone();

        ScheduledTask::spawn("preset-watch", self.polling.preset_watch_interval(), move || {
            watch_tick(transport.clone(), store.clone(), baseline.clone(), busy.clone())
        })
    }
}

fn lock_baseline(baseline: &Mutex<WatchBaseline>) -> MutexGuard<'_, WatchBaseline> {
    baseline.lock().unwrap_or_else(PoisonError::into_inner)
}

async fn watch_tick(
    transport: Arc<dyn Transport>,
    store: Arc<StateStore>,
    baseline: Arc<Mutex<WatchBaseline>>,
    busy: Arc<AtomicBool>,
) {
    if busy.swap(true, Ordering::AcqRel) {
        debug!("preset watch already running");
        return;
    }
    let _guard = WatchGuard(busy);

    let epoch = lock_baseline(&baseline).epoch;
    let current = match transport.current_preset().await {
        Ok(current) => current,
        Err(e) => {
            warn!(error = %e, "preset watch failed");
            return;
        }
    };

    let changed = {
        let mut watched = lock_baseline(&baseline);
        if watched.epoch != epoch {
            debug!("baseline moved during preset watch, dropping reading");
            return;
        }
        let changed = match &watched.baseline {
            Baseline::Known(previous) => *previous != current,
            Baseline::Unknown => false,
        };
        watched.baseline = Baseline::Known(current.clone());
        changed
    };

    if !changed {
        debug!(preset = current.as_deref().unwrap_or("-"), "preset watch tick");
        return;
    }

    info!(preset = current.as_deref().unwrap_or("-"), "preset changed externally");
    if let Err(e) = store.refresh(UpdateOrigin::External).await {
        warn!(error = %e, "refresh after external preset change failed");
    }
}
