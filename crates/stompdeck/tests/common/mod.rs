//! In-memory engine for integration tests.
//!
//! `MockTransport` keeps a small structured model of the engine, renders it
//! as dump text on `/api/state`, and applies writes to it. Tests can fail
//! or hold individual endpoints and inspect the call log.

#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use stompconf::StompConfig;
use stompdeck::{Deck, Transport, TransportError};
use stompproto::payload::{DumpSection, StateMeta};
use stompproto::{StateResponse, SystemSnapshot};
use tempfile::TempDir;
use tokio::sync::Semaphore;

#[derive(Default)]
struct Engine {
    preset: Option<String>,
    chains: Vec<(String, Vec<String>)>,
    params: BTreeMap<String, BTreeMap<String, String>>,
    config: String,
    presets: Vec<String>,
    /// When false the engine accepts writes but never reflects them.
    ignore_writes: bool,
    calls: Vec<String>,
    failing: HashSet<&'static str>,
    gates: HashMap<&'static str, Arc<Semaphore>>,
}

impl Engine {
    fn render_program(&self) -> String {
        let mut out = String::new();
        if let Some(preset) = &self.preset {
            out.push_str(&format!("SetPreset {}\n", stompproto::quote_if_needed(preset)));
        }
        for (chain, members) in &self.chains {
            out.push_str(&format!("SetChain {chain} {}\n", members.join(" ")));
        }
        for (plugin, params) in &self.params {
            for (param, value) in params {
                out.push_str(&format!("SetParam {plugin} {param} \"{value}\"\n"));
            }
        }
        out
    }
}

#[derive(Default)]
pub struct MockTransport {
    engine: Mutex<Engine>,
}

impl MockTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn engine(&self) -> std::sync::MutexGuard<'_, Engine> {
        self.engine.lock().unwrap()
    }

    pub fn set_preset(&self, name: &str) {
        self.engine().preset = Some(name.to_string());
    }

    pub fn set_chain_members(&self, chain: &str, members: &[&str]) {
        let members: Vec<String> = members.iter().map(|s| s.to_string()).collect();
        let mut engine = self.engine();
        match engine.chains.iter_mut().find(|(c, _)| c == chain) {
            Some((_, existing)) => *existing = members,
            None => engine.chains.push((chain.to_string(), members)),
        }
    }

    pub fn set_param_value(&self, plugin: &str, param: &str, value: &str) {
        self.engine()
            .params
            .entry(plugin.to_string())
            .or_default()
            .insert(param.to_string(), value.to_string());
    }

    pub fn set_config(&self, config: &str) {
        self.engine().config = config.to_string();
    }

    pub fn set_presets(&self, presets: &[&str]) {
        self.engine().presets = presets.iter().map(|s| s.to_string()).collect();
    }

    pub fn ignore_writes(&self) {
        self.engine().ignore_writes = true;
    }

    pub fn fail(&self, endpoint: &'static str) {
        self.engine().failing.insert(endpoint);
    }

    pub fn recover(&self, endpoint: &'static str) {
        self.engine().failing.remove(endpoint);
    }

    /// Park calls to `endpoint` until [`release`](Self::release) is called.
    pub fn hold(&self, endpoint: &'static str) {
        self.engine()
            .gates
            .insert(endpoint, Arc::new(Semaphore::new(0)));
    }

    pub fn release(&self, endpoint: &'static str) {
        if let Some(gate) = self.engine().gates.remove(endpoint) {
            gate.add_permits(Semaphore::MAX_PERMITS / 2);
        }
    }

    /// Let one parked call to `endpoint` through, keeping the hold.
    pub fn release_one(&self, endpoint: &'static str) {
        if let Some(gate) = self.engine().gates.get(endpoint) {
            gate.add_permits(1);
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.engine().calls.clone()
    }

    pub fn count(&self, endpoint: &str) -> usize {
        self.engine()
            .calls
            .iter()
            .filter(|c| c.split(' ').next() == Some(endpoint))
            .count()
    }

    /// Wait (in virtual time) until `endpoint` has been called `n` times.
    pub async fn wait_for(&self, endpoint: &str, n: usize) {
        for _ in 0..1000 {
            if self.count(endpoint) >= n {
                return;
            }
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        panic!("{endpoint} was not called {n} times: {:?}", self.calls());
    }

    async fn enter(&self, endpoint: &'static str, call: String) -> Result<bool, TransportError> {
        let gate = {
            let mut engine = self.engine();
            engine.calls.push(call);
            engine.gates.get(endpoint).cloned()
        };
        if let Some(gate) = gate {
            gate.acquire().await.unwrap().forget();
        }

        let engine = self.engine();
        if engine.failing.contains(endpoint) {
            return Err(TransportError::Http {
                status: 502,
                body: format!("{endpoint} failed"),
            });
        }
        Ok(!engine.ignore_writes)
    }

    fn write_param(&self, plugin: &str, param: &str, value: String) {
        self.engine()
            .params
            .entry(plugin.to_string())
            .or_default()
            .insert(param.to_string(), value);
    }
}

fn section(raw: String) -> DumpSection {
    DumpSection {
        raw,
        duration: "1ms".to_string(),
        error: None,
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn state(&self) -> Result<StateResponse, TransportError> {
        self.enter("state", "state".to_string()).await?;
        let engine = self.engine();
        Ok(StateResponse {
            meta: StateMeta {
                now: "2026-01-01T00:00:00Z".to_string(),
            },
            dump_config: section(engine.config.clone()),
            program: section(engine.render_program()),
            presets: section(format!("Presets {} Ok", engine.presets.join(" "))),
        })
    }

    async fn system(&self) -> Result<SystemSnapshot, TransportError> {
        self.enter("system", "system".to_string()).await?;
        let mut sys = SystemSnapshot::default();
        sys.jack.running = true;
        sys.routing.ok = true;
        Ok(sys)
    }

    /// Answers with the preset active when the request arrived, even if
    /// the reply is held.
    async fn current_preset(&self) -> Result<Option<String>, TransportError> {
        let preset = self.engine().preset.clone();
        self.enter("current_preset", "current_preset".to_string())
            .await?;
        Ok(preset)
    }

    async fn set_param(&self, plugin: &str, param: &str, value: f64) -> Result<(), TransportError> {
        if self
            .enter("set_param", format!("set_param {plugin} {param} {value}"))
            .await?
        {
            self.write_param(plugin, param, format!("{value:.6}"));
        }
        Ok(())
    }

    async fn set_file_param(&self, plugin: &str, param: &str, value: &str) -> Result<(), TransportError> {
        if self
            .enter("set_file_param", format!("set_file_param {plugin} {param} {value}"))
            .await?
        {
            self.write_param(plugin, param, value.to_string());
        }
        Ok(())
    }

    async fn set_enabled(&self, plugin: &str, enabled: bool) -> Result<(), TransportError> {
        if self
            .enter("set_enabled", format!("set_enabled {plugin} {enabled}"))
            .await?
        {
            self.write_param(plugin, "Enabled", if enabled { "1" } else { "0" }.to_string());
        }
        Ok(())
    }

    async fn release_plugin(&self, plugin: &str) -> Result<(), TransportError> {
        if self
            .enter("release_plugin", format!("release_plugin {plugin}"))
            .await?
        {
            let mut engine = self.engine();
            for (_, members) in engine.chains.iter_mut() {
                members.retain(|m| m != plugin);
            }
            engine.params.remove(plugin);
        }
        Ok(())
    }

    async fn load_preset(&self, name: &str) -> Result<(), TransportError> {
        if self.enter("load_preset", format!("load_preset {name}")).await? {
            self.engine().preset = Some(name.to_string());
        }
        Ok(())
    }

    async fn save_preset(&self, name: &str) -> Result<(), TransportError> {
        self.enter("save_preset", format!("save_preset {name}")).await?;
        Ok(())
    }

    async fn save_preset_as(&self, name: &str) -> Result<(), TransportError> {
        if self
            .enter("save_preset_as", format!("save_preset_as {name}"))
            .await?
        {
            let mut engine = self.engine();
            engine.presets.push(name.to_string());
            engine.preset = Some(name.to_string());
        }
        Ok(())
    }

    async fn delete_preset(&self, name: &str) -> Result<(), TransportError> {
        if self
            .enter("delete_preset", format!("delete_preset {name}"))
            .await?
        {
            self.engine().presets.retain(|p| p != name);
        }
        Ok(())
    }

    async fn set_chain(&self, chain: &str, plugins: &[String]) -> Result<(), TransportError> {
        if self
            .enter("set_chain", format!("set_chain {chain} {}", plugins.join(" ")))
            .await?
        {
            let members: Vec<&str> = plugins.iter().map(String::as_str).collect();
            self.set_chain_members(chain, &members);
        }
        Ok(())
    }
}

/// Config pointing persisted state at a temp dir.
pub fn test_config(state_dir: &TempDir) -> StompConfig {
    let mut config = StompConfig::default();
    config.infra.paths.state_dir = state_dir.path().to_path_buf();
    config
}

pub fn deck(mock: &Arc<MockTransport>, state_dir: &TempDir) -> Deck {
    Deck::new(mock.clone() as Arc<dyn Transport>, &test_config(state_dir))
}

/// A small rig: boost in the input chain, a reverb in the loop, and
/// metadata for both plus the master stage.
pub fn pedalboard() -> Arc<MockTransport> {
    let mock = MockTransport::new();
    mock.set_preset("01_clean");
    mock.set_presets(&["10_lead", "01_clean", "ambient"]);
    mock.set_chain_members("Input", &["Boost", "Screamer"]);
    mock.set_chain_members("FxLoop", &["Reverb_2"]);
    mock.set_param_value("Boost", "Gain", "1.000000");
    mock.set_param_value("Boost", "Enabled", "0");
    mock.set_param_value("Screamer", "Enabled", "1");
    mock.set_param_value("Reverb_2", "Impulse", "hall.wav");
    mock.set_config(
        "PluginConfig Boost IsUserSelectable 1\n\
         ParameterConfig Boost Gain Type Knob MinValue 0 MaxValue 10 DefaultValue 1\n\
         ParameterConfig Reverb Impulse Type File\n\
         ParameterFileTree Reverb Impulse \"hall.wav\" \"plate.wav\"\n\
         ParameterConfig Master Volume Type Knob MinValue -40 MaxValue 0 DefaultValue -6",
    );
    mock
}
