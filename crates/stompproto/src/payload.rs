//! Typed request and response bodies for the engine gateway's HTTP endpoints.
//!
//! Every response struct is lenient: missing fields take their defaults and
//! unknown fields are ignored, so an older or newer gateway still decodes.

use serde::{Deserialize, Serialize};

/// One dump section of `GET /api/state`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DumpSection {
    pub raw: String,
    /// Gateway-side fetch time, e.g. `"4.21ms"`.
    pub duration: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DumpSection {
    /// The raw text, or `None` when the gateway reported an error for it.
    pub fn text(&self) -> Option<&str> {
        match &self.error {
            Some(e) if !e.is_empty() => None,
            _ => Some(&self.raw),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StateMeta {
    /// RFC 3339 timestamp from the gateway.
    pub now: String,
}

/// `GET /api/state`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct StateResponse {
    pub meta: StateMeta,
    pub dump_config: DumpSection,
    pub program: DumpSection,
    pub presets: DumpSection,
}

/// `GET /api/preset/current`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CurrentPreset {
    pub current_preset: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Acknowledgement returned by every write endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Ack {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Shape of a structured error body.
#[derive(Debug, Clone, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JackInfo {
    pub running: bool,
    pub driver: String,
    pub device: String,
    pub sr: u32,
    pub buf: u32,
    pub periods: u32,
    pub rtprio: i32,
    pub realtime: bool,
    pub xruns: u64,
    pub xruns_delta: i64,
    pub last_xrun: Option<String>,
    pub latency_rt_ms: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoutingInfo {
    pub ok: bool,
    pub missing: Vec<String>,
    pub ports: u32,
    pub edges: u32,
    pub summary: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MidiInfo {
    pub alsa: Vec<String>,
    pub jack: Vec<String>,
    pub connected: bool,
    pub details: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioInterfaceInfo {
    pub asound_cards: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CpuInfo {
    pub load1: f64,
    pub governor: Option<String>,
    pub temp_c: Option<f64>,
    pub throttled: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MemInfo {
    pub total_mb: u64,
    pub used_mb: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiskInfo {
    pub root_free_gb: f64,
}

/// `GET /api/system` - host and audio-server health for the status strip.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SystemSnapshot {
    /// Unix seconds.
    pub ts: i64,
    pub jack: JackInfo,
    pub routing: RoutingInfo,
    pub midi: MidiInfo,
    #[serde(rename = "audioif")]
    pub audio_if: AudioInterfaceInfo,
    pub cpu: CpuInfo,
    pub mem: MemInfo,
    pub disk: DiskInfo,
    pub errors: Vec<String>,
}

/// `POST /api/param/set`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamSetRequest {
    pub plugin: String,
    pub param: String,
    pub value: f64,
}

/// `POST /api/param/file`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParamFileRequest {
    pub plugin: String,
    pub param: String,
    pub value: String,
}

/// `POST /api/plugins/{name}/enabled`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnabledRequest {
    pub enabled: bool,
}

/// Body of the preset load/save/save-as/delete endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NameRequest {
    pub name: String,
}

/// `POST /api/chains/{chain}/set`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainSetRequest {
    pub plugins: Vec<String>,
}
