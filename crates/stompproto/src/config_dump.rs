//! Config dump decoding: plugin type metadata, parameter ranges, file catalogs.
//!
//! Fields after the leading names are keyword/value pairs in any order:
//!
//! ```text
//! PluginConfig Boost BackgroundColor #aa3300 ForegroundColor #ffffff IsUserSelectable 1 Description "Clean boost"
//! ParameterConfig Boost Gain Type Knob MinValue 0 MaxValue 10 DefaultValue 5 ValueFormat F1
//! ParameterFileTree NAM Model Models "a.nam" "b.nam"
//! EndConfig
//! ```

use crate::base_type;
use crate::tokens::{quoted_tokens, split_quoted, Token};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Per-type presentation metadata from `PluginConfig`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PluginTypeMeta {
    pub background_color: Option<String>,
    pub foreground_color: Option<String>,
    pub description: String,
    /// Whether a user may instantiate this type.
    pub selectable: bool,
}

/// The declared kind of a parameter, matched case-insensitively.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ParamKind {
    Knob,
    Bool,
    Int,
    Enum,
    File,
    Other(String),
}

impl ParamKind {
    pub fn parse(s: &str) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "knob" => Self::Knob,
            "bool" => Self::Bool,
            "int" => Self::Int,
            "enum" => Self::Enum,
            "file" => Self::File,
            _ => Self::Other(s.to_string()),
        }
    }
}

impl Default for ParamKind {
    fn default() -> Self {
        Self::Other(String::new())
    }
}

/// Range and presentation metadata for one (base type, param) pair.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParameterMeta {
    pub kind: ParamKind,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub default: Option<f64>,
    pub step: f64,
    pub is_output: bool,
    pub value_format: Option<String>,
    pub range_power: Option<f64>,
    pub description: String,
    pub is_advanced: bool,
    pub can_sync_to_host_bpm: bool,
    /// Keys this decoder does not know, kept verbatim.
    pub extra: BTreeMap<String, String>,
}

impl ParameterMeta {
    /// Finite (min, max) when both are published.
    pub fn range(&self) -> Option<(f64, f64)> {
        match (self.min, self.max) {
            (Some(min), Some(max)) if min.is_finite() && max.is_finite() => Some((min, max)),
            _ => None,
        }
    }
}

/// Slider step derived from the published range.
pub fn step_for_range(min: Option<f64>, max: Option<f64>) -> f64 {
    match (min, max) {
        (Some(min), Some(max)) if min.is_finite() && max.is_finite() => {
            let span = (max - min).abs();
            if span <= 1.0 {
                0.001
            } else if span <= 10.0 {
                0.01
            } else {
                0.1
            }
        }
        _ => 0.01,
    }
}

/// Everything decoded from a single config dump.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfigDump {
    pub plugins: BTreeMap<String, PluginTypeMeta>,
    pub params: BTreeMap<String, BTreeMap<String, ParameterMeta>>,
    /// Keyed `"<type>.<param>"`.
    pub file_trees: BTreeMap<String, Vec<String>>,
}

impl ConfigDump {
    /// Metadata for a parameter of a plugin instance. Tries the instance's
    /// base type first, then the exact instance name.
    pub fn param_meta(&self, plugin: &str, param: &str) -> Option<&ParameterMeta> {
        let base = base_type(plugin);
        self.params
            .get(base)
            .and_then(|p| p.get(param))
            .or_else(|| self.params.get(plugin).and_then(|p| p.get(param)))
    }

    pub fn plugin_meta(&self, plugin: &str) -> Option<&PluginTypeMeta> {
        self.plugins
            .get(base_type(plugin))
            .or_else(|| self.plugins.get(plugin))
    }

    pub fn file_options(&self, plugin: &str, param: &str) -> Option<&[String]> {
        self.file_trees
            .get(&format!("{}.{}", base_type(plugin), param))
            .or_else(|| self.file_trees.get(&format!("{plugin}.{param}")))
            .map(Vec::as_slice)
    }

    /// Types a user may add to a chain, sorted by name.
    pub fn selectable_types(&self) -> Vec<&str> {
        self.plugins
            .iter()
            .filter(|(_, meta)| meta.selectable)
            .map(|(name, _)| name.as_str())
            .collect()
    }
}

/// Decode a config dump. Never fails; unknown or malformed lines are skipped.
pub fn decode_config(raw: &str) -> ConfigDump {
    let mut out = ConfigDump::default();
    // Last type named by PluginConfig/ParameterFileTree, for plugin-less ParameterConfig lines
    let mut current_type: Option<String> = None;

    for line in raw.lines() {
        let line = line.trim();
        let toks = split_quoted(line);
        let Some(head) = toks.first() else {
            continue;
        };

        match head.as_str() {
            "PluginConfig" => {
                let Some(name) = toks.get(1) else {
                    continue;
                };
                let meta = decode_plugin_fields(&toks[2..]);
                current_type = Some(name.text.clone());
                out.plugins.insert(name.text.clone(), meta);
            }
            "ParameterConfig" => {
                if toks.len() < 3 {
                    continue;
                }
                let (plugin, param, fields) = if toks[2].as_str() == "Type" {
                    match &current_type {
                        Some(t) => (t.clone(), toks[1].text.clone(), &toks[2..]),
                        None => continue,
                    }
                } else {
                    (toks[1].text.clone(), toks[2].text.clone(), &toks[3..])
                };
                if plugin.is_empty() || param.is_empty() {
                    continue;
                }
                out.params
                    .entry(plugin)
                    .or_default()
                    .insert(param, decode_param_fields(fields));
            }
            "ParameterFileTree" => {
                if toks.len() < 4 {
                    continue;
                }
                let (plugin, param) = (&toks[1].text, &toks[2].text);
                current_type = Some(plugin.clone());

                let options = quoted_tokens(line);
                if options.is_empty() {
                    continue;
                }
                out.file_trees.insert(format!("{plugin}.{param}"), options);
            }
            _ => {}
        }
    }

    out
}

fn decode_plugin_fields(fields: &[Token]) -> PluginTypeMeta {
    let mut meta = PluginTypeMeta::default();

    for pair in fields.chunks(2) {
        let [key, value] = pair else { break };
        match key.as_str() {
            "BackgroundColor" => meta.background_color = parse_color(value.as_str()),
            "ForegroundColor" => meta.foreground_color = parse_color(value.as_str()),
            "IsUserSelectable" => meta.selectable = parse_flag(value.as_str()),
            "Description" => meta.description = value.text.clone(),
            _ => {}
        }
    }

    meta
}

fn decode_param_fields(fields: &[Token]) -> ParameterMeta {
    let mut meta = ParameterMeta::default();

    for pair in fields.chunks(2) {
        let [key, value] = pair else { break };
        let v = value.as_str();
        match key.as_str() {
            "Type" => meta.kind = ParamKind::parse(v),
            "MinValue" => meta.min = parse_number(v),
            "MaxValue" => meta.max = parse_number(v),
            "DefaultValue" => meta.default = parse_number(v),
            "RangePower" => meta.range_power = parse_number(v),
            "ValueFormat" => meta.value_format = Some(v.to_string()),
            "IsOutput" => meta.is_output = parse_flag(v),
            "IsAdvanced" => meta.is_advanced = parse_flag(v),
            "CanSyncToHostBPM" => meta.can_sync_to_host_bpm = parse_flag(v),
            "Description" => meta.description = v.to_string(),
            other => {
                meta.extra.insert(other.to_string(), v.to_string());
            }
        }
    }

    meta.step = step_for_range(meta.min, meta.max);
    meta
}

fn parse_color(s: &str) -> Option<String> {
    let hex = s.strip_prefix('#')?;
    (hex.len() == 6 && hex.bytes().all(|b| b.is_ascii_hexdigit())).then(|| s.to_string())
}

fn parse_flag(s: &str) -> bool {
    s == "1" || s.eq_ignore_ascii_case("true")
}

fn parse_number(s: &str) -> Option<f64> {
    s.parse::<f64>().ok().filter(|n| !n.is_nan())
}
