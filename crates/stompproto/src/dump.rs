//! Program dump decoding.
//!
//! ```text
//! SetPreset 00_clean
//! SetChain Input Boost Reverb_4
//! SetPluginSlot Amp NAM
//! SetParam Boost Gain 3.500000
//! SetParam NAM Model "fender bassman.nam"
//! EndProgram
//! ```

use crate::tokens::{split_words, unquote};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

/// Decoded snapshot of the engine's program state.
///
/// Immutable once decoded; every poll produces a fresh one.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Program {
    pub preset: Option<String>,
    /// Chain name to plugin instances in signal-flow order.
    pub chains: BTreeMap<String, Vec<String>>,
    pub slots: BTreeMap<String, String>,
    /// Raw parameter strings per plugin instance.
    pub params: BTreeMap<String, BTreeMap<String, String>>,
}

impl Program {
    pub fn param(&self, plugin: &str, param: &str) -> Option<&str> {
        self.params
            .get(plugin)
            .and_then(|p| p.get(param))
            .map(String::as_str)
    }

    pub fn chain(&self, name: &str) -> Option<&[String]> {
        self.chains.get(name).map(Vec::as_slice)
    }

    /// The chain a plugin instance lives in, with its position.
    pub fn locate(&self, plugin: &str) -> Option<(&str, usize)> {
        self.chains.iter().find_map(|(chain, members)| {
            members
                .iter()
                .position(|m| m == plugin)
                .map(|idx| (chain.as_str(), idx))
        })
    }
}

/// Decode a program dump. Never fails; unknown or malformed lines are skipped.
pub fn decode_program(raw: &str) -> Program {
    let mut program = Program::default();
    let mut current_chain: Option<String> = None;
    let mut inline: HashSet<String> = HashSet::new();

    for line in raw.lines() {
        let line = line.trim();
        let Some((head, _)) = split_words(line, 1) else {
            continue;
        };

        match head[0] {
            "SetPreset" => {
                let name = line["SetPreset".len()..].trim();
                if !name.is_empty() {
                    program.preset = Some(name.to_string());
                }
            }
            "SetChain" => {
                let Some((words, rest)) = split_words(line, 2) else {
                    continue;
                };
                let chain = words[1].to_string();
                let members: Vec<String> = rest.split_whitespace().map(str::to_string).collect();

                if members.is_empty() {
                    program.chains.entry(chain.clone()).or_default();
                } else {
                    inline.insert(chain.clone());
                    program.chains.insert(chain.clone(), members);
                }
                current_chain = Some(chain);
            }
            "SetPluginSlot" => {
                let Some((words, _)) = split_words(line, 3) else {
                    continue;
                };
                let (slot, plugin) = (words[1], words[2]);
                program.slots.insert(slot.to_string(), plugin.to_string());

                // Slots only fill chains that carried no inline list
                if let Some(chain) = current_chain.as_ref().filter(|c| !inline.contains(*c)) {
                    let members = program.chains.entry(chain.clone()).or_default();
                    if !members.iter().any(|m| m == plugin) {
                        members.push(plugin.to_string());
                    }
                }
            }
            "SetParam" => {
                let Some((words, rest)) = split_words(line, 3) else {
                    continue;
                };
                program
                    .params
                    .entry(words[1].to_string())
                    .or_default()
                    .insert(words[2].to_string(), unquote(rest.trim_end()));
            }
            _ => {}
        }
    }

    for members in program.chains.values() {
        for plugin in members {
            program.params.entry(plugin.clone()).or_default();
        }
    }

    program
}
