//! Preset-list decoding and the small line scanners used on engine replies.

use std::cmp::Ordering;

/// Split the engine's preset listing into names, dropping protocol tokens.
pub fn parse_preset_list(raw: &str) -> Vec<String> {
    raw.split_whitespace()
        .filter(|t| *t != "Presets" && *t != "Ok")
        .map(str::to_string)
        .collect()
}

/// Leading run of ASCII digits, parsed. Preset names like `03_clean` carry
/// a bank-order prefix.
fn numeric_prefix(name: &str) -> Option<u64> {
    let end = name
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(name.len());
    name[..end].parse().ok()
}

/// Compare two preset names for display order.
///
/// Names with a numeric prefix come first, ordered by that number and then
/// by the full name. Names without one follow in plain lexicographic order.
pub fn compare_presets(a: &str, b: &str) -> Ordering {
    match (numeric_prefix(a), numeric_prefix(b)) {
        (Some(x), Some(y)) => x.cmp(&y).then_with(|| a.cmp(b)),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => a.cmp(b),
    }
}

pub fn sort_presets(names: &mut [String]) {
    names.sort_by(|a, b| compare_presets(a, b));
}

/// First `SetPreset` value in a program dump, without decoding the rest.
pub fn current_preset(dump: &str) -> Option<String> {
    dump.lines().find_map(|line| {
        let rest = line.trim().strip_prefix("SetPreset")?;
        if !rest.is_empty() && !rest.starts_with(char::is_whitespace) {
            return None;
        }
        let name = rest.trim();
        (!name.is_empty()).then(|| name.to_string())
    })
}

/// The first line starting with `Error`, even when the reply ends in `Ok`.
pub fn first_protocol_error(reply: &str) -> Option<&str> {
    reply
        .lines()
        .map(str::trim)
        .find(|line| line.starts_with("Error"))
}
