//! Metadata-aware value layer.
//!
//! The decoders keep every parameter value as the string the engine sent.
//! This module is where those strings become numbers, flags and control
//! kinds, always with the parameter's metadata in hand.

use crate::config_dump::{ParamKind, ParameterMeta};
use thiserror::Error;

/// User input that is not a finite number.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("not a number: {0:?}")]
pub struct InvalidNumber(pub String);

/// How a parameter should be presented and edited.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlKind {
    ReadOnly,
    Toggle,
    Slider,
    FileSelect,
}

impl ControlKind {
    /// Classify a parameter from its metadata, its current raw value and
    /// whether a file catalog exists for it.
    pub fn classify(meta: Option<&ParameterMeta>, raw: &str, has_file_options: bool) -> Self {
        let Some(meta) = meta else {
            return Self::ReadOnly;
        };
        if meta.is_output {
            return Self::ReadOnly;
        }
        if meta.kind == ParamKind::File && has_file_options {
            return Self::FileSelect;
        }

        let numeric = to_number_loose(raw).is_some();
        if meta.kind == ParamKind::Bool && numeric {
            return Self::Toggle;
        }
        if meta.range().is_some() && numeric {
            return Self::Slider;
        }
        Self::ReadOnly
    }

    pub fn is_editable(self) -> bool {
        self != Self::ReadOnly
    }
}

/// Parse the leading numeric token of a display string.
///
/// Accepts `"0 dB"`, `"-3.5"`, `"12.0ms"`, `".5"`. Returns `None` when the
/// string does not start with a number.
pub fn to_number_loose(raw: &str) -> Option<f64> {
    let s = raw.trim_start();
    let bytes = s.as_bytes();
    let mut end = 0;

    if matches!(bytes.first(), Some(b'+' | b'-')) {
        end += 1;
    }
    let int_start = end;
    while bytes.get(end).is_some_and(u8::is_ascii_digit) {
        end += 1;
    }
    let mut digits = end - int_start;

    if bytes.get(end) == Some(&b'.') {
        let frac_start = end + 1;
        let mut frac_end = frac_start;
        while bytes.get(frac_end).is_some_and(u8::is_ascii_digit) {
            frac_end += 1;
        }
        if frac_end > frac_start || digits > 0 {
            digits += frac_end - frac_start;
            end = frac_end;
        }
    }

    if digits == 0 {
        return None;
    }

    // Exponent only counts when digits follow it ("1e3" yes, "12e" no)
    if matches!(bytes.get(end), Some(b'e' | b'E')) {
        let mut exp_end = end + 1;
        if matches!(bytes.get(exp_end), Some(b'+' | b'-')) {
            exp_end += 1;
        }
        let exp_digits_start = exp_end;
        while bytes.get(exp_end).is_some_and(u8::is_ascii_digit) {
            exp_end += 1;
        }
        if exp_end > exp_digits_start {
            end = exp_end;
        }
    }

    s[..end].parse::<f64>().ok().filter(|n| n.is_finite())
}

/// Parse a number typed by the user. Accepts a decimal comma.
pub fn parse_user_number(input: &str) -> Result<f64, InvalidNumber> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(InvalidNumber(input.to_string()));
    }
    trimmed
        .replace(',', ".")
        .parse::<f64>()
        .ok()
        .filter(|n| n.is_finite())
        .ok_or_else(|| InvalidNumber(input.to_string()))
}

/// Enabled-style flags are on only when the engine says exactly `1`.
pub fn is_on(raw: &str) -> bool {
    raw.trim() == "1"
}

/// Clamp to the published range. Values without a finite range pass through.
pub fn clamp_to_meta(value: f64, meta: Option<&ParameterMeta>) -> f64 {
    let Some(meta) = meta else {
        return value;
    };
    let mut v = value;
    if let Some(min) = meta.min.filter(|m| m.is_finite()) {
        v = v.max(min);
    }
    if let Some(max) = meta.max.filter(|m| m.is_finite()) {
        v = v.min(max);
    }
    v
}

/// The engine echoes numeric parameters with six decimals.
pub fn format_param_value(value: f64) -> String {
    format!("{value:.6}")
}

/// Display precision for a slider step, never fewer than two decimals.
pub fn decimals_for_step(step: f64) -> usize {
    if !(step.is_finite() && step > 0.0) {
        return 2;
    }
    // log10(0.001) is not exactly -3 in binary
    let decimals = (-step.log10() - 1e-9).ceil();
    if decimals.is_finite() && decimals > 2.0 {
        decimals as usize
    } else {
        2
    }
}

/// Whether an observed raw value matches the one we wrote.
///
/// Exact string match, or numerically equal at the engine's six-decimal
/// precision when both sides parse as numbers.
pub fn values_match(observed: &str, expected: &str) -> bool {
    if observed == expected {
        return true;
    }
    match (to_number_loose(observed), to_number_loose(expected)) {
        (Some(a), Some(b)) => format_param_value(a) == format_param_value(b),
        _ => false,
    }
}
