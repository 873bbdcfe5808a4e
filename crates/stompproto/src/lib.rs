//! stompproto - protocol types for the effects engine's text dumps.
//!
//! The engine describes itself with two line-oriented dumps: a *program* dump
//! (active preset, chain routing, parameter values) and a *config* dump
//! (plugin colors, parameter ranges, file catalogs). This crate turns both
//! into typed values without ever failing: lines this client does not
//! understand are skipped, because newer engines emit directives we have
//! never seen.
//!
//! ## Layers
//!
//! - [`tokens`] - whitespace tokenizer with quoted-string support
//! - [`dump`] - program dump into [`Program`]
//! - [`config_dump`] - config dump into [`ConfigDump`]
//! - [`presets`] - preset-list decoding, ordering, protocol error scanning
//! - [`value`] - the only place raw strings become numbers or booleans
//! - [`payload`] - serde types for each HTTP endpoint
//!
//! ```
//! use stompproto::decode_program;
//!
//! let program = decode_program("SetPreset Foo\nSetChain Input Boost\nSetParam Boost Gain \"3.5\"");
//! assert_eq!(program.preset.as_deref(), Some("Foo"));
//! assert_eq!(program.param("Boost", "Gain"), Some("3.5"));
//! ```

pub mod config_dump;
pub mod dump;
pub mod payload;
pub mod presets;
pub mod tokens;
pub mod value;

pub use config_dump::{decode_config, ConfigDump, ParamKind, ParameterMeta, PluginTypeMeta};
pub use dump::{decode_program, Program};
pub use payload::{Ack, CurrentPreset, DumpSection, StateResponse, SystemSnapshot};
pub use presets::{current_preset, first_protocol_error, parse_preset_list, sort_presets};
pub use tokens::quote_if_needed;
pub use value::{ControlKind, InvalidNumber};

/// Strip a trailing `_<digits>` instance suffix: `Reverb_4` becomes `Reverb`.
///
/// Names without such a suffix (including `EQ-7`, where the digits follow a
/// dash) are returned unchanged.
pub fn base_type(instance: &str) -> &str {
    match instance.rsplit_once('_') {
        Some((base, suffix))
            if !base.is_empty()
                && !suffix.is_empty()
                && suffix.bytes().all(|b| b.is_ascii_digit()) =>
        {
            base
        }
        _ => instance,
    }
}
