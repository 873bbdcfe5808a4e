//! Config file discovery, layering, and environment variable overlay.

use crate::{ConfigError, StompConfig};
use std::path::{Path, PathBuf};

/// Information about where config values came from.
#[derive(Debug, Clone, Default)]
pub struct ConfigSources {
    /// Config files that were loaded (in order)
    pub files: Vec<PathBuf>,
    /// Environment variables that overrode config values
    pub env_overrides: Vec<String>,
}

/// Discover config files in standard locations.
///
/// Returns paths in load order (system, user, local). Only returns files
/// that exist.
pub fn discover_config_files() -> Vec<PathBuf> {
    discover_config_files_with_override(None)
}

/// Discover config files, optionally with a CLI override path.
///
/// If `cli_path` is provided and exists, it replaces the local override.
pub fn discover_config_files_with_override(cli_path: Option<&Path>) -> Vec<PathBuf> {
    let mut files = Vec::new();

    let system = PathBuf::from("/etc/stompdeck/config.toml");
    if system.exists() {
        files.push(system);
    }

    if let Some(config_dir) = directories::BaseDirs::new().map(|d| d.config_dir().to_path_buf()) {
        let user = config_dir.join("stompdeck/config.toml");
        if user.exists() {
            files.push(user);
        }
    }

    if let Some(path) = cli_path {
        if path.exists() {
            files.push(path.to_path_buf());
            return files;
        }
    }

    let local = PathBuf::from("stompdeck.toml");
    if local.exists() {
        files.push(local);
    }

    files
}

/// Read a TOML file and layer its keys over `config`.
pub fn apply_file(config: &mut StompConfig, path: &Path) -> Result<(), ConfigError> {
    let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
        path: path.to_path_buf(),
        source: e,
    })?;

    apply_toml(config, &contents, path)
}

/// Layer the keys present in `contents` over `config`.
///
/// Only keys that appear in the document are touched, so a user file that
/// sets one field leaves whatever the system file set for the others.
pub fn apply_toml(config: &mut StompConfig, contents: &str, path: &Path) -> Result<(), ConfigError> {
    let table: toml::Table = contents.parse().map_err(|e: toml::de::Error| ConfigError::Parse {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;

    if let Some(engine) = table.get("engine").and_then(|v| v.as_table()) {
        if let Some(v) = engine.get("url").and_then(|v| v.as_str()) {
            config.infra.engine.url = v.to_string();
        }
        if let Some(v) = engine.get("timeout_ms").and_then(|v| v.as_integer()) {
            config.infra.engine.timeout_ms = v.max(0) as u64;
        }
    }

    if let Some(paths) = table.get("paths").and_then(|v| v.as_table()) {
        if let Some(v) = paths.get("state_dir").and_then(|v| v.as_str()) {
            config.infra.paths.state_dir = expand_path(v);
        }
    }

    if let Some(telemetry) = table.get("telemetry").and_then(|v| v.as_table()) {
        if let Some(v) = telemetry.get("log_level").and_then(|v| v.as_str()) {
            config.infra.telemetry.log_level = v.to_string();
        }
    }

    if let Some(polling) = table.get("polling").and_then(|v| v.as_table()) {
        if let Some(v) = polling.get("status_interval_ms").and_then(|v| v.as_integer()) {
            config.tuning.polling.status_interval_ms = v.max(1) as u64;
        }
        if let Some(v) = polling.get("preset_watch_interval_ms").and_then(|v| v.as_integer()) {
            config.tuning.polling.preset_watch_interval_ms = v.max(1) as u64;
        }
    }

    if let Some(reconcile) = table.get("reconcile").and_then(|v| v.as_table()) {
        let r = &mut config.tuning.reconcile;
        if let Some(v) = reconcile.get("preset_attempts").and_then(|v| v.as_integer()) {
            r.preset_attempts = v.max(1) as u32;
        }
        if let Some(v) = reconcile.get("preset_interval_ms").and_then(|v| v.as_integer()) {
            r.preset_interval_ms = v.max(0) as u64;
        }
        if let Some(v) = reconcile.get("param_attempts").and_then(|v| v.as_integer()) {
            r.param_attempts = v.max(1) as u32;
        }
        if let Some(v) = reconcile.get("param_interval_ms").and_then(|v| v.as_integer()) {
            r.param_interval_ms = v.max(0) as u64;
        }
    }

    if let Some(shadow) = table.get("shadow").and_then(|v| v.as_table()) {
        let s = &mut config.tuning.shadow;
        if let Some(v) = shadow.get("input_plugin").and_then(|v| v.as_str()) {
            s.input_plugin = v.to_string();
        }
        if let Some(v) = shadow.get("input_param").and_then(|v| v.as_str()) {
            s.input_param = v.to_string();
        }
        if let Some(v) = shadow.get("master_plugin").and_then(|v| v.as_str()) {
            s.master_plugin = v.to_string();
        }
        if let Some(v) = shadow.get("master_param").and_then(|v| v.as_str()) {
            s.master_param = v.to_string();
        }
        // TOML distinguishes -60 from -60.0; accept both
        if let Some(v) = shadow
            .get("mute_floor")
            .and_then(|v| v.as_float().or_else(|| v.as_integer().map(|i| i as f64)))
        {
            s.mute_floor = v;
        }
    }

    Ok(())
}

/// Apply environment variable overrides to config.
///
/// `lookup` is `std::env::var` in production; tests pass a map.
pub fn apply_env_overrides<F>(config: &mut StompConfig, sources: &mut ConfigSources, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(v) = lookup("STOMPDECK_ENGINE_URL") {
        config.infra.engine.url = v;
        sources.env_overrides.push("STOMPDECK_ENGINE_URL".to_string());
    }
    if let Some(v) = lookup("STOMPDECK_TIMEOUT_MS") {
        if let Ok(ms) = v.parse() {
            config.infra.engine.timeout_ms = ms;
            sources.env_overrides.push("STOMPDECK_TIMEOUT_MS".to_string());
        }
    }

    if let Some(v) = lookup("STOMPDECK_STATE_DIR") {
        config.infra.paths.state_dir = expand_path(&v);
        sources.env_overrides.push("STOMPDECK_STATE_DIR".to_string());
    }

    if let Some(v) = lookup("STOMPDECK_LOG_LEVEL") {
        config.infra.telemetry.log_level = v;
        sources.env_overrides.push("STOMPDECK_LOG_LEVEL".to_string());
    }
    // RUST_LOG wins over our own knob, same as everywhere else
    if let Some(v) = lookup("RUST_LOG") {
        config.infra.telemetry.log_level = v;
        sources.env_overrides.push("RUST_LOG".to_string());
    }

    if let Some(v) = lookup("STOMPDECK_STATUS_INTERVAL_MS") {
        if let Ok(ms) = v.parse::<u64>() {
            config.tuning.polling.status_interval_ms = ms.max(1);
            sources.env_overrides.push("STOMPDECK_STATUS_INTERVAL_MS".to_string());
        }
    }
    if let Some(v) = lookup("STOMPDECK_PRESET_WATCH_INTERVAL_MS") {
        if let Ok(ms) = v.parse::<u64>() {
            config.tuning.polling.preset_watch_interval_ms = ms.max(1);
            sources
                .env_overrides
                .push("STOMPDECK_PRESET_WATCH_INTERVAL_MS".to_string());
        }
    }
}

/// Expand ~ and $VAR in paths.
pub fn expand_path(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/") {
        if let Some(home) = directories::BaseDirs::new().map(|d| d.home_dir().to_path_buf()) {
            return home.join(stripped);
        }
        return PathBuf::from(path);
    }

    if let Some(stripped) = path.strip_prefix('$') {
        return match stripped.split_once('/') {
            Some((var_name, rest)) => match std::env::var(var_name) {
                Ok(value) => PathBuf::from(value).join(rest),
                Err(_) => PathBuf::from(path),
            },
            None => std::env::var(stripped)
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from(path)),
        };
    }

    PathBuf::from(path)
}
