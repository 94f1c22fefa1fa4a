//! Configuration for bladectl.
//!
//! A TOML file plus `BLADECTL_*` environment overrides, layered with
//! figment over built-in defaults, and translation into the core crate's
//! `ReconcilerSettings` and `SimulatorConfig`. The core crate never reads
//! files itself.

use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use bladectl_core::config::{
    DEFAULT_AUTOREPEAT_INTERVAL, DEFAULT_HUE_BOUNDS, DEFAULT_PASS_DELAY,
    DEFAULT_SATURATION_BOUNDS, DEFAULT_SLOTS, DEFAULT_STEP,
};
use bladectl_core::{Bounds, CoreError, ReconcilerSettings, SimulatorConfig};

/// Prefix for environment overrides, e.g. `BLADECTL_RECONCILER__STEP=0.05`.
pub const ENV_PREFIX: &str = "BLADECTL_";

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

fn invalid(field: &str, reason: impl Into<String>) -> Result<(), ConfigError> {
    Err(ConfigError::Validation {
        field: field.into(),
        reason: reason.into(),
    })
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level TOML configuration.
#[derive(Debug, Clone, PartialEq, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub reconciler: ReconcilerSection,

    #[serde(default)]
    pub simulator: SimulatorSection,
}

/// `[reconciler]` table.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ReconcilerSection {
    pub slots: usize,
    pub step: f64,
    pub pass_delay_ms: u64,
    pub autorepeat_interval_ms: u64,
    /// `0.0` compares observed and target floats exactly.
    pub tolerance: f64,
    pub hue_bounds: Bounds,
    pub saturation_bounds: Bounds,
}

impl Default for ReconcilerSection {
    fn default() -> Self {
        Self {
            slots: DEFAULT_SLOTS,
            step: DEFAULT_STEP,
            pass_delay_ms: millis(DEFAULT_PASS_DELAY),
            autorepeat_interval_ms: millis(DEFAULT_AUTOREPEAT_INTERVAL),
            tolerance: 0.0,
            hue_bounds: DEFAULT_HUE_BOUNDS,
            saturation_bounds: DEFAULT_SATURATION_BOUNDS,
        }
    }
}

/// `[simulator]` table.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct SimulatorSection {
    pub latency_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolution: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fail_every: Option<u64>,
    pub initial_saturation: f64,
}

impl Default for SimulatorSection {
    fn default() -> Self {
        let sim = SimulatorConfig::default();
        Self {
            latency_ms: millis(sim.latency),
            resolution: sim.resolution,
            fail_every: sim.fail_every,
            initial_saturation: sim.initial_saturation,
        }
    }
}

/// TOML key under `[reconciler]` for a `ReconcilerSettings` field.
fn reconciler_key(field: &str) -> &str {
    match field {
        "pass_delay" => "pass_delay_ms",
        "autorepeat_interval" => "autorepeat_interval_ms",
        other => other,
    }
}

fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

impl Config {
    /// Reject values the reconciler or simulator cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.reconciler_settings()
            .validate()
            .map_err(|err| match err {
                CoreError::InvalidSettings { field, message } => ConfigError::Validation {
                    field: format!("reconciler.{}", reconciler_key(field)),
                    reason: message,
                },
                other => ConfigError::Validation {
                    field: "reconciler".into(),
                    reason: other.to_string(),
                },
            })?;

        let r = &self.reconciler;
        let s = &self.simulator;
        if s.resolution.is_some_and(|res| !(res.is_finite() && res > 0.0)) {
            return invalid("simulator.resolution", "must be positive when set");
        }
        if s.fail_every == Some(0) {
            return invalid("simulator.fail_every", "must be at least 1 when set");
        }
        if !r.saturation_bounds.contains(s.initial_saturation) {
            return invalid(
                "simulator.initial_saturation",
                format!(
                    "{} is outside saturation bounds [{}, {}]",
                    s.initial_saturation, r.saturation_bounds.min, r.saturation_bounds.max
                ),
            );
        }
        Ok(())
    }

    /// Build core reconciler settings from the `[reconciler]` table.
    pub fn reconciler_settings(&self) -> ReconcilerSettings {
        let r = &self.reconciler;
        ReconcilerSettings {
            slots: r.slots,
            step: r.step,
            hue_bounds: r.hue_bounds,
            saturation_bounds: r.saturation_bounds,
            pass_delay: Duration::from_millis(r.pass_delay_ms),
            autorepeat_interval: Duration::from_millis(r.autorepeat_interval_ms),
            tolerance: r.tolerance,
        }
    }

    /// Build the simulator config. The slot count follows `[reconciler]`.
    pub fn simulator_config(&self) -> SimulatorConfig {
        let s = &self.simulator;
        SimulatorConfig {
            slots: self.reconciler.slots,
            latency: Duration::from_millis(s.latency_ms),
            resolution: s.resolution,
            fail_every: s.fail_every,
            initial_saturation: s.initial_saturation,
        }
    }
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    ProjectDirs::from("", "", "bladectl").map_or_else(
        || {
            let mut p = dirs_fallback();
            p.push("config.toml");
            p
        },
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

fn dirs_fallback() -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(".config");
    p.push("bladectl");
    p
}

// ── Config loading ──────────────────────────────────────────────────

/// Provider stack: defaults, then the TOML file at `path` (a missing file
/// is fine), then environment.
pub fn figment(path: &Path) -> Figment {
    Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed(ENV_PREFIX).split("__"))
}

/// Load and validate the config from `path` + environment.
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    let config: Config = figment(path).extract()?;
    config.validate()?;
    Ok(config)
}

/// Load and validate the config from the canonical path + environment.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(&config_path())
}

// ── Config saving ───────────────────────────────────────────────────

/// Serialize config to TOML and write it to `path`.
pub fn save_config_to(cfg: &Config, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, to_toml(cfg)?)?;
    Ok(())
}

/// Render config as pretty TOML.
pub fn to_toml(cfg: &Config) -> Result<String, ConfigError> {
    Ok(toml::to_string_pretty(cfg)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_core_defaults() {
        let cfg = Config::default();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.reconciler_settings(), ReconcilerSettings::default());
        assert_eq!(cfg.simulator_config(), SimulatorConfig::default());
    }

    #[test]
    fn simulator_follows_reconciler_slot_count() {
        let mut cfg = Config::default();
        cfg.reconciler.slots = 6;
        assert_eq!(cfg.simulator_config().slots, 6);
    }

    #[test]
    fn validation_names_the_field() {
        let mut cfg = Config::default();
        cfg.reconciler.hue_bounds = Bounds::new(1.0, -1.0);
        match cfg.validate() {
            Err(ConfigError::Validation { field, .. }) => {
                assert_eq!(field, "reconciler.hue_bounds");
            }
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn reconciler_errors_use_toml_keys() {
        let mut cfg = Config::default();
        cfg.reconciler.autorepeat_interval_ms = 0;
        match cfg.validate() {
            Err(ConfigError::Validation { field, reason }) => {
                assert_eq!(field, "reconciler.autorepeat_interval_ms");
                assert_eq!(reason, "must be non-zero");
            }
            other => panic!("expected validation error, got {other:?}"),
        }
        assert_eq!(reconciler_key("step"), "step");
        assert_eq!(reconciler_key("pass_delay"), "pass_delay_ms");
    }
}
