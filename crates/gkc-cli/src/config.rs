//! Configuration Vault – reads/writes `~/.gkc/config.toml`.

use gkc_types::{GkcError, VehicleConfig, WatchdogConfig};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Persisted controller configuration stored in `~/.gkc/config.toml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Control loop period in milliseconds.
    #[serde(default = "default_control_period_ms")]
    pub control_period_ms: u64,

    /// Speed bounds, drivetrain geometry, and bus addresses.
    #[serde(default)]
    pub vehicle: VehicleConfig,

    /// Watchdog and command-link timing.
    #[serde(default)]
    pub watchdog: WatchdogConfig,
}

fn default_control_period_ms() -> u64 {
    20
}

impl Default for Config {
    fn default() -> Self {
        Self {
            control_period_ms: default_control_period_ms(),
            vehicle: VehicleConfig::default(),
            watchdog: WatchdogConfig::default(),
        }
    }
}

impl Config {
    pub fn validate(&self) -> Result<(), GkcError> {
        if self.control_period_ms == 0 {
            return Err(GkcError::InvalidConfig("control_period_ms must be non-zero".into()));
        }
        self.vehicle.validate()?;
        self.watchdog.validate()
    }
}

/// Return the path to `~/.gkc/config.toml`.
pub fn config_path() -> PathBuf {
    config_path_for_home(
        &std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .unwrap_or_else(|_| ".".to_string()),
    )
}

/// Build the config path relative to the given home directory.
pub(crate) fn config_path_for_home(home: &str) -> PathBuf {
    PathBuf::from(home).join(".gkc").join("config.toml")
}

/// Load the config from `path`.  Returns `None` if the file does not exist.
pub(crate) fn load_from(path: &Path) -> Result<Option<Config>, String> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read config at {}: {}", path.display(), e))?;
    let cfg: Config = toml::from_str(&raw)
        .map_err(|e| format!("Failed to parse config: {}", e))?;
    Ok(Some(cfg))
}

/// Load the config from `path`, writing the defaults there on first run.
///
/// Returns the config and whether it was freshly created.
pub fn load_or_init(path: &Path) -> Result<(Config, bool), String> {
    match load_from(path)? {
        Some(cfg) => Ok((cfg, false)),
        None => {
            let cfg = Config::default();
            save_to(&cfg, path)?;
            Ok((cfg, true))
        }
    }
}

/// Apply `GKC_*` environment variable overrides to `cfg`.  Values that do not
/// parse are ignored.
///
/// | Variable | Config field |
/// |---|---|
/// | `GKC_MAX_FORWARD_SPEED` | `vehicle.max_forward_speed` |
/// | `GKC_MAX_REVERSE_SPEED` | `vehicle.max_reverse_speed` |
/// | `GKC_CONTROL_PERIOD_MS` | `control_period_ms` |
/// | `GKC_WAKEUP_EVERY_MS` | `watchdog.wakeup_every_ms` |
pub fn apply_env_overrides(cfg: &mut Config) {
    if let Ok(v) = std::env::var("GKC_MAX_FORWARD_SPEED")
        && let Ok(speed) = v.parse::<f32>() {
            cfg.vehicle.max_forward_speed = speed;
        }
    if let Ok(v) = std::env::var("GKC_MAX_REVERSE_SPEED")
        && let Ok(speed) = v.parse::<f32>() {
            cfg.vehicle.max_reverse_speed = speed;
        }
    if let Ok(v) = std::env::var("GKC_CONTROL_PERIOD_MS")
        && let Ok(ms) = v.parse::<u64>() {
            cfg.control_period_ms = ms;
        }
    if let Ok(v) = std::env::var("GKC_WAKEUP_EVERY_MS")
        && let Ok(ms) = v.parse::<u32>() {
            cfg.watchdog.wakeup_every_ms = ms;
        }
}

/// Save the config to `path`, creating its directory if necessary.
pub(crate) fn save_to(cfg: &Config, path: &Path) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| format!("Failed to create config directory: {}", e))?;
    }
    let raw = toml::to_string_pretty(cfg)
        .map_err(|e| format!("Failed to serialize config: {}", e))?;
    fs::write(path, raw)
        .map_err(|e| format!("Failed to write config at {}: {}", path.display(), e))
}
