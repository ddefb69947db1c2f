//! Configuration file management for squitter.
//!
//! Reads/writes `~/.squitter/config.yaml` with receiver location, directory
//! limits and CPR decode tolerances.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use tracing::warn;

use crate::types::{AdsbError, Result};

/// Full configuration structure.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Config {
    pub receiver: ReceiverConfig,
    pub directory: DirectoryConfig,
    pub cpr: CprConfig,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReceiverConfig {
    pub name: String,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
}

impl ReceiverConfig {
    /// Receiver location, if both coordinates are configured.
    pub fn position(&self) -> Option<(f64, f64)> {
        Some((self.lat?, self.lon?))
    }
}

impl Default for ReceiverConfig {
    fn default() -> Self {
        ReceiverConfig {
            name: "default".into(),
            lat: None,
            lon: None,
        }
    }
}

/// What the directory does with a new address when it is already full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AdmissionPolicy {
    /// Refuse the new address; existing records are untouched.
    #[default]
    RejectNew,
    /// Drop the least recently updated record to make room.
    EvictOldest,
}

impl AdmissionPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            AdmissionPolicy::RejectNew => "reject_new",
            AdmissionPolicy::EvictOldest => "evict_oldest",
        }
    }
}

impl fmt::Display for AdmissionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AdmissionPolicy {
    type Err = AdsbError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "reject_new" | "reject" => Ok(AdmissionPolicy::RejectNew),
            "evict_oldest" | "evict" => Ok(AdmissionPolicy::EvictOldest),
            other => Err(AdsbError::Config(format!("unknown admission policy: {other}"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DirectoryConfig {
    /// Maximum number of live aircraft records.
    pub capacity: usize,
    /// Seconds without an update before a record is swept.
    pub stale_timeout: f64,
    pub admission: AdmissionPolicy,
}

impl Default for DirectoryConfig {
    fn default() -> Self {
        DirectoryConfig {
            capacity: 100,
            stale_timeout: 60.0,
            admission: AdmissionPolicy::RejectNew,
        }
    }
}

/// CPR pairing and local-decode tolerances.
#[derive(Debug, Clone, PartialEq)]
pub struct CprConfig {
    /// Max seconds between an airborne even/odd pair for global decode.
    pub airborne_max_skew: f64,
    /// Max seconds between a surface even/odd pair for global decode.
    pub surface_max_skew: f64,
    /// Max age (seconds) of a fix used as a local-decode reference.
    pub local_max_age: f64,
    pub airborne_local_range_nm: f64,
    pub surface_local_range_nm: f64,
}

impl Default for CprConfig {
    fn default() -> Self {
        CprConfig {
            airborne_max_skew: 10.0,
            surface_max_skew: 5.0,
            local_max_age: 30.0,
            airborne_local_range_nm: 180.0,
            surface_local_range_nm: 45.0,
        }
    }
}

/// Get the config directory path (`~/.squitter/`).
pub fn config_dir() -> PathBuf {
    dirs_home().join(".squitter")
}

/// Get the config file path.
pub fn config_file() -> PathBuf {
    config_dir().join("config.yaml")
}

fn dirs_home() -> PathBuf {
    std::env::var("HOME")
        .or_else(|_| std::env::var("USERPROFILE"))
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("."))
}

/// Load config from `~/.squitter/config.yaml`.
///
/// Returns default config if the file doesn't exist or can't be read.
pub fn load_config() -> Config {
    let path = config_file();
    match load_config_from(&path) {
        Ok(config) => config,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "falling back to default config");
            Config::default()
        }
    }
}

/// Load config from an explicit path. A missing file yields the defaults.
pub fn load_config_from(path: &Path) -> Result<Config> {
    if !path.exists() {
        return Ok(Config::default());
    }
    let text = std::fs::read_to_string(path)?;
    Ok(parse_config(&text))
}

/// Save config to `~/.squitter/config.yaml`.
pub fn save_config(config: &Config) -> Result<PathBuf> {
    let path = config_file();
    save_config_to(config, &path)?;
    Ok(path)
}

/// Save config to an explicit path, creating parent directories.
pub fn save_config_to(config: &Config, path: &Path) -> Result<()> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).map_err(|e| AdsbError::Config(e.to_string()))?;
    }
    std::fs::write(path, serialize_config(config)).map_err(|e| AdsbError::Config(e.to_string()))
}

/// Parse simple YAML-like config text.
///
/// Unknown keys are ignored; unparseable values keep their default.
pub fn parse_config(text: &str) -> Config {
    let mut config = Config::default();
    let mut current_section: Option<String> = None;

    for line in text.lines() {
        let stripped = line.trim();
        if stripped.is_empty() || stripped.starts_with('#') {
            continue;
        }

        let is_indented = line.starts_with("  ") || line.starts_with('\t');

        let Some((key, val)) = stripped.split_once(':') else {
            continue;
        };
        let key = key.trim();
        let val = val.trim();

        if !is_indented {
            current_section = val.is_empty().then(|| key.to_string());
            continue;
        }

        let Some(section) = current_section.as_deref() else {
            continue;
        };
        match (section, key) {
            ("receiver", "name") => {
                if let Some(v) = parse_string_value(val) {
                    config.receiver.name = v;
                }
            }
            ("receiver", "lat") => config.receiver.lat = parse_float_value(val),
            ("receiver", "lon") => config.receiver.lon = parse_float_value(val),
            ("directory", "capacity") => set_parsed(&mut config.directory.capacity, key, val),
            ("directory", "stale_timeout") => {
                set_parsed(&mut config.directory.stale_timeout, key, val)
            }
            ("directory", "admission") => {
                if let Some(v) = parse_string_value(val) {
                    set_parsed(&mut config.directory.admission, key, &v);
                }
            }
            ("cpr", "airborne_max_skew") => set_parsed(&mut config.cpr.airborne_max_skew, key, val),
            ("cpr", "surface_max_skew") => set_parsed(&mut config.cpr.surface_max_skew, key, val),
            ("cpr", "local_max_age") => set_parsed(&mut config.cpr.local_max_age, key, val),
            ("cpr", "airborne_local_range_nm") => {
                set_parsed(&mut config.cpr.airborne_local_range_nm, key, val)
            }
            ("cpr", "surface_local_range_nm") => {
                set_parsed(&mut config.cpr.surface_local_range_nm, key, val)
            }
            _ => {}
        }
    }

    config
}

fn set_parsed<T: FromStr>(slot: &mut T, key: &str, val: &str) {
    match val.parse() {
        Ok(v) => *slot = v,
        Err(_) => warn!(key, value = val, "ignoring invalid config value"),
    }
}

fn parse_string_value(val: &str) -> Option<String> {
    if val == "null" || val == "~" || val.is_empty() {
        return None;
    }
    // Strip quotes
    if val.len() >= 2
        && ((val.starts_with('"') && val.ends_with('"'))
            || (val.starts_with('\'') && val.ends_with('\'')))
    {
        return Some(val[1..val.len() - 1].to_string());
    }
    Some(val.to_string())
}

fn parse_float_value(val: &str) -> Option<f64> {
    if val == "null" || val == "~" || val.is_empty() {
        return None;
    }
    val.parse().ok()
}

/// Serialize config to YAML-like text.
pub fn serialize_config(config: &Config) -> String {
    let mut lines = vec!["# squitter configuration".to_string(), String::new()];

    lines.push("receiver:".into());
    lines.push(format!("  name: \"{}\"", config.receiver.name));
    match config.receiver.lat {
        Some(v) => lines.push(format!("  lat: {v}")),
        None => lines.push("  lat: null".into()),
    }
    match config.receiver.lon {
        Some(v) => lines.push(format!("  lon: {v}")),
        None => lines.push("  lon: null".into()),
    }
    lines.push(String::new());

    lines.push("directory:".into());
    lines.push(format!("  capacity: {}", config.directory.capacity));
    lines.push(format!("  stale_timeout: {}", config.directory.stale_timeout));
    lines.push(format!("  admission: {}", config.directory.admission));
    lines.push(String::new());

    lines.push("cpr:".into());
    lines.push(format!("  airborne_max_skew: {}", config.cpr.airborne_max_skew));
    lines.push(format!("  surface_max_skew: {}", config.cpr.surface_max_skew));
    lines.push(format!("  local_max_age: {}", config.cpr.local_max_age));
    lines.push(format!(
        "  airborne_local_range_nm: {}",
        config.cpr.airborne_local_range_nm
    ));
    lines.push(format!(
        "  surface_local_range_nm: {}",
        config.cpr.surface_local_range_nm
    ));

    lines.join("\n") + "\n"
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
