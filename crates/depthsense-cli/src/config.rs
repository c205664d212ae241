//! Configuration vault – reads/writes `~/.depthsense/config.toml`.

use std::fs;
use std::path::{Path, PathBuf};

use depthsense_sensors::SensorSettings;
use depthsense_types::SensingMode;
use serde::{Deserialize, Serialize};

/// The simulated camera the CLI drives.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            width: 640,
            height: 480,
            fps: 30,
        }
    }
}

/// Persisted user configuration stored in `~/.depthsense/config.toml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Mode activated at startup.
    #[serde(default = "default_mode")]
    pub mode: SensingMode,

    /// Platform signature used for capability probing (e.g. a user agent).
    #[serde(default = "default_device")]
    pub device: String,

    /// Whether a GPU compute backend is available for the monocular network.
    #[serde(default)]
    pub gpu_compute: bool,

    #[serde(default)]
    pub camera: CameraConfig,

    #[serde(default)]
    pub sensors: SensorSettings,
}

fn default_mode() -> SensingMode {
    SensingMode::Hands
}

fn default_device() -> String {
    format!("{} {}", std::env::consts::OS, std::env::consts::ARCH)
}

impl Default for Config {
    fn default() -> Self {
        Self {
            mode: default_mode(),
            device: default_device(),
            gpu_compute: false,
            camera: CameraConfig::default(),
            sensors: SensorSettings::default(),
        }
    }
}

/// Return the path to `~/.depthsense/config.toml`.
pub fn config_path() -> PathBuf {
    config_path_for_home(
        &std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .unwrap_or_else(|_| ".".to_string()),
    )
}

pub(crate) fn config_path_for_home(home: &str) -> PathBuf {
    PathBuf::from(home).join(".depthsense").join("config.toml")
}

/// Load the config, writing first-run defaults when the file is missing.
///
/// Returns the config and whether it was freshly created.
pub fn load_or_init() -> Result<(Config, bool), String> {
    load_or_init_at(&config_path())
}

pub(crate) fn load_or_init_at(path: &Path) -> Result<(Config, bool), String> {
    match load_from(path)? {
        Some(cfg) => Ok((cfg, false)),
        None => {
            let cfg = Config::default();
            save_to(&cfg, path)?;
            let mut effective = cfg;
            apply_env_overrides(&mut effective);
            Ok((effective, true))
        }
    }
}

/// Load the config from a specific path.  `None` when it does not exist.
pub(crate) fn load_from(path: &Path) -> Result<Option<Config>, String> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path).map_err(|e| format!("Failed to read config at {}: {}", path.display(), e))?;
    let mut cfg: Config = toml::from_str(&raw).map_err(|e| format!("Failed to parse config: {}", e))?;
    apply_env_overrides(&mut cfg);
    Ok(Some(cfg))
}

/// Apply `DEPTHSENSE_*` environment overrides.
///
/// | Variable | Config field |
/// |---|---|
/// | `DEPTHSENSE_MODE` | `mode` (`hands`, `depth-session`, `multi-model`, `monocular`, `none`) |
/// | `DEPTHSENSE_DEVICE` | `device` |
/// | `DEPTHSENSE_GPU` | `gpu_compute` (`1`/`true`/`yes` or `0`/`false`/`no`) |
pub fn apply_env_overrides(cfg: &mut Config) {
    apply_overrides(cfg, |key| std::env::var(key).ok());
}

fn apply_overrides(cfg: &mut Config, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(v) = lookup("DEPTHSENSE_MODE")
        && let Ok(mode) = v.parse::<SensingMode>()
    {
        cfg.mode = mode;
    }
    if let Some(v) = lookup("DEPTHSENSE_DEVICE")
        && !v.trim().is_empty()
    {
        cfg.device = v;
    }
    if let Some(v) = lookup("DEPTHSENSE_GPU")
        && let Some(gpu) = parse_flag(&v)
    {
        cfg.gpu_compute = gpu;
    }
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Save the config to a specific path, creating its directory.
pub(crate) fn save_to(cfg: &Config, path: &Path) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| format!("Failed to create config directory: {}", e))?;
    }
    let raw = toml::to_string_pretty(cfg).map_err(|e| format!("Failed to serialize config: {}", e))?;
    fs::write(path, raw).map_err(|e| format!("Failed to write config at {}: {}", path.display(), e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn roundtrip_default_config() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());

        let cfg = Config::default();
        save_to(&cfg, &path).expect("save");

        let raw = fs::read_to_string(&path).expect("read");
        let loaded: Config = toml::from_str(&raw).expect("parse");
        assert_eq!(loaded, cfg);
        assert_eq!(loaded.sensors.hands.sources.len(), 3);
    }

    #[test]
    fn first_run_writes_defaults() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());
        assert!(load_from(&path).expect("no error").is_none());

        let (_, created) = load_or_init_at(&path).expect("init");
        assert!(created);
        assert!(path.exists());

        let (_, created) = load_or_init_at(&path).expect("reload");
        assert!(!created);
    }

    #[test]
    fn partial_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = dir.path().join("config.toml");
        fs::write(&path, "mode = \"monocular\"\n\n[sensors.monocular]\nnear_threshold_m = 1.5\n").expect("write");

        let cfg: Config = toml::from_str(&fs::read_to_string(&path).expect("read")).expect("parse");
        assert_eq!(cfg.mode, SensingMode::Monocular);
        assert_eq!(cfg.sensors.monocular.near_threshold_m, 1.5);
        assert_eq!(cfg.sensors.monocular.grid_size, 8);
        assert_eq!(cfg.camera, CameraConfig::default());
    }

    #[test]
    fn invalid_toml_is_an_error() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = dir.path().join("config.toml");
        fs::write(&path, "mode = [").expect("write");
        assert!(load_from(&path).is_err());
    }

    #[test]
    fn config_path_points_to_depthsense_dir() {
        let p = config_path_for_home("/home/testuser");
        assert!(p.to_string_lossy().contains(".depthsense"));
        assert!(p.to_string_lossy().ends_with("config.toml"));
    }

    #[test]
    fn env_overrides_apply() {
        let mut cfg = Config::default();
        apply_overrides(
            &mut cfg,
            lookup(&[
                ("DEPTHSENSE_MODE", "depth-session"),
                ("DEPTHSENSE_DEVICE", "OculusBrowser Quest 3"),
                ("DEPTHSENSE_GPU", "yes"),
            ]),
        );
        assert_eq!(cfg.mode, SensingMode::DepthSession);
        assert_eq!(cfg.device, "OculusBrowser Quest 3");
        assert!(cfg.gpu_compute);
    }

    #[test]
    fn invalid_overrides_are_ignored() {
        let mut cfg = Config::default();
        apply_overrides(&mut cfg, lookup(&[("DEPTHSENSE_MODE", "lidar"), ("DEPTHSENSE_GPU", "maybe")]));
        assert_eq!(cfg, Config::default());
    }
}
