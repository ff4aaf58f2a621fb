//! Reads and writes `~/.volumetra/config.toml`.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use volumetra_hal::{SourceKind, SourceSpec};
use volumetra_perception::DetectorConfig;
use volumetra_runtime::MeasurementLoopConfig;

/// Persisted user configuration stored in `~/.volumetra/config.toml`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub source: SourceSpec,

    #[serde(default)]
    pub detector: DetectorConfig,

    #[serde(default)]
    pub measurement: MeasurementSettings,

    #[serde(default)]
    pub output: OutputSettings,
}

/// `[measurement]` table.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MeasurementSettings {
    /// Material density for the weight readout (g/cm³).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub density_g_per_cm3: Option<f64>,

    /// Start calibrated with this many pixels per millimetre.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initial_pixels_per_mm: Option<f64>,
}

/// `[output]` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputSettings {
    /// Print a status line at least every this many cycles.
    #[serde(default = "default_status_every")]
    pub status_every: u64,

    /// Save annotated frames here when set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snapshot_dir: Option<PathBuf>,

    /// Save every this many cycles.
    #[serde(default = "default_snapshot_every")]
    pub snapshot_every: u64,
}

fn default_status_every() -> u64 {
    15
}
fn default_snapshot_every() -> u64 {
    30
}

impl Default for OutputSettings {
    fn default() -> Self {
        Self {
            status_every: default_status_every(),
            snapshot_dir: None,
            snapshot_every: default_snapshot_every(),
        }
    }
}

impl Config {
    /// The subset the measurement loop needs.
    pub fn loop_config(&self) -> MeasurementLoopConfig {
        MeasurementLoopConfig {
            detector: self.detector.clone(),
            density_g_per_cm3: self.measurement.density_g_per_cm3,
            initial_pixels_per_mm: self.measurement.initial_pixels_per_mm,
        }
    }
}

/// Return the path to `~/.volumetra/config.toml`.
pub fn config_path() -> PathBuf {
    config_path_for_home(
        &std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .unwrap_or_else(|_| ".".to_string()),
    )
}

pub(crate) fn config_path_for_home(home: &str) -> PathBuf {
    PathBuf::from(home).join(".volumetra").join("config.toml")
}

/// Load the config from disk with `VOLUMETRA_*` overrides applied.
/// Returns `None` if the file does not exist.
pub fn load() -> Result<Option<Config>, String> {
    let mut loaded = load_from(&config_path())?;
    if let Some(cfg) = loaded.as_mut() {
        apply_env_overrides(cfg);
    }
    Ok(loaded)
}

/// Settle the startup configuration from the result of [`load`].
///
/// A missing file runs `first_run` (which may prompt and save) and applies
/// the env overrides to its result. A file that cannot be read or parsed is
/// an error: the caller exits rather than silently running with defaults.
pub fn resolve(
    loaded: Result<Option<Config>, String>,
    first_run: impl FnOnce() -> Config,
) -> Result<Config, String> {
    match loaded? {
        Some(cfg) => Ok(cfg),
        None => {
            let mut cfg = first_run();
            apply_env_overrides(&mut cfg);
            Ok(cfg)
        }
    }
}

pub(crate) fn load_from(path: &Path) -> Result<Option<Config>, String> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read config at {}: {}", path.display(), e))?;
    let cfg: Config = toml::from_str(&raw)
        .map_err(|e| format!("Failed to parse config at {}: {}", path.display(), e))?;
    Ok(Some(cfg))
}

/// Apply `VOLUMETRA_*` environment variable overrides to `cfg`.
///
/// | Variable | Config field |
/// |---|---|
/// | `VOLUMETRA_SOURCE` | `source.kind` |
/// | `VOLUMETRA_CAMERA_INDEX` | `source.camera_index` |
/// | `VOLUMETRA_IMAGE_DIR` | `source.image_dir` |
/// | `VOLUMETRA_STREAM_URL` | `source.url` |
/// | `VOLUMETRA_DENSITY` | `measurement.density_g_per_cm3` |
///
/// Unparseable values are ignored.
pub fn apply_env_overrides(cfg: &mut Config) {
    if let Ok(v) = std::env::var("VOLUMETRA_SOURCE")
        && let Ok(kind) = v.parse::<SourceKind>()
    {
        cfg.source.kind = kind;
    }
    if let Ok(v) = std::env::var("VOLUMETRA_CAMERA_INDEX")
        && let Ok(index) = v.trim().parse::<u32>()
    {
        cfg.source.camera_index = index;
    }
    if let Ok(v) = std::env::var("VOLUMETRA_IMAGE_DIR") {
        cfg.source.image_dir = PathBuf::from(v);
    }
    if let Ok(v) = std::env::var("VOLUMETRA_STREAM_URL")
        && !v.trim().is_empty()
    {
        cfg.source.url = Some(v.trim().to_string());
    }
    if let Ok(v) = std::env::var("VOLUMETRA_DENSITY")
        && let Ok(density) = v.trim().parse::<f64>()
    {
        cfg.measurement.density_g_per_cm3 = Some(density);
    }
}

/// Save the config to disk, creating `~/.volumetra/` if necessary.
pub fn save(cfg: &Config) -> Result<(), String> {
    save_to(cfg, &config_path())
}

pub(crate) fn save_to(cfg: &Config, path: &Path) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| format!("Failed to create config directory: {}", e))?;
        // Owner only (rwx------) on Unix.
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(parent, fs::Permissions::from_mode(0o700))
                .map_err(|e| format!("Failed to set config directory permissions: {}", e))?;
        }
    }
    let raw =
        toml::to_string_pretty(cfg).map_err(|e| format!("Failed to serialize config: {}", e))?;
    // Owner read/write only (rw-------) on Unix.
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o600)
            .open(path)
            .and_then(|mut f| {
                use std::io::Write;
                f.write_all(raw.as_bytes())
            })
            .map_err(|e| format!("Failed to write config at {}: {}", path.display(), e))?;
    }
    #[cfg(not(unix))]
    fs::write(path, raw)
        .map_err(|e| format!("Failed to write config at {}: {}", path.display(), e))?;
    Ok(())
}
