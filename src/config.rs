use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use crate::device::DisplaySize;

const DEFAULT_FPS: u32 = 30;
const DEFAULT_DISPLAY_WIDTH: u32 = 1920;
const DEFAULT_DISPLAY_HEIGHT: u32 = 1080;
const MAX_FPS: u32 = 240;

// ----------------------------------------------------------------------------
// Kernel settings (process configuration)
// ----------------------------------------------------------------------------

#[derive(Debug, Deserialize, Default)]
struct KernelConfigFile {
    settings_path: Option<PathBuf>,
    mode: Option<PathBuf>,
    fps: Option<u32>,
    display: Option<DisplayConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct DisplayConfigFile {
    width: Option<u32>,
    height: Option<u32>,
}

/// Process-level configuration for the replay and check tools.
///
/// Layers: optional file named by `GESTURE_CONFIG`, then built-in defaults,
/// then `GESTURE_SETTINGS` / `GESTURE_MODE` / `GESTURE_FPS` overrides.
#[derive(Debug, Clone)]
pub struct KernelSettings {
    pub settings_path: Option<PathBuf>,
    pub mode_path: Option<PathBuf>,
    pub fps: u32,
    pub display: DisplaySize,
}

impl KernelSettings {
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("GESTURE_CONFIG").ok();
        let file_cfg = match config_path.as_deref() {
            Some(path) => Some(read_config_file(Path::new(path))?),
            None => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default());
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: KernelConfigFile) -> Self {
        let display = DisplaySize {
            width: file
                .display
                .as_ref()
                .and_then(|d| d.width)
                .unwrap_or(DEFAULT_DISPLAY_WIDTH),
            height: file
                .display
                .as_ref()
                .and_then(|d| d.height)
                .unwrap_or(DEFAULT_DISPLAY_HEIGHT),
        };
        Self {
            settings_path: file.settings_path,
            mode_path: file.mode,
            fps: file.fps.unwrap_or(DEFAULT_FPS),
            display,
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(path) = std::env::var("GESTURE_SETTINGS") {
            if !path.trim().is_empty() {
                self.settings_path = Some(PathBuf::from(path));
            }
        }
        if let Ok(path) = std::env::var("GESTURE_MODE") {
            if !path.trim().is_empty() {
                self.mode_path = Some(PathBuf::from(path));
            }
        }
        if let Ok(fps) = std::env::var("GESTURE_FPS") {
            self.fps = fps
                .trim()
                .parse()
                .map_err(|_| anyhow!("GESTURE_FPS must be a whole number of frames per second"))?;
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.fps == 0 || self.fps > MAX_FPS {
            return Err(anyhow!("fps must be between 1 and {}, got {}", MAX_FPS, self.fps));
        }
        if self.display.width == 0 || self.display.height == 0 {
            return Err(anyhow!("display size must be non-zero"));
        }
        Ok(())
    }

    /// Settings store backed by `settings_path`, or defaults only.
    pub fn open_settings(&self) -> Result<Settings> {
        match &self.settings_path {
            Some(path) if path.exists() => Settings::load(path),
            Some(path) => Ok(Settings::with_defaults().backed_by(path)),
            None => Ok(Settings::with_defaults()),
        }
    }
}

fn read_config_file(path: &Path) -> Result<KernelConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    parse_by_extension(path, &raw)
        .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))
}

/// `.toml` files parse as TOML, everything else as JSON.
fn parse_by_extension<T: serde::de::DeserializeOwned>(path: &Path, raw: &str) -> Result<T> {
    let is_toml = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("toml"))
        .unwrap_or(false);
    if is_toml {
        Ok(toml::from_str(raw)?)
    } else {
        Ok(serde_json::from_str(raw)?)
    }
}

// ----------------------------------------------------------------------------
// Settings store
// ----------------------------------------------------------------------------

/// Tuning values shared by poses, addressed by slash paths such as
/// `"hands/forcefield/forcefields_start"`.
///
/// Clones share one tree. Poses read their tuning at construction; tracking
/// poses write recalibrated box centres back.
#[derive(Clone, Debug)]
pub struct Settings {
    tree: Arc<Mutex<Value>>,
    path: Option<PathBuf>,
}

impl Settings {
    pub fn with_defaults() -> Self {
        Self {
            tree: Arc::new(Mutex::new(default_settings())),
            path: None,
        }
    }

    /// Read a JSON settings file and lay it over the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read settings file {}", path.display()))?;
        let overrides: Value = serde_json::from_str(&raw)
            .with_context(|| format!("invalid settings file {}", path.display()))?;
        let mut tree = default_settings();
        merge(&mut tree, overrides);
        log::info!("settings loaded from {}", path.display());
        Ok(Self {
            tree: Arc::new(Mutex::new(tree)),
            path: Some(path.to_path_buf()),
        })
    }

    pub fn backed_by(mut self, path: &Path) -> Self {
        self.path = Some(path.to_path_buf());
        self
    }

    pub fn get(&self, path: &str) -> Option<Value> {
        let tree = self.tree.lock().unwrap_or_else(|e| e.into_inner());
        let mut node = &*tree;
        for part in split_path(path) {
            node = node.get(part)?;
        }
        Some(node.clone())
    }

    pub fn get_f64(&self, path: &str) -> Result<f64> {
        self.get(path)
            .ok_or_else(|| anyhow!("setting `{}` is missing", path))?
            .as_f64()
            .ok_or_else(|| anyhow!("setting `{}` is not a number", path))
    }

    pub fn get_u64(&self, path: &str) -> Result<u64> {
        self.get(path)
            .ok_or_else(|| anyhow!("setting `{}` is missing", path))?
            .as_u64()
            .ok_or_else(|| anyhow!("setting `{}` is not a non-negative integer", path))
    }

    /// Write a value, creating intermediate tables as needed.
    pub fn set(&self, path: &str, value: impl Into<Value>) -> Result<()> {
        let parts: Vec<&str> = split_path(path).collect();
        let Some((leaf, parents)) = parts.split_last() else {
            return Err(anyhow!("setting path must not be empty"));
        };
        let mut tree = self.tree.lock().unwrap_or_else(|e| e.into_inner());
        let mut node = &mut *tree;
        for part in parents {
            node = node
                .as_object_mut()
                .ok_or_else(|| anyhow!("setting `{}` crosses a non-table value at `{}`", path, part))?
                .entry(part.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
        }
        let table = node
            .as_object_mut()
            .ok_or_else(|| anyhow!("setting `{}` crosses a non-table value", path))?;
        table.insert(leaf.to_string(), value.into());
        Ok(())
    }

    /// Persist to the backing file, if any.
    pub fn save(&self) -> Result<()> {
        match &self.path {
            Some(path) => self.save_to(path),
            None => Ok(()),
        }
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        let json = {
            let tree = self.tree.lock().unwrap_or_else(|e| e.into_inner());
            serde_json::to_string_pretty(&*tree)?
        };
        std::fs::write(path, json)
            .with_context(|| format!("failed to write settings file {}", path.display()))?;
        log::debug!("settings saved to {}", path.display());
        Ok(())
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self::with_defaults()
    }
}

fn split_path(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|part| !part.is_empty())
}

fn merge(base: &mut Value, overrides: Value) {
    match (base, overrides) {
        (Value::Object(base), Value::Object(overrides)) => {
            for (key, value) in overrides {
                match base.get_mut(&key) {
                    Some(existing) => merge(existing, value),
                    None => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (base, value) => *base = value,
    }
}

fn default_settings() -> Value {
    serde_json::json!({
        "camera": { "width": 640, "height": 480 },
        "hands": {
            "forcefield": {
                "forcefields_start": 0.05,
                "forcefields_end": 0.25
            },
            "zoom": {
                "frames_for_switch": 3,
                "movement_threshold": 0.02,
                "starting_distance": 1.0,
                "frames_held": 0
            }
        },
        "head": {
            "tilt_left": -0.2,
            "tilt_right": 0.2,
            "turn_left": -0.002,
            "turn_right": 0.002
        },
        "nose_tracking": {
            "scaling_factor_x": 20.0,
            "scaling_factor_y": 20.0,
            "nose_box_percentage_size_x": 0.05,
            "nose_box_percentage_size_y": 0.05,
            "nose_box_centre_x_percentage": 0.5,
            "nose_box_centre_y_percentage": 0.5
        },
        "bp_tracking": {
            "scaling_factor_x": 20.0,
            "scaling_factor_y": 20.0,
            "bp_box_percentage_size_x": 0.1,
            "bp_box_percentage_size_y": 0.1,
            "bp_box_centre_x_percentage": 0.5,
            "bp_box_centre_y_percentage": 0.5
        }
    })
}

// ----------------------------------------------------------------------------
// Mode files
// ----------------------------------------------------------------------------

/// Declarative mode: an ordered list of poses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModeFile {
    pub name: String,
    #[serde(default)]
    pub poses: Vec<PoseSpec>,
}

/// One pose entry: its `kind` plus the kind-specific options.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoseSpec {
    pub kind: String,
    #[serde(flatten)]
    pub options: Map<String, Value>,
}

impl PoseSpec {
    pub fn new(kind: &str, options: Value) -> Result<Self> {
        let options = match options {
            Value::Object(map) => map,
            Value::Null => Map::new(),
            other => return Err(anyhow!("pose options must be a table, got {}", other)),
        };
        Ok(Self {
            kind: kind.to_string(),
            options,
        })
    }
}

impl ModeFile {
    pub fn read(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| anyhow!("failed to read mode file {}: {}", path.display(), e))?;
        parse_by_extension(path, &raw)
            .map_err(|e| anyhow!("invalid mode file {}: {}", path.display(), e))
    }
}
