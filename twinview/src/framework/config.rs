use std::env;
use std::fs;
use std::io::ErrorKind;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories_next::BaseDirs;
use serde::{Deserialize, Serialize};
use serde_yml::Value;
use yaml_merge_keys::merge_keys_serde_yml;

use crate::compose::Region;
use crate::scene::{DisplayChannel, Scene};

pub const DEFAULT_OSC_PORT: u16 = 2346;
pub const CONFIG_FILE_NAME: &str = "engine.yaml";

/// Position of both displays on the combined output surface. Each display is
/// `width` x `height`; the left one starts at `left_x`, the right one at
/// `right_x`, both at `y`.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct DisplayLayout {
    pub width: u32,
    pub height: u32,
    pub left_x: u32,
    pub right_x: u32,
    pub y: u32,
}

impl Default for DisplayLayout {
    fn default() -> Self {
        Self {
            width: 720,
            height: 720,
            left_x: 0,
            right_x: 720,
            y: 0,
        }
    }
}

impl DisplayLayout {
    pub fn region(&self, channel: DisplayChannel) -> Region {
        let x = match channel {
            DisplayChannel::Left => self.left_x,
            DisplayChannel::Right => self.right_x,
        };

        Region {
            x,
            y: self.y,
            width: self.width,
            height: self.height,
        }
    }

    /// Size of the combined surface both displays are carved out of.
    pub fn output_size(&self) -> [u32; 2] {
        let right_edge = self
            .left_x
            .max(self.right_x)
            .saturating_add(self.width);
        [right_edge, self.y.saturating_add(self.height)]
    }
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct EngineConfig {
    pub fps: f32,
    pub display: DisplayLayout,
    /// Seconds.
    pub transition_duration: f32,
    pub default_scene: String,
    pub fallback_scene: String,
    pub graceful_timeout_ms: u64,
    pub status_interval_ms: u64,
    pub osc_port: u16,
    pub status_addr: Option<String>,
    pub x_display: Option<String>,
    pub clear_color: [f32; 4],
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            fps: 60.0,
            display: DisplayLayout::default(),
            transition_duration: 0.5,
            default_scene: "idle".to_string(),
            fallback_scene: "debug".to_string(),
            graceful_timeout_ms: 2000,
            status_interval_ms: 100,
            osc_port: DEFAULT_OSC_PORT,
            status_addr: None,
            x_display: None,
            clear_color: [0.0, 0.0, 0.0, 1.0],
        }
    }
}

impl EngineConfig {
    pub fn default_path() -> Option<PathBuf> {
        BaseDirs::new()
            .map(|base| base.config_dir().join("Twinview").join(CONFIG_FILE_NAME))
    }

    /// Loads `path`, or defaults when the file does not exist, then applies
    /// environment overrides and validates.
    pub fn load_or_default(path: &Path) -> Result<Self, String> {
        let mut config = match fs::read_to_string(path) {
            Ok(source) => Self::from_yaml(&source).map_err(|err| {
                format!("failed to load config '{}': {}", path.display(), err)
            })?,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                log::info!(
                    "config '{}' not found; using defaults",
                    path.display()
                );
                Self::default()
            }
            Err(err) => {
                return Err(format!(
                    "failed to read config '{}': {}",
                    path.display(),
                    err
                ));
            }
        };

        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_yaml(source: &str) -> Result<Self, String> {
        let raw: Value = serde_yml::from_str(source)
            .map_err(|err| format!("invalid YAML: {}", err))?;

        if raw.is_null() {
            return Ok(Self::default());
        }

        let merged = merge_keys_serde_yml(raw).map_err(|err| {
            format!("failed to process YAML merge keys: {}", err)
        })?;

        serde_yml::from_value(merged)
            .map_err(|err| format!("invalid engine config: {}", err))
    }

    pub fn apply_env_overrides(&mut self) -> Result<(), String> {
        if let Ok(port) = env::var("TWINVIEW_OSC_PORT") {
            self.osc_port = port.trim().parse().map_err(|err| {
                format!("TWINVIEW_OSC_PORT '{}' is not a port: {}", port, err)
            })?;
        }

        if let Ok(addr) = env::var("TWINVIEW_STATUS_ADDR") {
            let addr = addr.trim();
            self.status_addr =
                (!addr.is_empty()).then(|| addr.to_string());
        }

        if let Ok(display) = env::var("TWINVIEW_X_DISPLAY") {
            let display = display.trim();
            self.x_display =
                (!display.is_empty()).then(|| display.to_string());
        }

        Ok(())
    }

    pub fn validate(&self) -> Result<(), String> {
        if !self.fps.is_finite() || self.fps <= 0.0 {
            return Err(format!("fps must be positive, got {}", self.fps));
        }

        if self.display.width == 0 || self.display.height == 0 {
            return Err(format!(
                "display size must be non-zero, got {}x{}",
                self.display.width, self.display.height
            ));
        }

        if !self.transition_duration.is_finite()
            || self.transition_duration <= 0.0
        {
            return Err(format!(
                "transition_duration must be positive, got {}",
                self.transition_duration
            ));
        }

        for (field, name) in [
            ("default_scene", &self.default_scene),
            ("fallback_scene", &self.fallback_scene),
        ] {
            Scene::from_name(name)
                .map_err(|err| format!("invalid {}: {}", field, err))?;
        }

        if let Some(addr) = self.status_addr.as_deref() {
            addr.parse::<SocketAddr>().map_err(|err| {
                format!("invalid status_addr '{}': {}", addr, err)
            })?;
        }

        Ok(())
    }

    pub fn default_scene(&self) -> Scene {
        Scene::from_name(&self.default_scene)
            .unwrap_or_else(|_| Scene::generated("idle"))
    }

    pub fn fallback_scene(&self) -> Scene {
        Scene::from_name(&self.fallback_scene).unwrap_or(Scene::Debug)
    }

    pub fn graceful_timeout(&self) -> Duration {
        Duration::from_millis(self.graceful_timeout_ms)
    }

    pub fn status_interval(&self) -> Duration {
        Duration::from_millis(self.status_interval_ms)
    }
}

/// Command-line values that win over the config file, including after an
/// `engine/reload`.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ConfigOverrides {
    pub default_scene: Option<String>,
    pub fps: Option<f32>,
}

impl ConfigOverrides {
    pub fn apply(&self, config: &mut EngineConfig) {
        if let Some(scene) = self.default_scene.as_ref() {
            config.default_scene = scene.clone();
        }
        if let Some(fps) = self.fps {
            config.fps = fps;
        }
    }
}
