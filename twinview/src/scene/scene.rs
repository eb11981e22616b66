use std::fmt;

use serde::{Deserialize, Serialize};

pub const DEBUG_SCENE_NAME: &str = "debug";
pub const EXTERNAL_APP_SCENE_NAME: &str = "app";

/// One of the two physical displays.
#[derive(
    Clone, Copy, Debug, Deserialize, Serialize, Eq, Hash, Ord, PartialEq,
    PartialOrd,
)]
#[serde(rename_all = "lowercase")]
pub enum DisplayChannel {
    Left,
    Right,
}

impl DisplayChannel {
    pub const ALL: [DisplayChannel; 2] =
        [DisplayChannel::Left, DisplayChannel::Right];

    pub fn as_str(&self) -> &'static str {
        match self {
            DisplayChannel::Left => "left",
            DisplayChannel::Right => "right",
        }
    }
}

impl fmt::Display for DisplayChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Addressing mode for inbound commands. `Both` is a fan-out alias and never
/// carries state of its own.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ChannelTarget {
    Left,
    Right,
    Both,
}

impl ChannelTarget {
    pub fn parse(value: &str) -> Result<Self, String> {
        match value.trim().to_ascii_lowercase().as_str() {
            "left" => Ok(ChannelTarget::Left),
            "right" => Ok(ChannelTarget::Right),
            "both" => Ok(ChannelTarget::Both),
            other => Err(format!("unknown display channel '{}'", other)),
        }
    }

    pub fn channels(&self) -> &'static [DisplayChannel] {
        match self {
            ChannelTarget::Left => &[DisplayChannel::Left],
            ChannelTarget::Right => &[DisplayChannel::Right],
            ChannelTarget::Both => &DisplayChannel::ALL,
        }
    }
}

impl From<DisplayChannel> for ChannelTarget {
    fn from(channel: DisplayChannel) -> Self {
        match channel {
            DisplayChannel::Left => ChannelTarget::Left,
            DisplayChannel::Right => ChannelTarget::Right,
        }
    }
}

#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub enum Scene {
    Generated(String),
    Debug,
    ExternalApp,
}

impl Scene {
    pub fn generated(name: impl Into<String>) -> Self {
        Scene::Generated(name.into())
    }

    /// Maps a wire name to a scene. `app` is reserved: the external app scene
    /// is only entered through `app/start`.
    pub fn from_name(name: &str) -> Result<Self, String> {
        let name = name.trim();
        if name.is_empty() {
            return Err("scene name is empty".to_string());
        }

        match name {
            DEBUG_SCENE_NAME => Ok(Scene::Debug),
            EXTERNAL_APP_SCENE_NAME => Err(format!(
                "scene '{}' can only be entered with app/start",
                EXTERNAL_APP_SCENE_NAME
            )),
            other => Ok(Scene::Generated(other.to_string())),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Scene::Generated(name) => name,
            Scene::Debug => DEBUG_SCENE_NAME,
            Scene::ExternalApp => EXTERNAL_APP_SCENE_NAME,
        }
    }

    pub fn is_external_app(&self) -> bool {
        matches!(self, Scene::ExternalApp)
    }
}

impl fmt::Display for Scene {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
