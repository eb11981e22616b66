use std::collections::HashSet;
use std::fmt;
use std::path::PathBuf;

use serde::Deserialize;
use serde::de::DeserializeOwned;

use super::events::InboundMessage;
use crate::process::input::KeyAction;
use crate::scene::{ChannelTarget, Scene, SceneRegistry};

pub const SCENE_SET_TOPIC: &str = "scene/set";
pub const APP_START_TOPIC: &str = "app/start";
pub const APP_STOP_TOPIC: &str = "app/stop";
pub const APP_KILL_TOPIC: &str = "app/kill";
pub const INPUT_FORWARD_TOPIC: &str = "input/forward";
pub const ENGINE_RELOAD_TOPIC: &str = "engine/reload";

pub const INBOUND_TOPICS: [&str; 6] = [
    SCENE_SET_TOPIC,
    APP_START_TOPIC,
    APP_STOP_TOPIC,
    APP_KILL_TOPIC,
    INPUT_FORWARD_TOPIC,
    ENGINE_RELOAD_TOPIC,
];

/// Result of applying a command to one channel.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum DispatchOutcome {
    Applied,
    Ignored(String),
    Failed(String),
}

impl DispatchOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, DispatchOutcome::Applied)
    }
}

impl fmt::Display for DispatchOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DispatchOutcome::Applied => f.write_str("applied"),
            DispatchOutcome::Ignored(reason) => write!(f, "ignored: {}", reason),
            DispatchOutcome::Failed(reason) => write!(f, "failed: {}", reason),
        }
    }
}

/// A validated inbound command.
#[derive(Clone, Debug, PartialEq)]
pub enum Command {
    SetScene {
        target: ChannelTarget,
        scene: Scene,
        duration: Option<f32>,
    },
    StartApp {
        target: ChannelTarget,
        path: PathBuf,
        args: Vec<String>,
        duration: Option<f32>,
    },
    StopApp {
        target: ChannelTarget,
        graceful: bool,
    },
    ForwardInput {
        target: ChannelTarget,
        key: String,
        action: KeyAction,
    },
    Reload {
        target: ChannelTarget,
    },
}

#[derive(Deserialize)]
struct SceneSetPayload {
    channel: String,
    name: String,
    #[serde(default)]
    transition_duration: Option<f32>,
}

#[derive(Deserialize)]
struct AppStartPayload {
    channel: String,
    path: String,
    #[serde(default)]
    args: Vec<String>,
    #[serde(default)]
    transition_duration: Option<f32>,
}

#[derive(Deserialize)]
struct ChannelPayload {
    channel: String,
}

#[derive(Deserialize)]
struct InputForwardPayload {
    channel: String,
    key: String,
    action: String,
}

#[derive(Default, Deserialize)]
struct ReloadPayload {
    #[serde(default)]
    channel: Option<String>,
}

/// Validates inbound messages into [`Command`]s. Anything malformed is
/// rejected before it can touch engine state.
#[derive(Clone, Debug, Default)]
pub struct CommandGateway {
    scenes: HashSet<String>,
}

impl CommandGateway {
    pub fn new<I, S>(scenes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            scenes: scenes.into_iter().map(Into::into).collect(),
        }
    }

    pub fn from_registry(registry: &SceneRegistry) -> Self {
        Self::new(registry.scene_names().iter().cloned())
    }

    pub fn knows_scene(&self, scene: &Scene) -> bool {
        match scene {
            Scene::Generated(name) => self.scenes.contains(name),
            Scene::Debug => true,
            Scene::ExternalApp => false,
        }
    }

    pub fn parse(&self, message: &InboundMessage) -> Result<Command, String> {
        let topic = message.topic.trim().trim_start_matches('/');

        match topic {
            SCENE_SET_TOPIC => {
                let payload: SceneSetPayload = decode(topic, &message.payload)?;
                let scene = Scene::from_name(&payload.name)?;
                if !self.knows_scene(&scene) {
                    return Err(format!("unknown scene '{}'", payload.name));
                }

                Ok(Command::SetScene {
                    target: ChannelTarget::parse(&payload.channel)?,
                    scene,
                    duration: payload.transition_duration,
                })
            }
            APP_START_TOPIC => {
                let payload: AppStartPayload = decode(topic, &message.payload)?;
                if payload.path.trim().is_empty() {
                    return Err("app path is empty".to_string());
                }

                Ok(Command::StartApp {
                    target: ChannelTarget::parse(&payload.channel)?,
                    path: PathBuf::from(payload.path.trim()),
                    args: payload.args,
                    duration: payload.transition_duration,
                })
            }
            APP_STOP_TOPIC | APP_KILL_TOPIC => {
                let payload: ChannelPayload = decode(topic, &message.payload)?;
                Ok(Command::StopApp {
                    target: ChannelTarget::parse(&payload.channel)?,
                    graceful: topic == APP_STOP_TOPIC,
                })
            }
            INPUT_FORWARD_TOPIC => {
                let payload: InputForwardPayload =
                    decode(topic, &message.payload)?;
                if payload.key.trim().is_empty() {
                    return Err("key is empty".to_string());
                }

                Ok(Command::ForwardInput {
                    target: ChannelTarget::parse(&payload.channel)?,
                    key: payload.key.trim().to_string(),
                    action: KeyAction::parse(&payload.action)?,
                })
            }
            ENGINE_RELOAD_TOPIC => {
                let payload: ReloadPayload = if message.payload.trim().is_empty()
                {
                    ReloadPayload::default()
                } else {
                    decode(topic, &message.payload)?
                };

                let target = match payload.channel.as_deref() {
                    Some(channel) => ChannelTarget::parse(channel)?,
                    None => ChannelTarget::Both,
                };

                Ok(Command::Reload { target })
            }
            other => Err(format!("unknown topic '{}'", other)),
        }
    }
}

fn decode<T: DeserializeOwned>(topic: &str, payload: &str) -> Result<T, String> {
    serde_json::from_str(payload)
        .map_err(|err| format!("invalid '{}' payload: {}", topic, err))
}
