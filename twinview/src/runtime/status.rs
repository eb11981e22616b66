use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use log::{trace, warn};
use serde::Serialize;

use crate::scene::DisplayChannel;

pub const STATUS_SCENE_TOPIC: &str = "status/scene";
pub const STATUS_LIVENESS_TOPIC: &str = "status/liveness";
pub const STATUS_ERROR_TOPIC: &str = "status/error";

/// Destination for outbound status messages.
pub trait StatusSink {
    fn publish(&mut self, topic: &str, payload: &str) -> Result<(), String>;
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ChannelStatus {
    pub current: String,
    pub next: String,
    pub transitioning: bool,
    pub progress: f32,
}

impl ChannelStatus {
    fn same_state(&self, other: &ChannelStatus) -> bool {
        self.current == other.current
            && self.next == other.next
            && self.transitioning == other.transitioning
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SceneStatus {
    pub left: ChannelStatus,
    pub right: ChannelStatus,
}

impl SceneStatus {
    fn same_state(&self, other: &SceneStatus) -> bool {
        self.left.same_state(&other.left) && self.right.same_state(&other.right)
    }
}

#[derive(Serialize)]
struct LivenessStatus {
    connected: bool,
}

#[derive(Serialize)]
struct ErrorStatus<'a> {
    channel: DisplayChannel,
    message: &'a str,
}

/// Fans status out to sinks and remembers the last value of each retained
/// topic so late subscribers start from the current state.
pub struct StatusPublisher {
    sinks: Vec<Box<dyn StatusSink>>,
    retained: BTreeMap<&'static str, String>,
    last_scene: Option<SceneStatus>,
    last_scene_publish: Option<Instant>,
    last_liveness: Option<bool>,
    interval: Duration,
}

impl StatusPublisher {
    pub fn new(interval: Duration) -> Self {
        Self {
            sinks: Vec::new(),
            retained: BTreeMap::new(),
            last_scene: None,
            last_scene_publish: None,
            last_liveness: None,
            interval,
        }
    }

    pub fn set_interval(&mut self, interval: Duration) {
        self.interval = interval;
    }

    pub fn retained(&self, topic: &str) -> Option<&str> {
        self.retained.get(topic).map(String::as_str)
    }

    pub fn subscribe(&mut self, mut sink: Box<dyn StatusSink>) {
        for (topic, payload) in &self.retained {
            if let Err(err) = sink.publish(topic, payload) {
                warn!("failed to replay '{}' to new subscriber: {}", topic, err);
            }
        }
        self.sinks.push(sink);
    }

    /// Publishes on any change of scene state, and progress-only changes at
    /// most once per interval. Returns true when something was sent.
    pub fn publish_scene(&mut self, status: &SceneStatus, now: Instant) -> bool {
        let due = match (self.last_scene.as_ref(), self.last_scene_publish) {
            (None, _) | (_, None) => true,
            (Some(last), Some(at)) => {
                if !last.same_state(status) {
                    true
                } else if last == status {
                    false
                } else {
                    now.saturating_duration_since(at) >= self.interval
                }
            }
        };

        if !due {
            return false;
        }

        self.last_scene = Some(status.clone());
        self.last_scene_publish = Some(now);
        self.publish_retained(STATUS_SCENE_TOPIC, status);
        true
    }

    pub fn publish_liveness(&mut self, connected: bool) {
        if self.last_liveness == Some(connected) {
            return;
        }

        self.last_liveness = Some(connected);
        self.publish_retained(
            STATUS_LIVENESS_TOPIC,
            &LivenessStatus { connected },
        );
    }

    pub fn publish_error(&mut self, channel: DisplayChannel, message: &str) {
        let payload = ErrorStatus { channel, message };
        match serde_json::to_string(&payload) {
            Ok(json) => self.send(STATUS_ERROR_TOPIC, &json),
            Err(err) => warn!("failed to encode error status: {}", err),
        }
    }

    fn publish_retained<T: Serialize>(&mut self, topic: &'static str, value: &T) {
        let json = match serde_json::to_string(value) {
            Ok(json) => json,
            Err(err) => {
                warn!("failed to encode '{}': {}", topic, err);
                return;
            }
        };

        self.send(topic, &json);
        self.retained.insert(topic, json);
    }

    fn send(&mut self, topic: &str, payload: &str) {
        trace!("status {} {}", topic, payload);
        for sink in &mut self.sinks {
            if let Err(err) = sink.publish(topic, payload) {
                warn!("failed to publish '{}': {}", topic, err);
            }
        }
    }
}
