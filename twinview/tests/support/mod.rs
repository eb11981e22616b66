#![allow(dead_code)]

use std::env;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use twinview::compose::SoftwareBackend;
use twinview::framework::config::{DisplayLayout, EngineConfig};
use twinview::process::{KeyAction, KeyForwarder};
use twinview::runtime::engine::Engine;
use twinview::runtime::events::InboundMessage;
use twinview::runtime::gateway::CommandGateway;
use twinview::runtime::status::StatusSink;

pub const SCENES: [&str; 2] = ["idle", "plasma"];
pub const FRAME: f32 = 1.0 / 60.0;

pub fn gpu_tests_enabled() -> bool {
    env::var("TWINVIEW_RUN_GPU_TESTS").is_ok_and(|value| value == "1")
}

/// Two 8x8 displays side by side; keeps software targets tiny.
pub fn small_config() -> EngineConfig {
    EngineConfig {
        display: DisplayLayout {
            width: 8,
            height: 8,
            left_x: 0,
            right_x: 8,
            y: 0,
        },
        transition_duration: 0.5,
        graceful_timeout_ms: 500,
        ..EngineConfig::default()
    }
}

pub fn software_engine(config: EngineConfig) -> Engine<SoftwareBackend> {
    let backend =
        SoftwareBackend::new(config.display.output_size(), SCENES);

    Engine::new(backend, config, CommandGateway::new(SCENES))
        .expect("engine should build")
        .with_forwarder(Box::new(RecordingForwarder::default()))
}

pub fn message(topic: &str, payload: &str) -> InboundMessage {
    InboundMessage::new(topic, payload)
}

pub fn tick(engine: &mut Engine<SoftwareBackend>) {
    engine.tick(FRAME, Instant::now()).expect("tick should succeed");
}

pub fn tick_n(engine: &mut Engine<SoftwareBackend>, frames: usize) {
    for _ in 0..frames {
        tick(engine);
    }
}

/// Ticks until `done` holds, up to `max` frames. Returns the frames used.
pub fn tick_until<F>(
    engine: &mut Engine<SoftwareBackend>,
    max: usize,
    mut done: F,
) -> Option<usize>
where
    F: FnMut(&Engine<SoftwareBackend>) -> bool,
{
    for frame in 1..=max {
        tick(engine);
        if done(engine) {
            return Some(frame);
        }
    }
    None
}

#[derive(Clone, Default)]
pub struct MemorySink {
    pub messages: Arc<Mutex<Vec<(String, String)>>>,
}

impl MemorySink {
    pub fn topics(&self) -> Vec<String> {
        self.messages
            .lock()
            .expect("sink lock")
            .iter()
            .map(|(topic, _)| topic.clone())
            .collect()
    }

    pub fn last(&self, topic: &str) -> Option<String> {
        self.messages
            .lock()
            .expect("sink lock")
            .iter()
            .rev()
            .find(|(t, _)| t == topic)
            .map(|(_, payload)| payload.clone())
    }
}

impl StatusSink for MemorySink {
    fn publish(&mut self, topic: &str, payload: &str) -> Result<(), String> {
        self.messages
            .lock()
            .expect("sink lock")
            .push((topic.to_string(), payload.to_string()));
        Ok(())
    }
}

#[derive(Clone, Default)]
pub struct RecordingForwarder {
    pub events: Arc<Mutex<Vec<(u32, String, KeyAction)>>>,
}

impl KeyForwarder for RecordingForwarder {
    fn forward(
        &mut self,
        pid: u32,
        key: &str,
        action: KeyAction,
    ) -> Result<(), String> {
        self.events
            .lock()
            .expect("forwarder lock")
            .push((pid, key.to_string(), action));
        Ok(())
    }
}
