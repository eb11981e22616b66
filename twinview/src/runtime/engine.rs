use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use log::{debug, error, info, warn};

use super::channel::ChannelEngine;
use super::events::{InboundMessage, RuntimeCommand, RuntimeCommandReceiver};
use super::gateway::{Command, CommandGateway, DispatchOutcome};
use super::status::{SceneStatus, StatusPublisher, StatusSink};
use crate::compose::{SceneParams, SurfaceBackend};
use crate::framework::config::{ConfigOverrides, EngineConfig};
use crate::process::input::{KeyForwarder, QueuedForwarder, XdotoolForwarder};
use crate::scene::{ChannelTarget, DisplayChannel, Scene};

pub type ChannelOutcomes = Vec<(DisplayChannel, DispatchOutcome)>;

/// Both display channels plus command intake and status output, driven one
/// tick at a time by a runner.
pub struct Engine<B: SurfaceBackend> {
    backend: B,
    left: ChannelEngine<B::Target>,
    right: ChannelEngine<B::Target>,
    gateway: CommandGateway,
    status: StatusPublisher,
    forwarder: Box<dyn KeyForwarder>,
    connected: Arc<AtomicBool>,
    config: EngineConfig,
    config_path: Option<PathBuf>,
    overrides: ConfigOverrides,
    elapsed: f32,
}

impl<B: SurfaceBackend> Engine<B> {
    pub fn new(
        mut backend: B,
        config: EngineConfig,
        gateway: CommandGateway,
    ) -> Result<Self, String> {
        for scene in [config.default_scene(), config.fallback_scene()] {
            if !gateway.knows_scene(&scene) {
                return Err(format!("scene '{}' is not registered", scene));
            }
        }

        let left = ChannelEngine::new(&mut backend, DisplayChannel::Left, &config)?;
        let right =
            ChannelEngine::new(&mut backend, DisplayChannel::Right, &config)?;

        info!(
            "engine ready: {}x{} per display, default '{}', fallback '{}'",
            config.display.width,
            config.display.height,
            config.default_scene,
            config.fallback_scene
        );

        Ok(Self {
            backend,
            left,
            right,
            gateway,
            status: StatusPublisher::new(config.status_interval()),
            forwarder: xdotool_worker(&config),
            connected: Arc::new(AtomicBool::new(false)),
            config,
            config_path: None,
            overrides: ConfigOverrides::default(),
            elapsed: 0.0,
        })
    }

    pub fn with_forwarder(mut self, forwarder: Box<dyn KeyForwarder>) -> Self {
        self.forwarder = forwarder;
        self
    }

    pub fn with_config_path(mut self, path: Option<PathBuf>) -> Self {
        self.config_path = path;
        self
    }

    /// Values re-applied on top of the file on every reload.
    pub fn with_overrides(mut self, overrides: ConfigOverrides) -> Self {
        self.overrides = overrides;
        self
    }

    /// Shares the transport's liveness flag.
    pub fn with_connected(mut self, connected: Arc<AtomicBool>) -> Self {
        self.connected = connected;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    pub fn status(&self) -> &StatusPublisher {
        &self.status
    }

    pub fn subscribe(&mut self, sink: Box<dyn StatusSink>) {
        self.status.subscribe(sink);
    }

    pub fn channel(&self, channel: DisplayChannel) -> &ChannelEngine<B::Target> {
        match channel {
            DisplayChannel::Left => &self.left,
            DisplayChannel::Right => &self.right,
        }
    }

    pub fn channel_mut(
        &mut self,
        channel: DisplayChannel,
    ) -> &mut ChannelEngine<B::Target> {
        match channel {
            DisplayChannel::Left => &mut self.left,
            DisplayChannel::Right => &mut self.right,
        }
    }

    /// Entry point for preset collaborators: transition `target` to a
    /// generated or debug scene.
    pub fn apply_scene(
        &mut self,
        target: ChannelTarget,
        scene: Scene,
        duration: Option<f32>,
    ) -> ChannelOutcomes {
        if !self.gateway.knows_scene(&scene) {
            let reason = format!("unknown scene '{}'", scene);
            return target
                .channels()
                .iter()
                .map(|channel| (*channel, DispatchOutcome::Failed(reason.clone())))
                .collect();
        }

        self.fan_out(target, |engine, channel| {
            engine
                .channel_mut(channel)
                .request_scene(scene.clone(), duration)
        })
    }

    /// Drains queued commands. Returns true when a quit was requested.
    pub fn drain_commands(&mut self, rx: &RuntimeCommandReceiver) -> bool {
        while let Ok(command) = rx.try_recv() {
            match command {
                RuntimeCommand::Inbound(message) => {
                    let _ = self.dispatch(&message);
                }
                RuntimeCommand::Quit => return true,
            }
        }
        false
    }

    pub fn dispatch(
        &mut self,
        message: &InboundMessage,
    ) -> Result<ChannelOutcomes, String> {
        // Any inbound traffic proves the transport is up.
        self.connected.store(true, Ordering::Release);

        let command = self.gateway.parse(message).map_err(|err| {
            warn!("rejected '{}': {}", message.topic, err);
            err
        })?;

        let outcomes = self.execute(command);
        for (channel, outcome) in &outcomes {
            match outcome {
                DispatchOutcome::Failed(reason) => {
                    error!("[{}] {} failed: {}", channel, message.topic, reason)
                }
                _ => debug!("[{}] {} {}", channel, message.topic, outcome),
            }
        }

        Ok(outcomes)
    }

    pub fn execute(&mut self, command: Command) -> ChannelOutcomes {
        match command {
            Command::SetScene {
                target,
                scene,
                duration,
            } => self.apply_scene(target, scene, duration),
            Command::StartApp {
                target,
                path,
                args,
                duration,
            } => self.fan_out(target, |engine, channel| {
                let outcome = engine.channel_mut(channel).start_app(
                    path.clone(),
                    args.clone(),
                    duration,
                );
                if let DispatchOutcome::Failed(reason) = &outcome {
                    engine.status.publish_error(channel, reason);
                }
                outcome
            }),
            Command::StopApp { target, graceful } => {
                self.fan_out(target, |engine, channel| {
                    engine.channel_mut(channel).stop_app(graceful)
                })
            }
            Command::ForwardInput {
                target,
                key,
                action,
            } => self.fan_out(target, |engine, channel| {
                let channel_engine = match channel {
                    DisplayChannel::Left => &mut engine.left,
                    DisplayChannel::Right => &mut engine.right,
                };
                channel_engine.forward_key(engine.forwarder.as_mut(), &key, action)
            }),
            Command::Reload { target } => self.reload(target),
        }
    }

    /// Re-reads config tunables and applies them to `target`. Display layout
    /// changes need a restart.
    pub fn reload(&mut self, target: ChannelTarget) -> ChannelOutcomes {
        let mut config = match self.config_path.as_ref() {
            Some(path) => match EngineConfig::load_or_default(path) {
                Ok(mut config) => {
                    self.overrides.apply(&mut config);
                    config
                }
                Err(err) => {
                    return target
                        .channels()
                        .iter()
                        .map(|c| (*c, DispatchOutcome::Failed(err.clone())))
                        .collect();
                }
            },
            None => self.config.clone(),
        };

        for scene in [config.default_scene(), config.fallback_scene()] {
            if !self.gateway.knows_scene(&scene) {
                let reason = format!("scene '{}' is not registered", scene);
                return target
                    .channels()
                    .iter()
                    .map(|c| (*c, DispatchOutcome::Failed(reason.clone())))
                    .collect();
            }
        }

        if config.display != self.config.display {
            warn!("display layout changes take effect after a restart");
        }

        config.display = self.config.display.clone();

        self.status.set_interval(config.status_interval());
        self.forwarder = xdotool_worker(&config);
        self.config = config;

        self.fan_out(target, |engine, channel| {
            let config = engine.config.clone();
            engine.channel_mut(channel).reload(&config);
            DispatchOutcome::Applied
        })
    }

    /// One frame: recovery, transition timing, rendering, compositing and
    /// status. Commands must already be drained.
    pub fn tick(&mut self, dt: f32, now: Instant) -> Result<(), String> {
        let connected = self.connected.load(Ordering::Acquire);
        self.status.publish_liveness(connected);
        self.elapsed += dt;

        for channel in DisplayChannel::ALL {
            if self.channel_mut(channel).recover() {
                info!("[{}] recovering to fallback scene", channel);
            }
        }

        for channel in DisplayChannel::ALL {
            self.channel_mut(channel).advance(dt);
        }

        let params = SceneParams {
            time: self.elapsed,
            connected,
        };

        self.left.render(&mut self.backend, &params)?;
        self.right.render(&mut self.backend, &params)?;
        self.left.composite(&mut self.backend)?;
        self.right.composite(&mut self.backend)?;
        self.backend.finish_frame()?;

        let snapshot = self.scene_status();
        self.status.publish_scene(&snapshot, now);

        Ok(())
    }

    pub fn scene_status(&self) -> SceneStatus {
        SceneStatus {
            left: self.left.status(),
            right: self.right.status(),
        }
    }

    pub fn shutdown(&mut self) {
        info!("shutting down engine");
        self.left.shutdown();
        self.right.shutdown();
    }

    fn fan_out<F>(&mut self, target: ChannelTarget, mut apply: F) -> ChannelOutcomes
    where
        F: FnMut(&mut Self, DisplayChannel) -> DispatchOutcome,
    {
        target
            .channels()
            .iter()
            .map(|channel| (*channel, apply(self, *channel)))
            .collect()
    }
}

fn xdotool_worker(config: &EngineConfig) -> Box<dyn KeyForwarder> {
    Box::new(QueuedForwarder::spawn(XdotoolForwarder::new(
        config.x_display.clone(),
    )))
}
