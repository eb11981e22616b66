use std::path::PathBuf;

use log::{debug, info};

use super::gateway::DispatchOutcome;
use super::status::ChannelStatus;
use crate::compose::{
    Advance, Region, RenderSurfacePair, SceneParams, SurfaceBackend, Which,
};
use crate::framework::config::EngineConfig;
use crate::process::geometry::DisplayGeometry;
use crate::process::input::{KeyAction, KeyForwarder};
use crate::process::supervisor::AppSpec;
use crate::scene::selector::{SceneSelector, SelectorOutcome, SelectorSettings};
use crate::scene::{DisplayChannel, Scene};

/// Everything one display owns: its scene state machine, its render targets
/// and where it lands on the output.
pub struct ChannelEngine<T> {
    channel: DisplayChannel,
    selector: SceneSelector,
    surfaces: RenderSurfacePair<T>,
    geometry: DisplayGeometry,
    redraw_all: bool,
}

impl<T> ChannelEngine<T> {
    pub fn new<B>(
        backend: &mut B,
        channel: DisplayChannel,
        config: &EngineConfig,
    ) -> Result<Self, String>
    where
        B: SurfaceBackend<Target = T>,
    {
        let geometry = DisplayGeometry::new(
            channel,
            &config.display,
            config.x_display.clone(),
        );
        let surfaces =
            RenderSurfacePair::new(backend, channel, geometry.region.size())?;

        Ok(Self {
            channel,
            selector: SceneSelector::new(
                channel.as_str(),
                SelectorSettings::from_config(config),
            ),
            surfaces,
            geometry,
            redraw_all: true,
        })
    }

    pub fn channel(&self) -> DisplayChannel {
        self.channel
    }

    pub fn selector(&self) -> &SceneSelector {
        &self.selector
    }

    pub fn selector_mut(&mut self) -> &mut SceneSelector {
        &mut self.selector
    }

    pub fn surfaces(&self) -> &RenderSurfacePair<T> {
        &self.surfaces
    }

    pub fn region(&self) -> Region {
        self.geometry.region
    }

    pub fn geometry(&self) -> &DisplayGeometry {
        &self.geometry
    }

    pub fn current(&self) -> &Scene {
        self.selector.scheduler().current()
    }

    pub fn next(&self) -> &Scene {
        self.selector.scheduler().next()
    }

    pub fn progress(&self) -> f32 {
        self.selector.scheduler().progress()
    }

    pub fn in_flight(&self) -> bool {
        self.selector.scheduler().in_flight()
    }

    pub fn request_scene(
        &mut self,
        scene: Scene,
        duration: Option<f32>,
    ) -> DispatchOutcome {
        let outcome = self.selector.request_scene(scene, duration);
        self.outcome(outcome)
    }

    pub fn start_app(
        &mut self,
        path: PathBuf,
        args: Vec<String>,
        duration: Option<f32>,
    ) -> DispatchOutcome {
        let spec = AppSpec::new(path)
            .with_args(args)
            .with_env(self.geometry.env());

        match self.selector.start_app(&spec, duration) {
            Ok(outcome) => self.outcome(outcome),
            Err(err) => DispatchOutcome::Failed(err),
        }
    }

    pub fn stop_app(&mut self, graceful: bool) -> DispatchOutcome {
        let outcome = self.selector.stop_app(graceful);
        self.outcome(outcome)
    }

    pub fn forward_key(
        &mut self,
        forwarder: &mut dyn KeyForwarder,
        key: &str,
        action: KeyAction,
    ) -> DispatchOutcome {
        if !self.current().is_external_app() {
            return DispatchOutcome::Ignored("no app is showing".to_string());
        }

        let Some(pid) = self.selector.app_pid() else {
            return DispatchOutcome::Ignored("app is not running".to_string());
        };

        match forwarder.forward(pid, key, action) {
            Ok(()) => DispatchOutcome::Applied,
            Err(err) => DispatchOutcome::Failed(err),
        }
    }

    pub fn reload(&mut self, config: &EngineConfig) {
        self.selector
            .apply_settings(SelectorSettings::from_config(config));
        self.geometry.x_display = config.x_display.clone();
        self.redraw_all = true;
        info!("[{}] reloaded settings", self.channel);
    }

    pub fn recover(&mut self) -> bool {
        self.selector.recover()
    }

    /// Advances the crossfade. The live target flips in the same step that
    /// completes the transition.
    pub fn advance(&mut self, dt: f32) -> Option<Scene> {
        match self.selector.scheduler_mut().advance(dt) {
            Advance::Completed(scene) => {
                self.surfaces.flip();
                debug!("[{}] now showing '{}'", self.channel, scene);
                Some(scene)
            }
            Advance::Progressed(_) | Advance::Idle => None,
        }
    }

    /// Draws the live target, and the staged one while a transition is
    /// running.
    pub fn render<B>(
        &mut self,
        backend: &mut B,
        params: &SceneParams,
    ) -> Result<(), String>
    where
        B: SurfaceBackend<Target = T>,
    {
        let scheduler = self.selector.scheduler();
        let current = scheduler.current().clone();
        let next = scheduler.next().clone();
        let in_flight = scheduler.in_flight();

        self.surfaces
            .draw(backend, Which::Live, &current, params)
            .map_err(|err| {
                format!("[{}] failed to draw '{}': {}", self.channel, current, err)
            })?;

        if in_flight {
            self.surfaces
                .draw(backend, Which::Staged, &next, params)
                .map_err(|err| {
                    format!("[{}] failed to draw '{}': {}", self.channel, next, err)
                })?;
        } else if self.redraw_all {
            self.surfaces.clear(backend, Which::Staged)?;
        }

        self.redraw_all = false;
        Ok(())
    }

    pub fn composite<B>(&self, backend: &mut B) -> Result<(), String>
    where
        B: SurfaceBackend<Target = T>,
    {
        let scheduler = self.selector.scheduler();
        self.surfaces.composite(
            backend,
            self.geometry.region,
            scheduler.progress(),
            scheduler.in_flight(),
        )
    }

    pub fn status(&self) -> ChannelStatus {
        let scheduler = self.selector.scheduler();
        ChannelStatus {
            current: scheduler.current().name().to_string(),
            next: scheduler.next().name().to_string(),
            transitioning: scheduler.in_flight(),
            progress: scheduler.progress(),
        }
    }

    pub fn shutdown(&mut self) {
        self.selector.shutdown();
    }

    fn outcome(&self, outcome: SelectorOutcome) -> DispatchOutcome {
        match outcome {
            SelectorOutcome::Transitioning => {
                debug!(
                    "[{}] transition '{}' -> '{}'",
                    self.channel,
                    self.current(),
                    self.next()
                );
                DispatchOutcome::Applied
            }
            SelectorOutcome::Unchanged(reason) => {
                debug!("[{}] request ignored: {}", self.channel, reason);
                DispatchOutcome::Ignored(reason)
            }
        }
    }
}
