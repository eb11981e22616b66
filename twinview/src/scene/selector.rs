use std::time::Duration;

use log::{debug, warn};

use super::scene::Scene;
use crate::compose::transition::{TransitionRequest, TransitionScheduler};
use crate::framework::config::EngineConfig;
use crate::process::supervisor::{AppSpec, ProcessSupervisor};

#[derive(Clone, Debug, PartialEq)]
pub struct SelectorSettings {
    pub default_scene: Scene,
    pub fallback_scene: Scene,
    pub transition_duration: f32,
    pub graceful_timeout: Duration,
}

impl SelectorSettings {
    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            default_scene: config.default_scene(),
            fallback_scene: config.fallback_scene(),
            transition_duration: config.transition_duration,
            graceful_timeout: config.graceful_timeout(),
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum SelectorOutcome {
    Transitioning,
    /// Nothing changed; the reason is for logs.
    Unchanged(String),
}

impl SelectorOutcome {
    fn from_request(request: TransitionRequest, target: &Scene) -> Self {
        match request {
            TransitionRequest::Started => SelectorOutcome::Transitioning,
            TransitionRequest::AlreadyTargeted => SelectorOutcome::Unchanged(
                format!("already showing '{}'", target),
            ),
            TransitionRequest::InFlight => SelectorOutcome::Unchanged(
                "transition in progress".to_string(),
            ),
        }
    }
}

/// Per-channel scene state machine. Owns the crossfade timing and the
/// channel's supervised application.
pub struct SceneSelector {
    label: String,
    scheduler: TransitionScheduler,
    supervisor: ProcessSupervisor,
    manually_stopped: bool,
    return_scene: Option<Scene>,
    settings: SelectorSettings,
}

impl SceneSelector {
    pub fn new(label: impl Into<String>, settings: SelectorSettings) -> Self {
        let label = label.into();

        Self {
            scheduler: TransitionScheduler::new(
                settings.default_scene.clone(),
                settings.transition_duration,
            ),
            supervisor: ProcessSupervisor::new(label.clone()),
            label,
            manually_stopped: false,
            return_scene: None,
            settings,
        }
    }

    pub fn scheduler(&self) -> &TransitionScheduler {
        &self.scheduler
    }

    pub fn scheduler_mut(&mut self) -> &mut TransitionScheduler {
        &mut self.scheduler
    }

    pub fn manually_stopped(&self) -> bool {
        self.manually_stopped
    }

    pub fn app_pid(&self) -> Option<u32> {
        self.supervisor.pid()
    }

    pub fn app_alive(&mut self) -> bool {
        self.supervisor.is_alive()
    }

    pub fn settings(&self) -> &SelectorSettings {
        &self.settings
    }

    pub fn apply_settings(&mut self, settings: SelectorSettings) {
        self.scheduler
            .set_default_duration(settings.transition_duration);
        self.settings = settings;
    }

    fn preflight(&self, target: &Scene) -> Option<SelectorOutcome> {
        if self.scheduler.in_flight() {
            return Some(SelectorOutcome::from_request(
                TransitionRequest::InFlight,
                target,
            ));
        }

        if self.scheduler.next() == target {
            return Some(SelectorOutcome::from_request(
                TransitionRequest::AlreadyTargeted,
                target,
            ));
        }

        None
    }

    pub fn request_scene(
        &mut self,
        scene: Scene,
        duration: Option<f32>,
    ) -> SelectorOutcome {
        if scene.is_external_app() {
            return SelectorOutcome::Unchanged(
                "the app scene is entered with app/start".to_string(),
            );
        }

        if let Some(outcome) = self.preflight(&scene) {
            debug!("[{}] scene '{}' not applied: {:?}", self.label, scene, outcome);
            return outcome;
        }

        if self.scheduler.current().is_external_app() {
            self.manually_stopped = true;
            self.return_scene = None;
            self.supervisor.terminate(self.settings.graceful_timeout);
        }

        let request = self.scheduler.request(scene.clone(), duration);
        SelectorOutcome::from_request(request, &scene)
    }

    pub fn start_app(
        &mut self,
        spec: &AppSpec,
        duration: Option<f32>,
    ) -> Result<SelectorOutcome, String> {
        if self.scheduler.in_flight() {
            return Ok(SelectorOutcome::from_request(
                TransitionRequest::InFlight,
                &Scene::ExternalApp,
            ));
        }

        if self.scheduler.involves(&Scene::ExternalApp) {
            return Ok(SelectorOutcome::Unchanged(
                "an app is already running".to_string(),
            ));
        }

        self.manually_stopped = false;
        self.supervisor.spawn(spec).map_err(|err| err.to_string())?;
        self.return_scene = Some(self.scheduler.current().clone());

        let request = self.scheduler.request(Scene::ExternalApp, duration);
        Ok(SelectorOutcome::from_request(request, &Scene::ExternalApp))
    }

    pub fn stop_app(&mut self, graceful: bool) -> SelectorOutcome {
        if !self.scheduler.current().is_external_app() {
            return SelectorOutcome::Unchanged("no app is showing".to_string());
        }

        if self.scheduler.in_flight() {
            return SelectorOutcome::from_request(
                TransitionRequest::InFlight,
                &Scene::ExternalApp,
            );
        }

        self.manually_stopped = true;

        if graceful {
            self.supervisor.terminate(self.settings.graceful_timeout);
        } else {
            self.supervisor.kill();
        }

        let target = self
            .return_scene
            .take()
            .unwrap_or_else(|| self.settings.default_scene.clone());
        let request = self.scheduler.request(target.clone(), None);
        SelectorOutcome::from_request(request, &target)
    }

    /// Falls back when the supervised app died on its own. Returns true when a
    /// fallback transition was started.
    pub fn recover(&mut self) -> bool {
        if !self.scheduler.involves(&Scene::ExternalApp)
            || self.scheduler.in_flight()
            || self.manually_stopped
        {
            return false;
        }

        if self.supervisor.is_alive() {
            return false;
        }

        let fallback = self.settings.fallback_scene.clone();
        warn!(
            "[{}] app exited unexpectedly; falling back to '{}'",
            self.label, fallback
        );

        self.return_scene = None;
        self.scheduler.request(fallback, None).is_started()
    }

    /// Stops the app without a transition, used at shutdown.
    pub fn shutdown(&mut self) {
        if self.supervisor.pid().is_some() {
            self.manually_stopped = true;
            self.supervisor.terminate(self.settings.graceful_timeout);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> SelectorSettings {
        SelectorSettings {
            default_scene: Scene::generated("idle"),
            fallback_scene: Scene::Debug,
            transition_duration: 0.5,
            graceful_timeout: Duration::from_millis(500),
        }
    }

    #[test]
    fn app_scene_cannot_be_requested_directly() {
        let mut selector = SceneSelector::new("left", settings());
        let outcome = selector.request_scene(Scene::ExternalApp, None);
        assert!(matches!(outcome, SelectorOutcome::Unchanged(_)));
        assert!(!selector.scheduler().in_flight());
    }

    #[test]
    fn same_target_while_in_flight_keeps_state() {
        let mut selector = SceneSelector::new("left", settings());
        assert_eq!(
            selector.request_scene(Scene::Debug, None),
            SelectorOutcome::Transitioning
        );
        selector.scheduler_mut().advance(0.1);
        let progress = selector.scheduler().progress();

        let outcome = selector.request_scene(Scene::Debug, None);
        assert!(matches!(outcome, SelectorOutcome::Unchanged(_)));
        assert_eq!(selector.scheduler().progress(), progress);

        let outcome =
            selector.request_scene(Scene::generated("plasma"), None);
        assert!(matches!(outcome, SelectorOutcome::Unchanged(_)));
        assert_eq!(selector.scheduler().next(), &Scene::Debug);
    }

    #[test]
    fn stop_without_app_is_ignored() {
        let mut selector = SceneSelector::new("right", settings());
        let outcome = selector.stop_app(true);
        assert!(matches!(outcome, SelectorOutcome::Unchanged(_)));
        assert!(!selector.manually_stopped());
    }

    #[test]
    fn recover_is_inert_without_app() {
        let mut selector = SceneSelector::new("right", settings());
        assert!(!selector.recover());
    }

    #[test]
    fn failed_spawn_leaves_scene_unchanged() {
        let mut selector = SceneSelector::new("left", settings());
        let spec = AppSpec::new("/nonexistent/twinview-app");

        let result = selector.start_app(&spec, None);
        assert!(result.is_err());
        assert_eq!(selector.scheduler().current(), &Scene::generated("idle"));
        assert!(!selector.scheduler().in_flight());
    }

    #[cfg(unix)]
    #[test]
    fn unexpected_exit_falls_back_once() {
        let mut selector = SceneSelector::new("left", settings());
        let spec = AppSpec::new("/bin/sh").with_args(["-c", "exit 3"]);

        assert_eq!(
            selector.start_app(&spec, None),
            Ok(SelectorOutcome::Transitioning)
        );
        selector.scheduler_mut().advance(1.0);
        assert_eq!(selector.scheduler().current(), &Scene::ExternalApp);

        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while selector.app_alive() && std::time::Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(10));
        }

        assert!(selector.recover());
        assert_eq!(selector.scheduler().next(), &Scene::Debug);
        assert!(!selector.manually_stopped());
        assert!(!selector.recover());
    }

    #[cfg(unix)]
    #[test]
    fn stop_returns_to_previous_scene() {
        let mut selector = SceneSelector::new("left", settings());
        selector.request_scene(Scene::generated("plasma"), None);
        selector.scheduler_mut().advance(1.0);

        let spec = AppSpec::new("/bin/sh").with_args(["-c", "sleep 30"]);
        selector.start_app(&spec, None).unwrap();
        selector.scheduler_mut().advance(1.0);

        assert_eq!(selector.stop_app(true), SelectorOutcome::Transitioning);
        assert!(selector.manually_stopped());
        assert!(!selector.app_alive());
        assert_eq!(selector.scheduler().next(), &Scene::generated("plasma"));
        assert!(!selector.recover());
    }
}
