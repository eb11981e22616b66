use crate::scene::Scene;

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum TransitionRequest {
    Started,
    /// Idle and already showing the requested scene.
    AlreadyTargeted,
    /// A transition is running; it cannot be cancelled or retargeted.
    InFlight,
}

impl TransitionRequest {
    pub fn is_started(&self) -> bool {
        matches!(self, TransitionRequest::Started)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Advance {
    Idle,
    Progressed(f32),
    /// Progress reached 1.0 during this call and `current` now holds the
    /// returned scene.
    Completed(Scene),
}

/// Timed linear crossfade between the scene being shown and the one being
/// faded in. `progress == 1.0` means idle with `current == next`.
#[derive(Clone, Debug)]
pub struct TransitionScheduler {
    current: Scene,
    next: Scene,
    progress: f32,
    duration: f32,
    default_duration: f32,
}

impl TransitionScheduler {
    pub fn new(initial: Scene, default_duration: f32) -> Self {
        let default_duration = sanitize_duration(default_duration, 0.5);

        Self {
            current: initial.clone(),
            next: initial,
            progress: 1.0,
            duration: default_duration,
            default_duration,
        }
    }

    pub fn current(&self) -> &Scene {
        &self.current
    }

    pub fn next(&self) -> &Scene {
        &self.next
    }

    pub fn progress(&self) -> f32 {
        self.progress
    }

    pub fn duration(&self) -> f32 {
        self.duration
    }

    pub fn set_default_duration(&mut self, duration: f32) {
        self.default_duration =
            sanitize_duration(duration, self.default_duration);
    }

    pub fn in_flight(&self) -> bool {
        self.progress < 1.0
    }

    /// True when either side of the fade is `scene`.
    pub fn involves(&self, scene: &Scene) -> bool {
        self.current == *scene || self.next == *scene
    }

    pub fn request(
        &mut self,
        target: Scene,
        duration: Option<f32>,
    ) -> TransitionRequest {
        if self.in_flight() {
            return TransitionRequest::InFlight;
        }

        if self.next == target {
            return TransitionRequest::AlreadyTargeted;
        }

        self.next = target;
        self.progress = 0.0;
        self.duration = duration
            .map(|d| sanitize_duration(d, self.default_duration))
            .unwrap_or(self.default_duration);

        TransitionRequest::Started
    }

    pub fn advance(&mut self, dt: f32) -> Advance {
        if !self.in_flight() {
            return Advance::Idle;
        }

        let dt = if dt.is_finite() { dt.max(0.0) } else { 0.0 };
        self.progress += dt / self.duration;

        if self.progress >= 1.0 {
            self.progress = 1.0;
            self.current = self.next.clone();
            return Advance::Completed(self.current.clone());
        }

        Advance::Progressed(self.progress)
    }

    /// `(outgoing, incoming)` opacities.
    pub fn opacities(&self) -> (f32, f32) {
        (1.0 - self.progress, self.progress)
    }
}

fn sanitize_duration(duration: f32, fallback: f32) -> f32 {
    if duration.is_finite() && duration > 0.0 {
        duration
    } else {
        fallback
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn idle() -> Scene {
        Scene::generated("idle")
    }

    #[test]
    fn starts_idle_on_initial_scene() {
        let scheduler = TransitionScheduler::new(idle(), 0.5);
        assert_eq!(scheduler.current(), &idle());
        assert_eq!(scheduler.next(), &idle());
        assert_eq!(scheduler.progress(), 1.0);
        assert!(!scheduler.in_flight());
    }

    #[test]
    fn request_to_current_scene_is_a_noop() {
        let mut scheduler = TransitionScheduler::new(idle(), 0.5);
        assert_eq!(
            scheduler.request(idle(), None),
            TransitionRequest::AlreadyTargeted
        );
        assert_eq!(scheduler.progress(), 1.0);
    }

    #[test]
    fn requests_while_in_flight_are_rejected() {
        let mut scheduler = TransitionScheduler::new(idle(), 0.5);
        assert!(scheduler.request(Scene::Debug, None).is_started());
        scheduler.advance(0.1);

        let progress = scheduler.progress();
        assert_eq!(
            scheduler.request(Scene::Debug, None),
            TransitionRequest::InFlight
        );
        assert_eq!(
            scheduler.request(Scene::generated("plasma"), None),
            TransitionRequest::InFlight
        );
        assert_eq!(scheduler.next(), &Scene::Debug);
        assert_eq!(scheduler.progress(), progress);
    }

    #[test]
    fn completes_after_duration() {
        let mut scheduler = TransitionScheduler::new(idle(), 0.5);
        scheduler.request(Scene::Debug, None);
        assert_eq!(scheduler.progress(), 0.0);

        assert_eq!(scheduler.advance(0.25), Advance::Progressed(0.5));
        assert_eq!(scheduler.current(), &idle());

        assert_eq!(scheduler.advance(0.3), Advance::Completed(Scene::Debug));
        assert_eq!(scheduler.current(), &Scene::Debug);
        assert_eq!(scheduler.progress(), 1.0);
        assert_eq!(scheduler.advance(0.1), Advance::Idle);
    }

    #[test]
    fn opacities_sum_to_one() {
        let mut scheduler = TransitionScheduler::new(idle(), 1.0);
        scheduler.request(Scene::Debug, None);

        for _ in 0..20 {
            let (outgoing, incoming) = scheduler.opacities();
            assert!((outgoing + incoming - 1.0).abs() < 1e-6);
            scheduler.advance(0.07);
        }
    }

    #[test]
    fn invalid_durations_fall_back_to_default() {
        let mut scheduler = TransitionScheduler::new(idle(), 0.5);
        scheduler.request(Scene::Debug, Some(-1.0));
        assert_eq!(scheduler.duration(), 0.5);

        scheduler.advance(1.0);
        scheduler.request(idle(), Some(f32::NAN));
        assert_eq!(scheduler.duration(), 0.5);

        scheduler.advance(1.0);
        scheduler.request(Scene::Debug, Some(2.0));
        assert_eq!(scheduler.duration(), 2.0);
    }

    #[test]
    fn completes_within_one_frame_of_duration_at_steady_tick() {
        let frame = 1.0 / 60.0;
        let mut scheduler = TransitionScheduler::new(idle(), 0.5);
        scheduler.request(Scene::Debug, None);

        let mut elapsed = 0.0;
        loop {
            elapsed += frame;
            if let Advance::Completed(_) = scheduler.advance(frame) {
                break;
            }
            assert!(elapsed < 0.5 + frame, "transition overran");
        }

        assert!((elapsed - 0.5).abs() <= frame + 1e-4);
    }
}
