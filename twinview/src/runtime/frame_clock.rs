use std::time::{Duration, Instant};

const MAX_CATCH_UP: u64 = 8;
const FPS_SMOOTHING: f32 = 0.1;

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct FrameTick {
    pub should_render: bool,
    pub frames_advanced: u32,
    /// Seconds of animation time this tick covers.
    pub dt: f32,
}

/// Paces the render loop at a fixed rate. Wall time is consumed in whole
/// frame intervals; a long stall advances at most `MAX_CATCH_UP` frames.
#[derive(Debug)]
pub struct FrameClock {
    interval: Duration,
    frames: u64,
    last: Instant,
    carry: Duration,
    measured_fps: Option<f32>,
}

impl FrameClock {
    pub fn new(fps: f32) -> Self {
        Self::starting_at(fps, Instant::now())
    }

    pub fn starting_at(fps: f32, now: Instant) -> Self {
        Self {
            interval: interval_for(fps),
            frames: 0,
            last: now,
            carry: Duration::ZERO,
            measured_fps: None,
        }
    }

    pub fn fps(&self) -> f32 {
        1.0 / self.interval.as_secs_f32()
    }

    pub fn set_fps(&mut self, fps: f32) {
        self.interval = interval_for(fps);
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn frame_count(&self) -> u64 {
        self.frames
    }

    /// Smoothed rate of rendered ticks, once at least one has happened.
    pub fn measured_fps(&self) -> Option<f32> {
        self.measured_fps
    }

    pub fn next_deadline(&self) -> Instant {
        self.last + self.interval.saturating_sub(self.carry)
    }

    pub fn tick(&mut self, now: Instant) -> FrameTick {
        let elapsed = now.saturating_duration_since(self.last);
        self.last = now;
        self.carry += elapsed;

        let due = (self.carry.as_nanos() / self.interval.as_nanos()) as u64;
        if due == 0 {
            return FrameTick::default();
        }

        self.carry -= self.interval * due as u32;
        self.frames += due;

        let advanced = due.min(MAX_CATCH_UP) as u32;
        self.observe(elapsed, due);

        FrameTick {
            should_render: true,
            frames_advanced: advanced,
            dt: self.interval.as_secs_f32() * advanced as f32,
        }
    }

    fn observe(&mut self, elapsed: Duration, frames: u64) {
        let per_frame = elapsed.as_secs_f32() / frames as f32;
        if per_frame <= 0.0 {
            return;
        }

        let sample = 1.0 / per_frame;
        self.measured_fps = Some(match self.measured_fps {
            Some(fps) => fps + (sample - fps) * FPS_SMOOTHING,
            None => sample,
        });
    }
}

fn interval_for(fps: f32) -> Duration {
    let fps = if fps.is_finite() { fps.clamp(1.0, 1000.0) } else { 60.0 };
    Duration::from_secs_f64(1.0 / f64::from(fps))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn waits_for_a_whole_interval() {
        let start = Instant::now();
        let mut clock = FrameClock::starting_at(60.0, start);
        let interval = clock.interval();

        assert_eq!(clock.tick(start + interval / 2), FrameTick::default());

        let tick = clock.tick(start + interval);
        assert!(tick.should_render);
        assert_eq!(tick.frames_advanced, 1);
        assert!((tick.dt - 1.0 / 60.0).abs() < 1e-6);
        assert_eq!(clock.frame_count(), 1);
    }

    #[test]
    fn late_tick_covers_missed_frames() {
        let start = Instant::now();
        let mut clock = FrameClock::starting_at(30.0, start);

        let tick = clock.tick(start + clock.interval() * 3);
        assert_eq!(tick.frames_advanced, 3);
        assert!((tick.dt - 0.1).abs() < 1e-5);
    }

    #[test]
    fn stall_is_capped() {
        let start = Instant::now();
        let mut clock = FrameClock::starting_at(60.0, start);

        let tick = clock.tick(start + Duration::from_secs(10));
        assert_eq!(tick.frames_advanced, MAX_CATCH_UP as u32);
        assert!(clock.next_deadline() > start);
    }

    #[test]
    fn deadline_accounts_for_carried_time() {
        let start = Instant::now();
        let mut clock = FrameClock::starting_at(10.0, start);

        clock.tick(start + Duration::from_millis(40));
        let deadline = clock.next_deadline();
        assert_eq!(deadline, start + Duration::from_millis(100));
    }

    #[test]
    fn fps_is_clamped_and_measured() {
        let start = Instant::now();
        let mut clock = FrameClock::starting_at(0.0, start);
        assert_eq!(clock.fps(), 1.0);
        assert_eq!(clock.measured_fps(), None);

        clock.set_fps(50.0);
        clock.tick(start + Duration::from_millis(20));
        let measured = clock.measured_fps().unwrap();
        assert!((measured - 50.0).abs() < 0.5);
    }
}
