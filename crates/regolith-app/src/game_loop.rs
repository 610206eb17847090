//! Fixed-timestep loop driving the simulation at the tick rate.
//!
//! An accumulator decouples wall-clock frames from fixed simulation
//! steps; a clamp on the frame time prevents the spiral of death after a
//! stall.

use std::time::Instant;

use tracing::warn;

/// Maximum frame time accepted into the accumulator. Anything longer is
/// clamped and the simulation slows down instead of trying to catch up.
pub const MAX_FRAME_TIME: f64 = 0.25;

/// Fixed-timestep loop state.
pub struct GameLoop {
    previous_time: Instant,
    accumulator: f64,
    fixed_dt: f64,
    update_count: u64,
}

impl GameLoop {
    /// Creates a loop with the given fixed step in seconds.
    pub fn new(fixed_dt: f64) -> Self {
        Self {
            previous_time: Instant::now(),
            accumulator: 0.0,
            fixed_dt,
            update_count: 0,
        }
    }

    /// Measures the elapsed frame time and runs zero or more fixed
    /// updates.
    pub fn tick(&mut self, mut update: impl FnMut(f32)) {
        let now = Instant::now();
        let mut frame_time = now.duration_since(self.previous_time).as_secs_f64();
        self.previous_time = now;

        if frame_time > MAX_FRAME_TIME {
            warn!(
                "frame time {:.1}ms exceeds maximum, clamping",
                frame_time * 1000.0
            );
            frame_time = MAX_FRAME_TIME;
        }

        self.accumulator += frame_time;
        while self.accumulator >= self.fixed_dt {
            update(self.fixed_dt as f32);
            self.accumulator -= self.fixed_dt;
            self.update_count += 1;
        }
    }

    /// Total fixed updates executed.
    pub fn update_count(&self) -> u64 {
        self.update_count
    }
}

/// A loop variant taking explicit frame times, for tests.
#[cfg(test)]
struct TestableGameLoop {
    accumulator: f64,
    fixed_dt: f64,
    update_count: u64,
}

#[cfg(test)]
impl TestableGameLoop {
    fn new(fixed_dt: f64) -> Self {
        Self {
            accumulator: 0.0,
            fixed_dt,
            update_count: 0,
        }
    }

    fn tick(&mut self, frame_time: f64, mut update: impl FnMut(f32)) {
        let clamped = frame_time.min(MAX_FRAME_TIME);
        self.accumulator += clamped;
        while self.accumulator >= self.fixed_dt {
            update(self.fixed_dt as f32);
            self.accumulator -= self.fixed_dt;
            self.update_count += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DT: f64 = 1.0 / 50.0;

    #[test]
    fn test_exact_step_runs_once() {
        let mut game_loop = TestableGameLoop::new(DT);
        let mut updates = 0;
        game_loop.tick(DT, |_| updates += 1);
        assert_eq!(updates, 1);
        assert!(game_loop.accumulator.abs() < 1e-12);
    }

    #[test]
    fn test_long_frame_runs_multiple_steps() {
        let mut game_loop = TestableGameLoop::new(DT);
        let mut updates = 0;
        game_loop.tick(3.0 * DT, |_| updates += 1);
        assert_eq!(updates, 3);
    }

    #[test]
    fn test_short_frame_accumulates() {
        let mut game_loop = TestableGameLoop::new(DT);
        let mut updates = 0;
        game_loop.tick(0.4 * DT, |_| updates += 1);
        assert_eq!(updates, 0);
        game_loop.tick(0.7 * DT, |_| updates += 1);
        assert_eq!(updates, 1);
    }

    #[test]
    fn test_stall_is_clamped() {
        let mut game_loop = TestableGameLoop::new(DT);
        let mut updates = 0u32;
        game_loop.tick(5.0, |_| updates += 1);
        let max_updates = (MAX_FRAME_TIME / DT).ceil() as u32;
        assert!(updates <= max_updates);
        assert!(updates > 0);
    }

    #[test]
    fn test_update_receives_fixed_dt() {
        let mut game_loop = TestableGameLoop::new(DT);
        game_loop.tick(DT * 2.0, |dt| assert_eq!(dt, DT as f32));
        assert_eq!(game_loop.update_count, 2);
    }
}
