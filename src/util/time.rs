//! Time utilities for the frame loop

use std::time::{Duration, Instant};

/// Simulation step applied per frame tick.
///
/// Gameplay advances by this amount on every tick regardless of how much
/// wall-clock time passed, so a given tick count always produces the same
/// trajectory.
pub const FRAME_DT: f32 = 0.5;

/// Default wall-clock spacing of frame ticks (roughly one display refresh)
pub const DEFAULT_FRAME_INTERVAL: Duration = Duration::from_millis(16);

/// Delta applied to the simulation for one frame tick
pub fn frame_delta() -> f32 {
    FRAME_DT
}

/// A simple timer for measuring durations
#[derive(Debug, Clone)]
pub struct Timer {
    start: Instant,
}

impl Timer {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }
}

impl Default for Timer {
    fn default() -> Self {
        Self::new()
    }
}
