//! Render hook invoked once per tick

use tracing::{debug, info};

use crate::game::MatchState;

/// Presentation adapter; receives read-only state after every tick
pub trait Renderer {
    fn render(&mut self, state: &MatchState);

    /// A message for the player (round changes, connection problems)
    fn notice(&mut self, message: &str) {
        info!(message = %message, "Notice");
    }
}

/// Headless renderer that writes frames to the log
#[derive(Debug, Default)]
pub struct TracingRenderer {
    frames: u64,
    last_score: Option<(u32, u32)>,
}

impl TracingRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }
}

impl Renderer for TracingRenderer {
    fn render(&mut self, state: &MatchState) {
        self.frames += 1;

        let score = (state.score1, state.score2);
        if self.last_score != Some(score) {
            info!(score1 = score.0, score2 = score.1, "Score");
            self.last_score = Some(score);
        }

        debug!(
            frame = self.frames,
            paddle1 = state.paddle1_pos,
            paddle2 = state.paddle2_pos,
            ball_x = state.ball_pos.x,
            ball_z = state.ball_pos.y,
            "Frame"
        );
    }
}
