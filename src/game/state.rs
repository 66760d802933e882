//! Match state: the mutable snapshot of one ongoing game

use glam::Vec2;

use crate::ws::protocol::{Key, Snapshot};

use super::PaddleSide;

/// Ball velocity of a freshly created match
pub const OPENING_VELOCITY: Vec2 = Vec2::new(0.1, 0.1);

/// Authoritative simulation snapshot.
///
/// Positions live on the play plane: `x` is the lateral axis the paddles
/// slide along, `y` is depth (the renderer's and the wire's `z`).
#[derive(Debug, Clone, PartialEq)]
pub struct MatchState {
    /// Lateral offset of paddle 1
    pub paddle1_pos: f32,
    /// Lateral offset of paddle 2
    pub paddle2_pos: f32,
    /// Current speed input for paddle 1
    pub paddle1_speed: f32,
    /// Current speed input for paddle 2
    pub paddle2_speed: f32,
    pub ball_pos: Vec2,
    pub ball_velocity: Vec2,
    pub score1: u32,
    pub score2: u32,
}

/// Initial paddle and ball placement handed out by the game-init endpoint
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Placement {
    pub paddle1_x: f32,
    pub paddle2_x: f32,
    pub ball: Vec2,
}

impl MatchState {
    pub fn new() -> Self {
        Self {
            paddle1_pos: 0.0,
            paddle2_pos: 0.0,
            paddle1_speed: 0.0,
            paddle2_speed: 0.0,
            ball_pos: Vec2::ZERO,
            ball_velocity: OPENING_VELOCITY,
            score1: 0,
            score2: 0,
        }
    }

    pub fn paddle_pos(&self, side: PaddleSide) -> f32 {
        match side {
            PaddleSide::One => self.paddle1_pos,
            PaddleSide::Two => self.paddle2_pos,
        }
    }

    /// Update paddle speeds from a key event.
    ///
    /// `d`/`a` drive paddle 1 and the arrow keys drive paddle 2. The most
    /// recent event for a paddle wins, and releasing either of its keys stops
    /// it.
    pub fn apply_key(&mut self, key: Key, pressed: bool, speed: f32) {
        let magnitude = if pressed { speed } else { 0.0 };
        match key {
            Key::D => self.paddle1_speed = magnitude,
            Key::A => self.paddle1_speed = -magnitude,
            Key::ArrowRight => self.paddle2_speed = magnitude,
            Key::ArrowLeft => self.paddle2_speed = -magnitude,
        }
    }

    /// Overwrite positions and scores from an authoritative snapshot
    pub fn apply_snapshot(&mut self, snapshot: &Snapshot) {
        self.paddle1_pos = snapshot.paddle1_x;
        self.paddle2_pos = snapshot.paddle2_x;
        self.ball_pos = Vec2::new(snapshot.ball_x, snapshot.ball_z);
        self.score1 = snapshot.score1;
        self.score2 = snapshot.score2;
    }

    /// Move paddles and ball to a server-chosen layout; scores and inputs stay
    pub fn apply_placement(&mut self, placement: &Placement) {
        self.paddle1_pos = placement.paddle1_x;
        self.paddle2_pos = placement.paddle2_x;
        self.ball_pos = placement.ball;
    }

    /// Whether either side has reached `max_score`
    pub fn reached(&self, max_score: u32) -> bool {
        self.score1 >= max_score || self.score2 >= max_score
    }
}

impl Default for MatchState {
    fn default() -> Self {
        Self::new()
    }
}
