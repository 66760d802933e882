//! Game simulation modules

pub mod physics;
pub mod session;
pub mod state;
pub mod tournament;

pub use physics::{PhysicsConstants, PhysicsSystem, ScoreEvent};
pub use session::{
    determine_role, MatchResult, RoleResolution, SessionController, SessionError, SessionEvent,
    SessionOptions, SessionState, TickOutcome,
};
pub use state::{MatchState, Placement};
pub use tournament::{Bracket, BracketAdvance, BracketError, BracketMatch, BracketStage};

use crate::ws::protocol::Key;

/// Play mode of a session, fixed for the controller's lifetime
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionMode {
    /// Two players on one keyboard, simulated locally
    Local,
    /// Opponent assigned by the matchmaking server, server-authoritative
    Matchmade,
    /// Invited friend; the inviter hosts until a match channel is attached
    DirectFriend,
    /// Four-player local bracket
    Tournament,
}

impl SessionMode {
    /// Physics constants used by this mode
    pub fn physics(self) -> PhysicsConstants {
        // Every mode currently plays with the same table
        PhysicsConstants::CANONICAL
    }

    /// Whether results are reported to match history
    pub fn records_history(self) -> bool {
        matches!(self, Self::Matchmade | Self::DirectFriend)
    }
}

/// Which paddle a player controls
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PaddleSide {
    /// Paddle 1, guarding the negative-depth goal
    One,
    /// Paddle 2, guarding the positive-depth goal
    Two,
}

impl PaddleSide {
    /// Map a key from either key set onto this paddle's keys
    pub fn steer(self, key: Key) -> Key {
        match (self, key) {
            (Self::One, Key::ArrowRight) => Key::D,
            (Self::One, Key::ArrowLeft) => Key::A,
            (Self::Two, Key::D) => Key::ArrowRight,
            (Self::Two, Key::A) => Key::ArrowLeft,
            (_, key) => key,
        }
    }
}

/// Who may mutate the match state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Authority {
    /// Local physics advances the match
    Local,
    /// Snapshots from the match channel overwrite the match
    Remote,
}

/// A key press or release from the input source
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyInput {
    pub key: Key,
    pub pressed: bool,
}

impl KeyInput {
    /// Parse a terminal command: `+d` presses `d`, `-ArrowLeft` releases it
    pub fn parse(line: &str) -> Option<Self> {
        let line = line.trim();
        let (pressed, name) = if let Some(rest) = line.strip_prefix('+') {
            (true, rest)
        } else if let Some(rest) = line.strip_prefix('-') {
            (false, rest)
        } else {
            return None;
        };

        Key::from_name(name.trim()).map(|key| Self { key, pressed })
    }
}
