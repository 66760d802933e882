//! WebSocket protocol message definitions
//! These are the wire types exchanged with the matchmaking and match channels

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};

/// Movement keys understood by the match channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Key {
    #[serde(rename = "ArrowLeft")]
    ArrowLeft,
    #[serde(rename = "ArrowRight")]
    ArrowRight,
    #[serde(rename = "a")]
    A,
    #[serde(rename = "d")]
    D,
}

impl Key {
    /// Parse a DOM-style key name
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "ArrowLeft" => Some(Self::ArrowLeft),
            "ArrowRight" => Some(Self::ArrowRight),
            "a" => Some(Self::A),
            "d" => Some(Self::D),
            _ => None,
        }
    }
}

/// Messages sent from client to server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ClientMsg {
    /// Enter the matchmaking queue
    JoinQueue,

    /// Move intent: a held key, or `None` once it is released
    Move { key: Option<Key> },
}

/// Authoritative state pushed by the match channel
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub paddle1_x: f32,
    pub paddle2_x: f32,
    pub ball_x: f32,
    pub ball_z: f32,
    pub score1: u32,
    pub score2: u32,
}

/// Messages sent from server to client
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMsg {
    /// Matchmaking socket accepted
    Connected {
        #[serde(default)]
        user_id: Option<PlayerId>,
    },

    /// Queue entry confirmed
    JoinedQueue {
        #[serde(default)]
        user_id: Option<PlayerId>,
    },

    /// Still waiting for an opponent
    Waiting {
        #[serde(default)]
        queue_size: Option<u32>,
    },

    /// Opponent found; `game_group_name` names the match channel
    MatchFound {
        player1_id: PlayerId,
        player2_id: PlayerId,
        game_group_name: String,
    },

    /// Initial state of a freshly opened match
    GameInit(Snapshot),

    /// Periodic authoritative state
    GameUpdate(Snapshot),

    /// Server-reported problem
    Error { message: String },
}

/// Player identity as sent by the server.
///
/// The matchmaking server may send usernames or numeric ids; both are kept as
/// their string form so they compare against the locally known username.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct PlayerId(pub String);

impl PlayerId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PlayerId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl<'de> Deserialize<'de> for PlayerId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum RawId {
            Int(i64),
            Text(String),
        }

        Ok(match RawId::deserialize(deserializer)? {
            RawId::Int(n) => PlayerId(n.to_string()),
            RawId::Text(s) => PlayerId(s),
        })
    }
}
