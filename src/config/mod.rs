//! Configuration module - environment variable parsing

use std::env;
use std::num::{NonZeroU32, NonZeroU64};
use std::str::FromStr;
use std::time::Duration;

use crate::game::session::DEFAULT_MAX_SCORE;
use crate::game::SessionMode;
use crate::util::time::DEFAULT_FRAME_INTERVAL;

/// Client configuration loaded from environment variables
#[derive(Clone, Debug)]
pub struct Config {
    /// Base URL of the REST API (profile, game init, match history)
    pub api_base_url: String,
    /// Base URL for WebSocket channels (matchmaking, per-match)
    pub ws_base_url: String,
    /// Bearer token for authenticated calls
    pub auth_token: Option<String>,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,

    /// Play mode for this run
    pub mode: SessionMode,
    /// Friend to challenge in direct friend mode
    pub friend: Option<String>,
    /// Match channel shared with the friend; the host plays locally without one
    pub friend_channel: Option<String>,
    /// Tournament entrants, in seeding order
    pub tournament_players: Vec<String>,

    /// Score that ends a match
    pub max_score: u32,
    /// Wall-clock interval between frame ticks
    pub frame_interval: Duration,
    /// Seed for serve randomization (random when unset)
    pub rng_seed: Option<u64>,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let mode = match env::var("PONG_MODE") {
            Ok(raw) => parse_mode(&raw)?,
            Err(_) => SessionMode::Local,
        };

        let tournament_players = env::var("PONG_PLAYERS")
            .map(|raw| raw.split(',').map(|name| name.trim().to_string()).collect())
            .unwrap_or_default();

        let auth_token = env::var("AUTH_TOKEN").ok().filter(|t| !t.is_empty());
        // Matchmaking identifies the player by token; local play doesn't need one
        if mode == SessionMode::Matchmade && auth_token.is_none() {
            return Err(ConfigError::Missing("AUTH_TOKEN"));
        }

        Ok(Self {
            api_base_url: env::var("API_BASE_URL")
                .unwrap_or_else(|_| "http://localhost:8000".to_string()),
            ws_base_url: env::var("WS_BASE_URL")
                .unwrap_or_else(|_| "ws://localhost:8000".to_string()),
            auth_token,
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),

            mode,
            friend: env::var("PONG_FRIEND").ok().filter(|f| !f.trim().is_empty()),
            friend_channel: env::var("PONG_FRIEND_CHANNEL")
                .ok()
                .filter(|c| !c.trim().is_empty()),
            tournament_players,

            // Zero would end every match at 0-0 or stall the frame timer
            max_score: parse_var::<NonZeroU32>("MAX_SCORE")?
                .map_or(DEFAULT_MAX_SCORE, NonZeroU32::get),
            frame_interval: parse_var::<NonZeroU64>("FRAME_INTERVAL_MS")?
                .map_or(DEFAULT_FRAME_INTERVAL, |ms| Duration::from_millis(ms.get())),
            rng_seed: parse_var("RNG_SEED")?,
        })
    }
}

/// Map the mode names used by the web client onto session modes
pub fn parse_mode(raw: &str) -> Result<SessionMode, ConfigError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "local" => Ok(SessionMode::Local),
        "multiplayer" | "matchmade" => Ok(SessionMode::Matchmade),
        "friends" | "friend" => Ok(SessionMode::DirectFriend),
        "tournament" => Ok(SessionMode::Tournament),
        _ => Err(ConfigError::Invalid("PONG_MODE", raw.to_string())),
    }
}

fn parse_var<T: FromStr>(key: &'static str) -> Result<Option<T>, ConfigError> {
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::Invalid(key, raw)),
        Err(_) => Ok(None),
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),

    #[error("Invalid value for {0}: {1:?}")]
    Invalid(&'static str, String),
}
