//! Session controller: the mode-tagged state machine that owns one match
//!
//! The controller never performs I/O. Commands for the outside world
//! (open a channel, send input, record history) are queued as
//! [`SessionEvent`]s and drained by whoever drives the session.

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::store::MatchHistoryEntry;
use crate::ws::protocol::{ClientMsg, Key, PlayerId, Snapshot};
use crate::ws::sync::MatchAssignment;
use crate::ws::transport::NORMAL_CLOSURE;

use super::physics::{PhysicsConstants, PhysicsSystem, ScoreEvent};
use super::state::{MatchState, Placement};
use super::tournament::{Bracket, BracketAdvance, BracketError, BracketStage};
use super::{Authority, PaddleSide, SessionMode};

/// Score that ends a match unless configured otherwise
pub const DEFAULT_MAX_SCORE: u32 = 5;

/// Lifecycle of a session. `Ended` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    WaitingToStart,
    Running,
    Ended,
}

/// Construction options for a [`SessionController`]
#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub max_score: u32,
    /// Serve RNG seed; random when unset
    pub seed: Option<u64>,
    /// Username of the local player, if known
    pub local_identity: Option<String>,
    /// Invited opponent for direct friend matches
    pub opponent: Option<String>,
    /// Match channel the host joins once the friend accepts
    pub friend_channel: Option<String>,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            max_score: DEFAULT_MAX_SCORE,
            seed: None,
            local_identity: None,
            opponent: None,
            friend_channel: None,
        }
    }
}

/// Final score of one match
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatchResult {
    pub score1: u32,
    pub score2: u32,
}

impl MatchResult {
    /// Winning paddle, `None` on a draw
    pub fn winner(&self) -> Option<PaddleSide> {
        match self.score1.cmp(&self.score2) {
            std::cmp::Ordering::Greater => Some(PaddleSide::One),
            std::cmp::Ordering::Less => Some(PaddleSide::Two),
            std::cmp::Ordering::Equal => None,
        }
    }
}

/// Which paddle the local player controls in a networked match
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoleResolution {
    pub side: PaddleSide,
    /// The local identity matched neither player; `side` is a fallback
    pub degraded: bool,
}

/// Match the local identity against the assigned players.
///
/// An unknown or unmatched identity falls back to paddle 2 and is reported
/// as degraded rather than failing.
pub fn determine_role(local: Option<&str>, player1: &PlayerId, player2: &PlayerId) -> RoleResolution {
    match local {
        Some(name) if name == player1.as_str() => RoleResolution {
            side: PaddleSide::One,
            degraded: false,
        },
        Some(name) if name == player2.as_str() => RoleResolution {
            side: PaddleSide::Two,
            degraded: false,
        },
        _ => {
            warn!(
                local = ?local,
                player1 = %player1,
                player2 = %player2,
                "Local identity unresolved, defaulting to paddle 2"
            );
            RoleResolution {
                side: PaddleSide::Two,
                degraded: true,
            }
        }
    }
}

/// Result of one [`SessionController::tick`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Session is not running
    Inactive,
    /// Match advanced
    Advanced { goal: Option<ScoreEvent> },
    /// A match reached its end this tick
    MatchOver(MatchResult),
}

/// Commands and notifications produced by the controller
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// Join the matchmaking queue
    OpenMatchmaking,
    /// Connect to a match channel
    OpenMatch { channel_id: String },
    /// Send a message on the match channel
    Outbound(ClientMsg),
    /// Close the match channel
    CloseChannel,
    /// A locally simulated match was set up and can take a placement
    MatchReady,
    /// Report a finished match to history
    MatchFinished(MatchHistoryEntry),
    RoundStarted { player1: String, player2: String },
    TournamentFinished { champion: String },
    /// Non-fatal message for the player
    Notice(String),
}

/// Session errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    #[error("{mode:?} session cannot {reason}")]
    InvalidModeState {
        mode: SessionMode,
        reason: &'static str,
    },

    #[error(transparent)]
    Bracket(#[from] BracketError),
}

type StartFn = fn(&mut SessionController) -> Result<(), SessionError>;
type TickFn = fn(&mut SessionController, f32) -> TickOutcome;
type TerminateFn = fn(&mut SessionController, MatchResult);

/// Per-mode hooks
#[derive(Clone, Copy)]
struct ModeBehavior {
    on_start: StartFn,
    on_tick: TickFn,
    on_terminate: TerminateFn,
}

impl ModeBehavior {
    fn for_mode(mode: SessionMode) -> Self {
        match mode {
            SessionMode::Local => Self {
                on_start: SessionController::start_local,
                on_tick: SessionController::tick_local,
                on_terminate: SessionController::end_match,
            },
            SessionMode::Matchmade => Self {
                on_start: SessionController::start_matchmade,
                on_tick: SessionController::tick_remote,
                on_terminate: SessionController::end_match,
            },
            SessionMode::DirectFriend => Self {
                on_start: SessionController::start_direct_friend,
                on_tick: SessionController::tick_by_authority,
                on_terminate: SessionController::end_match,
            },
            SessionMode::Tournament => Self {
                on_start: SessionController::start_tournament,
                on_tick: SessionController::tick_local,
                on_terminate: SessionController::advance_bracket,
            },
        }
    }
}

fn initial_authority(mode: SessionMode) -> Authority {
    match mode {
        SessionMode::Matchmade => Authority::Remote,
        _ => Authority::Local,
    }
}

/// Owns one session's match state and drives it through its lifecycle
pub struct SessionController {
    id: Uuid,
    mode: SessionMode,
    behavior: ModeBehavior,
    state: SessionState,
    authority: Authority,
    physics: PhysicsConstants,
    max_score: u32,
    match_state: Option<MatchState>,
    rng: ChaCha8Rng,
    local_identity: Option<String>,
    opponent: Option<String>,
    friend_channel: Option<String>,
    players: Option<(String, String)>,
    role: Option<PaddleSide>,
    bracket: Bracket,
    channel_attached: bool,
    input_attached: bool,
    history_sent: bool,
    disposed: bool,
    final_result: Option<MatchResult>,
    outbox: Vec<SessionEvent>,
}

impl SessionController {
    pub fn new(mode: SessionMode, options: SessionOptions) -> Self {
        let rng = match options.seed {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed),
            None => ChaCha8Rng::from_entropy(),
        };

        Self {
            id: Uuid::new_v4(),
            mode,
            behavior: ModeBehavior::for_mode(mode),
            state: SessionState::Idle,
            authority: initial_authority(mode),
            physics: mode.physics(),
            // A zero target would end every match before the first serve
            max_score: options.max_score.max(1),
            match_state: None,
            rng,
            local_identity: options.local_identity,
            opponent: options.opponent,
            friend_channel: options.friend_channel,
            players: None,
            role: None,
            bracket: Bracket::new(),
            channel_attached: false,
            input_attached: false,
            history_sent: false,
            disposed: false,
            final_result: None,
            outbox: Vec::new(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn mode(&self) -> SessionMode {
        self.mode
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn authority(&self) -> Authority {
        self.authority
    }

    /// Live match, if one is in progress
    pub fn match_state(&self) -> Option<&MatchState> {
        self.match_state.as_ref()
    }

    /// Paddle controlled by the local player
    pub fn role(&self) -> Option<PaddleSide> {
        self.role
    }

    /// Player names of the current match
    pub fn players(&self) -> Option<(&str, &str)> {
        self.players
            .as_ref()
            .map(|(p1, p2)| (p1.as_str(), p2.as_str()))
    }

    pub fn bracket(&self) -> &Bracket {
        &self.bracket
    }

    /// Score of the last finished match
    pub fn final_result(&self) -> Option<MatchResult> {
        self.final_result
    }

    pub fn is_channel_attached(&self) -> bool {
        self.channel_attached
    }

    pub fn local_identity(&self) -> Option<&str> {
        self.local_identity.as_deref()
    }

    /// Record the signed-in player's username
    pub fn set_local_identity(&mut self, identity: impl Into<String>) {
        self.local_identity = Some(identity.into());
    }

    /// Enter tournament names; only valid for tournament sessions
    pub fn submit_players<S: AsRef<str>>(&mut self, names: &[S]) -> Result<(), SessionError> {
        if self.mode != SessionMode::Tournament {
            return Err(self.invalid("take tournament players"));
        }
        self.bracket.submit_players(names)?;
        Ok(())
    }

    /// Place paddles and ball from the game-init endpoint
    pub fn apply_placement(&mut self, placement: &Placement) {
        if self.authority != Authority::Local {
            return;
        }
        if let Some(state) = self.match_state.as_mut() {
            state.apply_placement(placement);
            debug!(session_id = %self.id, ?placement, "Placement applied");
        }
    }

    /// Leave `Idle` and run the mode's setup
    pub fn start(&mut self) -> Result<(), SessionError> {
        if self.state != SessionState::Idle {
            return Err(self.invalid("start outside Idle"));
        }

        self.state = SessionState::WaitingToStart;
        info!(session_id = %self.id, mode = ?self.mode, "Session starting");

        let on_start = self.behavior.on_start;
        if let Err(e) = on_start(self) {
            warn!(session_id = %self.id, error = %e, "Session start rejected");
            self.state = SessionState::Idle;
            self.push(SessionEvent::Notice(e.to_string()));
            return Err(e);
        }
        Ok(())
    }

    /// The matchmaking server paired us with an opponent
    pub fn on_match_found(&mut self, assignment: &MatchAssignment) -> Result<(), SessionError> {
        let expected = match self.mode {
            SessionMode::Matchmade => SessionState::WaitingToStart,
            SessionMode::DirectFriend => SessionState::Running,
            _ => return Err(self.invalid("join a networked match")),
        };
        if self.state != expected {
            return Err(self.invalid("take a match assignment now"));
        }

        let role = determine_role(
            self.local_identity.as_deref(),
            &assignment.player1_id,
            &assignment.player2_id,
        );
        self.role = Some(role.side);
        self.players = Some((
            assignment.player1_id.to_string(),
            assignment.player2_id.to_string(),
        ));

        info!(
            session_id = %self.id,
            player1 = %assignment.player1_id,
            player2 = %assignment.player2_id,
            channel_id = %assignment.channel_id,
            role = ?role.side,
            "Match found"
        );

        self.push(SessionEvent::OpenMatch {
            channel_id: assignment.channel_id.clone(),
        });
        Ok(())
    }

    /// The match channel is open; the remote side is now authoritative
    pub fn on_channel_opened(&mut self) {
        match (self.mode, self.state) {
            (SessionMode::Matchmade, SessionState::WaitingToStart) => {
                self.match_state = Some(MatchState::new());
                self.state = SessionState::Running;
            }
            (SessionMode::DirectFriend, SessionState::Running) => {}
            _ => {
                warn!(session_id = %self.id, mode = ?self.mode, state = ?self.state, "Unexpected match channel");
                return;
            }
        }

        self.authority = Authority::Remote;
        self.channel_attached = true;
        self.input_attached = true;
        info!(session_id = %self.id, "Match channel attached");
    }

    /// Route a key press or release
    pub fn handle_key(&mut self, key: Key, pressed: bool) {
        if !self.input_attached || self.state != SessionState::Running {
            return;
        }

        match self.authority {
            Authority::Local => {
                let speed = self.physics.paddle_speed;
                if let Some(state) = self.match_state.as_mut() {
                    state.apply_key(key, pressed, speed);
                }
            }
            Authority::Remote => {
                // Either key set steers our own paddle; the server knows who sent it
                let side = self.role.unwrap_or(PaddleSide::Two);
                let key = pressed.then_some(side.steer(key));
                self.push(SessionEvent::Outbound(ClientMsg::Move { key }));
            }
        }
    }

    /// Advance the session by one fixed step
    pub fn tick(&mut self, dt: f32) -> TickOutcome {
        if self.state != SessionState::Running {
            return TickOutcome::Inactive;
        }
        let on_tick = self.behavior.on_tick;
        on_tick(self, dt)
    }

    /// Overwrite the match with an authoritative snapshot
    pub fn handle_remote_snapshot(&mut self, snapshot: &Snapshot) -> Option<MatchResult> {
        if self.state != SessionState::Running || self.authority != Authority::Remote {
            debug!(session_id = %self.id, "Snapshot ignored");
            return None;
        }

        self.match_state.as_mut()?.apply_snapshot(snapshot);
        self.check_termination()
    }

    /// The match channel closed with `code`
    pub fn handle_channel_closed(&mut self, code: u16) {
        if code == NORMAL_CLOSURE {
            info!(session_id = %self.id, code, "Match channel closed");
        } else {
            warn!(session_id = %self.id, code, "Match channel closed abnormally");
        }

        self.channel_attached = false;
        if self.state != SessionState::Running || self.mode == SessionMode::Local {
            return;
        }

        let result = self.current_result();
        let on_terminate = self.behavior.on_terminate;
        on_terminate(self, result);
    }

    /// A transport problem that does not end the match
    pub fn handle_channel_error(&mut self, message: &str) {
        warn!(session_id = %self.id, error = %message, "Match channel error");
        self.push(SessionEvent::Notice(format!("Connection problem: {}", message)));
    }

    /// A message for the player
    pub fn handle_notice(&mut self, message: impl Into<String>) {
        self.push(SessionEvent::Notice(message.into()));
    }

    /// Tear the session down from any state. Safe to call more than once.
    pub fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        self.disposed = true;
        self.state = SessionState::Ended;
        self.input_attached = false;
        self.match_state = None;

        if self.channel_attached {
            self.channel_attached = false;
            self.push(SessionEvent::CloseChannel);
        }
        info!(session_id = %self.id, "Session disposed");
    }

    /// Take the queued events
    pub fn drain_events(&mut self) -> Vec<SessionEvent> {
        std::mem::take(&mut self.outbox)
    }

    fn push(&mut self, event: SessionEvent) {
        self.outbox.push(event);
    }

    fn invalid(&self, reason: &'static str) -> SessionError {
        SessionError::InvalidModeState {
            mode: self.mode,
            reason,
        }
    }

    fn current_result(&self) -> MatchResult {
        self.match_state
            .as_ref()
            .map(|s| MatchResult {
                score1: s.score1,
                score2: s.score2,
            })
            .unwrap_or(MatchResult { score1: 0, score2: 0 })
    }

    /// Fresh match under local authority
    fn begin_local_match(&mut self) {
        self.match_state = Some(MatchState::new());
        self.input_attached = true;
        self.state = SessionState::Running;
        self.push(SessionEvent::MatchReady);
    }

    fn check_termination(&mut self) -> Option<MatchResult> {
        let reached = self.match_state.as_ref()?.reached(self.max_score);
        if !reached {
            return None;
        }

        let result = self.current_result();
        let on_terminate = self.behavior.on_terminate;
        on_terminate(self, result);
        Some(result)
    }

    // Start hooks

    fn start_local(&mut self) -> Result<(), SessionError> {
        self.players = Some(("player1".to_string(), "player2".to_string()));
        self.begin_local_match();
        Ok(())
    }

    fn start_matchmade(&mut self) -> Result<(), SessionError> {
        self.push(SessionEvent::OpenMatchmaking);
        Ok(())
    }

    fn start_direct_friend(&mut self) -> Result<(), SessionError> {
        let opponent = self
            .opponent
            .clone()
            .ok_or_else(|| self.invalid("start without an opponent"))?;
        let host = self
            .local_identity
            .clone()
            .unwrap_or_else(|| "player1".to_string());

        info!(session_id = %self.id, host = %host, opponent = %opponent, "Hosting friend match");
        self.players = Some((host, opponent));
        self.role = Some(PaddleSide::One);
        self.begin_local_match();

        if let Some(channel_id) = self.friend_channel.clone() {
            self.push(SessionEvent::OpenMatch { channel_id });
        }
        Ok(())
    }

    fn start_tournament(&mut self) -> Result<(), SessionError> {
        if self.bracket.stage() != BracketStage::Semifinals {
            return Err(self.invalid("start before players are submitted"));
        }
        self.begin_round();
        Ok(())
    }

    fn begin_round(&mut self) {
        let Some(current) = self.bracket.current_match() else {
            return;
        };
        let (player1, player2) = (current.player1.clone(), current.player2.clone());

        info!(
            session_id = %self.id,
            stage = ?self.bracket.stage(),
            player1 = %player1,
            player2 = %player2,
            "Tournament round starting"
        );
        self.players = Some((player1.clone(), player2.clone()));
        self.push(SessionEvent::RoundStarted { player1, player2 });
        self.begin_local_match();
    }

    // Tick hooks

    fn tick_local(&mut self, dt: f32) -> TickOutcome {
        let Some(state) = self.match_state.as_mut() else {
            return TickOutcome::Inactive;
        };

        let goal = PhysicsSystem::advance(state, dt, &self.physics, &mut self.rng);
        if let Some(goal) = goal {
            info!(
                session_id = %self.id,
                scorer = ?goal.scorer,
                score1 = goal.score1,
                score2 = goal.score2,
                "Goal"
            );
        }

        match self.check_termination() {
            Some(result) => TickOutcome::MatchOver(result),
            None => TickOutcome::Advanced { goal },
        }
    }

    fn tick_remote(&mut self, _dt: f32) -> TickOutcome {
        match self.check_termination() {
            Some(result) => TickOutcome::MatchOver(result),
            None => TickOutcome::Advanced { goal: None },
        }
    }

    fn tick_by_authority(&mut self, dt: f32) -> TickOutcome {
        match self.authority {
            Authority::Local => self.tick_local(dt),
            Authority::Remote => self.tick_remote(dt),
        }
    }

    // Termination hooks

    fn end_match(&mut self, result: MatchResult) {
        info!(
            session_id = %self.id,
            score1 = result.score1,
            score2 = result.score2,
            "Match over"
        );

        self.state = SessionState::Ended;
        self.final_result = Some(result);
        self.match_state = None;
        self.input_attached = false;

        if self.mode.records_history() && !self.history_sent {
            self.history_sent = true;
            let entry = self.history_entry(result);
            self.push(SessionEvent::MatchFinished(entry));
        }
        if self.channel_attached {
            self.channel_attached = false;
            self.push(SessionEvent::CloseChannel);
        }
    }

    fn advance_bracket(&mut self, result: MatchResult) {
        self.final_result = Some(result);

        match self.bracket.on_match_score_threshold(result.score1, result.score2) {
            Ok(BracketAdvance::NextSemifinal | BracketAdvance::FinalSeeded) => self.begin_round(),
            Ok(BracketAdvance::Champion(champion)) => {
                info!(session_id = %self.id, champion = %champion, "Tournament finished");
                self.state = SessionState::Ended;
                self.match_state = None;
                self.input_attached = false;
                self.push(SessionEvent::TournamentFinished { champion });
            }
            Err(e) => {
                warn!(session_id = %self.id, error = %e, "Bracket could not advance");
                self.state = SessionState::Ended;
                self.match_state = None;
                self.input_attached = false;
            }
        }
    }

    fn history_entry(&self, result: MatchResult) -> MatchHistoryEntry {
        let (player1, player2) = self
            .players
            .clone()
            .unwrap_or_else(|| ("player1".to_string(), "player2".to_string()));

        let winner = match result.winner() {
            Some(PaddleSide::One) => player1.clone(),
            Some(PaddleSide::Two) => player2.clone(),
            None => "draw".to_string(),
        };

        MatchHistoryEntry {
            player1_username: player1,
            player2_username: player2,
            score1: result.score1,
            score2: result.score2,
            result: winner,
        }
    }
}
