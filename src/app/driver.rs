//! Async frame driver: owns the session and runs its fixed-step loop
//!
//! Every networked path starts from the controller's outbox: a Matchmade
//! session asks for matchmaking, and a DirectFriend host asks for its
//! shared channel (`SessionOptions::friend_channel`). Hosts without one
//! play locally for the whole match.

use std::future::Future;
use std::time::Duration;

use futures::FutureExt;
use tokio::sync::mpsc;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::game::{KeyInput, MatchResult, SessionController, SessionEvent, SessionMode, SessionState, TickOutcome};
use crate::store::{ApiClient, MatchHistoryEntry};
use crate::util::time::{frame_delta, Timer, DEFAULT_FRAME_INTERVAL};
use crate::ws::{ChannelEvent, Connector, NetworkSync};

use super::render::Renderer;

/// What a finished run produced
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSummary {
    pub session_id: Uuid,
    pub mode: SessionMode,
    /// Ticks on which the session was running
    pub ticks: u64,
    pub final_result: Option<MatchResult>,
    pub champion: Option<String>,
    /// History entries produced during the run
    pub history: Vec<MatchHistoryEntry>,
}

/// Drives one [`SessionController`] against the network and a renderer
pub struct SessionDriver<C: Connector, R: Renderer> {
    controller: SessionController,
    sync: NetworkSync<C>,
    channel_events: mpsc::Receiver<ChannelEvent>,
    renderer: R,
    api: Option<ApiClient>,
    auth_token: Option<String>,
    frame_interval: Duration,
    dt: f32,
    ticks: u64,
    champion: Option<String>,
    history: Vec<MatchHistoryEntry>,
}

impl<C: Connector, R: Renderer> SessionDriver<C, R> {
    pub fn new(controller: SessionController, connector: C, ws_base_url: &str, renderer: R) -> Self {
        let (sync, channel_events) = NetworkSync::new(connector, ws_base_url);
        Self {
            controller,
            sync,
            channel_events,
            renderer,
            api: None,
            auth_token: None,
            frame_interval: DEFAULT_FRAME_INTERVAL,
            dt: frame_delta(),
            ticks: 0,
            champion: None,
            history: Vec::new(),
        }
    }

    /// REST collaborator for profile, placement and history
    pub fn with_api(mut self, api: ApiClient) -> Self {
        self.api = Some(api);
        self
    }

    /// Token for the matchmaking channel
    pub fn with_auth_token(mut self, token: Option<String>) -> Self {
        self.auth_token = token;
        self
    }

    /// Wall-clock time between ticks; zero keeps the current interval
    pub fn with_frame_interval(mut self, frame_interval: Duration) -> Self {
        if frame_interval.is_zero() {
            warn!(current = ?self.frame_interval, "Ignoring zero frame interval");
        } else {
            self.frame_interval = frame_interval;
        }
        self
    }

    /// Run until the session ends or `shutdown` resolves
    pub async fn run<F>(mut self, mut keys: mpsc::Receiver<KeyInput>, shutdown: F) -> SessionSummary
    where
        F: Future<Output = ()>,
    {
        let timer = Timer::new();
        let shutdown = shutdown.fuse();
        tokio::pin!(shutdown);

        self.resolve_identity().await;

        match self.controller.start() {
            Ok(()) => {
                info!(
                    session_id = %self.controller.id(),
                    mode = ?self.controller.mode(),
                    "Session started"
                );
                if !self.flush_outbox(&mut shutdown).await {
                    return self.finish(&timer).await;
                }
            }
            Err(e) => {
                warn!(error = %e, "Session could not start");
                self.flush_outbox(&mut shutdown).await;
                return self.finish(&timer).await;
            }
        }

        let mut ticker = interval(self.frame_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut keys_open = true;

        while self.controller.state() != SessionState::Ended {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Shutdown requested");
                    break;
                }

                key = keys.recv(), if keys_open => match key {
                    Some(input) => {
                        self.controller.handle_key(input.key, input.pressed);
                        self.flush_outbox(&mut shutdown).await;
                    }
                    None => {
                        debug!("Input source closed");
                        keys_open = false;
                    }
                },

                _ = ticker.tick() => {
                    self.drain_channel_events();

                    let outcome = self.controller.tick(self.dt);
                    if outcome != TickOutcome::Inactive {
                        self.ticks += 1;
                    }
                    if let Some(state) = self.controller.match_state() {
                        self.renderer.render(state);
                    }

                    self.flush_outbox(&mut shutdown).await;
                }
            }
        }

        self.finish(&timer).await
    }

    /// Apply channel events buffered since the last tick
    fn drain_channel_events(&mut self) {
        while let Ok(event) = self.channel_events.try_recv() {
            match event {
                ChannelEvent::Opened => self.controller.on_channel_opened(),
                ChannelEvent::Snapshot(snapshot) => {
                    self.controller.handle_remote_snapshot(&snapshot);
                }
                ChannelEvent::Closed { code } => self.controller.handle_channel_closed(code),
                ChannelEvent::Error(message) => self.controller.handle_channel_error(&message),
                ChannelEvent::Notice(message) => self.controller.handle_notice(message),
            }
        }
    }

    /// Execute queued controller commands until none are left.
    ///
    /// Returns `false` if `shutdown` resolved while waiting on matchmaking.
    async fn flush_outbox<S>(&mut self, shutdown: &mut S) -> bool
    where
        S: Future<Output = ()> + Unpin,
    {
        loop {
            let events = self.controller.drain_events();
            if events.is_empty() {
                return true;
            }

            for event in events {
                match event {
                    SessionEvent::OpenMatchmaking => {
                        if !self.matchmake(shutdown).await {
                            return false;
                        }
                    }
                    SessionEvent::OpenMatch { channel_id } => {
                        if let Err(e) = self.sync.open_match(&channel_id).await {
                            self.controller.handle_channel_error(&e.to_string());
                            // Nothing to play without the channel
                            if self.controller.state() == SessionState::WaitingToStart {
                                self.controller.dispose();
                            }
                        }
                    }
                    SessionEvent::Outbound(msg) => {
                        self.sync.send(&msg);
                    }
                    SessionEvent::CloseChannel => self.sync.close().await,
                    SessionEvent::MatchReady => self.fetch_placement().await,
                    SessionEvent::MatchFinished(entry) => self.record_history(entry).await,
                    SessionEvent::RoundStarted { player1, player2 } => {
                        self.renderer
                            .notice(&format!("Next match: {} vs {}", player1, player2));
                    }
                    SessionEvent::TournamentFinished { champion } => {
                        self.renderer
                            .notice(&format!("{} wins the tournament", champion));
                        self.champion = Some(champion);
                    }
                    SessionEvent::Notice(message) => self.renderer.notice(&message),
                }
            }
        }
    }

    /// Wait in the matchmaking queue, giving up if `shutdown` resolves first
    async fn matchmake<S>(&mut self, shutdown: &mut S) -> bool
    where
        S: Future<Output = ()> + Unpin,
    {
        let Some(token) = self.auth_token.clone() else {
            self.controller
                .handle_notice("Sign in to play against other players");
            self.controller.dispose();
            return true;
        };

        let result = tokio::select! {
            _ = &mut *shutdown => {
                info!("Shutdown requested while matchmaking");
                self.controller.dispose();
                return false;
            }
            result = self.sync.join_matchmaking(&token) => result,
        };

        match result {
            Ok(assignment) => {
                if let Err(e) = self.controller.on_match_found(&assignment) {
                    warn!(error = %e, "Match assignment rejected");
                }
            }
            Err(e) => {
                self.controller.handle_channel_error(&e.to_string());
                self.controller.dispose();
            }
        }
        // Drain any notices the queue produced
        self.drain_channel_events();
        true
    }

    /// Look up the signed-in player so the controller can resolve its role
    async fn resolve_identity(&mut self) {
        if self.controller.local_identity().is_some() {
            return;
        }
        let Some(api) = self.api.as_ref().filter(|api| api.is_authenticated()) else {
            return;
        };

        match api.get_profile().await {
            Ok(profile) => {
                info!(username = %profile.username, "Profile loaded");
                self.controller.set_local_identity(profile.username);
            }
            Err(e) => warn!(error = %e, "Failed to load profile"),
        }
    }

    async fn fetch_placement(&mut self) {
        let Some(api) = self.api.as_ref() else {
            return;
        };

        match api.init_game().await {
            Ok(placement) => self.controller.apply_placement(&placement),
            Err(e) => warn!(error = %e, "Failed to fetch game placement, using defaults"),
        }
    }

    async fn record_history(&mut self, entry: MatchHistoryEntry) {
        if let Some(api) = self.api.as_ref().filter(|api| api.is_authenticated()) {
            match api.store_match_history(&entry).await {
                Ok(()) => info!(result = %entry.result, "Match history stored"),
                Err(e) => warn!(error = %e, "Failed to store match history"),
            }
        }
        self.history.push(entry);
    }

    async fn finish(mut self, timer: &Timer) -> SessionSummary {
        self.controller.dispose();
        for event in self.controller.drain_events() {
            if event == SessionEvent::CloseChannel {
                self.sync.close().await;
            }
        }
        self.sync.close().await;

        let summary = SessionSummary {
            session_id: self.controller.id(),
            mode: self.controller.mode(),
            ticks: self.ticks,
            final_result: self.controller.final_result(),
            champion: self.champion,
            history: self.history,
        };

        info!(
            session_id = %summary.session_id,
            ticks = summary.ticks,
            elapsed_ms = timer.elapsed_ms(),
            result = ?summary.final_result,
            "Session finished"
        );
        summary
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::game::{MatchState, SessionOptions};
    use crate::ws::protocol::Key;
    use crate::ws::transport::mock::{MockConnector, MockTransport};
    use crate::ws::transport::NORMAL_CLOSURE;

    #[derive(Clone, Default)]
    struct Recorder {
        frames: Arc<Mutex<Vec<MatchState>>>,
        notices: Arc<Mutex<Vec<String>>>,
    }

    impl Renderer for Recorder {
        fn render(&mut self, state: &MatchState) {
            self.frames.lock().unwrap().push(state.clone());
        }

        fn notice(&mut self, message: &str) {
            self.notices.lock().unwrap().push(message.to_string());
        }
    }

    fn options(local: Option<&str>) -> SessionOptions {
        SessionOptions {
            seed: Some(1),
            local_identity: local.map(str::to_string),
            ..Default::default()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn local_session_ticks_until_shutdown() {
        let recorder = Recorder::default();
        let controller = SessionController::new(SessionMode::Local, options(None));
        let driver = SessionDriver::new(controller, MockConnector::default(), "ws://h", recorder.clone());

        let (keys_tx, keys_rx) = mpsc::channel(8);
        keys_tx
            .send(KeyInput { key: Key::D, pressed: true })
            .await
            .unwrap();

        let summary = driver
            .run(keys_rx, tokio::time::sleep(Duration::from_millis(200)))
            .await;

        assert_eq!(summary.mode, SessionMode::Local);
        assert!(summary.ticks >= 10);
        assert!(summary.final_result.is_none());
        assert!(summary.history.is_empty());

        let frames = recorder.frames.lock().unwrap();
        assert_eq!(frames.len() as u64, summary.ticks);
        assert!(frames.last().unwrap().paddle1_pos > 0.0);
    }

    #[tokio::test(start_paused = true)]
    async fn matchmade_session_ends_on_max_score() {
        let (lobby, lobby_wire) = MockTransport::with_texts([
            r#"{"type":"waiting","queue_size":1}"#,
            r#"{"type":"match_found","player1_id":"alice","player2_id":"bob","game_group_name":"game_1"}"#,
        ]);
        let (game, game_wire) = MockTransport::with_texts([
            r#"{"type":"game_init","paddle1_x":0,"paddle2_x":0,"ball_x":0,"ball_z":0,"score1":0,"score2":0}"#,
            r#"{"type":"game_update","paddle1_x":1,"paddle2_x":2,"ball_x":3,"ball_z":4,"score1":3,"score2":3}"#,
            r#"{"type":"game_update","paddle1_x":1,"paddle2_x":2,"ball_x":0,"ball_z":0,"score1":5,"score2":3}"#,
        ]);
        let connector = MockConnector::new(vec![lobby, game]);

        let recorder = Recorder::default();
        let controller = SessionController::new(SessionMode::Matchmade, options(Some("alice")));
        let driver = SessionDriver::new(controller, connector.clone(), "ws://h", recorder)
            .with_auth_token(Some("tok".to_string()));

        let (_keys_tx, keys_rx) = mpsc::channel(8);
        let summary = driver.run(keys_rx, std::future::pending::<()>()).await;

        assert_eq!(summary.final_result, Some(MatchResult { score1: 5, score2: 3 }));
        assert_eq!(summary.history.len(), 1);
        assert_eq!(summary.history[0].result, "alice");
        assert_eq!(summary.history[0].player2_username, "bob");

        assert_eq!(
            connector.urls(),
            ["ws://h/ws/matchmaking/?token=tok", "ws://h/ws/game/game_1/"]
        );
        assert_eq!(lobby_wire.sent(), [r#"{"action":"join_queue"}"#]);
        assert_eq!(game_wire.closed_with(), Some(NORMAL_CLOSURE));
    }

    #[tokio::test(start_paused = true)]
    async fn zero_frame_interval_keeps_the_default() {
        let controller = SessionController::new(SessionMode::Local, options(None));
        let driver = SessionDriver::new(controller, MockConnector::default(), "ws://h", Recorder::default())
            .with_frame_interval(Duration::ZERO);

        let (_keys_tx, keys_rx) = mpsc::channel(8);
        let summary = driver
            .run(keys_rx, tokio::time::sleep(DEFAULT_FRAME_INTERVAL * 10))
            .await;

        assert!((9..=11).contains(&summary.ticks), "ticks = {}", summary.ticks);
    }

    #[tokio::test(start_paused = true)]
    async fn refused_match_channel_disposes_a_matchmade_session() {
        let (lobby, _lobby_wire) = MockTransport::with_texts([
            r#"{"type":"match_found","player1_id":"alice","player2_id":"bob","game_group_name":"game_1"}"#,
        ]);
        let connector = MockConnector::new(vec![lobby]);

        let recorder = Recorder::default();
        let controller = SessionController::new(SessionMode::Matchmade, options(Some("alice")));
        let driver = SessionDriver::new(controller, connector.clone(), "ws://h", recorder.clone())
            .with_auth_token(Some("tok".to_string()));

        let (_keys_tx, keys_rx) = mpsc::channel(8);
        let summary = driver.run(keys_rx, std::future::pending::<()>()).await;

        assert_eq!(summary.ticks, 0);
        assert!(summary.final_result.is_none());
        assert!(summary.history.is_empty());
        assert_eq!(
            connector.urls(),
            ["ws://h/ws/matchmaking/?token=tok", "ws://h/ws/game/game_1/"]
        );

        let notices = recorder.notices.lock().unwrap();
        assert!(notices.iter().any(|n| n.starts_with("Connection problem")));
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_while_matchmaking_disposes_the_session() {
        let (lobby, lobby_wire) = MockTransport::with_texts([r#"{"type":"waiting","queue_size":1}"#]);
        let connector = MockConnector::new(vec![lobby]);

        let recorder = Recorder::default();
        let controller = SessionController::new(SessionMode::Matchmade, options(Some("alice")));
        let driver = SessionDriver::new(controller, connector.clone(), "ws://h", recorder.clone())
            .with_auth_token(Some("tok".to_string()));

        let (_keys_tx, keys_rx) = mpsc::channel(8);
        let summary = driver
            .run(keys_rx, tokio::time::sleep(Duration::from_millis(50)))
            .await;

        assert_eq!(summary.ticks, 0);
        assert!(summary.final_result.is_none());
        assert_eq!(connector.urls(), ["ws://h/ws/matchmaking/?token=tok"]);
        assert_eq!(lobby_wire.sent(), [r#"{"action":"join_queue"}"#]);
        assert!(recorder.frames.lock().unwrap().is_empty());
    }

    fn friend_options(channel: &str) -> SessionOptions {
        SessionOptions {
            opponent: Some("bob".to_string()),
            friend_channel: Some(channel.to_string()),
            ..options(Some("alice"))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn friend_host_keeps_playing_when_the_channel_fails() {
        let connector = MockConnector::default();
        let recorder = Recorder::default();
        let controller = SessionController::new(SessionMode::DirectFriend, friend_options("friends_7"));
        let driver = SessionDriver::new(controller, connector.clone(), "ws://h", recorder.clone());

        let (_keys_tx, keys_rx) = mpsc::channel(8);
        let summary = driver
            .run(keys_rx, tokio::time::sleep(Duration::from_millis(100)))
            .await;

        assert!(summary.ticks > 0);
        assert!(summary.final_result.is_none());
        assert_eq!(connector.urls(), ["ws://h/ws/game/friends_7/"]);
        assert_eq!(recorder.frames.lock().unwrap().len() as u64, summary.ticks);

        let notices = recorder.notices.lock().unwrap();
        assert!(notices.iter().any(|n| n.starts_with("Connection problem")));
    }

    #[tokio::test(start_paused = true)]
    async fn friend_host_hands_over_to_the_shared_channel() {
        let (game, game_wire) = MockTransport::with_texts([
            r#"{"type":"game_update","paddle1_x":1,"paddle2_x":2,"ball_x":0,"ball_z":0,"score1":2,"score2":5}"#,
        ]);
        let connector = MockConnector::new(vec![game]);
        let controller = SessionController::new(SessionMode::DirectFriend, friend_options("friends_7"));
        let driver = SessionDriver::new(controller, connector, "ws://h", Recorder::default());

        let (_keys_tx, keys_rx) = mpsc::channel(8);
        let summary = driver.run(keys_rx, std::future::pending::<()>()).await;

        assert_eq!(summary.final_result, Some(MatchResult { score1: 2, score2: 5 }));
        assert_eq!(summary.history.len(), 1);
        assert_eq!(summary.history[0].player1_username, "alice");
        assert_eq!(summary.history[0].result, "bob");
        assert_eq!(game_wire.closed_with(), Some(NORMAL_CLOSURE));
    }

    #[tokio::test(start_paused = true)]
    async fn matchmade_without_token_stops_with_a_notice() {
        let recorder = Recorder::default();
        let controller = SessionController::new(SessionMode::Matchmade, options(Some("alice")));
        let driver = SessionDriver::new(controller, MockConnector::default(), "ws://h", recorder.clone());

        let (_keys_tx, keys_rx) = mpsc::channel(8);
        let summary = driver.run(keys_rx, std::future::pending::<()>()).await;

        assert_eq!(summary.ticks, 0);
        assert!(summary.final_result.is_none());
        assert_eq!(recorder.notices.lock().unwrap().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn tournament_without_players_does_not_start() {
        let recorder = Recorder::default();
        let controller = SessionController::new(SessionMode::Tournament, options(None));
        let driver = SessionDriver::new(controller, MockConnector::default(), "ws://h", recorder.clone());

        let (_keys_tx, keys_rx) = mpsc::channel(8);
        let summary = driver.run(keys_rx, std::future::pending::<()>()).await;

        assert_eq!(summary.ticks, 0);
        assert!(summary.champion.is_none());
        assert_eq!(recorder.notices.lock().unwrap().len(), 1);
    }
}
