//! Client side of the matchmaking and match channels

use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::protocol::{ClientMsg, Key, PlayerId, ServerMsg, Snapshot};
use super::transport::{ChannelError, Connector, Incoming, Transport, ABNORMAL_CLOSURE, NORMAL_CLOSURE};

/// Capacity of the channel event queue
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

/// How long `close` waits for the match loop before aborting it
pub const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(1);

/// Events from the network, consumed by the session driver
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelEvent {
    /// Match channel connected
    Opened,
    Snapshot(Snapshot),
    Closed { code: u16 },
    Error(String),
    /// Server-reported message that does not affect the connection
    Notice(String),
}

/// Pairing handed out by the matchmaking server
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchAssignment {
    pub player1_id: PlayerId,
    pub player2_id: PlayerId,
    /// Names the match channel
    pub channel_id: String,
}

/// Owns at most one live match channel
pub struct NetworkSync<C: Connector> {
    connector: C,
    ws_base_url: String,
    events: mpsc::Sender<ChannelEvent>,
    outbound: Option<mpsc::UnboundedSender<String>>,
    shutdown_tx: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl<C: Connector> NetworkSync<C> {
    pub fn new(connector: C, ws_base_url: &str) -> (Self, mpsc::Receiver<ChannelEvent>) {
        let (events, events_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let sync = Self {
            connector,
            ws_base_url: ws_base_url.trim_end_matches('/').to_string(),
            events,
            outbound: None,
            shutdown_tx: None,
            task: None,
        };
        (sync, events_rx)
    }

    /// Queue for a match and wait for the pairing.
    ///
    /// The matchmaking channel is closed once a match is found. Server errors
    /// are reported as notices and waiting continues. Nobody drains events
    /// while we wait, so notices past the queue capacity are dropped.
    pub async fn join_matchmaking(&self, token: &str) -> Result<MatchAssignment, ChannelError> {
        let url = format!("{}/ws/matchmaking/?token={}", self.ws_base_url, token);
        let mut transport = self.connector.connect(&url).await?;

        transport
            .send(serde_json::to_string(&ClientMsg::JoinQueue)?)
            .await?;
        info!("Joined matchmaking queue");

        loop {
            let text = match transport.recv().await? {
                Incoming::Text(text) => text,
                Incoming::Closed { code } => {
                    warn!(code, "Matchmaking channel closed before a match was found");
                    return Err(ChannelError::Closed { code });
                }
            };

            match serde_json::from_str::<ServerMsg>(&text) {
                Ok(ServerMsg::MatchFound {
                    player1_id,
                    player2_id,
                    game_group_name,
                }) => {
                    if let Err(e) = transport.close(NORMAL_CLOSURE).await {
                        debug!(error = %e, "Matchmaking channel close failed");
                    }
                    return Ok(MatchAssignment {
                        player1_id,
                        player2_id,
                        channel_id: game_group_name,
                    });
                }
                Ok(ServerMsg::Waiting { queue_size }) => {
                    debug!(?queue_size, "Waiting for an opponent");
                }
                Ok(ServerMsg::Connected { user_id }) => {
                    info!(user_id = ?user_id, "Matchmaking connected");
                }
                Ok(ServerMsg::JoinedQueue { user_id }) => {
                    info!(user_id = ?user_id, "Queue entry confirmed");
                }
                Ok(ServerMsg::Error { message }) => {
                    warn!(error = %message, "Matchmaking error");
                    if let Err(e) = self.events.try_send(ChannelEvent::Notice(message)) {
                        warn!(error = %e, "Event queue full, dropping matchmaking notice");
                    }
                }
                Ok(other) => {
                    debug!(message = ?other, "Ignoring message on matchmaking channel");
                }
                Err(e) => {
                    warn!(error = %e, raw = %text, "Failed to parse matchmaking message");
                }
            }
        }
    }

    /// Connect to a match channel and start forwarding its events
    pub async fn open_match(&mut self, channel_id: &str) -> Result<(), ChannelError> {
        if self.is_open() {
            self.close().await;
        }

        let url = format!("{}/ws/game/{}/", self.ws_base_url, channel_id);
        let transport = self.connector.connect(&url).await?;
        info!(channel_id = %channel_id, "Match channel open");

        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        emit(&self.events, ChannelEvent::Opened).await;
        self.task = Some(tokio::spawn(match_loop(
            transport,
            outbound_rx,
            self.events.clone(),
            shutdown_rx,
        )));
        self.outbound = Some(outbound_tx);
        self.shutdown_tx = Some(shutdown_tx);
        Ok(())
    }

    /// Forward a move intent. Dropped when no match channel is open.
    pub fn send_input(&self, key: Option<Key>) -> bool {
        self.send(&ClientMsg::Move { key })
    }

    /// Queue a message on the match channel
    pub fn send(&self, msg: &ClientMsg) -> bool {
        let Some(outbound) = self.outbound.as_ref() else {
            debug!("No match channel, dropping message");
            return false;
        };

        match serde_json::to_string(msg) {
            Ok(json) => outbound.send(json).is_ok(),
            Err(e) => {
                error!(error = %e, "Failed to serialize client message");
                false
            }
        }
    }

    pub fn is_open(&self) -> bool {
        self.outbound.as_ref().is_some_and(|tx| !tx.is_closed())
    }

    /// Close the match channel with a normal closure. Safe to call repeatedly.
    pub async fn close(&mut self) {
        self.outbound = None;
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }

        if let Some(mut task) = self.task.take() {
            match tokio::time::timeout(SHUTDOWN_TIMEOUT, &mut task).await {
                Ok(_) => debug!("Match loop stopped"),
                Err(_) => {
                    warn!("Match loop did not stop in time, aborting");
                    task.abort();
                }
            }
        }
    }
}

impl<C: Connector> Drop for NetworkSync<C> {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

async fn emit(events: &mpsc::Sender<ChannelEvent>, event: ChannelEvent) {
    if events.send(event).await.is_err() {
        debug!("Channel event receiver dropped");
    }
}

/// Multiplex outbound messages, shutdown and inbound frames for one match.
///
/// Outbound messages are flushed before a pending shutdown is honoured.
async fn match_loop(
    mut transport: Box<dyn Transport>,
    mut outbound: mpsc::UnboundedReceiver<String>,
    events: mpsc::Sender<ChannelEvent>,
    mut shutdown: oneshot::Receiver<()>,
) {
    debug!("Match loop started");

    loop {
        tokio::select! {
            biased;

            msg = outbound.recv() => match msg {
                Some(text) => {
                    if let Err(e) = transport.send(text).await {
                        error!(error = %e, "Match channel send failed");
                        emit(&events, ChannelEvent::Error(e.to_string())).await;
                        emit(&events, ChannelEvent::Closed { code: ABNORMAL_CLOSURE }).await;
                        break;
                    }
                }
                None => {
                    let _ = transport.close(NORMAL_CLOSURE).await;
                    break;
                }
            },

            // Local closes are not reported back as events
            _ = &mut shutdown => {
                let _ = transport.close(NORMAL_CLOSURE).await;
                break;
            }

            incoming = transport.recv() => match incoming {
                Ok(Incoming::Text(text)) => match serde_json::from_str::<ServerMsg>(&text) {
                    Ok(ServerMsg::GameInit(snapshot) | ServerMsg::GameUpdate(snapshot)) => {
                        emit(&events, ChannelEvent::Snapshot(snapshot)).await;
                    }
                    Ok(ServerMsg::Error { message }) => {
                        emit(&events, ChannelEvent::Error(message)).await;
                    }
                    Ok(other) => debug!(message = ?other, "Ignoring message on match channel"),
                    Err(e) => warn!(error = %e, raw = %text, "Failed to parse match message"),
                },
                Ok(Incoming::Closed { code }) => {
                    emit(&events, ChannelEvent::Closed { code }).await;
                    break;
                }
                Err(e) => {
                    error!(error = %e, "Match channel receive failed");
                    emit(&events, ChannelEvent::Error(e.to_string())).await;
                    emit(&events, ChannelEvent::Closed { code: ABNORMAL_CLOSURE }).await;
                    break;
                }
            },
        }
    }

    debug!("Match loop exited");
}
