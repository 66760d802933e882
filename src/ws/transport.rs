//! Message transport seam and its WebSocket implementation

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::debug;

/// Close code for an orderly shutdown
pub const NORMAL_CLOSURE: u16 = 1000;
/// Close frame carried no status code
pub const NO_STATUS_RECEIVED: u16 = 1005;
/// Connection dropped without a close frame
pub const ABNORMAL_CLOSURE: u16 = 1006;

/// What a transport read produced
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Incoming {
    Text(String),
    Closed { code: u16 },
}

/// A bidirectional text channel to one endpoint
#[async_trait]
pub trait Transport: Send {
    async fn send(&mut self, text: String) -> Result<(), ChannelError>;

    /// Next text frame, or the closure once the peer has gone
    async fn recv(&mut self) -> Result<Incoming, ChannelError>;

    async fn close(&mut self, code: u16) -> Result<(), ChannelError>;
}

/// Opens transports
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, url: &str) -> Result<Box<dyn Transport>, ChannelError>;
}

/// Connects over WebSocket
#[derive(Debug, Clone, Copy, Default)]
pub struct WsConnector;

#[async_trait]
impl Connector for WsConnector {
    async fn connect(&self, url: &str) -> Result<Box<dyn Transport>, ChannelError> {
        let (stream, response) = connect_async(url).await.map_err(|e| ChannelError::Connect {
            url: redact(url),
            reason: e.to_string(),
        })?;

        debug!(url = %redact(url), status = %response.status(), "WebSocket connected");
        Ok(Box::new(WsTransport { stream }))
    }
}

/// WebSocket-backed transport
pub struct WsTransport {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait]
impl Transport for WsTransport {
    async fn send(&mut self, text: String) -> Result<(), ChannelError> {
        self.stream
            .send(Message::Text(text))
            .await
            .map_err(|e| ChannelError::Transport(e.to_string()))
    }

    async fn recv(&mut self) -> Result<Incoming, ChannelError> {
        loop {
            match self.stream.next().await {
                Some(Ok(Message::Text(text))) => return Ok(Incoming::Text(text)),
                Some(Ok(Message::Close(frame))) => {
                    let code = frame
                        .map(|f| u16::from(f.code))
                        .unwrap_or(NO_STATUS_RECEIVED);
                    return Ok(Incoming::Closed { code });
                }
                // Pings are answered by tungstenite itself
                Some(Ok(_)) => continue,
                Some(Err(e)) => return Err(ChannelError::Transport(e.to_string())),
                None => return Ok(Incoming::Closed { code: ABNORMAL_CLOSURE }),
            }
        }
    }

    async fn close(&mut self, code: u16) -> Result<(), ChannelError> {
        let frame = CloseFrame {
            code: CloseCode::from(code),
            reason: "".into(),
        };
        self.stream
            .close(Some(frame))
            .await
            .map_err(|e| ChannelError::Transport(e.to_string()))
    }
}

/// Strip the query string so tokens never reach the logs
fn redact(url: &str) -> String {
    match url.split_once('?') {
        Some((base, _)) => format!("{}?…", base),
        None => url.to_string(),
    }
}

/// Channel errors
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("Failed to connect to {url}: {reason}")]
    Connect { url: String, reason: String },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Channel closed with code {code}")]
    Closed { code: u16 },

    #[error("Failed to encode message: {0}")]
    Encode(#[from] serde_json::Error),
}

#[cfg(test)]
pub(crate) mod mock {
    //! Scripted in-memory transports

    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    use super::*;

    /// Replays a script on `recv`, then pends forever
    pub struct MockTransport {
        script: VecDeque<Result<Incoming, ChannelError>>,
        sent: Arc<Mutex<Vec<String>>>,
        closed: Arc<Mutex<Option<u16>>>,
    }

    /// Handles for inspecting a [`MockTransport`] after it was handed off
    #[derive(Clone, Default)]
    pub struct MockWire {
        pub sent: Arc<Mutex<Vec<String>>>,
        pub closed: Arc<Mutex<Option<u16>>>,
    }

    impl MockWire {
        pub fn sent(&self) -> Vec<String> {
            self.sent.lock().unwrap().clone()
        }

        pub fn closed_with(&self) -> Option<u16> {
            *self.closed.lock().unwrap()
        }
    }

    impl MockTransport {
        pub fn new(script: Vec<Result<Incoming, ChannelError>>) -> (Self, MockWire) {
            let wire = MockWire::default();
            let transport = Self {
                script: script.into(),
                sent: Arc::clone(&wire.sent),
                closed: Arc::clone(&wire.closed),
            };
            (transport, wire)
        }

        /// Script of server text frames
        pub fn with_texts<I, S>(texts: I) -> (Self, MockWire)
        where
            I: IntoIterator<Item = S>,
            S: Into<String>,
        {
            Self::new(texts.into_iter().map(|t| Ok(Incoming::Text(t.into()))).collect())
        }
    }

    #[async_trait]
    impl Transport for MockTransport {
        async fn send(&mut self, text: String) -> Result<(), ChannelError> {
            self.sent.lock().unwrap().push(text);
            Ok(())
        }

        async fn recv(&mut self) -> Result<Incoming, ChannelError> {
            match self.script.pop_front() {
                Some(item) => item,
                None => std::future::pending().await,
            }
        }

        async fn close(&mut self, code: u16) -> Result<(), ChannelError> {
            *self.closed.lock().unwrap() = Some(code);
            Ok(())
        }
    }

    /// Hands out queued transports in order and records the requested URLs
    #[derive(Clone, Default)]
    pub struct MockConnector {
        transports: Arc<Mutex<VecDeque<MockTransport>>>,
        pub urls: Arc<Mutex<Vec<String>>>,
    }

    impl MockConnector {
        pub fn new(transports: Vec<MockTransport>) -> Self {
            Self {
                transports: Arc::new(Mutex::new(transports.into())),
                urls: Arc::default(),
            }
        }

        pub fn urls(&self) -> Vec<String> {
            self.urls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Connector for MockConnector {
        async fn connect(&self, url: &str) -> Result<Box<dyn Transport>, ChannelError> {
            self.urls.lock().unwrap().push(url.to_string());
            let next = self.transports.lock().unwrap().pop_front();
            match next {
                Some(transport) => Ok(Box::new(transport)),
                None => Err(ChannelError::Connect {
                    url: url.to_string(),
                    reason: "connection refused".to_string(),
                }),
            }
        }
    }
}
