use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use orchestrator::TestResult;
use tracing::{debug, error, info, warn};

use crate::protocol::{parse_request, ServerMessage};
use crate::service::RequestHandler;

/// What the connection loop cares about in an inbound frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Text(String),
    Close,
    /// Pings, pongs and binary frames.
    Other,
}

#[async_trait]
pub trait Transport: Send {
    /// `None` once the peer is gone.
    async fn recv(&mut self) -> Option<Frame>;
    async fn send(&mut self, text: String) -> anyhow::Result<()>;
}

pub struct WsTransport {
    socket: WebSocket,
}

impl WsTransport {
    pub fn new(socket: WebSocket) -> Self {
        Self { socket }
    }
}

#[async_trait]
impl Transport for WsTransport {
    async fn recv(&mut self) -> Option<Frame> {
        match self.socket.next().await? {
            Ok(Message::Text(text)) => Some(Frame::Text(text)),
            Ok(Message::Close(_)) => Some(Frame::Close),
            Ok(_) => Some(Frame::Other),
            Err(err) => {
                debug!(error = %err, "websocket read failed");
                None
            }
        }
    }

    async fn send(&mut self, text: String) -> anyhow::Result<()> {
        self.socket.send(Message::Text(text)).await?;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Idle,
    Running,
    Closed,
}

/// One client connection. Requests are handled strictly one at a time, in
/// arrival order, and each gets exactly one reply.
pub struct Connection<T> {
    id: String,
    transport: T,
    handler: Arc<dyn RequestHandler>,
    state: ConnectionState,
    results: Vec<TestResult>,
}

impl<T: Transport> Connection<T> {
    pub fn new(id: impl Into<String>, transport: T, handler: Arc<dyn RequestHandler>) -> Self {
        Self {
            id: id.into(),
            transport,
            handler,
            state: ConnectionState::Idle,
            results: Vec::new(),
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Results produced on this connection, delivered or not.
    pub fn results(&self) -> &[TestResult] {
        &self.results
    }

    pub async fn run(&mut self) {
        info!(connection = %self.id, "connection opened");

        while let Some(frame) = self.transport.recv().await {
            let text = match frame {
                Frame::Text(text) => text,
                Frame::Close => break,
                Frame::Other => continue,
            };

            self.state = ConnectionState::Running;
            let reply = match parse_request(&text) {
                Ok(request) => self.handler.handle(request).await,
                Err(message) => {
                    warn!(connection = %self.id, %message, "malformed request");
                    ServerMessage::error(message)
                }
            };

            if let ServerMessage::TestResults { result, .. } = &reply {
                self.results.push(result.clone());
            }

            let payload = match serde_json::to_string(&reply) {
                Ok(payload) => payload,
                Err(err) => {
                    error!(connection = %self.id, error = %err, "failed to encode reply");
                    self.state = ConnectionState::Idle;
                    continue;
                }
            };

            if let Err(err) = self.transport.send(payload).await {
                warn!(connection = %self.id, error = %err, "client went away, discarding reply");
                break;
            }
            self.state = ConnectionState::Idle;
        }

        self.state = ConnectionState::Closed;
        info!(connection = %self.id, results = self.results.len(), "connection closed");
    }
}
