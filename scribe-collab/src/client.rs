//! WebSocket session channel to a room.
//!
//! Provides:
//! - Connection lifecycle (connect, disconnect, reconnect to another room)
//! - Outbound content frames, dropped unless the channel is open
//! - Inbound frames classified once into [`Inbound`]
//! - Rejection detection (policy close or handshake refusal)
//!
//! ```text
//!  Idle ──connect──► Connecting ──ok──► Open ──close/err──► Closed
//!                        │                │
//!                   401/403              1008
//!                        ▼                ▼
//!                     Rejected ──disconnect──► Closed
//! ```
//!
//! Each `connect` bumps a generation counter. Events are stamped with the
//! generation of the connection that produced them, so the owner can discard
//! anything a torn-down connection still had in flight.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use thiserror::Error;
use tokio::sync::{mpsc, RwLock};
use tokio::task::AbortHandle;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use url::Url;

use crate::protocol::{self, Inbound};

/// Channel configuration.
#[derive(Debug, Clone)]
pub struct ChannelConfig {
    /// Base server URL, e.g. `ws://127.0.0.1:8000`
    pub server_url: String,
    /// Capacity of the event channel towards the owner
    pub event_capacity: usize,
    /// Capacity of the outbound frame queue
    pub outbound_capacity: usize,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            server_url: "ws://127.0.0.1:8000".to_string(),
            event_capacity: 256,
            outbound_capacity: 64,
        }
    }
}

/// Connection status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    Idle,
    Connecting,
    Open,
    Closed,
    /// The server refused the credential or room access.
    Rejected,
}

/// What the channel reports to its owner.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    Opened,
    Message(Inbound),
    /// Policy close. The credential should be considered invalid.
    Rejected { reason: String },
    /// The connection ended for any other reason.
    Closed,
}

/// A [`SessionEvent`] stamped with the connection generation.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelEvent {
    pub generation: u64,
    pub event: SessionEvent,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChannelError {
    #[error("invalid server url: {0}")]
    InvalidUrl(#[from] url::ParseError),
    #[error("server url cannot carry a path: {0}")]
    UnsupportedUrl(String),
    #[error("connection failed: {0}")]
    Connect(String),
    #[error("rejected by server: {reason}")]
    Rejected { reason: String },
    #[error("connection closed")]
    Closed,
}

/// The session channel.
///
/// Owns at most one live connection. The owner takes the event receiver once
/// and polls it from its loop.
pub struct SessionChannel {
    config: ChannelConfig,

    /// Connection status, shared with the reader task
    status: Arc<RwLock<ConnectionStatus>>,

    /// Generation of the live connection
    generation: Arc<AtomicU64>,

    /// Room of the live or last connection
    room: Option<String>,

    /// Outbound frames to the writer task
    outgoing_tx: Option<mpsc::Sender<Message>>,

    reader: Option<AbortHandle>,

    event_tx: mpsc::Sender<ChannelEvent>,
    event_rx: Option<mpsc::Receiver<ChannelEvent>>,
}

impl SessionChannel {
    pub fn new(config: ChannelConfig) -> Self {
        let (event_tx, event_rx) = mpsc::channel(config.event_capacity);
        Self {
            config,
            status: Arc::new(RwLock::new(ConnectionStatus::Idle)),
            generation: Arc::new(AtomicU64::new(0)),
            room: None,
            outgoing_tx: None,
            reader: None,
            event_tx,
            event_rx: Some(event_rx),
        }
    }

    /// Take the event receiver (can only be called once).
    pub fn take_event_rx(&mut self) -> Option<mpsc::Receiver<ChannelEvent>> {
        self.event_rx.take()
    }

    pub async fn status(&self) -> ConnectionStatus {
        *self.status.read().await
    }

    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// Whether `event` came from the live connection.
    pub fn is_current(&self, event: &ChannelEvent) -> bool {
        event.generation == self.generation()
    }

    pub fn room(&self) -> Option<&str> {
        self.room.as_deref()
    }

    pub fn server_url(&self) -> &str {
        &self.config.server_url
    }

    /// Build `{server}/ws/{room}?token={credential}`.
    pub fn room_url(&self, room: &str, credential: &str) -> Result<Url, ChannelError> {
        let mut url = Url::parse(&self.config.server_url)?;
        url.path_segments_mut()
            .map_err(|_| ChannelError::UnsupportedUrl(self.config.server_url.clone()))?
            .pop_if_empty()
            .push("ws")
            .push(room);
        url.query_pairs_mut().clear().append_pair("token", credential);
        Ok(url)
    }

    /// Connect to `room`, tearing down any existing connection first.
    ///
    /// A handshake refused with 401 or 403 leaves the channel `Rejected` and
    /// returns [`ChannelError::Rejected`].
    pub async fn connect(&mut self, room: &str, credential: &str) -> Result<(), ChannelError> {
        self.disconnect().await;

        let url = self.room_url(room, credential)?;
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.room = Some(room.to_string());
        *self.status.write().await = ConnectionStatus::Connecting;
        log::info!("connecting to room '{}'", room);

        let ws_stream = match tokio_tungstenite::connect_async(url.as_str()).await {
            Ok((ws_stream, _)) => ws_stream,
            Err(WsError::Http(response))
                if matches!(response.status().as_u16(), 401 | 403) =>
            {
                let reason = format!("handshake refused with {}", response.status());
                log::warn!("room '{}' rejected: {}", room, reason);
                *self.status.write().await = ConnectionStatus::Rejected;
                return Err(ChannelError::Rejected { reason });
            }
            Err(e) => {
                log::warn!("connect to room '{}' failed: {}", room, e);
                *self.status.write().await = ConnectionStatus::Closed;
                return Err(ChannelError::Connect(e.to_string()));
            }
        };

        let (mut ws_writer, mut ws_reader) = ws_stream.split();

        // Writer task: forward outbound frames, close the socket when the
        // sender side is dropped.
        let (out_tx, mut out_rx) = mpsc::channel::<Message>(self.config.outbound_capacity);
        self.outgoing_tx = Some(out_tx);
        tokio::spawn(async move {
            while let Some(frame) = out_rx.recv().await {
                if ws_writer.send(frame).await.is_err() {
                    break;
                }
            }
            let _ = ws_writer.close().await;
        });

        *self.status.write().await = ConnectionStatus::Open;
        let _ = self
            .event_tx
            .send(ChannelEvent {
                generation,
                event: SessionEvent::Opened,
            })
            .await;

        // Reader task: classify inbound frames
        let event_tx = self.event_tx.clone();
        let status = self.status.clone();
        let current = self.generation.clone();
        let reader = tokio::spawn(async move {
            let emit = |event: SessionEvent| {
                let event_tx = event_tx.clone();
                let live = current.load(Ordering::SeqCst) == generation;
                async move {
                    if live {
                        let _ = event_tx.send(ChannelEvent { generation, event }).await;
                    }
                }
            };

            let mut ending = SessionEvent::Closed;
            while let Some(frame) = ws_reader.next().await {
                match frame {
                    Ok(Message::Text(text)) => match Inbound::decode(text.as_str()) {
                        Ok(inbound) => {
                            log::trace!("inbound {} frame", inbound.kind());
                            emit(SessionEvent::Message(inbound)).await;
                        }
                        Err(e) => log::warn!("dropping frame: {}", e),
                    },
                    Ok(Message::Binary(_)) => {
                        log::warn!("dropping frame: {}", protocol::ProtocolError::UnexpectedBinary)
                    }
                    Ok(Message::Close(Some(close))) if close.code == CloseCode::Policy => {
                        ending = SessionEvent::Rejected {
                            reason: close.reason.as_str().to_string(),
                        };
                        break;
                    }
                    Ok(Message::Close(_)) | Err(_) => break,
                    _ => {}
                }
            }

            if current.load(Ordering::SeqCst) == generation {
                *status.write().await = match ending {
                    SessionEvent::Rejected { .. } => ConnectionStatus::Rejected,
                    _ => ConnectionStatus::Closed,
                };
                log::info!("connection ended: {:?}", ending);
            }
            emit(ending).await;
        });
        self.reader = Some(reader.abort_handle());

        Ok(())
    }

    /// Send serialized content. Returns `Ok(false)` without sending unless the
    /// channel is open.
    pub async fn send(&self, content: &str) -> Result<bool, ChannelError> {
        if *self.status.read().await != ConnectionStatus::Open {
            log::debug!("channel not open, dropping outbound content");
            return Ok(false);
        }
        let Some(tx) = &self.outgoing_tx else {
            return Ok(false);
        };
        tx.send(Message::Text(protocol::encode_content(content).into()))
            .await
            .map_err(|_| ChannelError::Closed)?;
        Ok(true)
    }

    /// Close the live connection, if any. Safe to call repeatedly.
    pub async fn disconnect(&mut self) {
        let had_connection = self.outgoing_tx.is_some() || self.reader.is_some();
        // Retire the generation first so the reader reports nothing further.
        if had_connection {
            self.generation.fetch_add(1, Ordering::SeqCst);
        }
        // Dropping the sender lets the writer flush and send a close frame.
        self.outgoing_tx = None;
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }

        let mut status = self.status.write().await;
        if *status != ConnectionStatus::Idle && *status != ConnectionStatus::Closed {
            log::info!("disconnected from room {:?}", self.room);
            *status = ConnectionStatus::Closed;
        }
    }
}

impl Drop for SessionChannel {
    fn drop(&mut self) {
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
    }
}
