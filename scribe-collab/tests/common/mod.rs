//! In-process room server for integration tests.
//!
//! Speaks the room protocol the way the production backend does:
//! - `/ws/{room}?token=…`, unknown tokens refused either at the handshake
//!   (HTTP 403) or by a policy close (1008) right after it
//! - on join: current content (if any), then the user's role, then a
//!   presence broadcast to the whole room
//! - editor frames are stored and relayed to everyone else with `edited_by`
//! - viewer frames get an error reply and go nowhere

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use scribe_collab::access::RoomRole;
use serde_json::json;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;

/// How the server turns away an unknown token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Refusal {
    Handshake,
    PolicyClose,
}

#[derive(Debug, Clone)]
struct Outgoing {
    exclude: Option<u64>,
    text: String,
}

struct Room {
    content: String,
    tx: broadcast::Sender<Outgoing>,
    members: Vec<(u64, String)>,
}

impl Room {
    fn new() -> Self {
        let (tx, _) = broadcast::channel(64);
        Self {
            content: String::new(),
            tx,
            members: Vec::new(),
        }
    }

    fn presence(&self) -> Outgoing {
        let users: Vec<_> = self
            .members
            .iter()
            .map(|(id, name)| json!({"user_id": id.to_string(), "username": name}))
            .collect();
        Outgoing {
            exclude: None,
            text: json!({"type": "presence", "users": users}).to_string(),
        }
    }
}

struct ServerState {
    users: HashMap<String, (String, RoomRole)>,
    refusal: Refusal,
    rooms: Mutex<HashMap<String, Room>>,
    received: Mutex<Vec<(String, String)>>,
    next_conn: AtomicU64,
}

pub struct RoomServerBuilder {
    users: HashMap<String, (String, RoomRole)>,
    refusal: Refusal,
    contents: Vec<(String, String)>,
}

impl RoomServerBuilder {
    pub fn user(mut self, token: &str, username: &str, role: RoomRole) -> Self {
        self.users.insert(token.to_string(), (username.to_string(), role));
        self
    }

    pub fn refusal(mut self, refusal: Refusal) -> Self {
        self.refusal = refusal;
        self
    }

    pub fn content(mut self, room: &str, content: &str) -> Self {
        self.contents.push((room.to_string(), content.to_string()));
        self
    }

    pub async fn start(self) -> RoomServer {
        let mut rooms = HashMap::new();
        for (name, content) in self.contents {
            let mut room = Room::new();
            room.content = content;
            rooms.insert(name, room);
        }
        let state = Arc::new(ServerState {
            users: self.users,
            refusal: self.refusal,
            rooms: Mutex::new(rooms),
            received: Mutex::new(Vec::new()),
            next_conn: AtomicU64::new(1),
        });

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let accept_state = state.clone();
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                tokio::spawn(handle_connection(stream, accept_state.clone()));
            }
        });

        RoomServer { port, state }
    }
}

pub struct RoomServer {
    pub port: u16,
    state: Arc<ServerState>,
}

impl RoomServer {
    pub fn builder() -> RoomServerBuilder {
        RoomServerBuilder {
            users: HashMap::new(),
            refusal: Refusal::PolicyClose,
            contents: Vec::new(),
        }
    }

    pub fn url(&self) -> String {
        format!("ws://127.0.0.1:{}", self.port)
    }

    /// Frames accepted from writers, as `(username, content)`.
    pub fn received(&self) -> Vec<(String, String)> {
        self.state.received.lock().unwrap().clone()
    }

    pub fn content(&self, room: &str) -> Option<String> {
        self.state
            .rooms
            .lock()
            .unwrap()
            .get(room)
            .map(|r| r.content.clone())
    }

    pub fn members(&self, room: &str) -> Vec<String> {
        self.state
            .rooms
            .lock()
            .unwrap()
            .get(room)
            .map(|r| r.members.iter().map(|(_, n)| n.clone()).collect())
            .unwrap_or_default()
    }

    /// Store and broadcast content as if another writer had sent it.
    pub fn push_content(&self, room: &str, data: &str, edited_by: &str) {
        let mut rooms = self.state.rooms.lock().unwrap();
        let room = rooms.entry(room.to_string()).or_insert_with(Room::new);
        room.content = data.to_string();
        let _ = room.tx.send(Outgoing {
            exclude: None,
            text: json!({"type": "content", "data": data, "edited_by": edited_by}).to_string(),
        });
    }

    /// Broadcast a raw text frame to the room.
    pub fn push_raw(&self, room: &str, text: &str) {
        let rooms = self.state.rooms.lock().unwrap();
        if let Some(room) = rooms.get(room) {
            let _ = room.tx.send(Outgoing {
                exclude: None,
                text: text.to_string(),
            });
        }
    }

    /// Wait until at least `n` frames were received.
    pub async fn wait_received(&self, n: usize) -> Vec<(String, String)> {
        for _ in 0..200 {
            let received = self.received();
            if received.len() >= n {
                return received;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        self.received()
    }
}

fn parse_target(req: &Request) -> Option<(String, String)> {
    let url = url::Url::parse(&format!("ws://localhost{}", req.uri())).ok()?;
    let mut segments = url.path_segments()?;
    if segments.next()? != "ws" {
        return None;
    }
    let room = segments.collect::<Vec<_>>().join("/");
    let token = url
        .query_pairs()
        .find(|(k, _)| k == "token")
        .map(|(_, v)| v.into_owned())?;
    Some((room, token))
}

async fn handle_connection(stream: TcpStream, state: Arc<ServerState>) {
    let mut target = None;
    let refuse_at_handshake = state.refusal == Refusal::Handshake;
    let users = &state.users;
    let callback = |req: &Request, resp: Response| -> Result<Response, ErrorResponse> {
        target = parse_target(req);
        let known = target
            .as_ref()
            .is_some_and(|(_, token)| users.contains_key(token));
        if !known && refuse_at_handshake {
            let mut refused = ErrorResponse::new(Some("forbidden".to_string()));
            *refused.status_mut() = StatusCode::FORBIDDEN;
            return Err(refused);
        }
        Ok(resp)
    };
    let Ok(ws) = tokio_tungstenite::accept_hdr_async(stream, callback).await else {
        return;
    };
    let (mut write, mut read) = ws.split();

    let Some((room_name, (username, role))) = target.and_then(|(room, token)| {
        state.users.get(&token).cloned().map(|user| (room, user))
    }) else {
        let _ = write
            .send(Message::Close(Some(CloseFrame {
                code: CloseCode::Policy,
                reason: "Invalid or expired token".into(),
            })))
            .await;
        return;
    };

    let conn_id = state.next_conn.fetch_add(1, Ordering::SeqCst);
    let (mut rx, initial, tx) = {
        let mut rooms = state.rooms.lock().unwrap();
        let room = rooms.entry(room_name.clone()).or_insert_with(Room::new);
        room.members.push((conn_id, username.clone()));
        (room.tx.subscribe(), room.content.clone(), room.tx.clone())
    };

    if !initial.is_empty() {
        let frame = json!({"type": "content", "data": initial}).to_string();
        let _ = write.send(Message::Text(frame.into())).await;
    }
    let frame = json!({"type": "role", "role": role}).to_string();
    let _ = write.send(Message::Text(frame.into())).await;
    {
        let rooms = state.rooms.lock().unwrap();
        if let Some(room) = rooms.get(&room_name) {
            let _ = tx.send(room.presence());
        }
    }

    loop {
        tokio::select! {
            frame = read.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    if role == RoomRole::Viewer {
                        let frame = json!({
                            "type": "error",
                            "message": "Viewers cannot edit the document"
                        })
                        .to_string();
                        let _ = write.send(Message::Text(frame.into())).await;
                        continue;
                    }
                    let data = text.as_str().to_string();
                    state
                        .received
                        .lock()
                        .unwrap()
                        .push((username.clone(), data.clone()));
                    let mut rooms = state.rooms.lock().unwrap();
                    if let Some(room) = rooms.get_mut(&room_name) {
                        room.content = data.clone();
                    }
                    let _ = tx.send(Outgoing {
                        exclude: Some(conn_id),
                        text: json!({"type": "content", "data": data, "edited_by": username})
                            .to_string(),
                    });
                }
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                _ => {}
            },
            out = rx.recv() => match out {
                Ok(out) if out.exclude != Some(conn_id) => {
                    if write.send(Message::Text(out.text.into())).await.is_err() {
                        break;
                    }
                }
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => {}
                Err(broadcast::error::RecvError::Closed) => break,
            },
        }
    }

    let mut rooms = state.rooms.lock().unwrap();
    if let Some(room) = rooms.get_mut(&room_name) {
        room.members.retain(|(id, _)| *id != conn_id);
        let _ = room.tx.send(room.presence());
    }
}
