//! Room channel wire protocol.
//!
//! Outbound frames are the raw serialized document as a text frame. Inbound
//! frames are JSON objects discriminated by `type`:
//!
//! ```text
//! {"type":"presence","users":[{"username":"ada","user_id":"…"}]}
//! {"type":"content","data":"<p>…</p>","edited_by":"ada"}
//! {"type":"role","role":"editor"}
//! {"type":"error","message":"Viewers cannot edit the document"}
//! ```
//!
//! Every frame is classified exactly once, by [`Inbound::decode`]. A frame that
//! is not JSON at all is taken to be raw content, which older servers send.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::access::RoomRole;

/// A room participant as reported by the presence broadcast.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    pub username: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<RoomRole>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_online: Option<bool>,
}

impl Participant {
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            user_id: None,
            role: None,
            is_online: None,
        }
    }
}

/// A classified inbound frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    Presence(Vec<Participant>),
    Content {
        data: String,
        edited_by: Option<String>,
    },
    Role(RoomRole),
    Error(String),
    /// Well-formed JSON with a type we don't handle. Carries the type tag
    /// (empty when absent).
    Unknown(String),
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum Frame {
    Presence {
        #[serde(default)]
        users: Vec<Participant>,
    },
    Content {
        data: String,
        #[serde(default)]
        edited_by: Option<String>,
    },
    Role {
        role: RoomRole,
    },
    Error {
        #[serde(default)]
        message: String,
    },
}

impl From<Frame> for Inbound {
    fn from(frame: Frame) -> Self {
        match frame {
            Frame::Presence { users } => Inbound::Presence(users),
            Frame::Content { data, edited_by } => Inbound::Content { data, edited_by },
            Frame::Role { role } => Inbound::Role(role),
            Frame::Error { message } => Inbound::Error(message),
        }
    }
}

impl Inbound {
    /// Classify a text frame.
    ///
    /// Non-JSON text is raw content. JSON that names a known type but does not
    /// fit its shape is a protocol error; JSON with any other type is
    /// [`Inbound::Unknown`].
    pub fn decode(text: &str) -> Result<Self, ProtocolError> {
        let value: serde_json::Value = match serde_json::from_str(text) {
            Ok(value) => value,
            Err(_) => {
                return Ok(Inbound::Content {
                    data: text.to_string(),
                    edited_by: None,
                })
            }
        };

        let tag = match value.get("type").and_then(|t| t.as_str()) {
            Some(tag @ ("presence" | "content" | "role" | "error")) => tag.to_string(),
            Some(other) => return Ok(Inbound::Unknown(other.to_string())),
            None => return Ok(Inbound::Unknown(String::new())),
        };

        serde_json::from_value::<Frame>(value)
            .map(Inbound::from)
            .map_err(|e| ProtocolError::Malformed {
                kind: tag,
                reason: e.to_string(),
            })
    }

    /// Short name used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Inbound::Presence(_) => "presence",
            Inbound::Content { .. } => "content",
            Inbound::Role(_) => "role",
            Inbound::Error(_) => "error",
            Inbound::Unknown(_) => "unknown",
        }
    }
}

/// Encode an outbound document update. The server expects the bare
/// serialized content, not an envelope.
pub fn encode_content(serialized: &str) -> String {
    serialized.to_string()
}

/// Protocol errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("malformed {kind} frame: {reason}")]
    Malformed { kind: String, reason: String },
    #[error("binary frames are not part of the room protocol")]
    UnexpectedBinary,
}
