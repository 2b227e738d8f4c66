//! JSON wire frames exchanged over the chat WebSocket.
//!
//! Client frames look like `{"event": "...", "id": 7, "data": {...}}`. The
//! optional `id` asks for an acknowledgement, which comes back as
//! `{"event": "ack", "id": 7, "data": {...}}`. Room pushes carry no id.
//!
//! Payload fields are parsed leniently: a missing or ill-typed field becomes
//! `None` so the handler can answer with the proper error instead of the
//! frame being dropped.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ids::positive_id;

use super::error::RelayError;

/// `join_booking` payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinBooking {
    pub booking_id: Option<i64>,
    pub token: Option<String>,
}

/// `message` payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendMessage {
    pub booking_id: Option<i64>,
    /// `None` when absent or not a string.
    pub text: Option<String>,
    pub token: Option<String>,
}

/// `mark_delivered` / `mark_read` payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceiptBatch {
    pub booking_id: Option<i64>,
    /// Positive ids, deduplicated in first-seen order.
    pub message_ids: Vec<i64>,
    pub token: Option<String>,
}

/// `typing` / `typing_stop` payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypingSignal {
    pub booking_id: Option<i64>,
    pub token: Option<String>,
}

/// Every event a client may send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientEvent {
    JoinBooking(JoinBooking),
    SendMessage(SendMessage),
    MarkDelivered(ReceiptBatch),
    MarkRead(ReceiptBatch),
    Typing(TypingSignal),
    TypingStop(TypingSignal),
}

impl ClientEvent {
    pub const fn name(&self) -> &'static str {
        match self {
            Self::JoinBooking(_) => "join_booking",
            Self::SendMessage(_) => "message",
            Self::MarkDelivered(_) => "mark_delivered",
            Self::MarkRead(_) => "mark_read",
            Self::Typing(_) => "typing",
            Self::TypingStop(_) => "typing_stop",
        }
    }
}

/// A decoded client frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    /// Acknowledgement id, if the client wants a reply.
    pub id: Option<u64>,
    pub event: ClientEvent,
}

/// Why a text frame could not be turned into a [`Request`].
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("frame is not a JSON event envelope: {0}")]
    NotAFrame(#[from] serde_json::Error),

    #[error("unknown event {name:?}")]
    UnknownEvent { id: Option<u64>, name: String },
}

#[derive(Deserialize)]
struct Envelope {
    event: String,
    #[serde(default)]
    id: Option<u64>,
    #[serde(default)]
    data: Value,
}

#[derive(Default, Deserialize)]
struct RawPayload {
    #[serde(rename = "bookingId", alias = "booking_id")]
    booking_id: Option<Value>,
    token: Option<Value>,
    text: Option<Value>,
    message_ids: Option<Value>,
}

impl RawPayload {
    fn booking_id(&self) -> Option<i64> {
        self.booking_id.as_ref().and_then(positive_id)
    }

    fn token(&self) -> Option<String> {
        match &self.token {
            Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
            _ => None,
        }
    }

    fn text(&self) -> Option<String> {
        match &self.text {
            Some(Value::String(s)) => Some(s.clone()),
            _ => None,
        }
    }

    fn message_ids(&self) -> Vec<i64> {
        match &self.message_ids {
            Some(Value::Array(items)) => normalize_message_ids(items),
            _ => Vec::new(),
        }
    }
}

/// Keep positive integer ids (numbers or numeric strings), first occurrence
/// wins.
pub fn normalize_message_ids(items: &[Value]) -> Vec<i64> {
    let mut seen = HashSet::new();
    items
        .iter()
        .filter_map(positive_id)
        .filter(|id| seen.insert(*id))
        .collect()
}

/// Decode one text frame.
pub fn decode(text: &str) -> Result<Request, DecodeError> {
    let envelope: Envelope = serde_json::from_str(text)?;
    // A non-object `data` is treated as an empty payload.
    let raw: RawPayload = serde_json::from_value(envelope.data).unwrap_or_default();

    let event = match envelope.event.as_str() {
        "join_booking" => ClientEvent::JoinBooking(JoinBooking {
            booking_id: raw.booking_id(),
            token: raw.token(),
        }),
        "message" => ClientEvent::SendMessage(SendMessage {
            booking_id: raw.booking_id(),
            text: raw.text(),
            token: raw.token(),
        }),
        "mark_delivered" | "mark_read" => {
            let batch = ReceiptBatch {
                booking_id: raw.booking_id(),
                message_ids: raw.message_ids(),
                token: raw.token(),
            };
            if envelope.event == "mark_read" {
                ClientEvent::MarkRead(batch)
            } else {
                ClientEvent::MarkDelivered(batch)
            }
        }
        "typing" | "typing_stop" => {
            let signal = TypingSignal {
                booking_id: raw.booking_id(),
                token: raw.token(),
            };
            if envelope.event == "typing" {
                ClientEvent::Typing(signal)
            } else {
                ClientEvent::TypingStop(signal)
            }
        }
        _ => {
            return Err(DecodeError::UnknownEvent {
                id: envelope.id,
                name: envelope.event,
            });
        }
    };

    Ok(Request {
        id: envelope.id,
        event,
    })
}

/// Direct reply to a request-style event.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Ack {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<Value>,
}

impl Ack {
    pub const fn ok() -> Self {
        Self {
            ok: true,
            error: None,
            message: None,
        }
    }

    pub const fn with_message(message: Value) -> Self {
        Self {
            ok: true,
            error: None,
            message: Some(message),
        }
    }

    pub fn error(err: &RelayError) -> Self {
        Self {
            ok: false,
            error: Some(err.to_string()),
            message: None,
        }
    }
}

impl From<Result<(), RelayError>> for Ack {
    fn from(result: Result<(), RelayError>) -> Self {
        match result {
            Ok(()) => Self::ok(),
            Err(e) => Self::error(&e),
        }
    }
}

#[derive(Serialize)]
struct AckFrame<'a> {
    event: &'static str,
    id: u64,
    data: &'a Ack,
}

/// Serialize an acknowledgement for request `id`.
pub fn encode_ack(id: u64, ack: &Ack) -> serde_json::Result<String> {
    serde_json::to_string(&AckFrame {
        event: "ack",
        id,
        data: ack,
    })
}

/// Events pushed to room members.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ServerEvent {
    /// Canonical record returned by the persistence gateway, echoed verbatim.
    Message(Value),
    MessageDelivered { message_ids: Vec<i64> },
    MessageRead { message_ids: Vec<i64> },
    Typing { user_id: i64 },
    TypingStop { user_id: i64 },
}

impl ServerEvent {
    pub fn encode(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}
