//! Typed chat events exchanged with the relay.
//!
//! | Direction | Event      | Payload                                  |
//! |-----------|------------|------------------------------------------|
//! | inbound   | `connect`  | none; the connection id comes from the transport |
//! | inbound   | `welcome`  | any JSON, informational                  |
//! | inbound   | `recmsg`   | `{ msg, username, socketId }`            |
//! | outbound  | `joinroom` | room name string                         |
//! | outbound  | `message`  | `{ msg, room, username, socketId }`      |

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::ConnectionId;

/// Transport-level connection acknowledgement.
pub const EVENT_CONNECT: &str = "connect";
/// Transport-level connection loss.
pub const EVENT_DISCONNECT: &str = "disconnect";
/// Informational greeting from the relay.
pub const EVENT_WELCOME: &str = "welcome";
/// A message relayed from a room occupant.
pub const EVENT_RECMSG: &str = "recmsg";
/// Request to join (or create) a room.
pub const EVENT_JOINROOM: &str = "joinroom";
/// Publish a message to the current room.
pub const EVENT_MESSAGE: &str = "message";

/// Payload of an inbound `recmsg` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelayedMessage {
    /// Message text.
    pub msg: String,
    /// Display name of the sender.
    #[serde(default)]
    pub username: String,
    /// Connection id of the sender, when the sender knew it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub socket_id: Option<ConnectionId>,
}

/// Payload of an outbound `message` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutgoingMessage {
    /// Trimmed message text.
    pub msg: String,
    /// Room the message is published to.
    pub room: String,
    /// Display name of the sender.
    pub username: String,
    /// Sender connection id; omitted while the id is still unknown.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub socket_id: Option<ConnectionId>,
}

/// Why the connection to the relay went away.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisconnectReason {
    /// The owner called `disconnect()`.
    ClientRequested,
    /// The relay closed the socket or the namespace.
    ServerClosed,
    /// No packet arrived within `pingInterval + pingTimeout`.
    PingTimeout,
    /// The relay refused the namespace connection.
    ConnectRejected(String),
    /// The WebSocket could not be established.
    ConnectFailed(String),
    /// The WebSocket failed mid-session.
    TransportError(String),
    /// The relay broke the handshake contract.
    ProtocolViolation(String),
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ClientRequested => f.write_str("client requested"),
            Self::ServerClosed => f.write_str("server closed"),
            Self::PingTimeout => f.write_str("ping timeout"),
            Self::ConnectRejected(why) => write!(f, "connect rejected: {why}"),
            Self::ConnectFailed(why) => write!(f, "connect failed: {why}"),
            Self::TransportError(why) => write!(f, "transport error: {why}"),
            Self::ProtocolViolation(why) => write!(f, "protocol violation: {why}"),
        }
    }
}

/// An event received from the relay, decoded into its chat meaning.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundEvent {
    /// Namespace connection established with the given id.
    Connect(ConnectionId),
    /// Connection lost or closed.
    Disconnect(DisconnectReason),
    /// Greeting from the relay.
    Welcome(Value),
    /// A message for the feed.
    RecMsg(RelayedMessage),
    /// Any other named event, kept so registered handlers still see it.
    Other {
        /// Event name.
        name: String,
        /// First event argument, or JSON null.
        payload: Value,
    },
}

impl InboundEvent {
    /// Maps a named Socket.IO event to its typed form.
    ///
    /// A `recmsg` whose payload does not match [`RelayedMessage`] is logged
    /// and kept as [`InboundEvent::Other`] so it never reaches the feed.
    #[must_use]
    pub fn from_wire(name: String, payload: Value) -> Self {
        match name.as_str() {
            EVENT_WELCOME => Self::Welcome(payload),
            EVENT_RECMSG => match serde_json::from_value::<RelayedMessage>(payload.clone()) {
                Ok(message) => Self::RecMsg(message),
                Err(err) => {
                    tracing::warn!(error = %err, "dropping malformed recmsg payload");
                    Self::Other { name, payload }
                }
            },
            _ => Self::Other { name, payload },
        }
    }

    /// Returns the event name handlers are registered under.
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Connect(_) => EVENT_CONNECT,
            Self::Disconnect(_) => EVENT_DISCONNECT,
            Self::Welcome(_) => EVENT_WELCOME,
            Self::RecMsg(_) => EVENT_RECMSG,
            Self::Other { name, .. } => name,
        }
    }

    /// Returns the JSON payload handed to registered handlers.
    #[must_use]
    pub fn payload(&self) -> Value {
        match self {
            Self::Connect(_) => Value::Null,
            Self::Disconnect(reason) => Value::String(reason.to_string()),
            Self::Welcome(data) => data.clone(),
            Self::RecMsg(message) => serde_json::to_value(message).unwrap_or_default(),
            Self::Other { payload, .. } => payload.clone(),
        }
    }
}

/// An event the client publishes to the relay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundEvent {
    /// `joinroom` with the trimmed room name.
    JoinRoom(String),
    /// `message` for the current room.
    Message(OutgoingMessage),
}

impl OutboundEvent {
    /// Returns the wire event name.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::JoinRoom(_) => EVENT_JOINROOM,
            Self::Message(_) => EVENT_MESSAGE,
        }
    }

    /// Returns the wire payload.
    ///
    /// # Errors
    ///
    /// Propagates serialization failures.
    pub fn payload(&self) -> Result<Value, serde_json::Error> {
        match self {
            Self::JoinRoom(room) => Ok(Value::String(room.clone())),
            Self::Message(message) => serde_json::to_value(message),
        }
    }
}
