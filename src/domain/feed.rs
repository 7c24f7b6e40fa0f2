//! Ordered message log and render-time classification.
//!
//! [`Feed`] is append-only and holds messages as plain data. Whether a
//! message is drawn as "mine" or "theirs" is never stored; [`classify`]
//! derives it from the message origin and the [`SessionIdentity`] passed in
//! at render time.

use super::admission::RoomMembership;
use super::identity::{ConnectionId, SessionIdentity};
use crate::protocol::{OutboundEvent, OutgoingMessage, RelayedMessage};
use crate::transport::EventSink;

/// A chat message as stored in the feed. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    text: String,
    display_name: String,
    origin_connection_id: Option<ConnectionId>,
    room_id: Option<String>,
}

impl Message {
    /// Message text.
    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Display name of the author.
    #[must_use]
    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    /// Connection id of the author, if it was known when the message was
    /// created.
    #[must_use]
    pub fn origin_connection_id(&self) -> Option<&ConnectionId> {
        self.origin_connection_id.as_ref()
    }

    /// Room the client was in when the message entered the feed.
    #[must_use]
    pub fn room_id(&self) -> Option<&str> {
        self.room_id.as_deref()
    }
}

/// Side of the conversation a message is drawn on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    /// Sent from this connection.
    Mine,
    /// Sent by anyone else, or of unknown origin.
    Theirs,
}

/// Classifies `message` against the current identity.
///
/// Only an origin equal to the current connection id is "mine". A message
/// with no recorded origin, or any message while the identity has no id,
/// is "theirs".
#[must_use]
pub fn classify(message: &Message, identity: &SessionIdentity) -> Side {
    match (message.origin_connection_id(), identity.connection_id()) {
        (Some(origin), Some(current)) if origin == current => Side::Mine,
        _ => Side::Theirs,
    }
}

/// Append-only, unbounded message log for the session.
#[derive(Debug)]
pub struct Feed {
    messages: Vec<Message>,
    local_echo: bool,
}

impl Default for Feed {
    fn default() -> Self {
        Self::new(true)
    }
}

impl Feed {
    /// Creates an empty feed. With `local_echo` off, locally composed
    /// messages are only published, and show up once the relay echoes them.
    #[must_use]
    pub const fn new(local_echo: bool) -> Self {
        Self {
            messages: Vec::new(),
            local_echo,
        }
    }

    /// Publishes the composed text and appends it locally.
    ///
    /// No-op unless `membership` is present and `draft` is non-empty after
    /// trimming. The origin is whatever connection id `identity` holds right
    /// now, possibly none. On success `message` is emitted through `sink`
    /// and `draft` is cleared. Returns whether the submission was accepted.
    pub fn append_local<S: EventSink + ?Sized>(
        &mut self,
        draft: &mut String,
        membership: Option<&RoomMembership>,
        identity: &SessionIdentity,
        sink: &mut S,
    ) -> bool {
        let Some(membership) = membership else {
            tracing::debug!("message ignored: no room joined");
            return false;
        };
        let text = draft.trim();
        if text.is_empty() {
            return false;
        }

        let origin = identity.connection_id().cloned();
        if origin.is_none() {
            tracing::warn!("sending before the relay assigned a connection id");
        }

        let message = Message {
            text: text.to_string(),
            display_name: membership.display_name().to_string(),
            origin_connection_id: origin.clone(),
            room_id: Some(membership.room_id().to_string()),
        };
        sink.emit_event(OutboundEvent::Message(OutgoingMessage {
            msg: message.text.clone(),
            room: membership.room_id().to_string(),
            username: message.display_name.clone(),
            socket_id: origin,
        }));
        if self.local_echo {
            self.messages.push(message);
        }

        draft.clear();
        true
    }

    /// Appends a message delivered by the relay. Returns its index.
    ///
    /// The relay is trusted: there is no deduplication, no room filter and
    /// no validation of the text.
    pub fn append_remote(
        &mut self,
        payload: RelayedMessage,
        membership: Option<&RoomMembership>,
    ) -> usize {
        self.messages.push(Message {
            text: payload.msg,
            display_name: payload.username,
            origin_connection_id: payload.socket_id,
            room_id: membership.map(|m| m.room_id().to_string()),
        });
        self.messages.len() - 1
    }

    /// All messages in arrival order.
    #[must_use]
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Message at `index`, if any.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&Message> {
        self.messages.get(index)
    }

    /// Number of messages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Returns `true` if nothing has been appended.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Drops every message. Only a full client reset calls this.
    pub fn clear(&mut self) {
        self.messages.clear();
    }
}
