//! Relay-assigned connection identity.
//!
//! [`ConnectionId`] is a newtype over the socket id the relay hands out on
//! every (re)connect, so it cannot be confused with room names or display
//! names. [`SessionIdentity`] tracks the current id and whether the
//! connection is up.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Identifier the relay assigns to a connection.
///
/// Opaque to the client. Compared for equality to decide whether a feed
/// message is "mine".
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(String);

impl ConnectionId {
    /// Wraps a relay-provided id.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for ConnectionId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&str> for ConnectionId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// Connection identity of the local session.
///
/// The id is absent until the first connect acknowledgement. A connection
/// loss clears `connected` but keeps the last id until the next
/// acknowledgement replaces it, so already rendered messages keep their
/// side while offline.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionIdentity {
    connection_id: Option<ConnectionId>,
    connected: bool,
}

impl SessionIdentity {
    /// Creates an identity with no id and no connection.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the current connection id, if one was ever assigned.
    #[must_use]
    pub fn connection_id(&self) -> Option<&ConnectionId> {
        self.connection_id.as_ref()
    }

    /// Returns `true` while the relay connection is established.
    #[must_use]
    pub const fn is_connected(&self) -> bool {
        self.connected
    }

    /// Records a connect acknowledgement. Returns `true` if the id changed.
    pub fn on_connected(&mut self, id: ConnectionId) -> bool {
        self.connected = true;
        let changed = self.connection_id.as_ref() != Some(&id);
        self.connection_id = Some(id);
        changed
    }

    /// Records a connection loss.
    pub fn on_disconnected(&mut self) {
        self.connected = false;
    }
}
