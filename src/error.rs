//! Client error types.
//!
//! [`ClientError`] covers the few fallible surfaces of the client: endpoint
//! parsing, wire packet decoding, JSON encoding and use of a session after
//! teardown. Admission and feed operations never fail; invalid input turns
//! them into no-ops instead.

/// Central error enum for the chat client.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// The configured relay endpoint cannot be turned into a socket URL.
    #[error("invalid relay endpoint: {0}")]
    InvalidEndpoint(String),

    /// A text frame did not follow the Engine.IO / Socket.IO framing.
    #[error("malformed packet: {0}")]
    MalformedPacket(String),

    /// The packet is well formed but uses a feature the client does not speak.
    #[error("unsupported packet: {0}")]
    UnsupportedPacket(String),

    /// JSON encoding or decoding failed.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// The session was torn down with `disconnect()` and cannot be reused.
    #[error("transport session already disconnected")]
    SessionClosed,
}

impl ClientError {
    /// Returns a stable short code for log fields.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::InvalidEndpoint(_) => "invalid_endpoint",
            Self::MalformedPacket(_) => "malformed_packet",
            Self::UnsupportedPacket(_) => "unsupported_packet",
            Self::Json(_) => "json",
            Self::SessionClosed => "session_closed",
        }
    }
}
