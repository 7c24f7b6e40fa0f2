//! # roomchat-client
//!
//! Session and message-synchronization core for a socket.io room chat
//! client.
//!
//! A user joins a named room under a display name, then exchanges short text
//! messages with the other occupants. This crate owns the parts with real
//! behaviour: room admission, the duplex event protocol with the relay, and
//! the ordering and ownership rules for rendering the conversation.
//!
//! ## Architecture
//!
//! ```text
//! View (terminal front end, or any other)
//!     │  intents: submit_admission / submit_message
//!     │  changes: next_change -> StateChange
//!     │
//!     ├── ChatClient (client/)            single owner of all state
//!     │     ├── AdmissionController (domain/)
//!     │     ├── Feed + classify (domain/)
//!     │     └── TransportSession (transport/)
//!     │           └── I/O task ── Engine.IO / Socket.IO (protocol/)
//!     │
//!     └── Relay service (external)
//! ```
//!
//! ## Delivery model
//!
//! Best effort, at most once per connection. Events emitted while the
//! connection is down are dropped, never queued.

pub mod client;
pub mod config;
pub mod domain;
pub mod error;
pub mod protocol;
pub mod transport;

pub use client::{ChatClient, StateChange};
pub use config::ClientConfig;
pub use error::ClientError;
