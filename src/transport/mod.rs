//! Transport layer: the owned relay connection and its event surface.
//!
//! The I/O task in [`connection`] speaks the wire protocol; the
//! [`TransportSession`] owns it and exposes `connect` / `on` / `emit` /
//! `disconnect` to the chat session.

mod connection;
pub mod handlers;
pub mod session;

pub use handlers::HandlerRegistry;
pub use session::{SessionHandle, TransportSession};

use crate::protocol::OutboundEvent;

/// Destination for outbound chat events.
///
/// Admission and feed operations publish through this seam instead of
/// reaching for a connection themselves. [`TransportSession`] is the
/// production implementation.
pub trait EventSink {
    /// Publishes `event`, fire-and-forget. Returns `false` if it was
    /// dropped.
    fn emit_event(&mut self, event: OutboundEvent) -> bool;
}

/// Sink that records events instead of sending them.
#[cfg(test)]
#[derive(Debug, Default)]
pub(crate) struct RecordingSink {
    pub(crate) events: Vec<OutboundEvent>,
}

#[cfg(test)]
impl EventSink for RecordingSink {
    fn emit_event(&mut self, event: OutboundEvent) -> bool {
        self.events.push(event);
        true
    }
}
