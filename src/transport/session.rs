//! Transport session: the single owned connection to the relay.
//!
//! [`TransportSession`] is created once per chat session and owned by it.
//! It spawns the background I/O task on [`TransportSession::connect`],
//! hands outbound events to that task, and is the only place inbound events
//! enter the session. Dropping it disconnects.

use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::EventSink;
use super::connection::{Command, ConnectionTask};
use super::handlers::HandlerRegistry;
use crate::config::{ClientConfig, ReconnectPolicy};
use crate::domain::SessionIdentity;
use crate::error::ClientError;
use crate::protocol::endpoint::socket_url;
use crate::protocol::{
    DisconnectReason, EVENT_DISCONNECT, EnginePacket, InboundEvent, OutboundEvent, SocketPacket,
};

/// Cheap, cloneable handle to a live connection.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    endpoint: Arc<str>,
    commands: mpsc::UnboundedSender<Command>,
}

impl SessionHandle {
    /// Socket URL the session dials.
    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn send(&self, command: Command) -> bool {
        self.commands.send(command).is_ok()
    }
}

/// Owner-side half of the relay connection.
#[derive(Debug)]
pub struct TransportSession {
    reconnect: ReconnectPolicy,
    event_channel_capacity: usize,
    handle: Option<SessionHandle>,
    inbound: Option<mpsc::Receiver<InboundEvent>>,
    task: Option<JoinHandle<()>>,
    handlers: HandlerRegistry,
    identity: SessionIdentity,
    detached: bool,
}

impl TransportSession {
    /// Creates an unconnected session using the transport settings of
    /// `config`.
    #[must_use]
    pub fn new(config: &ClientConfig) -> Self {
        Self {
            reconnect: config.reconnect,
            event_channel_capacity: config.event_channel_capacity.max(1),
            handle: None,
            inbound: None,
            task: None,
            handlers: HandlerRegistry::new(),
            identity: SessionIdentity::new(),
            detached: false,
        }
    }

    /// Starts connecting to `endpoint` and returns immediately.
    ///
    /// Establishment is reported later as an inbound `connect` event. Calling
    /// this again while a connection exists returns the existing handle.
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::InvalidEndpoint`] if `endpoint` cannot be
    /// normalised, or [`ClientError::SessionClosed`] after `disconnect()`.
    pub fn connect(&mut self, endpoint: &str) -> Result<SessionHandle, ClientError> {
        if self.detached {
            return Err(ClientError::SessionClosed);
        }
        if let Some(handle) = &self.handle {
            tracing::debug!(endpoint = handle.endpoint(), "connect called on a live session");
            return Ok(handle.clone());
        }

        let url = socket_url(endpoint)?;
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::channel(self.event_channel_capacity);

        let task = ConnectionTask::new(url.clone(), self.reconnect, command_rx, event_tx);
        self.task = Some(tokio::spawn(task.run()));
        self.inbound = Some(event_rx);

        let handle = SessionHandle {
            endpoint: Arc::from(url),
            commands: command_tx,
        };
        tracing::info!(endpoint = handle.endpoint(), "connecting to relay");
        self.handle = Some(handle.clone());
        Ok(handle)
    }

    /// Registers `handler` for the inbound event `event`.
    ///
    /// Handlers for the same name run in registration order, on the owner,
    /// when [`TransportSession::dispatch`] processes the event.
    pub fn on<F>(&mut self, event: impl Into<String>, handler: F)
    where
        F: FnMut(&Value) + Send + 'static,
    {
        self.handlers.on(event, handler);
    }

    /// Sends a named event with a JSON payload, fire-and-forget.
    ///
    /// Returns `Ok(false)` if the event was dropped because there is no live
    /// connection; nothing is queued for later.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Json`] if `payload` cannot be serialized.
    pub fn emit<P: Serialize + ?Sized>(
        &mut self,
        event: &str,
        payload: &P,
    ) -> Result<bool, ClientError> {
        let payload = serde_json::to_value(payload)?;
        let Some(handle) = self.handle.as_ref().filter(|_| self.identity.is_connected()) else {
            tracing::debug!(event, "not connected; dropping outbound event");
            return Ok(false);
        };

        let frame = EnginePacket::Message(SocketPacket::event(event, payload)).encode();
        let sent = handle.send(Command::Send(frame));
        if !sent {
            tracing::debug!(event, "transport task gone; dropping outbound event");
        }
        Ok(sent)
    }

    /// Waits for the next raw inbound event.
    ///
    /// Returns `None` once the session is disconnected, was never connected,
    /// or the I/O task has stopped for good.
    pub async fn recv(&mut self) -> Option<InboundEvent> {
        if self.detached {
            return None;
        }
        self.inbound.as_mut()?.recv().await
    }

    /// Applies the transport-level effect of `event` and runs its handlers.
    ///
    /// `connect` records the new connection id; `disconnect` marks the
    /// identity offline. Returns the event for further processing, or `None`
    /// if the session is already disconnected and the event must be dropped.
    pub fn dispatch(&mut self, event: InboundEvent) -> Option<InboundEvent> {
        if self.detached {
            tracing::debug!(event = event.name(), "session detached; dropping inbound event");
            return None;
        }

        match &event {
            InboundEvent::Connect(id) => {
                self.identity.on_connected(id.clone());
            }
            InboundEvent::Disconnect(_) => self.identity.on_disconnected(),
            _ => {}
        }

        let payload = event.payload();
        self.handlers.dispatch(event.name(), &payload);
        Some(event)
    }

    /// Current connection identity.
    #[must_use]
    pub const fn identity(&self) -> &SessionIdentity {
        &self.identity
    }

    /// Handle of the live connection, if [`TransportSession::connect`] was
    /// called.
    #[must_use]
    pub const fn handle(&self) -> Option<&SessionHandle> {
        self.handle.as_ref()
    }

    /// Releases the connection. Idempotent.
    ///
    /// If the session was connected, `disconnect` handlers run one last time
    /// with [`DisconnectReason::ClientRequested`]. Then the I/O task is asked
    /// to leave the namespace and close the socket, the inbound channel is
    /// closed and every handler is detached, so no event is processed
    /// afterwards. Returns `true` only for the call that released it.
    pub fn disconnect(&mut self) -> bool {
        if self.detached {
            return false;
        }
        self.detached = true;
        if self.identity.is_connected() {
            let reason = Value::String(DisconnectReason::ClientRequested.to_string());
            self.handlers.dispatch(EVENT_DISCONNECT, &reason);
        }
        self.handlers.clear();

        if let Some(handle) = self.handle.take() {
            handle.send(Command::Close);
        }
        if let Some(mut inbound) = self.inbound.take() {
            inbound.close();
        }
        // The task finishes the close handshake on its own.
        drop(self.task.take());

        self.identity.on_disconnected();
        tracing::info!("transport session disconnected");
        true
    }
}

impl EventSink for TransportSession {
    fn emit_event(&mut self, event: OutboundEvent) -> bool {
        let payload = match event.payload() {
            Ok(payload) => payload,
            Err(err) => {
                tracing::warn!(error = %err, event = event.name(), "outbound payload not serializable");
                return false;
            }
        };
        match self.emit(event.name(), &payload) {
            Ok(sent) => sent,
            Err(err) => {
                tracing::warn!(error = %err, event = event.name(), "emit failed");
                false
            }
        }
    }
}

impl Drop for TransportSession {
    fn drop(&mut self) {
        if self.disconnect() {
            tracing::debug!("transport session released on drop");
        }
    }
}
