//! Chat session: the single owner of identity, admission and feed.
//!
//! [`ChatClient`] wires the [`TransportSession`] into the
//! [`AdmissionController`] and the [`Feed`]. Every inbound event goes
//! through [`ChatClient::handle_event`], which applies exactly one state
//! transition and reports it as a [`StateChange`] for the view.

use serde_json::Value;

use crate::config::ClientConfig;
use crate::domain::{
    AdmissionController, AdmissionForm, ConnectionId, Feed, Message, SessionIdentity, Side,
    classify,
};
use crate::error::ClientError;
use crate::protocol::{DisconnectReason, InboundEvent};
use crate::transport::{SessionHandle, TransportSession};

/// What changed after handling one inbound event.
#[derive(Debug, Clone, PartialEq)]
pub enum StateChange {
    /// The relay assigned a connection id.
    Connected(ConnectionId),
    /// The connection went away.
    Disconnected(DisconnectReason),
    /// The relay greeted the client.
    Welcome(Value),
    /// A relayed message was appended to the feed at `index`.
    MessageAppended {
        /// Position in [`Feed::messages`].
        index: usize,
    },
    /// An event with no state transition; only handlers saw it.
    Unhandled {
        /// Event name.
        name: String,
    },
}

/// One chat session: a transport, an admission state machine and a feed.
#[derive(Debug)]
pub struct ChatClient {
    relay_url: String,
    transport: TransportSession,
    admission: AdmissionController,
    feed: Feed,
}

impl ChatClient {
    /// Creates an unconnected client.
    #[must_use]
    pub fn new(config: &ClientConfig) -> Self {
        Self {
            relay_url: config.relay_url.clone(),
            transport: TransportSession::new(config),
            admission: AdmissionController::new(),
            feed: Feed::new(config.local_echo),
        }
    }

    /// Creates a client and starts connecting to the configured relay.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::InvalidEndpoint`] if the relay URL is invalid.
    pub fn start(config: &ClientConfig) -> Result<Self, ClientError> {
        let mut client = Self::new(config);
        client.connect()?;
        Ok(client)
    }

    /// Starts connecting to the configured relay; idempotent.
    ///
    /// # Errors
    ///
    /// See [`TransportSession::connect`].
    pub fn connect(&mut self) -> Result<SessionHandle, ClientError> {
        self.transport.connect(&self.relay_url)
    }

    /// Registers a handler for a named inbound event.
    pub fn on<F>(&mut self, event: impl Into<String>, handler: F)
    where
        F: FnMut(&Value) + Send + 'static,
    {
        self.transport.on(event, handler);
    }

    /// Submits the admission form. Silent no-op on invalid input.
    pub fn submit_admission(&mut self, form: &mut AdmissionForm) -> bool {
        self.admission.submit(form, &mut self.transport)
    }

    /// Submits the composed message. Silent no-op before admission or on
    /// blank text.
    pub fn submit_message(&mut self, draft: &mut String) -> bool {
        let identity = self.transport.identity().clone();
        self.feed.append_local(
            draft,
            self.admission.membership(),
            &identity,
            &mut self.transport,
        )
    }

    /// Waits for the next inbound event and applies it.
    ///
    /// Returns `None` once the session is disconnected or the transport has
    /// stopped for good.
    pub async fn next_change(&mut self) -> Option<StateChange> {
        loop {
            let event = self.transport.recv().await?;
            if let Some(change) = self.handle_event(event) {
                return Some(change);
            }
        }
    }

    /// Applies one inbound event.
    ///
    /// `connect` and `disconnect` update the session identity, `recmsg`
    /// appends to the feed, everything else only runs handlers. Returns
    /// `None` after `disconnect()`.
    pub fn handle_event(&mut self, event: InboundEvent) -> Option<StateChange> {
        let event = self.transport.dispatch(event)?;
        let change = match event {
            InboundEvent::Connect(id) => StateChange::Connected(id),
            InboundEvent::Disconnect(reason) => StateChange::Disconnected(reason),
            InboundEvent::Welcome(data) => {
                tracing::info!(%data, "relay welcome");
                StateChange::Welcome(data)
            }
            InboundEvent::RecMsg(message) => {
                tracing::debug!(from = %message.username, "message received");
                let index = self
                    .feed
                    .append_remote(message, self.admission.membership());
                StateChange::MessageAppended { index }
            }
            InboundEvent::Other { name, .. } => {
                tracing::debug!(event = %name, "no state transition for event");
                StateChange::Unhandled { name }
            }
        };
        Some(change)
    }

    /// Current connection identity.
    #[must_use]
    pub const fn identity(&self) -> &SessionIdentity {
        self.transport.identity()
    }

    /// Admission state machine.
    #[must_use]
    pub const fn admission(&self) -> &AdmissionController {
        &self.admission
    }

    /// Message feed.
    #[must_use]
    pub const fn feed(&self) -> &Feed {
        &self.feed
    }

    /// Side `message` renders on, against the current identity.
    #[must_use]
    pub fn classify(&self, message: &Message) -> Side {
        classify(message, self.transport.identity())
    }

    /// Feed messages paired with their render side.
    pub fn rendered(&self) -> impl Iterator<Item = (Side, &Message)> {
        let identity = self.transport.identity();
        self.feed
            .messages()
            .iter()
            .map(move |message| (classify(message, identity), message))
    }

    /// Full client reset: forget the room membership and the feed. The
    /// connection and its identity are kept.
    pub fn reset(&mut self) {
        tracing::info!("resetting chat session");
        self.admission.reset();
        self.feed.clear();
    }

    /// Tears the session down. Idempotent; also runs on drop.
    ///
    /// The first call reports the local close as
    /// [`DisconnectReason::ClientRequested`]; later calls return `None`.
    pub fn disconnect(&mut self) -> Option<StateChange> {
        self.transport
            .disconnect()
            .then_some(StateChange::Disconnected(DisconnectReason::ClientRequested))
    }
}
