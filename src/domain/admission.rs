//! Room admission state machine.
//!
//! The client starts [`AdmissionState::Unset`]. A valid
//! [`AdmissionController::submit`] moves it to [`AdmissionState::Active`]
//! and announces the room to the relay. There is no transition back other
//! than a full client reset.

use crate::protocol::OutboundEvent;
use crate::transport::EventSink;

/// Room and display name chosen for this admission cycle.
///
/// Both fields are trimmed and non-empty. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomMembership {
    room_id: String,
    display_name: String,
}

impl RoomMembership {
    /// Room the client joined.
    #[must_use]
    pub fn room_id(&self) -> &str {
        &self.room_id
    }

    /// Name the client chats under.
    #[must_use]
    pub fn display_name(&self) -> &str {
        &self.display_name
    }
}

/// Admission state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum AdmissionState {
    /// No room chosen yet; messaging is not possible.
    #[default]
    Unset,
    /// Admitted to a room under a display name.
    Active(RoomMembership),
}

/// Raw text of the admission form, as typed by the user.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AdmissionForm {
    /// Room name input.
    pub room: String,
    /// Display name input.
    pub username: String,
}

impl AdmissionForm {
    /// Creates a form pre-filled with the given inputs.
    #[must_use]
    pub fn new(room: impl Into<String>, username: impl Into<String>) -> Self {
        Self {
            room: room.into(),
            username: username.into(),
        }
    }
}

/// Gates the client between "unidentified" and "active in a room".
#[derive(Debug, Default)]
pub struct AdmissionController {
    state: AdmissionState,
}

impl AdmissionController {
    /// Creates a controller in the `Unset` state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the current state.
    #[must_use]
    pub const fn state(&self) -> &AdmissionState {
        &self.state
    }

    /// Returns the membership while `Active`.
    #[must_use]
    pub const fn membership(&self) -> Option<&RoomMembership> {
        match &self.state {
            AdmissionState::Active(membership) => Some(membership),
            AdmissionState::Unset => None,
        }
    }

    /// Returns `true` once a room has been joined.
    #[must_use]
    pub const fn is_active(&self) -> bool {
        matches!(self.state, AdmissionState::Active(_))
    }

    /// Attempts admission with the form contents.
    ///
    /// Empty (or whitespace-only) room or username is a silent no-op, as is
    /// a second submission while already `Active`. On success the trimmed
    /// membership is stored, `joinroom` is emitted through `sink` and both
    /// form fields are cleared. Returns whether the state changed.
    pub fn submit<S: EventSink + ?Sized>(&mut self, form: &mut AdmissionForm, sink: &mut S) -> bool {
        if self.is_active() {
            tracing::debug!("admission ignored: already active");
            return false;
        }

        let room = form.room.trim();
        let username = form.username.trim();
        if room.is_empty() || username.is_empty() {
            tracing::debug!("admission ignored: empty room or username");
            return false;
        }

        let membership = RoomMembership {
            room_id: room.to_string(),
            display_name: username.to_string(),
        };
        tracing::info!(room = %membership.room_id, username = %membership.display_name, "joining room");

        let join = OutboundEvent::JoinRoom(membership.room_id.clone());
        self.state = AdmissionState::Active(membership);
        sink.emit_event(join);

        form.room.clear();
        form.username.clear();
        true
    }

    /// Returns to `Unset`, discarding the membership. Only a full client
    /// reset calls this.
    pub fn reset(&mut self) {
        self.state = AdmissionState::Unset;
    }
}
