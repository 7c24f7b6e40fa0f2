//! Domain layer: session identity, room admission and the message feed.
//!
//! Everything here is plain single-owner state. Outbound effects go through
//! the [`crate::transport::EventSink`] seam, so these types never touch the
//! network directly.

pub mod admission;
pub mod feed;
pub mod identity;

pub use admission::{AdmissionController, AdmissionForm, AdmissionState, RoomMembership};
pub use feed::{Feed, Message, Side, classify};
pub use identity::{ConnectionId, SessionIdentity};
