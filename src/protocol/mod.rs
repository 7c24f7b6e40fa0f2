//! Wire protocol: endpoint normalisation, Engine.IO / Socket.IO framing and
//! the typed chat events carried over it.

pub mod endpoint;
pub mod events;
pub mod packet;

pub use events::{
    DisconnectReason, EVENT_CONNECT, EVENT_DISCONNECT, EVENT_JOINROOM, EVENT_MESSAGE,
    EVENT_RECMSG, EVENT_WELCOME, InboundEvent, OutboundEvent, OutgoingMessage, RelayedMessage,
};
pub use packet::{EnginePacket, OpenHandshake, SocketPacket};
