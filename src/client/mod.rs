//! Session layer: the owner that turns inbound events into state changes.

pub mod chat_client;

pub use chat_client::{ChatClient, StateChange};
