//! Engine.IO v4 / Socket.IO v5 text packet codec.
//!
//! Every WebSocket text frame carries exactly one Engine.IO packet. Its
//! first character is the packet type; message packets (`4`) wrap a
//! Socket.IO packet whose layout is:
//!
//! ```text
//! <type>[<attachments>-][/<namespace>,][<ack id>][<json>]
//! ```
//!
//! Binary packets are recognised and rejected; the chat protocol never
//! uses them.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ClientError;

/// The namespace every chat event travels on.
pub const DEFAULT_NAMESPACE: &str = "/";

/// Handshake sent by the server in the Engine.IO `open` packet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenHandshake {
    /// Engine-level session id (not the Socket.IO connection id).
    pub sid: String,
    /// Transports the server would upgrade to.
    #[serde(default)]
    pub upgrades: Vec<String>,
    /// Milliseconds between server pings.
    pub ping_interval: u64,
    /// Milliseconds the server waits for a pong.
    pub ping_timeout: u64,
    /// Largest payload the server accepts, in bytes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_payload: Option<u64>,
}

/// Engine.IO packet.
#[derive(Debug, Clone, PartialEq)]
pub enum EnginePacket {
    /// `0`: session opened.
    Open(OpenHandshake),
    /// `1`: transport closing.
    Close,
    /// `2`: heartbeat request, with optional probe data.
    Ping(Option<String>),
    /// `3`: heartbeat reply.
    Pong(Option<String>),
    /// `4`: Socket.IO packet.
    Message(SocketPacket),
    /// `5`: transport upgrade.
    Upgrade,
    /// `6`: no-op.
    Noop,
}

/// Socket.IO packet carried inside an Engine.IO message.
#[derive(Debug, Clone, PartialEq)]
pub enum SocketPacket {
    /// `0`: namespace connect request (client) or acknowledgement (server).
    Connect {
        /// Target namespace.
        namespace: String,
        /// Auth payload or, from the server, `{ "sid": ... }`.
        data: Option<Value>,
    },
    /// `1`: namespace disconnect.
    Disconnect {
        /// Target namespace.
        namespace: String,
    },
    /// `2`: named event.
    Event {
        /// Target namespace.
        namespace: String,
        /// Acknowledgement id requested by the sender.
        ack_id: Option<u64>,
        /// Event name.
        name: String,
        /// Event arguments after the name.
        args: Vec<Value>,
    },
    /// `3`: acknowledgement of an earlier event.
    Ack {
        /// Target namespace.
        namespace: String,
        /// Id of the acknowledged event.
        ack_id: u64,
        /// Acknowledgement arguments.
        args: Vec<Value>,
    },
    /// `4`: the server refused the namespace connection.
    ConnectError {
        /// Target namespace.
        namespace: String,
        /// Error payload, usually `{ "message": ... }`.
        data: Option<Value>,
    },
}

impl EnginePacket {
    /// Decodes one text frame.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::MalformedPacket`] for an empty frame, an
    /// unknown type or bad JSON, and [`ClientError::UnsupportedPacket`] for
    /// binary Socket.IO packets.
    pub fn decode(text: &str) -> Result<Self, ClientError> {
        let mut chars = text.chars();
        let kind = chars
            .next()
            .ok_or_else(|| ClientError::MalformedPacket("empty frame".to_string()))?;
        let body = chars.as_str();

        match kind {
            '0' => Ok(Self::Open(serde_json::from_str(body)?)),
            '1' => Ok(Self::Close),
            '2' => Ok(Self::Ping(non_empty(body))),
            '3' => Ok(Self::Pong(non_empty(body))),
            '4' => Ok(Self::Message(SocketPacket::decode(body)?)),
            '5' => Ok(Self::Upgrade),
            '6' => Ok(Self::Noop),
            other => Err(ClientError::MalformedPacket(format!(
                "unknown engine packet type {other:?}"
            ))),
        }
    }

    /// Encodes the packet as a text frame.
    #[must_use]
    pub fn encode(&self) -> String {
        match self {
            Self::Open(handshake) => {
                format!("0{}", serde_json::to_string(handshake).unwrap_or_default())
            }
            Self::Close => "1".to_string(),
            Self::Ping(data) => format!("2{}", data.as_deref().unwrap_or_default()),
            Self::Pong(data) => format!("3{}", data.as_deref().unwrap_or_default()),
            Self::Message(packet) => format!("4{}", packet.encode()),
            Self::Upgrade => "5".to_string(),
            Self::Noop => "6".to_string(),
        }
    }
}

impl SocketPacket {
    /// Builds an event packet on the default namespace with a single argument.
    #[must_use]
    pub fn event(name: impl Into<String>, payload: Value) -> Self {
        Self::Event {
            namespace: DEFAULT_NAMESPACE.to_string(),
            ack_id: None,
            name: name.into(),
            args: vec![payload],
        }
    }

    /// Returns the namespace the packet targets.
    #[must_use]
    pub fn namespace(&self) -> &str {
        match self {
            Self::Connect { namespace, .. }
            | Self::Disconnect { namespace }
            | Self::Event { namespace, .. }
            | Self::Ack { namespace, .. }
            | Self::ConnectError { namespace, .. } => namespace,
        }
    }

    /// Decodes the body of an Engine.IO message packet.
    ///
    /// # Errors
    ///
    /// See [`EnginePacket::decode`].
    pub fn decode(body: &str) -> Result<Self, ClientError> {
        let mut chars = body.chars();
        let kind = chars
            .next()
            .ok_or_else(|| ClientError::MalformedPacket("empty socket packet".to_string()))?;
        let rest = chars.as_str();

        if matches!(kind, '5' | '6') {
            return Err(ClientError::UnsupportedPacket(
                "binary socket.io packets".to_string(),
            ));
        }

        let (namespace, rest) = match rest.strip_prefix('/') {
            Some(_) => match rest.split_once(',') {
                Some((ns, tail)) => (ns.to_string(), tail),
                None => (rest.to_string(), ""),
            },
            None => (DEFAULT_NAMESPACE.to_string(), rest),
        };

        let digits_end = rest
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(rest.len());
        let (digits, json) = rest.split_at(digits_end);
        let ack_id = if digits.is_empty() {
            None
        } else {
            Some(digits.parse::<u64>().map_err(|_| {
                ClientError::MalformedPacket(format!("ack id {digits:?} out of range"))
            })?)
        };
        let data = if json.is_empty() {
            None
        } else {
            Some(serde_json::from_str::<Value>(json)?)
        };

        match kind {
            '0' => Ok(Self::Connect { namespace, data }),
            '1' => Ok(Self::Disconnect { namespace }),
            '2' => {
                let (name, args) = split_event(data)?;
                Ok(Self::Event {
                    namespace,
                    ack_id,
                    name,
                    args,
                })
            }
            '3' => {
                let ack_id = ack_id.ok_or_else(|| {
                    ClientError::MalformedPacket("ack packet without id".to_string())
                })?;
                let args = match data {
                    Some(Value::Array(args)) => args,
                    Some(other) => vec![other],
                    None => Vec::new(),
                };
                Ok(Self::Ack {
                    namespace,
                    ack_id,
                    args,
                })
            }
            '4' => Ok(Self::ConnectError { namespace, data }),
            other => Err(ClientError::MalformedPacket(format!(
                "unknown socket packet type {other:?}"
            ))),
        }
    }

    /// Encodes the packet (without the leading Engine.IO `4`).
    #[must_use]
    pub fn encode(&self) -> String {
        let (kind, ack_id, data) = match self {
            Self::Connect { data, .. } => ('0', None, data.clone()),
            Self::Disconnect { .. } => ('1', None, None),
            Self::Event {
                ack_id, name, args, ..
            } => {
                let mut array = Vec::with_capacity(args.len() + 1);
                array.push(Value::String(name.clone()));
                array.extend(args.iter().cloned());
                ('2', *ack_id, Some(Value::Array(array)))
            }
            Self::Ack { ack_id, args, .. } => ('3', Some(*ack_id), Some(Value::Array(args.clone()))),
            Self::ConnectError { data, .. } => ('4', None, data.clone()),
        };

        let mut out = String::new();
        out.push(kind);
        let namespace = self.namespace();
        if namespace != DEFAULT_NAMESPACE {
            out.push_str(namespace);
            out.push(',');
        }
        if let Some(id) = ack_id {
            out.push_str(&id.to_string());
        }
        if let Some(data) = data {
            out.push_str(&data.to_string());
        }
        out
    }
}

/// Splits an event array into its name and trailing arguments.
fn split_event(data: Option<Value>) -> Result<(String, Vec<Value>), ClientError> {
    let Some(Value::Array(items)) = data else {
        return Err(ClientError::MalformedPacket(
            "event payload is not an array".to_string(),
        ));
    };
    let mut items = items.into_iter();
    match items.next() {
        Some(Value::String(name)) => Ok((name, items.collect())),
        _ => Err(ClientError::MalformedPacket(
            "event array does not start with a name".to_string(),
        )),
    }
}

fn non_empty(body: &str) -> Option<String> {
    (!body.is_empty()).then(|| body.to_string())
}
