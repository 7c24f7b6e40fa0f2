//! Background I/O task for one transport session.
//!
//! Dials the relay, runs the Engine.IO handshake and heartbeat, and moves
//! frames in both directions:
//!
//! - decoded chat events go to the session owner over a bounded channel, in
//!   arrival order;
//! - encoded outbound events arrive from the owner over an unbounded
//!   command channel.
//!
//! The task never touches domain state. It ends when the owner asks it to
//! close, when the owner goes away, or when reconnection gives up.

use std::time::Duration;

use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::Message as Frame;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use crate::config::ReconnectPolicy;
use crate::domain::ConnectionId;
use crate::protocol::{DisconnectReason, EnginePacket, InboundEvent, SocketPacket};
use crate::protocol::packet::DEFAULT_NAMESPACE;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Frame>;

/// Liveness window used until the open handshake announces the real one.
const HANDSHAKE_LIVENESS: Duration = Duration::from_secs(45);

/// Instruction from the session owner to the I/O task.
#[derive(Debug)]
pub(crate) enum Command {
    /// Send an already encoded text frame.
    Send(String),
    /// Leave the namespace, close the socket and stop.
    Close,
}

/// How a single connection attempt ended.
enum Outcome {
    /// The owner asked to close.
    Closed,
    /// The owner dropped its end of the event channel.
    OwnerGone,
    /// The connection went away on its own.
    Lost(DisconnectReason),
}

/// What to do after handling one packet.
enum Flow {
    Continue,
    End(Outcome),
}

/// State owned by the I/O task.
pub(crate) struct ConnectionTask {
    url: String,
    policy: ReconnectPolicy,
    commands: mpsc::UnboundedReceiver<Command>,
    events: mpsc::Sender<InboundEvent>,
}

impl ConnectionTask {
    pub(crate) fn new(
        url: String,
        policy: ReconnectPolicy,
        commands: mpsc::UnboundedReceiver<Command>,
        events: mpsc::Sender<InboundEvent>,
    ) -> Self {
        Self {
            url,
            policy,
            commands,
            events,
        }
    }

    /// Runs connection attempts until closed, orphaned or out of retries.
    pub(crate) async fn run(mut self) {
        install_crypto_provider();

        let mut attempt: u32 = 0;
        loop {
            tracing::debug!(url = %self.url, attempt, "dialing relay");
            let dialed = tokio::select! {
                result = tokio_tungstenite::connect_async(self.url.as_str()) => Some(result),
                () = wait_for_close(&mut self.commands) => None,
            };

            let outcome = match dialed {
                None => Outcome::Closed,
                Some(Ok((ws, _response))) => {
                    attempt = 0;
                    self.drive(ws).await
                }
                Some(Err(err)) => {
                    tracing::warn!(error = %err, url = %self.url, "relay connection failed");
                    Outcome::Lost(DisconnectReason::ConnectFailed(err.to_string()))
                }
            };

            match outcome {
                Outcome::Closed => {
                    tracing::debug!("transport closed by owner");
                    return;
                }
                Outcome::OwnerGone => {
                    tracing::debug!("session owner gone; stopping transport");
                    return;
                }
                Outcome::Lost(reason) => {
                    tracing::info!(%reason, "relay connection lost");
                    if self.events.send(InboundEvent::Disconnect(reason)).await.is_err() {
                        return;
                    }
                    attempt = attempt.saturating_add(1);
                    if !self.policy.allows(attempt) {
                        tracing::warn!(attempt, "giving up on relay connection");
                        return;
                    }
                    if !self.pause_before_retry().await {
                        return;
                    }
                }
            }
        }
    }

    /// Sleeps for the retry delay, discarding outbound events meanwhile.
    /// Returns `false` if the owner asked to close.
    async fn pause_before_retry(&mut self) -> bool {
        let sleep = tokio::time::sleep(self.policy.delay);
        tokio::pin!(sleep);
        loop {
            tokio::select! {
                () = &mut sleep => return true,
                command = self.commands.recv() => match command {
                    Some(Command::Send(_)) => {
                        tracing::debug!("dropping outbound event while reconnecting");
                    }
                    Some(Command::Close) | None => return false,
                },
            }
        }
    }

    /// Runs the read/write loop for one established WebSocket.
    async fn drive(&mut self, ws: WsStream) -> Outcome {
        let (mut sink, mut stream) = ws.split();
        let mut liveness = HANDSHAKE_LIVENESS;
        let mut deadline = Instant::now() + liveness;
        let mut joined = false;

        loop {
            tokio::select! {
                () = tokio::time::sleep_until(deadline) => {
                    return Outcome::Lost(DisconnectReason::PingTimeout);
                }
                frame = stream.next() => {
                    deadline = Instant::now() + liveness;
                    let text = match frame {
                        None => return Outcome::Lost(DisconnectReason::ServerClosed),
                        Some(Err(err)) => {
                            return Outcome::Lost(DisconnectReason::TransportError(err.to_string()));
                        }
                        Some(Ok(Frame::Text(text))) => text,
                        Some(Ok(Frame::Close(_))) => return Outcome::Lost(DisconnectReason::ServerClosed),
                        Some(Ok(Frame::Binary(_))) => {
                            tracing::debug!("ignoring binary frame");
                            continue;
                        }
                        Some(Ok(_)) => continue,
                    };

                    let packet = match EnginePacket::decode(text.as_str()) {
                        Ok(packet) => packet,
                        Err(err) => {
                            tracing::warn!(error = %err, code = err.code(), "dropping undecodable frame");
                            continue;
                        }
                    };
                    match self.on_packet(packet, &mut sink, &mut joined, &mut liveness).await {
                        Flow::Continue => {}
                        Flow::End(outcome) => return outcome,
                    }
                }
                command = self.commands.recv() => match command {
                    Some(Command::Send(text)) => {
                        if !joined {
                            tracing::debug!("dropping outbound event before namespace connect");
                        } else if let Err(err) = sink.send(Frame::text(text)).await {
                            return Outcome::Lost(DisconnectReason::TransportError(err.to_string()));
                        }
                    }
                    Some(Command::Close) | None => {
                        if joined {
                            let leave = EnginePacket::Message(SocketPacket::Disconnect {
                                namespace: DEFAULT_NAMESPACE.to_string(),
                            });
                            if let Err(err) = sink.send(Frame::text(leave.encode())).await {
                                tracing::debug!(error = %err, "namespace leave not delivered");
                            }
                        }
                        if let Err(err) = sink.close().await {
                            tracing::debug!(error = %err, "websocket close failed");
                        }
                        return Outcome::Closed;
                    }
                },
            }
        }
    }

    /// Handles one decoded Engine.IO packet.
    async fn on_packet(
        &self,
        packet: EnginePacket,
        sink: &mut WsSink,
        joined: &mut bool,
        liveness: &mut Duration,
    ) -> Flow {
        match packet {
            EnginePacket::Open(handshake) => {
                *liveness = Duration::from_millis(
                    handshake.ping_interval.saturating_add(handshake.ping_timeout),
                );
                tracing::debug!(engine_sid = %handshake.sid, ?liveness, "engine session open");
                let connect = EnginePacket::Message(SocketPacket::Connect {
                    namespace: DEFAULT_NAMESPACE.to_string(),
                    data: None,
                });
                self.write(sink, connect).await
            }
            EnginePacket::Ping(data) => self.write(sink, EnginePacket::Pong(data)).await,
            EnginePacket::Close => Flow::End(Outcome::Lost(DisconnectReason::ServerClosed)),
            EnginePacket::Pong(_) | EnginePacket::Upgrade | EnginePacket::Noop => Flow::Continue,
            EnginePacket::Message(packet) if packet.namespace() != DEFAULT_NAMESPACE => {
                tracing::debug!(namespace = packet.namespace(), "ignoring packet for other namespace");
                Flow::Continue
            }
            EnginePacket::Message(SocketPacket::Connect { data, .. }) => {
                let sid = data
                    .as_ref()
                    .and_then(|d| d.get("sid"))
                    .and_then(|s| s.as_str())
                    .map(ConnectionId::from);
                let Some(id) = sid else {
                    return Flow::End(Outcome::Lost(DisconnectReason::ProtocolViolation(
                        "connect acknowledgement without sid".to_string(),
                    )));
                };
                *joined = true;
                tracing::info!(connection_id = %id, "connected to relay");
                self.forward(InboundEvent::Connect(id)).await
            }
            EnginePacket::Message(SocketPacket::Event { name, args, .. }) => {
                let payload = args.into_iter().next().unwrap_or_default();
                tracing::trace!(event = %name, "event received");
                self.forward(InboundEvent::from_wire(name, payload)).await
            }
            EnginePacket::Message(SocketPacket::Disconnect { .. }) => {
                Flow::End(Outcome::Lost(DisconnectReason::ServerClosed))
            }
            EnginePacket::Message(SocketPacket::ConnectError { data, .. }) => {
                let why = data
                    .as_ref()
                    .and_then(|d| d.get("message"))
                    .and_then(|m| m.as_str())
                    .map_or_else(|| "no reason given".to_string(), str::to_string);
                Flow::End(Outcome::Lost(DisconnectReason::ConnectRejected(why)))
            }
            EnginePacket::Message(SocketPacket::Ack { ack_id, .. }) => {
                tracing::debug!(ack_id, "ignoring unsolicited ack");
                Flow::Continue
            }
        }
    }

    async fn write(&self, sink: &mut WsSink, packet: EnginePacket) -> Flow {
        match sink.send(Frame::text(packet.encode())).await {
            Ok(()) => Flow::Continue,
            Err(err) => Flow::End(Outcome::Lost(DisconnectReason::TransportError(
                err.to_string(),
            ))),
        }
    }

    async fn forward(&self, event: InboundEvent) -> Flow {
        if self.events.send(event).await.is_err() {
            Flow::End(Outcome::OwnerGone)
        } else {
            Flow::Continue
        }
    }
}

/// Makes `ring` the process-wide rustls provider unless one is already set.
#[cfg(feature = "tls")]
fn install_crypto_provider() {
    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_err()
    {
        tracing::trace!("rustls crypto provider already installed");
    }
}

#[cfg(not(feature = "tls"))]
const fn install_crypto_provider() {}

/// Resolves once the owner asks to close, discarding outbound events that
/// arrive first.
async fn wait_for_close(commands: &mut mpsc::UnboundedReceiver<Command>) {
    loop {
        match commands.recv().await {
            Some(Command::Send(_)) => {
                tracing::debug!("dropping outbound event while dialing");
            }
            Some(Command::Close) | None => return,
        }
    }
}
