//! End-to-end tests against an in-process relay speaking Engine.IO v4 /
//! Socket.IO over WebSocket.

#![allow(clippy::panic)]

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use axum::Router;
use axum::extract::State;
use axum::extract::ws::{Message as WsFrame, WebSocket, WebSocketUpgrade};
use axum::response::IntoResponse;
use axum::routing::get;
use futures_util::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::sync::broadcast;

use roomchat_client::config::ReconnectPolicy;
use roomchat_client::domain::{AdmissionForm, Message, Side};
use roomchat_client::protocol::DisconnectReason;
use roomchat_client::{ChatClient, ClientConfig, StateChange};

const WAIT: Duration = Duration::from_secs(5);

/// A frame routed to every socket in `room` except `sender`.
#[derive(Debug, Clone)]
struct RoomFrame {
    room: String,
    sender: String,
    frame: String,
}

#[derive(Debug, Clone)]
struct Relay {
    rooms: broadcast::Sender<RoomFrame>,
    connections: Arc<AtomicUsize>,
    pongs: Arc<AtomicUsize>,
    /// Connection ordinal of every `joinroom` received.
    joins: Arc<Mutex<Vec<usize>>>,
    /// Connection ordinal and text of every `message` received.
    messages: Arc<Mutex<Vec<(usize, String)>>>,
    /// Close the first connection's namespace right after it joins a room.
    kick_first: bool,
}

impl Relay {
    fn joins_on(&self, ordinal: usize) -> usize {
        self.joins
            .lock()
            .map(|joins| joins.iter().filter(|&&o| o == ordinal).count())
            .unwrap_or_default()
    }

    fn received_texts(&self) -> Vec<(usize, String)> {
        self.messages.lock().map(|m| m.clone()).unwrap_or_default()
    }
}

async fn spawn_relay(kick_first: bool) -> (SocketAddr, Relay) {
    let (rooms, _) = broadcast::channel(64);
    let relay = Relay {
        rooms,
        connections: Arc::new(AtomicUsize::new(0)),
        pongs: Arc::new(AtomicUsize::new(0)),
        joins: Arc::new(Mutex::new(Vec::new())),
        messages: Arc::new(Mutex::new(Vec::new())),
        kick_first,
    };
    let app = Router::new()
        .route("/socket.io/", get(upgrade))
        .with_state(relay.clone());

    let Ok(listener) = tokio::net::TcpListener::bind("127.0.0.1:0").await else {
        panic!("bind relay listener");
    };
    let Ok(addr) = listener.local_addr() else {
        panic!("relay address");
    };
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    (addr, relay)
}

async fn upgrade(ws: WebSocketUpgrade, State(relay): State<Relay>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| serve_socket(socket, relay))
}

async fn serve_socket(socket: WebSocket, relay: Relay) {
    let ordinal = relay.connections.fetch_add(1, Ordering::SeqCst);
    let sid = uuid::Uuid::new_v4().simple().to_string();
    let mut routed = relay.rooms.subscribe();
    let (mut tx, mut rx) = socket.split();
    let mut room: Option<String> = None;

    let open = json!({
        "sid": format!("engine-{sid}"),
        "upgrades": [],
        "pingInterval": 25000,
        "pingTimeout": 20000,
        "maxPayload": 1_000_000,
    });
    if tx.send(WsFrame::text(format!("0{open}"))).await.is_err() {
        return;
    }

    loop {
        tokio::select! {
            frame = rx.next() => {
                let Some(Ok(WsFrame::Text(text))) = frame else {
                    break;
                };
                let mut replies = Vec::new();
                match text.as_str() {
                    "40" => {
                        replies.push(format!("40{}", json!({"sid": sid})));
                        replies.push(r#"42["welcome","Welcome to the chat"]"#.to_string());
                        replies.push("2".to_string());
                    }
                    "3" => {
                        relay.pongs.fetch_add(1, Ordering::SeqCst);
                    }
                    "41" => break,
                    other => {
                        let Some(body) = other.strip_prefix("42") else {
                            continue;
                        };
                        let Ok(Value::Array(args)) = serde_json::from_str::<Value>(body) else {
                            continue;
                        };
                        match (args.first().and_then(Value::as_str), args.get(1)) {
                            (Some("joinroom"), Some(Value::String(name))) => {
                                if let Ok(mut joins) = relay.joins.lock() {
                                    joins.push(ordinal);
                                }
                                room = Some(name.clone());
                                replies.push(format!("42{}", json!(["joined", name])));
                                if relay.kick_first && ordinal == 0 {
                                    replies.push("41".to_string());
                                }
                            }
                            (Some("message"), Some(payload)) => {
                                let text = payload
                                    .get("msg")
                                    .and_then(Value::as_str)
                                    .unwrap_or_default()
                                    .to_string();
                                if let Ok(mut messages) = relay.messages.lock() {
                                    messages.push((ordinal, text));
                                }
                                let target = payload
                                    .get("room")
                                    .and_then(Value::as_str)
                                    .unwrap_or_default()
                                    .to_string();
                                let recmsg = json!(["recmsg", {
                                    "msg": payload.get("msg"),
                                    "username": payload.get("username"),
                                    "socketId": payload.get("socketId"),
                                }]);
                                let _ = relay.rooms.send(RoomFrame {
                                    room: target,
                                    sender: sid.clone(),
                                    frame: format!("42{recmsg}"),
                                });
                            }
                            _ => {}
                        }
                    }
                }
                for reply in replies {
                    if tx.send(WsFrame::text(reply)).await.is_err() {
                        return;
                    }
                }
            }
            delivered = routed.recv() => {
                let Ok(delivered) = delivered else {
                    continue;
                };
                if room.as_deref() == Some(delivered.room.as_str())
                    && delivered.sender != sid
                    && tx.send(WsFrame::text(delivered.frame)).await.is_err()
                {
                    return;
                }
            }
        }
    }
}

fn config_for(addr: SocketAddr, reconnect: ReconnectPolicy) -> ClientConfig {
    ClientConfig {
        relay_url: format!("http://{addr}"),
        reconnect,
        ..ClientConfig::default()
    }
}

async fn wait_for<F>(client: &mut ChatClient, mut wanted: F) -> StateChange
where
    F: FnMut(&StateChange) -> bool,
{
    let found = tokio::time::timeout(WAIT, async {
        while let Some(change) = client.next_change().await {
            if wanted(&change) {
                return Some(change);
            }
        }
        None
    })
    .await;
    match found {
        Ok(Some(change)) => change,
        Ok(None) => panic!("session ended before the expected change"),
        Err(_) => panic!("timed out waiting for a state change"),
    }
}

async fn joined(addr: SocketAddr, room: &str, name: &str) -> ChatClient {
    let Ok(mut client) = ChatClient::start(&config_for(addr, ReconnectPolicy::disabled())) else {
        panic!("client must start");
    };
    wait_for(&mut client, |c| matches!(c, StateChange::Connected(_))).await;
    assert!(client.submit_admission(&mut AdmissionForm::new(room, name)));
    wait_for(&mut client, |c| matches!(c, StateChange::Unhandled { name: event } if event == "joined")).await;
    client
}

fn rendered(client: &ChatClient) -> Vec<(Side, String, String)> {
    client
        .rendered()
        .map(|(side, m)| (side, m.display_name().to_string(), m.text().to_string()))
        .collect()
}

#[tokio::test]
async fn two_clients_chat_in_one_room() {
    let (addr, _relay) = spawn_relay(false).await;
    let mut alice = joined(addr, "lobby", "alice").await;
    let mut bob = joined(addr, " lobby ", "bob").await;

    let mut draft = "  hi  ".to_string();
    assert!(alice.submit_message(&mut draft));
    assert!(draft.is_empty());

    wait_for(&mut bob, |c| matches!(c, StateChange::MessageAppended { .. })).await;
    let Some(received) = bob.feed().get(0) else {
        panic!("bob should have alice's message");
    };
    assert_eq!(received.origin_connection_id(), alice.identity().connection_id());
    assert_eq!(
        rendered(&bob),
        vec![(Side::Theirs, "alice".to_string(), "hi".to_string())]
    );

    assert!(bob.submit_message(&mut "yo".to_string()));
    wait_for(&mut alice, |c| matches!(c, StateChange::MessageAppended { .. })).await;
    assert_eq!(
        rendered(&alice),
        vec![
            (Side::Mine, "alice".to_string(), "hi".to_string()),
            (Side::Theirs, "bob".to_string(), "yo".to_string()),
        ]
    );
    assert_eq!(
        rendered(&bob),
        vec![
            (Side::Theirs, "alice".to_string(), "hi".to_string()),
            (Side::Mine, "bob".to_string(), "yo".to_string()),
        ]
    );

    assert_eq!(
        alice.disconnect(),
        Some(StateChange::Disconnected(DisconnectReason::ClientRequested))
    );
    assert_eq!(alice.next_change().await, None);
    bob.disconnect();
}

#[tokio::test]
async fn other_rooms_do_not_receive_messages() {
    let (addr, _relay) = spawn_relay(false).await;
    let mut alice = joined(addr, "lobby", "alice").await;
    let mut carol = joined(addr, "attic", "carol").await;

    alice.submit_message(&mut "lobby only".to_string());
    carol.submit_message(&mut "attic only".to_string());

    let outcome = tokio::time::timeout(Duration::from_millis(300), carol.next_change()).await;
    assert!(outcome.is_err(), "carol should see nothing from the lobby");
    let texts: Vec<String> = carol.feed().messages().iter().map(|m| m.text().to_string()).collect();
    assert_eq!(texts, vec!["attic only".to_string()]);

    alice.disconnect();
    carol.disconnect();
}

#[tokio::test]
async fn welcome_reaches_registered_handlers_and_pings_are_answered() {
    let (addr, relay) = spawn_relay(false).await;
    let Ok(mut client) = ChatClient::start(&config_for(addr, ReconnectPolicy::disabled())) else {
        panic!("client must start");
    };
    let greetings = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&greetings);
    client.on("welcome", move |payload: &Value| {
        if let Ok(mut greetings) = sink.lock() {
            greetings.push(payload.clone());
        }
    });

    let change = wait_for(&mut client, |c| matches!(c, StateChange::Welcome(_))).await;
    assert_eq!(change, StateChange::Welcome(json!("Welcome to the chat")));
    let seen = greetings.lock().map(|g| g.clone()).unwrap_or_default();
    assert_eq!(seen, vec![json!("Welcome to the chat")]);

    let answered = tokio::time::timeout(WAIT, async {
        while relay.pongs.load(Ordering::SeqCst) == 0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
    assert!(answered.is_ok(), "relay ping was never answered");
    client.disconnect();
}

#[tokio::test]
async fn unreachable_relay_reports_disconnect_then_ends() {
    let Ok(listener) = tokio::net::TcpListener::bind("127.0.0.1:0").await else {
        panic!("bind probe listener");
    };
    let Ok(addr) = listener.local_addr() else {
        panic!("probe address");
    };
    drop(listener);

    let Ok(mut client) = ChatClient::start(&config_for(addr, ReconnectPolicy::disabled())) else {
        panic!("client must start");
    };
    let change = wait_for(&mut client, |_| true).await;
    assert!(matches!(
        change,
        StateChange::Disconnected(DisconnectReason::ConnectFailed(_))
    ));
    let end = tokio::time::timeout(WAIT, client.next_change()).await;
    assert_eq!(end.ok().flatten(), None);
    assert!(!client.identity().is_connected());
}

#[tokio::test]
async fn reconnect_assigns_a_fresh_connection_id() {
    let (addr, relay) = spawn_relay(true).await;
    let policy = ReconnectPolicy {
        enabled: true,
        max_attempts: 3,
        delay: Duration::from_millis(300),
    };
    let Ok(mut client) = ChatClient::start(&config_for(addr, policy)) else {
        panic!("client must start");
    };

    let StateChange::Connected(first) =
        wait_for(&mut client, |c| matches!(c, StateChange::Connected(_))).await
    else {
        panic!("expected connect");
    };
    assert!(client.submit_admission(&mut AdmissionForm::new("lobby", "alice")));

    let lost = wait_for(&mut client, |c| matches!(c, StateChange::Disconnected(_))).await;
    assert_eq!(lost, StateChange::Disconnected(DisconnectReason::ServerClosed));
    assert!(client.submit_message(&mut "while away".to_string()));

    let StateChange::Connected(second) =
        wait_for(&mut client, |c| matches!(c, StateChange::Connected(_))).await
    else {
        panic!("expected reconnect");
    };
    assert_ne!(first, second);
    assert_eq!(client.identity().connection_id(), Some(&second));
    assert_eq!(relay.connections.load(Ordering::SeqCst), 2);
    assert!(client.admission().is_active());

    // Frames on one socket arrive in order, so once this one is seen the
    // relay has everything sent on the new connection.
    assert!(client.submit_message(&mut "after".to_string()));
    let delivered = tokio::time::timeout(WAIT, async {
        while !relay.received_texts().iter().any(|(_, text)| text == "after") {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
    assert!(delivered.is_ok(), "message after reconnect never arrived");

    assert_eq!(relay.joins_on(0), 1);
    assert_eq!(relay.joins_on(1), 0, "room must not be re-announced");
    assert_eq!(relay.received_texts(), vec![(1, "after".to_string())]);
    client.disconnect();
}

#[tokio::test]
async fn admission_before_connect_still_activates() {
    let (addr, _relay) = spawn_relay(false).await;
    let Ok(mut client) = ChatClient::start(&config_for(addr, ReconnectPolicy::disabled())) else {
        panic!("client must start");
    };

    // The connect acknowledgement has not been processed yet, so the
    // joinroom event is dropped while the state still advances.
    assert!(client.submit_admission(&mut AdmissionForm::new("lobby", "early")));
    assert!(client.admission().is_active());

    assert!(client.submit_message(&mut "too soon".to_string()));
    let Some(message) = client.feed().get(0) else {
        panic!("local echo expected");
    };
    assert_eq!(message.origin_connection_id(), None);

    wait_for(&mut client, |c| matches!(c, StateChange::Connected(_))).await;
    assert_eq!(client.classify(message_at(&client, 0)), Side::Theirs);
    client.disconnect();
}

fn message_at(client: &ChatClient, index: usize) -> &Message {
    match client.feed().get(index) {
        Some(message) => message,
        None => panic!("no message at {index}"),
    }
}
