//! roomchat terminal front end.
//!
//! Asks for a room and a display name on stdin, then sends every further
//! line as a chat message. The conversation is printed as it changes: your
//! own messages are indented to the right, everyone else's are not.

use anyhow::Context;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

use roomchat_client::domain::{AdmissionForm, Message, Side};
use roomchat_client::protocol::EVENT_WELCOME;
use roomchat_client::{ChatClient, ClientConfig, StateChange};

const MINE_INDENT: usize = 24;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logs go to stderr so they do not interleave with the conversation
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = ClientConfig::from_env().context("loading configuration")?;
    tracing::info!(relay = %config.relay_url, "starting roomchat");

    let mut client = ChatClient::start(&config).context("starting chat session")?;
    client.on(EVENT_WELCOME, |data| tracing::debug!(%data, "welcome handler"));

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut form = AdmissionForm::default();
    let mut draft = String::new();
    prompt(&client, &form);

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line.context("reading stdin")? else {
                    break;
                };
                on_line(&mut client, &mut form, &mut draft, line);
                prompt(&client, &form);
            }
            change = client.next_change() => {
                let Some(change) = change else {
                    println!("* connection closed");
                    break;
                };
                on_change(&client, &change);
            }
        }
    }

    if let Some(change) = client.disconnect() {
        on_change(&client, &change);
    }
    Ok(())
}

/// Routes one input line to the admission form or the composer.
fn on_line(client: &mut ChatClient, form: &mut AdmissionForm, draft: &mut String, line: String) {
    if client.admission().is_active() {
        *draft = line;
        let before = client.feed().len();
        if client.submit_message(draft) {
            for message in client.feed().messages().iter().skip(before) {
                print_message(client, message);
            }
        }
        return;
    }

    if form.room.is_empty() {
        form.room = line;
        return;
    }
    form.username = line;
    if client.submit_admission(form) {
        if let Some(membership) = client.admission().membership() {
            println!(
                "* joined {} as {}",
                membership.room_id(),
                membership.display_name()
            );
        }
    } else {
        // Rejected input is not reported; start the form over.
        *form = AdmissionForm::default();
    }
}

fn on_change(client: &ChatClient, change: &StateChange) {
    match change {
        StateChange::Connected(id) => println!("* connected ({id})"),
        StateChange::Disconnected(reason) => println!("* disconnected: {reason}"),
        StateChange::Welcome(data) => match data.as_str() {
            Some(text) => println!("* {text}"),
            None => println!("* {data}"),
        },
        StateChange::MessageAppended { index } => {
            if let Some(message) = client.feed().get(*index) {
                print_message(client, message);
            }
        }
        StateChange::Unhandled { .. } => {}
    }
}

fn print_message(client: &ChatClient, message: &Message) {
    match client.classify(message) {
        Side::Mine => println!("{:>MINE_INDENT$}  {}", "you:", message.text()),
        Side::Theirs => println!("{}: {}", message.display_name(), message.text()),
    }
}

fn prompt(client: &ChatClient, form: &AdmissionForm) {
    if client.admission().is_active() {
        return;
    }
    if form.room.is_empty() {
        println!("room name:");
    } else {
        println!("username:");
    }
}
