//! Line-oriented terminal chat client.
//!
//! Plain lines are sent as messages. Commands:
//!   /lang <code>   switch preferred language
//!   /who           list participants
//!   /log           print the log again
//!   /search <q>    find the first matching message
//!   /select <n>    toggle selection of message n
//!   /delete <n>    delete message n (local only)
//!   /delete        delete selected messages
//!   /forward <n>   print message n for copying
//!   /reconnect     retry now instead of waiting
//!   /quit

use anyhow::Result;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;

use lingua_relay::client::{ChatClient, ClientUpdate, ComposeError, DeliveryState, LogEntry};
use lingua_relay::config::ClientConfig;
use lingua_relay::i18n::{Language, LanguageRegistry};

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("lingua_relay=info".parse()?),
        )
        .init();

    let config = ClientConfig::from_env()?;
    info!(
        "Connecting to {} as {} ({})",
        config.relay_url, config.display_name, config.language
    );

    let client = ChatClient::from_config(&config)?;
    let mut updates = client.subscribe();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                if !handle_line(&client, line.trim()) {
                    break;
                }
            }
            update = updates.recv() => match update {
                Ok(ClientUpdate::Log) => render_last(&client),
                Ok(ClientUpdate::Participants) => {
                    println!("* {} online", client.participants().len());
                }
                Ok(ClientUpdate::Notice(notice)) => println!("! {}", notice),
                Err(_) => {}
            }
        }
    }

    client.shutdown().await;
    Ok(())
}

/// Returns `false` when the user asked to quit.
fn handle_line(client: &ChatClient, line: &str) -> bool {
    if line.is_empty() {
        return true;
    }
    let Some(command) = line.strip_prefix('/') else {
        match client.compose(line) {
            Ok(_) => {}
            Err(ComposeError::Offline) => println!("! offline, message not sent ({:?})", client.state()),
            Err(ComposeError::EmptyText) => {}
        }
        return true;
    };

    let (name, arg) = command
        .split_once(' ')
        .map(|(n, a)| (n, a.trim()))
        .unwrap_or((command, ""));

    match name {
        "quit" => return false,
        "lang" => match Language::from_code(arg) {
            Ok(language) => {
                client.change_language(language);
                println!("* language: {} ({})", language.name(), language.native_name());
            }
            Err(e) => {
                let codes: Vec<&str> = LanguageRegistry::get()
                    .list()
                    .iter()
                    .map(|l| l.code)
                    .collect();
                println!("! {} (available: {})", e, codes.join(", "));
            }
        },
        "who" => {
            for participant in client.participants() {
                println!("* {} [{}]", participant.display_name, participant.preferred_language);
            }
        }
        "log" => {
            for (index, entry) in client.log().iter().enumerate() {
                println!("{}", render(index, entry));
            }
        }
        "search" => match client.search(arg) {
            Some(entry) => println!("{}", render(position(client, &entry.id), &entry)),
            None => println!("! no match"),
        },
        "select" => match entry_at(client, arg) {
            Some(entry) => {
                client.toggle_selection(&entry.id);
            }
            None => println!("! no such message"),
        },
        "delete" if arg.is_empty() => {
            println!("* deleted {}", client.delete_selected());
        }
        "delete" => match entry_at(client, arg) {
            Some(entry) => {
                client.delete(&entry.id);
            }
            None => println!("! no such message"),
        },
        "forward" => match entry_at(client, arg).and_then(|entry| client.forward(&entry.id)) {
            Some(text) => println!("{}", text),
            None => println!("! no such message"),
        },
        "reconnect" => {
            if !client.refresh() {
                println!("* already {:?}", client.state());
            }
        }
        other => println!("! unknown command /{}", other),
    }
    true
}

fn entry_at(client: &ChatClient, arg: &str) -> Option<LogEntry> {
    let index: usize = arg.parse().ok()?;
    client.log().into_iter().nth(index)
}

fn position(client: &ChatClient, id: &str) -> usize {
    client
        .log()
        .iter()
        .position(|entry| entry.id == id)
        .unwrap_or(0)
}

fn render_last(client: &ChatClient) {
    let log = client.log();
    if let Some(entry) = log.last() {
        println!("{}", render(log.len() - 1, entry));
    }
}

fn render(index: usize, entry: &LogEntry) -> String {
    let marker = match entry.delivery_state {
        DeliveryState::Pending => "…",
        DeliveryState::Acknowledged => "✓",
        DeliveryState::Delivered => " ",
    };
    let mut line = format!(
        "[{}] {} {} {}: {}",
        index,
        entry.timestamp.format("%H:%M"),
        marker,
        entry.sender_name,
        entry.display_text()
    );
    if entry.translation.is_some() {
        line.push_str(&format!(" (translated from {})", entry.source_language));
    }
    line
}
