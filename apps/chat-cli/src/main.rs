//! Terminal chat client.
//!
//! Usage:
//!   chatlink --token <session token> --room r1
//!   CHATLINK_ENV=production chatlink --room general

mod commands;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

use chatlink_connection::credentials::default_session_path;
use chatlink_connection::{ChatConfig, ConnectionManager, ConnectionStatus, SessionStore, WsTransport};
use chatlink_session::{ChatEvent, ChatSession};

use commands::{HELP, Input};

#[derive(Parser)]
#[command(name = "chatlink", about = "Terminal client for chatlink rooms")]
struct Args {
    /// Session token. Stored in the session file for later runs.
    #[arg(long, env = "CHATLINK_TOKEN")]
    token: Option<String>,

    /// Base URL of the chat server (http, https, ws or wss)
    #[arg(long)]
    url: Option<String>,

    /// Config file (defaults to the platform config directory)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Rooms to join once connected. The first one is current.
    #[arg(long = "room")]
    rooms: Vec<String>,

    /// Do not subscribe to room notifications
    #[arg(long)]
    no_notifications: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,chatlink=debug")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let mut cfg = match &args.config {
        Some(path) => {
            let mut cfg = ChatConfig::load_from(path)?;
            cfg.apply_env_overrides()?;
            cfg
        }
        None => ChatConfig::load()?,
    };
    if let Some(url) = &args.url {
        cfg.set_base_url(url.clone());
    }

    let store = match default_session_path() {
        Some(path) => SessionStore::open(path).context("failed to open session store")?,
        None => SessionStore::in_memory(),
    };
    if let Some(token) = &args.token {
        store.set_token(token).context("failed to save session token")?;
    }

    let conn = ConnectionManager::from_config(&cfg, Arc::new(store), Arc::new(WsTransport::new()))
        .context("invalid server URL")?;
    tracing::info!(url = %cfg.base_url(), environment = ?cfg.environment, "starting chat client");

    let mut session = ChatSession::new(conn);
    session
        .connect()
        .context("cannot connect; pass --token or set CHATLINK_TOKEN")?;

    run(&mut session, &args).await;

    session.disconnect();
    Ok(())
}

async fn run(session: &mut ChatSession, args: &Args) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut current = args.rooms.first().cloned();
    let mut joined_initial = false;

    println!("{HELP}");

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,

            line = lines.next_line() => {
                let line = match line {
                    Ok(Some(line)) => line,
                    Ok(None) => break,
                    Err(e) => {
                        tracing::warn!("stdin read failed: {e}");
                        break;
                    }
                };
                if !handle_input(session, &mut current, Input::parse(&line)) {
                    break;
                }
            }

            event = session.next_event() => {
                let Some(event) = event else { break };
                if event == ChatEvent::Status(ConnectionStatus::Connected) && !joined_initial {
                    joined_initial = true;
                    join_initial(session, args);
                }
                print_event(&event);
            }
        }
    }
}

/// First connect only; later reconnects restore rooms inside the session.
fn join_initial(session: &mut ChatSession, args: &Args) {
    for room in &args.rooms {
        if session.subscribe_to_room(room).is_none() {
            tracing::warn!(room = %room, "failed to join room");
        }
    }
    if !args.no_notifications && session.subscribe_to_user_queue().is_none() {
        tracing::warn!("failed to subscribe to room notifications");
    }
}

/// Returns `false` when the user asked to quit.
fn handle_input(session: &mut ChatSession, current: &mut Option<String>, input: Input) -> bool {
    match input {
        Input::Say(text) => match current.as_deref() {
            Some(room) => {
                if !session.send_chat_message(room, &text, None) {
                    println!("! not sent ({})", session.status());
                }
            }
            None => println!("! no current room, /join one first"),
        },
        Input::Join(room) => {
            if session.subscribe_to_room(&room).is_some() {
                println!("* joined {room}");
                *current = Some(room);
            } else {
                println!("! cannot join {room} ({})", session.status());
            }
        }
        Input::Leave(room) => {
            if session.leave_room(&room) {
                println!("* left {room}");
            }
            if current.as_deref() == Some(room.as_str()) {
                *current = None;
            }
        }
        Input::Create { name, participants } => {
            if !session.create_room(&name, &participants) {
                println!("! not sent ({})", session.status());
            }
        }
        Input::Info(room) => {
            if !session.request_room_info(&room) {
                println!("! not sent ({})", session.status());
            }
        }
        Input::History => {
            for m in session.messages() {
                println!("[{}] <{}> {}", m.room_id, m.sender.nickname, m.content);
            }
        }
        Input::Clear => session.clear_messages(),
        Input::Quit => return false,
        Input::Empty => {}
        Input::Invalid(line) => println!("! unknown command: {line}\n{HELP}"),
    }
    true
}

fn print_event(event: &ChatEvent) {
    match event {
        ChatEvent::Status(status) => println!("* {status}"),
        ChatEvent::Error(e) => println!("! {e}"),
        ChatEvent::ReconnectScheduled { delay } => {
            println!("* reconnecting in {} ms", delay.as_millis());
        }
        ChatEvent::MessageAppended(m) => {
            println!("[{}] <{}> {}", m.room_id, m.sender.nickname, m.content);
        }
        ChatEvent::RoomEvent { room_id, frame } => {
            println!("[{room_id}] {} {}", frame.frame_type, frame.payload);
        }
        ChatEvent::RoomNotification(routed) => println!("* room update: {routed:?}"),
        ChatEvent::Undecodable { destination, body } => {
            println!("! undecodable frame on {destination}: {body}");
        }
    }
}
