use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;
use tracing::{error, info, warn};

use multichat::session::LobbyServer;
use multichat::{Config, RoomEvent, RoomHandle, RoomHub};

#[tokio::main]
async fn main() {
    // Load configuration
    let config = match Config::load_with_env("config.toml") {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load config.toml: {e}");
            eprintln!("Using default configuration.");
            let mut config = Config::default();
            config.apply_env_overrides();
            config
        }
    };

    // Initialize logging
    if let Err(e) = multichat::logging::init(&config.logging) {
        eprintln!("Failed to initialize logging: {e}");
        // Fall back to console-only logging
        multichat::logging::init_console_only(&config.logging.level);
    }

    if let Err(e) = config.validate() {
        error!("Invalid configuration: {}", e);
        std::process::exit(1);
    }

    info!("multichat - moderated multi-stranger chat");

    let lobby = match LobbyServer::bind(&config.server).await {
        Ok(lobby) => lobby,
        Err(e) => {
            error!("Failed to start stranger lobby: {}", e);
            std::process::exit(1);
        }
    };

    let room = RoomHub::spawn(config.room.clone(), Arc::new(lobby.start()));
    tokio::spawn(render(room.subscribe()));

    let input = tokio::spawn(read_operator_input(room.clone()));

    tokio::select! {
        _ = input => info!("Operator input closed"),
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                warn!("Failed to listen for ctrl-c: {}", e);
            }
            info!("Interrupted");
        }
    }

    if let Err(e) = room.shutdown().await {
        warn!("Room already closed: {}", e);
    }
    info!("Goodbye");
}

/// Print the room feed to stdout.
async fn render(mut feed: tokio::sync::broadcast::Receiver<RoomEvent>) {
    loop {
        match feed.recv().await {
            Ok(RoomEvent::Message(msg)) => {
                println!("[{}] {}", msg.timestamp.format("%H:%M:%S"), msg.format());
            }
            Ok(RoomEvent::PeerCount(count)) => println!("-- {count} strangers online"),
            Ok(RoomEvent::RosterChanged) => {}
            Err(RecvError::Lagged(skipped)) => warn!("Display fell behind by {} lines", skipped),
            Err(RecvError::Closed) => break,
        }
    }
}

/// Feed stdin lines to the room as operator input.
async fn read_operator_input(room: RoomHandle) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                if room.send_as_operator(line).is_err() {
                    break;
                }
            }
            Ok(None) => break,
            Err(e) => {
                error!("Failed to read operator input: {}", e);
                break;
            }
        }
    }
}
