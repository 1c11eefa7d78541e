//! Test helpers for room scenario tests.
//!
//! Provides TestRoom and TestStranger, which drive a running room hub over
//! loopback sessions.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc};
use tokio::time::timeout;

use multichat::config::RoomConfig;
use multichat::session::{LoopbackFactory, LoopbackPeer};
use multichat::{RoomEvent, RoomHandle, RoomHub, UserSnapshot};

/// Default timeout for test operations.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Welcome template that makes the assigned name easy to read back.
const WELCOME_PREFIX: &str = "welcome ";

/// Whispered to a stranger to mark the end of its inbox.
const MARK: &str = "end-of-inbox";

/// Room configuration used by the tests.
pub fn test_config() -> RoomConfig {
    RoomConfig {
        welcome_message: format!("{WELCOME_PREFIX}{{name}}"),
        ..RoomConfig::default()
    }
}

/// A running room with its operator feed and loopback strangers.
pub struct TestRoom {
    pub room: RoomHandle,
    feed: broadcast::Receiver<RoomEvent>,
    peers: mpsc::UnboundedReceiver<LoopbackPeer>,
}

impl TestRoom {
    /// Start a room with the test configuration.
    pub fn start() -> Self {
        Self::with_config(test_config())
    }

    /// Start a room with a custom configuration.
    pub fn with_config(config: RoomConfig) -> Self {
        let (factory, peers) = LoopbackFactory::new();
        let room = RoomHub::spawn(config, Arc::new(factory));
        let feed = room.subscribe();
        Self { room, feed, peers }
    }

    /// Open a session and pair it with a stranger.
    pub async fn join(&mut self) -> TestStranger {
        self.room.add_session().unwrap();
        self.accept_next().await
    }

    /// The stranger side of the next session the room opens, unpaired.
    pub async fn next_session(&mut self) -> LoopbackPeer {
        timeout(DEFAULT_TIMEOUT, self.peers.recv())
            .await
            .expect("timed out waiting for a session")
            .expect("factory dropped")
    }

    /// Pair the next session the room opens on its own.
    pub async fn accept_next(&mut self) -> TestStranger {
        let peer = self.next_session().await;
        peer.accept();

        let mut stranger = TestStranger {
            name: String::new(),
            peer,
        };
        let welcome = stranger.next_line().await;
        stranger.name = welcome
            .strip_prefix(WELCOME_PREFIX)
            .expect("first line should be the welcome")
            .to_string();
        stranger
    }

    /// Next line shown on the operator's display.
    pub async fn next_line(&mut self) -> String {
        loop {
            let event = timeout(DEFAULT_TIMEOUT, self.feed.recv())
                .await
                .expect("timed out waiting for the operator feed")
                .expect("feed closed");
            if let RoomEvent::Message(msg) = event {
                return msg.content;
            }
        }
    }

    /// Skip operator lines until `text` shows up.
    pub async fn wait_for_line(&mut self, text: &str) {
        while self.next_line().await != text {}
    }

    /// Every operator line shown until the room has caught up.
    pub async fn drain_lines(&mut self) -> Vec<String> {
        self.room.send_as_operator("/who").unwrap();
        let mut lines = Vec::new();
        loop {
            let line = self.next_line().await;
            if line.contains(" users: ") {
                return lines;
            }
            lines.push(line);
        }
    }

    pub async fn roster(&self) -> Vec<UserSnapshot> {
        self.room.roster().await.unwrap()
    }

    pub async fn names(&self) -> Vec<String> {
        self.roster().await.into_iter().map(|u| u.name).collect()
    }
}

/// The stranger side of one loopback session.
pub struct TestStranger {
    pub name: String,
    pub peer: LoopbackPeer,
}

impl TestStranger {
    pub fn say(&self, text: &str) {
        self.peer.say(text);
    }

    /// Next line the room sent to this stranger.
    pub async fn next_line(&mut self) -> String {
        timeout(DEFAULT_TIMEOUT, self.peer.recv())
            .await
            .expect("timed out waiting for a line")
            .expect("session dropped")
    }

    /// Everything sent to this stranger until the room has caught up.
    pub async fn drain(&mut self, room: &RoomHandle) -> Vec<String> {
        room.send_as_operator(format!("/w {} {MARK}", self.name))
            .unwrap();
        let marker = format!(": whispered: {MARK}");
        let mut lines = Vec::new();
        loop {
            let line = self.next_line().await;
            if line.ends_with(&marker) {
                return lines;
            }
            lines.push(line);
        }
    }

    /// Wait until the room has torn this session down.
    pub async fn wait_until_dropped(&mut self) {
        timeout(DEFAULT_TIMEOUT, async {
            while self.peer.recv().await.is_some() {}
        })
        .await
        .expect("session was not dropped");
    }
}
