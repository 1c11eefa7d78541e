//! Room hub.
//!
//! The hub is the single place where room state changes. It runs as one
//! tokio task that owns the [`ChatRoom`] and processes [`HubEvent`]s in
//! arrival order: operator input from any [`RoomHandle`] and session events
//! re-raised by every bridge go through the same queue.
//!
//! Callers never wait for the hub except for roster snapshots and shutdown,
//! which reply over a oneshot channel.

use std::sync::Arc;

use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::{debug, info};

use super::message::RoomEvent;
use super::room::ChatRoom;
use super::user::{UserId, UserSnapshot};
use crate::config::RoomConfig;
use crate::session::{SessionEvent, SessionFactory};
use crate::{MultichatError, Result};

/// Capacity of the presentation feed. Slow subscribers lose the oldest lines.
const FEED_CAPACITY: usize = 1024;

/// Work item for the hub.
#[derive(Debug)]
pub enum HubEvent {
    /// A line typed by the operator.
    Operator(String),
    /// A command issued by the operator without going through the parser.
    OperatorCommand { name: String, args: Vec<String> },
    /// An event raised by a user's session.
    Session { id: UserId, event: SessionEvent },
    /// Open one more session.
    AddSession,
    SetAutoReconnect(bool),
    SetCommandsEnabled(bool),
    /// Request a roster snapshot.
    Roster(oneshot::Sender<Vec<UserSnapshot>>),
    /// Close every session and stop the hub.
    Shutdown(oneshot::Sender<()>),
}

/// The hub task.
pub struct RoomHub {
    room: ChatRoom,
    initial_sessions: usize,
}

impl RoomHub {
    /// Create the room and spawn its hub task.
    pub fn spawn(config: RoomConfig, factory: Arc<dyn SessionFactory>) -> RoomHandle {
        let (tx, rx) = mpsc::unbounded_channel();
        let (events, _) = broadcast::channel(FEED_CAPACITY);

        let hub = Self {
            initial_sessions: config.initial_sessions,
            room: ChatRoom::new(config, factory, tx.downgrade(), events.clone()),
        };
        tokio::spawn(hub.run(rx));

        RoomHandle { tx, events }
    }

    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<HubEvent>) {
        info!(
            operator = %self.room.operator().name(),
            sessions = self.initial_sessions,
            "room hub started"
        );
        for _ in 0..self.initial_sessions {
            self.room.add_session();
        }

        while let Some(event) = rx.recv().await {
            if let Some(reply) = self.handle_event(event) {
                // Refuse new work before replying so callers see a closed room.
                rx.close();
                let _ = reply.send(());
                break;
            }
        }

        info!("room hub stopped");
    }

    /// Apply one event. Returns the shutdown reply once the hub should stop.
    fn handle_event(&mut self, event: HubEvent) -> Option<oneshot::Sender<()>> {
        match event {
            HubEvent::Operator(text) => self.room.send_as_operator(&text),
            HubEvent::OperatorCommand { name, args } => {
                let operator = self.room.operator().id();
                self.room.run_command(operator, &name, &args);
            }
            HubEvent::Session { id, event } => self.room.handle_session_event(id, event),
            HubEvent::AddSession => {
                self.room.add_session();
            }
            HubEvent::SetAutoReconnect(enabled) => self.room.set_auto_reconnect(enabled),
            HubEvent::SetCommandsEnabled(enabled) => self.room.set_commands_enabled(enabled),
            HubEvent::Roster(reply) => {
                // The requester may have given up waiting.
                let _ = reply.send(self.room.snapshot());
            }
            HubEvent::Shutdown(reply) => {
                self.room.shutdown();
                return Some(reply);
            }
        }
        None
    }
}

/// Cloneable handle to a running room.
#[derive(Debug, Clone)]
pub struct RoomHandle {
    tx: mpsc::UnboundedSender<HubEvent>,
    events: broadcast::Sender<RoomEvent>,
}

impl RoomHandle {
    fn submit(&self, event: HubEvent) -> Result<()> {
        self.tx.send(event).map_err(|e| {
            debug!("room hub is gone, dropping {:?}", e.0);
            MultichatError::RoomClosed
        })
    }

    /// Submit a line as the operator. Prefixed lines run as commands while
    /// commands are enabled.
    pub fn send_as_operator(&self, text: impl Into<String>) -> Result<()> {
        self.submit(HubEvent::Operator(text.into()))
    }

    /// Run a command as the operator, bypassing the parser and the
    /// commands-enabled switch.
    pub fn operator_command(&self, name: impl Into<String>, args: Vec<String>) -> Result<()> {
        self.submit(HubEvent::OperatorCommand {
            name: name.into(),
            args,
        })
    }

    /// Open one more session.
    pub fn add_session(&self) -> Result<()> {
        self.submit(HubEvent::AddSession)
    }

    pub fn set_auto_reconnect(&self, enabled: bool) -> Result<()> {
        self.submit(HubEvent::SetAutoReconnect(enabled))
    }

    pub fn set_commands_enabled(&self, enabled: bool) -> Result<()> {
        self.submit(HubEvent::SetCommandsEnabled(enabled))
    }

    /// Snapshot of the roster, taken after every previously submitted
    /// request has been applied.
    pub async fn roster(&self) -> Result<Vec<UserSnapshot>> {
        let (reply, rx) = oneshot::channel();
        self.submit(HubEvent::Roster(reply))?;
        rx.await.map_err(|_| MultichatError::RoomClosed)
    }

    /// Subscribe to the presentation feed.
    pub fn subscribe(&self) -> broadcast::Receiver<RoomEvent> {
        self.events.subscribe()
    }

    /// Close every session and stop the hub.
    pub async fn shutdown(&self) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.submit(HubEvent::Shutdown(reply))?;
        rx.await.map_err(|_| MultichatError::RoomClosed)
    }

    /// Whether the hub has stopped.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::time::timeout;

    use super::*;
    use crate::chat::ChatMessage;
    use crate::session::LoopbackFactory;

    const WAIT: Duration = Duration::from_secs(2);

    async fn next_line(feed: &mut broadcast::Receiver<RoomEvent>) -> String {
        loop {
            match timeout(WAIT, feed.recv()).await.unwrap().unwrap() {
                RoomEvent::Message(ChatMessage { content, .. }) => return content,
                _ => continue,
            }
        }
    }

    #[tokio::test]
    async fn test_operator_line_reaches_feed() {
        let (factory, _peers) = LoopbackFactory::new();
        let room = RoomHub::spawn(RoomConfig::default(), Arc::new(factory));
        let mut feed = room.subscribe();

        room.send_as_operator("hello").unwrap();
        assert_eq!(next_line(&mut feed).await, "hello");
    }

    #[tokio::test]
    async fn test_roster_starts_with_operator() {
        let (factory, _peers) = LoopbackFactory::new();
        let room = RoomHub::spawn(RoomConfig::default(), Arc::new(factory));

        let roster = room.roster().await.unwrap();
        assert_eq!(roster.len(), 1);
        assert!(roster[0].local);
        assert_eq!(roster[0].name, "Admin");
    }

    #[tokio::test]
    async fn test_initial_sessions_opened() {
        let (factory, mut peers) = LoopbackFactory::new();
        let config = RoomConfig {
            initial_sessions: 2,
            ..RoomConfig::default()
        };
        let _room = RoomHub::spawn(config, Arc::new(factory));

        assert!(timeout(WAIT, peers.recv()).await.unwrap().is_some());
        assert!(timeout(WAIT, peers.recv()).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_session_joins_through_hub() {
        let (factory, mut peers) = LoopbackFactory::new();
        let room = RoomHub::spawn(RoomConfig::default(), Arc::new(factory));
        let mut feed = room.subscribe();

        room.add_session().unwrap();
        let peer = timeout(WAIT, peers.recv()).await.unwrap().unwrap();
        assert_eq!(next_line(&mut feed).await, "Searching for a stranger...");

        peer.accept();
        assert_eq!(next_line(&mut feed).await, "User1 connected!");

        let names: Vec<String> = room
            .roster()
            .await
            .unwrap()
            .into_iter()
            .map(|u| u.name)
            .collect();
        assert_eq!(names, vec!["Admin", "User1"]);
    }

    #[tokio::test]
    async fn test_operator_command_bypasses_switch() {
        let (factory, _peers) = LoopbackFactory::new();
        let room = RoomHub::spawn(RoomConfig::default(), Arc::new(factory));
        let mut feed = room.subscribe();

        room.set_commands_enabled(false).unwrap();
        room.operator_command("name", vec!["Boss".to_string()]).unwrap();

        assert_eq!(next_line(&mut feed).await, "Admin's name is now Boss!");
    }

    #[tokio::test]
    async fn test_shutdown_closes_handle() {
        let (factory, _peers) = LoopbackFactory::new();
        let room = RoomHub::spawn(RoomConfig::default(), Arc::new(factory));

        room.shutdown().await.unwrap();

        assert!(matches!(
            room.send_as_operator("anyone?"),
            Err(MultichatError::RoomClosed)
        ));
        assert!(matches!(room.roster().await, Err(MultichatError::RoomClosed)));
    }
}
