//! Session bridge.
//!
//! Each remote user owns one [`SessionBridge`]. The bridge runs a worker task
//! that owns the external session: it executes connect/disconnect/send
//! requests one at a time and re-raises every session event to the hub,
//! tagged with the user's id. Callers never wait on the session.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::timeout;
use tracing::{debug, warn};

use super::{ChatSession, SessionEvent, SessionFactory};
use crate::chat::{HubEvent, UserId};

/// Longest a single send may take before the partner counts as gone.
const SEND_TIMEOUT: Duration = Duration::from_secs(10);

/// Request for the bridge worker.
#[derive(Debug)]
enum BridgeCommand {
    Connect,
    Send(String),
    Disconnect,
}

/// State the worker derives from session events.
#[derive(Debug, Default)]
struct BridgeState {
    typing: AtomicBool,
}

/// Handle to a remote user's session worker.
#[derive(Debug)]
pub struct SessionBridge {
    id: UserId,
    commands: mpsc::UnboundedSender<BridgeCommand>,
    state: Arc<BridgeState>,
}

impl SessionBridge {
    /// Create a session through `factory` and spawn its worker.
    pub(crate) fn spawn(
        id: UserId,
        factory: &dyn SessionFactory,
        hub: mpsc::UnboundedSender<HubEvent>,
    ) -> Self {
        Self::spawn_with_send_timeout(id, factory, hub, SEND_TIMEOUT)
    }

    pub(crate) fn spawn_with_send_timeout(
        id: UserId,
        factory: &dyn SessionFactory,
        hub: mpsc::UnboundedSender<HubEvent>,
        send_timeout: Duration,
    ) -> Self {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let state = Arc::new(BridgeState::default());

        let worker = BridgeWorker {
            id,
            session: factory.create(event_tx),
            commands: command_rx,
            events: event_rx,
            hub,
            state: Arc::clone(&state),
            send_timeout,
        };
        tokio::spawn(worker.run());

        Self {
            id,
            commands: command_tx,
            state,
        }
    }

    /// Ask the session to start looking for a partner.
    pub fn connect(&self) {
        self.request(BridgeCommand::Connect);
    }

    /// Ask the session to disconnect and stop the worker.
    pub fn disconnect(&self) {
        self.request(BridgeCommand::Disconnect);
    }

    /// Queue a line of text for the partner.
    pub fn send(&self, text: impl Into<String>) {
        self.request(BridgeCommand::Send(text.into()));
    }

    /// Whether the partner is currently typing.
    pub fn is_typing(&self) -> bool {
        self.state.typing.load(Ordering::Relaxed)
    }

    fn request(&self, command: BridgeCommand) {
        if self.commands.send(command).is_err() {
            debug!(user = %self.id, "session bridge already stopped");
        }
    }
}

struct BridgeWorker {
    id: UserId,
    session: Box<dyn ChatSession>,
    commands: mpsc::UnboundedReceiver<BridgeCommand>,
    events: mpsc::UnboundedReceiver<SessionEvent>,
    hub: mpsc::UnboundedSender<HubEvent>,
    state: Arc<BridgeState>,
    send_timeout: Duration,
}

impl BridgeWorker {
    async fn run(mut self) {
        debug!(user = %self.id, "session bridge started");

        loop {
            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(BridgeCommand::Connect) => self.connect().await,
                    Some(BridgeCommand::Send(text)) => self.send(&text).await,
                    Some(BridgeCommand::Disconnect) | None => {
                        self.shutdown().await;
                        break;
                    }
                },
                Some(event) = self.events.recv() => {
                    let finished = event == SessionEvent::Disconnected;
                    if !self.forward(event) || finished {
                        break;
                    }
                }
            }
        }

        debug!(user = %self.id, "session bridge stopped");
    }

    async fn connect(&mut self) {
        if let Err(e) = self.session.connect().await {
            warn!(user = %self.id, "failed to connect session: {}", e);
            self.forward(SessionEvent::UnhandledResponse {
                raw: e.to_string(),
                fault: true,
            });
        }
    }

    /// Send one line. A partner that stops reading is reported as a fault
    /// so a queued disconnect is not stuck behind a blocked write.
    async fn send(&mut self, text: &str) {
        match timeout(self.send_timeout, self.session.send(text)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(user = %self.id, "failed to send to session: {}", e),
            Err(_) => {
                warn!(user = %self.id, "send to session timed out");
                self.forward(SessionEvent::UnhandledResponse {
                    raw: "send timed out".to_string(),
                    fault: true,
                });
            }
        }
    }

    async fn shutdown(&mut self) {
        self.state.typing.store(false, Ordering::Relaxed);
        if self.session.is_connected() {
            if let Err(e) = self.session.disconnect().await {
                warn!(user = %self.id, "failed to disconnect session: {}", e);
            }
        }
    }

    /// Update derived state and pass the event to the hub.
    ///
    /// An unhandled response from a session that no longer reports itself
    /// connected is raised as a fault. Returns false once the hub is gone.
    fn forward(&mut self, event: SessionEvent) -> bool {
        let event = match event {
            SessionEvent::UnhandledResponse { raw, fault } => SessionEvent::UnhandledResponse {
                raw,
                fault: fault || !self.session.is_connected(),
            },
            other => other,
        };

        match event {
            SessionEvent::Typing => self.state.typing.store(true, Ordering::Relaxed),
            SessionEvent::StoppedTyping
            | SessionEvent::Message(_)
            | SessionEvent::Disconnected => self.state.typing.store(false, Ordering::Relaxed),
            _ => {}
        }

        self.hub
            .send(HubEvent::Session { id: self.id, event })
            .is_ok()
    }
}
