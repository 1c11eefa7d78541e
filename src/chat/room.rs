//! Chat room state.
//!
//! [`ChatRoom`] owns the roster and every rule about who hears what. It is
//! not thread-safe on its own: the hub task is its only owner and feeds it
//! operator input and session events one at a time.

use std::sync::Arc;

use rand::Rng;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};

use super::command::{parse_command, CommandRegistry};
use super::hub::HubEvent;
use super::message::{ChatMessage, RoomEvent};
use super::user::{User, UserId, UserSnapshot};
use crate::config::RoomConfig;
use crate::session::{SessionBridge, SessionEvent, SessionFactory};

/// The room: roster, pending sessions and policy flags.
pub struct ChatRoom {
    /// Connected members. The local operator is always at index 0.
    roster: Vec<User>,
    /// Sessions created but not yet paired with a stranger.
    pending: Vec<User>,
    auto_reconnect: bool,
    commands_enabled: bool,
    config: RoomConfig,
    commands: CommandRegistry,
    factory: Arc<dyn SessionFactory>,
    hub: mpsc::WeakUnboundedSender<HubEvent>,
    events: broadcast::Sender<RoomEvent>,
    next_user_number: u64,
}

impl ChatRoom {
    /// Create a room holding only the local operator.
    pub(crate) fn new(
        config: RoomConfig,
        factory: Arc<dyn SessionFactory>,
        hub: mpsc::WeakUnboundedSender<HubEvent>,
        events: broadcast::Sender<RoomEvent>,
    ) -> Self {
        Self {
            roster: vec![User::local(config.operator_name.clone())],
            pending: Vec::new(),
            auto_reconnect: config.auto_reconnect,
            commands_enabled: config.commands_enabled,
            config,
            commands: CommandRegistry::new(),
            factory,
            hub,
            events,
            next_user_number: 1,
        }
    }

    /// The local operator.
    pub fn operator(&self) -> &User {
        &self.roster[0]
    }

    /// Connected members, operator first.
    pub fn roster(&self) -> &[User] {
        &self.roster
    }

    /// Number of sessions still waiting for a stranger.
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn user(&self, id: UserId) -> Option<&User> {
        self.roster.iter().find(|u| u.id() == id)
    }

    pub fn user_mut(&mut self, id: UserId) -> Option<&mut User> {
        self.roster.iter_mut().find(|u| u.id() == id)
    }

    /// First member whose name matches, ignoring case.
    pub fn find_user_by_name(&self, name: &str) -> Option<&User> {
        self.roster.iter().find(|u| u.is_named(name))
    }

    pub fn auto_reconnect(&self) -> bool {
        self.auto_reconnect
    }

    pub fn set_auto_reconnect(&mut self, enabled: bool) {
        info!(enabled, "auto-reconnect changed");
        self.auto_reconnect = enabled;
    }

    pub fn commands_enabled(&self) -> bool {
        self.commands_enabled
    }

    pub fn set_commands_enabled(&mut self, enabled: bool) {
        info!(enabled, "operator commands changed");
        self.commands_enabled = enabled;
    }

    /// Snapshot of the roster for the presentation layer.
    pub fn snapshot(&self) -> Vec<UserSnapshot> {
        self.roster.iter().map(User::snapshot).collect()
    }

    /// Handle a line typed by the operator.
    ///
    /// With commands enabled a prefixed line runs as an operator command.
    /// Anything else is shown locally and sent to every remote member.
    pub fn send_as_operator(&mut self, text: &str) {
        if text.trim().is_empty() {
            return;
        }

        if self.commands_enabled {
            if let Some(line) = parse_command(text, self.config.command_prefix) {
                let operator = self.operator().id();
                self.run_command(operator, &line.name, &line.args);
                return;
            }
        }

        let operator = self.operator();
        let line = format!("{}: {}", operator.name(), text);
        let operator_id = operator.id();
        self.display(ChatMessage::from_user(operator, text));
        self.broadcast(&line, Some(operator_id));
    }

    /// Run a command on behalf of `actor`.
    ///
    /// Returns false when the actor is unknown or has no such command. The
    /// response goes back to the actor only.
    pub fn run_command(&mut self, actor: UserId, name: &str, args: &[String]) -> bool {
        let Some(user) = self.user(actor) else {
            return false;
        };
        let Some(command) = self.commands.lookup(user.privilege(), name) else {
            debug!(user = %actor, command = name, "ignoring unknown command");
            return false;
        };

        debug!(user = %actor, command = name, ?args, "running command");
        let response = command(self, actor, args);
        if !response.is_empty() {
            self.deliver(actor, &response);
        }

        self.notify_roster_changed();
        true
    }

    /// Send `text` to every member except `exclude`.
    ///
    /// The operator receives it on the local display.
    pub fn broadcast(&self, text: &str, exclude: Option<UserId>) {
        for user in self.roster.iter().filter(|u| Some(u.id()) != exclude) {
            self.deliver_to(user, text);
        }
    }

    /// Send `text` to one member.
    pub fn deliver(&self, id: UserId, text: &str) {
        match self.user(id) {
            Some(user) => self.deliver_to(user, text),
            None => debug!(user = %id, "dropping delivery to departed user"),
        }
    }

    fn deliver_to(&self, user: &User, text: &str) {
        match user.bridge() {
            Some(bridge) => bridge.send(text),
            None => self.display(ChatMessage::status(text)),
        }
    }

    /// Send a chat line to every remote member except its author.
    ///
    /// The operator has already seen the attributed line.
    fn relay(&self, text: &str, from: UserId) {
        for user in self
            .roster
            .iter()
            .filter(|u| !u.is_local() && u.id() != from)
        {
            self.deliver_to(user, text);
        }
    }

    fn display(&self, message: ChatMessage) {
        // No subscribers is fine; the feed is best effort.
        let _ = self.events.send(RoomEvent::Message(message));
    }

    fn notify_roster_changed(&self) {
        let _ = self.events.send(RoomEvent::RosterChanged);
    }

    /// Open a new session and start looking for a stranger.
    ///
    /// The user stays pending until the session reports a partner.
    pub fn add_session(&mut self) -> Option<UserId> {
        let Some(hub) = self.hub.upgrade() else {
            warn!("room hub is gone, not opening a session");
            return None;
        };

        let id = UserId::new();
        let name = self.next_placeholder_name();
        let bridge = SessionBridge::spawn(id, self.factory.as_ref(), hub);
        bridge.connect();

        info!(user = %id, name = %name, "opening session");
        self.pending.push(User::remote(id, name, bridge));
        Some(id)
    }

    fn next_placeholder_name(&mut self) -> String {
        if self.config.random_names {
            return random_name();
        }
        let name = format!("User{}", self.next_user_number);
        self.next_user_number += 1;
        name
    }

    /// Remove a member or pending session and tear its session down.
    ///
    /// The operator can never be removed.
    pub fn remove_user(&mut self, id: UserId) -> Option<User> {
        let user = if let Some(pos) = self.roster.iter().position(|u| u.id() == id) {
            if self.roster[pos].is_local() {
                return None;
            }
            self.roster.remove(pos)
        } else if let Some(pos) = self.pending.iter().position(|u| u.id() == id) {
            self.pending.remove(pos)
        } else {
            return None;
        };

        if let Some(bridge) = user.bridge() {
            bridge.disconnect();
        }
        debug!(user = %id, name = %user.name(), "user removed");
        Some(user)
    }

    fn is_known(&self, id: UserId) -> bool {
        self.user(id).is_some() || self.pending.iter().any(|u| u.id() == id)
    }

    /// Apply an event raised by a user's session.
    pub fn handle_session_event(&mut self, id: UserId, event: SessionEvent) {
        if !self.is_known(id) {
            debug!(user = %id, ?event, "ignoring event from departed session");
            return;
        }

        match event {
            SessionEvent::WaitingForPartner => {
                self.display(ChatMessage::status("Searching for a stranger..."));
            }
            SessionEvent::Connected => self.on_connected(id),
            SessionEvent::Message(text) => self.on_message(id, text),
            SessionEvent::Typing | SessionEvent::StoppedTyping => {
                self.notify_roster_changed();
            }
            SessionEvent::Disconnected => self.on_disconnected(id),
            SessionEvent::CaptchaRequired(challenge) => {
                warn!(user = %id, "session requires a captcha");
                self.display(ChatMessage::status(format!(
                    "Captcha required! {challenge}"
                )));
            }
            SessionEvent::CaptchaRefused => {
                warn!(user = %id, "captcha refused, dropping session");
                self.display(ChatMessage::status("Captcha refused!"));
                self.remove_user(id);
                self.notify_roster_changed();
            }
            SessionEvent::UnhandledResponse { raw, fault } => {
                // A session that never paired is not connected either.
                let fault = fault || self.user(id).is_none();
                warn!(user = %id, fault, "unhandled session response: {}", raw);
                self.display(ChatMessage::status(format!("Unhandled response: {raw}!")));
                if fault {
                    self.remove_user(id);
                    self.notify_roster_changed();
                }
            }
            SessionEvent::PeerCount(count) => {
                let _ = self.events.send(RoomEvent::PeerCount(count));
            }
        }
    }

    fn on_connected(&mut self, id: UserId) {
        let Some(pos) = self.pending.iter().position(|u| u.id() == id) else {
            debug!(user = %id, "ignoring repeated connect");
            return;
        };

        let user = self.pending.remove(pos);
        let name = user.name().to_string();
        self.roster.push(user);
        info!(user = %id, name = %name, "user joined");

        self.deliver(id, &self.config.welcome_for(&name));
        self.broadcast(&format!("{name} connected!"), Some(id));
        self.notify_roster_changed();
    }

    fn on_message(&mut self, id: UserId, text: String) {
        let Some(user) = self.user(id) else {
            debug!(user = %id, "ignoring message from unpaired session");
            return;
        };

        self.display(ChatMessage::from_user(user, text.as_str()));
        let muted = user.is_muted();
        let line = format!("{}: {}", user.name(), text);

        if let Some(command) = parse_command(&text, self.config.command_prefix) {
            self.run_command(id, &command.name, &command.args);
        } else if !muted {
            self.relay(&line, id);
        }

        self.notify_roster_changed();
    }

    fn on_disconnected(&mut self, id: UserId) {
        let was_member = self.user(id).is_some();
        let Some(user) = self.remove_user(id) else {
            return;
        };
        info!(user = %id, name = %user.name(), "user disconnected");

        if self.auto_reconnect {
            self.add_session();
        }

        if was_member {
            self.broadcast(&format!("{} disconnected!", user.name()), None);
            self.notify_roster_changed();
        }
    }

    /// Tear down every remote session. The operator stays.
    pub fn shutdown(&mut self) {
        let remote: Vec<UserId> = self
            .roster
            .iter()
            .chain(self.pending.iter())
            .filter(|u| !u.is_local())
            .map(User::id)
            .collect();

        info!(sessions = remote.len(), "closing all sessions");
        for id in remote {
            self.remove_user(id);
        }
        self.notify_roster_changed();
    }
}

/// A random lowercase word of 4 to 9 letters.
fn random_name() -> String {
    let mut rng = rand::rng();
    let len = rng.random_range(4..=9);
    (0..len)
        .map(|_| char::from(rng.random_range(b'a'..=b'z')))
        .collect()
}
