//! Output feed for the presentation layer.

use chrono::{DateTime, Utc};

use super::user::{Privilege, User, UserId};

/// Who a displayed message is attributed to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageSender {
    /// Sender id.
    pub id: UserId,
    /// Sender's display name at the time of the message.
    pub name: String,
    /// Sender's privilege at the time of the message.
    pub privilege: Privilege,
    /// Whether the sender is the local operator.
    pub local: bool,
}

impl From<&User> for MessageSender {
    fn from(user: &User) -> Self {
        Self {
            id: user.id(),
            name: user.name().to_string(),
            privilege: user.privilege(),
            local: user.is_local(),
        }
    }
}

/// A line for the operator's display.
#[derive(Debug, Clone)]
pub struct ChatMessage {
    /// Attributed sender, or `None` for status and room notices.
    pub sender: Option<MessageSender>,
    /// Message content.
    pub content: String,
    /// Timestamp when the message was produced.
    pub timestamp: DateTime<Utc>,
}

impl ChatMessage {
    /// Create a message attributed to a user.
    pub fn from_user(user: &User, content: impl Into<String>) -> Self {
        Self {
            sender: Some(MessageSender::from(user)),
            content: content.into(),
            timestamp: Utc::now(),
        }
    }

    /// Create an unattributed status or notice line.
    pub fn status(content: impl Into<String>) -> Self {
        Self {
            sender: None,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }

    /// Format the message for display.
    pub fn format(&self) -> String {
        match &self.sender {
            Some(sender) => format!("{}\t{}", sender.name, self.content),
            None => self.content.clone(),
        }
    }
}

/// Event published by the room to its subscribers.
#[derive(Debug, Clone)]
pub enum RoomEvent {
    /// A line to display.
    Message(ChatMessage),
    /// The roster or a user's visible state changed.
    RosterChanged,
    /// A session reported how many people are online.
    PeerCount(u64),
}
