//! External chat session interface.
//!
//! A session is one connection to a remote chat service that pairs us with a
//! single stranger. The room never looks at the wire protocol; it only sees
//! the [`SessionEvent`] vocabulary and the three operations on
//! [`ChatSession`].

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::Result;

mod bridge;
pub mod lobby;
pub mod loopback;

pub use bridge::SessionBridge;
pub use lobby::{LobbyFactory, LobbyServer, LobbySession};
pub use loopback::{LoopbackFactory, LoopbackPeer, LoopbackSession};

/// Event raised by an external session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// The service is still looking for a partner.
    WaitingForPartner,
    /// A partner has been found.
    Connected,
    /// The partner sent a line of text.
    Message(String),
    /// The partner started typing.
    Typing,
    /// The partner stopped typing.
    StoppedTyping,
    /// The partner (or the service) ended the conversation.
    Disconnected,
    /// The service wants a captcha solved before pairing.
    CaptchaRequired(String),
    /// The service rejected a captcha answer.
    CaptchaRefused,
    /// A response the session could not interpret.
    ///
    /// `fault` is the session's own classification: `true` means the session
    /// is unusable and should be torn down.
    UnhandledResponse {
        /// Raw response text.
        raw: String,
        /// Whether the response represents a session fault.
        fault: bool,
    },
    /// Number of people the service reports online.
    PeerCount(u64),
}

/// Channel a session raises its events on.
pub type SessionEvents = mpsc::UnboundedSender<SessionEvent>;

/// One connection to the external chat service.
///
/// Implementations must return from every method promptly. Long-running work
/// (waiting for a partner, reading the socket) belongs in tasks the session
/// spawns itself, reporting back through its [`SessionEvents`] channel.
#[async_trait]
pub trait ChatSession: Send {
    /// Start looking for a partner.
    async fn connect(&mut self) -> Result<()>;

    /// End the conversation.
    async fn disconnect(&mut self) -> Result<()>;

    /// Send a line of text to the partner.
    async fn send(&mut self, text: &str) -> Result<()>;

    /// Whether the session currently has a live partner.
    fn is_connected(&self) -> bool;
}

/// Creates sessions on demand.
pub trait SessionFactory: Send + Sync {
    /// Create a fresh session that raises its events on `events`.
    fn create(&self, events: SessionEvents) -> Box<dyn ChatSession>;
}
