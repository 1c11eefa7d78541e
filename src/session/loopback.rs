//! In-process session backend.
//!
//! Every session created by a [`LoopbackFactory`] is paired with a
//! [`LoopbackPeer`] that plays the stranger: it decides when the session
//! connects, what the stranger says, and sees everything the room sends.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::{ChatSession, SessionEvent, SessionEvents, SessionFactory};
use crate::{MultichatError, Result};

#[derive(Debug, Default)]
struct Link {
    connected: AtomicBool,
    disconnect_requested: AtomicBool,
}

/// Factory handing out loopback sessions.
#[derive(Debug, Clone)]
pub struct LoopbackFactory {
    peers: mpsc::UnboundedSender<LoopbackPeer>,
}

impl LoopbackFactory {
    /// Create a factory and the receiver its peers are delivered on.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<LoopbackPeer>) {
        let (peers, rx) = mpsc::unbounded_channel();
        (Self { peers }, rx)
    }
}

impl SessionFactory for LoopbackFactory {
    fn create(&self, events: SessionEvents) -> Box<dyn ChatSession> {
        let (outbound, inbox) = mpsc::unbounded_channel();
        let link = Arc::new(Link::default());

        let peer = LoopbackPeer {
            events: events.clone(),
            inbox,
            link: Arc::clone(&link),
        };
        // Nobody listening for peers just means nobody plays the stranger.
        let _ = self.peers.send(peer);

        Box::new(LoopbackSession {
            events,
            outbound,
            link,
        })
    }
}

/// Session half of a loopback pair.
#[derive(Debug)]
pub struct LoopbackSession {
    events: SessionEvents,
    outbound: mpsc::UnboundedSender<String>,
    link: Arc<Link>,
}

#[async_trait]
impl ChatSession for LoopbackSession {
    async fn connect(&mut self) -> Result<()> {
        let _ = self.events.send(SessionEvent::WaitingForPartner);
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<()> {
        self.link.connected.store(false, Ordering::SeqCst);
        self.link.disconnect_requested.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn send(&mut self, text: &str) -> Result<()> {
        if !self.is_connected() {
            return Err(MultichatError::Session("not connected".to_string()));
        }
        self.outbound
            .send(text.to_string())
            .map_err(|_| MultichatError::Session("peer dropped".to_string()))
    }

    fn is_connected(&self) -> bool {
        self.link.connected.load(Ordering::SeqCst)
    }
}

/// Stranger half of a loopback pair.
#[derive(Debug)]
pub struct LoopbackPeer {
    events: SessionEvents,
    inbox: mpsc::UnboundedReceiver<String>,
    link: Arc<Link>,
}

impl LoopbackPeer {
    /// Pair with the session.
    pub fn accept(&self) {
        self.link.connected.store(true, Ordering::SeqCst);
        self.emit(SessionEvent::Connected);
    }

    /// Send a line into the room.
    pub fn say(&self, text: impl Into<String>) {
        self.emit(SessionEvent::Message(text.into()));
    }

    /// Start typing.
    pub fn typing(&self) {
        self.emit(SessionEvent::Typing);
    }

    /// Stop typing without sending.
    pub fn stop_typing(&self) {
        self.emit(SessionEvent::StoppedTyping);
    }

    /// Leave the conversation.
    pub fn hang_up(&self) {
        self.link.connected.store(false, Ordering::SeqCst);
        self.emit(SessionEvent::Disconnected);
    }

    /// Demand a captcha.
    pub fn captcha(&self, challenge: impl Into<String>) {
        self.emit(SessionEvent::CaptchaRequired(challenge.into()));
    }

    /// Refuse a captcha answer.
    pub fn refuse_captcha(&self) {
        self.emit(SessionEvent::CaptchaRefused);
    }

    /// Raise an unrecognized response.
    pub fn unhandled(&self, raw: impl Into<String>, fault: bool) {
        self.emit(SessionEvent::UnhandledResponse {
            raw: raw.into(),
            fault,
        });
    }

    /// Report how many people are online.
    pub fn peer_count(&self, count: u64) {
        self.emit(SessionEvent::PeerCount(count));
    }

    /// Next line the room sent to this stranger.
    ///
    /// Returns `None` once the session has been dropped and every queued line
    /// has been read.
    pub async fn recv(&mut self) -> Option<String> {
        self.inbox.recv().await
    }

    /// Next queued line, without waiting.
    pub fn try_recv(&mut self) -> Option<String> {
        self.inbox.try_recv().ok()
    }

    /// Whether the room asked the session to disconnect.
    pub fn disconnect_requested(&self) -> bool {
        self.link.disconnect_requested.load(Ordering::SeqCst)
    }

    /// Whether the session currently counts as connected.
    pub fn is_connected(&self) -> bool {
        self.link.connected.load(Ordering::SeqCst)
    }

    fn emit(&self, event: SessionEvent) {
        let _ = self.events.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_factory_delivers_one_peer_per_session() {
        let (factory, mut peers) = LoopbackFactory::new();
        let (events, _rx) = mpsc::unbounded_channel();

        let _a = factory.create(events.clone());
        let _b = factory.create(events);

        assert!(peers.recv().await.is_some());
        assert!(peers.recv().await.is_some());
        assert!(peers.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_connect_emits_waiting_for_partner() {
        let (factory, _peers) = LoopbackFactory::new();
        let (events, mut rx) = mpsc::unbounded_channel();

        let mut session = factory.create(events);
        session.connect().await.unwrap();

        assert_eq!(rx.recv().await, Some(SessionEvent::WaitingForPartner));
        assert!(!session.is_connected());
    }

    #[tokio::test]
    async fn test_send_requires_partner() {
        let (factory, mut peers) = LoopbackFactory::new();
        let (events, _rx) = mpsc::unbounded_channel();

        let mut session = factory.create(events);
        let mut peer = peers.recv().await.unwrap();

        assert!(matches!(
            session.send("too early").await,
            Err(MultichatError::Session(_))
        ));

        peer.accept();
        session.send("hello").await.unwrap();
        assert_eq!(peer.try_recv().as_deref(), Some("hello"));
    }

    #[tokio::test]
    async fn test_peer_events() {
        let (factory, mut peers) = LoopbackFactory::new();
        let (events, mut rx) = mpsc::unbounded_channel();

        let session = factory.create(events);
        let peer = peers.recv().await.unwrap();

        peer.accept();
        peer.typing();
        peer.say("hi");
        peer.captcha("abc");
        peer.unhandled("weird", false);
        peer.peer_count(12);
        peer.hang_up();

        assert_eq!(rx.recv().await, Some(SessionEvent::Connected));
        assert_eq!(rx.recv().await, Some(SessionEvent::Typing));
        assert_eq!(rx.recv().await, Some(SessionEvent::Message("hi".to_string())));
        assert_eq!(
            rx.recv().await,
            Some(SessionEvent::CaptchaRequired("abc".to_string()))
        );
        assert_eq!(
            rx.recv().await,
            Some(SessionEvent::UnhandledResponse {
                raw: "weird".to_string(),
                fault: false
            })
        );
        assert_eq!(rx.recv().await, Some(SessionEvent::PeerCount(12)));
        assert_eq!(rx.recv().await, Some(SessionEvent::Disconnected));
        assert!(!session.is_connected());
    }

    #[tokio::test]
    async fn test_disconnect_marks_request() {
        let (factory, mut peers) = LoopbackFactory::new();
        let (events, _rx) = mpsc::unbounded_channel();

        let mut session = factory.create(events);
        let peer = peers.recv().await.unwrap();
        peer.accept();

        session.disconnect().await.unwrap();
        assert!(peer.disconnect_requested());
        assert!(!peer.is_connected());
    }
}
