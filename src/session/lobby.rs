//! TCP stranger lobby.
//!
//! [`LobbyServer`] accepts plain line-based TCP connections and queues them as
//! strangers. Each [`LobbySession`] waits for the next queued stranger when
//! asked to connect, then relays lines in both directions. Connection slots
//! are bounded by a semaphore.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, Mutex, OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use super::{ChatSession, SessionEvent, SessionEvents, SessionFactory};
use crate::config::ServerConfig;
use crate::{MultichatError, Result};

/// An accepted connection waiting to be paired with a session.
#[derive(Debug)]
pub struct Stranger {
    stream: TcpStream,
    addr: SocketAddr,
    _permit: OwnedSemaphorePermit,
}

impl Stranger {
    /// Remote address of the stranger.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }
}

#[derive(Debug)]
struct Slots {
    semaphore: Arc<Semaphore>,
    max_connections: usize,
}

impl Slots {
    fn active(&self) -> usize {
        self.max_connections - self.semaphore.available_permits()
    }
}

/// TCP listener that produces strangers.
pub struct LobbyServer {
    listener: TcpListener,
    slots: Arc<Slots>,
}

impl LobbyServer {
    /// Create a new LobbyServer bound to the configured address.
    pub async fn bind(config: &ServerConfig) -> Result<Self> {
        let addr = format!("{}:{}", config.host, config.port);
        let listener = TcpListener::bind(&addr).await?;
        let local_addr = listener.local_addr()?;

        info!("Stranger lobby listening on {}", local_addr);

        Ok(Self {
            listener,
            slots: Arc::new(Slots {
                semaphore: Arc::new(Semaphore::new(config.max_connections)),
                max_connections: config.max_connections,
            }),
        })
    }

    /// Get the local address the lobby is bound to.
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Get the maximum number of connections allowed.
    pub fn max_connections(&self) -> usize {
        self.slots.max_connections
    }

    /// Get the number of available connection slots.
    pub fn available_connections(&self) -> usize {
        self.slots.semaphore.available_permits()
    }

    /// Get the number of active connections.
    pub fn active_connections(&self) -> usize {
        self.slots.active()
    }

    /// Accept the next stranger, waiting for a free slot first.
    pub async fn accept(&self) -> Result<Stranger> {
        let permit = self
            .slots
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| MultichatError::Io(std::io::Error::other("semaphore closed")))?;

        let (stream, addr) = self.listener.accept().await?;
        debug!("Accepted stranger from {}", addr);

        Ok(Stranger {
            stream,
            addr,
            _permit: permit,
        })
    }

    /// Spawn the accept loop and return a factory for sessions that pair with
    /// the accepted strangers.
    pub fn start(self) -> LobbyFactory {
        let (tx, rx) = mpsc::channel(self.slots.max_connections.max(1));
        let slots = Arc::clone(&self.slots);

        tokio::spawn(async move {
            loop {
                match self.accept().await {
                    Ok(stranger) => {
                        if tx.send(stranger).await.is_err() {
                            debug!("Lobby queue closed, stopping accept loop");
                            break;
                        }
                    }
                    Err(e) => {
                        error!("Failed to accept stranger: {}", e);
                    }
                }
            }
        });

        LobbyFactory {
            queue: Arc::new(Mutex::new(rx)),
            slots,
        }
    }
}

/// Factory for sessions backed by the lobby queue.
#[derive(Debug, Clone)]
pub struct LobbyFactory {
    queue: Arc<Mutex<mpsc::Receiver<Stranger>>>,
    slots: Arc<Slots>,
}

impl SessionFactory for LobbyFactory {
    fn create(&self, events: SessionEvents) -> Box<dyn ChatSession> {
        Box::new(LobbySession {
            events,
            queue: Arc::clone(&self.queue),
            slots: Arc::clone(&self.slots),
            connected: Arc::new(AtomicBool::new(false)),
            writer: Arc::new(Mutex::new(None)),
            task: None,
        })
    }
}

/// A session paired with one lobby stranger.
#[derive(Debug)]
pub struct LobbySession {
    events: SessionEvents,
    queue: Arc<Mutex<mpsc::Receiver<Stranger>>>,
    slots: Arc<Slots>,
    connected: Arc<AtomicBool>,
    writer: Arc<Mutex<Option<OwnedWriteHalf>>>,
    task: Option<JoinHandle<()>>,
}

#[async_trait]
impl ChatSession for LobbySession {
    async fn connect(&mut self) -> Result<()> {
        if self.task.is_some() {
            return Err(MultichatError::Session("session already started".to_string()));
        }

        let _ = self.events.send(SessionEvent::WaitingForPartner);

        let events = self.events.clone();
        let queue = Arc::clone(&self.queue);
        let slots = Arc::clone(&self.slots);
        let connected = Arc::clone(&self.connected);
        let writer = Arc::clone(&self.writer);

        self.task = Some(tokio::spawn(async move {
            let stranger = queue.lock().await.recv().await;
            let Some(Stranger {
                stream,
                addr,
                _permit,
            }) = stranger
            else {
                let _ = events.send(SessionEvent::UnhandledResponse {
                    raw: "lobby closed".to_string(),
                    fault: true,
                });
                return;
            };

            info!(peer = %addr, "Stranger paired");
            let (reader, write_half) = stream.into_split();
            *writer.lock().await = Some(write_half);
            connected.store(true, Ordering::SeqCst);

            let _ = events.send(SessionEvent::Connected);
            let _ = events.send(SessionEvent::PeerCount(slots.active() as u64));

            read_lines(reader, &events).await;

            connected.store(false, Ordering::SeqCst);
            writer.lock().await.take();
            info!(peer = %addr, "Stranger left");
            let _ = events.send(SessionEvent::Disconnected);
        }));

        Ok(())
    }

    async fn disconnect(&mut self) -> Result<()> {
        if let Some(task) = self.task.take() {
            task.abort();
        }
        self.connected.store(false, Ordering::SeqCst);

        if let Some(mut write_half) = self.writer.lock().await.take() {
            write_half.shutdown().await?;
        }
        Ok(())
    }

    async fn send(&mut self, text: &str) -> Result<()> {
        let mut guard = self.writer.lock().await;
        let write_half = guard
            .as_mut()
            .ok_or_else(|| MultichatError::Session("not connected".to_string()))?;

        for line in text.lines() {
            write_half.write_all(line.as_bytes()).await?;
            write_half.write_all(b"\r\n").await?;
        }
        write_half.flush().await?;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

impl Drop for LobbySession {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

/// Relay lines from the stranger until EOF or a read error.
async fn read_lines(reader: OwnedReadHalf, events: &SessionEvents) {
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();

    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {
                let line = trim_line_ending(&buf);
                if line.is_empty() {
                    continue;
                }
                let event = match std::str::from_utf8(line) {
                    Ok(text) => SessionEvent::Message(text.to_string()),
                    Err(_) => SessionEvent::UnhandledResponse {
                        raw: String::from_utf8_lossy(line).into_owned(),
                        fault: false,
                    },
                };
                if events.send(event).is_err() {
                    break;
                }
            }
            Err(e) => {
                debug!("Stranger read failed: {}", e);
                break;
            }
        }
    }
}

fn trim_line_ending(buf: &[u8]) -> &[u8] {
    let mut end = buf.len();
    while end > 0 && matches!(buf[end - 1], b'\n' | b'\r') {
        end -= 1;
    }
    &buf[..end]
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::io::AsyncReadExt;
    use tokio::time::timeout;

    use super::*;

    const WAIT: Duration = Duration::from_secs(5);

    fn test_config(max_connections: usize) -> ServerConfig {
        ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
            max_connections,
        }
    }

    async fn next(rx: &mut mpsc::UnboundedReceiver<SessionEvent>) -> SessionEvent {
        timeout(WAIT, rx.recv()).await.unwrap().unwrap()
    }

    #[test]
    fn test_trim_line_ending() {
        assert_eq!(trim_line_ending(b"hello\r\n"), b"hello");
        assert_eq!(trim_line_ending(b"hello\n"), b"hello");
        assert_eq!(trim_line_ending(b"hello"), b"hello");
        assert_eq!(trim_line_ending(b"\r\n"), b"");
    }

    #[tokio::test]
    async fn test_lobby_bind() {
        let server = LobbyServer::bind(&test_config(10)).await.unwrap();

        assert!(server.local_addr().is_ok());
        assert_eq!(server.max_connections(), 10);
        assert_eq!(server.available_connections(), 10);
        assert_eq!(server.active_connections(), 0);
    }

    #[tokio::test]
    async fn test_accept_holds_slot() {
        let server = LobbyServer::bind(&test_config(2)).await.unwrap();
        let addr = server.local_addr().unwrap();

        let client = TcpStream::connect(addr).await.unwrap();
        let stranger = server.accept().await.unwrap();

        assert_eq!(stranger.addr(), client.local_addr().unwrap());
        assert_eq!(server.active_connections(), 1);

        drop(stranger);
        assert_eq!(server.active_connections(), 0);
    }

    #[tokio::test]
    async fn test_session_pairs_with_stranger() {
        let server = LobbyServer::bind(&test_config(4)).await.unwrap();
        let addr = server.local_addr().unwrap();
        let factory = server.start();

        let (events, mut rx) = mpsc::unbounded_channel();
        let mut session = factory.create(events);
        session.connect().await.unwrap();
        assert_eq!(next(&mut rx).await, SessionEvent::WaitingForPartner);
        assert!(!session.is_connected());

        let mut client = TcpStream::connect(addr).await.unwrap();
        assert_eq!(next(&mut rx).await, SessionEvent::Connected);
        assert_eq!(next(&mut rx).await, SessionEvent::PeerCount(1));
        assert!(session.is_connected());

        client.write_all(b"hello room\r\n").await.unwrap();
        assert_eq!(
            next(&mut rx).await,
            SessionEvent::Message("hello room".to_string())
        );

        session.send("hi stranger").await.unwrap();
        let mut buf = [0u8; 13];
        client.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"hi stranger\r\n");
    }

    #[tokio::test]
    async fn test_invalid_utf8_is_unhandled() {
        let server = LobbyServer::bind(&test_config(4)).await.unwrap();
        let addr = server.local_addr().unwrap();
        let factory = server.start();

        let (events, mut rx) = mpsc::unbounded_channel();
        let mut session = factory.create(events);
        session.connect().await.unwrap();
        let mut client = TcpStream::connect(addr).await.unwrap();
        next(&mut rx).await;
        next(&mut rx).await;
        next(&mut rx).await;

        client.write_all(b"\xff\xfe\n").await.unwrap();
        assert!(matches!(
            next(&mut rx).await,
            SessionEvent::UnhandledResponse { fault: false, .. }
        ));
    }

    #[tokio::test]
    async fn test_stranger_hangup_disconnects() {
        let server = LobbyServer::bind(&test_config(4)).await.unwrap();
        let addr = server.local_addr().unwrap();
        let factory = server.start();

        let (events, mut rx) = mpsc::unbounded_channel();
        let mut session = factory.create(events);
        session.connect().await.unwrap();
        let client = TcpStream::connect(addr).await.unwrap();
        next(&mut rx).await;
        next(&mut rx).await;
        next(&mut rx).await;

        drop(client);
        assert_eq!(next(&mut rx).await, SessionEvent::Disconnected);
        assert!(!session.is_connected());
        assert!(session.send("gone").await.is_err());
    }

    #[tokio::test]
    async fn test_session_disconnect_closes_socket() {
        let server = LobbyServer::bind(&test_config(4)).await.unwrap();
        let addr = server.local_addr().unwrap();
        let factory = server.start();

        let (events, mut rx) = mpsc::unbounded_channel();
        let mut session = factory.create(events);
        session.connect().await.unwrap();
        let mut client = TcpStream::connect(addr).await.unwrap();
        next(&mut rx).await;
        next(&mut rx).await;
        next(&mut rx).await;

        session.disconnect().await.unwrap();
        assert!(!session.is_connected());

        let mut buf = [0u8; 16];
        let n = timeout(WAIT, client.read(&mut buf)).await.unwrap().unwrap();
        assert_eq!(n, 0);
    }

    #[tokio::test]
    async fn test_connect_twice_rejected() {
        let server = LobbyServer::bind(&test_config(1)).await.unwrap();
        let factory = server.start();

        let (events, _rx) = mpsc::unbounded_channel();
        let mut session = factory.create(events);
        session.connect().await.unwrap();
        assert!(matches!(
            session.connect().await,
            Err(MultichatError::Session(_))
        ));
    }
}
