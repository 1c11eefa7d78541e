//! multichat - a moderated multi-stranger chat room
//!
//! The host operator sits in a room with any number of strangers, each
//! reached through an external one-on-one chat session, and relays between
//! them under a small set of moderation commands.

pub mod chat;
pub mod config;
pub mod error;
pub mod logging;
pub mod session;

pub use chat::{ChatMessage, Privilege, RoomEvent, RoomHandle, RoomHub, UserSnapshot};
pub use config::Config;
pub use error::{MultichatError, Result};
pub use session::{ChatSession, SessionEvent, SessionFactory};
