//! Multi-user chat room.
//!
//! This module provides the room itself:
//! - Users and privilege tiers
//! - The command parser and two-tier command registry
//! - Room state, broadcast and session event handling
//! - The hub task that serializes every change to the room

mod command;
mod hub;
mod message;
mod room;
mod user;

pub use command::{parse_command, CommandFn, CommandLine, CommandRegistry, INVALID_ARGUMENTS};
pub(crate) use hub::HubEvent;
pub use hub::{RoomHandle, RoomHub};
pub use message::{ChatMessage, MessageSender, RoomEvent};
pub use room::ChatRoom;
pub use user::{Privilege, User, UserId, UserKind, UserSnapshot};
