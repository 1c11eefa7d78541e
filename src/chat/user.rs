//! Room users.
//!
//! A user is either the local operator or a remote peer reached through a
//! [`SessionBridge`]. Both share name, mute flag and privilege; only remote
//! users have a session to deliver to and a typing state.

use std::fmt;
use std::str::FromStr;

use uuid::Uuid;

use crate::session::SessionBridge;

/// Privilege tier of a user.
///
/// Ordered so that a higher tier compares greater.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum Privilege {
    /// May not run any command.
    None,
    /// Standard commands only.
    #[default]
    Standard,
    /// Standard and moderator commands.
    Mod,
}

impl Privilege {
    /// Get string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Privilege::None => "none",
            Privilege::Standard => "standard",
            Privilege::Mod => "mod",
        }
    }
}

impl fmt::Display for Privilege {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Privilege {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "none" => Ok(Privilege::None),
            "standard" => Ok(Privilege::Standard),
            "mod" | "op" => Ok(Privilege::Mod),
            other => Err(format!("unknown privilege: {other}")),
        }
    }
}

/// Stable identity of a user for the lifetime of the room.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UserId(Uuid);

impl UserId {
    /// Generate a fresh id.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for UserId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The two shapes a user can take.
#[derive(Debug)]
pub enum UserKind {
    /// The operator sitting at this host.
    Local,
    /// A stranger reached through an external session.
    Remote(SessionBridge),
}

/// A member (or pending member) of the room.
#[derive(Debug)]
pub struct User {
    id: UserId,
    name: String,
    muted: bool,
    privilege: Privilege,
    kind: UserKind,
}

impl User {
    /// Create the local operator. The operator is always a moderator.
    pub fn local(name: impl Into<String>) -> Self {
        Self {
            id: UserId::new(),
            name: name.into(),
            muted: false,
            privilege: Privilege::Mod,
            kind: UserKind::Local,
        }
    }

    /// Create a remote user with standard privilege.
    pub fn remote(id: UserId, name: impl Into<String>, bridge: SessionBridge) -> Self {
        Self {
            id,
            name: name.into(),
            muted: false,
            privilege: Privilege::Standard,
            kind: UserKind::Remote(bridge),
        }
    }

    /// Get the user id.
    pub fn id(&self) -> UserId {
        self.id
    }

    /// Get the display name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Change the display name.
    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    /// Whether the name matches, ignoring case.
    pub fn is_named(&self, name: &str) -> bool {
        self.name.to_lowercase() == name.to_lowercase()
    }

    /// Whether the user is muted.
    pub fn is_muted(&self) -> bool {
        self.muted
    }

    /// Set the mute flag.
    pub fn set_muted(&mut self, muted: bool) {
        self.muted = muted;
    }

    /// Whether a remote user is typing. Always false for the operator.
    pub fn is_typing(&self) -> bool {
        match &self.kind {
            UserKind::Local => false,
            UserKind::Remote(bridge) => bridge.is_typing(),
        }
    }

    /// Get the privilege tier.
    pub fn privilege(&self) -> Privilege {
        self.privilege
    }

    /// Change the privilege tier.
    ///
    /// The local operator stays a moderator; returns false if the change was
    /// refused.
    pub fn set_privilege(&mut self, privilege: Privilege) -> bool {
        if self.is_local() && privilege != Privilege::Mod {
            return false;
        }
        self.privilege = privilege;
        true
    }

    /// Whether this is the local operator.
    pub fn is_local(&self) -> bool {
        matches!(self.kind, UserKind::Local)
    }

    /// Get the session bridge of a remote user.
    pub fn bridge(&self) -> Option<&SessionBridge> {
        match &self.kind {
            UserKind::Local => None,
            UserKind::Remote(bridge) => Some(bridge),
        }
    }

    /// Read-only view for the presentation layer.
    pub fn snapshot(&self) -> UserSnapshot {
        UserSnapshot {
            id: self.id,
            name: self.name.clone(),
            privilege: self.privilege,
            muted: self.muted,
            typing: self.is_typing(),
            local: self.is_local(),
        }
    }
}

/// Point-in-time copy of a user's visible state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserSnapshot {
    /// User id.
    pub id: UserId,
    /// Display name.
    pub name: String,
    /// Privilege tier.
    pub privilege: Privilege,
    /// Mute flag.
    pub muted: bool,
    /// Typing flag.
    pub typing: bool,
    /// Whether this is the local operator.
    pub local: bool,
}

impl fmt::Display for UserSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.muted {
            write!(f, "{} (muted)", self.name)
        } else if self.typing {
            write!(f, "{} (typing)", self.name)
        } else {
            write!(f, "{}", self.name)
        }
    }
}
