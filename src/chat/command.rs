//! Chat command parser, registry and handlers.
//!
//! Commands live in two tables: standard commands for every user with at
//! least [`Privilege::Standard`], and moderator commands for
//! [`Privilege::Mod`]. No name appears in both tables. A moderator's command
//! name is looked up in the moderator table first, then in the standard
//! table. Unknown names are ignored.
//!
//! Handlers return the response for the invoking user; an empty string means
//! there is nothing to tell them. Bad input never fails the room, it only
//! produces a response.

use std::collections::HashMap;

use tracing::info;

use super::room::ChatRoom;
use super::user::{Privilege, User, UserId};

/// Response for missing or malformed arguments.
pub const INVALID_ARGUMENTS: &str = "Invalid argument(s).";

/// Signature shared by every command handler.
pub type CommandFn = fn(&mut ChatRoom, UserId, &[String]) -> String;

/// A parsed command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandLine {
    /// Command name, lowercased.
    pub name: String,
    /// Arguments, split on single spaces.
    pub args: Vec<String>,
}

/// Parse a line into a command if it starts with `prefix`.
///
/// The name runs up to the first space. The rest of the line is trimmed and
/// split on single spaces; an empty rest yields no arguments.
pub fn parse_command(input: &str, prefix: char) -> Option<CommandLine> {
    let without_prefix = input.strip_prefix(prefix)?;

    let (name, rest) = match without_prefix.find(' ') {
        Some(pos) => (&without_prefix[..pos], without_prefix[pos + 1..].trim()),
        None => (without_prefix, ""),
    };

    let args = if rest.is_empty() {
        Vec::new()
    } else {
        rest.split(' ').map(str::to_string).collect()
    };

    Some(CommandLine {
        name: name.to_lowercase(),
        args,
    })
}

/// The two command tables.
pub struct CommandRegistry {
    standard: HashMap<&'static str, CommandFn>,
    moderator: HashMap<&'static str, CommandFn>,
}

impl CommandRegistry {
    /// Build the registry with every built-in command.
    pub fn new() -> Self {
        let mut standard: HashMap<&'static str, CommandFn> = HashMap::new();
        standard.insert("help", help);
        standard.insert("name", nick);
        standard.insert("nick", nick);
        standard.insert("who", who);
        standard.insert("w", whisper);
        standard.insert("pm", whisper);
        standard.insert("me", me);

        let mut moderator: HashMap<&'static str, CommandFn> = HashMap::new();
        moderator.insert("rename", rename);
        moderator.insert("kick", kick);
        moderator.insert("ban", kick);
        moderator.insert("mute", mute);
        moderator.insert("mod", promote);
        moderator.insert("op", promote);
        moderator.insert("demod", demote);
        moderator.insert("deop", demote);
        moderator.insert("connect", connect);

        debug_assert!(
            moderator.keys().all(|name| !standard.contains_key(name)),
            "command names must be unique across tiers"
        );

        Self {
            standard,
            moderator,
        }
    }

    /// Find the handler a user of `privilege` reaches under `name`.
    pub fn lookup(&self, privilege: Privilege, name: &str) -> Option<CommandFn> {
        let name = name.to_lowercase();

        if privilege == Privilege::Mod {
            if let Some(command) = self.moderator.get(name.as_str()) {
                return Some(*command);
            }
        }

        match privilege {
            Privilege::Standard | Privilege::Mod => self.standard.get(name.as_str()).copied(),
            Privilege::None => None,
        }
    }

    /// Names registered in the standard table.
    pub fn standard_names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.standard.keys().copied().collect();
        names.sort_unstable();
        names
    }

    /// Names registered in the moderator table.
    pub fn moderator_names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.moderator.keys().copied().collect();
        names.sort_unstable();
        names
    }
}

impl Default for CommandRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn not_a_user(name: &str) -> String {
    format!("{name} is not a valid user.")
}

/// Resolve the first argument to a user id.
fn target(room: &ChatRoom, args: &[String]) -> Result<UserId, String> {
    let name = args.first().ok_or_else(|| INVALID_ARGUMENTS.to_string())?;
    room.find_user_by_name(name)
        .map(User::id)
        .ok_or_else(|| not_a_user(name))
}

fn name_of(room: &ChatRoom, id: UserId) -> String {
    room.user(id).map(|u| u.name().to_string()).unwrap_or_default()
}

fn privilege_of(room: &ChatRoom, id: UserId) -> Privilege {
    room.user(id).map(User::privilege).unwrap_or(Privilege::None)
}

/// `/help`
fn help(room: &mut ChatRoom, actor: UserId, _args: &[String]) -> String {
    let mut lines = vec![
        "Hey! Welcome to the multi-chat. This isn't your average 1 on 1 conversation!",
        "Available commands:",
        "/help --displays this message",
        "/name newName --changes your name to newName",
        "/who --lists all users",
        "/w userName message --whispers a private message to userName",
        "/me action --describes what you are doing",
    ];

    if privilege_of(room, actor) == Privilege::Mod {
        lines.extend([
            "/rename userName newName --changes userName's name to newName",
            "/mute userName --mutes or unmutes userName",
            "/kick userName --kicks userName",
            "/mod userName --makes userName a mod",
            "/demod userName --takes mod away from userName",
            "/connect --connects a new user to the chat",
        ]);
    }

    lines.join("\n")
}

/// `/name newName`, `/nick newName`
fn nick(room: &mut ChatRoom, actor: UserId, args: &[String]) -> String {
    let Some(new_name) = args.first().filter(|name| !name.is_empty()) else {
        return INVALID_ARGUMENTS.to_string();
    };

    let claims_operator_name = room.operator().is_named(new_name);
    let Some(user) = room.user_mut(actor) else {
        return String::new();
    };
    if !user.is_local() && claims_operator_name {
        return INVALID_ARGUMENTS.to_string();
    }

    let old_name = user.name().to_string();
    user.set_name(new_name.as_str());

    info!(user = %actor, from = %old_name, to = %new_name, "user renamed");
    room.broadcast(&format!("{old_name}'s name is now {new_name}!"), None);
    String::new()
}

/// `/who`
fn who(room: &mut ChatRoom, _actor: UserId, _args: &[String]) -> String {
    let names: Vec<&str> = room.roster().iter().map(User::name).collect();
    format!("{} users: {}", names.len(), names.join(", "))
}

/// `/w userName message`, `/pm userName message`
fn whisper(room: &mut ChatRoom, actor: UserId, args: &[String]) -> String {
    if args.len() < 2 {
        return INVALID_ARGUMENTS.to_string();
    }

    let recipient = match target(room, args) {
        Ok(id) => id,
        Err(response) => return response,
    };

    let message = args[1..].join(" ");
    let sender = name_of(room, actor);
    room.deliver(recipient, &format!("{sender}: whispered: {}", message.trim()));

    "Message sent!".to_string()
}

/// `/me action`
fn me(room: &mut ChatRoom, actor: UserId, args: &[String]) -> String {
    let action = args.join(" ");
    if action.trim().is_empty() {
        return INVALID_ARGUMENTS.to_string();
    }

    let name = name_of(room, actor);
    room.broadcast(&format!("{name} {action}"), None);
    String::new()
}

/// `/rename userName newName`
fn rename(room: &mut ChatRoom, actor: UserId, args: &[String]) -> String {
    if args.len() < 2 {
        return INVALID_ARGUMENTS.to_string();
    }

    let renamed = match target(room, args) {
        Ok(id) => id,
        Err(response) => return response,
    };
    if privilege_of(room, renamed) == Privilege::Mod {
        return "You can't rename a mod!".to_string();
    }

    let response = nick(room, renamed, &args[1..2]);
    if !response.is_empty() {
        return response;
    }

    let renamer = name_of(room, actor);
    let new_name = name_of(room, renamed);
    room.deliver(renamed, &format!("{renamer} changed your name to {new_name}!"));
    String::new()
}

/// `/kick userName`, `/ban userName`
fn kick(room: &mut ChatRoom, actor: UserId, args: &[String]) -> String {
    let kickee = match target(room, args) {
        Ok(id) => id,
        Err(response) => return response,
    };
    if privilege_of(room, kickee) == Privilege::Mod {
        return "You can't kick a mod!".to_string();
    }

    let Some(user) = room.remove_user(kickee) else {
        return not_a_user(&args[0]);
    };

    info!(user = %kickee, name = %user.name(), by = %actor, "user kicked");
    room.broadcast(&format!("{} was kicked!", user.name()), None);
    String::new()
}

/// `/mute userName`
fn mute(room: &mut ChatRoom, _actor: UserId, args: &[String]) -> String {
    let mutee = match target(room, args) {
        Ok(id) => id,
        Err(response) => return response,
    };
    let Some(user) = room.user_mut(mutee) else {
        return not_a_user(&args[0]);
    };
    if user.privilege() == Privilege::Mod {
        return "You can't mute a mod!".to_string();
    }

    let muted = !user.is_muted();
    user.set_muted(muted);
    let notice = format!(
        "{} was {}muted!",
        user.name(),
        if muted { "" } else { "un" }
    );

    room.broadcast(&notice, None);
    String::new()
}

/// `/mod userName`, `/op userName`
fn promote(room: &mut ChatRoom, _actor: UserId, args: &[String]) -> String {
    let promoted = match target(room, args) {
        Ok(id) => id,
        Err(response) => return response,
    };
    let Some(user) = room.user_mut(promoted) else {
        return not_a_user(&args[0]);
    };
    if user.privilege() == Privilege::Mod {
        return format!("{} is already a mod!", user.name());
    }

    user.set_privilege(Privilege::Mod);
    let notice = format!("{} is now a mod!", user.name());

    room.broadcast(&notice, None);
    String::new()
}

/// `/demod userName`, `/deop userName`
fn demote(room: &mut ChatRoom, _actor: UserId, args: &[String]) -> String {
    let demoted = match target(room, args) {
        Ok(id) => id,
        Err(response) => return response,
    };
    let Some(user) = room.user_mut(demoted) else {
        return not_a_user(&args[0]);
    };
    if user.privilege() != Privilege::Mod {
        return format!("{} isn't a mod!", user.name());
    }
    if !user.set_privilege(Privilege::Standard) {
        return "You can't demod an admin!".to_string();
    }

    let notice = format!("{} is no longer a mod!", user.name());
    room.broadcast(&notice, None);
    String::new()
}

/// `/connect`
fn connect(room: &mut ChatRoom, _actor: UserId, _args: &[String]) -> String {
    room.add_session();
    String::new()
}
