use std::time::Duration;

use crate::world::RoomId;
use crate::world::direction::Direction;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
    Look(Option<String>),
    Say(String),
    Emote(String),
    Help(Option<String>),
    Uptime,
    Who,
    Tell { target: String, msg: String },
    Goto(GotoTarget),
    Move(Direction),
    /// `None` toggles; `Some("?")` asks.
    ChatMode(Option<String>),
    Quit,
    /// A bare return; only re-prompts.
    Empty,
    Unknown(String),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GotoTarget {
    Room(RoomId),
    Player(String),
    Missing,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Verb {
    Look,
    Say,
    Emote,
    Help,
    Uptime,
    Who,
    Tell,
    Goto,
    ChatMode,
    Quit,
}

struct VerbInfo {
    verb: Verb,
    name: &'static str,
    aliases: &'static [&'static str],
    help: &'static str,
}

const VERBS: &[VerbInfo] = &[
    VerbInfo {
        verb: Verb::ChatMode,
        name: "chatmode",
        aliases: &[],
        help: "chatmode [?] - toggle chat mode, where plain text is said to the room",
    },
    VerbInfo {
        verb: Verb::Emote,
        name: "emote",
        aliases: &["me", ":"],
        help: "emote <action> - show everyone in the room what you are doing",
    },
    VerbInfo {
        verb: Verb::Goto,
        name: "goto",
        aliases: &[],
        help: "goto <room number | player> - go straight to a room, or to a player",
    },
    VerbInfo {
        verb: Verb::Help,
        name: "help",
        aliases: &["?"],
        help: "help [command] - list commands, or explain one",
    },
    VerbInfo {
        verb: Verb::Look,
        name: "look",
        aliases: &["l"],
        help: "look [target] - describe the room, or someone or something in it",
    },
    VerbInfo {
        verb: Verb::Quit,
        name: "quit",
        aliases: &[],
        help: "quit - leave the game",
    },
    VerbInfo {
        verb: Verb::Say,
        name: "say",
        aliases: &["'"],
        help: "say <message> - talk to everyone in the room",
    },
    VerbInfo {
        verb: Verb::Tell,
        name: "tell",
        aliases: &["t"],
        help: "tell <player> <message> - talk privately to anyone online",
    },
    VerbInfo {
        verb: Verb::Uptime,
        name: "uptime",
        aliases: &[],
        help: "uptime - how long the world has been running",
    },
    VerbInfo {
        verb: Verb::Who,
        name: "who",
        aliases: &[],
        help: "who - list everyone online",
    },
];

fn find_verb(word: &str) -> Option<&'static VerbInfo> {
    VERBS
        .iter()
        .find(|v| v.name == word || v.aliases.contains(&word))
}

/// Everything after the first word, trimmed; `None` if that is empty.
fn rest(line: &str) -> Option<&str> {
    let line = line.trim_start();
    let i = line.find(char::is_whitespace)?;
    let r = line[i..].trim();
    (!r.is_empty()).then_some(r)
}

pub fn parse(line: &str) -> Command {
    let line = line.trim();
    if line.is_empty() {
        return Command::Empty;
    }

    // `'hello` and `:waves` work without a space.
    for (prefix, say) in [("'", true), (":", false)] {
        if let Some(msg) = line.strip_prefix(prefix) {
            let msg = msg.trim().to_string();
            return if say {
                Command::Say(msg)
            } else {
                Command::Emote(msg)
            };
        }
    }

    let mut words = line.split_whitespace();
    let first = words.next().unwrap_or_default().to_ascii_lowercase();
    let second = words.next().map(str::to_string);

    let Some(info) = find_verb(&first) else {
        return match Direction::find(&first) {
            Some(dir) => Command::Move(dir),
            None => Command::Unknown(first),
        };
    };

    match info.verb {
        Verb::Look => Command::Look(second.map(|s| s.to_ascii_lowercase())),
        Verb::Say => Command::Say(rest(line).unwrap_or_default().to_string()),
        Verb::Emote => Command::Emote(rest(line).unwrap_or_default().to_string()),
        Verb::Help => Command::Help(second.map(|s| s.to_ascii_lowercase())),
        Verb::Uptime => Command::Uptime,
        Verb::Who => Command::Who,
        Verb::Tell => {
            let target = second.unwrap_or_default();
            let msg = rest(line)
                .and_then(rest)
                .unwrap_or_default()
                .to_string();
            Command::Tell { target, msg }
        }
        Verb::Goto => Command::Goto(match second {
            None => GotoTarget::Missing,
            Some(s) => match s.parse::<RoomId>() {
                Ok(id) => GotoTarget::Room(id),
                Err(_) => GotoTarget::Player(s),
            },
        }),
        Verb::ChatMode => Command::ChatMode(second),
        Verb::Quit => Command::Quit,
    }
}

/// Whether players may switch chat mode, or are held in or out of it.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ChatPolicy {
    #[default]
    Allow,
    Deny,
    Require,
}

impl ChatPolicy {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "allow" => Some(Self::Allow),
            "deny" => Some(Self::Deny),
            "require" => Some(Self::Require),
            _ => None,
        }
    }
}

/// Server-wide chat mode settings.
///
/// A player in chat mode has plain text said to the room. With a `prefix`,
/// only movement and lines starting with the prefix are commands; without
/// one, any line that is not a command is said.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ChatMode {
    pub policy: ChatPolicy,
    pub default_on: bool,
    pub prefix: String,
}

impl ChatMode {
    pub fn starts_on(&self) -> bool {
        match self.policy {
            ChatPolicy::Allow => self.default_on,
            ChatPolicy::Deny => false,
            ChatPolicy::Require => true,
        }
    }

    pub fn toggleable(&self) -> bool {
        self.policy == ChatPolicy::Allow
    }

    fn parse(&self, line: &str) -> Command {
        match parse(line) {
            Command::ChatMode(_) if !self.toggleable() => Command::Unknown("chatmode".to_string()),
            cmd => cmd,
        }
    }

    /// Turn a line into a command for a player whose chat mode is `on`.
    pub fn interpret(&self, line: &str, on: bool) -> Command {
        let line = line.trim();
        if !on || line.is_empty() {
            return self.parse(line);
        }
        if self.prefix.is_empty() {
            return match self.parse(line) {
                Command::Unknown(_) => Command::Say(line.to_string()),
                cmd => cmd,
            };
        }
        if let Some(rest) = line.strip_prefix(self.prefix.as_str()) {
            return self.parse(rest);
        }
        match parse(line) {
            Command::Move(dir) => Command::Move(dir),
            _ => Command::Say(line.to_string()),
        }
    }
}

fn listed(v: &VerbInfo, chat: &ChatMode) -> bool {
    v.verb != Verb::ChatMode || chat.toggleable()
}

/// The full command list shown by a bare `help`.
pub fn help_text(chat: &ChatMode) -> String {
    let mut lines = vec![
        "List of available commands".to_string(),
        String::new(),
        "-- Standard Commands --".to_string(),
    ];
    let verbs = VERBS.iter().filter(|v| listed(v, chat)).collect::<Vec<_>>();
    let names = verbs
        .iter()
        .map(|v| {
            let mut all = vec![v.name];
            all.extend_from_slice(v.aliases);
            all.join(", ")
        })
        .collect::<Vec<_>>();
    let width = names.iter().map(String::len).max().unwrap_or(0);
    for (v, names) in verbs.iter().zip(&names) {
        let summary = v.help.split(" - ").nth(1).unwrap_or(v.help);
        lines.push(format!("{names:<width$}  {summary}"));
    }
    lines.push(String::new());
    lines.push("-- Movement --".to_string());
    for d in Direction::ALL {
        lines.push(format!("{}, {}", d.name(), d.aliases().join(", ")));
    }
    if chat.policy != ChatPolicy::Deny && !chat.prefix.is_empty() {
        lines.push(String::new());
        lines.push(format!("In chat mode, start other commands with {}", chat.prefix));
    }
    lines.join("\r\n")
}

/// Help for one command, by name or alias.
pub fn help_for(topic: &str, chat: &ChatMode) -> Option<&'static str> {
    find_verb(topic).filter(|v| listed(v, chat)).map(|v| v.help)
}

/// Rounded to the coarsest unit that still says something.
pub fn format_uptime(d: Duration) -> String {
    const MIN: u64 = 60;
    const HOUR: u64 = 60 * MIN;
    const DAY: u64 = 24 * HOUR;

    let secs = d.as_secs_f64();
    let s = d.as_secs();
    if s > 48 * HOUR {
        format!("{} days", s / DAY)
    } else if s > 2 * HOUR {
        format!("{} hours", (secs / HOUR as f64).round() as u64)
    } else if s > 5 * MIN {
        format!("{} minutes", (secs / MIN as f64).round() as u64)
    } else {
        let n = secs.round() as u64;
        if n == 1 {
            "1 second".to_string()
        } else {
            format!("{n} seconds")
        }
    }
}
