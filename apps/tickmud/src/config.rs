use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use tickwork::PanicPolicy;

use crate::command::{ChatMode, ChatPolicy};
use crate::world::{RoomId, WorldSettings, load};

#[derive(Clone, Debug)]
pub struct Config {
    pub bind: SocketAddr,
    pub data_dir: Option<PathBuf>,
    pub tick: Duration,
    pub start_room: Option<RoomId>,
    pub grid: (u32, u32),
    pub grid_zones: u32,
    pub shutdown_timeout: Duration,
    pub on_panic: PanicPolicy,
    pub max_line: usize,
    pub chat: ChatMode,
}

impl Config {
    pub fn world(&self) -> WorldSettings {
        WorldSettings {
            tick: self.tick,
            on_panic: self.on_panic,
            chat: self.chat.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    Help,
    MissingValue(&'static str),
    Invalid { key: &'static str, value: String },
    UnknownArg(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Help => write!(f, "help requested"),
            ConfigError::MissingValue(flag) => write!(f, "{flag} needs a value"),
            ConfigError::Invalid { key, value } => write!(f, "invalid {key}: {value:?}"),
            ConfigError::UnknownArg(a) => write!(f, "unknown argument: {a}"),
        }
    }
}

impl std::error::Error for ConfigError {}

fn usage_and_exit() -> ! {
    eprintln!(
        "tickmud\n\n\
USAGE:\n  tickmud [--bind HOST:PORT] [--data-dir DIR] [--tick-ms MS] [--start-room ID]\n\n\
ENV:\n  TICKMUD_BIND                 default 127.0.0.1:8888\n  TICKMUD_DATA_DIR             zones/*.json + rooms/*.json; unset = built-in grid\n  TICKMUD_TICK_MS              default 100 (min 1)\n  TICKMUD_START_ROOM           default first room\n  TICKMUD_GRID                 built-in grid size WxH, default 10x10\n  TICKMUD_GRID_ZONES           built-in grid zone count, default 2\n  TICKMUD_SHUTDOWN_TIMEOUT_MS  default 10000\n  TICKMUD_ON_EVENT_PANIC       isolate (default) | halt\n  TICKMUD_MAX_LINE             default 1024\n  TICKMUD_CHAT_MODE            allow (default) | deny | require\n  TICKMUD_CHAT_DEFAULT         on | off (default), players' starting chat mode when allowed\n  TICKMUD_CHAT_PREFIX          prefix for commands in chat mode, default none\n"
    );
    std::process::exit(2);
}

pub fn parse_args() -> Config {
    match parse(|k| std::env::var(k).ok(), std::env::args().skip(1)) {
        Ok(cfg) => cfg,
        Err(ConfigError::Help) => usage_and_exit(),
        Err(e) => {
            eprintln!("tickmud: {e}\n");
            usage_and_exit()
        }
    }
}

fn invalid(key: &'static str, value: &str) -> ConfigError {
    ConfigError::Invalid {
        key,
        value: value.to_string(),
    }
}

fn num<T: std::str::FromStr>(key: &'static str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| invalid(key, value))
}

fn grid_size(value: &str) -> Result<(u32, u32), ConfigError> {
    let (w, h) = value
        .trim()
        .split_once(['x', 'X'])
        .ok_or_else(|| invalid("TICKMUD_GRID", value))?;
    let w: u32 = num("TICKMUD_GRID", w)?;
    let h: u32 = num("TICKMUD_GRID", h)?;
    let rooms = w.checked_mul(h).unwrap_or(u32::MAX);
    if rooms == 0 || rooms > load::MAX_GRID_ROOMS {
        return Err(invalid("TICKMUD_GRID", value));
    }
    Ok((w, h))
}

fn switch(key: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "on" | "true" | "yes" => Ok(true),
        "0" | "off" | "false" | "no" => Ok(false),
        _ => Err(invalid(key, value)),
    }
}

fn panic_policy(value: &str) -> Result<PanicPolicy, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "isolate" => Ok(PanicPolicy::Isolate),
        "halt" => Ok(PanicPolicy::Halt),
        _ => Err(invalid("TICKMUD_ON_EVENT_PANIC", value)),
    }
}

/// Build a [`Config`] from an environment lookup and the arguments after the
/// program name. Flags override the environment.
pub fn parse<E, A>(env: E, args: A) -> Result<Config, ConfigError>
where
    E: Fn(&str) -> Option<String>,
    A: IntoIterator<Item = String>,
{
    let mut bind = env("TICKMUD_BIND").unwrap_or_else(|| "127.0.0.1:8888".to_string());
    let mut data_dir = env("TICKMUD_DATA_DIR").filter(|s| !s.trim().is_empty());
    let mut tick_ms = env("TICKMUD_TICK_MS");
    let mut start_room = env("TICKMUD_START_ROOM");

    let mut it = args.into_iter();
    while let Some(arg) = it.next() {
        let mut value = |flag: &'static str| it.next().ok_or(ConfigError::MissingValue(flag));
        match arg.as_str() {
            "--bind" => bind = value("--bind")?,
            "--data-dir" => data_dir = Some(value("--data-dir")?),
            "--tick-ms" => tick_ms = Some(value("--tick-ms")?),
            "--start-room" => start_room = Some(value("--start-room")?),
            "-h" | "--help" => return Err(ConfigError::Help),
            other => return Err(ConfigError::UnknownArg(other.to_string())),
        }
    }

    let bind: SocketAddr = bind.trim().parse().map_err(|_| invalid("bind address", &bind))?;
    let tick_ms: u64 = match tick_ms {
        Some(v) => num("tick ms", &v)?,
        None => 100,
    };
    let start_room = start_room.map(|v| num("start room", &v)).transpose()?;
    let grid = match env("TICKMUD_GRID") {
        Some(v) => grid_size(&v)?,
        None => (10, 10),
    };
    let grid_zones = match env("TICKMUD_GRID_ZONES") {
        Some(v) => num::<u32>("TICKMUD_GRID_ZONES", &v)?.max(1),
        None => 2,
    };
    let shutdown_ms: u64 = match env("TICKMUD_SHUTDOWN_TIMEOUT_MS") {
        Some(v) => num("TICKMUD_SHUTDOWN_TIMEOUT_MS", &v)?,
        None => 10_000,
    };
    let on_panic = match env("TICKMUD_ON_EVENT_PANIC") {
        Some(v) => panic_policy(&v)?,
        None => PanicPolicy::default(),
    };
    let max_line = match env("TICKMUD_MAX_LINE") {
        Some(v) => num::<usize>("TICKMUD_MAX_LINE", &v)?.max(16),
        None => lineio::DEFAULT_MAX_LINE,
    };
    let chat = ChatMode {
        policy: match env("TICKMUD_CHAT_MODE") {
            Some(v) => ChatPolicy::parse(&v).ok_or_else(|| invalid("TICKMUD_CHAT_MODE", &v))?,
            None => ChatPolicy::default(),
        },
        default_on: match env("TICKMUD_CHAT_DEFAULT") {
            Some(v) => switch("TICKMUD_CHAT_DEFAULT", &v)?,
            None => false,
        },
        prefix: env("TICKMUD_CHAT_PREFIX").map(|p| p.trim().to_string()).unwrap_or_default(),
    };

    Ok(Config {
        bind,
        data_dir: data_dir.map(PathBuf::from),
        tick: Duration::from_millis(tick_ms.max(1)),
        start_room,
        grid,
        grid_zones,
        shutdown_timeout: Duration::from_millis(shutdown_ms),
        on_panic,
        max_line,
        chat,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect::<HashMap<_, _>>();
        move |k| map.get(k).cloned()
    }

    fn args(a: &[&str]) -> Vec<String> {
        a.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn defaults() {
        let cfg = parse(env(&[]), args(&[])).unwrap();
        assert_eq!(cfg.bind, "127.0.0.1:8888".parse::<SocketAddr>().unwrap());
        assert_eq!(cfg.data_dir, None);
        assert_eq!(cfg.tick, Duration::from_millis(100));
        assert_eq!(cfg.start_room, None);
        assert_eq!(cfg.grid, (10, 10));
        assert_eq!(cfg.grid_zones, 2);
        assert_eq!(cfg.shutdown_timeout, Duration::from_secs(10));
        assert_eq!(cfg.on_panic, PanicPolicy::Isolate);
        assert_eq!(cfg.max_line, 1024);
        assert_eq!(cfg.chat, ChatMode::default());
    }

    #[test]
    fn chat_settings() {
        let cfg = parse(
            env(&[
                ("TICKMUD_CHAT_MODE", "Require"),
                ("TICKMUD_CHAT_DEFAULT", "on"),
                ("TICKMUD_CHAT_PREFIX", " / "),
            ]),
            args(&[]),
        )
        .unwrap();
        assert_eq!(
            cfg.chat,
            ChatMode {
                policy: ChatPolicy::Require,
                default_on: true,
                prefix: "/".into(),
            }
        );
        assert!(matches!(
            parse(env(&[("TICKMUD_CHAT_MODE", "sometimes")]), args(&[])),
            Err(ConfigError::Invalid { .. })
        ));
        assert!(matches!(
            parse(env(&[("TICKMUD_CHAT_DEFAULT", "maybe")]), args(&[])),
            Err(ConfigError::Invalid { .. })
        ));
    }

    #[test]
    fn env_is_read_and_flags_win() {
        let cfg = parse(
            env(&[
                ("TICKMUD_BIND", "0.0.0.0:4000"),
                ("TICKMUD_TICK_MS", "50"),
                ("TICKMUD_GRID", "4x3"),
                ("TICKMUD_GRID_ZONES", "3"),
                ("TICKMUD_ON_EVENT_PANIC", "HALT"),
                ("TICKMUD_DATA_DIR", "/srv/world"),
            ]),
            args(&["--tick-ms", "0", "--bind", "127.0.0.1:5000", "--start-room", "3001"]),
        )
        .unwrap();
        assert_eq!(cfg.bind, "127.0.0.1:5000".parse::<SocketAddr>().unwrap());
        // Clamped to the minimum.
        assert_eq!(cfg.tick, Duration::from_millis(1));
        assert_eq!(cfg.grid, (4, 3));
        assert_eq!(cfg.grid_zones, 3);
        assert_eq!(cfg.on_panic, PanicPolicy::Halt);
        assert_eq!(cfg.data_dir, Some(PathBuf::from("/srv/world")));
        assert_eq!(cfg.start_room, Some(3001));
    }

    #[test]
    fn bad_input_is_reported() {
        assert_eq!(parse(env(&[]), args(&["--help"])).unwrap_err(), ConfigError::Help);
        assert_eq!(
            parse(env(&[]), args(&["--bind"])).unwrap_err(),
            ConfigError::MissingValue("--bind")
        );
        assert_eq!(
            parse(env(&[]), args(&["--verbose"])).unwrap_err(),
            ConfigError::UnknownArg("--verbose".into())
        );
        assert!(matches!(
            parse(env(&[("TICKMUD_GRID", "10by10")]), args(&[])),
            Err(ConfigError::Invalid { .. })
        ));
        assert!(matches!(
            parse(env(&[("TICKMUD_GRID", "70000x70000")]), args(&[])),
            Err(ConfigError::Invalid { .. })
        ));
        assert!(matches!(
            parse(env(&[("TICKMUD_ON_EVENT_PANIC", "explode")]), args(&[])),
            Err(ConfigError::Invalid { .. })
        ));
        assert!(matches!(
            parse(env(&[]), args(&["--bind", "nowhere"])),
            Err(ConfigError::Invalid { .. })
        ));
    }
}
