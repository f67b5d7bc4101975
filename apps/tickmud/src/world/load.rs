//! World data: JSON zone/room files, or a generated grid.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::Deserialize;
use tracing::info;

use super::direction::Direction;
use super::location::{Exit, ExtraDesc, Location};
use super::{RoomId, ZoneId};

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ZoneDef {
    #[serde(rename = "ID")]
    pub id: ZoneId,
    pub name: String,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RoomDef {
    #[serde(rename = "ID")]
    pub id: RoomId,
    pub zone: ZoneId,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub exits: Vec<ExitDef>,
    #[serde(default, rename = "ExtraDescs")]
    pub extras: Vec<ExtraDef>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ExitDef {
    pub direction: String,
    #[serde(default)]
    pub description: String,
    /// `-1` marks an exit that leads nowhere; it is skipped.
    pub destination: i64,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ExtraDef {
    pub keywords: Vec<String>,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Deserialize)]
struct RoomFile {
    rooms: Vec<RoomDef>,
}

/// A validated world, ready to be spawned.
#[derive(Debug)]
pub struct WorldData {
    pub zones: Vec<ZoneDef>,
    /// In load order.
    pub rooms: Vec<Location>,
    pub start: RoomId,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadError {
    Empty,
    DuplicateZone(ZoneId),
    DuplicateRoom(RoomId),
    UnknownZone { room: RoomId, zone: ZoneId },
    UnknownDirection { room: RoomId, direction: String },
    UnknownDestination { room: RoomId, direction: Direction, to: i64 },
    UnknownStart(RoomId),
    GridTooLarge { width: u32, height: u32 },
}

impl std::fmt::Display for LoadError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LoadError::Empty => write!(f, "world has no rooms"),
            LoadError::DuplicateZone(z) => write!(f, "zone {z} is defined twice"),
            LoadError::DuplicateRoom(r) => write!(f, "room {r} is defined twice"),
            LoadError::UnknownZone { room, zone } => {
                write!(f, "room {room} belongs to unknown zone {zone}")
            }
            LoadError::UnknownDirection { room, direction } => {
                write!(f, "room {room} has an exit in unknown direction {direction:?}")
            }
            LoadError::UnknownDestination { room, direction, to } => {
                write!(f, "room {room} exit {direction} leads to unknown room {to}")
            }
            LoadError::UnknownStart(r) => write!(f, "start room {r} does not exist"),
            LoadError::GridTooLarge { width, height } => {
                write!(f, "a {width}x{height} grid is over {MAX_GRID_ROOMS} rooms")
            }
        }
    }
}

impl std::error::Error for LoadError {}

/// Check references and build locations.
///
/// `start` defaults to the first room.
pub fn build(zones: Vec<ZoneDef>, rooms: Vec<RoomDef>, start: Option<RoomId>) -> Result<WorldData, LoadError> {
    let mut zone_ids = HashSet::new();
    for z in &zones {
        if !zone_ids.insert(z.id) {
            return Err(LoadError::DuplicateZone(z.id));
        }
    }

    let mut room_ids = HashSet::new();
    for r in &rooms {
        if !room_ids.insert(r.id) {
            return Err(LoadError::DuplicateRoom(r.id));
        }
        if !zone_ids.contains(&r.zone) {
            return Err(LoadError::UnknownZone {
                room: r.id,
                zone: r.zone,
            });
        }
    }

    let start = match (start, rooms.first()) {
        (Some(s), _) if room_ids.contains(&s) => s,
        (Some(s), _) => return Err(LoadError::UnknownStart(s)),
        (None, Some(first)) => first.id,
        (None, None) => return Err(LoadError::Empty),
    };

    let mut locations = Vec::with_capacity(rooms.len());
    for r in rooms {
        let mut exits = Vec::with_capacity(r.exits.len());
        for e in r.exits {
            let Some(dir) = Direction::find(&e.direction) else {
                return Err(LoadError::UnknownDirection {
                    room: r.id,
                    direction: e.direction,
                });
            };
            if e.destination == -1 {
                continue;
            }
            let to = RoomId::try_from(e.destination)
                .ok()
                .filter(|to| room_ids.contains(to))
                .ok_or(LoadError::UnknownDestination {
                    room: r.id,
                    direction: dir,
                    to: e.destination,
                })?;
            exits.push(Exit {
                dir,
                to,
                desc: e.description,
            });
        }
        let extras = r
            .extras
            .into_iter()
            .map(|x| ExtraDesc {
                keywords: x.keywords,
                desc: x.description,
            })
            .collect();
        locations.push(Location::new(r.id, r.zone, r.name, r.description, exits, extras));
    }

    Ok(WorldData {
        zones,
        rooms: locations,
        start,
    })
}

/// Load `dir/zones/*.json` and `dir/rooms/*.json`.
pub fn from_dir(dir: &Path, start: Option<RoomId>) -> anyhow::Result<WorldData> {
    let mut zones = Vec::new();
    for path in json_files(&dir.join("zones"))? {
        let raw = std::fs::read(&path).with_context(|| format!("read {}", path.display()))?;
        let zone: ZoneDef =
            serde_json::from_slice(&raw).with_context(|| format!("parse zone file {}", path.display()))?;
        zones.push(zone);
    }
    info!(count = zones.len(), dir = %dir.display(), "loaded zones");

    let mut rooms = Vec::new();
    for path in json_files(&dir.join("rooms"))? {
        let raw = std::fs::read(&path).with_context(|| format!("read {}", path.display()))?;
        let file: RoomFile =
            serde_json::from_slice(&raw).with_context(|| format!("parse room file {}", path.display()))?;
        rooms.extend(file.rooms);
    }
    info!(count = rooms.len(), dir = %dir.display(), "loaded rooms");

    build(zones, rooms, start).with_context(|| format!("world data in {}", dir.display()))
}

fn json_files(dir: &Path) -> anyhow::Result<Vec<PathBuf>> {
    let mut out = Vec::new();
    for entry in std::fs::read_dir(dir).with_context(|| format!("read dir {}", dir.display()))? {
        let path = entry?.path();
        if path.extension().is_some_and(|e| e == "json") {
            out.push(path);
        }
    }
    out.sort();
    Ok(out)
}

pub const MAX_GRID_ROOMS: u32 = 1_000_000;

/// A `width` x `height` grid of rooms split into `zones` vertical stripes.
///
/// Room `(x, y)` gets id `x * height + y + 1`; the start is `(0, 0)` unless
/// `start` says otherwise.
pub fn grid(width: u32, height: u32, zones: u32, start: Option<RoomId>) -> Result<WorldData, LoadError> {
    let total = width
        .checked_mul(height)
        .filter(|n| *n <= MAX_GRID_ROOMS)
        .ok_or(LoadError::GridTooLarge { width, height })?;
    let zones = zones.clamp(1, width.max(1));
    // Below MAX_GRID_ROOMS, so none of this overflows.
    let id = |x: u32, y: u32| x * height + y + 1;
    let zone_of = |x: u32| (u64::from(x) * u64::from(zones) / u64::from(width.max(1))) as u32 + 1;

    let zone_defs = (1..=zones)
        .map(|z| ZoneDef {
            id: z,
            name: format!("Stripe {z}"),
        })
        .collect::<Vec<_>>();

    let mut rooms = Vec::with_capacity(total as usize);
    for x in 0..width {
        for y in 0..height {
            let mut exits = Vec::new();
            let mut link = |dir: Direction, to: RoomId| {
                exits.push(ExitDef {
                    direction: dir.name().to_string(),
                    description: String::new(),
                    destination: i64::from(to),
                })
            };
            if x > 0 {
                link(Direction::West, id(x - 1, y));
            }
            if x + 1 < width {
                link(Direction::East, id(x + 1, y));
            }
            if y > 0 {
                link(Direction::North, id(x, y - 1));
            }
            if y + 1 < height {
                link(Direction::South, id(x, y + 1));
            }
            let name = format!("Room X{x} Y{y}");
            rooms.push(RoomDef {
                id: id(x, y),
                zone: zone_of(x),
                description: format!("This is the description of room {name}"),
                name,
                exits,
                extras: Vec::new(),
            });
        }
    }

    build(zone_defs, rooms, start)
}

/// Rooms grouped by zone, in load order.
pub fn rooms_by_zone(rooms: &[Location]) -> HashMap<ZoneId, Vec<RoomId>> {
    let mut out: HashMap<ZoneId, Vec<RoomId>> = HashMap::new();
    for r in rooms {
        out.entry(r.zone).or_default().push(r.id);
    }
    out
}
