//! The world: rooms, the zones that own them, and the global partition.

pub mod direction;
pub mod load;
pub mod location;
pub mod player;
pub mod registry;
pub mod zone;

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tickwork::{CoordinationLock, DoneTracker, PanicPolicy, Shutdown, Worker, WorkerConfig};
use tracing::info;

use crate::command::ChatMode;

use self::load::WorldData;
use self::location::Location;
use self::player::Player;
use self::registry::Global;
use self::zone::Zone;

pub type ZoneId = u32;
pub type RoomId = u32;
pub type PlayerId = u64;

#[derive(Clone, Debug)]
pub struct WorldSettings {
    pub tick: Duration,
    pub on_panic: PanicPolicy,
    pub chat: ChatMode,
}

impl Default for WorldSettings {
    fn default() -> Self {
        Self {
            tick: tickwork::DEFAULT_TICK,
            on_panic: PanicPolicy::default(),
            chat: ChatMode::default(),
        }
    }
}

#[derive(Debug)]
pub struct World {
    zones: BTreeMap<ZoneId, Zone>,
    rooms: HashMap<RoomId, Arc<Location>>,
    start: RoomId,
    global: Global,
    started: std::time::Instant,
    next_player: AtomicU64,
    chat: ChatMode,
}

impl World {
    /// Build the world and spawn one worker per zone plus the global worker.
    ///
    /// Must be called inside a tokio runtime.
    pub fn spawn(data: WorldData, settings: WorldSettings, shutdown: &Shutdown, done: &DoneTracker) -> Arc<World> {
        let coordination = CoordinationLock::new();
        let mut by_zone = load::rooms_by_zone(&data.rooms);

        let config = |name: String| {
            WorkerConfig::new(name)
                .tick(settings.tick)
                .on_panic(settings.on_panic)
        };

        let zones = data
            .zones
            .into_iter()
            .map(|z| {
                let worker = Worker::spawn(
                    coordination.shared(),
                    shutdown.clone(),
                    done,
                    config(format!("zone-{}", z.id)),
                );
                let rooms = by_zone.remove(&z.id).unwrap_or_default();
                (z.id, Zone::new(z.id, z.name, rooms, worker))
            })
            .collect::<BTreeMap<_, _>>();

        let global = Global::new(Worker::spawn(
            coordination.exclusive(),
            shutdown.clone(),
            done,
            config("global".to_string()),
        ));

        let rooms = data
            .rooms
            .into_iter()
            .map(|r| (r.id, Arc::new(r)))
            .collect::<HashMap<_, _>>();

        info!(
            zones = zones.len(),
            rooms = rooms.len(),
            start = data.start,
            tick_ms = settings.tick.as_millis() as u64,
            "world ready"
        );

        Arc::new(World {
            zones,
            rooms,
            start: data.start,
            global,
            started: std::time::Instant::now(),
            next_player: AtomicU64::new(1),
            chat: settings.chat,
        })
    }

    pub fn room(&self, id: RoomId) -> Option<&Arc<Location>> {
        self.rooms.get(&id)
    }

    pub fn zone(&self, id: ZoneId) -> Option<&Zone> {
        self.zones.get(&id)
    }

    pub fn zones(&self) -> impl Iterator<Item = &Zone> {
        self.zones.values()
    }

    pub fn zone_of(&self, room: RoomId) -> Option<ZoneId> {
        self.rooms.get(&room).map(|r| r.zone)
    }

    pub fn start(&self) -> RoomId {
        self.start
    }

    pub fn chat(&self) -> &ChatMode {
        &self.chat
    }

    pub fn global(&self) -> &Global {
        &self.global
    }

    pub fn uptime(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn next_player_id(&self) -> PlayerId {
        self.next_player.fetch_add(1, Ordering::Relaxed)
    }

    /// What `viewer` sees on entering or looking at `loc`.
    pub fn room_desc(&self, loc: &Location, viewer: &Player) -> String {
        let mut lines = vec![loc.name.clone(), String::new(), loc.desc.clone(), String::new()];

        if loc.exits.is_empty() {
            lines.push("There are no exits!".to_string());
        } else {
            lines.push("[Exits]".to_string());
            for e in &loc.exits {
                let to = self.rooms.get(&e.to).map_or("somewhere", |r| r.name.as_str());
                lines.push(format!("{} - {}", e.dir, to));
            }
        }

        let others = loc
            .players()
            .into_iter()
            .filter(|p| p.id() != viewer.id())
            .collect::<Vec<_>>();
        if !others.is_empty() {
            lines.push(String::new());
            lines.extend(others.iter().map(|p| p.desc()));
        }

        lines.join("\r\n")
    }
}
