use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tickwork::{LockId, Lockable, ResourceLock};

use super::direction::Direction;
use super::player::Player;
use super::{RoomId, ZoneId};

#[derive(Clone, Debug)]
pub struct Exit {
    pub dir: Direction,
    pub to: RoomId,
    pub desc: String,
}

#[derive(Clone, Debug)]
pub struct ExtraDesc {
    pub keywords: Vec<String>,
    pub desc: String,
}

/// A room. Everything but the occupant list is fixed after load.
#[derive(Debug)]
pub struct Location {
    pub id: RoomId,
    pub zone: ZoneId,
    pub name: String,
    pub desc: String,
    /// Sorted by direction.
    pub exits: Vec<Exit>,
    pub extras: Vec<ExtraDesc>,
    lock: ResourceLock,
    // Mutated only inside the owning zone's drain, or the global drain.
    occupants: Mutex<Vec<Arc<Player>>>,
}

impl Location {
    pub fn new(
        id: RoomId,
        zone: ZoneId,
        name: String,
        desc: String,
        mut exits: Vec<Exit>,
        extras: Vec<ExtraDesc>,
    ) -> Self {
        exits.sort_by_key(|e| e.dir);
        Self {
            id,
            zone,
            name,
            desc,
            exits,
            extras,
            lock: ResourceLock::new(),
            occupants: Mutex::new(Vec::new()),
        }
    }

    #[cfg(test)]
    pub fn is_locked(&self) -> bool {
        self.lock.is_locked()
    }

    pub fn exit(&self, dir: Direction) -> Option<&Exit> {
        self.exits.iter().find(|e| e.dir == dir)
    }

    fn occupants(&self) -> MutexGuard<'_, Vec<Arc<Player>>> {
        self.occupants.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn add(&self, player: Arc<Player>) {
        let mut occ = self.occupants();
        if !occ.iter().any(|p| p.id() == player.id()) {
            occ.push(player);
        }
    }

    pub fn remove(&self, player: &Player) -> bool {
        let mut occ = self.occupants();
        let before = occ.len();
        occ.retain(|p| p.id() != player.id());
        occ.len() != before
    }

    pub fn contains(&self, player: &Player) -> bool {
        self.occupants().iter().any(|p| p.id() == player.id())
    }

    pub fn players(&self) -> Vec<Arc<Player>> {
        self.occupants().clone()
    }

    /// Player in the room by case-insensitive name.
    pub fn find_player(&self, name: &str) -> Option<Arc<Player>> {
        self.occupants()
            .iter()
            .find(|p| p.name().eq_ignore_ascii_case(name))
            .cloned()
    }

    /// Extra description for a look keyword.
    pub fn extra(&self, keyword: &str) -> Option<&str> {
        self.extras
            .iter()
            .find(|x| x.keywords.iter().any(|k| k.eq_ignore_ascii_case(keyword)))
            .map(|x| x.desc.as_str())
    }

    /// Send `text` to everyone here except `except`, and re-prompt them.
    pub fn echo_around(&self, except: Option<&Player>, text: &str) {
        for p in self.occupants().iter() {
            if except.is_some_and(|e| e.id() == p.id()) {
                continue;
            }
            p.write(text);
            p.prompt();
        }
    }
}

impl Lockable for Location {
    fn lock_id(&self) -> LockId {
        self.lock.id()
    }

    fn lock(&self) {
        self.lock.lock()
    }

    fn unlock(&self) {
        self.lock.unlock()
    }
}

impl std::fmt::Display for Location {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} [{}]", self.name, self.id)
    }
}
