use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use lineio::Outbox;
use tickwork::{LockId, Lockable, ResourceLock};

use super::{PlayerId, RoomId};

/// A connected character.
///
/// `location` is only written inside the drain that owns the move (the zone's
/// worker, or the global worker for cross-zone moves). Anyone may read it, but
/// outside those drains the value is only a routing hint.
#[derive(Debug)]
pub struct Player {
    id: PlayerId,
    name: String,
    lock: ResourceLock,
    location: AtomicU32,
    // Written by the player's own zone events, read by its connection
    // between commands.
    chat_mode: AtomicBool,
    out: Outbox,
}

impl Player {
    pub fn new(id: PlayerId, name: impl Into<String>, location: RoomId, out: Outbox) -> Self {
        Self {
            id,
            name: name.into(),
            lock: ResourceLock::new(),
            location: AtomicU32::new(location),
            chat_mode: AtomicBool::new(false),
            out,
        }
    }

    pub fn with_chat_mode(self, on: bool) -> Self {
        self.chat_mode.store(on, Ordering::Relaxed);
        self
    }

    pub fn id(&self) -> PlayerId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn location(&self) -> RoomId {
        self.location.load(Ordering::Acquire)
    }

    pub(crate) fn set_location(&self, room: RoomId) {
        self.location.store(room, Ordering::Release);
    }

    pub fn chat_mode(&self) -> bool {
        self.chat_mode.load(Ordering::Relaxed)
    }

    pub fn set_chat_mode(&self, on: bool) {
        self.chat_mode.store(on, Ordering::Relaxed);
    }

    /// What others see when they look at this player.
    pub fn desc(&self) -> String {
        format!("{} is here.", self.name)
    }

    pub fn write(&self, text: &str) {
        self.out.line(text);
    }

    pub fn prompt(&self) {
        self.out.prompt();
    }

    pub fn outbox(&self) -> &Outbox {
        &self.out
    }
}

impl Lockable for Player {
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
