use tickwork::{SubmitError, Worker, WorkerStats};

use super::{RoomId, ZoneId};

/// A partition of the world with its own worker.
///
/// All occupant changes for the zone's rooms go through [`Zone::handle`],
/// except cross-zone moves, which run on the global worker.
#[derive(Debug)]
pub struct Zone {
    pub id: ZoneId,
    pub name: String,
    pub rooms: Vec<RoomId>,
    worker: Worker,
}

impl Zone {
    pub fn new(id: ZoneId, name: String, rooms: Vec<RoomId>, worker: Worker) -> Self {
        Self {
            id,
            name,
            rooms,
            worker,
        }
    }

    pub async fn handle<F>(&self, event: F) -> Result<(), SubmitError>
    where
        F: FnOnce() + Send + 'static,
    {
        self.worker.handle(event).await
    }

    pub fn stats(&self) -> WorkerStats {
        self.worker.stats()
    }
}
