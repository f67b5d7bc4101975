use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use tickwork::{SubmitError, Worker, WorkerStats};

use super::PlayerId;
use super::player::Player;

/// Who is online. Names are unique case-insensitively.
#[derive(Debug, Default)]
pub struct Registry {
    by_name: HashMap<String, Arc<Player>>,
    by_id: HashMap<PlayerId, Arc<Player>>,
}

impl Registry {
    /// Returns `false` if the name is already taken.
    pub fn insert(&mut self, player: Arc<Player>) -> bool {
        let key = player.name().to_ascii_lowercase();
        if self.by_name.contains_key(&key) {
            return false;
        }
        self.by_id.insert(player.id(), player.clone());
        self.by_name.insert(key, player);
        true
    }

    pub fn remove(&mut self, id: PlayerId) -> Option<Arc<Player>> {
        let player = self.by_id.remove(&id)?;
        self.by_name.remove(&player.name().to_ascii_lowercase());
        Some(player)
    }

    pub fn find(&self, name: &str) -> Option<&Arc<Player>> {
        self.by_name.get(&name.to_ascii_lowercase())
    }

    pub fn names(&self) -> Vec<String> {
        let mut names = self
            .by_id
            .values()
            .map(|p| p.name().to_string())
            .collect::<Vec<_>>();
        names.sort_by_key(|n| n.to_ascii_lowercase());
        names
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }
}

/// The global partition: its worker plus the state only it may touch.
#[derive(Debug)]
pub struct Global {
    worker: Worker,
    registry: Arc<Mutex<Registry>>,
}

impl Global {
    pub fn new(worker: Worker) -> Self {
        Self {
            worker,
            registry: Arc::new(Mutex::new(Registry::default())),
        }
    }

    /// Run `event` in the global drain with the registry in hand.
    pub async fn handle<F>(&self, event: F) -> Result<(), SubmitError>
    where
        F: FnOnce(&mut Registry) + Send + 'static,
    {
        let registry = self.registry.clone();
        self.worker
            .handle(move || {
                let mut registry = registry.lock().unwrap_or_else(PoisonError::into_inner);
                event(&mut registry)
            })
            .await
    }

    pub fn stats(&self) -> WorkerStats {
        self.worker.stats()
    }
}
