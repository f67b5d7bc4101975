use std::sync::Arc;

use tickwork::SubmitError;
use tokio::sync::oneshot;

use crate::actions;
use crate::command::{Command, GotoTarget};
use crate::world::player::Player;
use crate::world::{RoomId, World, ZoneId};

/// Which worker runs a command.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Route {
    Zone(ZoneId),
    Global,
}

/// Resolves once the dispatched event (prompt included) has run.
#[derive(Debug)]
pub struct Completion {
    rx: oneshot::Receiver<()>,
}

impl Completion {
    /// `false` if the event was dropped without finishing, e.g. it panicked
    /// or its worker halted.
    pub async fn wait(self) -> bool {
        self.rx.await.is_ok()
    }
}

#[derive(Clone, Debug)]
pub struct Dispatcher {
    world: Arc<World>,
}

impl Dispatcher {
    pub fn new(world: Arc<World>) -> Self {
        Self { world }
    }

    pub fn world(&self) -> &Arc<World> {
        &self.world
    }

    /// Decide where `cmd`, issued from room `from`, must run.
    pub fn route(&self, from: RoomId, cmd: &Command) -> Route {
        let Some(here) = self.world.zone_of(from) else {
            return Route::Global;
        };
        let stay_or_cross = |to: Option<RoomId>| match to.and_then(|to| self.world.zone_of(to)) {
            Some(z) if z != here => Route::Global,
            _ => Route::Zone(here),
        };
        match cmd {
            Command::Who | Command::Tell { .. } => Route::Global,
            Command::Goto(GotoTarget::Player(_)) => Route::Global,
            Command::Goto(GotoTarget::Room(to)) => stay_or_cross(Some(*to)),
            Command::Move(dir) => stay_or_cross(
                self.world
                    .room(from)
                    .and_then(|r| r.exit(*dir))
                    .map(|e| e.to),
            ),
            _ => Route::Zone(here),
        }
    }

    /// Submit `cmd` for `actor`. The event writes the trailing prompt itself.
    pub async fn dispatch(&self, actor: &Arc<Player>, cmd: Command) -> Result<Completion, SubmitError> {
        let (tx, rx) = oneshot::channel();
        let world = self.world.clone();
        let actor = actor.clone();

        match self.route(actor.location(), &cmd) {
            Route::Zone(zone) => {
                let Some(z) = self.world.zone(zone) else {
                    return Err(SubmitError::Stopped);
                };
                z.handle(move || {
                    actions::run_zone(&world, zone, &actor, cmd);
                    actor.prompt();
                    let _ = tx.send(());
                })
                .await?;
            }
            Route::Global => {
                self.world
                    .global()
                    .handle(move |registry| {
                        actions::run_global(&world, registry, &actor, cmd);
                        actor.prompt();
                        let _ = tx.send(());
                    })
                    .await?;
            }
        }
        Ok(Completion { rx })
    }
}
