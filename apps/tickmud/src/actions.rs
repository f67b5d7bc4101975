//! Event bodies. Everything here runs inside a worker's drained section:
//! zone actions in the owning zone's drain, the rest in the global drain.

use std::sync::Arc;

use tickwork::{Lockable, acquire_all};
use tracing::{info, warn};

use crate::command::{self, Command, GotoTarget};
use crate::world::direction::Direction;
use crate::world::location::Location;
use crate::world::player::Player;
use crate::world::registry::Registry;
use crate::world::{RoomId, World, ZoneId};

const NOT_A_COMMAND: &str = "That is not a valid command.";

/// Run a zone-routed command in zone `zone`'s drain.
pub fn run_zone(world: &World, zone: ZoneId, actor: &Arc<Player>, cmd: Command) {
    if world.zone_of(actor.location()) != Some(zone) {
        warn!(player = %actor.name(), zone, "zone event for a player no longer in that zone");
        return;
    }
    match cmd {
        Command::Move(dir) => {
            let Some(to) = current_room(world, actor).and_then(|r| r.exit(dir)).map(|e| e.to) else {
                actor.write("You can't go that way!");
                return;
            };
            move_within(world, zone, actor, to);
        }
        Command::Goto(GotoTarget::Room(id)) => match world.room(id) {
            Some(_) => move_within(world, zone, actor, id),
            None => actor.write("There is no room with that number."),
        },
        Command::Goto(GotoTarget::Missing) => actor.write("Goto where?"),
        Command::Who | Command::Tell { .. } | Command::Goto(GotoTarget::Player(_)) => {
            warn!(player = %actor.name(), ?cmd, "global command routed to a zone");
        }
        other => local(world, actor, other),
    }
}

/// Run a global-routed command in the global drain.
///
/// The global drain excludes every zone, so any command is safe here.
pub fn run_global(world: &World, registry: &mut Registry, actor: &Arc<Player>, cmd: Command) {
    match cmd {
        Command::Who => who(registry, actor),
        Command::Tell { target, msg } => tell(registry, actor, &target, &msg),
        Command::Move(dir) => {
            match current_room(world, actor).and_then(|r| r.exit(dir)).map(|e| e.to) {
                Some(to) => move_across(world, actor, to),
                None => actor.write("You can't go that way!"),
            }
        }
        Command::Goto(GotoTarget::Room(id)) => match world.room(id) {
            Some(_) => move_across(world, actor, id),
            None => actor.write("There is no room with that number."),
        },
        Command::Goto(GotoTarget::Player(name)) => match registry.find(&name) {
            Some(target) if target.id() == actor.id() => actor.write("You are already there."),
            Some(target) => {
                let to = target.location();
                move_across(world, actor, to);
            }
            None => actor.write("There is no player with that name."),
        },
        Command::Goto(GotoTarget::Missing) => actor.write("Goto where?"),
        other => local(world, actor, other),
    }
}

/// Commands that only look at the actor's own room.
fn local(world: &World, actor: &Arc<Player>, cmd: Command) {
    match cmd {
        Command::Look(target) => look(world, actor, target.as_deref()),
        Command::Say(msg) => say(world, actor, &msg),
        Command::Emote(msg) => emote(world, actor, &msg),
        Command::Help(None) => actor.write(&command::help_text(world.chat())),
        Command::Help(Some(topic)) => match command::help_for(&topic, world.chat()) {
            Some(h) => actor.write(h),
            None => actor.write("There is no help on that."),
        },
        Command::Uptime => actor.write(&command::format_uptime(world.uptime())),
        Command::ChatMode(target) => chat_mode(world, actor, target.as_deref()),
        Command::Unknown(_) => actor.write(NOT_A_COMMAND),
        Command::Empty | Command::Quit => {}
        Command::Who | Command::Tell { .. } | Command::Goto(_) | Command::Move(_) => {
            warn!(player = %actor.name(), ?cmd, "movement or global command handled as local");
        }
    }
}

fn chat_mode(world: &World, actor: &Player, target: Option<&str>) {
    if !world.chat().toggleable() {
        actor.write(NOT_A_COMMAND);
        return;
    }
    match target {
        None => {
            let on = !actor.chat_mode();
            actor.set_chat_mode(on);
            actor.write(if on { "Chat mode is now on." } else { "Chat mode is now off." });
        }
        Some("?") => actor.write(if actor.chat_mode() { "Chat mode is on." } else { "Chat mode is off." }),
        Some(other) => actor.write(&format!("Unknown chatmode option {other}.")),
    }
}

fn current_room<'w>(world: &'w World, actor: &Player) -> Option<&'w Arc<Location>> {
    world.room(actor.location())
}

fn look(world: &World, actor: &Arc<Player>, target: Option<&str>) {
    let Some(room) = current_room(world, actor) else {
        return;
    };
    let Some(target) = target else {
        actor.write(&world.room_desc(room, actor));
        return;
    };
    if let Some(p) = room.find_player(target) {
        actor.write(&p.desc());
    } else if let Some(exit) = Direction::find(target).and_then(|d| room.exit(d)) {
        if exit.desc.is_empty() {
            let to = world.room(exit.to).map_or("nothing special", |r| r.name.as_str());
            actor.write(&format!("You see {to}."));
        } else {
            actor.write(&exit.desc);
        }
    } else if let Some(desc) = room.extra(target) {
        actor.write(desc);
    } else {
        actor.write("You don't see that here.");
    }
}

fn say(world: &World, actor: &Arc<Player>, msg: &str) {
    if msg.is_empty() {
        actor.write("Say what?");
        return;
    }
    let line = format!("{}: {}", actor.name(), msg);
    if let Some(room) = current_room(world, actor) {
        room.echo_around(Some(actor), &line);
    }
    actor.write(&line);
}

fn emote(world: &World, actor: &Arc<Player>, msg: &str) {
    if msg.is_empty() {
        actor.write("Emote what?");
        return;
    }
    let line = format!("{} {}", actor.name(), msg);
    if let Some(room) = current_room(world, actor) {
        room.echo_around(Some(actor), &line);
    }
    actor.write(&line);
}

fn who(registry: &Registry, actor: &Player) {
    let mut lines = vec!["[Players]".to_string()];
    lines.extend(registry.names());
    lines.push(format!("{} online.", registry.len()));
    actor.write(&lines.join("\r\n"));
}

fn tell(registry: &Registry, actor: &Player, target: &str, msg: &str) {
    if target.is_empty() || msg.is_empty() {
        actor.write("Tell whom what?");
        return;
    }
    match registry.find(target) {
        Some(p) if p.id() == actor.id() => actor.write("You talk to yourself."),
        Some(p) => {
            p.write(&format!("{} tells you: {}", actor.name(), msg));
            p.prompt();
            actor.write(&format!("You tell {}: {}", p.name(), msg));
        }
        None => actor.write("No one with that name is online."),
    }
}

/// Move inside one zone. Caller holds that zone's drain.
fn move_within(world: &World, zone: ZoneId, actor: &Arc<Player>, to: RoomId) {
    let (Some(from), Some(dest)) = (current_room(world, actor), world.room(to)) else {
        return;
    };
    if dest.zone != zone {
        // Routed on a stale location.
        actor.write("You can't go that way right now.");
        return;
    }
    transfer(world, actor, from, dest);
}

/// Move between any two rooms. Caller holds the global drain.
fn move_across(world: &World, actor: &Arc<Player>, to: RoomId) {
    let (Some(from), Some(dest)) = (current_room(world, actor), world.room(to)) else {
        return;
    };
    let set: [&dyn Lockable; 3] = [&**actor, &**from, &**dest];
    let _held = acquire_all(set);
    if !from.contains(actor) {
        warn!(player = %actor.name(), room = from.id, "mover is not in the room it is leaving");
        return;
    }
    transfer(world, actor, from, dest);
}

fn transfer(world: &World, actor: &Arc<Player>, from: &Location, to: &Location) {
    if from.id == to.id {
        actor.write(&world.room_desc(to, actor));
        return;
    }
    from.remove(actor);
    from.echo_around(Some(actor), &format!("{} leaves.", actor.name()));
    to.echo_around(Some(actor), &format!("{} arrives.", actor.name()));
    to.add(actor.clone());
    actor.set_location(to.id);
    actor.write(&world.room_desc(to, actor));
}

/// Log `player` in: claim the name and place them in their start room.
///
/// Returns `false` if the name is taken. Runs in the global drain.
pub fn enter(world: &World, registry: &mut Registry, player: &Arc<Player>) -> bool {
    let Some(room) = world.room(player.location()) else {
        warn!(player = %player.name(), room = player.location(), "start room missing");
        return false;
    };
    if !registry.insert(player.clone()) {
        return false;
    }
    {
        let set: [&dyn Lockable; 2] = [&**player, &**room];
        let _held = acquire_all(set);
        room.echo_around(Some(player), &format!("{} has entered the game.", player.name()));
        room.add(player.clone());
    }
    info!(player = %player.name(), id = player.id(), room = room.id, online = registry.len(), "player entered");
    player.write(&world.room_desc(room, player));
    player.prompt();
    true
}

/// Log `player` out. Runs in the global drain.
pub fn leave(world: &World, registry: &mut Registry, player: &Arc<Player>) {
    if registry.remove(player.id()).is_none() {
        return;
    }
    if let Some(room) = world.room(player.location()) {
        let set: [&dyn Lockable; 2] = [&**player, &**room];
        let _held = acquire_all(set);
        room.remove(player);
        room.echo_around(Some(player), &format!("{} has left the game.", player.name()));
    }
    info!(player = %player.name(), id = player.id(), online = registry.len(), "player left");
    if registry.is_empty() {
        info!("no players online");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::{ChatMode, ChatPolicy};
    use crate::world::WorldSettings;
    use crate::world::load;
    use lineio::{Outbox, OutboxRx};
    use tickwork::{DoneTracker, Shutdown};

    // A 2x2 grid in two stripes: rooms 1 and 2 are zone 1, rooms 3 and 4 zone 2.
    fn world() -> Arc<World> {
        world_with(ChatMode::default())
    }

    fn world_with(chat: ChatMode) -> Arc<World> {
        let data = load::grid(2, 2, 2, None).unwrap();
        let settings = WorldSettings {
            chat,
            ..WorldSettings::default()
        };
        World::spawn(data, settings, &Shutdown::new(), &DoneTracker::new())
    }

    fn join(world: &World, registry: &mut Registry, name: &str) -> (Arc<Player>, OutboxRx) {
        let (out, rx) = Outbox::channel(64);
        let p = Arc::new(Player::new(world.next_player_id(), name, world.start(), out));
        assert!(enter(world, registry, &p));
        (p, rx)
    }

    fn output(rx: &mut OutboxRx) -> String {
        let mut s = String::new();
        while let Some(b) = rx.try_recv() {
            s.push_str(&String::from_utf8_lossy(&b));
        }
        s
    }

    #[tokio::test]
    async fn entering_shows_the_room_and_claims_the_name() {
        let world = world();
        let mut reg = Registry::default();
        let (alice, mut arx) = join(&world, &mut reg, "Alice");

        let seen = output(&mut arx);
        assert!(seen.starts_with("Room X0 Y0\r\n"));
        assert!(seen.contains("[Exits]\r\neast - Room X1 Y0\r\nsouth - Room X0 Y1"));
        assert!(seen.ends_with("> "));
        assert!(world.room(1).unwrap().contains(&alice));

        let (out, _rx) = Outbox::channel(4);
        let dup = Arc::new(Player::new(world.next_player_id(), "ALICE", world.start(), out));
        assert!(!enter(&world, &mut reg, &dup));
        assert!(!world.room(1).unwrap().contains(&dup));

        let (_bob, _brx) = join(&world, &mut reg, "Bob");
        assert!(output(&mut arx).contains("Bob has entered the game."));
    }

    #[tokio::test]
    async fn say_and_emote_reach_the_room() {
        let world = world();
        let mut reg = Registry::default();
        let (alice, mut arx) = join(&world, &mut reg, "Alice");
        let (_bob, mut brx) = join(&world, &mut reg, "Bob");
        output(&mut arx);
        output(&mut brx);

        run_zone(&world, 1, &alice, Command::Say("hello".into()));
        run_zone(&world, 1, &alice, Command::Emote("waves".into()));
        assert_eq!(output(&mut arx), "Alice: hello\r\nAlice waves\r\n");
        assert_eq!(output(&mut brx), "Alice: hello\r\n> Alice waves\r\n> ");
    }

    #[tokio::test]
    async fn look_at_players_and_missing_things() {
        let world = world();
        let mut reg = Registry::default();
        let (alice, mut arx) = join(&world, &mut reg, "Alice");
        let (_bob, _brx) = join(&world, &mut reg, "Bob");
        output(&mut arx);

        run_zone(&world, 1, &alice, Command::Look(Some("bob".into())));
        run_zone(&world, 1, &alice, Command::Look(Some("unicorn".into())));
        run_zone(&world, 1, &alice, Command::Look(None));
        let seen = output(&mut arx);
        assert!(seen.starts_with("Bob is here.\r\nYou don't see that here.\r\nRoom X0 Y0"));
        assert!(seen.ends_with("Bob is here.\r\n"));

        run_zone(&world, 1, &alice, Command::Look(Some("e".into())));
        assert_eq!(output(&mut arx), "You see Room X1 Y0.\r\n");
    }

    #[tokio::test]
    async fn moving_within_a_zone_announces_both_sides() {
        let world = world();
        let mut reg = Registry::default();
        let (alice, mut arx) = join(&world, &mut reg, "Alice");
        let (bob, mut brx) = join(&world, &mut reg, "Bob");
        output(&mut arx);
        output(&mut brx);

        run_zone(&world, 1, &alice, Command::Move(Direction::South));
        assert_eq!(alice.location(), 2);
        assert!(world.room(2).unwrap().contains(&alice));
        assert!(!world.room(1).unwrap().contains(&alice));
        assert!(output(&mut arx).starts_with("Room X0 Y1"));
        assert_eq!(output(&mut brx), "Alice leaves.\r\n> ");

        run_zone(&world, 1, &bob, Command::Move(Direction::South));
        assert!(output(&mut arx).contains("Bob arrives."));

        run_zone(&world, 1, &alice, Command::Move(Direction::West));
        assert_eq!(output(&mut arx), "You can't go that way!\r\n");
    }

    #[tokio::test]
    async fn zone_event_refuses_cross_zone_destinations() {
        let world = world();
        let mut reg = Registry::default();
        let (alice, mut arx) = join(&world, &mut reg, "Alice");
        output(&mut arx);

        run_zone(&world, 1, &alice, Command::Goto(GotoTarget::Room(4)));
        assert_eq!(alice.location(), 1);
        assert_eq!(output(&mut arx), "You can't go that way right now.\r\n");
    }

    #[tokio::test]
    async fn zone_event_for_another_zone_does_nothing() {
        let world = world();
        let mut reg = Registry::default();
        let (alice, mut arx) = join(&world, &mut reg, "Alice");
        output(&mut arx);

        run_zone(&world, 2, &alice, Command::Look(None));
        assert_eq!(output(&mut arx), "");
    }

    #[tokio::test]
    async fn global_moves_cross_zones_and_follow_players() {
        let world = world();
        let mut reg = Registry::default();
        let (alice, mut arx) = join(&world, &mut reg, "Alice");
        let (bob, _brx) = join(&world, &mut reg, "Bob");

        run_global(&world, &mut reg, &alice, Command::Move(Direction::East));
        assert_eq!(alice.location(), 3);
        assert_eq!(world.zone_of(alice.location()), Some(2));
        assert!(world.room(3).unwrap().contains(&alice));
        assert!(!world.room(1).unwrap().contains(&alice));

        run_global(&world, &mut reg, &bob, Command::Goto(GotoTarget::Player("alice".into())));
        assert_eq!(bob.location(), 3);
        assert!(output(&mut arx).contains("Bob arrives."));

        run_global(&world, &mut reg, &bob, Command::Goto(GotoTarget::Room(99)));
        run_global(&world, &mut reg, &bob, Command::Goto(GotoTarget::Player("nobody".into())));
        assert_eq!(bob.location(), 3);

        // Every lock taken for the moves was released again.
        assert!(!world.room(1).unwrap().is_locked());
        assert!(!world.room(3).unwrap().is_locked());
    }

    #[tokio::test]
    async fn who_and_tell_use_the_registry() {
        let world = world();
        let mut reg = Registry::default();
        let (alice, mut arx) = join(&world, &mut reg, "Alice");
        let (_bob, mut brx) = join(&world, &mut reg, "bob");
        output(&mut arx);
        output(&mut brx);

        run_global(&world, &mut reg, &alice, Command::Who);
        assert_eq!(output(&mut arx), "[Players]\r\nAlice\r\nbob\r\n2 online.\r\n");

        run_global(
            &world,
            &mut reg,
            &alice,
            Command::Tell {
                target: "BOB".into(),
                msg: "psst".into(),
            },
        );
        assert_eq!(output(&mut brx), "Alice tells you: psst\r\n> ");
        assert_eq!(output(&mut arx), "You tell bob: psst\r\n");

        run_global(
            &world,
            &mut reg,
            &alice,
            Command::Tell {
                target: "carol".into(),
                msg: "hi".into(),
            },
        );
        assert_eq!(output(&mut arx), "No one with that name is online.\r\n");
    }

    #[tokio::test]
    async fn leaving_frees_the_room_and_the_name() {
        let world = world();
        let mut reg = Registry::default();
        let (alice, mut arx) = join(&world, &mut reg, "Alice");
        let (bob, _brx) = join(&world, &mut reg, "Bob");
        output(&mut arx);

        leave(&world, &mut reg, &bob);
        assert!(!world.room(1).unwrap().contains(&bob));
        assert!(reg.find("bob").is_none());
        assert_eq!(output(&mut arx), "Bob has left the game.\r\n> ");

        // A second leave is a no-op.
        leave(&world, &mut reg, &bob);
        assert_eq!(reg.len(), 1);
        assert!(reg.find("alice").is_some_and(|p| p.id() == alice.id()));
    }

    #[tokio::test]
    async fn unknown_and_empty_commands() {
        let world = world();
        let mut reg = Registry::default();
        let (alice, mut arx) = join(&world, &mut reg, "Alice");
        output(&mut arx);

        run_zone(&world, 1, &alice, Command::Unknown("dance".into()));
        run_zone(&world, 1, &alice, Command::Empty);
        assert_eq!(output(&mut arx), "That is not a valid command.\r\n");
    }

    #[tokio::test]
    async fn chatmode_toggles_and_reports() {
        let world = world();
        let mut reg = Registry::default();
        let (alice, mut arx) = join(&world, &mut reg, "Alice");
        output(&mut arx);

        run_zone(&world, 1, &alice, Command::ChatMode(Some("?".into())));
        run_zone(&world, 1, &alice, Command::ChatMode(None));
        assert!(alice.chat_mode());
        run_zone(&world, 1, &alice, Command::ChatMode(Some("?".into())));
        run_zone(&world, 1, &alice, Command::ChatMode(None));
        run_zone(&world, 1, &alice, Command::ChatMode(Some("loud".into())));
        assert!(!alice.chat_mode());
        assert_eq!(
            output(&mut arx),
            "Chat mode is off.\r\nChat mode is now on.\r\nChat mode is on.\r\n\
             Chat mode is now off.\r\nUnknown chatmode option loud.\r\n"
        );
    }

    #[tokio::test]
    async fn chatmode_is_refused_unless_allowed() {
        let world = world_with(ChatMode {
            policy: ChatPolicy::Require,
            default_on: true,
            prefix: String::new(),
        });
        let mut reg = Registry::default();
        let (alice, mut arx) = join(&world, &mut reg, "Alice");
        alice.set_chat_mode(true);
        output(&mut arx);

        run_zone(&world, 1, &alice, Command::ChatMode(None));
        assert!(alice.chat_mode());
        assert_eq!(output(&mut arx), "That is not a valid command.\r\n");

        run_zone(&world, 1, &alice, Command::Help(None));
        assert!(!output(&mut arx).contains("chatmode"));
    }
}
