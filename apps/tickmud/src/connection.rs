use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use lineio::{DEFAULT_OUTBOX_DEPTH, LineReader, Outbox, pump};
use tickwork::{Shutdown, SubmitError};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use crate::actions;
use crate::command::Command;
use crate::dispatch::Dispatcher;
use crate::world::player::Player;

const NAME_RULES: &str = "Names are 2 to 20 letters, digits or underscores.";

enum Input {
    Line(String),
    Closed,
    TooLong,
    ShuttingDown,
}

async fn next_input<R: AsyncRead + Unpin>(
    lines: &mut LineReader<R>,
    shutdown: &Shutdown,
) -> anyhow::Result<Input> {
    tokio::select! {
        r = lines.read_line() => match r {
            Ok(Some(line)) => Ok(Input::Line(line)),
            Ok(None) => Ok(Input::Closed),
            Err(e) if e.kind() == std::io::ErrorKind::InvalidData => Ok(Input::TooLong),
            Err(e) => Err(e.into()),
        },
        _ = shutdown.wait() => Ok(Input::ShuttingDown),
    }
}

fn confirmed(answer: &str) -> bool {
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}

pub fn valid_name(name: &str) -> bool {
    (2..=20).contains(&name.len()) && name.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_')
}

/// Serve one client from greeting to goodbye.
///
/// The connection never touches world state itself: every command goes
/// through the dispatcher, and the next line is only read once the previous
/// command's event has run.
pub async fn handle_conn<S>(
    stream: S,
    peer: SocketAddr,
    dispatcher: Dispatcher,
    shutdown: Shutdown,
    max_line: usize,
) -> anyhow::Result<()>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    let (rd, wr) = tokio::io::split(stream);
    let (out, out_rx) = Outbox::channel(DEFAULT_OUTBOX_DEPTH);
    let writer = tokio::spawn(pump(out_rx, wr));
    let mut lines = LineReader::new(rd).max_line_len(max_line);

    out.line("Welcome to tickmud.");
    let player = login(&mut lines, &out, &dispatcher, &shutdown).await;
    let player = match player {
        Ok(Some(p)) => p,
        Ok(None) => {
            info!(peer = %peer, "disconnected before entering world");
            drop(out);
            finish_writer(writer).await;
            return Ok(());
        }
        Err(e) => return Err(e),
    };
    info!(peer = %peer, player = %player.name(), "entered world");

    let result = play(&mut lines, &player, &dispatcher, &shutdown).await;

    leave(&dispatcher, &player).await;
    info!(peer = %peer, player = %player.name(), "left world");
    drop(player);
    drop(out);
    finish_writer(writer).await;
    result
}

async fn finish_writer(mut writer: tokio::task::JoinHandle<std::io::Result<()>>) {
    match tokio::time::timeout(Duration::from_secs(1), &mut writer).await {
        Ok(Ok(Ok(()))) => {}
        Ok(Ok(Err(e))) => debug!(err = %e, "output writer failed"),
        Ok(Err(e)) => debug!(err = %e, "output writer task failed"),
        Err(_) => {
            // Something in the world still holds this player's outbox.
            debug!("output writer still busy; aborting");
            writer.abort();
        }
    }
}

async fn login<R: AsyncRead + Unpin>(
    lines: &mut LineReader<R>,
    out: &Outbox,
    dispatcher: &Dispatcher,
    shutdown: &Shutdown,
) -> anyhow::Result<Option<Arc<Player>>> {
    let world = dispatcher.world();
    loop {
        out.send("By what name do you wish to be known? ");
        let name = match next_input(lines, shutdown).await? {
            Input::Line(l) => l.trim().to_string(),
            Input::TooLong => {
                out.line(NAME_RULES);
                return Ok(None);
            }
            Input::Closed | Input::ShuttingDown => return Ok(None),
        };
        if !valid_name(&name) {
            out.line(NAME_RULES);
            continue;
        }

        let player = Player::new(world.next_player_id(), name, world.start(), out.clone())
            .with_chat_mode(world.chat().starts_on());
        let player = Arc::new(player);
        let (tx, rx) = oneshot::channel();
        let (w, p) = (world.clone(), player.clone());
        let submitted = world
            .global()
            .handle(move |registry| {
                let _ = tx.send(actions::enter(&w, registry, &p));
            })
            .await;
        if let Err(e) = submitted {
            debug!(err = %e, "login refused");
            out.line("The world is not accepting players right now.");
            return Ok(None);
        }
        match rx.await {
            Ok(true) => return Ok(Some(player)),
            Ok(false) => {
                out.line("That name is taken.");
            }
            Err(_) => return Ok(None),
        }
    }
}

async fn play<R: AsyncRead + Unpin>(
    lines: &mut LineReader<R>,
    player: &Arc<Player>,
    dispatcher: &Dispatcher,
    shutdown: &Shutdown,
) -> anyhow::Result<()> {
    loop {
        let line = match next_input(lines, shutdown).await? {
            Input::Line(l) => l,
            Input::TooLong => {
                player.write("Line too long.");
                return Ok(());
            }
            Input::Closed => return Ok(()),
            Input::ShuttingDown => {
                player.write("The world is shutting down. Goodbye.");
                return Ok(());
            }
        };

        let cmd = dispatcher.world().chat().interpret(&line, player.chat_mode());
        if cmd == Command::Quit {
            player.outbox().send("Are you sure you want to quit? (y/n) ");
            match next_input(lines, shutdown).await? {
                Input::Line(l) if confirmed(&l) => {
                    player.write("Goodbye.");
                    return Ok(());
                }
                Input::Line(_) => {
                    player.prompt();
                    continue;
                }
                Input::Closed | Input::TooLong | Input::ShuttingDown => return Ok(()),
            }
        }

        match dispatcher.dispatch(player, cmd).await {
            Ok(done) => {
                if !done.wait().await {
                    player.write("Something went wrong.");
                    player.prompt();
                }
            }
            Err(SubmitError::ShuttingDown) => {
                player.write("The world is shutting down. Goodbye.");
                return Ok(());
            }
            Err(SubmitError::Stopped) => {
                warn!(player = %player.name(), "command dropped; its worker has stopped");
                player.write("Nothing happens.");
                player.prompt();
            }
        }
    }
}

/// Best effort: during shutdown the global worker may already refuse work.
async fn leave(dispatcher: &Dispatcher, player: &Arc<Player>) {
    let world = dispatcher.world();
    let (tx, rx) = oneshot::channel();
    let (w, p) = (world.clone(), player.clone());
    let submitted = world
        .global()
        .handle(move |registry| {
            actions::leave(&w, registry, &p);
            let _ = tx.send(());
        })
        .await;
    match submitted {
        Ok(()) => {
            let _ = rx.await;
        }
        Err(e) => debug!(player = %player.name(), err = %e, "deregistration skipped"),
    }
}
