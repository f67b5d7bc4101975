mod actions;
mod command;
mod config;
mod connection;
mod dispatch;
mod world;

use anyhow::Context;
use tickwork::{DoneTracker, Shutdown};
use tokio::net::TcpListener;
use tracing::{Level, error, info, warn};

use crate::dispatch::Dispatcher;
use crate::world::{World, load};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tickmud=info".into()),
        )
        .with_target(false)
        .with_max_level(Level::INFO)
        .init();

    let cfg = config::parse_args();

    let data = match &cfg.data_dir {
        Some(dir) => load::from_dir(dir, cfg.start_room)?,
        None => load::grid(cfg.grid.0, cfg.grid.1, cfg.grid_zones, cfg.start_room)
            .context("build grid world")?,
    };

    let shutdown = Shutdown::new();
    let done = DoneTracker::new();
    let world = World::spawn(data, cfg.world(), &shutdown, &done);
    let dispatcher = Dispatcher::new(world.clone());

    let listener = TcpListener::bind(cfg.bind)
        .await
        .with_context(|| format!("bind {}", cfg.bind))?;
    info!(
        bind = %cfg.bind,
        zones = world.zones().count(),
        tick_ms = cfg.tick.as_millis() as u64,
        on_panic = ?cfg.on_panic,
        "tickmud listening"
    );

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    loop {
        tokio::select! {
            accepted = listener.accept() => {
                let (stream, peer) = match accepted {
                    Ok(conn) => conn,
                    Err(e) => {
                        warn!(err = %e, "accept failed");
                        continue;
                    }
                };
                let dispatcher = dispatcher.clone();
                let shutdown = shutdown.clone();
                let max_line = cfg.max_line;
                tokio::spawn(async move {
                    if let Err(e) = connection::handle_conn(stream, peer, dispatcher, shutdown, max_line).await {
                        warn!(peer = %peer, err = %e, "connection ended with error");
                    }
                });
            }
            r = &mut ctrl_c => {
                if let Err(e) = r {
                    error!(err = %e, "failed to listen for ctrl-c");
                }
                break;
            }
        }
    }

    info!("shutting down");
    shutdown.raise();
    drop(listener);

    if done.wait_timeout(cfg.shutdown_timeout).await {
        for z in world.zones() {
            let s = z.stats();
            info!(
                zone = z.id,
                name = %z.name,
                rooms = z.rooms.len(),
                executed = s.executed,
                panicked = s.panicked,
                "zone stopped"
            );
        }
        let s = world.global().stats();
        info!(executed = s.executed, panicked = s.panicked, "all workers stopped");
        Ok(())
    } else {
        error!(
            timeout_ms = cfg.shutdown_timeout.as_millis() as u64,
            "workers did not stop in time; forcing exit"
        );
        std::process::exit(1);
    }
}
