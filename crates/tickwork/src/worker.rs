use std::any::Any;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::runtime::{Handle, RuntimeFlavor};
use tokio::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard, mpsc};
use tokio::task::block_in_place;
use tokio::time::Instant;
use tracing::{debug, error, warn};

use crate::SubmitError;
use crate::shutdown::{DoneToken, DoneTracker, Shutdown};

pub const DEFAULT_TICK: Duration = Duration::from_millis(100);

/// A deferred action. Runs exactly once, inside its worker's drained section.
///
/// Events run synchronously. On a multi-thread runtime the drain moves off
/// the async scheduler with `block_in_place`; on a current-thread runtime a
/// blocking event stalls every task on it.
pub type Event = Box<dyn FnOnce() + Send + 'static>;

/// The lock that keeps "any zone" and "the global partition" apart.
///
/// Zone workers run under [`CoordinationLock::shared`], so zones overlap each
/// other freely; the global worker runs under [`CoordinationLock::exclusive`]
/// and therefore never overlaps any zone.
#[derive(Clone, Debug, Default)]
pub struct CoordinationLock {
    inner: Arc<RwLock<()>>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Access {
    Shared,
    Exclusive,
}

/// One worker's view of the [`CoordinationLock`].
#[derive(Clone, Debug)]
pub struct RunLock {
    lock: Arc<RwLock<()>>,
    access: Access,
}

// Only held for its drop.
#[allow(dead_code)]
enum RunGuard<'a> {
    Shared(RwLockReadGuard<'a, ()>),
    Exclusive(RwLockWriteGuard<'a, ()>),
}

impl CoordinationLock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared(&self) -> RunLock {
        RunLock {
            lock: self.inner.clone(),
            access: Access::Shared,
        }
    }

    pub fn exclusive(&self) -> RunLock {
        RunLock {
            lock: self.inner.clone(),
            access: Access::Exclusive,
        }
    }
}

impl RunLock {
    pub fn access(&self) -> Access {
        self.access
    }

    async fn acquire(&self) -> RunGuard<'_> {
        match self.access {
            Access::Shared => RunGuard::Shared(self.lock.read().await),
            Access::Exclusive => RunGuard::Exclusive(self.lock.write().await),
        }
    }
}

/// What a worker does when one of its events panics.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PanicPolicy {
    /// Log it and keep draining.
    #[default]
    Isolate,
    /// Log it and stop this worker for good. Other workers keep running.
    Halt,
}

#[derive(Clone, Debug)]
pub struct WorkerConfig {
    pub name: String,
    pub tick: Duration,
    pub on_panic: PanicPolicy,
}

impl WorkerConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tick: DEFAULT_TICK,
            on_panic: PanicPolicy::default(),
        }
    }

    pub fn tick(mut self, tick: Duration) -> Self {
        self.tick = tick.max(Duration::from_millis(1));
        self
    }

    pub fn on_panic(mut self, policy: PanicPolicy) -> Self {
        self.on_panic = policy;
        self
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct WorkerStats {
    pub executed: u64,
    pub panicked: u64,
}

/// Handle to a serializing, tick-batched event loop.
///
/// Clones refer to the same loop.
#[derive(Clone)]
pub struct Worker {
    inner: Arc<Inner>,
}

struct Inner {
    name: String,
    access: Access,
    tx: mpsc::UnboundedSender<Event>,
    // Held exclusively by the loop while it drains; submitters pass through it
    // in shared mode so an event is never split across two drains.
    gate: RwLock<()>,
    shutdown: Shutdown,
    executed: AtomicU64,
    panicked: AtomicU64,
}

enum Drain {
    Emptied,
    Halted { dropped: usize },
}

impl Worker {
    /// Spawn the loop on the current tokio runtime.
    ///
    /// The loop holds a token from `done` until it has fully stopped.
    pub fn spawn(lock: RunLock, shutdown: Shutdown, done: &DoneTracker, config: WorkerConfig) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let inner = Arc::new(Inner {
            name: config.name,
            access: lock.access(),
            tx,
            gate: RwLock::new(()),
            shutdown,
            executed: AtomicU64::new(0),
            panicked: AtomicU64::new(0),
        });

        let first_tick = Instant::now() + config.tick;
        tokio::spawn(run(
            inner.clone(),
            rx,
            lock,
            config.tick,
            config.on_panic,
            first_tick,
            done.register(),
        ));

        Self { inner }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn access(&self) -> Access {
        self.inner.access
    }

    /// Queue `event` for the next drain.
    ///
    /// Returns once the event is queued, not once it has run. Blocks only
    /// while a drain is in progress.
    pub async fn handle<F>(&self, event: F) -> Result<(), SubmitError>
    where
        F: FnOnce() + Send + 'static,
    {
        if self.inner.shutdown.is_raised() {
            return Err(SubmitError::ShuttingDown);
        }
        drop(self.inner.gate.read().await);
        self.inner
            .tx
            .send(Box::new(event))
            .map_err(|_| SubmitError::Stopped)
    }

    /// True once the loop has stopped accepting events.
    pub fn is_stopped(&self) -> bool {
        self.inner.tx.is_closed()
    }

    pub fn stats(&self) -> WorkerStats {
        WorkerStats {
            executed: self.inner.executed.load(Ordering::Relaxed),
            panicked: self.inner.panicked.load(Ordering::Relaxed),
        }
    }
}

impl std::fmt::Debug for Worker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Worker")
            .field("name", &self.inner.name)
            .field("access", &self.inner.access)
            .field("stopped", &self.is_stopped())
            .finish()
    }
}

async fn run(
    inner: Arc<Inner>,
    mut rx: mpsc::UnboundedReceiver<Event>,
    lock: RunLock,
    tick: Duration,
    on_panic: PanicPolicy,
    mut next: Instant,
    _done: DoneToken,
) {
    debug!(worker = %inner.name, access = ?inner.access, tick_ms = tick.as_millis() as u64, "worker started");

    let mut halted = false;
    loop {
        if inner.shutdown.is_raised() {
            break;
        }
        if let Drain::Halted { dropped } = inner.drain(&lock, &mut rx, on_panic).await {
            warn!(worker = %inner.name, dropped, "worker halted after a panicking event");
            halted = true;
            break;
        }
        if inner.shutdown.is_raised() {
            break;
        }
        tokio::select! {
            _ = tokio::time::sleep_until(next) => {}
            _ = inner.shutdown.wait() => {}
        }
        if inner.shutdown.is_raised() {
            break;
        }
        // From the previous scheduled time, not from when we actually woke.
        next += tick;
    }

    rx.close();
    if !halted {
        // Anything accepted before the queue closed still runs.
        inner.drain(&lock, &mut rx, on_panic).await;
    }
    debug!(worker = %inner.name, executed = inner.executed.load(Ordering::Relaxed), "worker stopped");
}

impl Inner {
    async fn drain(
        &self,
        lock: &RunLock,
        rx: &mut mpsc::UnboundedReceiver<Event>,
        on_panic: PanicPolicy,
    ) -> Drain {
        let _run = lock.acquire().await;
        let _gate = self.gate.write().await;

        // Events are synchronous and may block briefly on resource locks.
        match Handle::current().runtime_flavor() {
            RuntimeFlavor::MultiThread => block_in_place(|| self.run_events(rx, on_panic)),
            _ => self.run_events(rx, on_panic),
        }
    }

    fn run_events(&self, rx: &mut mpsc::UnboundedReceiver<Event>, on_panic: PanicPolicy) -> Drain {
        while let Ok(event) = rx.try_recv() {
            match catch_unwind(AssertUnwindSafe(event)) {
                Ok(()) => {
                    self.executed.fetch_add(1, Ordering::Relaxed);
                }
                Err(payload) => {
                    self.panicked.fetch_add(1, Ordering::Relaxed);
                    error!(worker = %self.name, panic = panic_message(payload.as_ref()), "event panicked");
                    if on_panic == PanicPolicy::Halt {
                        rx.close();
                        let mut dropped = 0;
                        while rx.try_recv().is_ok() {
                            dropped += 1;
                        }
                        return Drain::Halted { dropped };
                    }
                }
            }
        }
        Drain::Emptied
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "non-string panic payload"
    }
}
