//! `tickwork`: partitioned, tick-batched event execution.
//!
//! - [`Worker`]: one serializing event loop per partition. Events queue up
//!   between ticks and run back to back once per tick, in FIFO order.
//! - [`CoordinationLock`]: zone workers hold it shared while draining, the
//!   global worker holds it exclusive, so global work never overlaps any zone.
//! - [`ordered`]: deadlock-free multi-resource locking by ascending id.
//! - [`Shutdown`] / [`DoneTracker`]: broadcast stop and wait for stragglers.

pub mod ordered;
pub mod shutdown;
pub mod worker;

pub use ordered::{LockId, Lockable, OrderedGuard, ResourceLock, acquire_all, lock_all, unlock_all};
pub use shutdown::{DoneToken, DoneTracker, Shutdown};
pub use worker::{
    Access, CoordinationLock, DEFAULT_TICK, Event, PanicPolicy, RunLock, Worker, WorkerConfig,
    WorkerStats,
};

/// Why [`Worker::handle`] refused an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitError {
    /// Shutdown has been raised; no new work is accepted anywhere.
    ShuttingDown,
    /// This worker's loop has exited (halted after a panic, or finished).
    Stopped,
}

impl std::fmt::Display for SubmitError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SubmitError::ShuttingDown => write!(f, "shutting down"),
            SubmitError::Stopped => write!(f, "worker stopped"),
        }
    }
}

impl std::error::Error for SubmitError {}
