use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};

/// One-shot, many-reader shutdown broadcast.
///
/// Cloning hands out another reader of the same signal. Once raised it stays
/// raised.
#[derive(Clone, Debug)]
pub struct Shutdown {
    tx: Arc<watch::Sender<bool>>,
}

impl Shutdown {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    pub fn raise(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_raised(&self) -> bool {
        *self.tx.borrow()
    }

    /// Resolves once the signal has been raised (immediately if it already was).
    pub async fn wait(&self) {
        let mut rx = self.tx.subscribe();
        // The sender lives in `self`, so this can only end by observing `true`.
        let _ = rx.wait_for(|raised| *raised).await;
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

/// Completion tracker: hand out one [`DoneToken`] per participant, then block
/// until every token has been dropped.
#[derive(Debug)]
pub struct DoneTracker {
    tx: mpsc::Sender<()>,
    rx: mpsc::Receiver<()>,
}

/// Held by a participant for as long as it is running.
#[derive(Debug)]
pub struct DoneToken {
    _tx: mpsc::Sender<()>,
}

impl DoneTracker {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::channel(1);
        Self { tx, rx }
    }

    pub fn register(&self) -> DoneToken {
        DoneToken {
            _tx: self.tx.clone(),
        }
    }

    /// Wait for every registered participant to report done.
    pub async fn wait(self) {
        let Self { tx, mut rx } = self;
        drop(tx);
        // Nothing is ever sent; `None` means the last token went away.
        while rx.recv().await.is_some() {}
    }

    /// Like [`DoneTracker::wait`] but gives up after `limit`.
    ///
    /// Returns `true` if everything finished in time.
    pub async fn wait_timeout(self, limit: Duration) -> bool {
        tokio::time::timeout(limit, self.wait()).await.is_ok()
    }
}

impl Default for DoneTracker {
    fn default() -> Self {
        Self::new()
    }
}
