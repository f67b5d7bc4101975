use bytes::Bytes;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tracing::warn;

pub const DEFAULT_OUTBOX_DEPTH: usize = 128;

const PROMPT: &[u8] = b"> ";

/// Sending half of a connection's output queue.
///
/// Never blocks: text produced inside a worker's drain must not wait on a slow
/// socket. When the queue is full the text is dropped and logged.
#[derive(Clone, Debug)]
pub struct Outbox {
    tx: mpsc::Sender<Bytes>,
}

/// Receiving half; hand it to [`pump`].
#[derive(Debug)]
pub struct OutboxRx {
    rx: mpsc::Receiver<Bytes>,
}

impl Outbox {
    pub fn channel(depth: usize) -> (Outbox, OutboxRx) {
        let (tx, rx) = mpsc::channel(depth.max(1));
        (Outbox { tx }, OutboxRx { rx })
    }

    /// Queue raw bytes. Returns `false` if they were dropped.
    pub fn send(&self, bytes: impl Into<Bytes>) -> bool {
        match self.tx.try_send(bytes.into()) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(b)) => {
                warn!(len = b.len(), "outbox full; dropping output");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        }
    }

    /// Queue `text` followed by CRLF.
    pub fn line(&self, text: &str) -> bool {
        let mut s = String::with_capacity(text.len() + 2);
        s.push_str(text);
        s.push_str("\r\n");
        self.send(s)
    }

    pub fn prompt(&self) -> bool {
        self.send(Bytes::from_static(PROMPT))
    }

    /// True once the writer side has gone away.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

impl OutboxRx {
    pub async fn recv(&mut self) -> Option<Bytes> {
        self.rx.recv().await
    }

    /// Next queued chunk if one is ready.
    pub fn try_recv(&mut self) -> Option<Bytes> {
        self.rx.try_recv().ok()
    }
}

/// Copy queued output to `wr` until every [`Outbox`] is dropped, then shut
/// the writer down.
pub async fn pump<W: AsyncWrite + Unpin>(mut rx: OutboxRx, mut wr: W) -> std::io::Result<()> {
    while let Some(b) = rx.recv().await {
        wr.write_all(&b[..]).await?;
    }
    wr.shutdown().await
}
