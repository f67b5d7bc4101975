//! `lineio`: the text side of a client connection.
//!
//! - [`LineReader`]: CRLF/LF line framing over any `AsyncRead`, bounded length.
//! - [`Outbox`]: a non-blocking per-connection output queue, drained to the
//!   socket by [`pump`] on its own task.

pub mod line;
pub mod out;

pub use line::{DEFAULT_MAX_LINE, LineReader};
pub use out::{DEFAULT_OUTBOX_DEPTH, Outbox, OutboxRx, pump};
