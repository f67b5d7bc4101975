use bytes::BytesMut;
use memchr::memchr;
use tokio::io::{AsyncRead, AsyncReadExt};

pub const DEFAULT_MAX_LINE: usize = 1024;

/// Reads client input one line at a time.
///
/// Lines end at `\n`; a trailing `\r` is dropped. Invalid UTF-8 is replaced
/// rather than rejected, since the text only ever feeds a command parser.
#[derive(Debug)]
pub struct LineReader<R> {
    inner: R,
    buf: BytesMut,
    max_line_len: usize,
}

impl<R> LineReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(4 * 1024),
            max_line_len: DEFAULT_MAX_LINE,
        }
    }

    pub fn max_line_len(mut self, max: usize) -> Self {
        self.max_line_len = max.max(1);
        self
    }
}

impl<R: AsyncRead + Unpin> LineReader<R> {
    /// Next line without its terminator.
    ///
    /// `Ok(None)` on EOF. A final unterminated line is still returned before
    /// that. A line longer than the limit is an `InvalidData` error.
    pub async fn read_line(&mut self) -> std::io::Result<Option<String>> {
        loop {
            if let Some(i) = memchr(b'\n', &self.buf) {
                if i > self.max_line_len {
                    return Err(too_long());
                }
                let raw = self.buf.split_to(i + 1);
                return Ok(Some(decode(&raw)));
            }

            if self.buf.len() > self.max_line_len {
                return Err(too_long());
            }

            if self.inner.read_buf(&mut self.buf).await? == 0 {
                if self.buf.is_empty() {
                    return Ok(None);
                }
                let rest = self.buf.split();
                return Ok(Some(decode(&rest)));
            }
        }
    }
}

fn too_long() -> std::io::Error {
    std::io::Error::new(std::io::ErrorKind::InvalidData, "line too long")
}

fn decode(raw: &[u8]) -> String {
    let mut end = raw.len();
    if end > 0 && raw[end - 1] == b'\n' {
        end -= 1;
    }
    if end > 0 && raw[end - 1] == b'\r' {
        end -= 1;
    }
    String::from_utf8_lossy(&raw[..end]).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncWriteExt;

    #[tokio::test]
    async fn reads_crlf_lf_and_a_trailing_partial_line() {
        let (a, mut b) = tokio::io::duplex(64);
        tokio::spawn(async move {
            b.write_all(b"look\r\nsay hi\n\nquit").await.unwrap();
        });

        let mut lr = LineReader::new(a);
        assert_eq!(lr.read_line().await.unwrap().as_deref(), Some("look"));
        assert_eq!(lr.read_line().await.unwrap().as_deref(), Some("say hi"));
        assert_eq!(lr.read_line().await.unwrap().as_deref(), Some(""));
        assert_eq!(lr.read_line().await.unwrap().as_deref(), Some("quit"));
        assert_eq!(lr.read_line().await.unwrap(), None);
    }

    #[tokio::test]
    async fn rejects_overlong_lines() {
        let (a, mut b) = tokio::io::duplex(256);
        tokio::spawn(async move {
            b.write_all(&[b'x'; 40]).await.unwrap();
            b.write_all(b"\n").await.unwrap();
        });

        let mut lr = LineReader::new(a).max_line_len(16);
        let err = lr.read_line().await.unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::InvalidData);
    }

    #[tokio::test]
    async fn invalid_utf8_is_replaced() {
        let (a, mut b) = tokio::io::duplex(64);
        tokio::spawn(async move {
            b.write_all(b"say \xff\n").await.unwrap();
        });

        let mut lr = LineReader::new(a);
        assert_eq!(lr.read_line().await.unwrap().as_deref(), Some("say \u{fffd}"));
    }
}
