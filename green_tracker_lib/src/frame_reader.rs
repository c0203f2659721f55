use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, BufReader};

use crate::comms::{FrameError, MAX_FRAME_LEN};

/// Splits a byte stream into newline terminated frames without ever holding more than
/// `max_len + 1` bytes of a single line. Oversized and non UTF-8 lines are reported and
/// skipped; the stream stays usable.
pub struct FrameReader<R> {
    inner: BufReader<R>,
    buf: Vec<u8>,
    max_len: usize,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    pub fn new(reader: R) -> Self {
        Self::with_max_len(reader, MAX_FRAME_LEN)
    }

    pub fn with_max_len(reader: R, max_len: usize) -> Self {
        Self {
            inner: BufReader::new(reader),
            buf: Vec::new(),
            max_len,
        }
    }

    /// `Ok(None)` at end of stream. The inner result is the line without its terminator,
    /// or why it was skipped.
    pub async fn next_frame(&mut self) -> std::io::Result<Option<Result<String, FrameError>>> {
        if !self.read_bounded().await? {
            return Ok(None);
        }

        if !self.ends_line() && self.buf.len() > self.max_len {
            let mut skipped = self.buf.len();
            while self.read_bounded().await? {
                skipped += self.buf.len();
                if self.ends_line() {
                    break;
                }
            }
            self.buf.clear();
            return Ok(Some(Err(FrameError::TooLong(skipped))));
        }

        while matches!(self.buf.last(), Some(b'\n' | b'\r')) {
            self.buf.pop();
        }

        let frame = match std::str::from_utf8(&self.buf) {
            Ok(line) => Ok(line.to_owned()),
            Err(e) => Err(FrameError::Malformed(format!("invalid UTF-8: {e}"))),
        };
        Ok(Some(frame))
    }

    // Reads at most one byte past the limit. False at end of stream.
    async fn read_bounded(&mut self) -> std::io::Result<bool> {
        self.buf.clear();
        let limit = self.max_len as u64 + 1;
        let read = (&mut self.inner).take(limit).read_until(b'\n', &mut self.buf).await?;
        Ok(read > 0)
    }

    fn ends_line(&self) -> bool {
        self.buf.last() == Some(&b'\n')
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn frames(input: &[u8], max_len: usize) -> Vec<Result<String, String>> {
        let mut reader = FrameReader::with_max_len(input, max_len);
        let mut out = Vec::new();
        while let Some(frame) = reader.next_frame().await.unwrap() {
            out.push(frame.map_err(|e| e.to_string()));
        }
        out
    }

    #[tokio::test]
    async fn splits_lines_and_strips_terminators() {
        let out = frames(b"one\ntwo\r\nthree", 16).await;
        assert_eq!(out, vec![Ok("one".into()), Ok("two".into()), Ok("three".into())]);
    }

    #[tokio::test]
    async fn oversized_line_is_skipped_whole() {
        let out = frames(b"short\nthis line is far too long\nafter\n", 8).await;

        assert_eq!(out.len(), 3);
        assert_eq!(out[0], Ok("short".into()));
        assert!(out[1].as_ref().is_err_and(|e| e.contains("exceeds")));
        assert_eq!(out[2], Ok("after".into()));
    }

    #[tokio::test]
    async fn line_at_the_limit_is_kept() {
        assert_eq!(frames(b"12345678\n", 8).await, vec![Ok("12345678".into())]);
    }

    #[tokio::test]
    async fn unterminated_flood_ends_as_one_error() {
        let flood = vec![b'x'; 100];
        let out = frames(&flood, 8).await;
        assert_eq!(out.len(), 1);
        assert!(out[0].is_err());
    }

    #[tokio::test]
    async fn invalid_utf8_does_not_end_the_stream() {
        let out = frames(b"\xff\xfe garbage\nok\n", 64).await;

        assert!(out[0].as_ref().is_err_and(|e| e.contains("UTF-8")));
        assert_eq!(out[1], Ok("ok".into()));
    }
}
