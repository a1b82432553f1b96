//! Newline framing for the serial byte stream.

use bytes::BytesMut;
use futures::StreamExt;
use tokio::io::AsyncRead;
use tokio_util::codec::{Decoder, FramedRead};

use crate::types::LinkError;

/// Splits the incoming byte stream on `\n` into trimmed text lines.
///
/// A line split across reads stays buffered until its delimiter arrives; a
/// partial line left over when the stream ends is discarded, never emitted.
/// Bytes are decoded lossily, so a garbled burst (e.g. a baud mismatch)
/// produces replacement characters instead of killing the session.
pub struct LineDecoder;

impl Decoder for LineDecoder {
    type Item = String;
    type Error = LinkError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<String>, LinkError> {
        let Some(pos) = src.iter().position(|&b| b == b'\n') else {
            return Ok(None);
        };
        let line = src.split_to(pos + 1);
        let text = String::from_utf8_lossy(&line[..pos]);
        Ok(Some(text.trim().to_string()))
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<String>, LinkError> {
        match self.decode(src)? {
            Some(frame) => Ok(Some(frame)),
            None => {
                // Leftover bytes with no delimiter are not a frame.
                src.clear();
                Ok(None)
            }
        }
    }
}

/// Frame reader for one open connection.
///
/// Created fresh per connection; the internal buffer never survives a
/// reconnect.
pub struct LineFramer<R> {
    inner: FramedRead<R, LineDecoder>,
}

impl<R: AsyncRead + Unpin> LineFramer<R> {
    pub fn new(reader: R) -> Self {
        Self {
            inner: FramedRead::new(reader, LineDecoder),
        }
    }

    /// Next frame from the stream, `None` once the connection has closed.
    pub async fn next_frame(&mut self) -> Option<Result<String, LinkError>> {
        self.inner.next().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncWriteExt;

    fn decode_all(buf: &mut BytesMut) -> Vec<String> {
        let mut codec = LineDecoder;
        let mut out = Vec::new();
        while let Some(frame) = codec.decode(buf).unwrap() {
            out.push(frame);
        }
        out
    }

    #[test]
    fn splits_lines_in_order() {
        let mut buf = BytesMut::from(&b"one\ntwo\nthree\n"[..]);
        assert_eq!(decode_all(&mut buf), vec!["one", "two", "three"]);
        assert!(buf.is_empty());
    }

    #[test]
    fn buffers_partial_lines_until_the_delimiter_arrives() {
        let mut codec = LineDecoder;
        let mut buf = BytesMut::from(&b"par"[..]);
        assert_eq!(codec.decode(&mut buf).unwrap(), None);
        buf.extend_from_slice(b"tial\nnext");
        assert_eq!(codec.decode(&mut buf).unwrap(), Some("partial".to_string()));
        // "next" has no delimiter yet
        assert_eq!(codec.decode(&mut buf).unwrap(), None);
    }

    #[test]
    fn trims_carriage_returns_and_whitespace() {
        let mut buf = BytesMut::from(&b"  42 \r\n"[..]);
        assert_eq!(LineDecoder.decode(&mut buf).unwrap(), Some("42".to_string()));
    }

    #[test]
    fn empty_lines_are_frames() {
        let mut buf = BytesMut::from(&b"\n"[..]);
        assert_eq!(LineDecoder.decode(&mut buf).unwrap(), Some(String::new()));
    }

    #[test]
    fn eof_discards_a_partial_tail() {
        let mut codec = LineDecoder;
        let mut buf = BytesMut::from(&b"whole\ntail"[..]);
        assert_eq!(codec.decode_eof(&mut buf).unwrap(), Some("whole".to_string()));
        assert_eq!(codec.decode_eof(&mut buf).unwrap(), None);
        assert!(buf.is_empty());
    }

    #[tokio::test]
    async fn frames_survive_read_boundaries() {
        let (mut tx, rx) = tokio::io::duplex(16);
        let mut framer = LineFramer::new(rx);

        tx.write_all(b"hel").await.unwrap();
        tx.write_all(b"lo\nwor").await.unwrap();
        assert_eq!(framer.next_frame().await.unwrap().unwrap(), "hello");

        tx.write_all(b"ld\n").await.unwrap();
        assert_eq!(framer.next_frame().await.unwrap().unwrap(), "world");

        drop(tx);
        assert!(framer.next_frame().await.is_none());
    }
}
