//! Newline-delimited framing for Electrum JSON-RPC streams.
//!
//! Decoding yields raw line bytes without the terminator; JSON parsing
//! happens in the session reader so that a malformed line can be skipped
//! without poisoning the stream. Encoding writes one JSON object per line.

use std::io;

use bytes::{BufMut, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};
use tracing::warn;

use super::protocol::Request;

/// Upper bound on a single line. Verbose transactions with thousands of
/// inputs stay well below this.
pub(crate) const MAX_LINE_LENGTH: usize = 16 * 1024 * 1024;

#[derive(Debug)]
pub(crate) struct LineCodec {
    /// Bytes of the buffer already scanned for a newline.
    next_index: usize,
    max_length: usize,
}

impl LineCodec {
    pub(crate) fn new() -> Self {
        Self::with_max_length(MAX_LINE_LENGTH)
    }

    pub(crate) fn with_max_length(max_length: usize) -> Self {
        Self {
            next_index: 0,
            max_length,
        }
    }
}

impl Default for LineCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for LineCodec {
    type Item = Bytes;
    type Error = io::Error;

    fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<Bytes>, io::Error> {
        let newline = buf[self.next_index..].iter().position(|b| *b == b'\n');
        match newline {
            Some(offset) => {
                let end = self.next_index + offset;
                self.next_index = 0;
                let mut line = buf.split_to(end + 1);
                line.truncate(end);
                if line.last() == Some(&b'\r') {
                    line.truncate(end - 1);
                }
                Ok(Some(line.freeze()))
            }
            None if buf.len() > self.max_length => Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("line exceeds {} bytes without a terminator", self.max_length),
            )),
            None => {
                self.next_index = buf.len();
                Ok(None)
            }
        }
    }

    fn decode_eof(&mut self, buf: &mut BytesMut) -> Result<Option<Bytes>, io::Error> {
        if let Some(line) = self.decode(buf)? {
            return Ok(Some(line));
        }
        // An unterminated tail is never a complete message.
        if !buf.is_empty() {
            warn!(bytes = buf.len(), "discarding unterminated data at end of stream");
            buf.clear();
            self.next_index = 0;
        }
        Ok(None)
    }
}

impl Encoder<Request> for LineCodec {
    type Error = io::Error;

    fn encode(&mut self, request: Request, dst: &mut BytesMut) -> Result<(), io::Error> {
        let encoded = serde_json::to_vec(&request)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
        dst.reserve(encoded.len() + 1);
        dst.put_slice(&encoded);
        dst.put_u8(b'\n');
        Ok(())
    }
}
