//! HTTP chunked transfer decoding for NTRIP 2.0 streams
//!
//! ```text
//!  Size --(hex len > 0)--> Data --(len bytes)--> DataEnd --(CRLF)--> Size
//!    |
//!    +--(len == 0)--> Trailer --(empty line)--> Done
//! ```

use bytes::{Buf, Bytes, BytesMut};

use crate::error::ClientError;

/// Longest chunk-size line accepted, extensions included
const MAX_SIZE_LINE: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ChunkState {
    Size,
    Data { remaining: usize },
    DataEnd,
    Trailer,
    Done,
}

/// Incremental de-chunker, fed with raw body bytes
#[derive(Debug)]
pub struct ChunkedDecoder {
    buf: BytesMut,
    state: ChunkState,
}

impl ChunkedDecoder {
    pub fn new() -> Self {
        Self {
            buf: BytesMut::new(),
            state: ChunkState::Size,
        }
    }

    /// Feed raw bytes, returning whatever payload they complete
    pub fn decode(&mut self, input: &[u8]) -> Result<Bytes, ClientError> {
        self.buf.extend_from_slice(input);
        let mut out = BytesMut::new();

        loop {
            match self.state {
                ChunkState::Size => {
                    let Some(end) = self.line_end()? else { break };
                    let line = std::str::from_utf8(&self.buf[..end])
                        .map_err(|_| ClientError::InvalidChunk)?;
                    let hex = line.split(';').next().unwrap_or("").trim();
                    let size =
                        usize::from_str_radix(hex, 16).map_err(|_| ClientError::InvalidChunk)?;
                    self.buf.advance(end + 2);
                    self.state = if size == 0 {
                        ChunkState::Trailer
                    } else {
                        ChunkState::Data { remaining: size }
                    };
                }
                ChunkState::Data { remaining } => {
                    if self.buf.is_empty() {
                        break;
                    }
                    let n = remaining.min(self.buf.len());
                    out.extend_from_slice(&self.buf.split_to(n));
                    self.state = if n == remaining {
                        ChunkState::DataEnd
                    } else {
                        ChunkState::Data {
                            remaining: remaining - n,
                        }
                    };
                }
                ChunkState::DataEnd => {
                    if self.buf.len() < 2 {
                        break;
                    }
                    if &self.buf[..2] != b"\r\n" {
                        return Err(ClientError::InvalidChunk);
                    }
                    self.buf.advance(2);
                    self.state = ChunkState::Size;
                }
                ChunkState::Trailer => {
                    let Some(end) = self.line_end()? else { break };
                    self.buf.advance(end + 2);
                    if end == 0 {
                        self.state = ChunkState::Done;
                    }
                }
                ChunkState::Done => {
                    self.buf.clear();
                    break;
                }
            }
        }

        Ok(out.freeze())
    }

    /// The terminating zero-size chunk has been seen
    pub fn is_done(&self) -> bool {
        self.state == ChunkState::Done
    }

    fn line_end(&self) -> Result<Option<usize>, ClientError> {
        match self.buf.windows(2).position(|w| w == b"\r\n") {
            Some(end) => Ok(Some(end)),
            None if self.buf.len() > MAX_SIZE_LINE => Err(ClientError::InvalidChunk),
            None => Ok(None),
        }
    }
}

impl Default for ChunkedDecoder {
    fn default() -> Self {
        Self::new()
    }
}
