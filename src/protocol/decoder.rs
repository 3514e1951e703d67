//! RTCM3 frame extraction from an unaligned byte stream
//!
//! ```text
//!            preamble            3 bytes             len+3 more bytes
//!  Seeking ----------> ReadingLength -----> ReadingPayload -----> Verifying
//!     ^                     |                                      |    |
//!     |  reserved bits set  |              crc mismatch            |    | crc ok
//!     +---------------------+--------------------------------------+    v
//!              (drop the preamble byte only, rescan)               emit Frame
//! ```
//!
//! Bytes are only ever consumed in two ways: a whole verified frame, or the
//! single preamble byte of a candidate that failed. A corrupted frame
//! therefore never takes a following valid frame down with it.

use bytes::{Buf, BytesMut};

use super::constants::{CRC_LEN, HEADER_LEN, PREAMBLE, RESERVED_MASK};
use super::frame::{Frame, CRC24Q};

/// Decoder progress through the current candidate frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecoderState {
    /// Scanning for the preamble byte
    Seeking,
    /// Preamble found, waiting for the 16-bit length header
    ReadingLength,
    /// Waiting for `len` payload bytes plus the CRC trailer
    ReadingPayload { len: usize },
    /// Whole candidate buffered, checksum not yet compared
    Verifying { len: usize },
}

/// Incremental frame decoder, one per stream
#[derive(Debug)]
pub struct FrameDecoder {
    buf: BytesMut,
    state: DecoderState,
    frames: u64,
    rejected: u64,
    false_preambles: u64,
    skipped_bytes: u64,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self {
            buf: BytesMut::with_capacity(4096),
            state: DecoderState::Seeking,
            frames: 0,
            rejected: 0,
            false_preambles: 0,
            skipped_bytes: 0,
        }
    }

    /// Append a chunk of stream bytes. Chunks may split frames anywhere.
    pub fn push(&mut self, chunk: &[u8]) {
        self.buf.extend_from_slice(chunk);
    }

    /// Push a chunk and collect every frame it completes
    pub fn decode(&mut self, chunk: &[u8]) -> Vec<Frame> {
        self.push(chunk);
        let mut frames = Vec::new();
        while let Some(frame) = self.next_frame() {
            frames.push(frame);
        }
        frames
    }

    /// Extract the next verified frame, or `None` if more bytes are needed
    pub fn next_frame(&mut self) -> Option<Frame> {
        loop {
            match self.state {
                DecoderState::Seeking => match self.buf.iter().position(|&b| b == PREAMBLE) {
                    Some(offset) => {
                        self.skipped_bytes += offset as u64;
                        self.buf.advance(offset);
                        self.state = DecoderState::ReadingLength;
                    }
                    None => {
                        self.skipped_bytes += self.buf.len() as u64;
                        self.buf.clear();
                        return None;
                    }
                },
                DecoderState::ReadingLength => {
                    if self.buf.len() < HEADER_LEN {
                        return None;
                    }
                    if self.buf[1] & RESERVED_MASK != 0 {
                        self.false_preambles += 1;
                        self.drop_preamble();
                        continue;
                    }
                    let len = (((self.buf[1] & 0x03) as usize) << 8) | self.buf[2] as usize;
                    self.state = DecoderState::ReadingPayload { len };
                }
                DecoderState::ReadingPayload { len } => {
                    if self.buf.len() < HEADER_LEN + len + CRC_LEN {
                        return None;
                    }
                    self.state = DecoderState::Verifying { len };
                }
                DecoderState::Verifying { len } => {
                    let body = HEADER_LEN + len;
                    let computed = CRC24Q.checksum(&self.buf[..body]);
                    let expected = ((self.buf[body] as u32) << 16)
                        | ((self.buf[body + 1] as u32) << 8)
                        | self.buf[body + 2] as u32;

                    if computed != expected {
                        self.rejected += 1;
                        tracing::debug!(
                            expected = expected,
                            computed = computed,
                            len = len,
                            "RTCM3 checksum mismatch, resyncing"
                        );
                        self.drop_preamble();
                        continue;
                    }

                    let raw = self.buf.split_to(body + CRC_LEN).freeze();
                    self.state = DecoderState::Seeking;
                    self.frames += 1;
                    return Some(Frame::from_verified(raw, expected));
                }
            }
        }
    }

    fn drop_preamble(&mut self) {
        self.buf.advance(1);
        self.skipped_bytes += 1;
        self.state = DecoderState::Seeking;
    }

    pub fn state(&self) -> DecoderState {
        self.state
    }

    /// Verified frames emitted so far
    pub fn frames(&self) -> u64 {
        self.frames
    }

    /// Candidates dropped on checksum mismatch
    pub fn rejected(&self) -> u64 {
        self.rejected
    }

    /// Preamble bytes whose header had reserved bits set
    pub fn false_preambles(&self) -> u64 {
        self.false_preambles
    }

    /// Bytes discarded outside of verified frames
    pub fn skipped_bytes(&self) -> u64 {
        self.skipped_bytes
    }

    /// Bytes held waiting for the rest of a frame
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new()
    }
}
