//! RTCM3 transport frame
//!
//! ```text
//! +----------+-----------+-----------+-----------------+-----------+
//! | 0xD3 (8) | resv (6)  | len (10)  | payload (len*8) | CRC (24)  |
//! +----------+-----------+-----------+-----------------+-----------+
//! ```
//!
//! The message number is the leading 12 bits of the payload. The CRC-24Q
//! covers everything from the preamble to the end of the payload.

use bytes::{BufMut, Bytes, BytesMut};
use crc::{Crc, CRC_24_LTE_A};
use rtcm_rs::prelude::{Message, MessageFrame};

use super::constants::{CRC_LEN, HEADER_LEN, MAX_PAYLOAD_LEN, PREAMBLE};
use crate::error::FrameError;

/// CRC-24Q (polynomial 0x1864CFB, zero init, no reflection)
pub const CRC24Q: Crc<u32> = Crc::<u32>::new(&CRC_24_LTE_A);

/// A checksum-verified frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Message payload, without header and trailer
    pub payload: Bytes,
    /// Checksum carried by the frame
    pub crc: u32,
    wire: Bytes,
}

impl Frame {
    /// Wrap a payload, computing its checksum
    pub fn new(payload: impl Into<Bytes>) -> Result<Self, FrameError> {
        let payload = payload.into();
        if payload.len() > MAX_PAYLOAD_LEN {
            return Err(FrameError::PayloadTooLong(payload.len()));
        }
        let mut buf = BytesMut::with_capacity(HEADER_LEN + payload.len() + CRC_LEN);
        buf.put_slice(&header(payload.len()));
        buf.put_slice(&payload);
        let crc = CRC24Q.checksum(&buf);
        buf.put_uint(crc as u64, CRC_LEN);
        Ok(Self::from_verified(buf.freeze(), crc))
    }

    /// Serialize a typed message
    pub fn from_message(message: &Message) -> Result<Self, FrameError> {
        let mut builder = rtcm_rs::MessageBuilder::new();
        let wire = builder
            .build_message(message)
            .map_err(|e| FrameError::Encoding(e.to_string()))?;
        let len = wire.len() - HEADER_LEN - CRC_LEN;
        if len > MAX_PAYLOAD_LEN {
            return Err(FrameError::PayloadTooLong(len));
        }
        let crc = CRC24Q.checksum(&wire[..HEADER_LEN + len]);
        Ok(Self::from_verified(Bytes::copy_from_slice(wire), crc))
    }

    /// `wire` is header, payload and a trailer already checked against `crc`
    pub(crate) fn from_verified(wire: Bytes, crc: u32) -> Self {
        let payload = wire.slice(HEADER_LEN..wire.len() - CRC_LEN);
        Self { payload, crc, wire }
    }

    /// Message number, if the payload holds at least 12 bits
    pub fn message_type(&self) -> Option<u16> {
        if self.payload.len() < 2 {
            return None;
        }
        Some(((self.payload[0] as u16) << 4) | ((self.payload[1] as u16) >> 4))
    }

    /// Decode the payload into its typed message. Malformed payloads come
    /// back as [`Message::Corrupt`], unsupported types as
    /// [`Message::MsgNotSupported`].
    pub fn message(&self) -> Message {
        match MessageFrame::new(&self.wire) {
            Ok(frame) => frame.get_message(),
            Err(_) => Message::Corrupt,
        }
    }

    pub fn payload_len(&self) -> usize {
        self.payload.len()
    }

    /// Size of the encoded frame on the wire
    pub fn wire_len(&self) -> usize {
        self.wire.len()
    }

    /// Serialize back to wire format
    pub fn encode(&self) -> Bytes {
        self.wire.clone()
    }
}

fn header(len: usize) -> [u8; HEADER_LEN] {
    [PREAMBLE, ((len >> 8) & 0x03) as u8, (len & 0xFF) as u8]
}
