//! RTCM3 transport layer
//!
//! Turns an arbitrary sequence of byte chunks into checksum-verified
//! [`Frame`]s. Message interpretation lives in [`crate::message`].

pub mod constants;
pub mod decoder;
pub mod frame;

pub use decoder::{DecoderState, FrameDecoder};
pub use frame::{Frame, CRC24Q};
