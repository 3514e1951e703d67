//! Error types
//!
//! Each layer has its own error enum; [`Error`] wraps them for callers that
//! drive a whole pipeline.

use thiserror::Error;

/// Crate-wide result type
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error
#[derive(Debug, Error)]
pub enum Error {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Client(#[from] ClientError),

    #[error(transparent)]
    Frame(#[from] FrameError),

    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Ephemeris(#[from] EphemerisError),
}

/// Stream client failures. All of them are terminal for the pipeline that
/// owns the connection; reconnecting is up to the caller.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("invalid mountpoint url: {0}")]
    InvalidUrl(String),

    #[error("connection refused by {0}")]
    ConnectionRefused(String),

    #[error("connection closed by caster")]
    ConnectionClosed,

    #[error("authentication rejected for mountpoint {0}")]
    AuthenticationRejected(String),

    #[error("unexpected response: {0}")]
    UnexpectedResponse(String),

    #[error("no data for {0:?}")]
    IdleTimeout(std::time::Duration),

    #[error("connect timed out after {0:?}")]
    ConnectTimeout(std::time::Duration),

    #[error("malformed chunked transfer encoding")]
    InvalidChunk,

    #[error("stopped")]
    Stopped,

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

/// Frame level errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FrameError {
    #[error("payload of {0} bytes exceeds the 10-bit length field")]
    PayloadTooLong(usize),

    #[error("cannot encode message: {0}")]
    Encoding(String),
}

/// Message decoding errors. A decode error drops the frame it came from,
/// never the stream.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("message {0} does not decode")]
    Malformed(u16),

    #[error("message type {0} is not supported")]
    UnsupportedType(u16),

    #[error("field {field} out of range")]
    OutOfRange { field: &'static str },

    #[error("cannot resolve time without a reference epoch")]
    AmbiguousTime,
}

/// Ephemeris evaluation errors
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EphemerisError {
    /// Neither the current nor the previous record covers the requested
    /// time, or the satellite is unknown. The satellite is temporarily
    /// unusable; the store is unaffected.
    #[error("no valid ephemeris for {0}")]
    NoValidEphemeris(String),

    #[error("kepler equation did not converge")]
    KeplerDivergence,
}
