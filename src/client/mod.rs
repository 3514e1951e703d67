//! NTRIP stream client
//!
//! One connection per mountpoint. The client performs the handshake and
//! then yields raw body bytes; it never retries on its own. Failures are
//! returned to the owning pipeline, which decides about reconnecting.

pub mod chunked;
pub mod config;
pub mod connector;
pub mod request;
pub mod source;

pub use config::{ClientConfig, MountpointUrl};
pub use connector::NtripClient;
pub use request::{ResponseHead, ResponseKind};
pub use source::{ChunkSource, ReplaySource};
