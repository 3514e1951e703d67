//! Stream and synchronizer statistics

pub mod metrics;

pub use metrics::{StreamStats, SyncStats};
