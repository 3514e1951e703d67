//! Multi-station epoch synchronization and stream health
//!
//! ```text
//!   pipeline A ──┐
//!   pipeline B ──┼──► EpochSynchronizer ──► SyncedEpoch (time ordered)
//!   pipeline C ──┘        │
//!                         └──► HealthEvent (Begin_Outage, End_Outage, ...)
//! ```

pub mod bucket;
pub mod config;
pub mod health;
pub mod synchronizer;

pub use bucket::{EpochBucket, SyncedEpoch};
pub use config::SyncConfig;
pub use health::{AdvisoryKind, HealthEvent, HealthMonitor, HealthState};
pub use synchronizer::EpochSynchronizer;
