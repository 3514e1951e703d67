//! Statistics for NTRIP streams and the epoch synchronizer

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use hifitime::Epoch;

use crate::message::BuilderStats;
use crate::protocol::decoder::FrameDecoder;

/// Stream-level statistics
#[derive(Debug, Clone)]
pub struct StreamStats {
    /// Mountpoint name
    pub mountpoint: String,
    /// Start time
    pub started_at: Instant,
    /// Total bytes received
    pub bytes_received: u64,
    /// Verified frames
    pub frames: u64,
    /// Candidates dropped on checksum mismatch
    pub checksum_rejects: u64,
    /// Bytes outside of verified frames
    pub skipped_bytes: u64,
    /// Messages of a known type that failed to decode
    pub decode_failures: u64,
    /// Unsupported message types, by type
    pub unknown_types: BTreeMap<u16, u64>,
    /// Observation records decoded
    pub observations: u64,
    /// Ephemeris records decoded
    pub ephemerides: u64,
    /// Time tag of the latest observation
    pub last_observation: Option<Epoch>,
}

impl StreamStats {
    pub fn new(mountpoint: impl Into<String>) -> Self {
        Self {
            mountpoint: mountpoint.into(),
            started_at: Instant::now(),
            bytes_received: 0,
            frames: 0,
            checksum_rejects: 0,
            skipped_bytes: 0,
            decode_failures: 0,
            unknown_types: BTreeMap::new(),
            observations: 0,
            ephemerides: 0,
            last_observation: None,
        }
    }

    /// Copy the decoder and builder counters
    pub fn update(&mut self, decoder: &FrameDecoder, builder: &BuilderStats) {
        self.frames = decoder.frames();
        self.checksum_rejects = decoder.rejected();
        self.skipped_bytes = decoder.skipped_bytes();
        self.decode_failures = builder.decode_failures;
        self.unknown_types = builder.unknown_types.clone();
        self.observations = builder.observations;
        self.ephemerides = builder.ephemerides;
    }

    /// Get duration since stream started
    pub fn duration(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// Calculate bitrate in bits per second
    pub fn bitrate(&self) -> u64 {
        let secs = self.duration().as_secs();
        if secs > 0 {
            (self.bytes_received * 8) / secs
        } else {
            0
        }
    }

    /// Share of candidate frames that failed their checksum
    pub fn reject_ratio(&self) -> f64 {
        let total = self.frames + self.checksum_rejects;
        if total == 0 {
            0.0
        } else {
            self.checksum_rejects as f64 / total as f64
        }
    }
}

/// Synchronizer statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncStats {
    /// Epochs handed to the output
    pub epochs_emitted: u64,
    /// Observations inside emitted epochs
    pub observations_emitted: u64,
    /// Observations for an already closed epoch
    pub late_observations: u64,
    /// Epochs dropped by the sampling interval
    pub sampled_out: u64,
    /// Epochs dropped to respect the bucket bound
    pub overflow_dropped: u64,
    /// Health events dropped to respect the event bound
    pub events_dropped: u64,
}
