//! RTCM3 message interpretation
//!
//! [`MessageBuilder`] turns verified frames into observation and ephemeris
//! records. One builder per stream; it carries the stream's last known
//! time, used to resolve the truncated time tags inside messages.

use std::collections::BTreeMap;

use hifitime::Epoch;
use rtcm_rs::prelude::Message;

use crate::ephemeris::Ephemeris;
use crate::error::DecodeError;
use crate::protocol::frame::Frame;

pub mod ephemeris;
pub mod observation;
pub mod time;

#[cfg(test)]
pub(crate) mod fixtures;

pub use observation::{ObsStatus, Observation, ObservationMessage};

/// Output of [`MessageBuilder::build`]
#[derive(Debug, Clone)]
pub enum Decoded {
    /// All observations of one station for one epoch
    Observations(Vec<Observation>),
    Ephemeris(Ephemeris),
}

/// Per-builder counters
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuilderStats {
    pub messages: u64,
    pub observations: u64,
    pub ephemerides: u64,
    pub decode_failures: u64,
    /// Unsupported message types seen, by type
    pub unknown_types: BTreeMap<u16, u64>,
}

impl BuilderStats {
    pub fn unknown_total(&self) -> u64 {
        self.unknown_types.values().sum()
    }
}

/// Frame interpreter for one stream
#[derive(Debug)]
pub struct MessageBuilder {
    station: String,
    hint: Option<Epoch>,
    /// Observations of an epoch whose last message has not arrived yet
    held: Vec<Observation>,
    held_epoch: Option<Epoch>,
    stats: BuilderStats,
}

impl MessageBuilder {
    pub fn new(station: impl Into<String>) -> Self {
        Self {
            station: station.into(),
            hint: None,
            held: Vec::new(),
            held_epoch: None,
            stats: BuilderStats::default(),
        }
    }

    /// Seed the reference time used to resolve week and day ambiguities
    pub fn with_hint(mut self, hint: Epoch) -> Self {
        self.hint = Some(hint);
        self
    }

    pub fn station(&self) -> &str {
        &self.station
    }

    pub fn hint(&self) -> Option<Epoch> {
        self.hint
    }

    pub fn stats(&self) -> &BuilderStats {
        &self.stats
    }

    /// Observations held waiting for the rest of their epoch
    pub fn pending(&self) -> usize {
        self.held.len()
    }

    /// Interpret one frame. Never fails: unknown types are counted and
    /// malformed messages dropped.
    pub fn build(&mut self, frame: &Frame) -> Vec<Decoded> {
        let Some(msg_type) = frame.message_type() else {
            self.stats.decode_failures += 1;
            tracing::debug!(station = %self.station, len = frame.payload_len(), "Frame too short for a message type");
            return Vec::new();
        };
        self.stats.messages += 1;

        match frame.message() {
            message @ (Message::Msg1001(_)
            | Message::Msg1002(_)
            | Message::Msg1003(_)
            | Message::Msg1004(_)
            | Message::Msg1009(_)
            | Message::Msg1010(_)
            | Message::Msg1011(_)
            | Message::Msg1012(_)) => {
                let result = observation::decode(&message, &self.station, self.hint);
                self.on_observations(msg_type, result)
            }
            message @ (Message::Msg1019(_) | Message::Msg1020(_) | Message::Msg1045(_)) => {
                let result = ephemeris::decode(&message, self.hint);
                self.on_ephemeris(msg_type, result)
            }
            Message::Corrupt | Message::Empty => {
                self.on_failure(msg_type, DecodeError::Malformed(msg_type));
                Vec::new()
            }
            _ => {
                *self.stats.unknown_types.entry(msg_type).or_default() += 1;
                tracing::trace!(station = %self.station, msg_type = msg_type, "Unsupported message type");
                Vec::new()
            }
        }
    }

    /// Release held observations regardless of the multiple-message flag
    pub fn flush(&mut self) -> Option<Vec<Observation>> {
        self.held_epoch = None;
        if self.held.is_empty() {
            return None;
        }
        let observations = std::mem::take(&mut self.held);
        self.stats.observations += observations.len() as u64;
        Some(observations)
    }

    fn on_observations(
        &mut self,
        msg_type: u16,
        result: Result<ObservationMessage, DecodeError>,
    ) -> Vec<Decoded> {
        let msg = match result {
            Ok(msg) => msg,
            Err(err) => {
                self.on_failure(msg_type, err);
                return Vec::new();
            }
        };

        let mut out = Vec::new();
        if self.held_epoch.is_some_and(|held| held != msg.time) {
            out.extend(self.flush().map(Decoded::Observations));
        }

        self.advance_hint(msg.time);
        self.held_epoch = Some(msg.time);
        self.held.extend(msg.observations);

        if !msg.synchronous {
            out.extend(self.flush().map(Decoded::Observations));
        }
        out
    }

    fn on_ephemeris(&mut self, msg_type: u16, result: Result<Ephemeris, DecodeError>) -> Vec<Decoded> {
        match result {
            Ok(mut eph) => {
                if let Some(at) = self.hint {
                    eph.set_received_at(at);
                }
                self.stats.ephemerides += 1;
                tracing::debug!(
                    station = %self.station,
                    sat = %eph.sat(),
                    iod = eph.iod(),
                    "Ephemeris decoded"
                );
                vec![Decoded::Ephemeris(eph)]
            }
            Err(err) => {
                self.on_failure(msg_type, err);
                Vec::new()
            }
        }
    }

    fn on_failure(&mut self, msg_type: u16, err: DecodeError) {
        self.stats.decode_failures += 1;
        tracing::debug!(
            station = %self.station,
            msg_type = msg_type,
            error = %err,
            "Message dropped"
        );
    }

    fn advance_hint(&mut self, t: Epoch) {
        self.hint = Some(match self.hint {
            Some(hint) if hint > t => hint,
            _ => t,
        });
    }
}

impl Drop for MessageBuilder {
    fn drop(&mut self) {
        if !self.held.is_empty() {
            tracing::debug!(
                station = %self.station,
                discarded = self.held.len(),
                "Discarding observations of an incomplete epoch"
            );
        }
    }
}
