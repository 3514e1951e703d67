//! Epoch synchronizer
//!
//! Fan-in point for every stream pipeline. Observations are bucketed by
//! time tag; a bucket closes once it has been open for the wait time, and
//! closing a bucket also closes every older one so the output never goes
//! back in time. Observations for a time tag at or before the newest
//! closed one are late and dropped.
//!
//! The synchronizer is a plain state machine driven by `post` and `tick`;
//! the caster's collector task owns it and calls `tick` on a timer.

use std::collections::{BTreeMap, VecDeque};
use std::time::Instant;

use hifitime::Epoch;

use super::bucket::{EpochBucket, SyncedEpoch};
use super::config::SyncConfig;
use super::health::{HealthEvent, HealthMonitor, HealthState};
use crate::message::observation::Observation;
use crate::stats::SyncStats;

const SAMPLING_TOLERANCE: f64 = 1e-3;

#[derive(Debug)]
pub struct EpochSynchronizer {
    config: SyncConfig,
    open: BTreeMap<Epoch, EpochBucket>,
    ready: VecDeque<SyncedEpoch>,
    /// Newest time tag already closed
    closed_through: Option<Epoch>,
    health: BTreeMap<String, HealthMonitor>,
    events: VecDeque<HealthEvent>,
    stats: SyncStats,
}

impl EpochSynchronizer {
    pub fn new(config: SyncConfig) -> Self {
        Self {
            config,
            open: BTreeMap::new(),
            ready: VecDeque::new(),
            closed_through: None,
            health: BTreeMap::new(),
            events: VecDeque::new(),
            stats: SyncStats::default(),
        }
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Start health tracking for a station before its first observation
    pub fn register_station(&mut self, station: &str, now: Instant) {
        if !self.config.health_enabled() || self.health.contains_key(station) {
            return;
        }
        self.health
            .insert(station.to_string(), HealthMonitor::new(station, &self.config, now));
    }

    /// Hand over observations decoded by a pipeline. Returns how many were
    /// accepted into open buckets.
    pub fn post(&mut self, observations: Vec<Observation>, now: Instant) -> usize {
        let mut accepted = 0;
        let mut stations: Vec<String> = Vec::new();

        for obs in observations {
            if !stations.contains(&obs.station) {
                stations.push(obs.station.clone());
            }

            if self.closed_through.is_some_and(|closed| obs.time <= closed) {
                self.stats.late_observations += 1;
                tracing::warn!(
                    station = %obs.station,
                    sat = %obs.sat,
                    sow = obs.gps_seconds(),
                    "Late observation discarded"
                );
                continue;
            }

            let time = obs.time;
            self.open
                .entry(time)
                .or_insert_with(|| EpochBucket::new(time, now))
                .push(obs);
            accepted += 1;
        }

        for station in stations {
            self.register_station(&station, now);
            if let Some(monitor) = self.health.get_mut(&station) {
                let events = monitor.on_valid(now);
                self.push_events(events);
            }
        }

        self.enforce_bound();
        accepted
    }

    /// Corrupted data seen on a station's stream
    pub fn record_corrupted(&mut self, station: &str, now: Instant) {
        self.register_station(station, now);
        if let Some(monitor) = self.health.get_mut(station) {
            monitor.on_corrupted(now);
        }
    }

    /// Close buckets whose wait time elapsed and evaluate stream health
    pub fn tick(&mut self, now: Instant) {
        let wait = self.config.wait_time;
        let limit = self
            .open
            .iter()
            .filter(|(_, b)| now.saturating_duration_since(b.created_at) >= wait)
            .map(|(t, _)| *t)
            .next_back();
        if let Some(limit) = limit {
            self.close_through(limit);
        }

        let events: Vec<HealthEvent> = self
            .health
            .values_mut()
            .flat_map(|monitor| monitor.check(now))
            .collect();
        self.push_events(events);
    }

    /// Close every open bucket now
    pub fn flush(&mut self) {
        if let Some(newest) = self.open.keys().next_back().copied() {
            self.close_through(newest);
        }
    }

    /// Next closed epoch in time order
    pub fn pop_ready(&mut self) -> Option<SyncedEpoch> {
        self.ready.pop_front()
    }

    pub fn pop_event(&mut self) -> Option<HealthEvent> {
        self.events.pop_front()
    }

    /// Health events not yet taken
    pub fn pending_events(&self) -> usize {
        self.events.len()
    }

    /// Queue health events, dropping the oldest past `max_events`
    fn push_events(&mut self, events: Vec<HealthEvent>) {
        self.events.extend(events);
        while self.events.len() > self.config.max_events {
            if let Some(dropped) = self.events.pop_front() {
                self.stats.events_dropped += 1;
                tracing::warn!(
                    station = %dropped.station,
                    to = ?dropped.to,
                    "Health event queue full, oldest event dropped"
                );
            }
        }
    }

    pub fn open_buckets(&self) -> usize {
        self.open.len()
    }

    /// Closed epochs not yet taken
    pub fn pending(&self) -> usize {
        self.ready.len()
    }

    pub fn closed_through(&self) -> Option<Epoch> {
        self.closed_through
    }

    pub fn health_state(&self, station: &str) -> Option<HealthState> {
        self.health.get(station).map(HealthMonitor::state)
    }

    pub fn stats(&self) -> &SyncStats {
        &self.stats
    }

    fn close_through(&mut self, limit: Epoch) {
        while let Some(entry) = self.open.first_entry() {
            if *entry.key() > limit {
                break;
            }
            let bucket = entry.remove();
            self.emit(bucket);
        }
        self.enforce_bound();
    }

    fn emit(&mut self, bucket: EpochBucket) {
        self.closed_through = Some(match self.closed_through {
            Some(closed) if closed > bucket.time => closed,
            _ => bucket.time,
        });

        let epoch = bucket.close();
        if !self.on_sampling_grid(&epoch) {
            self.stats.sampled_out += 1;
            return;
        }

        self.stats.epochs_emitted += 1;
        self.stats.observations_emitted += epoch.observation_count() as u64;
        tracing::debug!(
            week = epoch.gps_week(),
            sow = epoch.gps_seconds(),
            stations = epoch.stations.len(),
            observations = epoch.observation_count(),
            "Epoch closed"
        );
        self.ready.push_back(epoch);
    }

    fn on_sampling_grid(&self, epoch: &SyncedEpoch) -> bool {
        let interval = self.config.sampling.as_secs_f64();
        if interval <= 0.0 {
            return true;
        }
        let rem = epoch.gps_seconds() % interval;
        rem < SAMPLING_TOLERANCE || interval - rem < SAMPLING_TOLERANCE
    }

    /// Keep open + pending within `max_buckets`, oldest pending first
    fn enforce_bound(&mut self) {
        while self.open.len() + self.ready.len() > self.config.max_buckets {
            if let Some(dropped) = self.ready.pop_front() {
                self.stats.overflow_dropped += 1;
                tracing::warn!(
                    sow = dropped.gps_seconds(),
                    observations = dropped.observation_count(),
                    "Output stalled, dropping oldest pending epoch"
                );
            } else if let Some((time, bucket)) = self.open.pop_first() {
                self.closed_through = Some(match self.closed_through {
                    Some(closed) if closed > time => closed,
                    _ => time,
                });
                self.stats.overflow_dropped += 1;
                tracing::warn!(
                    observations = bucket.observation_count(),
                    "Too many open epochs, dropping oldest"
                );
            }
        }
    }
}
