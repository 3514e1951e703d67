//! Ephemeris store
//!
//! Holds, per satellite, the current record and the one it replaced. The
//! replaced record stays usable for times before the new record's time of
//! clock so consumers evaluating just before a cutover see no jump.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use gnss::prelude::SV;
use hifitime::Epoch;
use tokio::sync::RwLock;

use super::{Ephemeris, SatelliteState};
use crate::error::EphemerisError;

/// Result of [`EphemerisStore::put`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PutOutcome {
    /// First record for the satellite
    New,
    /// Became current, the old current is kept as previous
    Replaced,
    /// Not newer than the current record, ignored
    Stale,
    /// Failed plausibility checks, ignored
    Invalid,
}

#[derive(Debug, Clone)]
struct Slot {
    current: Ephemeris,
    previous: Option<Ephemeris>,
}

impl Slot {
    /// The record in effect at `t`: the previous one before the current
    /// record's time of clock, otherwise whichever covers `t`
    fn select(&self, t: Epoch) -> Option<&Ephemeris> {
        let previous = self.previous.as_ref().filter(|p| p.covers(t));
        if t >= self.current.toc() && self.current.covers(t) {
            Some(&self.current)
        } else if previous.is_some() {
            previous
        } else if self.current.covers(t) {
            Some(&self.current)
        } else {
            None
        }
    }
}

/// Thread-safe ephemeris store shared by all pipelines
#[derive(Debug, Default)]
pub struct EphemerisStore {
    slots: RwLock<HashMap<SV, Slot>>,
}

impl EphemerisStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a record. It becomes current only if it is newer than the
    /// present current record.
    pub async fn put(&self, eph: Ephemeris) -> PutOutcome {
        let sat = eph.sat();
        if !eph.is_valid() {
            tracing::warn!(sat = %sat, iod = eph.iod(), "Implausible ephemeris ignored");
            return PutOutcome::Invalid;
        }

        let mut slots = self.slots.write().await;
        match slots.get_mut(&sat) {
            None => {
                tracing::debug!(sat = %sat, iod = eph.iod(), "First ephemeris");
                slots.insert(
                    sat,
                    Slot {
                        current: eph,
                        previous: None,
                    },
                );
                PutOutcome::New
            }
            Some(slot) if eph.is_newer_than(&slot.current) => {
                tracing::debug!(
                    sat = %sat,
                    iod = eph.iod(),
                    replaced_iod = slot.current.iod(),
                    "Ephemeris updated"
                );
                slot.previous = Some(std::mem::replace(&mut slot.current, eph));
                PutOutcome::Replaced
            }
            Some(_) => PutOutcome::Stale,
        }
    }

    /// Evaluate the record in effect at `t`
    pub async fn position(
        &self,
        sat: SV,
        t: Epoch,
    ) -> Result<SatelliteState, EphemerisError> {
        let slots = self.slots.read().await;
        slots
            .get(&sat)
            .and_then(|slot| slot.select(t))
            .ok_or_else(|| EphemerisError::NoValidEphemeris(sat.to_string()))?
            .position(t)
    }

    /// The record `position` would use at `t`
    pub async fn select(&self, sat: SV, t: Epoch) -> Option<Ephemeris> {
        let slots = self.slots.read().await;
        slots.get(&sat).and_then(|slot| slot.select(t)).cloned()
    }

    pub async fn current(&self, sat: SV) -> Option<Ephemeris> {
        self.slots.read().await.get(&sat).map(|s| s.current.clone())
    }

    pub async fn previous(&self, sat: SV) -> Option<Ephemeris> {
        self.slots
            .read()
            .await
            .get(&sat)
            .and_then(|s| s.previous.clone())
    }

    /// Satellites with a current record, sorted
    pub async fn satellites(&self) -> Vec<SV> {
        let mut sats: Vec<_> = self.slots.read().await.keys().copied().collect();
        sats.sort();
        sats
    }

    pub async fn len(&self) -> usize {
        self.slots.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.slots.read().await.is_empty()
    }

    /// Drop records whose validity ended before `now`
    pub async fn purge_expired(&self, now: Epoch) -> usize {
        let mut slots = self.slots.write().await;
        let mut removed = 0;

        for slot in slots.values_mut() {
            if slot.previous.as_ref().is_some_and(|p| p.validity().1 < now) {
                slot.previous = None;
                removed += 1;
            }
        }

        let expired: Vec<SV> = slots
            .iter()
            .filter(|(_, slot)| slot.current.validity().1 < now)
            .map(|(sat, _)| *sat)
            .collect();
        for sat in expired {
            slots.remove(&sat);
            removed += 1;
            tracing::debug!(sat = %sat, "Expired ephemeris removed");
        }

        removed
    }

    /// Spawn background purge against the system clock
    ///
    /// Returns a handle that can be used to abort the task.
    pub fn spawn_cleanup_task(self: &Arc<Self>, interval: Duration) -> tokio::task::JoinHandle<()> {
        let store = Arc::clone(self);

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                if let Some(now) = crate::message::time::now() {
                    let removed = store.purge_expired(now).await;
                    if removed > 0 {
                        tracing::info!(removed = removed, "Ephemeris cleanup");
                    }
                }
            }
        })
    }
}
