//! Epoch buckets

use std::collections::BTreeMap;
use std::time::Instant;

use hifitime::Epoch;

use crate::message::observation::Observation;
use crate::message::time::week_seconds;

/// Observations of all stations for one time tag, still accepting data
#[derive(Debug)]
pub struct EpochBucket {
    pub time: Epoch,
    pub created_at: Instant,
    stations: BTreeMap<String, Vec<Observation>>,
}

impl EpochBucket {
    pub fn new(time: Epoch, created_at: Instant) -> Self {
        Self {
            time,
            created_at,
            stations: BTreeMap::new(),
        }
    }

    pub fn push(&mut self, mut obs: Observation) {
        obs.mark_posted();
        self.stations.entry(obs.station.clone()).or_default().push(obs);
    }

    pub fn observation_count(&self) -> usize {
        self.stations.values().map(Vec::len).sum()
    }

    pub fn close(self) -> SyncedEpoch {
        SyncedEpoch {
            time: self.time,
            stations: self.stations,
        }
    }
}

/// A closed epoch: everything every station reported for one time tag
#[derive(Debug, Clone)]
pub struct SyncedEpoch {
    pub time: Epoch,
    pub stations: BTreeMap<String, Vec<Observation>>,
}

impl SyncedEpoch {
    pub fn gps_week(&self) -> u32 {
        week_seconds(self.time).0
    }

    pub fn gps_seconds(&self) -> f64 {
        week_seconds(self.time).1
    }

    pub fn observation_count(&self) -> usize {
        self.stations.values().map(Vec::len).sum()
    }

    pub fn station_ids(&self) -> impl Iterator<Item = &str> {
        self.stations.keys().map(String::as_str)
    }

    /// Hand the observations to the consumer, marking them received
    pub fn receive(self) -> BTreeMap<String, Vec<Observation>> {
        let mut stations = self.stations;
        for obs in stations.values_mut().flatten() {
            obs.mark_received();
        }
        stations
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::observation::ObsStatus;
    use gnss::prelude::{Constellation, SV};
    use crate::message::time::gps_epoch;

    #[test]
    fn test_bucket_groups_by_station() {
        let t = gps_epoch(2300, 100.0);
        let mut bucket = EpochBucket::new(t, Instant::now());
        bucket.push(Observation::new("ALGO", SV::new(Constellation::GPS, 1), t));
        bucket.push(Observation::new("WTZR", SV::new(Constellation::GPS, 1), t));
        bucket.push(Observation::new("ALGO", SV::new(Constellation::GPS, 2), t));
        assert_eq!(bucket.observation_count(), 3);

        let epoch = bucket.close();
        assert_eq!(epoch.station_ids().collect::<Vec<_>>(), vec!["ALGO", "WTZR"]);
        assert_eq!(epoch.stations["ALGO"].len(), 2);
        assert_eq!(epoch.gps_week(), 2300);
        assert!((epoch.gps_seconds() - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_status_lifecycle() {
        let t = gps_epoch(2300, 100.0);
        let obs = Observation::new("ALGO", SV::new(Constellation::GPS, 1), t);
        assert_eq!(obs.status(), ObsStatus::Initial);

        let mut bucket = EpochBucket::new(t, Instant::now());
        bucket.push(obs);
        let epoch = bucket.close();
        assert_eq!(epoch.stations["ALGO"][0].status(), ObsStatus::Posted);

        let received = epoch.receive();
        assert_eq!(received["ALGO"][0].status(), ObsStatus::Received);
    }
}
