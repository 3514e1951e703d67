//! Stream health tracking
//!
//! ```text
//!          silence >= limit                valid obs
//!  Normal -----------------> Outage -----------------> Recovering
//!    ^                         ^                          |   |
//!    |                         |    silence >= limit      |   |
//!    |                         +--------------------------+   |
//!    |              valid for recovery threshold              |
//!    +--------------------------------------------------------+
//! ```
//!
//! An outage that began while only corrupted data arrived is reported as
//! corrupted, both when it begins and when it ends.

use std::fmt;
use std::time::{Duration, Instant};

use super::config::SyncConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthState {
    Normal,
    Outage,
    Recovering,
}

/// Operator advisory attached to a transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdvisoryKind {
    BeginOutage,
    EndOutage,
    BeginCorrupted,
    EndCorrupted,
}

impl AdvisoryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AdvisoryKind::BeginOutage => "Begin_Outage",
            AdvisoryKind::EndOutage => "End_Outage",
            AdvisoryKind::BeginCorrupted => "Begin_Corrupted",
            AdvisoryKind::EndCorrupted => "End_Corrupted",
        }
    }
}

impl fmt::Display for AdvisoryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A health state transition of one station
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthEvent {
    pub station: String,
    pub from: HealthState,
    pub to: HealthState,
    pub advisory: Option<AdvisoryKind>,
}

/// Health state machine for one station
#[derive(Debug)]
pub struct HealthMonitor {
    station: String,
    state: HealthState,
    silence_limit: Duration,
    recovery_threshold: Duration,
    last_valid: Instant,
    last_corrupted: Option<Instant>,
    recovering_since: Option<Instant>,
    corrupted_outage: bool,
}

impl HealthMonitor {
    /// Start in `Normal`, counting silence from `now`
    pub fn new(station: impl Into<String>, config: &SyncConfig, now: Instant) -> Self {
        Self {
            station: station.into(),
            state: HealthState::Normal,
            silence_limit: config.silence_limit(),
            recovery_threshold: config.recovery_threshold,
            last_valid: now,
            last_corrupted: None,
            recovering_since: None,
            corrupted_outage: false,
        }
    }

    pub fn station(&self) -> &str {
        &self.station
    }

    pub fn state(&self) -> HealthState {
        self.state
    }

    pub fn last_valid(&self) -> Instant {
        self.last_valid
    }

    /// A valid observation arrived
    pub fn on_valid(&mut self, now: Instant) -> Vec<HealthEvent> {
        self.last_valid = now;
        let mut events = Vec::new();
        if self.state == HealthState::Outage {
            self.recovering_since = Some(now);
            events.push(self.transition(HealthState::Recovering, None));
        }
        events.extend(self.recover_if_due(now));
        events
    }

    /// Corrupted data arrived (checksum or decode failure)
    pub fn on_corrupted(&mut self, now: Instant) {
        self.last_corrupted = Some(now);
    }

    /// Periodic evaluation of the silence and recovery thresholds
    pub fn check(&mut self, now: Instant) -> Vec<HealthEvent> {
        let silent = now.saturating_duration_since(self.last_valid) >= self.silence_limit;
        match self.state {
            HealthState::Normal if silent => {
                self.corrupted_outage = self.last_corrupted.is_some_and(|c| c >= self.last_valid);
                let advisory = if self.corrupted_outage {
                    AdvisoryKind::BeginCorrupted
                } else {
                    AdvisoryKind::BeginOutage
                };
                vec![self.transition(HealthState::Outage, Some(advisory))]
            }
            HealthState::Recovering if silent => {
                self.recovering_since = None;
                vec![self.transition(HealthState::Outage, None)]
            }
            HealthState::Recovering => self.recover_if_due(now).into_iter().collect(),
            _ => Vec::new(),
        }
    }

    fn recover_if_due(&mut self, now: Instant) -> Option<HealthEvent> {
        let since = self.recovering_since?;
        if self.state != HealthState::Recovering
            || now.saturating_duration_since(since) < self.recovery_threshold
        {
            return None;
        }
        self.recovering_since = None;
        let advisory = if self.corrupted_outage {
            AdvisoryKind::EndCorrupted
        } else {
            AdvisoryKind::EndOutage
        };
        Some(self.transition(HealthState::Normal, Some(advisory)))
    }

    fn transition(&mut self, to: HealthState, advisory: Option<AdvisoryKind>) -> HealthEvent {
        let from = std::mem::replace(&mut self.state, to);
        match advisory {
            Some(kind) => tracing::info!(
                station = %self.station,
                from = ?from,
                to = ?to,
                advisory = %kind,
                "Stream health advisory"
            ),
            None => tracing::debug!(station = %self.station, from = ?from, to = ?to, "Stream health changed"),
        }
        HealthEvent {
            station: self.station.clone(),
            from,
            to,
            advisory,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SEC: Duration = Duration::from_secs(1);

    fn monitor(start: Instant) -> HealthMonitor {
        let config = SyncConfig::default()
            .obs_rate(1.0)
            .failure_threshold(SEC * 60)
            .recovery_threshold(SEC * 30);
        HealthMonitor::new("ALGO", &config, start)
    }

    #[test]
    fn test_regular_arrivals_stay_normal() {
        let t0 = Instant::now();
        let mut m = monitor(t0);
        for i in 1..200u32 {
            assert!(m.on_valid(t0 + SEC * i).is_empty());
            assert!(m.check(t0 + SEC * i).is_empty());
        }
        assert_eq!(m.state(), HealthState::Normal);
    }

    #[test]
    fn test_outage_exactly_once_at_threshold() {
        let t0 = Instant::now();
        let mut m = monitor(t0);
        m.on_valid(t0);

        assert!(m.check(t0 + SEC * 59).is_empty());
        let events = m.check(t0 + SEC * 60);
        assert_eq!(
            events,
            vec![HealthEvent {
                station: "ALGO".into(),
                from: HealthState::Normal,
                to: HealthState::Outage,
                advisory: Some(AdvisoryKind::BeginOutage),
            }]
        );
        for s in 61..200u32 {
            assert!(m.check(t0 + SEC * s).is_empty());
        }
        assert_eq!(m.state(), HealthState::Outage);
    }

    #[test]
    fn test_recovering_on_next_valid() {
        let t0 = Instant::now();
        let mut m = monitor(t0);
        m.check(t0 + SEC * 120);

        let events = m.on_valid(t0 + SEC * 130);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].from, HealthState::Outage);
        assert_eq!(events[0].to, HealthState::Recovering);
        assert_eq!(events[0].advisory, None);
    }

    #[test]
    fn test_recovery_after_threshold() {
        let t0 = Instant::now();
        let mut m = monitor(t0);
        m.check(t0 + SEC * 120);
        m.on_valid(t0 + SEC * 130);

        for s in 131..160u32 {
            assert!(m.on_valid(t0 + SEC * s).is_empty());
        }
        let events = m.on_valid(t0 + SEC * 160);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].to, HealthState::Normal);
        assert_eq!(events[0].advisory, Some(AdvisoryKind::EndOutage));
    }

    #[test]
    fn test_recovery_interrupted() {
        let t0 = Instant::now();
        let mut m = monitor(t0);
        m.check(t0 + SEC * 120);
        m.on_valid(t0 + SEC * 130);

        let events = m.check(t0 + SEC * 190);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].to, HealthState::Outage);
        assert_eq!(events[0].advisory, None);
    }

    #[test]
    fn test_corrupted_outage() {
        let t0 = Instant::now();
        let mut m = monitor(t0);
        m.on_valid(t0);
        m.on_corrupted(t0 + SEC * 10);
        m.on_corrupted(t0 + SEC * 50);

        let events = m.check(t0 + SEC * 60);
        assert_eq!(events[0].advisory, Some(AdvisoryKind::BeginCorrupted));

        m.on_valid(t0 + SEC * 70);
        let events = m.check(t0 + SEC * 100);
        assert_eq!(events[0].advisory, Some(AdvisoryKind::EndCorrupted));
    }

    #[test]
    fn test_zero_recovery_threshold_is_immediate() {
        let t0 = Instant::now();
        let config = SyncConfig::default()
            .obs_rate(1.0)
            .failure_threshold(SEC * 10)
            .recovery_threshold(Duration::ZERO);
        let mut m = HealthMonitor::new("ALGO", &config, t0);
        m.check(t0 + SEC * 10);

        let events = m.on_valid(t0 + SEC * 11);
        assert_eq!(events.len(), 2);
        assert_eq!(events[1].to, HealthState::Normal);
        assert_eq!(events[1].advisory, Some(AdvisoryKind::EndOutage));
    }

    #[test]
    fn test_advisory_names() {
        assert_eq!(AdvisoryKind::BeginOutage.to_string(), "Begin_Outage");
        assert_eq!(AdvisoryKind::EndCorrupted.to_string(), "End_Corrupted");
    }
}
