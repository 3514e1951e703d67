//! Broadcast ephemerides
//!
//! [`Ephemeris`] is a tagged variant over the supported constellations.
//! Each variant owns its orbit model; [`Ephemeris::position`] dispatches on
//! the tag.

use gnss::prelude::SV;
use hifitime::Epoch;
use nalgebra::Vector3;

use crate::error::{EphemerisError, FrameError};
use crate::message::time::{add_seconds, seconds_since};
use crate::protocol::frame::Frame;

pub mod glonass;
pub mod kepler;
pub mod store;

#[cfg(test)]
pub(crate) mod fixtures;

pub use glonass::GlonassEphemeris;
pub use kepler::{ClockModel, GalileoEphemeris, GpsEphemeris, KeplerOrbit, OMEGA_EARTH};
pub use store::{EphemerisStore, PutOutcome};

/// Earth-fixed satellite position, velocity and clock at one instant
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SatelliteState {
    /// ECEF position (m)
    pub position: Vector3<f64>,
    /// ECEF velocity (m/s)
    pub velocity: Vector3<f64>,
    /// Satellite clock offset (s)
    pub clock_bias: f64,
    /// Satellite clock drift (s/s)
    pub clock_drift: f64,
}

impl SatelliteState {
    /// Express the state in the Earth-fixed frame of a receiver that sees
    /// the signal `travel_time` seconds after emission
    pub fn rotated_for_travel_time(&self, travel_time: f64) -> Self {
        let (sin, cos) = (OMEGA_EARTH * travel_time).sin_cos();
        let rotate = |v: &Vector3<f64>| Vector3::new(cos * v.x + sin * v.y, -sin * v.x + cos * v.y, v.z);
        Self {
            position: rotate(&self.position),
            velocity: rotate(&self.velocity),
            ..*self
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Ephemeris {
    Gps(GpsEphemeris),
    Glonass(GlonassEphemeris),
    Galileo(GalileoEphemeris),
}

impl Ephemeris {
    pub fn sat(&self) -> SV {
        match self {
            Ephemeris::Gps(e) => e.sat,
            Ephemeris::Glonass(e) => e.sat,
            Ephemeris::Galileo(e) => e.sat,
        }
    }

    /// Time of clock
    pub fn toc(&self) -> Epoch {
        match self {
            Ephemeris::Gps(e) => e.clock.toc,
            Ephemeris::Glonass(e) => e.toc,
            Ephemeris::Galileo(e) => e.clock.toc,
        }
    }

    /// Issue of data: IODC (GPS), IODnav (Galileo), tb (GLONASS)
    pub fn iod(&self) -> u32 {
        match self {
            Ephemeris::Gps(e) => e.iodc as u32,
            Ephemeris::Glonass(e) => e.tb as u32,
            Ephemeris::Galileo(e) => e.iodnav as u32,
        }
    }

    pub fn received_at(&self) -> Option<Epoch> {
        match self {
            Ephemeris::Gps(e) => e.received_at,
            Ephemeris::Glonass(e) => e.received_at,
            Ephemeris::Galileo(e) => e.received_at,
        }
    }

    pub fn set_received_at(&mut self, at: Epoch) {
        match self {
            Ephemeris::Gps(e) => e.received_at = Some(at),
            Ephemeris::Glonass(e) => e.received_at = Some(at),
            Ephemeris::Galileo(e) => e.received_at = Some(at),
        }
    }

    /// Parameters describe a usable orbit
    pub fn is_valid(&self) -> bool {
        match self {
            Ephemeris::Gps(e) => e.orbit.is_plausible(),
            Ephemeris::Glonass(e) => e.is_plausible(),
            Ephemeris::Galileo(e) => e.orbit.is_plausible(),
        }
    }

    /// Satellite flagged healthy by the broadcast
    pub fn is_healthy(&self) -> bool {
        match self {
            Ephemeris::Gps(e) => e.health == 0,
            Ephemeris::Glonass(e) => !e.unhealthy,
            Ephemeris::Galileo(e) => e.e5a_health == 0 && !e.e5a_data_invalid,
        }
    }

    /// Strict time-of-clock ordering
    pub fn is_newer_than(&self, other: &Ephemeris) -> bool {
        self.toc() > other.toc()
    }

    /// Interval over which the record may be evaluated
    pub fn validity(&self) -> (Epoch, Epoch) {
        let (center, half) = match self {
            Ephemeris::Gps(e) => (e.orbit.toe, e.half_validity()),
            Ephemeris::Glonass(e) => (e.toc, GlonassEphemeris::HALF_VALIDITY),
            Ephemeris::Galileo(e) => (e.orbit.toe, 2.0 * 3600.0),
        };
        (add_seconds(center, -half), add_seconds(center, half))
    }

    pub fn covers(&self, t: Epoch) -> bool {
        let (start, end) = self.validity();
        start <= t && t <= end
    }

    /// Seconds from the record's time of clock to `t`
    pub fn age_at(&self, t: Epoch) -> f64 {
        seconds_since(t, self.toc())
    }

    /// Evaluate the orbit and clock model at `t`
    pub fn position(&self, t: Epoch) -> Result<SatelliteState, EphemerisError> {
        match self {
            Ephemeris::Gps(e) => e.position(t),
            Ephemeris::Glonass(e) => e.position(t),
            Ephemeris::Galileo(e) => e.position(t),
        }
    }

    /// Encode as an RTCM3 1019, 1020 or 1045 frame
    pub fn encode_rtcm3(&self) -> Result<Frame, FrameError> {
        let message = match self {
            Ephemeris::Gps(e) => crate::message::ephemeris::encode_gps(e),
            Ephemeris::Glonass(e) => crate::message::ephemeris::encode_glonass(e),
            Ephemeris::Galileo(e) => crate::message::ephemeris::encode_galileo(e),
        };
        Frame::from_message(&message)
    }
}

impl From<GpsEphemeris> for Ephemeris {
    fn from(e: GpsEphemeris) -> Self {
        Ephemeris::Gps(e)
    }
}

impl From<GlonassEphemeris> for Ephemeris {
    fn from(e: GlonassEphemeris) -> Self {
        Ephemeris::Glonass(e)
    }
}

impl From<GalileoEphemeris> for Ephemeris {
    fn from(e: GalileoEphemeris) -> Self {
        Ephemeris::Galileo(e)
    }
}
