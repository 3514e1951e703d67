//! Keplerian broadcast orbits (GPS, Galileo)
//!
//! Closed-form propagation per IS-GPS-200 table 20-IV. Galileo uses the
//! same model with its own gravitational constant.

use gnss::prelude::SV;
use hifitime::Epoch;
use nalgebra::Vector3;

use super::SatelliteState;
use crate::error::EphemerisError;
use crate::message::time::{seconds_since, week_seconds};
use crate::protocol::constants::SPEED_OF_LIGHT;

/// WGS-84 earth gravitational constant (m³/s²)
pub const GM_GPS: f64 = 3.986005e14;
/// Galileo earth gravitational constant (m³/s²)
pub const GM_GALILEO: f64 = 3.986004418e14;
/// Earth rotation rate (rad/s)
pub const OMEGA_EARTH: f64 = 7.2921151467e-5;

const KEPLER_MAX_ITER: usize = 30;
const KEPLER_TOLERANCE: f64 = 1e-13;

/// Keplerian elements and harmonic corrections. Angles are in radians.
#[derive(Debug, Clone, PartialEq)]
pub struct KeplerOrbit {
    /// Time of ephemeris
    pub toe: Epoch,
    /// Square root of the semi major axis (m^1/2)
    pub sqrt_a: f64,
    /// Eccentricity
    pub e: f64,
    /// Inclination at reference time
    pub i0: f64,
    /// Rate of inclination (rad/s)
    pub idot: f64,
    /// Longitude of ascending node at weekly epoch
    pub omega0: f64,
    /// Rate of right ascension (rad/s)
    pub omega_dot: f64,
    /// Argument of perigee
    pub omega: f64,
    /// Mean anomaly at reference time
    pub m0: f64,
    /// Mean motion difference (rad/s)
    pub delta_n: f64,
    /// Argument of latitude corrections (rad)
    pub cuc: f64,
    pub cus: f64,
    /// Orbit radius corrections (m)
    pub crc: f64,
    pub crs: f64,
    /// Inclination corrections (rad)
    pub cic: f64,
    pub cis: f64,
}

/// Satellite clock polynomial
#[derive(Debug, Clone, PartialEq)]
pub struct ClockModel {
    /// Time of clock
    pub toc: Epoch,
    /// Bias (s)
    pub af0: f64,
    /// Drift (s/s)
    pub af1: f64,
    /// Drift rate (s/s²)
    pub af2: f64,
}

impl ClockModel {
    pub fn offset(&self, t: Epoch) -> f64 {
        let dt = seconds_since(t, self.toc);
        self.af0 + self.af1 * dt + self.af2 * dt * dt
    }

    pub fn drift(&self, t: Epoch) -> f64 {
        self.af1 + 2.0 * self.af2 * seconds_since(t, self.toc)
    }
}

pub(crate) struct Propagated {
    pub position: Vector3<f64>,
    pub velocity: Vector3<f64>,
    pub eccentric_anomaly: f64,
}

/// Solve `E = M + e sin E` by fixed-point iteration
pub fn eccentric_anomaly(m: f64, e: f64) -> Result<f64, EphemerisError> {
    let mut ek = m;
    for _ in 0..KEPLER_MAX_ITER {
        let next = m + e * ek.sin();
        if (next - ek).abs() < KEPLER_TOLERANCE {
            return Ok(next);
        }
        ek = next;
    }
    Err(EphemerisError::KeplerDivergence)
}

impl KeplerOrbit {
    pub fn semi_major_axis(&self) -> f64 {
        self.sqrt_a * self.sqrt_a
    }

    pub(crate) fn propagate(&self, t: Epoch, gm: f64) -> Result<Propagated, EphemerisError> {
        let a = self.semi_major_axis();
        let tk = seconds_since(t, self.toe);
        let toe_sow = week_seconds(self.toe).1;

        let n = (gm / (a * a * a)).sqrt() + self.delta_n;
        let m = self.m0 + n * tk;
        let ek = eccentric_anomaly(m, self.e)?;
        let (sin_e, cos_e) = ek.sin_cos();
        let one_minus = 1.0 - self.e * cos_e;
        let root = (1.0 - self.e * self.e).sqrt();

        let v = (root * sin_e).atan2(cos_e - self.e);
        let phi = v + self.omega;
        let (sin2, cos2) = (2.0 * phi).sin_cos();

        let u = phi + self.cus * sin2 + self.cuc * cos2;
        let r = a * one_minus + self.crs * sin2 + self.crc * cos2;
        let i = self.i0 + self.cis * sin2 + self.cic * cos2 + self.idot * tk;

        let (sin_u, cos_u) = u.sin_cos();
        let (sin_i, cos_i) = i.sin_cos();
        let xp = r * cos_u;
        let yp = r * sin_u;

        let omega_dot = self.omega_dot - OMEGA_EARTH;
        let big_omega = self.omega0 + omega_dot * tk - OMEGA_EARTH * toe_sow;
        let (sin_o, cos_o) = big_omega.sin_cos();

        let position = Vector3::new(
            xp * cos_o - yp * cos_i * sin_o,
            xp * sin_o + yp * cos_i * cos_o,
            yp * sin_i,
        );

        let e_dot = n / one_minus;
        let v_dot = root * e_dot / one_minus;
        let u_dot = v_dot * (1.0 + 2.0 * (self.cus * cos2 - self.cuc * sin2));
        let r_dot = a * self.e * sin_e * e_dot + 2.0 * v_dot * (self.crs * cos2 - self.crc * sin2);
        let i_dot = self.idot + 2.0 * v_dot * (self.cis * cos2 - self.cic * sin2);

        let xp_dot = r_dot * cos_u - r * u_dot * sin_u;
        let yp_dot = r_dot * sin_u + r * u_dot * cos_u;

        let velocity = Vector3::new(
            -xp * omega_dot * sin_o + xp_dot * cos_o - yp_dot * sin_o * cos_i
                - yp * (omega_dot * cos_o * cos_i - i_dot * sin_o * sin_i),
            xp * omega_dot * cos_o + xp_dot * sin_o + yp_dot * cos_o * cos_i
                - yp * (omega_dot * sin_o * cos_i + i_dot * cos_o * sin_i),
            yp * i_dot * cos_i + yp_dot * sin_i,
        );

        Ok(Propagated {
            position,
            velocity,
            eccentric_anomaly: ek,
        })
    }

    /// Satellite state including clock bias with relativistic correction
    pub(crate) fn state(
        &self,
        clock: &ClockModel,
        t: Epoch,
        gm: f64,
    ) -> Result<SatelliteState, EphemerisError> {
        let p = self.propagate(t, gm)?;
        let f = -2.0 * gm.sqrt() / (SPEED_OF_LIGHT * SPEED_OF_LIGHT);
        let relativity = f * self.e * self.sqrt_a * p.eccentric_anomaly.sin();
        Ok(SatelliteState {
            position: p.position,
            velocity: p.velocity,
            clock_bias: clock.offset(t) + relativity,
            clock_drift: clock.drift(t),
        })
    }

    /// Plausible orbit for a MEO navigation satellite
    pub fn is_plausible(&self) -> bool {
        (4_000.0..7_000.0).contains(&self.sqrt_a) && (0.0..0.5).contains(&self.e)
    }
}

/// GPS LNAV ephemeris (message 1019)
#[derive(Debug, Clone, PartialEq)]
pub struct GpsEphemeris {
    pub sat: SV,
    pub orbit: KeplerOrbit,
    pub clock: ClockModel,
    pub iode: u8,
    pub iodc: u16,
    /// User range accuracy index
    pub ura_index: u8,
    /// Satellite health, 0 = healthy
    pub health: u8,
    /// Group delay (s)
    pub tgd: f64,
    pub l2_codes: u8,
    pub l2p_data_flag: bool,
    /// Fit interval flag; set means more than four hours
    pub fit_interval: bool,
    pub received_at: Option<Epoch>,
}

impl GpsEphemeris {
    pub fn week(&self) -> u32 {
        week_seconds(self.orbit.toe).0
    }

    /// Half width of the validity window around toe (s)
    pub fn half_validity(&self) -> f64 {
        if self.fit_interval {
            3.0 * 3600.0
        } else {
            2.0 * 3600.0
        }
    }

    pub fn position(&self, t: Epoch) -> Result<SatelliteState, EphemerisError> {
        self.orbit.state(&self.clock, t, GM_GPS)
    }
}

/// Galileo F/NAV ephemeris (message 1045)
#[derive(Debug, Clone, PartialEq)]
pub struct GalileoEphemeris {
    pub sat: SV,
    pub orbit: KeplerOrbit,
    pub clock: ClockModel,
    pub iodnav: u16,
    /// Signal in space accuracy index
    pub sisa: u8,
    /// E1-E5a broadcast group delay (s)
    pub bgd_e1_e5a: f64,
    /// E5a signal health status, 0 = ok
    pub e5a_health: u8,
    pub e5a_data_invalid: bool,
    pub received_at: Option<Epoch>,
}

impl GalileoEphemeris {
    /// Galileo system time week
    pub fn gst_week(&self) -> u32 {
        week_seconds(self.orbit.toe)
            .0
            .saturating_sub(crate::message::time::GALILEO_WEEK_OFFSET)
    }

    pub fn position(&self, t: Epoch) -> Result<SatelliteState, EphemerisError> {
        self.orbit.state(&self.clock, t, GM_GALILEO)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ephemeris::fixtures::{gps_ephemeris, TOE_SOW, TOE_WEEK};
    use crate::message::time::{add_seconds, gps_epoch};

    #[test]
    fn test_eccentric_anomaly_circular() {
        assert_eq!(eccentric_anomaly(1.2, 0.0).unwrap(), 1.2);
    }

    #[test]
    fn test_eccentric_anomaly_satisfies_kepler() {
        let (m, e) = (0.7, 0.2);
        let ek = eccentric_anomaly(m, e).unwrap();
        assert!((ek - e * ek.sin() - m).abs() < 1e-12);
    }

    #[test]
    fn test_eccentric_anomaly_diverges() {
        // e close to 1 converges too slowly for the iteration budget
        assert_eq!(
            eccentric_anomaly(0.01, 0.999).unwrap_err(),
            EphemerisError::KeplerDivergence
        );
    }

    #[test]
    fn test_orbit_radius() {
        let eph = gps_ephemeris(5, TOE_SOW);
        let state = eph.position(eph.orbit.toe).unwrap();
        let a = eph.orbit.semi_major_axis();
        let r = state.position.norm();
        assert!(r > a * (1.0 - eph.orbit.e) - 200.0);
        assert!(r < a * (1.0 + eph.orbit.e) + 200.0);
        // GPS orbital speed in the rotating frame is around 3 km/s
        let speed = state.velocity.norm();
        assert!(speed > 2_500.0 && speed < 4_500.0, "speed {speed}");
    }

    #[test]
    fn test_velocity_matches_finite_difference() {
        let eph = gps_ephemeris(5, TOE_SOW);
        let t = add_seconds(eph.orbit.toe, 600.0);
        let before = eph.position(add_seconds(t, -0.5)).unwrap().position;
        let after = eph.position(add_seconds(t, 0.5)).unwrap().position;
        let numeric = after - before;
        let analytic = eph.position(t).unwrap().velocity;
        assert!((numeric - analytic).norm() < 1e-3, "{}", (numeric - analytic).norm());
    }

    #[test]
    fn test_clock_polynomial() {
        let clock = ClockModel {
            toc: gps_epoch(TOE_WEEK, TOE_SOW),
            af0: 1e-4,
            af1: 1e-11,
            af2: 1e-18,
        };
        let t = add_seconds(clock.toc, 100.0);
        let expected = 1e-4 + 1e-9 + 1e-14;
        assert!((clock.offset(t) - expected).abs() < 1e-18);
        assert!((clock.drift(t) - (1e-11 + 2e-16)).abs() < 1e-24);
    }

    #[test]
    fn test_relativistic_term_is_small() {
        let eph = gps_ephemeris(5, TOE_SOW);
        let t = add_seconds(eph.orbit.toe, 1234.0);
        let state = eph.position(t).unwrap();
        let rel = state.clock_bias - eph.clock.offset(t);
        // bounded by F * e * sqrt(A)
        assert!(rel.abs() < 4.5e-10 * eph.orbit.e * eph.orbit.sqrt_a + 1e-15);
    }

    /// PRN 6 broadcast record from the RINEX 2.11 navigation example,
    /// week 1025, toe = toc = 409904
    fn prn6_1999() -> GpsEphemeris {
        let toe = gps_epoch(1025, 409_904.0);
        GpsEphemeris {
            sat: SV::new(gnss::prelude::Constellation::GPS, 6),
            orbit: KeplerOrbit {
                toe,
                sqrt_a: 0.515365489006e+04,
                e: 0.626740418375e-02,
                i0: 0.111541663136e+01,
                idot: 0.307155651409e-09,
                omega0: 0.329237003460e+00,
                omega_dot: -0.638312302555e-08,
                omega: 0.206958726335e+01,
                m0: 0.162092304801e+00,
                delta_n: 0.116040547840e-08,
                cuc: 0.484101474285e-05,
                cus: 0.652112066746e-05,
                crc: 0.326593750000e+03,
                crs: 0.934062500000e+02,
                cic: -0.242143869400e-07,
                cis: -0.596046447754e-07,
            },
            clock: ClockModel {
                toc: toe,
                af0: -0.839701388031e-03,
                af1: -0.165982783074e-10,
                af2: 0.0,
            },
            iode: 91,
            iodc: 91,
            ura_index: 0,
            health: 0,
            tgd: 0.0,
            l2_codes: 0,
            l2p_data_flag: false,
            fit_interval: false,
            received_at: None,
        }
    }

    #[test]
    fn test_known_position_prn6() {
        let eph = prn6_1999();
        let cases = [
            (0.0, [-4_237_540.5365, -18_156_232.3155, 18_685_002.2951], -8.397037183417663e-4),
            (1800.0, [-3_664_749.2411, -21_958_970.7564, 14_205_300.5501], -8.397372110091337e-4),
            (-3600.0, [-8_041_595.7222, -8_934_690.1136, 23_509_423.2931], -8.396365088177453e-4),
        ];
        for (dt, xyz, clock) in cases {
            let state = eph.position(add_seconds(eph.orbit.toe, dt)).unwrap();
            let expected = Vector3::new(xyz[0], xyz[1], xyz[2]);
            let err = (state.position - expected).norm();
            assert!(err < 1e-3, "{err} m off at toe{dt:+}");
            assert!((state.clock_bias - clock).abs() < 1e-15, "clock at toe{dt:+}");
        }
    }

    #[test]
    fn test_known_position_uses_galileo_constant() {
        // same elements under the Galileo GM shift the along-track position
        let gps = prn6_1999();
        let galileo = GalileoEphemeris {
            sat: SV::new(gnss::prelude::Constellation::Galileo, 6),
            orbit: gps.orbit.clone(),
            clock: gps.clock.clone(),
            iodnav: 0,
            sisa: 0,
            bgd_e1_e5a: 0.0,
            e5a_health: 0,
            e5a_data_invalid: false,
            received_at: None,
        };
        let t = add_seconds(gps.orbit.toe, 1800.0);
        let at_toe = (galileo.position(gps.orbit.toe).unwrap().position
            - gps.position(gps.orbit.toe).unwrap().position)
            .norm();
        assert!(at_toe < 1e-6);
        let apart = (galileo.position(t).unwrap().position - gps.position(t).unwrap().position).norm();
        assert!(apart > 0.1 && apart < 100.0, "{apart}");
    }

    #[test]
    fn test_plausibility() {
        let mut eph = gps_ephemeris(5, TOE_SOW);
        assert!(eph.orbit.is_plausible());
        eph.orbit.sqrt_a = 0.0;
        assert!(!eph.orbit.is_plausible());
    }
}
