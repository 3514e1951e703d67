//! GLONASS broadcast ephemeris
//!
//! The broadcast message carries an Earth-fixed (PZ-90) state vector plus
//! the lunisolar acceleration at `toc`. Positions at other times come from
//! integrating the equations of motion with a fixed-step RK4.

use gnss::prelude::SV;
use hifitime::Epoch;
use nalgebra::{Vector3, Vector6};

use super::SatelliteState;
use crate::error::EphemerisError;
use crate::message::time::seconds_since;

/// PZ-90 gravitational constant (m³/s²)
pub const GM_GLONASS: f64 = 398_600.4418e9;
/// PZ-90 equatorial radius (m)
pub const AE_GLONASS: f64 = 6_378_136.0;
/// Second zonal harmonic
pub const J2_GLONASS: f64 = 1_082_625.75e-9;
/// Earth rotation rate (rad/s)
pub const OMEGA_GLONASS: f64 = 7.292115e-5;

/// Nominal integration step (s)
const NOMINAL_STEP: f64 = 10.0;

#[derive(Debug, Clone, PartialEq)]
pub struct GlonassEphemeris {
    pub sat: SV,
    /// Frequency channel number (-7..=6)
    pub frequency_channel: i8,
    /// Reference time, the center of the `tb` interval
    pub toc: Epoch,
    /// Index of the 15 minute interval within the Moscow day
    pub tb: u8,
    /// Start of the frame within the Moscow day (s)
    pub tk: u32,
    /// Position at `toc` (m)
    pub position: Vector3<f64>,
    /// Velocity at `toc` (m/s)
    pub velocity: Vector3<f64>,
    /// Lunisolar acceleration (m/s²)
    pub acceleration: Vector3<f64>,
    /// Clock bias, sign reversed (s)
    pub tau_n: f64,
    /// Relative frequency offset
    pub gamma_n: f64,
    /// Age of the operational information (days)
    pub age: u8,
    /// Unhealthy flag (Bn MSB)
    pub unhealthy: bool,
    pub received_at: Option<Epoch>,
}

impl GlonassEphemeris {
    /// Half width of the validity window around toc (s)
    pub const HALF_VALIDITY: f64 = 30.0 * 60.0;

    pub fn position(&self, t: Epoch) -> Result<SatelliteState, EphemerisError> {
        let dt = seconds_since(t, self.toc);
        let mut state = Vector6::new(
            self.position.x,
            self.position.y,
            self.position.z,
            self.velocity.x,
            self.velocity.y,
            self.velocity.z,
        );

        let steps = (dt.abs() / NOMINAL_STEP) as usize + 1;
        let h = dt / steps as f64;
        for _ in 0..steps {
            state = rk4_step(&state, &self.acceleration, h);
        }

        Ok(SatelliteState {
            position: Vector3::new(state[0], state[1], state[2]),
            velocity: Vector3::new(state[3], state[4], state[5]),
            clock_bias: -self.tau_n + self.gamma_n * dt,
            clock_drift: self.gamma_n,
        })
    }

    /// State vector radius within the GLONASS orbital shell
    pub fn is_plausible(&self) -> bool {
        (20_000e3..30_000e3).contains(&self.position.norm())
    }
}

fn rk4_step(y: &Vector6<f64>, acc: &Vector3<f64>, h: f64) -> Vector6<f64> {
    let k1 = derivative(y, acc);
    let k2 = derivative(&(y + k1 * (h / 2.0)), acc);
    let k3 = derivative(&(y + k2 * (h / 2.0)), acc);
    let k4 = derivative(&(y + k3 * h), acc);
    y + (k1 + k2 * 2.0 + k3 * 2.0 + k4) * (h / 6.0)
}

/// Equations of motion in the rotating PZ-90 frame (GLONASS ICD A.3.1.2)
fn derivative(y: &Vector6<f64>, acc: &Vector3<f64>) -> Vector6<f64> {
    let (x, yy, z) = (y[0], y[1], y[2]);
    let (vx, vy, vz) = (y[3], y[4], y[5]);

    let r2 = x * x + yy * yy + z * z;
    let r = r2.sqrt();
    let mu_r3 = GM_GLONASS / (r2 * r);
    let j2_term = 1.5 * J2_GLONASS * GM_GLONASS * AE_GLONASS * AE_GLONASS / (r2 * r2 * r);
    let z2_r2 = z * z / r2;
    let w2 = OMEGA_GLONASS * OMEGA_GLONASS;

    let ax = -mu_r3 * x - j2_term * x * (1.0 - 5.0 * z2_r2) + w2 * x + 2.0 * OMEGA_GLONASS * vy + acc.x;
    let ay = -mu_r3 * yy - j2_term * yy * (1.0 - 5.0 * z2_r2) + w2 * yy - 2.0 * OMEGA_GLONASS * vx + acc.y;
    let az = -mu_r3 * z - j2_term * z * (3.0 - 5.0 * z2_r2) + acc.z;

    Vector6::new(vx, vy, vz, ax, ay, az)
}
