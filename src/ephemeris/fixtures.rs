//! Broadcast ephemerides used across the crate's tests. Every parameter is
//! an exact multiple of its RTCM3 field resolution.

use std::f64::consts::PI;

use gnss::prelude::{Constellation, SV};
use hifitime::Epoch;
use nalgebra::Vector3;

use super::glonass::GlonassEphemeris;
use super::kepler::{ClockModel, GalileoEphemeris, GpsEphemeris, KeplerOrbit};
use crate::message::time::{add_seconds, gps_epoch, resolve_glonass_time_of_day};

pub const TOE_WEEK: u32 = 2300;
pub const TOE_SOW: f64 = 345_600.0;

fn p2(e: i32) -> f64 {
    2f64.powi(e)
}

fn orbit(toe: Epoch, sqrt_a_raw: u32, e_raw: u32) -> KeplerOrbit {
    KeplerOrbit {
        toe,
        sqrt_a: sqrt_a_raw as f64 * p2(-19),
        e: e_raw as f64 * p2(-33),
        i0: 656_000_000.0 * p2(-31) * PI,
        idot: 100.0 * p2(-43) * PI,
        omega0: -1_200_000_000.0 * p2(-31) * PI,
        omega_dot: -22_000.0 * p2(-43) * PI,
        omega: 800_000_000.0 * p2(-31) * PI,
        m0: 300_000_000.0 * p2(-31) * PI,
        delta_n: 10_000.0 * p2(-43) * PI,
        cuc: -2_000.0 * p2(-29),
        cus: 3_000.0 * p2(-29),
        crc: 3_000.0 * p2(-5),
        crs: -1_000.0 * p2(-5),
        cic: 50.0 * p2(-29),
        cis: -40.0 * p2(-29),
    }
}

/// Healthy GPS ephemeris with toe = toc at `toe_sow` of [`TOE_WEEK`]
pub fn gps_ephemeris(prn: u8, toe_sow: f64) -> GpsEphemeris {
    let toe = gps_epoch(TOE_WEEK, toe_sow);
    GpsEphemeris {
        sat: SV::new(Constellation::GPS, prn),
        orbit: orbit(toe, 2_701_960_000, 85_899_346),
        clock: ClockModel {
            toc: toe,
            af0: -200_000.0 * p2(-31),
            af1: -500.0 * p2(-43),
            af2: 0.0,
        },
        iode: 42,
        iodc: 42,
        ura_index: 0,
        health: 0,
        tgd: -10.0 * p2(-31),
        l2_codes: 1,
        l2p_data_flag: false,
        fit_interval: false,
        received_at: None,
    }
}

/// The same orbit re-referenced `dt` seconds later, as the next upload
/// would broadcast it
pub fn advance_gps(eph: &GpsEphemeris, dt: f64) -> GpsEphemeris {
    let mut next = eph.clone();
    let o = &mut next.orbit;
    let a = o.semi_major_axis();
    let n = (super::kepler::GM_GPS / (a * a * a)).sqrt() + o.delta_n;
    o.toe = add_seconds(o.toe, dt);
    o.m0 += n * dt;
    o.omega0 += o.omega_dot * dt;
    o.i0 += o.idot * dt;
    next.clock.toc = add_seconds(next.clock.toc, dt);
    next.clock.af0 += next.clock.af1 * dt;
    next.iode = next.iode.wrapping_add(1);
    next.iodc += 1;
    next
}

pub fn galileo_ephemeris(prn: u8) -> GalileoEphemeris {
    let toe = gps_epoch(TOE_WEEK, TOE_SOW);
    GalileoEphemeris {
        sat: SV::new(Constellation::Galileo, prn),
        orbit: orbit(toe, 2_852_454_000, 2_576_980),
        clock: ClockModel {
            toc: toe,
            af0: 1_000_000.0 * p2(-34),
            af1: -300.0 * p2(-46),
            af2: 0.0,
        },
        iodnav: 77,
        sisa: 107,
        bgd_e1_e5a: 12.0 * p2(-32),
        e5a_health: 0,
        e5a_data_invalid: false,
        received_at: None,
    }
}

/// Reference epoch for [`glonass_ephemeris`]: Thursday 09:30 GPST
pub fn glonass_hint() -> Epoch {
    gps_epoch(TOE_WEEK, 4.0 * 86_400.0 + 34_200.0)
}

/// GLONASS ephemeris at tb = 50 (12:30 Moscow time)
pub fn glonass_ephemeris(slot: u8) -> GlonassEphemeris {
    let tb = 50u8;
    let toc = resolve_glonass_time_of_day(tb as u64 * 900_000, Some(glonass_hint()))
        .expect("fixture time");
    GlonassEphemeris {
        sat: SV::new(Constellation::Glonass, slot),
        frequency_channel: -4,
        toc,
        tb,
        tk: 12 * 3600 + 15 * 60 + 30,
        position: Vector3::new(-28_672_000.0, 24_576_000.0, 34_816_000.0) * p2(-11) * 1e3,
        velocity: Vector3::new(-2_355_014.0, 931_965.0, -2_597_281.0) * p2(-20) * 1e3,
        acceleration: Vector3::new(3.0, -2.0, 1.0) * p2(-30) * 1e3,
        tau_n: -1_000.0 * p2(-30),
        gamma_n: 2.0 * p2(-40),
        age: 0,
        unhealthy: false,
        received_at: None,
    }
}
