//! RTCM3 broadcast ephemeris messages: 1019 (GPS), 1020 (GLONASS) and
//! 1045 (Galileo F/NAV).
//!
//! `rtcm_rs` carries angles in semicircles and GLONASS state in km; the
//! ephemeris types here use radians and meters.

use std::f64::consts::PI;

use gnss::prelude::{Constellation, SV};
use hifitime::Epoch;
use nalgebra::Vector3;
use rtcm_rs::msg::{Msg1019T, Msg1020T, Msg1045T};
use rtcm_rs::prelude::Message;

use super::time::{
    gps_epoch, resolve_glonass_time_of_day, resolve_week, week_seconds, GALILEO_WEEK_OFFSET,
    SECONDS_PER_WEEK,
};
use crate::ephemeris::{
    ClockModel, Ephemeris, GalileoEphemeris, GlonassEphemeris, GpsEphemeris, KeplerOrbit,
};
use crate::error::DecodeError;

/// Epoch for a seconds-of-week value broadcast alongside `reference`
fn near(reference: Epoch, sow: f64) -> Epoch {
    let (week, ref_sow) = week_seconds(reference);
    let diff = sow - ref_sow;
    if diff > SECONDS_PER_WEEK / 2.0 {
        gps_epoch(week, sow - SECONDS_PER_WEEK)
    } else if diff < -SECONDS_PER_WEEK / 2.0 {
        gps_epoch(week, sow + SECONDS_PER_WEEK)
    } else {
        gps_epoch(week, sow)
    }
}

/// Decode any supported ephemeris message
pub fn decode(message: &Message, hint: Option<Epoch>) -> Result<Ephemeris, DecodeError> {
    match message {
        Message::Msg1019(m) => decode_gps(m, hint).map(Ephemeris::Gps),
        Message::Msg1020(m) => decode_glonass(m, hint).map(Ephemeris::Glonass),
        Message::Msg1045(m) => decode_galileo(m, hint).map(Ephemeris::Galileo),
        Message::MsgNotSupported(m) => Err(DecodeError::UnsupportedType(m.message_number)),
        other => Err(DecodeError::UnsupportedType(other.number().unwrap_or(0))),
    }
}

/// Decode a 1019 GPS ephemeris
pub fn decode_gps(m: &Msg1019T, hint: Option<Epoch>) -> Result<GpsEphemeris, DecodeError> {
    let prn = m.gps_satellite_id;
    if !(1..=32).contains(&prn) {
        return Err(DecodeError::OutOfRange { field: "gps prn" });
    }
    let toe = m.toe_s as f64;
    let toc = m.toc_s as f64;
    if toe >= SECONDS_PER_WEEK || toc >= SECONDS_PER_WEEK {
        return Err(DecodeError::OutOfRange { field: "gps toe/toc" });
    }

    let hint = hint.ok_or(DecodeError::AmbiguousTime)?;
    let week = resolve_week(m.gps_week_number as u32, 10, week_seconds(hint).0);
    let toe = gps_epoch(week, toe);
    let toc = near(toe, toc);

    Ok(GpsEphemeris {
        sat: SV::new(Constellation::GPS, prn),
        orbit: KeplerOrbit {
            toe,
            sqrt_a: m.sqrt_a_sqrt_m,
            e: m.eccentricity,
            i0: m.i0_sc * PI,
            idot: m.idot_sc_s * PI,
            omega0: m.omega0_sc * PI,
            omega_dot: m.omegadot_sc_s * PI,
            omega: m.omega_sc * PI,
            m0: m.m0_sc * PI,
            delta_n: m.delta_n_sc_s as f64 * PI,
            cuc: m.cuc_rad as f64,
            cus: m.cus_rad as f64,
            crc: m.crc_m as f64,
            crs: m.crs_m as f64,
            cic: m.cic_rad as f64,
            cis: m.cis_rad as f64,
        },
        clock: ClockModel {
            toc,
            af0: m.af0_s,
            af1: m.af1_s_s as f64,
            af2: m.af2_s_s2 as f64,
        },
        iode: m.iode,
        iodc: m.iodc,
        ura_index: m.ura_index,
        health: m.sv_health_ind,
        tgd: m.tgd_s as f64,
        l2_codes: m.code_on_l2_ind,
        l2p_data_flag: m.l2_p_data_flag != 0,
        fit_interval: m.fit_interval_ind != 0,
        received_at: None,
    })
}

pub fn encode_gps(eph: &GpsEphemeris) -> Message {
    let o = &eph.orbit;
    let c = &eph.clock;
    Message::Msg1019(Msg1019T {
        gps_satellite_id: eph.sat.prn,
        gps_week_number: (eph.week() % 1024) as u16,
        ura_index: eph.ura_index,
        code_on_l2_ind: eph.l2_codes,
        idot_sc_s: o.idot / PI,
        iode: eph.iode,
        toc_s: week_seconds(c.toc).1 as f32,
        af2_s_s2: c.af2 as f32,
        af1_s_s: c.af1 as f32,
        af0_s: c.af0,
        iodc: eph.iodc,
        crs_m: o.crs as f32,
        delta_n_sc_s: (o.delta_n / PI) as f32,
        m0_sc: o.m0 / PI,
        cuc_rad: o.cuc as f32,
        eccentricity: o.e,
        cus_rad: o.cus as f32,
        sqrt_a_sqrt_m: o.sqrt_a,
        toe_s: week_seconds(o.toe).1 as f32,
        cic_rad: o.cic as f32,
        omega0_sc: o.omega0 / PI,
        cis_rad: o.cis as f32,
        i0_sc: o.i0 / PI,
        crc_m: o.crc as f32,
        omega_sc: o.omega / PI,
        omegadot_sc_s: o.omega_dot / PI,
        tgd_s: eph.tgd as f32,
        sv_health_ind: eph.health,
        l2_p_data_flag: eph.l2p_data_flag as u8,
        fit_interval_ind: eph.fit_interval as u8,
    })
}

/// Decode a 1045 Galileo F/NAV ephemeris
pub fn decode_galileo(m: &Msg1045T, hint: Option<Epoch>) -> Result<GalileoEphemeris, DecodeError> {
    let prn = m.gal_satellite_id;
    if !(1..=36).contains(&prn) {
        return Err(DecodeError::OutOfRange { field: "galileo prn" });
    }
    let toe = m.toe_s as f64;
    let toc = m.toc_s as f64;
    if toe >= SECONDS_PER_WEEK || toc >= SECONDS_PER_WEEK {
        return Err(DecodeError::OutOfRange { field: "galileo toe/toc" });
    }

    let hint = hint.ok_or(DecodeError::AmbiguousTime)?;
    let hint_gst_week = week_seconds(hint).0.saturating_sub(GALILEO_WEEK_OFFSET);
    let week = resolve_week(m.gal_week_number as u32, 12, hint_gst_week) + GALILEO_WEEK_OFFSET;
    let toe = gps_epoch(week, toe);
    let toc = near(toe, toc);

    Ok(GalileoEphemeris {
        sat: SV::new(Constellation::Galileo, prn),
        orbit: KeplerOrbit {
            toe,
            sqrt_a: m.sqrt_a_sqrt_m,
            e: m.eccentricity,
            i0: m.i0_sc * PI,
            idot: m.idot_sc_s as f64 * PI,
            omega0: m.omega0_sc * PI,
            omega_dot: m.omegadot_sc_s * PI,
            omega: m.omega_sc * PI,
            m0: m.m0_sc * PI,
            delta_n: m.delta_n_sc_s as f64 * PI,
            cuc: m.cuc_rad as f64,
            cus: m.cus_rad as f64,
            crc: m.crc_m as f64,
            crs: m.crs_m as f64,
            cic: m.cic_rad as f64,
            cis: m.cis_rad as f64,
        },
        clock: ClockModel {
            toc,
            af0: m.af0_s,
            af1: m.af1_s_s,
            af2: m.af2_s_s2 as f64,
        },
        iodnav: m.iodnav,
        sisa: m.sisa_e1_e5a_index,
        bgd_e1_e5a: m.bgd_e1_e5a_s as f64,
        e5a_health: m.e5a_sig_health_ind,
        e5a_data_invalid: m.e5a_data_validity_flag != 0,
        received_at: None,
    })
}

pub fn encode_galileo(eph: &GalileoEphemeris) -> Message {
    let o = &eph.orbit;
    let c = &eph.clock;
    Message::Msg1045(Msg1045T {
        gal_satellite_id: eph.sat.prn,
        gal_week_number: (eph.gst_week() % 4096) as u16,
        iodnav: eph.iodnav,
        sisa_e1_e5a_index: eph.sisa,
        idot_sc_s: (o.idot / PI) as f32,
        toc_s: week_seconds(c.toc).1 as f32,
        af2_s_s2: c.af2 as f32,
        af1_s_s: c.af1,
        af0_s: c.af0,
        crs_m: o.crs as f32,
        delta_n_sc_s: (o.delta_n / PI) as f32,
        m0_sc: o.m0 / PI,
        cuc_rad: o.cuc as f32,
        eccentricity: o.e,
        cus_rad: o.cus as f32,
        sqrt_a_sqrt_m: o.sqrt_a,
        toe_s: week_seconds(o.toe).1 as f32,
        cic_rad: o.cic as f32,
        omega0_sc: o.omega0 / PI,
        cis_rad: o.cis as f32,
        i0_sc: o.i0 / PI,
        crc_m: o.crc as f32,
        omega_sc: o.omega / PI,
        omegadot_sc_s: o.omega_dot / PI,
        bgd_e1_e5a_s: eph.bgd_e1_e5a as f32,
        e5a_sig_health_ind: eph.e5a_health,
        e5a_data_validity_flag: eph.e5a_data_invalid as u8,
        reserved_489_7: 0,
    })
}

/// Decode a 1020 GLONASS ephemeris
pub fn decode_glonass(m: &Msg1020T, hint: Option<Epoch>) -> Result<GlonassEphemeris, DecodeError> {
    let slot = m.glo_satellite_id;
    if !(1..=24).contains(&slot) {
        return Err(DecodeError::OutOfRange { field: "glonass slot" });
    }
    let k = m.glo_satellite_freq_chan_number;
    if !(-7..=6).contains(&k) {
        return Err(DecodeError::OutOfRange { field: "glonass frequency channel" });
    }
    let tb = m.tb_min / 15;
    if !(1..=95).contains(&tb) {
        return Err(DecodeError::OutOfRange { field: "glonass tb" });
    }

    let toc = resolve_glonass_time_of_day(tb as u64 * 900_000, hint)?;
    let tk = m.tk_h as u32 * 3600 + m.tk_min as u32 * 60 + m.tk_s as u32;
    let km = |v: f64| v * 1e3;

    Ok(GlonassEphemeris {
        sat: SV::new(Constellation::Glonass, slot),
        frequency_channel: k,
        toc,
        tb: tb as u8,
        tk,
        position: Vector3::new(km(m.xn_km), km(m.yn_km), km(m.zn_km)),
        velocity: Vector3::new(
            km(m.xn_first_deriv_km_s),
            km(m.yn_first_deriv_km_s),
            km(m.zn_first_deriv_km_s),
        ),
        acceleration: Vector3::new(
            km(m.xn_second_deriv_km_s2 as f64),
            km(m.yn_second_deriv_km_s2 as f64),
            km(m.zn_second_deriv_km_s2 as f64),
        ),
        tau_n: m.tau_n_s,
        gamma_n: m.gamma_n as f64,
        age: m.en_d,
        unhealthy: m.glo_eph_health_flag != 0,
        received_at: None,
    })
}

pub fn encode_glonass(eph: &GlonassEphemeris) -> Message {
    let (pos, vel, acc) = (eph.position / 1e3, eph.velocity / 1e3, eph.acceleration / 1e3);
    Message::Msg1020(Msg1020T {
        glo_satellite_id: eph.sat.prn,
        glo_satellite_freq_chan_number: eph.frequency_channel,
        tk_h: (eph.tk / 3600) as u8,
        tk_min: (eph.tk % 3600 / 60) as u8,
        tk_s: (eph.tk % 60) as u8,
        glo_eph_health_flag: eph.unhealthy as u8,
        tb_min: eph.tb as u16 * 15,
        xn_first_deriv_km_s: vel.x,
        xn_km: pos.x,
        xn_second_deriv_km_s2: acc.x as f32,
        yn_first_deriv_km_s: vel.y,
        yn_km: pos.y,
        yn_second_deriv_km_s2: acc.y as f32,
        zn_first_deriv_km_s: vel.z,
        zn_km: pos.z,
        zn_second_deriv_km_s2: acc.z as f32,
        gamma_n: eph.gamma_n as f32,
        tau_n_s: eph.tau_n,
        en_d: eph.age,
        // four-year interval number, counted from 1996
        glo_m_n4_year: 1992,
        ..Msg1020T::default()
    })
}
