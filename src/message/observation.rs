//! Observation records and the legacy RTCM3 observation messages
//!
//! | type | system  | content                        |
//! |------|---------|--------------------------------|
//! | 1001 | GPS     | L1                             |
//! | 1002 | GPS     | L1, ambiguity + CNR            |
//! | 1003 | GPS     | L1/L2                          |
//! | 1004 | GPS     | L1/L2, ambiguity + CNR         |
//! | 1009 | GLONASS | L1                             |
//! | 1010 | GLONASS | L1, ambiguity + CNR            |
//! | 1011 | GLONASS | L1/L2                          |
//! | 1012 | GLONASS | L1/L2, ambiguity + CNR         |
//!
//! Field extraction is done by `rtcm_rs`; this module turns its scaled
//! fields into observables.

use gnss::prelude::{Constellation, SV};
use hifitime::Epoch;
use rtcm_rs::prelude::Message;

use super::time::{resolve_glonass_time_of_day, resolve_time_of_week, week_seconds};
use crate::error::DecodeError;
use crate::protocol::constants::*;

/// Lifecycle of an observation record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObsStatus {
    /// Decoded, still held by its pipeline
    Initial,
    /// Handed to the epoch synchronizer
    Posted,
    /// Taken by the output sink
    Received,
}

/// One satellite's observables at one epoch, for one station.
///
/// Pseudoranges are in meters, carrier phases in cycles, signal strength
/// in dB-Hz. Absent observables are `None`.
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    pub station: String,
    pub sat: SV,
    /// GLONASS frequency channel number (-7..=6)
    pub frequency_channel: Option<i8>,
    pub time: Epoch,
    pub c1: Option<f64>,
    pub p1: Option<f64>,
    pub c2: Option<f64>,
    pub p2: Option<f64>,
    pub l1: Option<f64>,
    pub l2: Option<f64>,
    pub s1: Option<f64>,
    pub s2: Option<f64>,
    /// RINEX signal strength indices (1..=9)
    pub snr1: Option<u8>,
    pub snr2: Option<u8>,
    status: ObsStatus,
}

impl Observation {
    pub fn new(station: impl Into<String>, sat: SV, time: Epoch) -> Self {
        Self {
            station: station.into(),
            sat,
            frequency_channel: None,
            time,
            c1: None,
            p1: None,
            c2: None,
            p2: None,
            l1: None,
            l2: None,
            s1: None,
            s2: None,
            snr1: None,
            snr2: None,
            status: ObsStatus::Initial,
        }
    }

    pub fn gps_week(&self) -> u32 {
        week_seconds(self.time).0
    }

    pub fn gps_seconds(&self) -> f64 {
        week_seconds(self.time).1
    }

    pub fn status(&self) -> ObsStatus {
        self.status
    }

    pub(crate) fn mark_posted(&mut self) {
        self.status = ObsStatus::Posted;
    }

    /// Called by the sink consuming a synchronized epoch
    pub fn mark_received(&mut self) {
        self.status = ObsStatus::Received;
    }

    fn set_s1(&mut self, cnr: f64) {
        self.s1 = Some(cnr);
        self.snr1 = Some(snr_index(cnr));
    }

    fn set_s2(&mut self, cnr: f64) {
        self.s2 = Some(cnr);
        self.snr2 = Some(snr_index(cnr));
    }
}

/// Map a carrier-to-noise density to the RINEX 1..=9 signal strength scale
pub fn snr_index(cnr_dbhz: f64) -> u8 {
    ((cnr_dbhz / 6.0).floor() as i64).clamp(1, 9) as u8
}

/// Decoded content of one observation message
#[derive(Debug, Clone)]
pub struct ObservationMessage {
    pub msg_type: u16,
    pub station_id: u16,
    pub time: Epoch,
    /// More messages follow for this epoch
    pub synchronous: bool,
    pub observations: Vec<Observation>,
}

/// Per-satellite content shared by the eight legacy layouts
#[derive(Default)]
struct LegacySat {
    id: u8,
    fcn: Option<i8>,
    p_code: bool,
    /// Pseudorange modulo the ambiguity unit (m)
    pr1: Option<f64>,
    /// Whole ambiguity units (m)
    amb: f64,
    /// Phase range minus L1 pseudorange (m)
    phase1: Option<f64>,
    cnr1: Option<f32>,
    l2: Option<LegacyL2>,
}

struct LegacyL2 {
    p_code: bool,
    /// L2 minus L1 pseudorange (m)
    diff: Option<f32>,
    /// L2 phase range minus L1 pseudorange (m)
    phase: Option<f64>,
    cnr: Option<f32>,
}

struct LegacyEpoch {
    msg_type: u16,
    station_id: u16,
    time_ms: u32,
    synchronous: bool,
    sats: Vec<LegacySat>,
}

impl LegacyEpoch {
    fn new(
        msg_type: u16,
        station_id: u16,
        time_ms: u32,
        sync_flag: u8,
        sats: impl Iterator<Item = LegacySat>,
    ) -> Self {
        Self {
            msg_type,
            station_id,
            time_ms,
            synchronous: sync_flag != 0,
            sats: sats.collect(),
        }
    }

    fn from_message(message: &Message) -> Result<Self, DecodeError> {
        let epoch = match message {
            Message::Msg1001(m) => Self::new(
                MSG_GPS_L1,
                m.reference_station_id,
                m.gps_epoch_time_ms,
                m.synchronous_gnss_msg_flag,
                m.satellites.iter().map(|s| LegacySat {
                    id: s.gps_satellite_id,
                    p_code: s.gps_l1_code_ind != 0,
                    pr1: s.l1_pseudorange_m,
                    phase1: s.l1_phase_pseudorange_diff_m,
                    ..LegacySat::default()
                }),
            ),
            Message::Msg1002(m) => Self::new(
                MSG_GPS_L1_EXT,
                m.reference_station_id,
                m.gps_epoch_time_ms,
                m.synchronous_gnss_msg_flag,
                m.satellites.iter().map(|s| LegacySat {
                    id: s.gps_satellite_id,
                    p_code: s.gps_l1_code_ind != 0,
                    pr1: s.l1_pseudorange_m,
                    amb: s.l1_pseudorange_amb_m,
                    phase1: s.l1_phase_pseudorange_diff_m,
                    cnr1: s.l1_cnr_dbhz,
                    ..LegacySat::default()
                }),
            ),
            Message::Msg1003(m) => Self::new(
                MSG_GPS_L1L2,
                m.reference_station_id,
                m.gps_epoch_time_ms,
                m.synchronous_gnss_msg_flag,
                m.satellites.iter().map(|s| LegacySat {
                    id: s.gps_satellite_id,
                    p_code: s.gps_l1_code_ind != 0,
                    pr1: s.l1_pseudorange_m,
                    phase1: s.l1_phase_pseudorange_diff_m,
                    l2: Some(LegacyL2 {
                        p_code: s.gps_l2_code_ind != 0,
                        diff: s.l2_l1_pseudorange_diff_m,
                        phase: s.l2_phase_l1_pseudorange_diff_m,
                        cnr: None,
                    }),
                    ..LegacySat::default()
                }),
            ),
            Message::Msg1004(m) => Self::new(
                MSG_GPS_L1L2_EXT,
                m.reference_station_id,
                m.gps_epoch_time_ms,
                m.synchronous_gnss_msg_flag,
                m.satellites.iter().map(|s| LegacySat {
                    id: s.gps_satellite_id,
                    fcn: None,
                    p_code: s.gps_l1_code_ind != 0,
                    pr1: s.l1_pseudorange_m,
                    amb: s.l1_pseudorange_amb_m,
                    phase1: s.l1_phase_pseudorange_diff_m,
                    cnr1: s.l1_cnr_dbhz,
                    l2: Some(LegacyL2 {
                        p_code: s.gps_l2_code_ind != 0,
                        diff: s.l2_l1_pseudorange_diff_m,
                        phase: s.l2_phase_l1_pseudorange_diff_m,
                        cnr: s.l2_cnr_dbhz,
                    }),
                }),
            ),
            Message::Msg1009(m) => Self::new(
                MSG_GLO_L1,
                m.reference_station_id,
                m.glo_epoch_time_ms,
                m.synchronous_gnss_msg_flag,
                m.satellites.iter().map(|s| LegacySat {
                    id: s.glo_satellite_id,
                    fcn: Some(s.glo_satellite_freq_chan_number),
                    p_code: s.glo_l1_code_ind != 0,
                    pr1: s.l1_pseudorange_m,
                    phase1: s.l1_phase_pseudorange_diff_m,
                    ..LegacySat::default()
                }),
            ),
            Message::Msg1010(m) => Self::new(
                MSG_GLO_L1_EXT,
                m.reference_station_id,
                m.glo_epoch_time_ms,
                m.synchronous_gnss_msg_flag,
                m.satellites.iter().map(|s| LegacySat {
                    id: s.glo_satellite_id,
                    fcn: Some(s.glo_satellite_freq_chan_number),
                    p_code: s.glo_l1_code_ind != 0,
                    pr1: s.l1_pseudorange_m,
                    amb: s.l1_pseudorange_amb_m,
                    phase1: s.l1_phase_pseudorange_diff_m,
                    cnr1: s.l1_cnr_dbhz,
                    ..LegacySat::default()
                }),
            ),
            Message::Msg1011(m) => Self::new(
                MSG_GLO_L1L2,
                m.reference_station_id,
                m.glo_epoch_time_ms,
                m.synchronous_gnss_msg_flag,
                m.satellites.iter().map(|s| LegacySat {
                    id: s.glo_satellite_id,
                    fcn: Some(s.glo_satellite_freq_chan_number),
                    p_code: s.glo_l1_code_ind != 0,
                    pr1: s.l1_pseudorange_m,
                    phase1: s.l1_phase_pseudorange_diff_m,
                    l2: Some(LegacyL2 {
                        p_code: s.glo_l2_code_ind != 0,
                        diff: s.l2_l1_pseudorange_diff_m,
                        phase: s.l2_phase_l1_pseudorange_diff_m,
                        cnr: None,
                    }),
                    ..LegacySat::default()
                }),
            ),
            Message::Msg1012(m) => Self::new(
                MSG_GLO_L1L2_EXT,
                m.reference_station_id,
                m.glo_epoch_time_ms,
                m.synchronous_gnss_msg_flag,
                m.satellites.iter().map(|s| LegacySat {
                    id: s.glo_satellite_id,
                    fcn: Some(s.glo_satellite_freq_chan_number),
                    p_code: s.glo_l1_code_ind != 0,
                    pr1: s.l1_pseudorange_m,
                    amb: s.l1_pseudorange_amb_m,
                    phase1: s.l1_phase_pseudorange_diff_m,
                    cnr1: s.l1_cnr_dbhz,
                    l2: Some(LegacyL2 {
                        p_code: s.glo_l2_code_ind != 0,
                        diff: s.l2_l1_pseudorange_diff_m,
                        phase: s.l2_phase_l1_pseudorange_diff_m,
                        cnr: s.l2_cnr_dbhz,
                    }),
                }),
            ),
            Message::MsgNotSupported(m) => {
                return Err(DecodeError::UnsupportedType(m.message_number))
            }
            other => return Err(DecodeError::UnsupportedType(other.number().unwrap_or(0))),
        };
        Ok(epoch)
    }

    fn is_glonass(&self) -> bool {
        (MSG_GLO_L1..=MSG_GLO_L1L2_EXT).contains(&self.msg_type)
    }
}

fn fill(obs: &mut Observation, s: &LegacySat, pr1: f64, l1_hz: f64, l2_hz: f64) {
    if s.p_code {
        obs.p1 = Some(pr1);
    } else {
        obs.c1 = Some(pr1);
    }
    if let Some(phase) = s.phase1 {
        obs.l1 = Some((pr1 + phase) * l1_hz / SPEED_OF_LIGHT);
    }
    if let Some(cnr) = s.cnr1 {
        obs.set_s1(cnr as f64);
    }

    if let Some(l2) = &s.l2 {
        if let Some(diff) = l2.diff {
            let pr2 = pr1 + diff as f64;
            if l2.p_code {
                obs.p2 = Some(pr2);
            } else {
                obs.c2 = Some(pr2);
            }
        }
        if let Some(phase) = l2.phase {
            obs.l2 = Some((pr1 + phase) * l2_hz / SPEED_OF_LIGHT);
        }
        if let Some(cnr) = l2.cnr {
            obs.set_s2(cnr as f64);
        }
    }
}

/// Decode a 1001-1004 or 1009-1012 message
pub fn decode(
    message: &Message,
    station: &str,
    hint: Option<Epoch>,
) -> Result<ObservationMessage, DecodeError> {
    let epoch = LegacyEpoch::from_message(message)?;
    let glonass = epoch.is_glonass();
    let time = if glonass {
        resolve_glonass_time_of_day(epoch.time_ms as u64, hint)?
    } else {
        resolve_time_of_week(epoch.time_ms as u64, hint)?
    };

    let mut observations = Vec::with_capacity(epoch.sats.len());
    for s in &epoch.sats {
        let obs = if glonass {
            glonass_observation(s, station, time)?
        } else {
            gps_observation(s, station, time)?
        };
        observations.extend(obs);
    }

    Ok(ObservationMessage {
        msg_type: epoch.msg_type,
        station_id: epoch.station_id,
        time,
        synchronous: epoch.synchronous,
        observations,
    })
}

fn gps_observation(s: &LegacySat, station: &str, time: Epoch) -> Result<Option<Observation>, DecodeError> {
    match s.id {
        0 => return Err(DecodeError::OutOfRange { field: "gps satellite id" }),
        1..=39 => {}
        _ => {
            tracing::trace!(sat = s.id, "skipping SBAS satellite");
            return Ok(None);
        }
    }
    let Some(pr1) = s.pr1 else {
        tracing::trace!(sat = s.id, "no L1 pseudorange");
        return Ok(None);
    };
    let mut obs = Observation::new(station, SV::new(Constellation::GPS, s.id), time);
    fill(&mut obs, s, pr1 + s.amb, GPS_L1_HZ, GPS_L2_HZ);
    Ok(Some(obs))
}

fn glonass_observation(
    s: &LegacySat,
    station: &str,
    time: Epoch,
) -> Result<Option<Observation>, DecodeError> {
    if s.id == 0 || s.id > 32 {
        return Err(DecodeError::OutOfRange { field: "glonass slot" });
    }
    let k = match s.fcn {
        Some(k @ -7..=6) => k,
        _ => return Err(DecodeError::OutOfRange { field: "glonass frequency channel" }),
    };
    let Some(pr1) = s.pr1 else {
        tracing::trace!(slot = s.id, "no L1 pseudorange");
        return Ok(None);
    };
    let l1_hz = GLO_L1_HZ + k as f64 * GLO_L1_STEP_HZ;
    let l2_hz = GLO_L2_HZ + k as f64 * GLO_L2_STEP_HZ;

    let mut obs = Observation::new(station, SV::new(Constellation::Glonass, s.id), time);
    obs.frequency_channel = Some(k);
    fill(&mut obs, s, pr1 + s.amb, l1_hz, l2_hz);
    Ok(Some(obs))
}
