//! Observation frames shared by the crate's tests

use rtcm_rs::msg::{
    Msg1001Sat, Msg1001T, Msg1002Sat, Msg1002T, Msg1003Sat, Msg1003T, Msg1004Sat, Msg1004T,
    Msg1009Sat, Msg1009T, Msg1010Sat, Msg1010T, Msg1011Sat, Msg1011T, Msg1012Sat, Msg1012T,
};
use rtcm_rs::prelude::Message;
use rtcm_rs::util::DataVec;

use crate::protocol::constants::GPS_AMBIGUITY_UNIT;
use crate::protocol::Frame;

/// One satellite of a legacy observation message, in meters and dB-Hz
#[derive(Debug, Clone)]
pub struct ObsSat {
    pub id: u8,
    pub fcn: i8,
    pub p_code: bool,
    pub pr1: Option<f64>,
    pub amb: f64,
    pub phase1: Option<f64>,
    pub cnr1: Option<f32>,
    pub l2_code: u8,
    pub diff: Option<f32>,
    pub phase2: Option<f64>,
    pub cnr2: Option<f32>,
}

impl Default for ObsSat {
    fn default() -> Self {
        Self {
            id: 0,
            fcn: 0,
            p_code: false,
            pr1: Some(0.0),
            amb: 0.0,
            phase1: None,
            cnr1: None,
            l2_code: 0,
            diff: None,
            phase2: None,
            cnr2: None,
        }
    }
}

fn sats<T: Default + Clone, const N: usize>(
    sats: &[ObsSat],
    f: impl Fn(&ObsSat) -> T,
) -> DataVec<T, N> {
    let mut v = DataVec::new();
    for s in sats {
        v.push(f(s));
    }
    v
}

/// 1001-1004 frame
pub fn gps_obs(msg_type: u16, station_id: u16, tow_ms: u32, sync: bool, list: &[ObsSat]) -> Frame {
    let sync = sync as u8;
    let message = match msg_type {
        1001 => Message::Msg1001(Msg1001T {
            reference_station_id: station_id,
            gps_epoch_time_ms: tow_ms,
            synchronous_gnss_msg_flag: sync,
            satellites: sats(list, |s| Msg1001Sat {
                gps_satellite_id: s.id,
                gps_l1_code_ind: s.p_code as u8,
                l1_pseudorange_m: s.pr1,
                l1_phase_pseudorange_diff_m: s.phase1,
                l1_lock_time_index: 127,
            }),
            ..Default::default()
        }),
        1002 => Message::Msg1002(Msg1002T {
            reference_station_id: station_id,
            gps_epoch_time_ms: tow_ms,
            synchronous_gnss_msg_flag: sync,
            satellites: sats(list, |s| Msg1002Sat {
                gps_satellite_id: s.id,
                gps_l1_code_ind: s.p_code as u8,
                l1_pseudorange_m: s.pr1,
                l1_phase_pseudorange_diff_m: s.phase1,
                l1_lock_time_index: 127,
                l1_pseudorange_amb_m: s.amb,
                l1_cnr_dbhz: s.cnr1,
            }),
            ..Default::default()
        }),
        1003 => Message::Msg1003(Msg1003T {
            reference_station_id: station_id,
            gps_epoch_time_ms: tow_ms,
            synchronous_gnss_msg_flag: sync,
            satellites: sats(list, |s| Msg1003Sat {
                gps_satellite_id: s.id,
                gps_l1_code_ind: s.p_code as u8,
                l1_pseudorange_m: s.pr1,
                l1_phase_pseudorange_diff_m: s.phase1,
                l1_lock_time_index: 127,
                gps_l2_code_ind: s.l2_code,
                l2_l1_pseudorange_diff_m: s.diff,
                l2_phase_l1_pseudorange_diff_m: s.phase2,
                l2_lock_time_index: 127,
            }),
            ..Default::default()
        }),
        _ => Message::Msg1004(Msg1004T {
            reference_station_id: station_id,
            gps_epoch_time_ms: tow_ms,
            synchronous_gnss_msg_flag: sync,
            satellites: sats(list, |s| Msg1004Sat {
                gps_satellite_id: s.id,
                gps_l1_code_ind: s.p_code as u8,
                l1_pseudorange_m: s.pr1,
                l1_phase_pseudorange_diff_m: s.phase1,
                l1_lock_time_index: 127,
                l1_pseudorange_amb_m: s.amb,
                l1_cnr_dbhz: s.cnr1,
                gps_l2_code_ind: s.l2_code,
                l2_l1_pseudorange_diff_m: s.diff,
                l2_phase_l1_pseudorange_diff_m: s.phase2,
                l2_lock_time_index: 127,
                l2_cnr_dbhz: s.cnr2,
            }),
            ..Default::default()
        }),
    };
    Frame::from_message(&message).unwrap()
}

/// 1009-1012 frame
pub fn glo_obs(msg_type: u16, station_id: u16, tod_ms: u32, sync: bool, list: &[ObsSat]) -> Frame {
    let sync = sync as u8;
    let message = match msg_type {
        1009 => Message::Msg1009(Msg1009T {
            reference_station_id: station_id,
            glo_epoch_time_ms: tod_ms,
            synchronous_gnss_msg_flag: sync,
            satellites: sats(list, |s| Msg1009Sat {
                glo_satellite_id: s.id,
                glo_l1_code_ind: s.p_code as u8,
                glo_satellite_freq_chan_number: s.fcn,
                l1_pseudorange_m: s.pr1,
                l1_phase_pseudorange_diff_m: s.phase1,
                l1_lock_time_index: 127,
            }),
            ..Default::default()
        }),
        1010 => Message::Msg1010(Msg1010T {
            reference_station_id: station_id,
            glo_epoch_time_ms: tod_ms,
            synchronous_gnss_msg_flag: sync,
            satellites: sats(list, |s| Msg1010Sat {
                glo_satellite_id: s.id,
                glo_l1_code_ind: s.p_code as u8,
                glo_satellite_freq_chan_number: s.fcn,
                l1_pseudorange_m: s.pr1,
                l1_phase_pseudorange_diff_m: s.phase1,
                l1_lock_time_index: 127,
                l1_pseudorange_amb_m: s.amb,
                l1_cnr_dbhz: s.cnr1,
            }),
            ..Default::default()
        }),
        1011 => Message::Msg1011(Msg1011T {
            reference_station_id: station_id,
            glo_epoch_time_ms: tod_ms,
            synchronous_gnss_msg_flag: sync,
            satellites: sats(list, |s| Msg1011Sat {
                glo_satellite_id: s.id,
                glo_l1_code_ind: s.p_code as u8,
                glo_satellite_freq_chan_number: s.fcn,
                l1_pseudorange_m: s.pr1,
                l1_phase_pseudorange_diff_m: s.phase1,
                l1_lock_time_index: 127,
                glo_l2_code_ind: s.l2_code,
                l2_l1_pseudorange_diff_m: s.diff,
                l2_phase_l1_pseudorange_diff_m: s.phase2,
                l2_lock_time_index: 127,
            }),
            ..Default::default()
        }),
        _ => Message::Msg1012(Msg1012T {
            reference_station_id: station_id,
            glo_epoch_time_ms: tod_ms,
            synchronous_gnss_msg_flag: sync,
            satellites: sats(list, |s| Msg1012Sat {
                glo_satellite_id: s.id,
                glo_l1_code_ind: s.p_code as u8,
                glo_satellite_freq_chan_number: s.fcn,
                l1_pseudorange_m: s.pr1,
                l1_phase_pseudorange_diff_m: s.phase1,
                l1_lock_time_index: 127,
                l1_pseudorange_amb_m: s.amb,
                l1_cnr_dbhz: s.cnr1,
                glo_l2_code_ind: s.l2_code,
                l2_l1_pseudorange_diff_m: s.diff,
                l2_phase_l1_pseudorange_diff_m: s.phase2,
                l2_lock_time_index: 127,
                l2_cnr_dbhz: s.cnr2,
            }),
            ..Default::default()
        }),
    };
    Frame::from_message(&message).unwrap()
}

/// A realistic dual frequency GPS satellite
pub fn gps_sat(prn: u8) -> ObsSat {
    ObsSat {
        id: prn,
        pr1: Some(62_000.0),
        amb: 70.0 * GPS_AMBIGUITY_UNIT,
        phase1: Some(0.75),
        cnr1: Some(44.0),
        diff: Some(2.4),
        phase2: Some(1.15),
        cnr2: Some(37.5),
        ..ObsSat::default()
    }
}
