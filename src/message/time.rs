//! GPS time handling
//!
//! Every time tag in the crate is a [`hifitime::Epoch`] in the GPST scale.
//! RTCM3 messages only carry truncated times (time of week, a 10-bit week
//! number, GLONASS time of day), so each one is resolved against the last
//! time known to the receiving pipeline.

use hifitime::{Duration, Epoch, TimeScale};

use crate::error::DecodeError;

pub const SECONDS_PER_DAY: f64 = 86_400.0;
pub const SECONDS_PER_WEEK: f64 = 604_800.0;
const HALF_WEEK: f64 = SECONDS_PER_WEEK / 2.0;
const HALF_DAY: f64 = SECONDS_PER_DAY / 2.0;

/// Moscow time offset of GLONASS system time from UTC
const GLONASS_UTC_OFFSET: f64 = 3.0 * 3600.0;
/// TAI - GPST
const TAI_GPS_OFFSET: f64 = 19.0;
/// Galileo week zero (1999-08-22) expressed in GPS weeks
pub const GALILEO_WEEK_OFFSET: u32 = 1024;

/// Build a GPST epoch from week and seconds of week
pub fn gps_epoch(week: u32, seconds: f64) -> Epoch {
    let whole_weeks = (seconds / SECONDS_PER_WEEK).floor();
    let sow = seconds - whole_weeks * SECONDS_PER_WEEK;
    let week = (week as i64 + whole_weeks as i64).max(0) as u32;
    Epoch::from_time_of_week(week, (sow * 1e9).round() as u64, TimeScale::GPST)
}

/// GPS week and seconds of week of an epoch
pub fn week_seconds(epoch: Epoch) -> (u32, f64) {
    let (week, nanos) = epoch.to_time_scale(TimeScale::GPST).to_time_of_week();
    (week, nanos as f64 * 1e-9)
}

/// Seconds from `reference` to `epoch`
pub fn seconds_since(epoch: Epoch, reference: Epoch) -> f64 {
    (epoch - reference).to_seconds()
}

pub fn add_seconds(epoch: Epoch, seconds: f64) -> Epoch {
    epoch + Duration::from_seconds(seconds)
}

/// GPST - UTC at `epoch`
pub fn gps_utc_offset(epoch: Epoch) -> f64 {
    epoch
        .leap_seconds(true)
        .map(|tai_utc| tai_utc - TAI_GPS_OFFSET)
        .unwrap_or(18.0)
}

/// Current time as a GPST epoch, if the system clock is usable
pub fn now() -> Option<Epoch> {
    Epoch::now().ok().map(|e| e.to_time_scale(TimeScale::GPST))
}

/// Expand a week number truncated to `bits` to the one closest to `hint_week`
pub fn resolve_week(truncated: u32, bits: u32, hint_week: u32) -> u32 {
    let modulus = 1u32 << bits;
    let truncated = truncated % modulus;
    let base = hint_week - hint_week % modulus;
    let candidate = base + truncated;
    if candidate > hint_week + modulus / 2 && candidate >= modulus {
        candidate - modulus
    } else if candidate + modulus / 2 < hint_week {
        candidate + modulus
    } else {
        candidate
    }
}

/// Place a GPS time of week (ms) in the week closest to `hint`
pub fn resolve_time_of_week(tow_ms: u64, hint: Option<Epoch>) -> Result<Epoch, DecodeError> {
    let hint = hint.ok_or(DecodeError::AmbiguousTime)?;
    if tow_ms >= 604_800_000 {
        return Err(DecodeError::OutOfRange { field: "time of week" });
    }
    let (week, hint_sow) = week_seconds(hint);
    let sow = tow_ms as f64 / 1000.0;
    let week = if sow - hint_sow < -HALF_WEEK {
        week + 1
    } else if sow - hint_sow > HALF_WEEK && week > 0 {
        week - 1
    } else {
        week
    };
    Ok(gps_epoch(week, sow))
}

/// Convert a GLONASS time of day (ms, Moscow time) to GPST, choosing the
/// day closest to `hint`
pub fn resolve_glonass_time_of_day(tod_ms: u64, hint: Option<Epoch>) -> Result<Epoch, DecodeError> {
    let hint = hint.ok_or(DecodeError::AmbiguousTime)?;
    if tod_ms >= 86_400_000 {
        return Err(DecodeError::OutOfRange { field: "glonass time of day" });
    }
    let (week, hint_sow) = week_seconds(hint);
    let gps_sod = tod_ms as f64 / 1000.0 - GLONASS_UTC_OFFSET + gps_utc_offset(hint);
    let day = (hint_sow / SECONDS_PER_DAY).floor();

    let mut sow = day * SECONDS_PER_DAY + gps_sod;
    while sow - hint_sow > HALF_DAY {
        sow -= SECONDS_PER_DAY;
    }
    while sow - hint_sow < -HALF_DAY {
        sow += SECONDS_PER_DAY;
    }
    // gps_epoch normalizes sow outside [0, week)
    Ok(gps_epoch(week, sow))
}

/// Round an epoch to the nearest multiple of `resolution` seconds of week
pub fn round_to(epoch: Epoch, resolution: f64) -> Epoch {
    let (week, sow) = week_seconds(epoch);
    gps_epoch(week, (sow / resolution).round() * resolution)
}
