//! RTCM3 framing constants and message type ids

/// Preamble byte that starts every frame
pub const PREAMBLE: u8 = 0xD3;

/// Preamble + 16-bit header (6 reserved bits, 10-bit length)
pub const HEADER_LEN: usize = 3;

/// CRC-24Q trailer
pub const CRC_LEN: usize = 3;

/// Largest payload the 10-bit length field can describe
pub const MAX_PAYLOAD_LEN: usize = 1023;

/// Mask of the reserved bits in the second header byte
pub const RESERVED_MASK: u8 = 0xFC;

// Observation messages
pub const MSG_GPS_L1: u16 = 1001;
pub const MSG_GPS_L1_EXT: u16 = 1002;
pub const MSG_GPS_L1L2: u16 = 1003;
pub const MSG_GPS_L1L2_EXT: u16 = 1004;
pub const MSG_GLO_L1: u16 = 1009;
pub const MSG_GLO_L1_EXT: u16 = 1010;
pub const MSG_GLO_L1L2: u16 = 1011;
pub const MSG_GLO_L1L2_EXT: u16 = 1012;

// Broadcast ephemerides
pub const MSG_GPS_EPH: u16 = 1019;
pub const MSG_GLO_EPH: u16 = 1020;
pub const MSG_GAL_FNAV_EPH: u16 = 1045;

/// Speed of light (m/s)
pub const SPEED_OF_LIGHT: f64 = 299_792_458.0;

/// Light-millisecond, unit of the GPS pseudorange modulus ambiguity (m)
pub const GPS_AMBIGUITY_UNIT: f64 = 299_792.458;

/// Two light-milliseconds, unit of the GLONASS modulus ambiguity (m)
pub const GLO_AMBIGUITY_UNIT: f64 = 599_584.916;

pub const GPS_L1_HZ: f64 = 1_575.42e6;
pub const GPS_L2_HZ: f64 = 1_227.60e6;

pub const GLO_L1_HZ: f64 = 1_602.0e6;
pub const GLO_L1_STEP_HZ: f64 = 0.5625e6;
pub const GLO_L2_HZ: f64 = 1_246.0e6;
pub const GLO_L2_STEP_HZ: f64 = 0.4375e6;
