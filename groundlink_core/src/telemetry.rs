//! Decoding of the telemetry port payload.
//!
//! Layout (hex bytes):
//!
//! | byte | field | scaling |
//! |---|---|---|
//! | 0 | reset counter | unsigned |
//! | 1 | solar reading | `value / 255 * 2.56` V |
//! | 2 | temperature | two's complement, `/ 2` °C |
//! | 3 | pressure | unsigned, `* 4` hPa |
//! | 4 | history pointer | unsigned |
//!
//! Payloads of 12 or more hex chars use the extended layout, where pressure
//! is a big-endian u16 in bytes 3–4 and the history pointer moves to byte 5.

use chrono::{DateTime, Utc};

use crate::error::TelemetryError;
use crate::packet::{ApplicationPacket, GeoFix};

/// Hex chars of the compact layout.
pub const COMPACT_LEN: usize = 10;
/// Hex chars of the extended layout.
pub const EXTENDED_LEN: usize = 12;

const SOLAR_FULL_SCALE_V: f64 = 2.56;
const PRESSURE_STEP_HPA: f64 = 4.0;

/// Interpret `hex` as a `bits`-wide two's-complement integer.
pub fn twos_complement(hex: &str, bits: u32) -> Result<i64, TelemetryError> {
    let bits = bits.clamp(1, 63);
    let value =
        i64::from_str_radix(hex, 16).map_err(|_| TelemetryError::InvalidHex(hex.to_string()))?;
    if value & (1 << (bits - 1)) != 0 {
        Ok(value - (1 << bits))
    } else {
        Ok(value)
    }
}

/// Barometric altitude in metres for `pressure_hpa` relative to
/// `baseline_hpa` at sea level.
pub fn altitude_m(pressure_hpa: f64, baseline_hpa: f64) -> f64 {
    44330.0 * (1.0 - (pressure_hpa / baseline_hpa).powf(0.1903))
}

/// Sensor fields carried by one telemetry payload.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TelemetryFields {
    pub reset_count: u8,
    pub solar_voltage: f64,
    pub temperature_c: f64,
    pub pressure_hpa: f64,
    pub history_pointer: u8,
}

fn byte_at(payload: &str, idx: usize) -> Result<u8, TelemetryError> {
    let s = payload
        .get(idx * 2..idx * 2 + 2)
        .ok_or(TelemetryError::TooShort(payload.len()))?;
    u8::from_str_radix(s, 16).map_err(|_| TelemetryError::InvalidHex(payload.to_string()))
}

pub fn decode(payload: &str) -> Result<TelemetryFields, TelemetryError> {
    if payload.len() < COMPACT_LEN {
        return Err(TelemetryError::TooShort(payload.len()));
    }
    let reset_count = byte_at(payload, 0)?;
    let solar = byte_at(payload, 1)?;
    let temp_hex = payload
        .get(4..6)
        .ok_or_else(|| TelemetryError::InvalidHex(payload.to_string()))?;
    let temp_raw = twos_complement(temp_hex, 8)?;
    let (pressure_raw, history_pointer) = if payload.len() >= EXTENDED_LEN {
        let hi = byte_at(payload, 3)?;
        let lo = byte_at(payload, 4)?;
        (u16::from_be_bytes([hi, lo]), byte_at(payload, 5)?)
    } else {
        (u16::from(byte_at(payload, 3)?), byte_at(payload, 4)?)
    };
    Ok(TelemetryFields {
        reset_count,
        solar_voltage: f64::from(solar) / 255.0 * SOLAR_FULL_SCALE_V,
        temperature_c: temp_raw as f64 / 2.0,
        pressure_hpa: f64::from(pressure_raw) * PRESSURE_STEP_HPA,
        history_pointer,
    })
}

/// Decoded telemetry, in arrival order.
#[derive(Debug, Clone, PartialEq)]
pub struct TelemetryRecord {
    pub reset_count: u8,
    pub solar_voltage: f64,
    pub temperature_c: f64,
    pub pressure_hpa: f64,
    pub history_pointer: u8,
    pub altitude_m: f64,
    pub position: Option<GeoFix>,
    pub station_count: u32,
    pub time: DateTime<Utc>,
    /// Frame the record came from; later duplicate receptions merge into it.
    pub frame_counter: u32,
}

impl TelemetryRecord {
    pub fn from_packet(
        packet: &ApplicationPacket,
        baseline_hpa: f64,
    ) -> Result<Self, TelemetryError> {
        let f = decode(&packet.payload)?;
        Ok(Self {
            reset_count: f.reset_count,
            solar_voltage: f.solar_voltage,
            temperature_c: f.temperature_c,
            pressure_hpa: f.pressure_hpa,
            history_pointer: f.history_pointer,
            altitude_m: altitude_m(f.pressure_hpa, baseline_hpa),
            position: packet.position,
            station_count: packet.station_count,
            time: packet.time,
            frame_counter: packet.frame_counter,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn twos_complement_8bit() {
        assert_eq!(twos_complement("FF", 8), Ok(-1));
        assert_eq!(twos_complement("7F", 8), Ok(127));
        assert_eq!(twos_complement("80", 8), Ok(-128));
        assert_eq!(twos_complement("00", 8), Ok(0));
        assert!(twos_complement("G1", 8).is_err());
    }

    #[test]
    fn altitude_at_baseline_is_zero() {
        assert!(altitude_m(1013.25, 1013.25).abs() < 1e-9);
        // roughly 5.5 km at half an atmosphere
        let half = altitude_m(506.6, 1013.25);
        assert!((5_000.0..6_000.0).contains(&half), "{half}");
    }

    #[test]
    fn decodes_compact_layout() {
        // RST SOLAR TEMP PRESS HPTR
        let f = decode("0103F5FC01").unwrap();
        assert_eq!(f.reset_count, 1);
        assert!((f.solar_voltage - 3.0 / 255.0 * 2.56).abs() < 1e-12);
        assert_eq!(f.temperature_c, -5.5);
        assert_eq!(f.pressure_hpa, 252.0 * 4.0);
        assert_eq!(f.history_pointer, 1);
    }

    #[test]
    fn decodes_extended_layout() {
        let f = decode("02FF14010007").unwrap();
        assert_eq!(f.reset_count, 2);
        assert!((f.solar_voltage - 2.56).abs() < 1e-12);
        assert_eq!(f.temperature_c, 10.0);
        assert_eq!(f.pressure_hpa, 256.0 * 4.0);
        assert_eq!(f.history_pointer, 7);
    }

    #[test]
    fn rejects_short_payloads() {
        assert_eq!(decode("0103F5"), Err(TelemetryError::TooShort(6)));
    }
}
