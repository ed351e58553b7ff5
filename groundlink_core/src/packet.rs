//! Frame and packet records flowing through the downlink pipeline.

use chrono::{DateTime, Utc};
use groundlink_traits::{MacFields, RelayPacket, StationObservation};

use crate::error::BuildError;

/// Which ingestion channel produced a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    Relay,
    Push,
}

/// One station's reception of a frame.
#[derive(Debug, Clone, PartialEq)]
pub struct StationReport {
    pub snr: f32,
    pub rssi: f32,
    pub position: Option<(f64, f64)>,
    pub time: DateTime<Utc>,
}

impl StationReport {
    /// The triangulation view of this report, if the station is located.
    pub fn observation(&self) -> Option<StationObservation> {
        self.position.map(|(lat, lon)| StationObservation {
            lat,
            lon,
            rssi: self.rssi,
            snr: self.snr,
            time: self.time,
        })
    }
}

/// Payload of a raw frame: still encrypted (relay) or already decoded by the
/// network server (push).
#[derive(Debug, Clone, PartialEq)]
pub enum FrameBody {
    Cipher(String),
    Decoded(MacFields),
}

/// A reception as delivered by one of the ingestion sources. Immutable once
/// produced.
#[derive(Debug, Clone, PartialEq)]
pub struct RawFrame {
    pub source: SourceKind,
    pub received_at: DateTime<Utc>,
    pub snr: f32,
    pub rssi: f32,
    pub frequency_error: f32,
    pub body: FrameBody,
    pub station_position: Option<(f64, f64)>,
    pub station_count: u32,
    /// Per-station metadata; a single entry for relay frames.
    pub stations: Vec<StationReport>,
    /// Original message text, kept for diagnostics.
    pub envelope: Option<String>,
}

impl RawFrame {
    /// Wrap a relay packet. `default_station` is used when the packet does
    /// not carry the receiving station's position.
    pub fn from_relay(packet: RelayPacket, default_station: Option<(f64, f64)>) -> Self {
        let position = packet.station.or(default_station);
        Self {
            source: SourceKind::Relay,
            received_at: packet.time,
            snr: packet.snr,
            rssi: packet.rssi,
            frequency_error: packet.frequency_error,
            station_position: position,
            station_count: 1,
            stations: vec![StationReport {
                snr: packet.snr,
                rssi: packet.rssi,
                position,
                time: packet.time,
            }],
            body: FrameBody::Cipher(packet.data),
            envelope: None,
        }
    }
}

/// Position estimate attached to a packet.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoFix {
    pub lat: f64,
    pub lon: f64,
    /// Number of stations the estimate is based on.
    pub confidence: usize,
}

/// Canonical application-level packet after MAC decoding.
#[derive(Debug, Clone, PartialEq)]
pub struct ApplicationPacket {
    pub device_present: bool,
    pub frame_counter: u32,
    pub port: u8,
    pub payload: String,
    pub snr: f32,
    pub rssi: f32,
    pub frequency_error: f32,
    pub time: DateTime<Utc>,
    pub position: Option<GeoFix>,
    pub station_count: u32,
    pub envelope: Option<String>,
    pub source: SourceKind,
}

/// LoRaWAN device address.
///
/// Stored in the byte order used inside uplink MAC frames. Decoders print the
/// address most significant byte first, which is the reverse.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceAddress([u8; 4]);

impl DeviceAddress {
    pub fn parse(wire_hex: &str) -> Result<Self, BuildError> {
        let bytes = hex::decode(wire_hex)
            .map_err(|_| BuildError::InvalidDeviceAddress(wire_hex.to_string()))?;
        let arr: [u8; 4] = bytes
            .try_into()
            .map_err(|_| BuildError::InvalidDeviceAddress(wire_hex.to_string()))?;
        Ok(Self(arr))
    }

    /// Hex in MAC-frame order, e.g. `E6BD0B26`.
    pub fn wire_hex(&self) -> String {
        hex::encode_upper(self.0)
    }

    /// Hex as decoders print it, e.g. `260BBDE6`.
    pub fn display_hex(&self) -> String {
        let mut rev = self.0;
        rev.reverse();
        hex::encode_upper(rev)
    }

    pub fn matches_decoded(&self, decoded: &str) -> bool {
        decoded.eq_ignore_ascii_case(&self.display_hex())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn device_address_orders() {
        let a = DeviceAddress::parse("E6BD0B26").unwrap();
        assert_eq!(a.wire_hex(), "E6BD0B26");
        assert_eq!(a.display_hex(), "260BBDE6");
        assert!(a.matches_decoded("260bbde6"));
        assert!(!a.matches_decoded("E6BD0B26"));
    }

    #[test]
    fn device_address_rejects_bad_input() {
        assert!(DeviceAddress::parse("E6BD0B").is_err());
        assert!(DeviceAddress::parse("XXBD0B26").is_err());
    }

    #[test]
    fn relay_frame_uses_default_station_when_missing() {
        let pkt = RelayPacket {
            time: Utc::now(),
            snr: -3.5,
            rssi: -118.0,
            frequency_error: 120.0,
            data: "40260BBDE6".into(),
            station: None,
        };
        let frame = RawFrame::from_relay(pkt, Some((50.1, 14.4)));
        assert_eq!(frame.station_position, Some((50.1, 14.4)));
        assert_eq!(frame.station_count, 1);
        assert_eq!(frame.stations.len(), 1);
        assert!(frame.stations[0].observation().is_some());
    }
}
