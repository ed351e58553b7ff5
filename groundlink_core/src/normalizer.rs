//! Raw frame -> canonical application packet.
//!
//! Frames that do not belong to the configured device, or that lack a frame
//! counter, port or payload, are dropped here. That is the normal case on a
//! shared channel and is not reported as an error.

use groundlink_traits::{MacDecoder, MacFields, StationObservation, Triangulation};

use crate::packet::{ApplicationPacket, DeviceAddress, FrameBody, GeoFix, RawFrame, SourceKind};
use crate::position;

pub struct Normalizer {
    device: DeviceAddress,
    session_key: String,
    decoder: Box<dyn MacDecoder + Send>,
    triangulation: Option<Box<dyn Triangulation + Send>>,
}

impl core::fmt::Debug for Normalizer {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Normalizer")
            .field("device", &self.device.wire_hex())
            .field("triangulation", &self.triangulation.is_some())
            .finish()
    }
}

impl Normalizer {
    pub fn new(
        device: DeviceAddress,
        session_key: String,
        decoder: Box<dyn MacDecoder + Send>,
        triangulation: Option<Box<dyn Triangulation + Send>>,
    ) -> Self {
        Self {
            device,
            session_key,
            decoder,
            triangulation,
        }
    }

    pub fn device(&self) -> &DeviceAddress {
        &self.device
    }

    fn mac_fields(&self, frame: &RawFrame) -> Option<MacFields> {
        match &frame.body {
            FrameBody::Cipher(hex) => self.decoder.decode(hex, &self.session_key),
            FrameBody::Decoded(fields) => Some(fields.clone()),
        }
    }

    /// Decode `frame` into an application packet for the configured device.
    pub fn normalize(&self, frame: &RawFrame) -> Option<ApplicationPacket> {
        let Some(fields) = self.mac_fields(frame) else {
            tracing::debug!(source = ?frame.source, "undecodable frame discarded");
            return None;
        };
        // Push frames are filtered by device id upstream and may omit the address.
        let address_known = frame.source == SourceKind::Relay || !fields.device_address.is_empty();
        if address_known && !self.device.matches_decoded(&fields.device_address) {
            tracing::debug!(dev_addr = %fields.device_address, "foreign frame discarded");
            return None;
        }
        if fields.payload.is_empty() {
            tracing::debug!(fcnt = fields.frame_counter, "frame without payload discarded");
            return None;
        }

        let (snr, rssi) = worst_signal(frame);
        let observations: Vec<StationObservation> =
            frame.stations.iter().filter_map(|s| s.observation()).collect();
        let engine = self
            .triangulation
            .as_deref()
            .map(|t| t as &dyn Triangulation);
        let est = position::estimate(&observations, engine);
        let position = (est.confidence > 0).then_some(GeoFix {
            lat: est.lat,
            lon: est.lon,
            confidence: est.confidence,
        });
        let station_count = match frame.source {
            SourceKind::Relay => frame.station_count.max(1),
            SourceKind::Push => u32::try_from(frame.stations.len())
                .unwrap_or(u32::MAX)
                .max(frame.station_count)
                .max(1),
        };

        Some(ApplicationPacket {
            device_present: true,
            frame_counter: fields.frame_counter,
            port: fields.port,
            payload: fields.payload.to_ascii_uppercase(),
            snr,
            rssi,
            frequency_error: frame.frequency_error,
            time: frame.received_at,
            position,
            station_count,
            envelope: frame.envelope.clone(),
            source: frame.source,
        })
    }
}

/// Push frames report the weakest of their stations' SNR and RSSI; relay
/// frames carry their single reception as-is.
fn worst_signal(frame: &RawFrame) -> (f32, f32) {
    if frame.source == SourceKind::Push && !frame.stations.is_empty() {
        let snr = frame
            .stations
            .iter()
            .map(|s| s.snr)
            .fold(f32::INFINITY, f32::min);
        let rssi = frame
            .stations
            .iter()
            .map(|s| s.rssi)
            .fold(f32::INFINITY, f32::min);
        (snr, rssi)
    } else {
        (frame.snr, frame.rssi)
    }
}
