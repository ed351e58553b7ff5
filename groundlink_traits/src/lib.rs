//! Seams between the link session engine and its external collaborators.
//!
//! The relay scheduling API, the push feed, the LoRaWAN MAC decoder and the
//! multi-station triangulation engine all live outside the core. Each is
//! reached through one of the traits below so the engine can be driven by
//! real network clients, simulators, or test doubles.

pub mod clock;

pub use clock::{Clock, SystemClock};

use chrono::{DateTime, Utc};
use std::time::Duration;

/// Error type used at every trait boundary.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Identifier of an observation window planned on the relay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObservationHandle(pub String);

/// Identifier of a scheduled uplink transmission on the relay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransmissionHandle(pub String);

/// Progress of a scheduled uplink as reported by the relay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransmissionStatus {
    Pending,
    Done,
}

/// When a relay uplink should go out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UplinkStart {
    /// Transmit this long after the relay hears the satellite.
    Delay(Duration),
    /// Transmit at an absolute UTC instant.
    At(DateTime<Utc>),
}

/// One reception reported by the relay's packet artefact.
#[derive(Debug, Clone, PartialEq)]
pub struct RelayPacket {
    pub time: DateTime<Utc>,
    pub snr: f32,
    pub rssi: f32,
    pub frequency_error: f32,
    /// Encrypted MAC frame, hex encoded.
    pub data: String,
    /// Receiving station position (lat, lon) when the relay reports it.
    pub station: Option<(f64, f64)>,
}

/// Polling ground-station relay: observation planning, uplink scheduling,
/// and packet retrieval.
pub trait RelayTransport {
    fn plan_observation(
        &mut self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<ObservationHandle, BoxError>;

    fn plan_uplink(
        &mut self,
        frame_hex: &str,
        start: UplinkStart,
    ) -> Result<TransmissionHandle, BoxError>;

    fn transmission_status(
        &mut self,
        handle: &TransmissionHandle,
    ) -> Result<TransmissionStatus, BoxError>;

    /// Packets received so far in `observation`; an empty list when the
    /// artefact is missing or malformed.
    fn fetch_packets(
        &mut self,
        observation: &ObservationHandle,
    ) -> Result<Vec<RelayPacket>, BoxError>;
}

/// Second transmission path: replace the network server's queued downlinks
/// for the device with one command payload.
pub trait PushReply {
    fn replace_downlinks(&mut self, payload: &[u8], port: u8) -> Result<(), BoxError>;
}

/// Blocking source of raw push-feed messages (one JSON document each).
pub trait PushSource {
    /// Wait up to `timeout` for the next message. `Ok(None)` means nothing
    /// arrived in time.
    fn next_message(&mut self, timeout: Duration) -> Result<Option<String>, BoxError>;
}

/// Fields recovered from a LoRaWAN MAC frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MacFields {
    /// Device address as printed by the decoder (most significant byte first).
    pub device_address: String,
    pub frame_counter: u32,
    pub port: u8,
    /// Decrypted application payload, hex encoded.
    pub payload: String,
}

/// External MAC frame decoder: ciphertext + session key -> frame fields.
pub trait MacDecoder {
    /// `None` when the frame cannot be parsed or lacks any of the fields.
    fn decode(&self, cipher_hex: &str, session_key: &str) -> Option<MacFields>;
}

/// One station's view of a frame, as handed to the triangulation engine.
#[derive(Debug, Clone, PartialEq)]
pub struct StationObservation {
    pub lat: f64,
    pub lon: f64,
    pub rssi: f32,
    pub snr: f32,
    pub time: DateTime<Utc>,
}

/// Multi-station geolocation engine used for three or more receptions.
pub trait Triangulation {
    fn locate(&self, stations: &[StationObservation]) -> Option<(f64, f64)>;
}

impl<T: RelayTransport + ?Sized> RelayTransport for Box<T> {
    fn plan_observation(
        &mut self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<ObservationHandle, BoxError> {
        (**self).plan_observation(start, end)
    }

    fn plan_uplink(
        &mut self,
        frame_hex: &str,
        start: UplinkStart,
    ) -> Result<TransmissionHandle, BoxError> {
        (**self).plan_uplink(frame_hex, start)
    }

    fn transmission_status(
        &mut self,
        handle: &TransmissionHandle,
    ) -> Result<TransmissionStatus, BoxError> {
        (**self).transmission_status(handle)
    }

    fn fetch_packets(
        &mut self,
        observation: &ObservationHandle,
    ) -> Result<Vec<RelayPacket>, BoxError> {
        (**self).fetch_packets(observation)
    }
}

impl<T: PushReply + ?Sized> PushReply for Box<T> {
    fn replace_downlinks(&mut self, payload: &[u8], port: u8) -> Result<(), BoxError> {
        (**self).replace_downlinks(payload, port)
    }
}

impl<T: PushSource + ?Sized> PushSource for Box<T> {
    fn next_message(&mut self, timeout: Duration) -> Result<Option<String>, BoxError> {
        (**self).next_message(timeout)
    }
}
