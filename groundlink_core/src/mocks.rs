//! Test and helper mocks for groundlink_core

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use groundlink_traits::{
    BoxError, MacDecoder, MacFields, ObservationHandle, PushReply, PushSource, RelayPacket,
    RelayTransport, TransmissionHandle, TransmissionStatus, UplinkStart,
};

type Shared<T> = Arc<Mutex<T>>;

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Relay double: records every planned uplink, reports a fixed transmission
/// status and serves packets pushed into it.
#[derive(Debug, Clone)]
pub struct ScriptedRelay {
    uplinks: Shared<Vec<(String, UplinkStart)>>,
    observations: Shared<Vec<(DateTime<Utc>, DateTime<Utc>)>>,
    packets: Shared<Vec<RelayPacket>>,
    status: Shared<TransmissionStatus>,
    fail_uplinks: Arc<AtomicBool>,
    fail_fetch: Arc<AtomicBool>,
    next_id: Arc<AtomicUsize>,
}

impl Default for ScriptedRelay {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedRelay {
    pub fn new() -> Self {
        Self {
            uplinks: Arc::default(),
            observations: Arc::default(),
            packets: Arc::default(),
            status: Arc::new(Mutex::new(TransmissionStatus::Done)),
            fail_uplinks: Arc::default(),
            fail_fetch: Arc::default(),
            next_id: Arc::default(),
        }
    }

    /// Uplinks planned so far as `(mac frame, start)`.
    pub fn uplinks(&self) -> Shared<Vec<(String, UplinkStart)>> {
        Arc::clone(&self.uplinks)
    }

    pub fn observations(&self) -> Shared<Vec<(DateTime<Utc>, DateTime<Utc>)>> {
        Arc::clone(&self.observations)
    }

    /// Make the next fetches return `packet` as well.
    pub fn push_packet(&self, packet: RelayPacket) {
        lock(&self.packets).push(packet);
    }

    pub fn set_status(&self, status: TransmissionStatus) {
        *lock(&self.status) = status;
    }

    pub fn fail_uplinks(&self, fail: bool) {
        self.fail_uplinks.store(fail, Ordering::Relaxed);
    }

    pub fn fail_fetch(&self, fail: bool) {
        self.fail_fetch.store(fail, Ordering::Relaxed);
    }
}

impl RelayTransport for ScriptedRelay {
    fn plan_observation(
        &mut self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<ObservationHandle, BoxError> {
        lock(&self.observations).push((start, end));
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        Ok(ObservationHandle(format!("obs-{id}")))
    }

    fn plan_uplink(
        &mut self,
        frame_hex: &str,
        start: UplinkStart,
    ) -> Result<TransmissionHandle, BoxError> {
        if self.fail_uplinks.load(Ordering::Relaxed) {
            return Err(Box::new(std::io::Error::other("uplink rejected")));
        }
        lock(&self.uplinks).push((frame_hex.to_string(), start));
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        Ok(TransmissionHandle(format!("tx-{id}")))
    }

    fn transmission_status(
        &mut self,
        _handle: &TransmissionHandle,
    ) -> Result<TransmissionStatus, BoxError> {
        Ok(*lock(&self.status))
    }

    fn fetch_packets(
        &mut self,
        _observation: &ObservationHandle,
    ) -> Result<Vec<RelayPacket>, BoxError> {
        if self.fail_fetch.load(Ordering::Relaxed) {
            return Err(Box::new(std::io::Error::other("artefact unavailable")));
        }
        Ok(lock(&self.packets).clone())
    }
}

/// Push-reply double recording `(payload, port)` pairs.
#[derive(Debug, Clone, Default)]
pub struct RecordingPushReply {
    sent: Shared<Vec<(Vec<u8>, u8)>>,
}

impl RecordingPushReply {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Shared<Vec<(Vec<u8>, u8)>> {
        Arc::clone(&self.sent)
    }
}

impl PushReply for RecordingPushReply {
    fn replace_downlinks(&mut self, payload: &[u8], port: u8) -> Result<(), BoxError> {
        lock(&self.sent).push((payload.to_vec(), port));
        Ok(())
    }
}

/// Push source replaying queued messages, then reporting silence.
#[derive(Debug, Clone, Default)]
pub struct QueuedPushSource {
    messages: Shared<VecDeque<String>>,
}

impl QueuedPushSource {
    pub fn new<I: IntoIterator<Item = String>>(messages: I) -> Self {
        Self {
            messages: Arc::new(Mutex::new(messages.into_iter().collect())),
        }
    }

    pub fn feed(&self, message: String) {
        lock(&self.messages).push_back(message);
    }
}

impl PushSource for QueuedPushSource {
    fn next_message(&mut self, timeout: Duration) -> Result<Option<String>, BoxError> {
        if let Some(msg) = lock(&self.messages).pop_front() {
            return Ok(Some(msg));
        }
        std::thread::sleep(timeout.min(Duration::from_millis(5)));
        Ok(None)
    }
}

/// Decoder reading ciphertext as `DEVADDR:FCNT:PORT:PAYLOAD`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ColonDecoder;

impl MacDecoder for ColonDecoder {
    fn decode(&self, cipher_hex: &str, _session_key: &str) -> Option<MacFields> {
        let mut it = cipher_hex.split(':');
        Some(MacFields {
            device_address: it.next()?.to_string(),
            frame_counter: it.next()?.parse().ok()?,
            port: it.next()?.parse().ok()?,
            payload: it.next()?.to_string(),
        })
    }
}
