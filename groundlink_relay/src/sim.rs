//! Offline relay with a simulated satellite behind it.
//!
//! Uplinked memory commands are executed against a small onboard memory
//! image; reads answer on the ack port, and a telemetry beacon is emitted
//! whenever the artefact is fetched after the beacon interval.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use groundlink_traits::{
    BoxError, Clock, ObservationHandle, RelayPacket, RelayTransport, TransmissionHandle,
    TransmissionStatus, UplinkStart,
};

use crate::decoder::plaintext_frame;
use crate::error::RelayError;

pub const SIM_MEMORY_SIZE: usize = 256;
pub const SIM_TELEMETRY_PORT: u8 = 1;
pub const SIM_ACK_PORT: u8 = 2;

const OP_WRITE: u8 = 0x91;
const OP_READ: u8 = 0x90;
const READ_SIZE_MASK: u8 = 0x3F;

#[derive(Debug)]
struct Satellite {
    dev_addr: [u8; 4],
    memory: Vec<u8>,
    fcnt: u16,
    packets: Vec<RelayPacket>,
    last_time: Option<DateTime<Utc>>,
    last_beacon: Option<DateTime<Utc>>,
    uplinks: u64,
}

impl Satellite {
    fn stamp(&mut self, now: DateTime<Utc>) -> DateTime<Utc> {
        let t = match self.last_time {
            Some(last) if now <= last => last + chrono::Duration::milliseconds(1),
            _ => now,
        };
        self.last_time = Some(t);
        t
    }

    fn downlink(&mut self, now: DateTime<Utc>, port: u8, payload: &[u8]) {
        let time = self.stamp(now);
        let data = plaintext_frame(&self.dev_addr, self.fcnt, port, payload);
        self.fcnt = self.fcnt.wrapping_add(1);
        self.packets.push(RelayPacket {
            time,
            snr: 7.25,
            rssi: -109.0,
            frequency_error: 1250.0,
            data,
            station: None,
        });
    }

    fn beacon(&mut self, now: DateTime<Utc>) {
        let reset = self.memory[1];
        let hptr = self.memory[2];
        // 1.5 V solar, 21 C, 1008 hPa
        self.downlink(now, SIM_TELEMETRY_PORT, &[reset, 0x95, 0x2A, 0xFC, hptr]);
        self.last_beacon = Some(now);
    }

    /// Execute a MAC uplink frame: `60 | devaddr | len | seq | commands | 00`.
    fn execute(&mut self, frame_hex: &str, now: DateTime<Utc>) -> Result<(), RelayError> {
        let bytes = hex::decode(frame_hex).map_err(|e| RelayError::Rejected(e.to_string()))?;
        if bytes.first() != Some(&0x60) || bytes.get(1..5) != Some(&self.dev_addr[..]) {
            return Err(RelayError::Rejected("frame not for this device".into()));
        }
        let len = usize::from(*bytes.get(5).ok_or_else(|| RelayError::Rejected("short frame".into()))?);
        let cmds = bytes
            .get(8..8 + len)
            .ok_or_else(|| RelayError::Rejected("command length mismatch".into()))?
            .to_vec();
        self.uplinks += 1;
        self.memory[4] = self.memory[4].wrapping_add(1);

        let mut rest = cmds.as_slice();
        while let Some((&op, tail)) = rest.split_first() {
            match (op, tail) {
                (OP_WRITE, [hi, lo, value, more @ ..]) => {
                    let addr = usize::from(u16::from_be_bytes([*hi, *lo]));
                    if let Some(cell) = self.memory.get_mut(addr) {
                        *cell = *value;
                    }
                    rest = more;
                }
                (OP_READ, [hi, lo, size, _fr, _dr, more @ ..]) => {
                    let addr = usize::from(u16::from_be_bytes([*hi, *lo]));
                    let n = usize::from(size & READ_SIZE_MASK);
                    let data: Vec<u8> = (addr..addr + n)
                        .map(|a| self.memory.get(a).copied().unwrap_or(0))
                        .collect();
                    self.downlink(now, SIM_ACK_PORT, &data);
                    rest = more;
                }
                _ => {
                    tracing::debug!(op, "simulated satellite ignored trailing bytes");
                    break;
                }
            }
        }
        Ok(())
    }
}

/// In-process relay + satellite. Clones share the same satellite.
#[derive(Clone)]
pub struct SimulatedRelay {
    sat: Arc<Mutex<Satellite>>,
    clock: Arc<dyn Clock + Send + Sync>,
    beacon: Duration,
}

impl core::fmt::Debug for SimulatedRelay {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SimulatedRelay")
            .field("beacon", &self.beacon)
            .finish_non_exhaustive()
    }
}

impl SimulatedRelay {
    /// `dev_addr_wire` is the device address in frame byte order.
    pub fn new(dev_addr_wire: [u8; 4], clock: impl Clock + Send + Sync + 'static) -> Self {
        let mut memory = vec![0u8; SIM_MEMORY_SIZE];
        memory[0] = 0xA5; // validity marker
        memory[1] = 1; // reset counter
        memory[48] = 0x03; // downlink delay (~5 min)
        memory[49] = 0x50;
        memory[50] = 0x50;
        Self {
            sat: Arc::new(Mutex::new(Satellite {
                dev_addr: dev_addr_wire,
                memory,
                fcnt: 0,
                packets: Vec::new(),
                last_time: None,
                last_beacon: None,
                uplinks: 0,
            })),
            clock: Arc::new(clock),
            beacon: Duration::from_secs(30),
        }
    }

    pub fn with_beacon(mut self, every: Duration) -> Self {
        self.beacon = every;
        self
    }

    fn sat(&self) -> MutexGuard<'_, Satellite> {
        self.sat.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Copy of the onboard memory image.
    pub fn memory(&self) -> Vec<u8> {
        self.sat().memory.clone()
    }

    /// Uplink frames the satellite accepted.
    pub fn uplinks_heard(&self) -> u64 {
        self.sat().uplinks
    }
}

impl RelayTransport for SimulatedRelay {
    fn plan_observation(
        &mut self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<ObservationHandle, BoxError> {
        tracing::debug!(%start, %end, "simulated observation");
        Ok(ObservationHandle("sim-observation".into()))
    }

    fn plan_uplink(
        &mut self,
        frame_hex: &str,
        start: UplinkStart,
    ) -> Result<TransmissionHandle, BoxError> {
        let now = self.clock.utc_now();
        let mut sat = self.sat();
        sat.execute(frame_hex, now)?;
        tracing::debug!(?start, frame = %frame_hex, "simulated uplink");
        Ok(TransmissionHandle(format!("sim-uplink-{}", sat.uplinks)))
    }

    fn transmission_status(
        &mut self,
        _handle: &TransmissionHandle,
    ) -> Result<TransmissionStatus, BoxError> {
        Ok(TransmissionStatus::Done)
    }

    fn fetch_packets(
        &mut self,
        _observation: &ObservationHandle,
    ) -> Result<Vec<RelayPacket>, BoxError> {
        let now = self.clock.utc_now();
        let beacon = chrono::Duration::from_std(self.beacon).unwrap_or(chrono::Duration::MAX);
        let mut sat = self.sat();
        if sat.last_beacon.is_none_or(|t| now - t >= beacon) {
            sat.beacon(now);
        }
        Ok(sat.packets.clone())
    }
}
