//! Shared session state: the planned-command FIFO, rolling histories,
//! counters and link status.
//!
//! One `SessionState` exists per process. It is owned by the session loop and
//! handed by `&mut` to each component, so every read-then-write sequence runs
//! on a single thread.

use std::collections::VecDeque;
use std::time::Duration;

use chrono::{DateTime, Utc};
use groundlink_traits::TransmissionHandle;

use crate::error::EncodeError;
use crate::packet::{ApplicationPacket, RawFrame};
use crate::telemetry::TelemetryRecord;
use crate::util::is_hex_bytes;

pub const STATUS_READY: &str = "ready";
pub const STATUS_CONFIRMED: &str = "confirmed";
pub const STATUS_NOT_CONFIRMED: &str = "not confirmed";
pub const STATUS_UNAVAILABLE: &str = "unable to plan uplink";

/// Dispatch state of a planned command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandState {
    /// Eligible for dispatch on the next tick.
    Pending,
    /// Dispatched; waiting for a matching read-back downlink.
    AwaitingConfirmation,
}

/// One radio command waiting in the uplink FIFO.
#[derive(Debug, Clone, PartialEq)]
pub struct PlannedCommand {
    /// Command bytes, hex encoded (without MAC framing).
    pub payload: String,
    /// Read-back the satellite must return on the ack port. `None` means
    /// fire-and-forget.
    pub expected_readback: Option<String>,
    pub label: String,
    pub state: CommandState,
    pub dispatched_at: Option<DateTime<Utc>>,
    pub transmission: Option<TransmissionHandle>,
}

impl PlannedCommand {
    pub fn new(payload: String, expected_readback: Option<String>, label: String) -> Self {
        Self {
            payload,
            expected_readback,
            label,
            state: CommandState::Pending,
            dispatched_at: None,
            transmission: None,
        }
    }

    /// Command length in bytes.
    pub fn byte_len(&self) -> usize {
        self.payload.len() / 2
    }

    pub fn is_verified(&self) -> bool {
        self.expected_readback.is_some()
    }
}

/// Size ceilings of one transmission path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PathLimits {
    pub max_packet_hex_chars: usize,
    pub max_command_bytes: usize,
}

impl PathLimits {
    /// Reject commands that would produce an oversize or malformed frame.
    pub fn check(&self, payload: &str) -> Result<(), EncodeError> {
        if !is_hex_bytes(payload) {
            return Err(EncodeError::InvalidHex(payload.to_string()));
        }
        let bytes = payload.len() / 2;
        let max = self.max_command_bytes.min(self.max_packet_hex_chars / 2);
        if bytes > max {
            return Err(EncodeError::CommandTooLong { bytes, max });
        }
        Ok(())
    }
}

/// Bounded FIFO that evicts its oldest entry when full.
#[derive(Debug, Clone)]
pub struct History<T> {
    items: VecDeque<T>,
    cap: usize,
}

impl<T> History<T> {
    pub fn new(cap: usize) -> Self {
        let cap = cap.max(1);
        Self {
            items: VecDeque::with_capacity(cap),
            cap,
        }
    }

    pub fn push(&mut self, item: T) {
        if self.items.len() == self.cap {
            self.items.pop_front();
        }
        self.items.push_back(item);
    }

    pub fn last(&self) -> Option<&T> {
        self.items.back()
    }

    pub fn last_mut(&mut self) -> Option<&mut T> {
        self.items.back_mut()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Oldest first.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &T> {
        self.items.iter()
    }
}

/// Link quality of the most recent relay reception.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinkQuality {
    pub time: DateTime<Utc>,
    pub snr: f32,
    pub rssi: f32,
    pub frequency_error: f32,
}

#[derive(Debug)]
pub struct SessionState {
    pub(crate) queue: VecDeque<PlannedCommand>,
    pub(crate) raw_frames: History<RawFrame>,
    pub(crate) packets: History<ApplicationPacket>,
    pub(crate) telemetry: History<TelemetryRecord>,
    pub(crate) uplinks_sent: u64,
    pub(crate) downlinks_received: u64,
    pub(crate) rtt: Duration,
    pub(crate) status: String,
    pub(crate) last_seen: Option<LinkQuality>,
}

impl SessionState {
    pub fn new(history_cap: usize) -> Self {
        Self {
            queue: VecDeque::new(),
            raw_frames: History::new(history_cap),
            packets: History::new(history_cap),
            telemetry: History::new(history_cap),
            uplinks_sent: 0,
            downlinks_received: 0,
            rtt: Duration::ZERO,
            status: STATUS_READY.to_string(),
            last_seen: None,
        }
    }

    /// Append a command at the tail of the FIFO after checking it against
    /// the path it will be sent on.
    pub fn enqueue(&mut self, cmd: PlannedCommand, limits: PathLimits) -> Result<(), EncodeError> {
        limits.check(&cmd.payload)?;
        tracing::debug!(label = %cmd.label, payload = %cmd.payload, "uplink planned");
        self.queue.push_back(cmd);
        Ok(())
    }

    /// Enqueue a whole plan, or nothing if any command is rejected.
    pub fn enqueue_all(
        &mut self,
        cmds: Vec<PlannedCommand>,
        limits: PathLimits,
    ) -> Result<usize, EncodeError> {
        for cmd in &cmds {
            limits.check(&cmd.payload)?;
        }
        let n = cmds.len();
        for cmd in cmds {
            self.enqueue(cmd, limits)?;
        }
        Ok(n)
    }

    pub fn queue(&self) -> &VecDeque<PlannedCommand> {
        &self.queue
    }

    pub fn head(&self) -> Option<&PlannedCommand> {
        self.queue.front()
    }

    pub fn raw_frames(&self) -> &History<RawFrame> {
        &self.raw_frames
    }

    pub fn packets(&self) -> &History<ApplicationPacket> {
        &self.packets
    }

    pub fn telemetry(&self) -> &History<TelemetryRecord> {
        &self.telemetry
    }

    pub fn uplinks_sent(&self) -> u64 {
        self.uplinks_sent
    }

    pub fn downlinks_received(&self) -> u64 {
        self.downlinks_received
    }

    /// Smoothed round-trip time of confirmed uplinks; zero until the first
    /// confirmation.
    pub fn rtt(&self) -> Duration {
        self.rtt
    }

    pub fn status(&self) -> &str {
        &self.status
    }

    pub fn last_seen(&self) -> Option<LinkQuality> {
        self.last_seen
    }

    pub(crate) fn set_status(&mut self, status: impl Into<String>) {
        self.status = status.into();
    }

    /// Fold a new round-trip sample into the smoothed estimate.
    pub(crate) fn record_rtt(&mut self, elapsed: Duration) {
        self.rtt = if self.rtt.is_zero() {
            elapsed
        } else {
            (self.rtt + elapsed) / 2
        };
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let queued = self.queue.len();
        SessionSnapshot {
            uplinks_sent: self.uplinks_sent,
            downlinks_received: self.downlinks_received,
            queued,
            awaiting_confirmation: self
                .head()
                .is_some_and(|c| c.state == CommandState::AwaitingConfirmation),
            status: self.status.clone(),
            rtt: self.rtt,
            remaining_estimate: self.rtt * u32::try_from(queued).unwrap_or(u32::MAX),
            last_seen: self.last_seen,
        }
    }
}

/// Read-only view of the session for status rendering.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSnapshot {
    pub uplinks_sent: u64,
    pub downlinks_received: u64,
    pub queued: usize,
    pub awaiting_confirmation: bool,
    pub status: String,
    pub rtt: Duration,
    /// Smoothed round trip times the number of queued commands.
    pub remaining_estimate: Duration,
    pub last_seen: Option<LinkQuality>,
}
