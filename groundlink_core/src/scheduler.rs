//! Uplink scheduler and confirmation state machine.
//!
//! Only the head of the FIFO is ever dispatched. A verified command stays at
//! the head in `AwaitingConfirmation` until a downlink on the ack port
//! either matches its expected read-back (pop) or does not (back to
//! `Pending`, redispatched verbatim on the next tick). There is no retry
//! limit.

use std::time::Duration;

use chrono::{DateTime, Utc};
use groundlink_traits::{PushReply, RelayTransport, TransmissionStatus, UplinkStart};

use crate::encoder::mac_frame;
use crate::packet::DeviceAddress;
use crate::session::{
    CommandState, PathLimits, SessionState, STATUS_CONFIRMED, STATUS_NOT_CONFIRMED,
    STATUS_UNAVAILABLE,
};
use crate::transport_error::map_transport_error;
use crate::util::{elapsed_between, hex_eq};

/// Transmission path used for uplinks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UplinkPath {
    /// Ground-station relay, MAC framed and scheduled after the RX delay.
    Relay,
    /// Network-server downlink queue, reached through the push feed.
    PushReply,
}

impl UplinkPath {
    pub fn other(self) -> Self {
        match self {
            Self::Relay => Self::PushReply,
            Self::PushReply => Self::Relay,
        }
    }
}

/// The transport collaborators owned by the session loop.
#[derive(Default)]
pub struct Transports {
    pub relay: Option<Box<dyn RelayTransport + Send>>,
    pub push_reply: Option<Box<dyn PushReply + Send>>,
}

impl core::fmt::Debug for Transports {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Transports")
            .field("relay", &self.relay.is_some())
            .field("push_reply", &self.push_reply.is_some())
            .finish()
    }
}

impl Transports {
    fn has(&self, path: UplinkPath) -> bool {
        match path {
            UplinkPath::Relay => self.relay.is_some(),
            UplinkPath::PushReply => self.push_reply.is_some(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SchedulerCfg {
    pub ack_port: u8,
    pub relay: PathLimits,
    pub push: PathLimits,
    pub rx_window_delay: Duration,
    pub reply_port: u8,
}

/// What one scheduler tick did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// Nothing queued.
    Idle,
    /// Head already dispatched; waiting for its read-back.
    Waiting,
    Dispatched {
        path: UplinkPath,
        fire_and_forget: bool,
    },
    /// No usable path for the head command; the FIFO is untouched.
    Unavailable,
}

/// What a confirmation check did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfirmOutcome {
    Skipped,
    Confirmed { rtt: Duration },
    NotConfirmed,
}

#[derive(Debug, Clone)]
pub struct Scheduler {
    cfg: SchedulerCfg,
    preferred: UplinkPath,
    device: DeviceAddress,
}

impl Scheduler {
    pub fn new(cfg: SchedulerCfg, preferred: UplinkPath, device: DeviceAddress) -> Self {
        Self {
            cfg,
            preferred,
            device,
        }
    }

    pub fn preferred(&self) -> UplinkPath {
        self.preferred
    }

    /// Flip the operator's path preference.
    pub fn toggle_path(&mut self) -> UplinkPath {
        self.preferred = self.preferred.other();
        tracing::info!(path = ?self.preferred, "uplink path toggled");
        self.preferred
    }

    /// The path the next dispatch would use: the preference if its transport
    /// exists, else the other one.
    pub fn active_path(&self, transports: &Transports) -> Option<UplinkPath> {
        [self.preferred, self.preferred.other()]
            .into_iter()
            .find(|p| transports.has(*p))
    }

    pub fn limits(&self, path: UplinkPath) -> PathLimits {
        match path {
            UplinkPath::Relay => self.cfg.relay,
            UplinkPath::PushReply => self.cfg.push,
        }
    }

    pub fn ack_port(&self) -> u8 {
        self.cfg.ack_port
    }

    /// Dispatch the head command if it is pending.
    pub fn tick(
        &self,
        state: &mut SessionState,
        transports: &mut Transports,
        now: DateTime<Utc>,
    ) -> TickOutcome {
        let Some(head) = state.queue.front() else {
            return TickOutcome::Idle;
        };
        if head.state == CommandState::AwaitingConfirmation {
            return TickOutcome::Waiting;
        }
        let Some(path) = self.active_path(transports) else {
            return unavailable(state, "no transmission path");
        };
        if let Err(e) = self.limits(path).check(&head.payload) {
            return unavailable(state, &e.to_string());
        }

        let payload = head.payload.clone();
        let dispatched = match path {
            UplinkPath::Relay => self.send_relay(state, transports, &payload),
            UplinkPath::PushReply => self.send_push(transports, &payload).map(|()| None),
        };
        let handle = match dispatched {
            Ok(handle) => handle,
            Err(reason) => return unavailable(state, &reason),
        };

        state.uplinks_sent += 1;
        let counter = state.uplinks_sent;
        let Some(head) = state.queue.front_mut() else {
            return TickOutcome::Idle;
        };
        let label = head.label.clone();
        let fire_and_forget = !head.is_verified();
        if fire_and_forget {
            state.queue.pop_front();
        } else {
            head.state = CommandState::AwaitingConfirmation;
            head.dispatched_at = Some(now);
            head.transmission = handle;
        }
        tracing::info!(label = %label, path = ?path, counter, "uplink dispatched");
        state.set_status(label);
        TickOutcome::Dispatched {
            path,
            fire_and_forget,
        }
    }

    fn send_relay(
        &self,
        state: &SessionState,
        transports: &mut Transports,
        payload: &str,
    ) -> Result<Option<groundlink_traits::TransmissionHandle>, String> {
        let relay = transports
            .relay
            .as_mut()
            .ok_or_else(|| "relay path missing".to_string())?;
        let sequence = u16::try_from(state.uplinks_sent & 0xFFFF).unwrap_or_default();
        let frame = mac_frame(
            payload,
            &self.device,
            sequence,
            self.cfg.relay.max_command_bytes,
        )
        .map_err(|e| e.to_string())?;
        relay
            .plan_uplink(&frame, UplinkStart::Delay(self.cfg.rx_window_delay))
            .map(Some)
            .map_err(|e| map_transport_error(e.as_ref()).to_string())
    }

    fn send_push(&self, transports: &mut Transports, payload: &str) -> Result<(), String> {
        let reply = transports
            .push_reply
            .as_mut()
            .ok_or_else(|| "push reply path missing".to_string())?;
        let bytes = hex::decode(payload).map_err(|e| e.to_string())?;
        reply
            .replace_downlinks(&bytes, self.cfg.reply_port)
            .map_err(|e| map_transport_error(e.as_ref()).to_string())
    }

    /// Check a fresh downlink against the head command.
    ///
    /// Packets on any port other than the ack port count as a non-matching
    /// read-back.
    pub fn confirm(
        &self,
        state: &mut SessionState,
        transports: &mut Transports,
        port: u8,
        payload: &str,
        now: DateTime<Utc>,
    ) -> ConfirmOutcome {
        let Some(head) = state.queue.front() else {
            return ConfirmOutcome::Skipped;
        };
        if head.state != CommandState::AwaitingConfirmation {
            return ConfirmOutcome::Skipped;
        }
        if let (Some(handle), Some(relay)) = (&head.transmission, transports.relay.as_mut()) {
            match relay.transmission_status(handle) {
                Ok(TransmissionStatus::Done) => {}
                Ok(TransmissionStatus::Pending) => return ConfirmOutcome::Skipped,
                Err(e) => {
                    tracing::warn!(error = %map_transport_error(e.as_ref()), "transmission status unavailable");
                    return ConfirmOutcome::Skipped;
                }
            }
        }

        let matched = port == self.cfg.ack_port
            && head
                .expected_readback
                .as_deref()
                .is_some_and(|expected| hex_eq(expected, payload));
        if matched {
            let elapsed = head
                .dispatched_at
                .map_or(Duration::ZERO, |t| elapsed_between(t, now));
            state.record_rtt(elapsed);
            state.queue.pop_front();
            state.set_status(STATUS_CONFIRMED);
            tracing::info!(rtt_s = state.rtt.as_secs_f64(), "uplink confirmed");
            ConfirmOutcome::Confirmed { rtt: state.rtt }
        } else {
            if let Some(head) = state.queue.front_mut() {
                head.state = CommandState::Pending;
                head.transmission = None;
            }
            state.set_status(STATUS_NOT_CONFIRMED);
            tracing::info!(port, payload = %payload, "uplink not confirmed");
            ConfirmOutcome::NotConfirmed
        }
    }
}

fn unavailable(state: &mut SessionState, reason: &str) -> TickOutcome {
    tracing::warn!(reason = %reason, "unable to plan uplink");
    state.set_status(STATUS_UNAVAILABLE);
    TickOutcome::Unavailable
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mocks::{RecordingPushReply, ScriptedRelay};
    use crate::session::{PlannedCommand, STATUS_READY};

    fn cfg() -> SchedulerCfg {
        SchedulerCfg {
            ack_port: 2,
            relay: PathLimits {
                max_packet_hex_chars: 30,
                max_command_bytes: 15,
            },
            push: PathLimits {
                max_packet_hex_chars: 102,
                max_command_bytes: 51,
            },
            rx_window_delay: Duration::from_secs(66),
            reply_port: 1,
        }
    }

    fn scheduler(preferred: UplinkPath) -> Scheduler {
        Scheduler::new(cfg(), preferred, DeviceAddress::parse("E6BD0B26").unwrap())
    }

    fn verified(readback: &str) -> PlannedCommand {
        PlannedCommand::new(
            "9100300390003001000F".into(),
            Some(readback.into()),
            "DELAY".into(),
        )
    }

    #[test]
    fn empty_queue_is_idle() {
        let mut s = SessionState::new(5);
        let mut t = Transports::default();
        assert_eq!(scheduler(UplinkPath::Relay).tick(&mut s, &mut t, Utc::now()), TickOutcome::Idle);
        assert_eq!(s.status(), STATUS_READY);
    }

    #[test]
    fn no_path_leaves_fifo_untouched() {
        let mut s = SessionState::new(5);
        s.queue.push_back(verified("03"));
        let mut t = Transports::default();
        let out = scheduler(UplinkPath::Relay).tick(&mut s, &mut t, Utc::now());
        assert_eq!(out, TickOutcome::Unavailable);
        assert_eq!(s.status(), STATUS_UNAVAILABLE);
        assert_eq!(s.queue().len(), 1);
        assert_eq!(s.head().unwrap().state, CommandState::Pending);
        assert_eq!(s.uplinks_sent(), 0);
    }

    #[test]
    fn relay_dispatch_frames_with_sequence_and_delay() {
        let relay = ScriptedRelay::new();
        let log = relay.uplinks();
        let mut t = Transports {
            relay: Some(Box::new(relay)),
            push_reply: None,
        };
        let mut s = SessionState::new(5);
        s.queue.push_back(verified("03"));
        let out = scheduler(UplinkPath::Relay).tick(&mut s, &mut t, Utc::now());
        assert_eq!(
            out,
            TickOutcome::Dispatched {
                path: UplinkPath::Relay,
                fire_and_forget: false
            }
        );
        let sent = log.lock().unwrap();
        assert_eq!(
            sent.as_slice(),
            &[(
                "60E6BD0B260A00009100300390003001000F00".to_string(),
                UplinkStart::Delay(Duration::from_secs(66))
            )]
        );
        assert_eq!(s.uplinks_sent(), 1);
        assert_eq!(s.status(), "DELAY");
        assert_eq!(s.head().unwrap().state, CommandState::AwaitingConfirmation);
        assert!(s.head().unwrap().transmission.is_some());
    }

    #[test]
    fn falls_back_to_push_when_relay_absent() {
        let reply = RecordingPushReply::new();
        let log = reply.sent();
        let mut t = Transports {
            relay: None,
            push_reply: Some(Box::new(reply)),
        };
        let mut s = SessionState::new(5);
        s.queue
            .push_back(PlannedCommand::new("91003003".into(), None, "W".into()));
        let out = scheduler(UplinkPath::Relay).tick(&mut s, &mut t, Utc::now());
        assert_eq!(
            out,
            TickOutcome::Dispatched {
                path: UplinkPath::PushReply,
                fire_and_forget: true
            }
        );
        assert!(s.queue().is_empty());
        assert_eq!(log.lock().unwrap().as_slice(), &[(vec![0x91, 0x00, 0x30, 0x03], 1)]);
    }

    #[test]
    fn oversize_for_active_path_is_unavailable() {
        let mut t = Transports {
            relay: Some(Box::new(ScriptedRelay::new())),
            push_reply: None,
        };
        let mut s = SessionState::new(5);
        s.queue
            .push_back(PlannedCommand::new("00".repeat(20), None, "big".into()));
        let out = scheduler(UplinkPath::Relay).tick(&mut s, &mut t, Utc::now());
        assert_eq!(out, TickOutcome::Unavailable);
        assert_eq!(s.queue().len(), 1);
    }

    #[test]
    fn relay_failure_does_not_count_uplink() {
        let relay = ScriptedRelay::new();
        relay.fail_uplinks(true);
        let mut t = Transports {
            relay: Some(Box::new(relay)),
            push_reply: None,
        };
        let mut s = SessionState::new(5);
        s.queue.push_back(verified("03"));
        let out = scheduler(UplinkPath::Relay).tick(&mut s, &mut t, Utc::now());
        assert_eq!(out, TickOutcome::Unavailable);
        assert_eq!(s.uplinks_sent(), 0);
        assert_eq!(s.head().unwrap().state, CommandState::Pending);
    }

    #[test]
    fn pending_transmission_skips_confirmation() {
        let relay = ScriptedRelay::new();
        relay.set_status(TransmissionStatus::Pending);
        let mut t = Transports {
            relay: Some(Box::new(relay)),
            push_reply: None,
        };
        let mut s = SessionState::new(5);
        s.queue.push_back(verified("03"));
        let sch = scheduler(UplinkPath::Relay);
        sch.tick(&mut s, &mut t, Utc::now());
        assert_eq!(sch.confirm(&mut s, &mut t, 2, "03", Utc::now()), ConfirmOutcome::Skipped);
        assert_eq!(s.queue().len(), 1);
    }

    #[test]
    fn toggle_flips_preference() {
        let mut sch = scheduler(UplinkPath::Relay);
        assert_eq!(sch.toggle_path(), UplinkPath::PushReply);
        assert_eq!(sch.toggle_path(), UplinkPath::Relay);
    }
}
