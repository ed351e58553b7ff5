//! `LinkEngine`: one ground-station session over a single shared state.
//!
//! The engine owns the session state, the transports and the pipeline
//! stages. Every mutation goes through `&mut self`, so whoever drives the
//! engine (normally `runner::SessionLoop`) is the single writer.

use std::sync::Arc;

use groundlink_traits::{
    Clock, MacDecoder, ObservationHandle, PushReply, RelayTransport, SystemClock, Triangulation,
};

use crate::config::LinkCfg;
use crate::encoder::{batch_write, encode_read, encode_write};
use crate::error::{BuildError, EncodeError, Result};
use crate::merge::{self, Ingested};
use crate::normalizer::Normalizer;
use crate::operator::OperatorCommand;
use crate::packet::{DeviceAddress, RawFrame};
use crate::position::WeightedCentroid;
use crate::presets::setup_memory_plan;
use crate::scheduler::{Scheduler, TickOutcome, Transports, UplinkPath};
use crate::session::{LinkQuality, PathLimits, PlannedCommand, SessionSnapshot, SessionState};
use crate::transport_error::map_transport_error;

/// Whether the session should keep going after an operator command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Control {
    Continue,
    Quit,
}

pub struct LinkEngine {
    cfg: LinkCfg,
    state: SessionState,
    scheduler: Scheduler,
    normalizer: Normalizer,
    transports: Transports,
    clock: Arc<dyn Clock + Send + Sync>,
    observation: Option<ObservationHandle>,
}

impl core::fmt::Debug for LinkEngine {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("LinkEngine")
            .field("device", &self.normalizer.device().wire_hex())
            .field("preferred", &self.scheduler.preferred())
            .field("transports", &self.transports)
            .field("queued", &self.state.queue().len())
            .field("status", &self.state.status())
            .finish()
    }
}

impl LinkEngine {
    pub fn builder() -> LinkEngineBuilder {
        LinkEngineBuilder::default()
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.state.snapshot()
    }

    pub fn cfg(&self) -> &LinkCfg {
        &self.cfg
    }

    pub fn clock(&self) -> &Arc<dyn Clock + Send + Sync> {
        &self.clock
    }

    pub fn preferred_path(&self) -> UplinkPath {
        self.scheduler.preferred()
    }

    /// Path the next uplink will use, if any transport is available.
    pub fn active_path(&self) -> Option<UplinkPath> {
        self.scheduler.active_path(&self.transports)
    }

    pub fn observation(&self) -> Option<&ObservationHandle> {
        self.observation.as_ref()
    }

    /// Limits that new commands are checked and batched against.
    pub fn planning_limits(&self) -> PathLimits {
        self.scheduler
            .limits(self.active_path().unwrap_or(self.scheduler.preferred()))
    }

    pub fn enqueue(&mut self, cmd: PlannedCommand) -> std::result::Result<(), EncodeError> {
        let limits = self.planning_limits();
        self.state.enqueue(cmd, limits)
    }

    /// Queue a verified copy of `bytes` to onboard memory at `address`.
    pub fn copy_bytes(
        &mut self,
        bytes: &[u8],
        address: u16,
        label: &str,
    ) -> std::result::Result<usize, EncodeError> {
        let limits = self.planning_limits();
        let plan = batch_write(bytes, address, label, limits.max_packet_hex_chars)?;
        self.state.enqueue_all(plan, limits)
    }

    /// Queue the memory setup preset.
    pub fn setup_memory(&mut self) -> std::result::Result<usize, EncodeError> {
        let limits = self.planning_limits();
        let plan = setup_memory_plan(limits.max_packet_hex_chars)?;
        self.state.enqueue_all(plan, limits)
    }

    pub fn apply(&mut self, cmd: OperatorCommand) -> std::result::Result<Control, EncodeError> {
        match cmd {
            OperatorCommand::SetupMemory => {
                let n = self.setup_memory()?;
                tracing::info!(uplinks = n, "memory setup queued");
            }
            OperatorCommand::Write { address, value } => {
                self.enqueue(PlannedCommand::new(
                    encode_write(address, value),
                    None,
                    format!("Custom write {address} = {value}"),
                ))?;
            }
            OperatorCommand::Read { address, size, raw } => {
                // plain reads carry zero table offsets
                let (dr, fr) = raw.unwrap_or((0, 0));
                self.enqueue(PlannedCommand::new(
                    encode_read(address, size, raw.is_some(), fr, dr),
                    None,
                    format!("Custom read from {address}"),
                ))?;
            }
            OperatorCommand::Copy {
                address,
                bytes,
                label,
            } => {
                let n = self.copy_bytes(&bytes, address, &label)?;
                tracing::info!(uplinks = n, label = %label, "copy queued");
            }
            OperatorCommand::TogglePath => {
                self.scheduler.toggle_path();
            }
            OperatorCommand::Quit => return Ok(Control::Quit),
        }
        Ok(Control::Continue)
    }

    /// Plan the relay observation window starting now. Without a relay, or
    /// when planning fails, downlinks come from the push feed only.
    pub fn open_observation(&mut self) -> bool {
        let Some(relay) = self.transports.relay.as_mut() else {
            return false;
        };
        let start = self.clock.utc_now();
        let end = start
            + chrono::Duration::from_std(self.cfg.session.observation_window)
                .unwrap_or(chrono::Duration::hours(1));
        match relay.plan_observation(start, end) {
            Ok(handle) => {
                tracing::info!(observation = %handle.0, %start, %end, "observation planned");
                self.observation = Some(handle);
                true
            }
            Err(e) => {
                tracing::warn!(error = %map_transport_error(e.as_ref()), "observation planning failed");
                false
            }
        }
    }

    /// Dispatch the head command if it is due.
    pub fn tick(&mut self) -> TickOutcome {
        let now = self.clock.utc_now();
        self.scheduler
            .tick(&mut self.state, &mut self.transports, now)
    }

    /// Fetch the observation's packets and ingest those newer than the last
    /// one seen. Returns how many were new.
    pub fn poll_relay(&mut self) -> usize {
        let (Some(relay), Some(obs)) = (self.transports.relay.as_mut(), self.observation.as_ref())
        else {
            return 0;
        };
        let packets = match relay.fetch_packets(obs) {
            Ok(p) => p,
            Err(e) => {
                tracing::warn!(error = %map_transport_error(e.as_ref()), "relay poll failed");
                return 0;
            }
        };
        let mut fresh = 0;
        for packet in packets {
            if self
                .state
                .last_seen
                .is_some_and(|seen| packet.time <= seen.time)
            {
                continue;
            }
            self.state.last_seen = Some(LinkQuality {
                time: packet.time,
                snr: packet.snr,
                rssi: packet.rssi,
                frequency_error: packet.frequency_error,
            });
            fresh += 1;
            let frame = RawFrame::from_relay(packet, self.cfg.session.default_station);
            self.ingest_frame(frame);
        }
        fresh
    }

    /// Run one raw frame through normalize, merge and confirmation.
    pub fn ingest_frame(&mut self, frame: RawFrame) -> Option<Ingested> {
        self.state.raw_frames.push(frame.clone());
        let packet = self.normalizer.normalize(&frame)?;
        let out = merge::ingest(&mut self.state, packet, &self.cfg.merge);
        if let Ingested::Fresh { port, payload, .. } = &out {
            let now = self.clock.utc_now();
            self.scheduler
                .confirm(&mut self.state, &mut self.transports, *port, payload, now);
        }
        Some(out)
    }
}

/// Builder for `LinkEngine`. Everything is validated in `build()`.
#[derive(Default)]
pub struct LinkEngineBuilder {
    cfg: Option<LinkCfg>,
    device: Option<String>,
    session_key: Option<String>,
    relay: Option<Box<dyn RelayTransport + Send>>,
    push_reply: Option<Box<dyn PushReply + Send>>,
    decoder: Option<Box<dyn MacDecoder + Send>>,
    triangulation: Option<Box<dyn Triangulation + Send>>,
    clock: Option<Arc<dyn Clock + Send + Sync>>,
}

impl LinkEngineBuilder {
    pub fn with_cfg(mut self, cfg: LinkCfg) -> Self {
        self.cfg = Some(cfg);
        self
    }

    /// Device address in MAC-frame order, plus its application session key.
    pub fn with_device(mut self, dev_addr: impl Into<String>, session_key: impl Into<String>) -> Self {
        self.device = Some(dev_addr.into());
        self.session_key = Some(session_key.into());
        self
    }

    pub fn with_relay(mut self, relay: impl RelayTransport + Send + 'static) -> Self {
        self.relay = Some(Box::new(relay));
        self
    }

    pub fn with_push_reply(mut self, reply: impl PushReply + Send + 'static) -> Self {
        self.push_reply = Some(Box::new(reply));
        self
    }

    pub fn with_decoder(mut self, decoder: impl MacDecoder + Send + 'static) -> Self {
        self.decoder = Some(Box::new(decoder));
        self
    }

    /// Engine for frames heard by three or more stations. Defaults to
    /// `WeightedCentroid`.
    pub fn with_triangulation(mut self, engine: impl Triangulation + Send + 'static) -> Self {
        self.triangulation = Some(Box::new(engine));
        self
    }

    pub fn with_clock(mut self, clock: impl Clock + Send + Sync + 'static) -> Self {
        self.clock = Some(Arc::new(clock));
        self
    }

    pub fn build(self) -> Result<LinkEngine> {
        let cfg = self.cfg.unwrap_or_default();
        if self.relay.is_none() && self.push_reply.is_none() {
            return Err(eyre::Report::new(BuildError::MissingTransmissionPath));
        }
        let decoder = self
            .decoder
            .ok_or_else(|| eyre::Report::new(BuildError::MissingDecoder))?;
        let device = DeviceAddress::parse(self.device.as_deref().unwrap_or_default())
            .map_err(eyre::Report::new)?;
        if cfg.session.cycle.is_zero() {
            return Err(eyre::Report::new(BuildError::InvalidConfig(
                "cycle must be > 0",
            )));
        }
        if cfg.session.history_cap == 0 {
            return Err(eyre::Report::new(BuildError::InvalidConfig(
                "history_cap must be >= 1",
            )));
        }
        for limits in [cfg.scheduler.relay, cfg.scheduler.push] {
            // fails for limits below one write fragment plus its read-back
            batch_write(&[0], 0, "", limits.max_packet_hex_chars).map_err(eyre::Report::new)?;
            if limits.max_command_bytes == 0 {
                return Err(eyre::Report::new(BuildError::InvalidConfig(
                    "max_command_bytes must be >= 1",
                )));
            }
        }
        if cfg.scheduler.ack_port == cfg.merge.telemetry_port {
            return Err(eyre::Report::new(BuildError::InvalidConfig(
                "ack and telemetry ports must differ",
            )));
        }

        let clock: Arc<dyn Clock + Send + Sync> = match self.clock {
            Some(c) => c,
            None => Arc::new(SystemClock::new()),
        };
        let normalizer = Normalizer::new(
            device,
            self.session_key.unwrap_or_default(),
            decoder,
            Some(
                self.triangulation
                    .unwrap_or_else(|| Box::new(WeightedCentroid)),
            ),
        );
        let scheduler = Scheduler::new(cfg.scheduler, cfg.session.prefer, device);
        tracing::debug!(
            device = %device.wire_hex(),
            relay = self.relay.is_some(),
            push_reply = self.push_reply.is_some(),
            "link engine built"
        );

        Ok(LinkEngine {
            state: SessionState::new(cfg.session.history_cap),
            cfg,
            scheduler,
            normalizer,
            transports: Transports {
                relay: self.relay,
                push_reply: self.push_reply,
            },
            clock,
            observation: None,
        })
    }
}

