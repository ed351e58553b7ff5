//! Session loop: the single writer of session state.
//!
//! Each cycle dispatches the head uplink, polls the relay, then waits out
//! the rest of the cycle on the push-feed and operator channels, handling
//! whatever arrives in between.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crossbeam_channel as xch;

use crate::engine::{Control, LinkEngine};
use crate::feed::PushListener;
use crate::operator::OperatorCommand;
use crate::packet::RawFrame;
use crate::session::SessionSnapshot;

pub struct SessionLoop {
    engine: LinkEngine,
    listener: Option<PushListener>,
    push_rx: xch::Receiver<RawFrame>,
    operator_rx: xch::Receiver<String>,
    shutdown: Arc<AtomicBool>,
}

impl core::fmt::Debug for SessionLoop {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SessionLoop")
            .field("engine", &self.engine)
            .field("push", &self.listener.is_some())
            .finish()
    }
}

impl SessionLoop {
    pub fn new(engine: LinkEngine) -> Self {
        Self {
            engine,
            listener: None,
            push_rx: xch::never(),
            operator_rx: xch::never(),
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn with_push(mut self, listener: PushListener) -> Self {
        self.push_rx = listener.receiver().clone();
        self.listener = Some(listener);
        self
    }

    /// Operator lines, one command each.
    pub fn with_operator(mut self, rx: xch::Receiver<String>) -> Self {
        self.operator_rx = rx;
        self
    }

    /// Setting the flag stops the loop at the next wake-up.
    pub fn shutdown_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.shutdown)
    }

    pub fn engine(&self) -> &LinkEngine {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut LinkEngine {
        &mut self.engine
    }

    /// Open the observation window and cycle until quit or shutdown.
    pub fn run(mut self) -> SessionSnapshot {
        self.engine.open_observation();
        let cycle_ms = u64::try_from(self.engine.cfg().session.cycle.as_millis()).unwrap_or(u64::MAX);
        tracing::info!(cycle_ms, "session started");
        while !self.shutdown.load(Ordering::Relaxed) {
            if self.run_cycle() == Control::Quit {
                break;
            }
        }
        let snap = self.engine.snapshot();
        tracing::info!(
            uplinks = snap.uplinks_sent,
            downlinks = snap.downlinks_received,
            queued = snap.queued,
            "session ended"
        );
        snap
    }

    /// One cycle: tick, poll, then serve channels until the cycle elapses.
    pub fn run_cycle(&mut self) -> Control {
        let clock = Arc::clone(self.engine.clock());
        let deadline = clock.now() + self.engine.cfg().session.cycle;
        self.engine.tick();
        self.engine.poll_relay();

        loop {
            if self.shutdown.load(Ordering::Relaxed) {
                return Control::Quit;
            }
            let remaining = deadline.saturating_duration_since(clock.now());
            if remaining.is_zero() {
                return Control::Continue;
            }
            match self.wait(remaining) {
                Wake::Frame(frame) => {
                    self.engine.ingest_frame(frame);
                }
                Wake::Line(line) => {
                    if self.handle_line(&line) == Control::Quit {
                        return Control::Quit;
                    }
                }
                Wake::PushClosed => {
                    tracing::debug!("push feed closed");
                    self.push_rx = xch::never();
                }
                Wake::OperatorClosed => {
                    tracing::debug!("operator input closed");
                    self.operator_rx = xch::never();
                }
                Wake::Timeout => return Control::Continue,
            }
        }
    }

    fn wait(&self, timeout: Duration) -> Wake {
        xch::select! {
            recv(self.push_rx) -> msg => msg.map_or(Wake::PushClosed, Wake::Frame),
            recv(self.operator_rx) -> msg => msg.map_or(Wake::OperatorClosed, Wake::Line),
            default(timeout) => Wake::Timeout,
        }
    }

    fn handle_line(&mut self, line: &str) -> Control {
        if line.trim().is_empty() {
            return Control::Continue;
        }
        let cmd = match line.parse::<OperatorCommand>() {
            Ok(cmd) => cmd,
            Err(e) => {
                tracing::warn!(error = %e, line = %line, "operator command rejected");
                return Control::Continue;
            }
        };
        match self.engine.apply(cmd) {
            Ok(control) => control,
            Err(e) => {
                tracing::error!(error = %e, line = %line, "command not queued");
                Control::Continue
            }
        }
    }
}

enum Wake {
    Frame(RawFrame),
    Line(String),
    PushClosed,
    OperatorClosed,
    Timeout,
}
