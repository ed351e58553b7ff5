//! Subcommand bodies: config loading, engine assembly, and planning output.

use std::io::BufRead;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crossbeam_channel as xch;
use eyre::WrapErr;
use groundlink_config::{Config, Decoder};
use groundlink_core::encoder::{batch_write, mac_frame};
use groundlink_core::error::LinkError;
use groundlink_core::presets::setup_memory_plan;
use groundlink_core::{
    Control, DeviceAddress, LinkCfg, LinkEngine, PathLimits, PlannedCommand, PushListener,
    SessionLoop, SessionSnapshot,
};
use groundlink_relay::{
    CommandMacDecoder, JsonLinesPushReply, JsonLinesPushSource, PlaintextMacDecoder, RelayClient,
    SimulatedRelay,
};
use groundlink_traits::SystemClock;

use crate::cli::PathArg;

/// `[decoder] command` value selecting the built-in plaintext decoder.
pub const PLAINTEXT_DECODER: &str = "plaintext";

/// Poll bound of one push-inbox read.
const PUSH_POLL: Duration = Duration::from_millis(200);
const OPERATOR_BUFFER: usize = 16;

fn config_error(msg: impl Into<String>) -> eyre::Report {
    eyre::Report::new(LinkError::Config(msg.into()))
}

/// Read, parse and validate the TOML config.
pub fn load_config(path: &Path) -> eyre::Result<Config> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| config_error(format!("read {}: {e}", path.display())))?;
    let cfg = groundlink_config::load_toml(&text)
        .map_err(|e| config_error(format!("parse {}: {e}", path.display())))?;
    cfg.validate().map_err(|e| config_error(e.to_string()))?;
    Ok(cfg)
}

/// Path limits for planning, optionally with an overridden packet size.
pub fn planning_limits(cfg: &Config, path: PathArg, max_hex: Option<usize>) -> PathLimits {
    let mut limits = match path {
        PathArg::Relay => PathLimits::from(&cfg.relay),
        PathArg::Push => PathLimits::from(&cfg.push),
    };
    if let Some(max) = max_hex {
        limits.max_packet_hex_chars = max;
    }
    limits
}

fn print_plan(cmds: &[PlannedCommand], frames: Option<(&DeviceAddress, PathLimits)>, json: bool) -> eyre::Result<()> {
    for (seq, cmd) in cmds.iter().enumerate() {
        let frame = match frames {
            Some((device, limits)) => {
                let seq = u16::try_from(seq & 0xFFFF).unwrap_or_default();
                Some(mac_frame(&cmd.payload, device, seq, limits.max_command_bytes)?)
            }
            None => None,
        };
        let expect = cmd.expected_readback.as_deref().unwrap_or("-");
        if json {
            println!(
                "{}",
                serde_json::json!({
                    "label": cmd.label,
                    "payload": cmd.payload,
                    "expected_readback": cmd.expected_readback,
                    "frame": frame,
                })
            );
        } else if let Some(frame) = frame {
            println!("{}\t{}\texpect {expect}\t{frame}", cmd.label, cmd.payload);
        } else {
            println!("{}\t{}\texpect {expect}", cmd.label, cmd.payload);
        }
    }
    Ok(())
}

pub fn plan_setup(cfg: &Config, path: PathArg, max_hex: Option<usize>, json: bool) -> eyre::Result<()> {
    let limits = planning_limits(cfg, path, max_hex);
    let plan = setup_memory_plan(limits.max_packet_hex_chars)?;
    for cmd in &plan {
        limits.check(&cmd.payload)?;
    }
    tracing::info!(batches = plan.len(), ?path, "setup preset planned");
    print_plan(&plan, None, json)
}

pub fn encode_plan(
    cfg: &Config,
    plan: &Path,
    path: PathArg,
    max_hex: Option<usize>,
    frames: bool,
    json: bool,
) -> eyre::Result<()> {
    let limits = planning_limits(cfg, path, max_hex);
    let entries = groundlink_config::load_plan_csv(plan)?;
    let mut cmds = Vec::new();
    for entry in &entries {
        let batches = batch_write(&entry.bytes, entry.address, &entry.label, limits.max_packet_hex_chars)?;
        for cmd in &batches {
            limits.check(&cmd.payload)?;
        }
        cmds.extend(batches);
    }
    tracing::info!(rows = entries.len(), batches = cmds.len(), ?path, "upload plan encoded");
    let device = DeviceAddress::parse(&cfg.device.dev_addr)?;
    print_plan(&cmds, frames.then_some((&device, limits)), json)
}

pub fn check_config(cfg: &Config, json: bool) {
    if json {
        println!(
            "{}",
            serde_json::json!({
                "ok": true,
                "relay": cfg.relay.enabled,
                "push": cfg.push.enabled,
                "prefer": format!("{:?}", cfg.session.prefer).to_ascii_lowercase(),
            })
        );
    } else {
        println!(
            "config ok (relay: {}, push: {}, prefer: {:?})",
            cfg.relay.enabled, cfg.push.enabled, cfg.session.prefer
        );
    }
}

/// Operator lines from stdin. The thread ends at EOF, which the session
/// loop sees as a closed channel.
fn spawn_operator_reader() -> xch::Receiver<String> {
    let (tx, rx) = xch::bounded(OPERATOR_BUFFER);
    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            let Ok(line) = line else { break };
            if tx.send(line).is_err() {
                break;
            }
        }
    });
    rx
}

/// The parser program to run, or `None` for plaintext frames. Simulated
/// runs always read plaintext.
fn external_decoder(decoder: &Decoder, sim: bool) -> Option<&str> {
    decoder
        .command
        .as_deref()
        .map(str::trim)
        .filter(|c| !sim && !c.is_empty() && !c.eq_ignore_ascii_case(PLAINTEXT_DECODER))
}

fn build_engine(cfg: &Config, sim: Option<Duration>) -> eyre::Result<LinkEngine> {
    let mut builder = LinkEngine::builder()
        .with_cfg(LinkCfg::from(cfg))
        .with_device(cfg.device.dev_addr.clone(), cfg.device.app_skey.clone());

    builder = match external_decoder(&cfg.decoder, sim.is_some()) {
        Some(program) => builder.with_decoder(
            CommandMacDecoder::new(program)
                .with_timeout(Duration::from_millis(cfg.decoder.timeout_ms)),
        ),
        None => builder.with_decoder(PlaintextMacDecoder),
    };

    if let Some(beacon) = sim {
        let wire: [u8; 4] = hex::decode(&cfg.device.dev_addr)
            .ok()
            .and_then(|b| b.try_into().ok())
            .ok_or_else(|| config_error("device.dev_addr must be 8 hex chars"))?;
        builder = builder.with_relay(SimulatedRelay::new(wire, SystemClock::new()).with_beacon(beacon));
    } else if cfg.relay.enabled {
        let client = RelayClient::new(
            &cfg.relay.server_uri,
            &cfg.relay.transmitter_id,
            &cfg.relay.receiver_id,
            Duration::from_millis(cfg.relay.request_timeout_ms),
        )
        .wrap_err("create relay client")?;
        builder = builder.with_relay(client);
    }

    if cfg.push.enabled {
        match &cfg.push.outbox {
            Some(outbox) => {
                let reply = JsonLinesPushReply::open(outbox)
                    .wrap_err_with(|| format!("open push outbox {outbox}"))?;
                builder = builder.with_push_reply(reply);
            }
            None => tracing::warn!("push enabled without outbox; push uplinks unavailable"),
        }
    }

    builder.build()
}

fn push_listener(cfg: &Config) -> eyre::Result<Option<PushListener>> {
    if !cfg.push.enabled {
        return Ok(None);
    }
    let Some(inbox) = &cfg.push.inbox else {
        tracing::warn!("push enabled without inbox; no push downlinks");
        return Ok(None);
    };
    let source = JsonLinesPushSource::open(inbox)
        .wrap_err_with(|| format!("open push inbox {inbox}"))?;
    Ok(Some(PushListener::spawn(
        source,
        cfg.push.device_id.clone(),
        PUSH_POLL,
        SystemClock::new(),
    )))
}

fn install_ctrlc_handler(shutdown: Arc<AtomicBool>) -> eyre::Result<()> {
    ctrlc::set_handler(move || {
        shutdown.store(true, Ordering::SeqCst);
    })
    .wrap_err("installing Ctrl-C handler failed")
}

fn print_snapshot(snap: &SessionSnapshot, json: bool) {
    if json {
        println!(
            "{}",
            serde_json::json!({
                "uplinks_sent": snap.uplinks_sent,
                "downlinks_received": snap.downlinks_received,
                "queued": snap.queued,
                "awaiting_confirmation": snap.awaiting_confirmation,
                "status": snap.status,
                "rtt_s": snap.rtt.as_secs_f64(),
                "remaining_s": snap.remaining_estimate.as_secs_f64(),
                "last_snr": snap.last_seen.map(|q| q.snr),
                "last_rssi": snap.last_seen.map(|q| q.rssi),
            })
        );
    } else {
        println!(
            "session ended: uplinks sent {}, downlinks received {}, queued {}, status \"{}\", rtt {:.1} s",
            snap.uplinks_sent,
            snap.downlinks_received,
            snap.queued,
            snap.status,
            snap.rtt.as_secs_f64()
        );
    }
}

/// Run the link session until `q`, Ctrl-C, or `cycles` cycles.
pub fn run_session(
    cfg: &Config,
    sim: bool,
    sim_beacon: Duration,
    cycles: Option<u64>,
    json: bool,
) -> eyre::Result<()> {
    let engine = build_engine(cfg, sim.then_some(sim_beacon))?;
    let mut session = SessionLoop::new(engine).with_operator(spawn_operator_reader());
    if let Some(listener) = push_listener(cfg)? {
        session = session.with_push(listener);
    }
    let shutdown = session.shutdown_handle();
    install_ctrlc_handler(Arc::clone(&shutdown))?;
    tracing::info!(sim, path = ?session.engine().active_path(), "link session starting");

    let snapshot = match cycles {
        Some(n) => {
            session.engine_mut().open_observation();
            for _ in 0..n {
                if shutdown.load(Ordering::Relaxed) || session.run_cycle() == Control::Quit {
                    break;
                }
            }
            session.engine().snapshot()
        }
        None => session.run(),
    };
    print_snapshot(&snapshot, json);
    Ok(())
}
