//! `From` implementations bridging `groundlink_config` types to runtime types.

use std::time::Duration;

use groundlink_config::{Config, PathPreference};

use crate::config::{LinkCfg, SessionCfg};
use crate::merge::MergeCfg;
use crate::scheduler::{SchedulerCfg, UplinkPath};
use crate::session::PathLimits;

impl From<PathPreference> for UplinkPath {
    fn from(p: PathPreference) -> Self {
        match p {
            PathPreference::Relay => Self::Relay,
            PathPreference::Push => Self::PushReply,
        }
    }
}

impl From<&groundlink_config::Relay> for PathLimits {
    fn from(c: &groundlink_config::Relay) -> Self {
        Self {
            max_packet_hex_chars: c.max_packet_hex_chars,
            max_command_bytes: c.max_command_bytes,
        }
    }
}

impl From<&groundlink_config::Push> for PathLimits {
    fn from(c: &groundlink_config::Push) -> Self {
        Self {
            max_packet_hex_chars: c.max_packet_hex_chars,
            max_command_bytes: c.max_command_bytes,
        }
    }
}

impl From<&Config> for SchedulerCfg {
    fn from(c: &Config) -> Self {
        Self {
            ack_port: c.ports.ack,
            relay: PathLimits::from(&c.relay),
            push: PathLimits::from(&c.push),
            rx_window_delay: Duration::from_secs(c.relay.rx_window_delay_s),
            reply_port: c.push.reply_port,
        }
    }
}

impl From<&Config> for MergeCfg {
    fn from(c: &Config) -> Self {
        Self {
            telemetry_port: c.ports.telemetry,
            baseline_pressure_hpa: c.session.baseline_pressure_hpa,
        }
    }
}

impl From<&Config> for SessionCfg {
    fn from(c: &Config) -> Self {
        Self {
            cycle: Duration::from_millis(c.session.cycle_ms),
            history_cap: c.session.history_cap,
            prefer: c.session.prefer.into(),
            observation_window: Duration::from_secs(c.relay.observation_minutes * 60),
            default_station: c.relay.station_position,
        }
    }
}

impl From<&Config> for LinkCfg {
    fn from(c: &Config) -> Self {
        Self {
            scheduler: c.into(),
            merge: c.into(),
            session: c.into(),
        }
    }
}
