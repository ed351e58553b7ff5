//! Runtime configuration of the link engine.
//!
//! These are separate from the TOML-deserialized config in
//! `groundlink_config`; see `conversions` for the mapping.

use std::time::Duration;

use crate::merge::MergeCfg;
use crate::scheduler::{SchedulerCfg, UplinkPath};
use crate::session::PathLimits;

/// Session loop pacing and relay observation settings.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionCfg {
    /// Period of the main cycle (relay poll + scheduler tick).
    pub cycle: Duration,
    pub history_cap: usize,
    /// Uplink path selected at startup.
    pub prefer: UplinkPath,
    /// Length of the relay observation planned at session start.
    pub observation_window: Duration,
    /// Station position assumed for relay packets that carry none.
    pub default_station: Option<(f64, f64)>,
}

impl Default for SessionCfg {
    fn default() -> Self {
        Self {
            cycle: Duration::from_secs(3),
            history_cap: 5,
            prefer: UplinkPath::Relay,
            observation_window: Duration::from_secs(60 * 60),
            default_station: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LinkCfg {
    pub scheduler: SchedulerCfg,
    pub merge: MergeCfg,
    pub session: SessionCfg,
}

impl Default for LinkCfg {
    fn default() -> Self {
        Self {
            scheduler: SchedulerCfg {
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
            },
            merge: MergeCfg {
                telemetry_port: 1,
                baseline_pressure_hpa: 1013.25,
            },
            session: SessionCfg::default(),
        }
    }
}
