#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
//! Link session engine for a picosatellite ground station (transport-agnostic).
//!
//! All network interactions go through the `groundlink_traits` seams
//! (`RelayTransport`, `PushReply`, `PushSource`, `MacDecoder`,
//! `Triangulation`).
//!
//! ## Architecture
//!
//! - **Encoder**: memory write/read fragments, verified write batching, MAC framing (`encoder`)
//! - **Scheduler**: uplink FIFO and read-back confirmation (`scheduler`)
//! - **Ingestion**: push feed (`feed`), normalization (`normalizer`), dedup/merge (`merge`)
//! - **Decoding**: telemetry layouts (`telemetry`), station-based position (`position`)
//! - **Session**: shared state (`session`), engine facade (`engine`), loop (`runner`)
//!
//! Downlinks flow relay/push -> `Normalizer` -> `merge::ingest` ->
//! {telemetry history, `Scheduler::confirm`}.

pub mod config;
pub mod conversions;
pub mod encoder;
pub mod engine;
pub mod error;
pub mod feed;
pub mod merge;
pub mod mocks;
pub mod normalizer;
pub mod operator;
pub mod packet;
pub mod position;
pub mod presets;
pub mod runner;
pub mod scheduler;
pub mod session;
pub mod telemetry;
pub mod transport_error;
pub mod util;

pub use config::{LinkCfg, SessionCfg};
pub use engine::{Control, LinkEngine, LinkEngineBuilder};
pub use error::{BuildError, EncodeError, LinkError, Report, Result, TelemetryError};
pub use feed::{PushListener, parse_push_message};
pub use merge::{Ingested, MergeCfg};
pub use operator::OperatorCommand;
pub use packet::{ApplicationPacket, DeviceAddress, RawFrame, SourceKind};
pub use runner::SessionLoop;
pub use scheduler::{ConfirmOutcome, SchedulerCfg, TickOutcome, UplinkPath};
pub use session::{CommandState, PathLimits, PlannedCommand, SessionSnapshot, SessionState};
pub use telemetry::TelemetryRecord;
