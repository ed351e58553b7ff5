#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
//! Concrete collaborators of the link engine: relay HTTP client, push-feed
//! bridge, MAC decoders, and an offline simulator.

pub mod decoder;
pub mod error;
pub mod http;
pub mod push;
pub mod sim;

pub use decoder::{CommandMacDecoder, PlaintextMacDecoder};
pub use error::RelayError;
pub use http::RelayClient;
pub use push::{JsonLinesPushReply, JsonLinesPushSource};
pub use sim::SimulatedRelay;
