use thiserror::Error;

#[derive(Debug, Error, Clone)]
pub enum LinkError {
    #[error("configuration error: {0}")]
    Config(String),
    #[error("encode error: {0}")]
    Encode(#[from] EncodeError),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("transport rejected request: {0}")]
    Rejected(String),
    #[error("timeout waiting for transport")]
    Timeout,
    #[error("invalid state: {0}")]
    State(String),
}

/// Misuse of the command encoder. A command that fails these checks must
/// never reach the radio.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EncodeError {
    #[error("command is {bytes} bytes, path allows at most {max}")]
    CommandTooLong { bytes: usize, max: usize },
    #[error("packet limit of {max} hex chars is below the minimum of {min}")]
    PacketLimitTooSmall { max: usize, min: usize },
    #[error("write range starting at {start} with {len} bytes exceeds 16-bit memory space")]
    AddressOverflow { start: u16, len: usize },
    #[error("not a hex byte string: {0:?}")]
    InvalidHex(String),
    #[error("nothing to encode")]
    Empty,
}

#[derive(Debug, Error, Clone)]
pub enum BuildError {
    #[error("no transmission path configured")]
    MissingTransmissionPath,
    #[error("missing MAC decoder")]
    MissingDecoder,
    #[error("invalid device address: {0:?}")]
    InvalidDeviceAddress(String),
    #[error("invalid config: {0}")]
    InvalidConfig(&'static str),
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TelemetryError {
    #[error("telemetry payload has {0} hex chars, need at least 10")]
    TooShort(usize),
    #[error("telemetry payload is not hex: {0:?}")]
    InvalidHex(String),
}

pub type Result<T> = eyre::Result<T>;
pub use eyre::Report;
