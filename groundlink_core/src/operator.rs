//! Operator console commands.
//!
//! One command per line, first token case-insensitive:
//!
//! | line | effect |
//! |---|---|
//! | `e` | queue the memory setup preset |
//! | `w <addr> <hexbyte>` | single write, no read-back |
//! | `r <addr> <size> [raw <dr> <fr>]` | read request; raw indexes are scaled by 3 |
//! | `c <addr> <hexbytes> [label]` | verified copy of a byte run |
//! | `t` | toggle the uplink path |
//! | `q` | quit |

use std::str::FromStr;

use thiserror::Error;

/// Table entries per data-rate / frequency index in raw reads.
const RAW_INDEX_STRIDE: u8 = 3;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperatorCommand {
    SetupMemory,
    Write {
        address: u16,
        value: u8,
    },
    Read {
        address: u16,
        size: u8,
        /// Data-rate and frequency table offsets for a raw read.
        raw: Option<(u8, u8)>,
    },
    Copy {
        address: u16,
        bytes: Vec<u8>,
        label: String,
    },
    TogglePath,
    Quit,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseCommandError {
    #[error("empty command")]
    Empty,
    #[error("unknown command {0:?}")]
    Unknown(String),
    #[error("missing argument: {0}")]
    Missing(&'static str),
    #[error("invalid {what}: {value:?}")]
    Invalid { what: &'static str, value: String },
}

fn arg<'a>(
    it: &mut impl Iterator<Item = &'a str>,
    what: &'static str,
) -> Result<&'a str, ParseCommandError> {
    it.next().ok_or(ParseCommandError::Missing(what))
}

fn invalid(what: &'static str, value: &str) -> ParseCommandError {
    ParseCommandError::Invalid {
        what,
        value: value.to_string(),
    }
}

fn address<'a>(it: &mut impl Iterator<Item = &'a str>) -> Result<u16, ParseCommandError> {
    let s = arg(it, "address")?;
    s.parse().map_err(|_| invalid("address", s))
}

fn raw_index<'a>(
    it: &mut impl Iterator<Item = &'a str>,
    what: &'static str,
) -> Result<u8, ParseCommandError> {
    let s = arg(it, what)?;
    s.parse::<u8>()
        .ok()
        .and_then(|i| i.checked_mul(RAW_INDEX_STRIDE))
        .ok_or_else(|| invalid(what, s))
}

impl FromStr for OperatorCommand {
    type Err = ParseCommandError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let mut it = line.split_whitespace();
        let head = it.next().ok_or(ParseCommandError::Empty)?;
        match head.to_ascii_lowercase().as_str() {
            "e" => Ok(Self::SetupMemory),
            "t" => Ok(Self::TogglePath),
            "q" => Ok(Self::Quit),
            "w" => {
                let address = address(&mut it)?;
                let s = arg(&mut it, "value")?;
                let value = u8::from_str_radix(s, 16).map_err(|_| invalid("value", s))?;
                Ok(Self::Write { address, value })
            }
            "r" => {
                let address = address(&mut it)?;
                let s = arg(&mut it, "size")?;
                let size = s.parse().map_err(|_| invalid("size", s))?;
                let raw = match it.next() {
                    None => None,
                    Some(flag) if flag.eq_ignore_ascii_case("raw") => Some((
                        raw_index(&mut it, "data-rate index")?,
                        raw_index(&mut it, "frequency index")?,
                    )),
                    Some(other) => return Err(invalid("read mode", other)),
                };
                Ok(Self::Read { address, size, raw })
            }
            "c" => {
                let address = address(&mut it)?;
                let s = arg(&mut it, "data")?;
                let bytes = hex::decode(s).map_err(|_| invalid("data", s))?;
                if bytes.is_empty() {
                    return Err(invalid("data", s));
                }
                let label = it.collect::<Vec<_>>().join(" ");
                let label = if label.is_empty() {
                    "COPY".to_string()
                } else {
                    label
                };
                Ok(Self::Copy {
                    address,
                    bytes,
                    label,
                })
            }
            other => Err(ParseCommandError::Unknown(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("e", OperatorCommand::SetupMemory)]
    #[case("  T ", OperatorCommand::TogglePath)]
    #[case("Q", OperatorCommand::Quit)]
    #[case("w 48 1f", OperatorCommand::Write { address: 48, value: 0x1F })]
    #[case("r 128 10", OperatorCommand::Read { address: 128, size: 10, raw: None })]
    #[case("r 128 10 raw 2 1", OperatorCommand::Read { address: 128, size: 10, raw: Some((6, 3)) })]
    #[case("c 51 0e5050 HELLO DATA", OperatorCommand::Copy { address: 51, bytes: vec![0x0E, 0x50, 0x50], label: "HELLO DATA".into() })]
    #[case("c 51 aa", OperatorCommand::Copy { address: 51, bytes: vec![0xAA], label: "COPY".into() })]
    fn parses(#[case] line: &str, #[case] want: OperatorCommand) {
        assert_eq!(line.parse::<OperatorCommand>(), Ok(want));
    }

    #[rstest]
    #[case("", ParseCommandError::Empty)]
    #[case("x", ParseCommandError::Unknown("x".into()))]
    #[case("w 48", ParseCommandError::Missing("value"))]
    #[case("w 70000 01", ParseCommandError::Invalid { what: "address", value: "70000".into() })]
    #[case("r 1 2 fast", ParseCommandError::Invalid { what: "read mode", value: "fast".into() })]
    #[case("r 1 2 raw 100 1", ParseCommandError::Invalid { what: "data-rate index", value: "100".into() })]
    #[case("c 1 abc", ParseCommandError::Invalid { what: "data", value: "abc".into() })]
    fn rejects(#[case] line: &str, #[case] want: ParseCommandError) {
        assert_eq!(line.parse::<OperatorCommand>(), Err(want));
    }
}
