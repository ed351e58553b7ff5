//! Human-readable error descriptions and structured JSON error formatting.

use groundlink_core::error::{BuildError, EncodeError, LinkError};
use groundlink_relay::RelayError;

/// Exit code for configuration problems.
pub const EXIT_CONFIG: i32 = 2;
/// Exit code for encoder misuse (a command that must never be transmitted).
pub const EXIT_ENCODE: i32 = 3;

fn encode_error(err: &eyre::Report) -> Option<&EncodeError> {
    if let Some(e) = err.downcast_ref::<EncodeError>() {
        return Some(e);
    }
    match err.downcast_ref::<LinkError>() {
        Some(LinkError::Encode(e)) => Some(e),
        _ => None,
    }
}

fn is_config_error(err: &eyre::Report) -> bool {
    err.downcast_ref::<BuildError>().is_some()
        || matches!(err.downcast_ref::<LinkError>(), Some(LinkError::Config(_)))
}

/// Map an eyre::Report to a human-readable explanation with likely causes and fix hints.
pub fn humanize(err: &eyre::Report) -> String {
    // Typed matches first
    if let Some(be) = err.downcast_ref::<BuildError>() {
        return match be {
            BuildError::MissingTransmissionPath => {
                "What happened: No transmission path is available.\nLikely causes: Both [relay] and [push] are disabled, or neither transport could be created.\nHow to fix: Set `enabled = true` in [relay] or [push] (or run with --sim).".to_string()
            }
            BuildError::MissingDecoder => {
                "What happened: No MAC decoder was provided to the link engine.\nLikely causes: The decoder was not wired into the builder.\nHow to fix: Set [decoder] command in the config, or use \"plaintext\" for unencrypted frames.".to_string()
            }
            BuildError::InvalidDeviceAddress(addr) => format!(
                "What happened: Device address {addr:?} is not usable.\nLikely causes: dev_addr is not 8 hex characters.\nHow to fix: Set [device] dev_addr to the address in MAC-frame byte order, e.g. \"E6BD0B26\"."
            ),
            BuildError::InvalidConfig(msg) => format!(
                "What happened: Invalid configuration ({msg}).\nLikely causes: Missing or out-of-range values in the TOML.\nHow to fix: Edit the config file, then rerun. `groundlink check-config` validates it."
            ),
        };
    }

    if let Some(ee) = encode_error(err) {
        return match ee {
            EncodeError::CommandTooLong { bytes, max } => format!(
                "What happened: A command of {bytes} bytes does not fit the path limit of {max} bytes.\nLikely causes: The active transmission path has a smaller frame than the one the command was planned for.\nHow to fix: Plan with --path matching the active path, or split the copy into smaller rows."
            ),
            EncodeError::PacketLimitTooSmall { max, min } => format!(
                "What happened: Packet limit of {max} hex chars cannot hold a single verified write (needs {min}).\nLikely causes: max_packet_hex_chars set too low.\nHow to fix: Raise max_packet_hex_chars in [relay] / [push]."
            ),
            EncodeError::AddressOverflow { start, len } => format!(
                "What happened: Writing {len} bytes at {start} runs past the end of memory.\nLikely causes: Wrong address or too much data in the plan.\nHow to fix: Check the address and data columns."
            ),
            EncodeError::InvalidHex(s) => format!(
                "What happened: {s:?} is not a hex byte string.\nLikely causes: Odd number of digits or non-hex characters.\nHow to fix: Use pairs of hex digits, e.g. 0A1B."
            ),
            EncodeError::Empty => "What happened: Nothing to encode.\nLikely causes: Empty data column.\nHow to fix: Provide at least one byte.".to_string(),
        };
    }

    if let Some(le) = err.downcast_ref::<LinkError>() {
        return match le {
            LinkError::Config(msg) => format!(
                "What happened: Invalid configuration ({msg}).\nLikely causes: Missing or out-of-range values in the TOML.\nHow to fix: Edit the config file, then rerun. See etc/groundlink.toml for a sample."
            ),
            LinkError::Timeout => "What happened: The relay did not answer in time.\nLikely causes: Network trouble or request timeout too low.\nHow to fix: Check connectivity and consider raising relay.request_timeout_ms.".to_string(),
            other => format!(
                "What happened: {other}.\nLikely causes: See logs.\nHow to fix: Re-run with --log-level=debug or set RUST_LOG for more detail."
            ),
        };
    }

    if let Some(RelayError::Io(e)) = err.downcast_ref::<RelayError>() {
        return format!(
            "What happened: A push inbox/outbox file could not be opened ({e}).\nLikely causes: Wrong path in [push] inbox / outbox, or the bridge is not running.\nHow to fix: Check the paths and permissions, then rerun."
        );
    }

    let msg = err.to_string();
    let lower = msg.to_ascii_lowercase();

    // Upload plan CSV header special-case
    if lower.contains("must have headers") {
        return "Invalid headers in upload plan CSV. Expected 'label,address,data'.".to_string();
    }

    // Generic fallback
    let mut cause = String::new();
    if let Some(src) = err.source() {
        cause = format!(" Cause: {src}");
    }
    format!(
        "Something went wrong.{cause}\nHow to fix: Re-run with --log-level=debug for details. Original: {msg}"
    )
}

/// Stable exit codes: configuration 2, encoder misuse 3, anything else 1.
pub fn exit_code_for_error(err: &eyre::Report) -> i32 {
    if encode_error(err).is_some() {
        return EXIT_ENCODE;
    }
    if is_config_error(err) {
        return EXIT_CONFIG;
    }
    1
}

fn reason_name(err: &eyre::Report) -> &'static str {
    if encode_error(err).is_some() {
        "Encode"
    } else if is_config_error(err) {
        "Config"
    } else {
        "Error"
    }
}

/// Structured JSON for errors when --json is enabled.
pub fn format_error_json(err: &eyre::Report) -> String {
    use serde_json::json;

    let msg = humanize(err);
    match encode_error(err) {
        Some(EncodeError::CommandTooLong { bytes, max }) => json!({
            "reason": reason_name(err),
            "details": { "bytes": bytes, "max": max },
            "message": msg,
        })
        .to_string(),
        _ => json!({ "reason": reason_name(err), "message": msg }).to_string(),
    }
}
