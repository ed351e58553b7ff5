//! MAC frame decoders.
//!
//! `CommandMacDecoder` shells out to an external LoRaWAN parser and scrapes
//! its report; `PlaintextMacDecoder` reads unencrypted frames as produced
//! by the simulator.

use std::io::Read;
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use groundlink_traits::{MacDecoder, MacFields};

use crate::error::RelayError;

/// How long the parser may run before it is killed.
pub const DEFAULT_DECODER_TIMEOUT: Duration = Duration::from_secs(2);
const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Invokes `<program> --appskey <key> <frame>` and parses its report.
#[derive(Debug, Clone)]
pub struct CommandMacDecoder {
    program: String,
    timeout: Duration,
}

impl CommandMacDecoder {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            timeout: DEFAULT_DECODER_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn run(&self, cipher_hex: &str, session_key: &str) -> Result<String, RelayError> {
        let spawn_err = |e: std::io::Error| RelayError::Decoder(format!("{}: {e}", self.program));
        let mut child = Command::new(&self.program)
            .arg("--appskey")
            .arg(session_key)
            .arg(cipher_hex)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(spawn_err)?;

        // Drained on a thread so a chatty parser cannot stall on a full pipe.
        let mut stdout = child
            .stdout
            .take()
            .ok_or_else(|| RelayError::Decoder(format!("{}: no stdout", self.program)))?;
        let reader = thread::spawn(move || {
            let mut buf = Vec::new();
            stdout.read_to_end(&mut buf).map(|_| buf)
        });

        let deadline = Instant::now() + self.timeout;
        loop {
            if child.try_wait().map_err(spawn_err)?.is_some() {
                break;
            }
            if Instant::now() >= deadline {
                // The reader thread is left to finish once the pipe closes.
                let _ = child.kill();
                let _ = child.wait();
                tracing::warn!(program = %self.program, timeout = ?self.timeout, "mac decoder killed");
                return Err(RelayError::Timeout);
            }
            thread::sleep(POLL_INTERVAL);
        }

        let bytes = reader
            .join()
            .map_err(|_| RelayError::Decoder(format!("{}: reader panicked", self.program)))?
            .map_err(spawn_err)?;
        String::from_utf8(bytes).map_err(|e| RelayError::Decoder(e.to_string()))
    }
}

impl MacDecoder for CommandMacDecoder {
    fn decode(&self, cipher_hex: &str, session_key: &str) -> Option<MacFields> {
        match self.run(cipher_hex, session_key) {
            Ok(report) => parse_parser_report(&report),
            Err(e) => {
                tracing::warn!(error = %e, "mac decoder failed");
                None
            }
        }
    }
}

/// Pull device address, counter, port and payload out of a parser report.
///
/// Relevant lines look like `DevAddr : x 260BBDE6`, `FCnt : 12`,
/// `FPort : 1` and `AppData : x 0103F5FC01`, with arbitrary indentation.
pub fn parse_parser_report(report: &str) -> Option<MacFields> {
    let mut device_address = None;
    let mut frame_counter = None;
    let mut port = None;
    let mut payload = None;
    for line in report.lines().map(str::trim) {
        if let Some(v) = line.strip_prefix("DevAddr : x ") {
            device_address = Some(v.trim().to_ascii_uppercase());
        } else if let Some(v) = line.strip_prefix("FCnt : ") {
            frame_counter = v.trim().parse().ok();
        } else if let Some(v) = line.strip_prefix("FPort : ") {
            port = v.trim().parse().ok();
        } else if let Some(v) = line.strip_prefix("AppData : x ") {
            payload = Some(v.trim().replace(' ', "").to_ascii_uppercase());
        }
    }
    let payload = payload.filter(|p| !p.is_empty())?;
    Some(MacFields {
        device_address: device_address?,
        frame_counter: frame_counter?,
        port: port?,
        payload,
    })
}

/// Unconfirmed data-up message type.
pub const MHDR_UNCONFIRMED_UP: u8 = 0x40;
const MIC_LEN: usize = 4;
const HEADER_LEN: usize = 1 + 4 + 1 + 2;

/// Decoder for frames whose application payload is not encrypted.
///
/// Layout: `MHDR | DevAddr (LE) | FCtrl | FCnt (LE) | FOpts | FPort | payload | MIC`.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlaintextMacDecoder;

impl MacDecoder for PlaintextMacDecoder {
    fn decode(&self, cipher_hex: &str, _session_key: &str) -> Option<MacFields> {
        let bytes = hex::decode(cipher_hex).ok()?;
        let body = bytes.get(..bytes.len().checked_sub(MIC_LEN)?)?;
        let addr = body.get(1..5)?;
        let fopts_len = usize::from(*body.get(5)? & 0x0F);
        let fcnt = u16::from_le_bytes([*body.get(6)?, *body.get(7)?]);
        let port_idx = HEADER_LEN + fopts_len;
        let port = *body.get(port_idx)?;
        let payload = body.get(port_idx + 1..)?;
        if payload.is_empty() {
            return None;
        }
        let mut be = [0u8; 4];
        be.copy_from_slice(addr);
        be.reverse();
        Some(MacFields {
            device_address: hex::encode_upper(be),
            frame_counter: u32::from(fcnt),
            port,
            payload: hex::encode_upper(payload),
        })
    }
}

/// Build an unencrypted data-up frame (zero MIC) for `dev_addr_wire`, the
/// address in frame byte order.
pub fn plaintext_frame(dev_addr_wire: &[u8; 4], fcnt: u16, port: u8, payload: &[u8]) -> String {
    let mut out = Vec::with_capacity(HEADER_LEN + 1 + payload.len() + MIC_LEN);
    out.push(MHDR_UNCONFIRMED_UP);
    out.extend_from_slice(dev_addr_wire);
    out.push(0x00);
    out.extend_from_slice(&fcnt.to_le_bytes());
    out.push(port);
    out.extend_from_slice(payload);
    out.extend_from_slice(&[0; MIC_LEN]);
    hex::encode_upper(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    const REPORT: &str = "\
Message Type = Data
  PHYPayload = 40E6BD0B2600050001AABBCCDD
    MHDR : x 40
    DevAddr : x 260bbde6
    FCtrl : x 00
    FCnt : 5
    FPort : 2
  AppData : x ab12
";

    #[test]
    fn parses_parser_report() {
        let f = parse_parser_report(REPORT).unwrap();
        assert_eq!(f.device_address, "260BBDE6");
        assert_eq!(f.frame_counter, 5);
        assert_eq!(f.port, 2);
        assert_eq!(f.payload, "AB12");
    }

    #[test]
    fn incomplete_report_is_none() {
        let no_port = REPORT.replace("    FPort : 2\n", "");
        assert!(parse_parser_report(&no_port).is_none());
        assert!(parse_parser_report("Invalid MIC").is_none());
    }

    #[cfg(unix)]
    fn script(dir: &std::path::Path, body: &str) -> String {
        use std::os::unix::fs::PermissionsExt;
        let path = dir.join("parser.sh");
        std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path.to_string_lossy().into_owned()
    }

    // Scripts are written and executed from a single test; exec of a file
    // another thread still holds open for writing fails with ETXTBSY.
    #[cfg(unix)]
    #[test]
    fn external_parser_reports_and_hangs() {
        let dir = tempfile::tempdir().unwrap();

        let cat_report = format!("cat <<'EOF'\n{REPORT}EOF");
        let ok = CommandMacDecoder::new(script(dir.path(), &cat_report));
        let f = ok.decode("40E6BD0B2600050001AABBCCDD", "00").unwrap();
        assert_eq!((f.frame_counter, f.port), (5, 2));

        let slow_dir = tempfile::tempdir().unwrap();
        let hung = CommandMacDecoder::new(script(slow_dir.path(), "exec sleep 30"))
            .with_timeout(Duration::from_millis(150));
        let started = Instant::now();
        assert!(hung.decode("40E6BD0B26", "00").is_none());
        assert!(started.elapsed() < Duration::from_secs(5));
        assert!(matches!(hung.run("40E6BD0B26", "00"), Err(RelayError::Timeout)));
    }

    #[test]
    fn missing_parser_is_a_decoder_error() {
        let dec = CommandMacDecoder::new("/nonexistent/lorawan-parser");
        assert!(matches!(dec.run("40", "00"), Err(RelayError::Decoder(_))));
    }

    #[test]
    fn plaintext_frames_decode() {
        let frame = plaintext_frame(&[0xE6, 0xBD, 0x0B, 0x26], 300, 1, &[1, 3, 0xF5, 0xFC, 1]);
        let f = PlaintextMacDecoder.decode(&frame, "").unwrap();
        assert_eq!(f.device_address, "260BBDE6");
        assert_eq!(f.frame_counter, 300);
        assert_eq!(f.port, 1);
        assert_eq!(f.payload, "0103F5FC01");
    }

    #[test]
    fn truncated_plaintext_frames_are_none() {
        assert!(PlaintextMacDecoder.decode("40E6BD0B26", "").is_none());
        assert!(PlaintextMacDecoder.decode("zz", "").is_none());
        let no_payload = plaintext_frame(&[1, 2, 3, 4], 1, 1, &[]);
        assert!(PlaintextMacDecoder.decode(&no_payload, "").is_none());
    }
}
