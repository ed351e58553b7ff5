//! JSON-lines bridge to the network server's message queue.
//!
//! A broker client (outside this process) writes each uplink event as one
//! JSON document per line to the inbox, and forwards each line of the outbox
//! to the device's "downlink replace" topic.

use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::Path;
use std::time::Duration;

use base64::Engine as _;
use crossbeam_channel as xch;
use groundlink_traits::{BoxError, PushReply, PushSource};
use serde::Serialize;

use crate::error::Result;

/// Lines buffered between the reader thread and the consumer.
const LINE_BUFFER: usize = 256;

/// Push source reading JSON lines from any reader.
///
/// A detached thread owns the reader, since a blocking read cannot be
/// interrupted; it ends at EOF or once the source is dropped and the next
/// line arrives.
#[derive(Debug)]
pub struct JsonLinesPushSource {
    rx: xch::Receiver<String>,
}

impl JsonLinesPushSource {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path.as_ref())?;
        Ok(Self::from_reader(BufReader::new(file)))
    }

    pub fn from_reader<R: BufRead + Send + 'static>(reader: R) -> Self {
        let (tx, rx) = xch::bounded(LINE_BUFFER);
        std::thread::spawn(move || {
            for line in reader.lines() {
                let line = match line {
                    Ok(l) => l,
                    Err(e) => {
                        tracing::warn!(error = %e, "push inbox read failed");
                        break;
                    }
                };
                if line.trim().is_empty() {
                    continue;
                }
                if tx.send(line).is_err() {
                    break;
                }
            }
            tracing::debug!("push inbox reader finished");
        });
        Self { rx }
    }
}

impl PushSource for JsonLinesPushSource {
    fn next_message(&mut self, timeout: Duration) -> std::result::Result<Option<String>, BoxError> {
        match self.rx.recv_timeout(timeout) {
            Ok(line) => Ok(Some(line)),
            Err(xch::RecvTimeoutError::Timeout) => Ok(None),
            Err(xch::RecvTimeoutError::Disconnected) => {
                // inbox exhausted; behave like a quiet feed
                std::thread::sleep(timeout);
                Ok(None)
            }
        }
    }
}

#[derive(Debug, Serialize)]
struct Downlink<'a> {
    frm_payload: String,
    f_port: u8,
    priority: &'a str,
}

#[derive(Debug, Serialize)]
struct ReplaceDownlinks<'a> {
    downlinks: [Downlink<'a>; 1],
}

/// The "replace downlinks" message for one payload.
pub fn replace_downlinks_message(payload: &[u8], port: u8) -> String {
    let msg = ReplaceDownlinks {
        downlinks: [Downlink {
            frm_payload: base64::engine::general_purpose::STANDARD.encode(payload),
            f_port: port,
            priority: "NORMAL",
        }],
    };
    // serializing plain structs of strings and integers cannot fail
    serde_json::to_string(&msg).unwrap_or_default()
}

/// Push reply writing one "replace downlinks" document per line.
#[derive(Debug)]
pub struct JsonLinesPushReply<W: Write> {
    out: W,
}

impl JsonLinesPushReply<File> {
    /// Append to `path`, creating it if needed.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path.as_ref())?;
        Ok(Self::new(file))
    }
}

impl<W: Write> JsonLinesPushReply<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> PushReply for JsonLinesPushReply<W> {
    fn replace_downlinks(&mut self, payload: &[u8], port: u8) -> std::result::Result<(), BoxError> {
        let line = replace_downlinks_message(payload, port);
        writeln!(self.out, "{line}")?;
        self.out.flush()?;
        tracing::debug!(port, bytes = payload.len(), "downlink replaced");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replace_message_shape() {
        assert_eq!(
            replace_downlinks_message(&[0x91, 0x00, 0x30, 0x03], 1),
            r#"{"downlinks":[{"frm_payload":"kQAwAw==","f_port":1,"priority":"NORMAL"}]}"#
        );
    }

    #[test]
    fn reader_lines_become_messages() {
        let input = "{\"a\":1}\n\n{\"b\":2}\n";
        let mut src = JsonLinesPushSource::from_reader(std::io::Cursor::new(input));
        let t = Duration::from_millis(500);
        assert_eq!(src.next_message(t).unwrap().as_deref(), Some("{\"a\":1}"));
        assert_eq!(src.next_message(t).unwrap().as_deref(), Some("{\"b\":2}"));
        assert_eq!(src.next_message(Duration::from_millis(10)).unwrap(), None);
    }
}
