//! Onboard memory map of the satellite and canned command plans.

use crate::encoder::batch_write;
use crate::error::EncodeError;
use crate::session::PlannedCommand;

pub const MEM_VALIDITY: u16 = 0;
pub const MEM_RESET_COUNTER: u16 = 1;
pub const MEM_TX_COUNTER: u16 = 2;
pub const MEM_RX_COUNTER: u16 = 4;
pub const MEM_FREQ_TABLE: u16 = 6;
pub const MEM_DR_TABLE: u16 = 30;
pub const MEM_DELAY: u16 = 48;
pub const MEM_CH1_INDEX: u16 = 49;
pub const MEM_CH2_INDEX: u16 = 50;
pub const MEM_RESERVE: u16 = 51;
pub const MEM_HISTORY: u16 = 128;

/// Frequency table entries 1..=7 (entry 0, 868.1 MHz, is factory set).
/// Each entry is the carrier divided by the 61.035 Hz synthesizer step.
const FREQ_TABLE: [u8; 21] = [
    0xD9, 0x13, 0x58, // 868.3 MHz
    0xD9, 0x20, 0x24, // 868.5
    0xD8, 0xC6, 0x8B, // 867.1
    0xD8, 0xD3, 0x58, // 867.3
    0xD8, 0xE0, 0x24, // 867.5
    0xD8, 0xEC, 0xF1, // 867.7
    0xD8, 0xF9, 0xBE, // 867.9
];

/// Data rates SF7..SF11 at 125 kHz; SF12 is factory set.
const DR_TABLE: [u8; 15] = [
    0x74, 0x72, 0x04, //
    0x84, 0x72, 0x04, //
    0x94, 0x72, 0x04, //
    0xA4, 0x72, 0x04, //
    0xB4, 0x72, 0x0C,
];

/// Steps of the setup preset, in upload order.
const SETUP_STEPS: &[(&str, u16, &[u8])] = &[
    ("CHANGE DELAY TO 16s", MEM_DELAY, &[0x00]),
    ("FREQ TABLE", MEM_FREQ_TABLE + 3, &FREQ_TABLE),
    ("SF12 BW128", MEM_CH1_INDEX, &[0x50, 0x50]),
    ("DATARATE TABLE", MEM_DR_TABLE, &DR_TABLE),
    ("RANDOM FREQ", MEM_CH1_INDEX, &[0x50, 0x5F]),
    ("CHANGE DELAY TO 5m", MEM_DELAY, &[0x03]),
];

/// Verified write batches that reconfigure the radio tables.
///
/// The downlink delay is shortened first so the session gets frequent
/// read-backs, and restored last.
pub fn setup_memory_plan(max_packet_hex_chars: usize) -> Result<Vec<PlannedCommand>, EncodeError> {
    let mut out = Vec::new();
    for (label, address, bytes) in SETUP_STEPS {
        out.extend(batch_write(bytes, *address, label, max_packet_hex_chars)?);
    }
    Ok(out)
}
