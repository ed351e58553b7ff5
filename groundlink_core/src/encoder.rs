//! Radio command encoding for the satellite's onboard memory.
//!
//! Wire format (hex):
//! - write fragment: `91` + 4-hex address + 2-hex value
//! - read fragment:  `90` + 4-hex address + 2-hex size + 2-hex freq index + 2-hex data-rate index
//! - MAC frame:      `60` + 8-hex device address + 2-hex command length + 4-hex sequence
//!                   + command bytes + `00`
//!
//! Writes are batched so that each packet carries its own read-back of the
//! range it wrote; the satellite answers on the ack port with the bytes it
//! now holds, which is what `expected_readback` is compared against.

use crate::error::EncodeError;
use crate::packet::DeviceAddress;
use crate::session::PlannedCommand;
use crate::util::{is_hex_bytes, to_hex};

pub const WRITE_OPCODE: &str = "91";
pub const READ_OPCODE: &str = "90";
pub const MAC_HEADER: &str = "60";
pub const MAC_TRAILER: &str = "00";

// Fragment sizes are shared with config validation.
pub use groundlink_config::{READBACK_OVERHEAD_HEX, WRITE_FRAGMENT_HEX};

/// Read size is carried in the low 6 bits; bit 7 flags raw mode.
pub const READ_SIZE_MASK: u8 = 0b0011_1111;
pub const READ_RAW_FLAG: u8 = 0b1000_0000;
/// Largest range one read-back can cover.
pub const MAX_READ_LEN: usize = READ_SIZE_MASK as usize;

/// Auxiliary indexes sent with framed (non-raw) reads.
pub const DEFAULT_RAW_FREQ_INDEX: u8 = 0;
pub const DEFAULT_RAW_DATA_RATE_INDEX: u8 = 5 * 3;

/// Single-byte memory write.
pub fn encode_write(address: u16, value: u8) -> String {
    format!(
        "{WRITE_OPCODE}{}{}",
        to_hex(u32::from(address), 4),
        to_hex(u32::from(value), 2)
    )
}

/// Bounded memory read-back. `length` is masked to 6 bits; in raw mode the
/// satellite answers unframed on the given frequency / data-rate table
/// offsets.
pub fn encode_read(
    address: u16,
    length: u8,
    raw: bool,
    raw_freq_index: u8,
    raw_data_rate_index: u8,
) -> String {
    let mut size = length & READ_SIZE_MASK;
    if raw {
        size |= READ_RAW_FLAG;
    }
    format!(
        "{READ_OPCODE}{}{}{}{}",
        to_hex(u32::from(address), 4),
        to_hex(u32::from(size), 2),
        to_hex(u32::from(raw_freq_index), 2),
        to_hex(u32::from(raw_data_rate_index), 2)
    )
}

/// Framed read-back covering `len` bytes from `address`.
fn readback(address: u16, len: usize) -> String {
    // len <= MAX_READ_LEN by construction in `batch_write`
    encode_read(
        address,
        len as u8,
        false,
        DEFAULT_RAW_FREQ_INDEX,
        DEFAULT_RAW_DATA_RATE_INDEX,
    )
}

struct Batch {
    base: u32,
    commands: String,
    expected: String,
    len: usize,
}

impl Batch {
    fn new(base: u32) -> Self {
        Self {
            base,
            commands: String::new(),
            expected: String::new(),
            len: 0,
        }
    }

    fn close(self, label: &str) -> PlannedCommand {
        // base fits u16: checked against the memory size before batching
        let base = self.base as u16;
        let last = self.base + self.len as u32 - 1;
        PlannedCommand::new(
            format!("{}{}", self.commands, readback(base, self.len)),
            Some(self.expected),
            format!("{label} CPY {} to {last}", self.base),
        )
    }
}

/// Split a memory copy into verified write batches.
///
/// Fragments are appended greedily; a batch is closed before a fragment that
/// would push `commands + fragment + read-back` past `max_packet_hex_chars`.
/// Each closed batch ends with a read-back of its own range and expects the
/// written bytes back.
pub fn batch_write(
    bytes: &[u8],
    start: u16,
    label: &str,
    max_packet_hex_chars: usize,
) -> Result<Vec<PlannedCommand>, EncodeError> {
    let min = WRITE_FRAGMENT_HEX + READBACK_OVERHEAD_HEX;
    if max_packet_hex_chars < min {
        return Err(EncodeError::PacketLimitTooSmall {
            max: max_packet_hex_chars,
            min,
        });
    }
    if bytes.is_empty() {
        return Err(EncodeError::Empty);
    }
    if usize::from(start) + bytes.len() > 0x1_0000 {
        return Err(EncodeError::AddressOverflow {
            start,
            len: bytes.len(),
        });
    }

    let mut out = Vec::new();
    let mut batch = Batch::new(u32::from(start));
    for (i, &value) in bytes.iter().enumerate() {
        let address = u32::from(start) + i as u32;
        let fragment = encode_write(address as u16, value);
        let would_be = batch.commands.len() + fragment.len() + READBACK_OVERHEAD_HEX;
        if batch.len > 0 && (would_be > max_packet_hex_chars || batch.len == MAX_READ_LEN) {
            let full = std::mem::replace(&mut batch, Batch::new(address));
            out.push(full.close(label));
        }
        batch.commands.push_str(&fragment);
        batch.expected.push_str(&to_hex(u32::from(value), 2));
        batch.len += 1;
    }
    if batch.len > 0 {
        out.push(batch.close(label));
    }
    Ok(out)
}

/// Check a command's byte length against a MAC command ceiling.
pub fn check_command_len(commands_hex: &str, max_command_bytes: usize) -> Result<usize, EncodeError> {
    if !is_hex_bytes(commands_hex) {
        return Err(EncodeError::InvalidHex(commands_hex.to_string()));
    }
    let bytes = commands_hex.len() / 2;
    if bytes > max_command_bytes {
        return Err(EncodeError::CommandTooLong {
            bytes,
            max: max_command_bytes,
        });
    }
    Ok(bytes)
}

/// Wrap command bytes in the relay MAC frame.
pub fn mac_frame(
    commands_hex: &str,
    device: &DeviceAddress,
    sequence: u16,
    max_command_bytes: usize,
) -> Result<String, EncodeError> {
    let len = check_command_len(commands_hex, max_command_bytes.min(0xFF))?;
    Ok(format!(
        "{MAC_HEADER}{}{}{}{}{MAC_TRAILER}",
        device.wire_hex(),
        to_hex(len as u32, 2),
        to_hex(u32::from(sequence), 4),
        commands_hex.to_ascii_uppercase()
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_fragment_layout() {
        assert_eq!(encode_write(48, 0x03), "91003003");
        assert_eq!(encode_write(0xABCD, 0xFF), "91ABCDFF");
    }

    #[test]
    fn read_fragment_masks_size_and_flags_raw() {
        assert_eq!(encode_read(6, 3, false, 0, 15), "90000603000F");
        assert_eq!(encode_read(6, 0xFF, false, 0, 15), "9000063F000F");
        assert_eq!(encode_read(128, 10, true, 6, 12), "9000808A060C");
    }

    #[test]
    fn fragment_sizes_match_config_limits() {
        assert_eq!(encode_write(0xFFFF, 0xFF).len(), WRITE_FRAGMENT_HEX);
        assert_eq!(encode_read(0xFFFF, 63, true, 0xFF, 0xFF).len(), READBACK_OVERHEAD_HEX);
    }

    #[test]
    fn relay_sized_batches_hold_two_writes() {
        let cmds = batch_write(&[0xD9, 0x13, 0x58], 9, "FREQ TABLE", 30).unwrap();
        assert_eq!(cmds.len(), 2);
        assert_eq!(cmds[0].payload, "910009D991000A1390000902000F");
        assert_eq!(cmds[0].expected_readback.as_deref(), Some("D913"));
        assert_eq!(cmds[0].label, "FREQ TABLE CPY 9 to 10");
        assert_eq!(cmds[1].payload, "91000B5890000B01000F");
        assert_eq!(cmds[1].expected_readback.as_deref(), Some("58"));
        assert_eq!(cmds[1].label, "FREQ TABLE CPY 11 to 11");
    }

    #[test]
    fn rejects_limits_below_one_fragment() {
        assert_eq!(
            batch_write(&[1], 0, "x", 19),
            Err(EncodeError::PacketLimitTooSmall { max: 19, min: 20 })
        );
    }

    #[test]
    fn rejects_ranges_past_memory_end() {
        assert!(matches!(
            batch_write(&[1, 2], 0xFFFF, "x", 30),
            Err(EncodeError::AddressOverflow { .. })
        ));
        assert!(batch_write(&[1], 0xFFFF, "x", 30).is_ok());
    }

    #[test]
    fn huge_limits_still_cap_batch_at_read_size() {
        let bytes = vec![0xAA; 100];
        let cmds = batch_write(&bytes, 0, "big", 10_000).unwrap();
        assert_eq!(cmds.len(), 2);
        assert_eq!(cmds[0].expected_readback.as_ref().map(String::len), Some(126));
    }

    #[test]
    fn mac_frame_layout() {
        let dev = DeviceAddress::parse("E6BD0B26").unwrap();
        let frame = mac_frame("91003003", &dev, 7, 15).unwrap();
        assert_eq!(frame, "60E6BD0B260400079100300300");
    }

    #[test]
    fn mac_frame_refuses_more_than_ceiling() {
        let dev = DeviceAddress::parse("E6BD0B26").unwrap();
        let cmd = "91003003".repeat(2) + &"00".repeat(8);
        assert_eq!(
            mac_frame(&cmd, &dev, 0, 15),
            Err(EncodeError::CommandTooLong { bytes: 16, max: 15 })
        );
    }
}
