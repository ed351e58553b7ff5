#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
//! Config schemas and upload-plan parsing for the ground-station link.
//!
//! - `Config` and sub-structs are deserialized from TOML and validated.
//! - Upload-plan CSV loader enforces headers and checks every row's address
//!   range and hex data before anything is queued for the radio.
use serde::Deserialize;

/// Hex characters taken by one single-byte write fragment ("91" + addr + byte).
pub const WRITE_FRAGMENT_HEX: usize = 8;
/// Hex characters taken by the trailing read-back fragment of a batch.
pub const READBACK_OVERHEAD_HEX: usize = 12;

#[derive(Debug, Deserialize)]
pub struct Device {
    /// Device address in MAC-frame (wire) order, 8 hex chars.
    pub dev_addr: String,
    /// Application session key, 32 hex chars.
    pub app_skey: String,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Ports {
    /// Application port carrying periodic telemetry.
    pub telemetry: u8,
    /// Application port carrying memory read-back acknowledgements.
    pub ack: u8,
}

impl Default for Ports {
    fn default() -> Self {
        Self {
            telemetry: 1,
            ack: 2,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Relay {
    pub enabled: bool,
    pub server_uri: String,
    pub transmitter_id: String,
    pub receiver_id: String,
    /// Position reported for relay receptions when packets carry none.
    pub station_position: Option<(f64, f64)>,
    /// Seconds between the satellite's downlink and its receive window.
    pub rx_window_delay_s: u64,
    /// Length of the observation planned at session start.
    pub observation_minutes: u64,
    pub max_packet_hex_chars: usize,
    /// MAC command byte ceiling of one relay frame.
    pub max_command_bytes: usize,
    pub request_timeout_ms: u64,
}

impl Default for Relay {
    fn default() -> Self {
        Self {
            enabled: false,
            server_uri: String::new(),
            transmitter_id: String::new(),
            receiver_id: String::new(),
            station_position: None,
            rx_window_delay_s: 66,
            observation_minutes: 60,
            max_packet_hex_chars: 30,
            max_command_bytes: 15,
            request_timeout_ms: 5_000,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Push {
    pub enabled: bool,
    /// Network-server device id; messages for other devices are ignored.
    pub device_id: String,
    /// JSON-lines file (or FIFO) fed by the message-queue bridge.
    pub inbox: Option<String>,
    /// JSON-lines file (or FIFO) drained by the message-queue bridge.
    pub outbox: Option<String>,
    pub reply_port: u8,
    pub max_packet_hex_chars: usize,
    pub max_command_bytes: usize,
}

impl Default for Push {
    fn default() -> Self {
        Self {
            enabled: false,
            device_id: String::new(),
            inbox: None,
            outbox: None,
            reply_port: 1,
            max_packet_hex_chars: 102,
            max_command_bytes: 51,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PathPreference {
    #[default]
    Relay,
    Push,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Session {
    /// Main cycle period (ms).
    pub cycle_ms: u64,
    /// Capacity of each rolling history (raw frames, packets, telemetry).
    pub history_cap: usize,
    /// Sea-level reference pressure for the barometric altitude.
    pub baseline_pressure_hpa: f64,
    /// Transmission path selected at startup.
    pub prefer: PathPreference,
}

impl Default for Session {
    fn default() -> Self {
        Self {
            cycle_ms: 3_000,
            history_cap: 5,
            baseline_pressure_hpa: 1013.25,
            prefer: PathPreference::Relay,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Decoder {
    /// External MAC parser executable. When absent or `"plaintext"`, frames
    /// are read as unencrypted.
    pub command: Option<String>,
    /// Parser runs longer than this are killed and the frame dropped.
    pub timeout_ms: u64,
}

impl Default for Decoder {
    fn default() -> Self {
        Self {
            command: None,
            timeout_ms: 2000,
        }
    }
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct Logging {
    pub file: Option<String>,  // path to .log (JSON lines)
    pub level: Option<String>, // "info","debug"
    /// Log rotation policy: "never" | "daily" | "hourly" (default: never)
    pub rotation: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Config {
    pub device: Device,
    #[serde(default)]
    pub ports: Ports,
    #[serde(default)]
    pub relay: Relay,
    #[serde(default)]
    pub push: Push,
    #[serde(default)]
    pub session: Session,
    #[serde(default)]
    pub decoder: Decoder,
    #[serde(default)]
    pub logging: Logging,
}

pub fn load_toml(s: &str) -> Result<Config, toml::de::Error> {
    toml::from_str::<Config>(s)
}

fn is_hex_of_len(s: &str, len: usize) -> bool {
    s.len() == len && s.chars().all(|c| c.is_ascii_hexdigit())
}

fn validate_path_limits(name: &str, max_packet_hex_chars: usize, max_command_bytes: usize) -> eyre::Result<()> {
    let min = WRITE_FRAGMENT_HEX + READBACK_OVERHEAD_HEX;
    if max_packet_hex_chars < min {
        eyre::bail!("{name}.max_packet_hex_chars must be >= {min}");
    }
    if max_command_bytes == 0 {
        eyre::bail!("{name}.max_command_bytes must be >= 1");
    }
    if max_packet_hex_chars > max_command_bytes * 2 {
        eyre::bail!("{name}.max_packet_hex_chars exceeds {name}.max_command_bytes");
    }
    Ok(())
}

impl Config {
    pub fn validate(&self) -> eyre::Result<()> {
        // Device
        if !is_hex_of_len(&self.device.dev_addr, 8) {
            eyre::bail!("device.dev_addr must be 8 hex chars");
        }
        if !is_hex_of_len(&self.device.app_skey, 32) {
            eyre::bail!("device.app_skey must be 32 hex chars");
        }

        // Ports
        if self.ports.telemetry == 0 || self.ports.ack == 0 {
            eyre::bail!("ports.telemetry and ports.ack must be >= 1");
        }
        if self.ports.telemetry == self.ports.ack {
            eyre::bail!("ports.telemetry and ports.ack must differ");
        }

        // Paths
        if !self.relay.enabled && !self.push.enabled {
            eyre::bail!("no transmission path: enable [relay] or [push]");
        }
        if self.relay.enabled {
            if self.relay.server_uri.is_empty() {
                eyre::bail!("relay.server_uri is required when relay is enabled");
            }
            if self.relay.transmitter_id.is_empty() || self.relay.receiver_id.is_empty() {
                eyre::bail!("relay.transmitter_id and relay.receiver_id are required");
            }
            if self.relay.observation_minutes == 0 {
                eyre::bail!("relay.observation_minutes must be >= 1");
            }
            if self.relay.request_timeout_ms == 0 {
                eyre::bail!("relay.request_timeout_ms must be >= 1");
            }
            validate_path_limits(
                "relay",
                self.relay.max_packet_hex_chars,
                self.relay.max_command_bytes,
            )?;
        }
        if self.push.enabled {
            if self.push.device_id.is_empty() {
                eyre::bail!("push.device_id is required when push is enabled");
            }
            if self.push.reply_port == 0 {
                eyre::bail!("push.reply_port must be >= 1");
            }
            validate_path_limits(
                "push",
                self.push.max_packet_hex_chars,
                self.push.max_command_bytes,
            )?;
        }

        // Session
        if self.session.cycle_ms == 0 {
            eyre::bail!("session.cycle_ms must be >= 1");
        }
        if self.session.history_cap == 0 {
            eyre::bail!("session.history_cap must be >= 1");
        }
        if !(self.session.baseline_pressure_hpa.is_finite()
            && self.session.baseline_pressure_hpa > 0.0)
        {
            eyre::bail!("session.baseline_pressure_hpa must be > 0");
        }

        // Decoder
        if self.decoder.timeout_ms == 0 {
            eyre::bail!("decoder.timeout_ms must be >= 1");
        }

        Ok(())
    }
}

/// Upload-plan CSV schema.
///
/// Expected headers:
/// label,address,data
///
/// Example:
/// label,address,data
/// FREQ TABLE,9,D91358D92024
/// DELAY,48,03
#[derive(Debug, Deserialize, Clone)]
pub struct PlanRow {
    pub label: String,
    pub address: u32,
    pub data: String,
}

/// One validated memory copy from an upload plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanEntry {
    pub label: String,
    pub address: u16,
    pub bytes: Vec<u8>,
}

impl PlanEntry {
    pub fn from_row(row: &PlanRow) -> eyre::Result<Self> {
        let bytes = hex::decode(row.data.trim())
            .map_err(|e| eyre::eyre!("data {:?} is not hex: {e}", row.data))?;
        if bytes.is_empty() {
            eyre::bail!("data must contain at least one byte");
        }
        let end = u64::from(row.address) + bytes.len() as u64;
        if end > 0x1_0000 {
            eyre::bail!(
                "address range {}..{} exceeds 16-bit memory space",
                row.address,
                end
            );
        }
        Ok(Self {
            label: row.label.clone(),
            address: row.address as u16,
            bytes,
        })
    }
}

pub fn load_plan_csv(path: &std::path::Path) -> eyre::Result<Vec<PlanEntry>> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(|e| eyre::eyre!("open upload plan CSV {:?}: {}", path, e))?;

    // Enforce exact headers
    let headers = rdr
        .headers()
        .map_err(|e| eyre::eyre!("read CSV headers {:?}: {}", path, e))?
        .clone();
    let expected = ["label", "address", "data"];
    let actual: Vec<String> = headers.iter().map(|s| s.to_string()).collect();
    if actual != expected {
        eyre::bail!(
            "upload plan CSV must have headers 'label,address,data', got: {}",
            actual.join(",")
        );
    }

    let mut entries = Vec::new();
    for (idx, rec) in rdr.deserialize::<PlanRow>().enumerate() {
        let row = rec.map_err(|e| eyre::eyre!("invalid CSV row {}: {}", idx + 2, e))?;
        let entry =
            PlanEntry::from_row(&row).map_err(|e| eyre::eyre!("invalid CSV row {}: {}", idx + 2, e))?;
        entries.push(entry);
    }
    if entries.is_empty() {
        eyre::bail!("upload plan {:?} has no rows", path);
    }
    Ok(entries)
}
