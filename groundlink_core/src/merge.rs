//! Dedup/merge of normalized packets into the session histories.
//!
//! A packet whose frame counter equals the most recently stored packet's is a
//! second reception of the same over-the-air frame and is folded into the
//! stored entry. Only the last packet is compared.

use crate::packet::ApplicationPacket;
use crate::session::SessionState;
use crate::telemetry::TelemetryRecord;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MergeCfg {
    pub telemetry_port: u8,
    pub baseline_pressure_hpa: f64,
}

/// Result of ingesting one packet.
#[derive(Debug, Clone, PartialEq)]
pub enum Ingested {
    /// Folded into the previous entry; no new history was created.
    Duplicate { frame_counter: u32, station_count: u32 },
    /// New frame, appended to history. Its port and payload feed the
    /// confirmation check.
    Fresh {
        port: u8,
        payload: String,
        telemetry: Option<TelemetryRecord>,
    },
}

pub fn ingest(state: &mut SessionState, packet: ApplicationPacket, cfg: &MergeCfg) -> Ingested {
    if let Some(last) = state.packets.last_mut()
        && last.frame_counter == packet.frame_counter
    {
        merge_into(last, &packet);
        let merged = last.clone();
        if let Some(rec) = state.telemetry.last_mut()
            && rec.frame_counter == merged.frame_counter
        {
            rec.station_count = merged.station_count;
            if rec.position.is_none() {
                rec.position = merged.position;
            }
        }
        tracing::debug!(
            fcnt = merged.frame_counter,
            stations = merged.station_count,
            "duplicate merged"
        );
        return Ingested::Duplicate {
            frame_counter: merged.frame_counter,
            station_count: merged.station_count,
        };
    }

    tracing::info!(
        fcnt = packet.frame_counter,
        port = packet.port,
        stations = packet.station_count,
        source = ?packet.source,
        "downlink received"
    );
    state.downlinks_received += 1;
    let port = packet.port;
    let payload = packet.payload.clone();
    let telemetry = if port == cfg.telemetry_port {
        match TelemetryRecord::from_packet(&packet, cfg.baseline_pressure_hpa) {
            Ok(rec) => {
                tracing::info!(
                    reset = rec.reset_count,
                    solar_v = rec.solar_voltage,
                    temp_c = rec.temperature_c,
                    pressure_hpa = rec.pressure_hpa,
                    altitude_m = rec.altitude_m,
                    "telemetry decoded"
                );
                state.telemetry.push(rec.clone());
                Some(rec)
            }
            Err(e) => {
                tracing::warn!(error = %e, payload = %payload, "telemetry undecodable");
                None
            }
        }
    } else {
        None
    };
    state.packets.push(packet);
    Ingested::Fresh {
        port,
        payload,
        telemetry,
    }
}

fn merge_into(stored: &mut ApplicationPacket, dup: &ApplicationPacket) {
    stored.station_count = stored.station_count.saturating_add(dup.station_count);
    if stored.position.is_none() {
        stored.position = dup.position;
    }
    if stored.envelope.as_deref().is_none_or(str::is_empty) {
        stored.envelope.clone_from(&dup.envelope);
    }
    if stored.frequency_error == 0.0 {
        stored.frequency_error = dup.frequency_error;
    }
}
