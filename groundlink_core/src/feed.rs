//! Push-feed ingestion.
//!
//! Messages are parsed into `RawFrame`s on a background thread that owns the
//! `PushSource`; frames reach the session loop through a bounded channel, so
//! the loop stays the only writer of session state.
//!
//! Safety: each `PushListener` owns exactly one thread, stopped and joined
//! when the listener is dropped.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use base64::Engine as _;
use chrono::{DateTime, Utc};
use crossbeam_channel as xch;
use groundlink_traits::{Clock, MacFields, PushSource};
use serde::Deserialize;
use thiserror::Error;

use crate::packet::{FrameBody, RawFrame, SourceKind, StationReport};

/// Frames buffered between the listener and the session loop.
pub const FEED_CAPACITY: usize = 64;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FeedError {
    #[error("push message is not valid JSON: {0}")]
    Json(String),
    #[error("push payload is not base64: {0}")]
    Payload(String),
}

#[derive(Debug, Deserialize)]
struct Envelope {
    end_device_ids: DeviceIds,
    #[serde(default)]
    received_at: Option<DateTime<Utc>>,
    #[serde(default)]
    uplink_message: Option<Uplink>,
}

#[derive(Debug, Deserialize)]
struct DeviceIds {
    device_id: String,
    #[serde(default)]
    dev_addr: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Uplink {
    #[serde(default)]
    f_port: Option<u8>,
    // omitted by the network server when zero
    #[serde(default)]
    f_cnt: u32,
    #[serde(default)]
    frm_payload: Option<String>,
    #[serde(default)]
    rx_metadata: Vec<RxMetadata>,
}

#[derive(Debug, Deserialize)]
struct RxMetadata {
    #[serde(default)]
    snr: Option<f32>,
    #[serde(default)]
    rssi: Option<f32>,
    #[serde(default)]
    location: Option<Location>,
    #[serde(default)]
    time: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct Location {
    latitude: f64,
    longitude: f64,
}

/// Parse one push message.
///
/// `Ok(None)` for messages about other devices and for messages without an
/// uplink section, port, or payload.
pub fn parse_push_message(
    text: &str,
    device_id: &str,
    now: DateTime<Utc>,
) -> Result<Option<RawFrame>, FeedError> {
    let env: Envelope = serde_json::from_str(text).map_err(|e| FeedError::Json(e.to_string()))?;
    if env.end_device_ids.device_id != device_id {
        return Ok(None);
    }
    let Some(up) = env.uplink_message else {
        return Ok(None);
    };
    let (Some(port), Some(b64)) = (up.f_port, up.frm_payload) else {
        return Ok(None);
    };
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(b64.as_bytes())
        .map_err(|e| FeedError::Payload(e.to_string()))?;

    let received_at = env.received_at.unwrap_or(now);
    let stations: Vec<StationReport> = up
        .rx_metadata
        .iter()
        .map(|m| StationReport {
            snr: m.snr.unwrap_or(0.0),
            rssi: m.rssi.unwrap_or(0.0),
            position: m.location.as_ref().map(|l| (l.latitude, l.longitude)),
            time: m.time.unwrap_or(received_at),
        })
        .collect();
    let first = stations.first();

    Ok(Some(RawFrame {
        source: SourceKind::Push,
        received_at,
        snr: first.map_or(0.0, |s| s.snr),
        rssi: first.map_or(0.0, |s| s.rssi),
        frequency_error: 0.0,
        body: FrameBody::Decoded(MacFields {
            device_address: env.end_device_ids.dev_addr.unwrap_or_default(),
            frame_counter: up.f_cnt,
            port,
            payload: hex::encode_upper(bytes),
        }),
        station_position: first.and_then(|s| s.position),
        station_count: u32::try_from(stations.len()).unwrap_or(u32::MAX).max(1),
        stations,
        envelope: Some(text.to_string()),
    }))
}

/// Background reader of the push feed.
pub struct PushListener {
    rx: xch::Receiver<RawFrame>,
    shutdown: Arc<AtomicBool>,
    join_handle: Option<std::thread::JoinHandle<()>>,
}

impl PushListener {
    /// Start reading `source`. `poll` bounds each blocking read so shutdown
    /// is noticed promptly.
    pub fn spawn<S, C>(mut source: S, device_id: String, poll: Duration, clock: C) -> Self
    where
        S: PushSource + Send + 'static,
        C: Clock + Send + Sync + 'static,
    {
        let (tx, rx) = xch::bounded(FEED_CAPACITY);
        let shutdown = Arc::new(AtomicBool::new(false));
        let shutdown_clone = shutdown.clone();

        let join_handle = std::thread::spawn(move || {
            tracing::debug!(device_id = %device_id, "push listener started");
            while !shutdown_clone.load(Ordering::Relaxed) {
                let text = match source.next_message(poll) {
                    Ok(Some(text)) => text,
                    Ok(None) => continue,
                    Err(e) => {
                        tracing::warn!(error = %e, "push source failed");
                        clock.sleep(poll);
                        continue;
                    }
                };
                match parse_push_message(&text, &device_id, clock.utc_now()) {
                    Ok(Some(frame)) => {
                        if tx.send(frame).is_err() {
                            tracing::debug!("push consumer disconnected");
                            break;
                        }
                    }
                    Ok(None) => tracing::trace!("push message ignored"),
                    Err(e) => tracing::warn!(error = %e, "push message dropped"),
                }
            }
            tracing::debug!("push listener stopped");
        });

        Self {
            rx,
            shutdown,
            join_handle: Some(join_handle),
        }
    }

    pub fn receiver(&self) -> &xch::Receiver<RawFrame> {
        &self.rx
    }
}

impl Drop for PushListener {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);
        // Unblock a listener stuck on a full channel.
        while self.rx.try_recv().is_ok() {}
        if let Some(handle) = self.join_handle.take()
            && let Err(e) = handle.join()
        {
            tracing::warn!(?e, "push listener panicked during shutdown");
        }
    }
}
