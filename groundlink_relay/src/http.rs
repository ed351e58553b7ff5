//! Blocking client for the ground-station relay API.
//!
//! Requests are form-encoded POSTs under `/api/`; every reply is a JSON
//! object `{"status": bool, "id"?: .., "value"?: ..}`. Received packets are
//! published as a JSON artefact per observation.

use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use groundlink_traits::{
    BoxError, ObservationHandle, RelayPacket, RelayTransport, TransmissionHandle,
    TransmissionStatus, UplinkStart,
};
use reqwest::blocking::Client;
use serde::Deserialize;

use crate::error::{RelayError, Result};

/// Minute-resolution UTC timestamp format of the planning endpoints.
pub const PLAN_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M";
/// Start sent with delay-relative uplinks; the relay ignores it.
pub const DELAYED_UPLINK_START: &str = "2106-02-07T06:28:15";
/// Status value of a transmitted uplink.
pub const STATUS_DONE: &str = "done";

#[derive(Debug, Deserialize)]
struct ApiReply {
    status: bool,
    #[serde(default)]
    id: Option<serde_json::Value>,
    #[serde(default)]
    value: Option<String>,
}

impl ApiReply {
    fn id(&self, endpoint: &str) -> Result<String> {
        match &self.id {
            Some(serde_json::Value::String(s)) => Ok(s.clone()),
            Some(serde_json::Value::Number(n)) => Ok(n.to_string()),
            _ => Err(RelayError::Json(format!("{endpoint}: reply without id"))),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum WireTime {
    Unix(f64),
    Text(DateTime<Utc>),
}

impl WireTime {
    fn to_utc(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::Text(t) => Some(*t),
            Self::Unix(secs) => {
                let millis = (secs * 1000.0).round();
                if !millis.is_finite() {
                    return None;
                }
                #[allow(clippy::cast_possible_truncation)]
                Utc.timestamp_millis_opt(millis as i64).single()
            }
        }
    }
}

#[derive(Debug, Deserialize)]
struct WirePacket {
    time: WireTime,
    #[serde(default)]
    snr: f32,
    #[serde(default)]
    rssi: f32,
    #[serde(default)]
    ferror: f32,
    data: String,
    #[serde(default)]
    lat: Option<f64>,
    #[serde(default)]
    lon: Option<f64>,
}

/// Parse a packets artefact. Malformed artefacts yield no packets.
pub fn parse_packets(text: &str) -> Vec<RelayPacket> {
    let wire: Vec<WirePacket> = match serde_json::from_str(text) {
        Ok(w) => w,
        Err(e) => {
            tracing::debug!(error = %e, "packets artefact not parseable");
            return Vec::new();
        }
    };
    wire.into_iter()
        .filter_map(|p| {
            Some(RelayPacket {
                time: p.time.to_utc()?,
                snr: p.snr,
                rssi: p.rssi,
                frequency_error: p.ferror,
                data: p.data,
                station: p.lat.zip(p.lon),
            })
        })
        .collect()
}

pub fn format_plan_time(t: DateTime<Utc>) -> String {
    t.format(PLAN_TIME_FORMAT).to_string()
}

/// Relay endpoint plus the two radio ids the session talks between.
#[derive(Debug, Clone)]
pub struct RelayClient {
    http: Client,
    base: String,
    /// Relay id of the satellite.
    satellite_id: String,
    /// Relay id of the ground station.
    station_id: String,
}

impl RelayClient {
    pub fn new(
        server_uri: &str,
        satellite_id: &str,
        station_id: &str,
        timeout: Duration,
    ) -> Result<Self> {
        let http = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            base: server_uri.trim_end_matches('/').to_string(),
            satellite_id: satellite_id.to_string(),
            station_id: station_id.to_string(),
        })
    }

    fn post(&self, endpoint: &str, form: &[(&str, String)]) -> Result<ApiReply> {
        let url = format!("{}/api/{endpoint}", self.base);
        tracing::trace!(%url, "relay request");
        let text = self.http.post(&url).form(form).send()?.text()?;
        let reply: ApiReply = serde_json::from_str(&text)?;
        if reply.status {
            Ok(reply)
        } else {
            Err(RelayError::Rejected(endpoint.to_string()))
        }
    }

    /// Form fields of an uplink request. The ground station transmits and
    /// the satellite receives.
    pub fn uplink_form(&self, frame_hex: &str, start: UplinkStart) -> Vec<(&'static str, String)> {
        let (start, delay) = match start {
            UplinkStart::Delay(d) => (DELAYED_UPLINK_START.to_string(), d.as_secs()),
            UplinkStart::At(t) => (format_plan_time(t), 0),
        };
        vec![
            ("transmitter", self.station_id.clone()),
            ("receiver", self.satellite_id.clone()),
            ("start", start),
            ("delay", delay.to_string()),
            ("data", frame_hex.to_string()),
        ]
    }

    /// Form fields of an observation request. The satellite transmits and
    /// the ground station receives.
    pub fn observation_form(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Vec<(&'static str, String)> {
        vec![
            ("receiver", self.station_id.clone()),
            ("transmitter", self.satellite_id.clone()),
            ("start", format_plan_time(start)),
            ("end", format_plan_time(end)),
        ]
    }
}

impl RelayTransport for RelayClient {
    fn plan_observation(
        &mut self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> std::result::Result<ObservationHandle, BoxError> {
        let reply = self.post("observation/plan", &self.observation_form(start, end))?;
        Ok(ObservationHandle(reply.id("observation/plan")?))
    }

    fn plan_uplink(
        &mut self,
        frame_hex: &str,
        start: UplinkStart,
    ) -> std::result::Result<TransmissionHandle, BoxError> {
        let reply = self.post("uplink/plan", &self.uplink_form(frame_hex, start))?;
        Ok(TransmissionHandle(reply.id("uplink/plan")?))
    }

    fn transmission_status(
        &mut self,
        handle: &TransmissionHandle,
    ) -> std::result::Result<TransmissionStatus, BoxError> {
        let reply = self.post("uplink/status", &[("id", handle.0.clone())])?;
        Ok(match reply.value.as_deref() {
            Some(STATUS_DONE) => TransmissionStatus::Done,
            _ => TransmissionStatus::Pending,
        })
    }

    fn fetch_packets(
        &mut self,
        observation: &ObservationHandle,
    ) -> std::result::Result<Vec<RelayPacket>, BoxError> {
        let url = format!("{}/ARTEFACTS/{}/packets.json", self.base, observation.0);
        let text = self
            .http
            .get(&url)
            .send()
            .map_err(RelayError::from)?
            .text()
            .map_err(RelayError::from)?;
        Ok(parse_packets(&text))
    }
}
