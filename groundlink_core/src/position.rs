//! Satellite position estimate from the stations that heard a frame.
//!
//! Zero, one and two stations are handled here; three or more go to the
//! external triangulation engine.

use groundlink_traits::{StationObservation, Triangulation};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PositionEstimate {
    pub lat: f64,
    pub lon: f64,
    /// Number of stations used; 0 means no estimate.
    pub confidence: usize,
}

impl PositionEstimate {
    pub const NONE: Self = Self {
        lat: 0.0,
        lon: 0.0,
        confidence: 0,
    };
}

/// Weight of a station in the centroid: the inverse RSSI magnitude.
#[inline]
fn weight(rssi: f32) -> f64 {
    (1.0 / f64::from(rssi)).abs()
}

/// Inverse-RSSI-magnitude weighted mean of the station positions. Falls back
/// to the plain mean when a weight is not finite (RSSI of exactly 0).
pub fn weighted_centroid(stations: &[StationObservation]) -> Option<(f64, f64)> {
    if stations.is_empty() {
        return None;
    }
    let weights: Vec<f64> = stations.iter().map(|s| weight(s.rssi)).collect();
    let total: f64 = weights.iter().sum();
    if !total.is_finite() || total == 0.0 {
        let n = stations.len() as f64;
        let lat = stations.iter().map(|s| s.lat).sum::<f64>() / n;
        let lon = stations.iter().map(|s| s.lon).sum::<f64>() / n;
        return Some((lat, lon));
    }
    let lat = stations
        .iter()
        .zip(&weights)
        .map(|(s, w)| s.lat * w)
        .sum::<f64>()
        / total;
    let lon = stations
        .iter()
        .zip(&weights)
        .map(|(s, w)| s.lon * w)
        .sum::<f64>()
        / total;
    Some((lat, lon))
}

/// Triangulation stand-in that applies the weighted centroid to any number
/// of stations.
#[derive(Debug, Default, Clone, Copy)]
pub struct WeightedCentroid;

impl Triangulation for WeightedCentroid {
    fn locate(&self, stations: &[StationObservation]) -> Option<(f64, f64)> {
        weighted_centroid(stations)
    }
}

/// Estimate the satellite position from located station reports.
pub fn estimate(
    stations: &[StationObservation],
    engine: Option<&dyn Triangulation>,
) -> PositionEstimate {
    match stations {
        [] => PositionEstimate::NONE,
        [only] => PositionEstimate {
            lat: only.lat,
            lon: only.lon,
            confidence: 1,
        },
        [_, _] => match weighted_centroid(stations) {
            Some((lat, lon)) => PositionEstimate {
                lat,
                lon,
                confidence: 2,
            },
            None => PositionEstimate::NONE,
        },
        _ => {
            let located = engine.and_then(|e| e.locate(stations)).or_else(|| {
                tracing::warn!(
                    stations = stations.len(),
                    "triangulation unavailable; using weighted centroid"
                );
                weighted_centroid(stations)
            });
            match located {
                Some((lat, lon)) => PositionEstimate {
                    lat,
                    lon,
                    confidence: stations.len(),
                },
                None => PositionEstimate::NONE,
            }
        }
    }
}
