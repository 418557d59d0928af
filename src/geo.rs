use serde::{Deserialize, Serialize};

/// Mean Earth radius used for all great-circle distances.
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Latitude/longitude pair in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub lat: f64,
    pub lon: f64,
}

impl Coordinates {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    /// Build from a pair of nullable columns. Both must be present.
    pub fn from_parts(lat: Option<f64>, lon: Option<f64>) -> Option<Self> {
        match (lat, lon) {
            (Some(lat), Some(lon)) => Some(Self { lat, lon }),
            _ => None,
        }
    }

    pub fn distance_km(&self, other: &Coordinates) -> f64 {
        haversine_km(self, other)
    }
}

/// Great-circle distance in kilometers (haversine formula).
pub fn haversine_km(a: &Coordinates, b: &Coordinates) -> f64 {
    let lat1 = a.lat.to_radians();
    let lat2 = b.lat.to_radians();
    let dlat = (b.lat - a.lat).to_radians();
    let dlon = (b.lon - a.lon).to_radians();

    let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);

    // Rounding can push h slightly past 1 for antipodal points
    2.0 * EARTH_RADIUS_KM * h.clamp(0.0, 1.0).sqrt().asin()
}

/// Inclusive latitude interval holding every point within `radius_km` of `origin`.
///
/// A great-circle distance is never shorter than `R * |dlat|`, so anything
/// outside this band is out of range regardless of longitude. The band is
/// widened by a hair so rounding never drops a point the exact test would keep.
/// An origin off the globe gets no band, since the bound above no longer holds.
pub fn latitude_band(origin: &Coordinates, radius_km: f64) -> (f64, f64) {
    const SLACK_DEG: f64 = 1e-6;
    if !(-90.0..=90.0).contains(&origin.lat) {
        return (-90.0, 90.0);
    }
    let delta = (radius_km / EARTH_RADIUS_KM).to_degrees() + SLACK_DEG;
    (
        (origin.lat - delta).max(-90.0),
        (origin.lat + delta).min(90.0),
    )
}
