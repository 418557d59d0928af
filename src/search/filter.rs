use serde::Deserialize;

use crate::db::models::CategoryId;
use crate::error::{AppError, AppResult};
use crate::geo::{latitude_band, Coordinates};
use crate::search::text::normalize_query;
use crate::source::ListingQuery;

pub const DEFAULT_RADIUS_KM: f64 = 10.0;

/// Raw query string of the browse endpoint. Every field is optional.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BrowseParams {
    pub q: Option<String>,
    pub lat: Option<String>,
    pub lon: Option<String>,
    pub radius_km: Option<String>,
    pub category_id: Option<String>,
}

/// Raw query string of the search endpoint: `q`, `lat` and `lon` are required.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SearchParams {
    pub q: Option<String>,
    pub lat: Option<String>,
    pub lon: Option<String>,
    pub radius_km: Option<String>,
}

/// Search origin plus inclusive radius.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Proximity {
    pub origin: Coordinates,
    pub radius_km: f64,
}

impl Proximity {
    pub fn contains(&self, point: &Coordinates) -> Option<f64> {
        let distance = self.origin.distance_km(point);
        (distance <= self.radius_km).then_some(distance)
    }
}

/// The complete set of recognized listing filters.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchFilter {
    pub text: Option<String>,
    pub proximity: Option<Proximity>,
    pub category_id: Option<CategoryId>,
}

impl SearchFilter {
    /// Predicates that can be evaluated by storage.
    pub fn to_query(&self) -> ListingQuery {
        ListingQuery {
            text: self.text.clone(),
            category_id: self.category_id,
            latitude_band: self
                .proximity
                .map(|p| latitude_band(&p.origin, p.radius_km)),
        }
    }
}

impl BrowseParams {
    pub fn into_filter(self, default_radius_km: f64) -> AppResult<SearchFilter> {
        let proximity = parse_proximity(
            self.lat.as_deref(),
            self.lon.as_deref(),
            self.radius_km.as_deref(),
            default_radius_km,
        )?;

        Ok(SearchFilter {
            text: normalize_query(self.q.as_deref()),
            proximity,
            category_id: parse_category(self.category_id.as_deref()),
        })
    }
}

impl SearchParams {
    pub fn into_filter(self, default_radius_km: f64) -> AppResult<SearchFilter> {
        let text = normalize_query(self.q.as_deref())
            .ok_or_else(|| AppError::Validation("q is required".into()))?;

        let proximity = parse_proximity(
            self.lat.as_deref(),
            self.lon.as_deref(),
            self.radius_km.as_deref(),
            default_radius_km,
        )?
        .ok_or_else(|| AppError::Validation("lat and lon are required".into()))?;

        Ok(SearchFilter {
            text: Some(text),
            proximity: Some(proximity),
            category_id: None,
        })
    }
}

fn present(raw: Option<&str>) -> Option<&str> {
    raw.map(str::trim).filter(|s| !s.is_empty())
}

fn parse_number(name: &str, raw: Option<&str>) -> AppResult<Option<f64>> {
    let Some(raw) = present(raw) else {
        return Ok(None);
    };
    match raw.parse::<f64>() {
        Ok(value) if value.is_finite() => Ok(Some(value)),
        _ => Err(AppError::Validation(format!("{name} must be a number"))),
    }
}

/// A location needs both coordinates; with either one missing the request is
/// treated as unlocated. Out-of-range coordinates and negative radii are not
/// rejected: they simply match whatever the distance test lets through.
fn parse_proximity(
    lat: Option<&str>,
    lon: Option<&str>,
    radius_km: Option<&str>,
    default_radius_km: f64,
) -> AppResult<Option<Proximity>> {
    let lat = parse_number("lat", lat)?;
    let lon = parse_number("lon", lon)?;
    let radius_km = parse_number("radius_km", radius_km)?.unwrap_or(default_radius_km);

    Ok(lat.zip(lon).map(|(lat, lon)| Proximity {
        origin: Coordinates::new(lat, lon),
        radius_km,
    }))
}

/// Anything but a positive integer is ignored rather than rejected.
fn parse_category(raw: Option<&str>) -> Option<CategoryId> {
    present(raw)?
        .parse::<CategoryId>()
        .ok()
        .filter(|id| *id > 0)
}
