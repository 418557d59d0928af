use std::cmp::Ordering;

use crate::db::models::Listing;
use crate::search::filter::Proximity;

/// A listing that survived filtering, with its distance when a location was given.
#[derive(Debug, Clone, PartialEq)]
pub struct Ranked {
    pub listing: Listing,
    pub distance_km: Option<f64>,
}

/// Apply the exact radius test and the final ordering.
///
/// With a location: listings lacking coordinates or farther than the radius
/// are dropped, the rest ordered by distance ascending then id descending.
/// Without: id descending.
pub fn rank(listings: Vec<Listing>, proximity: Option<&Proximity>) -> Vec<Ranked> {
    let mut ranked: Vec<Ranked> = match proximity {
        Some(proximity) => listings
            .into_iter()
            .filter_map(|listing| {
                let distance = proximity.contains(&listing.coordinates()?)?;
                Some(Ranked {
                    listing,
                    distance_km: Some(distance),
                })
            })
            .collect(),
        None => listings
            .into_iter()
            .map(|listing| Ranked {
                listing,
                distance_km: None,
            })
            .collect(),
    };

    ranked.sort_by(by_distance_then_newest);
    ranked
}

fn by_distance_then_newest(a: &Ranked, b: &Ranked) -> Ordering {
    let by_distance = match (a.distance_km, b.distance_km) {
        (Some(da), Some(db)) => da.total_cmp(&db),
        _ => Ordering::Equal,
    };
    by_distance.then_with(|| b.listing.id.cmp(&a.listing.id))
}
