pub mod filter;
pub mod rank;
pub mod text;

use serde::Serialize;
use std::collections::HashMap;

use crate::db::models::{Category, Listing, ListingId, ListingImage, UserRef};
use crate::error::{AppError, AppResult};
use crate::source::{distinct_ids, DynDataSource};

pub use filter::{BrowseParams, Proximity, SearchFilter, SearchParams, DEFAULT_RADIUS_KM};
pub use rank::Ranked;

/// A listing as returned by browse, search and detail.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ListingSummary {
    #[serde(flatten)]
    pub listing: Listing,
    /// Present only when the request carried a location.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub distance_km: Option<f64>,
    pub images: Vec<ListingImage>,
    pub category: Option<Category>,
    /// Capitalized on the wire; listing clients read the key as `Seller`.
    #[serde(rename = "Seller")]
    pub seller: Option<UserRef>,
}

/// Distance-bounded, text-filtered listing search.
pub struct GeoTextRankEngine {
    source: DynDataSource,
}

impl GeoTextRankEngine {
    pub fn new(source: DynDataSource) -> Self {
        Self { source }
    }

    /// Browse: every filter optional.
    pub async fn search(&self, filter: &SearchFilter) -> AppResult<Vec<ListingSummary>> {
        let candidates = self.source.active_listings(&filter.to_query()).await?;
        let candidate_count = candidates.len();
        let ranked = rank::rank(candidates, filter.proximity.as_ref());

        tracing::debug!(
            "Listing search kept {} of {} candidates (text: {:?}, category: {:?}, located: {})",
            ranked.len(),
            candidate_count,
            filter.text,
            filter.category_id,
            filter.proximity.is_some()
        );

        self.enrich(ranked).await
    }

    /// Search: text and location are both mandatory.
    pub async fn search_mandatory(&self, filter: &SearchFilter) -> AppResult<Vec<ListingSummary>> {
        if filter.text.is_none() {
            return Err(AppError::Validation("q is required".into()));
        }
        if filter.proximity.is_none() {
            return Err(AppError::Validation("lat and lon are required".into()));
        }
        self.search(filter).await
    }

    /// Single listing of any status, enriched like a search result.
    pub async fn listing(&self, id: ListingId) -> AppResult<ListingSummary> {
        let listing = self.source.listing(id).await?.ok_or(AppError::NotFound)?;
        let ranked = vec![Ranked {
            listing,
            distance_km: None,
        }];
        self.enrich(ranked)
            .await?
            .pop()
            .ok_or_else(|| AppError::Internal(format!("listing {id} vanished during enrichment")))
    }

    /// All images of a listing in display order. Unknown listings have none.
    pub async fn listing_images(&self, id: ListingId) -> AppResult<Vec<ListingImage>> {
        Ok(self.source.images_for(&[id]).await?)
    }

    async fn enrich(&self, ranked: Vec<Ranked>) -> AppResult<Vec<ListingSummary>> {
        if ranked.is_empty() {
            return Ok(Vec::new());
        }

        let listing_ids: Vec<ListingId> = ranked.iter().map(|r| r.listing.id).collect();
        let category_ids = distinct_ids(ranked.iter().filter_map(|r| r.listing.category_id));
        let seller_ids = distinct_ids(ranked.iter().map(|r| r.listing.seller_user_id));

        let (images, categories, sellers) = futures::try_join!(
            self.source.images_for(&listing_ids),
            self.source.categories(&category_ids),
            self.source.users(&seller_ids),
        )?;

        let mut images_by_listing: HashMap<ListingId, Vec<ListingImage>> = HashMap::new();
        for image in images {
            images_by_listing
                .entry(image.listing_id)
                .or_default()
                .push(image);
        }
        let categories: HashMap<_, _> = categories.into_iter().map(|c| (c.id, c)).collect();
        let sellers: HashMap<_, _> = sellers.into_iter().map(|u| (u.id, u)).collect();

        Ok(ranked
            .into_iter()
            .map(|Ranked { listing, distance_km }| ListingSummary {
                images: images_by_listing.remove(&listing.id).unwrap_or_default(),
                category: listing
                    .category_id
                    .and_then(|id| categories.get(&id).cloned()),
                seller: sellers.get(&listing.seller_user_id).cloned(),
                distance_km,
                listing,
            })
            .collect())
    }
}
