// Data source seam - the engines only ever read through this trait
pub mod sqlite;

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::db::models::{
    Category, CategoryId, Chat, ChatId, Listing, ListingId, ListingImage, ListingPreview,
    MessagePreview, UserId, UserRef,
};

pub use sqlite::SqliteSource;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("Database error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("SQL error: {0}")]
    Sql(#[from] rusqlite::Error),

    #[error("Malformed row: {0}")]
    Malformed(String),

    #[error("Query {op} timed out after {after:?}")]
    Timeout { op: &'static str, after: Duration },

    #[error("Query {op} was cancelled: {reason}")]
    Cancelled { op: &'static str, reason: String },
}

/// Predicates pushed down to storage for a listing search.
///
/// `status = 'active'` is always applied. The latitude band is a coarse
/// prefilter only; callers must still apply the exact distance test.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ListingQuery {
    pub text: Option<String>,
    pub category_id: Option<CategoryId>,
    /// Inclusive `(min, max)` latitude. Implies both coordinates are non-null.
    pub latitude_band: Option<(f64, f64)>,
}

#[async_trait]
pub trait DataSource: Send + Sync {
    /// Active listings matching the pushed-down predicates.
    async fn active_listings(&self, query: &ListingQuery) -> Result<Vec<Listing>, SourceError>;

    /// Any listing by id, regardless of status.
    async fn listing(&self, id: ListingId) -> Result<Option<Listing>, SourceError>;

    /// Every image of the given listings, ordered by `sort_order`, then id.
    async fn images_for(&self, listing_ids: &[ListingId])
        -> Result<Vec<ListingImage>, SourceError>;

    async fn categories(&self, ids: &[CategoryId]) -> Result<Vec<Category>, SourceError>;

    async fn users(&self, ids: &[UserId]) -> Result<Vec<UserRef>, SourceError>;

    /// Chats where `viewer` is buyer or seller, blocked ones included.
    async fn chats_for(&self, viewer: UserId) -> Result<Vec<Chat>, SourceError>;

    /// Per chat: messages not sent by `viewer` with no `read_at`.
    /// Chats without unread messages may be absent from the map.
    async fn unread_counts(
        &self,
        viewer: UserId,
        chat_ids: &[ChatId],
    ) -> Result<HashMap<ChatId, u64>, SourceError>;

    /// Per chat: the newest message by `created_at`, then id. Empty chats are absent.
    async fn last_messages(
        &self,
        chat_ids: &[ChatId],
    ) -> Result<HashMap<ChatId, MessagePreview>, SourceError>;

    /// Listing cards with at most one image (lowest `sort_order`), any status.
    async fn listing_previews(
        &self,
        ids: &[ListingId],
    ) -> Result<Vec<ListingPreview>, SourceError>;
}

/// Type alias for Arc-wrapped data source (for AppState)
pub type DynDataSource = Arc<dyn DataSource>;

/// Sorted, de-duplicated ids for an `IN (...)` lookup.
pub fn distinct_ids(ids: impl IntoIterator<Item = i64>) -> Vec<i64> {
    let mut ids: Vec<i64> = ids.into_iter().collect();
    ids.sort_unstable();
    ids.dedup();
    ids
}
