use chrono::{DateTime, Utc};
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::HashMap;

use crate::db::models::{
    Chat, ChatId, ListingId, ListingPreview, MessagePreview, UserId, UserRef,
};
use crate::error::AppResult;
use crate::source::{distinct_ids, DynDataSource};

/// One row of a viewer's inbox.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConversationSummary {
    pub id: String,
    pub unread_count: u64,
    pub last_message: Option<MessagePreview>,
    pub listing: Option<ListingPreview>,
    pub buyer: Option<UserRef>,
    pub seller: Option<UserRef>,
    pub last_message_at: Option<DateTime<Utc>>,
    pub is_blocked: bool,
}

pub struct InboxAggregator {
    source: DynDataSource,
}

impl InboxAggregator {
    pub fn new(source: DynDataSource) -> Self {
        Self { source }
    }

    /// Every conversation the viewer takes part in, newest activity first.
    ///
    /// Order comes from the chat's stored `last_message_at`; the preview is
    /// read separately and is not used to reorder.
    pub async fn list_inbox(&self, viewer: UserId) -> AppResult<Vec<ConversationSummary>> {
        let mut chats = self.source.chats_for(viewer).await?;
        if chats.is_empty() {
            return Ok(Vec::new());
        }
        chats.sort_by(by_recency);

        let chat_ids: Vec<ChatId> = chats.iter().map(|c| c.id).collect();
        let listing_ids = distinct_ids(chats.iter().map(|c| c.listing_id));
        let user_ids = distinct_ids(
            chats
                .iter()
                .flat_map(|c| [c.buyer_user_id, c.seller_user_id]),
        );

        let (unread, mut latest, listings, users) = futures::try_join!(
            self.source.unread_counts(viewer, &chat_ids),
            self.source.last_messages(&chat_ids),
            self.source.listing_previews(&listing_ids),
            self.source.users(&user_ids),
        )?;

        let listings: HashMap<ListingId, ListingPreview> =
            listings.into_iter().map(|l| (l.id, l)).collect();
        let users: HashMap<UserId, UserRef> = users.into_iter().map(|u| (u.id, u)).collect();

        tracing::debug!("Inbox for user {}: {} conversations", viewer, chats.len());

        Ok(chats
            .into_iter()
            .map(|chat| {
                let last_message = latest.remove(&chat.id);
                warn_if_stale(&chat, last_message.as_ref());
                ConversationSummary {
                    id: chat.id.to_string(),
                    unread_count: unread.get(&chat.id).copied().unwrap_or(0),
                    last_message,
                    listing: listings.get(&chat.listing_id).cloned(),
                    buyer: users.get(&chat.buyer_user_id).cloned(),
                    seller: users.get(&chat.seller_user_id).cloned(),
                    last_message_at: chat.last_message_at,
                    is_blocked: chat.is_blocked,
                }
            })
            .collect())
    }
}

/// `last_message_at` descending, id descending. A missing timestamp sorts
/// first, the way PostgreSQL orders NULLs under `DESC`. SQLite would put them
/// last, so the order is applied here rather than in SQL.
pub fn by_recency(a: &Chat, b: &Chat) -> Ordering {
    let by_time = match (a.last_message_at, b.last_message_at) {
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (x, y) => y.cmp(&x),
    };
    by_time.then_with(|| b.id.cmp(&a.id))
}

// The two reads can disagree after a partial write on the send path. Report it, never patch it.
fn warn_if_stale(chat: &Chat, last_message: Option<&MessagePreview>) {
    let Some(message) = last_message else {
        return;
    };
    let stale = match chat.last_message_at {
        Some(at) => message.created_at > at,
        None => true,
    };
    if stale {
        tracing::warn!(
            "Chat {} last_message_at {:?} is older than its newest message ({})",
            chat.id,
            chat.last_message_at,
            message.created_at
        );
    }
}
