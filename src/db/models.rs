use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::geo::Coordinates;

pub type UserId = i64;
pub type ListingId = i64;
pub type CategoryId = i64;
pub type ChatId = i64;

pub const STATUS_ACTIVE: &str = "active";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Listing {
    pub id: ListingId,
    pub seller_user_id: UserId,
    pub title: String,
    pub description: Option<String>,
    pub price: f64,
    pub category_id: Option<CategoryId>,
    pub city: Option<String>,
    pub lat_approx: Option<f64>,
    pub lon_approx: Option<f64>,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Listing {
    pub fn coordinates(&self) -> Option<Coordinates> {
        Coordinates::from_parts(self.lat_approx, self.lon_approx)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListingImage {
    pub id: i64,
    #[serde(skip)]
    pub listing_id: ListingId,
    pub url: String,
    pub sort_order: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub id: CategoryId,
    pub name: String,
}

/// Minimal identity projection; credentials never leave the auth collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRef {
    pub id: UserId,
    pub full_name: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Chat {
    pub id: ChatId,
    pub listing_id: ListingId,
    pub buyer_user_id: UserId,
    pub seller_user_id: UserId,
    /// Maintained by the message-send path, trusted as the inbox ordering key.
    pub last_message_at: Option<DateTime<Utc>>,
    pub is_blocked: bool,
    pub blocked_reason: Option<String>,
    pub blocked_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    Text,
    Image,
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MessageKind::Text => "text",
            MessageKind::Image => "image",
        };
        write!(f, "{s}")
    }
}

impl FromStr for MessageKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "text" => Ok(MessageKind::Text),
            "image" => Ok(MessageKind::Image),
            other => Err(format!("unknown message type: {other}")),
        }
    }
}

/// Projection of the newest message in a chat.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessagePreview {
    #[serde(skip)]
    pub id: i64,
    #[serde(rename = "type")]
    pub kind: MessageKind,
    pub text: Option<String>,
    pub image_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageUrl {
    pub url: String,
}

/// Listing card shown next to a conversation: one thumbnail at most.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListingPreview {
    pub id: ListingId,
    pub title: String,
    pub price: f64,
    pub city: Option<String>,
    pub images: Vec<ImageUrl>,
}
