use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub created_at: DateTime<Utc>,
}

/// Lifecycle status of a listed item.
///
/// `GivenAway`, `Expired` and `Deleted` are terminal; no transition
/// leaves them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ItemStatus {
    Available,
    Requested,
    GivenAway,
    Expired,
    Deleted,
}

impl ItemStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Available => "AVAILABLE",
            Self::Requested => "REQUESTED",
            Self::GivenAway => "GIVEN_AWAY",
            Self::Expired => "EXPIRED",
            Self::Deleted => "DELETED",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "AVAILABLE" => Some(Self::Available),
            "REQUESTED" => Some(Self::Requested),
            "GIVEN_AWAY" => Some(Self::GivenAway),
            "EXPIRED" => Some(Self::Expired),
            "DELETED" => Some(Self::Deleted),
            _ => None,
        }
    }

    /// Terminal statuses accept no further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::GivenAway | Self::Expired | Self::Deleted)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Item {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub location: Option<String>,
    pub image_url: Option<String>,
    pub status: ItemStatus,
    pub created_at: DateTime<Utc>,
}

/// Status of a request to receive an item.
///
/// `Rejected` and `Cancelled` are terminal. At most one request per item
/// may be `Accepted` at any time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RequestStatus {
    Pending,
    Accepted,
    Rejected,
    Cancelled,
}

impl RequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Accepted => "ACCEPTED",
            Self::Rejected => "REJECTED",
            Self::Cancelled => "CANCELLED",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "PENDING" => Some(Self::Pending),
            "ACCEPTED" => Some(Self::Accepted),
            "REJECTED" => Some(Self::Rejected),
            "CANCELLED" => Some(Self::Cancelled),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Rejected | Self::Cancelled)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    pub id: Uuid,
    pub item_id: Uuid,
    pub requester_id: Uuid,
    /// Copied from the item at creation time and never changed, so
    /// authorization checks need no join.
    pub owner_id: Uuid,
    pub status: RequestStatus,
    pub message: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub item_id: Uuid,
    pub sender_id: Uuid,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub id: Uuid,
    pub user_id: Uuid,
    pub title: String,
    pub message: String,
    pub read: bool,
    pub created_at: DateTime<Utc>,
}

/// Derived chat scope between an item's owner and its currently accepted
/// requester. Never persisted: it is recomputed from the item plus its
/// ACCEPTED request on every access, so revoking the acceptance
/// invalidates the channel with no teardown step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Channel {
    pub item_id: Uuid,
    pub owner_id: Uuid,
    pub requester_id: Uuid,
}

impl Channel {
    pub fn participants(&self) -> [Uuid; 2] {
        [self.owner_id, self.requester_id]
    }

    pub fn is_participant(&self, user_id: Uuid) -> bool {
        user_id == self.owner_id || user_id == self.requester_id
    }
}
