//! Database row types; these map directly to SQLite rows.
//! Kept stringly-typed at the row level; `into_*` conversions produce the
//! shared recirc-types models and treat malformed rows as storage errors.

use anyhow::{Context, Result, anyhow};
use chrono::{DateTime, Utc};
use uuid::Uuid;

use recirc_types::api::{ItemView, MessageView, RequestView};
use recirc_types::models::{
    Item, ItemStatus, Message, Notification, Request, RequestStatus, User,
};

pub struct UserRow {
    pub id: String,
    pub username: String,
    pub password: String,
    pub created_at: String,
}

impl UserRow {
    pub fn into_user(self) -> Result<User> {
        Ok(User {
            id: parse_uuid(&self.id, "user id")?,
            username: self.username,
            created_at: parse_datetime(&self.created_at)?,
        })
    }
}

pub struct ItemRow {
    pub id: String,
    pub owner_id: String,
    pub owner_username: String,
    pub title: String,
    pub description: Option<String>,
    pub location: Option<String>,
    pub image_url: Option<String>,
    pub status: String,
    pub created_at: String,
}

impl ItemRow {
    pub fn status(&self) -> Result<ItemStatus> {
        ItemStatus::from_str(&self.status)
            .ok_or_else(|| anyhow!("unknown item status '{}' on item {}", self.status, self.id))
    }

    pub fn into_item(self) -> Result<Item> {
        Ok(Item {
            status: self.status()?,
            id: parse_uuid(&self.id, "item id")?,
            owner_id: parse_uuid(&self.owner_id, "item owner_id")?,
            title: self.title,
            description: self.description,
            location: self.location,
            image_url: self.image_url,
            created_at: parse_datetime(&self.created_at)?,
        })
    }

    pub fn into_view(self) -> Result<ItemView> {
        Ok(ItemView {
            status: self.status()?,
            id: parse_uuid(&self.id, "item id")?,
            owner_id: parse_uuid(&self.owner_id, "item owner_id")?,
            owner_username: self.owner_username,
            title: self.title,
            description: self.description,
            location: self.location,
            image_url: self.image_url,
            created_at: parse_datetime(&self.created_at)?,
        })
    }
}

pub struct RequestRow {
    pub id: String,
    pub item_id: String,
    pub item_title: String,
    pub requester_id: String,
    pub requester_username: String,
    pub owner_id: String,
    pub status: String,
    pub message: Option<String>,
    pub created_at: String,
}

impl RequestRow {
    pub fn status(&self) -> Result<RequestStatus> {
        RequestStatus::from_str(&self.status).ok_or_else(|| {
            anyhow!("unknown request status '{}' on request {}", self.status, self.id)
        })
    }

    pub fn into_request(self) -> Result<Request> {
        Ok(Request {
            status: self.status()?,
            id: parse_uuid(&self.id, "request id")?,
            item_id: parse_uuid(&self.item_id, "request item_id")?,
            requester_id: parse_uuid(&self.requester_id, "request requester_id")?,
            owner_id: parse_uuid(&self.owner_id, "request owner_id")?,
            message: self.message,
            created_at: parse_datetime(&self.created_at)?,
        })
    }

    pub fn into_view(self) -> Result<RequestView> {
        Ok(RequestView {
            status: self.status()?,
            id: parse_uuid(&self.id, "request id")?,
            item_id: parse_uuid(&self.item_id, "request item_id")?,
            item_title: self.item_title,
            requester_id: parse_uuid(&self.requester_id, "request requester_id")?,
            requester_username: self.requester_username,
            owner_id: parse_uuid(&self.owner_id, "request owner_id")?,
            message: self.message,
            created_at: parse_datetime(&self.created_at)?,
        })
    }
}

pub struct MessageRow {
    pub id: String,
    pub item_id: String,
    pub sender_id: String,
    pub sender_username: String,
    pub content: String,
    pub created_at: String,
}

impl MessageRow {
    pub fn into_message(self) -> Result<Message> {
        Ok(Message {
            id: parse_uuid(&self.id, "message id")?,
            item_id: parse_uuid(&self.item_id, "message item_id")?,
            sender_id: parse_uuid(&self.sender_id, "message sender_id")?,
            content: self.content,
            created_at: parse_datetime(&self.created_at)?,
        })
    }

    pub fn into_view(self) -> Result<MessageView> {
        Ok(MessageView {
            id: parse_uuid(&self.id, "message id")?,
            item_id: parse_uuid(&self.item_id, "message item_id")?,
            sender_id: parse_uuid(&self.sender_id, "message sender_id")?,
            sender_username: self.sender_username,
            content: self.content,
            created_at: parse_datetime(&self.created_at)?,
        })
    }
}

pub struct NotificationRow {
    pub id: String,
    pub user_id: String,
    pub title: String,
    pub message: String,
    pub read: bool,
    pub created_at: String,
}

impl NotificationRow {
    pub fn into_notification(self) -> Result<Notification> {
        Ok(Notification {
            id: parse_uuid(&self.id, "notification id")?,
            user_id: parse_uuid(&self.user_id, "notification user_id")?,
            title: self.title,
            message: self.message,
            read: self.read,
            created_at: parse_datetime(&self.created_at)?,
        })
    }
}

fn parse_uuid(s: &str, what: &'static str) -> Result<Uuid> {
    s.parse().with_context(|| format!("corrupt {}: '{}'", what, s))
}

/// SQLite stores timestamps as "YYYY-MM-DD HH:MM:SS" without timezone.
/// Accept RFC 3339 too, in case rows were written with explicit instants.
fn parse_datetime(s: &str) -> Result<DateTime<Utc>> {
    s.parse::<DateTime<Utc>>()
        .or_else(|_| {
            chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").map(|ndt| ndt.and_utc())
        })
        .with_context(|| format!("corrupt timestamp: '{}'", s))
}
