//! Query layer. The free functions take a plain `&Connection` so the core
//! state machine can compose several of them inside one transaction; the
//! `Database` methods are single-shot conveniences for route handlers.

use anyhow::{Result, anyhow};
use rusqlite::{Connection, OptionalExtension, params};

use recirc_types::models::{ItemStatus, RequestStatus};

use crate::Database;
use crate::models::{ItemRow, MessageRow, NotificationRow, RequestRow, UserRow};

// -- Users --

pub fn insert_user(conn: &Connection, id: &str, username: &str, password_hash: &str) -> Result<()> {
    conn.execute(
        "INSERT INTO users (id, username, password) VALUES (?1, ?2, ?3)",
        (id, username, password_hash),
    )?;
    Ok(())
}

pub fn user_by_username(conn: &Connection, username: &str) -> Result<Option<UserRow>> {
    let row = conn
        .query_row(
            "SELECT id, username, password, created_at FROM users WHERE username = ?1",
            [username],
            user_from_row,
        )
        .optional()?;
    Ok(row)
}

pub fn user_by_id(conn: &Connection, id: &str) -> Result<Option<UserRow>> {
    let row = conn
        .query_row(
            "SELECT id, username, password, created_at FROM users WHERE id = ?1",
            [id],
            user_from_row,
        )
        .optional()?;
    Ok(row)
}

fn user_from_row(row: &rusqlite::Row) -> rusqlite::Result<UserRow> {
    Ok(UserRow {
        id: row.get(0)?,
        username: row.get(1)?,
        password: row.get(2)?,
        created_at: row.get(3)?,
    })
}

// -- Items --

const ITEM_SELECT: &str = "
    SELECT i.id, i.owner_id, COALESCE(u.username, 'unknown'),
           i.title, i.description, i.location, i.image_url,
           i.status, i.created_at
    FROM items i
    LEFT JOIN users u ON i.owner_id = u.id";

pub fn insert_item(
    conn: &Connection,
    id: &str,
    owner_id: &str,
    title: &str,
    description: Option<&str>,
    location: Option<&str>,
    image_url: Option<&str>,
) -> Result<()> {
    conn.execute(
        "INSERT INTO items (id, owner_id, title, description, location, image_url)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![id, owner_id, title, description, location, image_url],
    )?;
    Ok(())
}

pub fn item_by_id(conn: &Connection, id: &str) -> Result<Option<ItemRow>> {
    let sql = format!("{} WHERE i.id = ?1", ITEM_SELECT);
    let row = conn.query_row(&sql, [id], item_from_row).optional()?;
    Ok(row)
}

/// Item feed listing: soft-deleted items are never shown. `search` does a
/// substring match on the title; `location` is an exact match.
pub fn list_items(
    conn: &Connection,
    search: Option<&str>,
    location: Option<&str>,
) -> Result<Vec<ItemRow>> {
    let sql = format!(
        "{} WHERE i.status != 'DELETED'
            AND (?1 IS NULL OR i.title LIKE '%' || ?1 || '%')
            AND (?2 IS NULL OR i.location = ?2)
          ORDER BY i.created_at DESC",
        ITEM_SELECT
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params![search, location], item_from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Partial field update; `None` leaves the column untouched. Ownership and
/// status are not updatable through this path.
pub fn update_item_fields(
    conn: &Connection,
    id: &str,
    title: Option<&str>,
    description: Option<&str>,
    location: Option<&str>,
    image_url: Option<&str>,
) -> Result<usize> {
    let n = conn.execute(
        "UPDATE items SET
            title = COALESCE(?2, title),
            description = COALESCE(?3, description),
            location = COALESCE(?4, location),
            image_url = COALESCE(?5, image_url)
         WHERE id = ?1",
        params![id, title, description, location, image_url],
    )?;
    Ok(n)
}

pub fn set_item_status(conn: &Connection, id: &str, status: ItemStatus) -> Result<usize> {
    let n = conn.execute(
        "UPDATE items SET status = ?2 WHERE id = ?1",
        params![id, status.as_str()],
    )?;
    Ok(n)
}

fn item_from_row(row: &rusqlite::Row) -> rusqlite::Result<ItemRow> {
    Ok(ItemRow {
        id: row.get(0)?,
        owner_id: row.get(1)?,
        owner_username: row.get(2)?,
        title: row.get(3)?,
        description: row.get(4)?,
        location: row.get(5)?,
        image_url: row.get(6)?,
        status: row.get(7)?,
        created_at: row.get(8)?,
    })
}

// -- Requests --

const REQUEST_SELECT: &str = "
    SELECT r.id, r.item_id, COALESCE(i.title, ''),
           r.requester_id, COALESCE(u.username, 'unknown'),
           r.owner_id, r.status, r.message, r.created_at
    FROM requests r
    LEFT JOIN items i ON r.item_id = i.id
    LEFT JOIN users u ON r.requester_id = u.id";

pub fn insert_request(
    conn: &Connection,
    id: &str,
    item_id: &str,
    requester_id: &str,
    owner_id: &str,
    message: Option<&str>,
) -> Result<()> {
    conn.execute(
        "INSERT INTO requests (id, item_id, requester_id, owner_id, message)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![id, item_id, requester_id, owner_id, message],
    )?;
    Ok(())
}

pub fn request_by_id(conn: &Connection, id: &str) -> Result<Option<RequestRow>> {
    let sql = format!("{} WHERE r.id = ?1", REQUEST_SELECT);
    let row = conn.query_row(&sql, [id], request_from_row).optional()?;
    Ok(row)
}

pub fn requests_for_item(conn: &Connection, item_id: &str) -> Result<Vec<RequestRow>> {
    query_requests(
        conn,
        &format!("{} WHERE r.item_id = ?1 ORDER BY r.created_at ASC", REQUEST_SELECT),
        item_id,
    )
}

pub fn requests_by_requester(conn: &Connection, requester_id: &str) -> Result<Vec<RequestRow>> {
    query_requests(
        conn,
        &format!("{} WHERE r.requester_id = ?1 ORDER BY r.created_at DESC", REQUEST_SELECT),
        requester_id,
    )
}

pub fn requests_by_owner(conn: &Connection, owner_id: &str) -> Result<Vec<RequestRow>> {
    query_requests(
        conn,
        &format!("{} WHERE r.owner_id = ?1 ORDER BY r.created_at DESC", REQUEST_SELECT),
        owner_id,
    )
}

/// The request that currently defines the item's chat channel, if any.
/// The single-accepted invariant makes LIMIT 1 exact, not a tiebreak.
pub fn accepted_request_for_item(conn: &Connection, item_id: &str) -> Result<Option<RequestRow>> {
    let sql = format!(
        "{} WHERE r.item_id = ?1 AND r.status = 'ACCEPTED' LIMIT 1",
        REQUEST_SELECT
    );
    let row = conn.query_row(&sql, [item_id], request_from_row).optional()?;
    Ok(row)
}

pub fn pending_requests_for_item_except(
    conn: &Connection,
    item_id: &str,
    except_id: &str,
) -> Result<Vec<RequestRow>> {
    let sql = format!(
        "{} WHERE r.item_id = ?1 AND r.id != ?2 AND r.status = 'PENDING'",
        REQUEST_SELECT
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params![item_id, except_id], request_from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn set_request_status(conn: &Connection, id: &str, status: RequestStatus) -> Result<usize> {
    let n = conn.execute(
        "UPDATE requests SET status = ?2 WHERE id = ?1",
        params![id, status.as_str()],
    )?;
    Ok(n)
}

/// Demote every still-PENDING sibling of an accepted request.
pub fn reject_pending_for_item(conn: &Connection, item_id: &str, except_id: &str) -> Result<usize> {
    let n = conn.execute(
        "UPDATE requests SET status = 'REJECTED'
         WHERE item_id = ?1 AND id != ?2 AND status = 'PENDING'",
        params![item_id, except_id],
    )?;
    Ok(n)
}

fn query_requests(conn: &Connection, sql: &str, key: &str) -> Result<Vec<RequestRow>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map([key], request_from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

fn request_from_row(row: &rusqlite::Row) -> rusqlite::Result<RequestRow> {
    Ok(RequestRow {
        id: row.get(0)?,
        item_id: row.get(1)?,
        item_title: row.get(2)?,
        requester_id: row.get(3)?,
        requester_username: row.get(4)?,
        owner_id: row.get(5)?,
        status: row.get(6)?,
        message: row.get(7)?,
        created_at: row.get(8)?,
    })
}

// -- Messages --

const MESSAGE_SELECT: &str = "
    SELECT m.id, m.item_id, m.sender_id, COALESCE(u.username, 'unknown'),
           m.content, m.created_at
    FROM messages m
    LEFT JOIN users u ON m.sender_id = u.id";

pub fn insert_message(
    conn: &Connection,
    id: &str,
    item_id: &str,
    sender_id: &str,
    content: &str,
) -> Result<()> {
    conn.execute(
        "INSERT INTO messages (id, item_id, sender_id, content) VALUES (?1, ?2, ?3, ?4)",
        params![id, item_id, sender_id, content],
    )?;
    Ok(())
}

pub fn message_by_id(conn: &Connection, id: &str) -> Result<Option<MessageRow>> {
    let sql = format!("{} WHERE m.id = ?1", MESSAGE_SELECT);
    let row = conn.query_row(&sql, [id], message_from_row).optional()?;
    Ok(row)
}

/// Cursor-based pagination: pass the `created_at` of the oldest message
/// from the previous page as `before` to fetch older history. Rows come
/// back newest-first; callers reverse for display order.
pub fn messages_for_item(
    conn: &Connection,
    item_id: &str,
    limit: u32,
    before: Option<&str>,
) -> Result<Vec<MessageRow>> {
    let sql = format!(
        "{} WHERE m.item_id = ?1 AND (?3 IS NULL OR m.created_at < ?3)
          ORDER BY m.created_at DESC, m.rowid DESC
          LIMIT ?2",
        MESSAGE_SELECT
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params![item_id, limit, before], message_from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

fn message_from_row(row: &rusqlite::Row) -> rusqlite::Result<MessageRow> {
    Ok(MessageRow {
        id: row.get(0)?,
        item_id: row.get(1)?,
        sender_id: row.get(2)?,
        sender_username: row.get(3)?,
        content: row.get(4)?,
        created_at: row.get(5)?,
    })
}

// -- Notifications --

pub fn insert_notification(
    conn: &Connection,
    id: &str,
    user_id: &str,
    title: &str,
    message: &str,
) -> Result<()> {
    conn.execute(
        "INSERT INTO notifications (id, user_id, title, message) VALUES (?1, ?2, ?3, ?4)",
        params![id, user_id, title, message],
    )?;
    Ok(())
}

pub fn notification_by_id(conn: &Connection, id: &str) -> Result<Option<NotificationRow>> {
    let row = conn
        .query_row(
            "SELECT id, user_id, title, message, read, created_at
             FROM notifications WHERE id = ?1",
            [id],
            notification_from_row,
        )
        .optional()?;
    Ok(row)
}

pub fn notifications_for_user(conn: &Connection, user_id: &str) -> Result<Vec<NotificationRow>> {
    let mut stmt = conn.prepare(
        "SELECT id, user_id, title, message, read, created_at
         FROM notifications WHERE user_id = ?1
         ORDER BY created_at DESC",
    )?;
    let rows = stmt
        .query_map([user_id], notification_from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn mark_notification_read(conn: &Connection, id: &str) -> Result<usize> {
    let n = conn.execute("UPDATE notifications SET read = 1 WHERE id = ?1", [id])?;
    Ok(n)
}

pub fn delete_notification(conn: &Connection, id: &str) -> Result<usize> {
    let n = conn.execute("DELETE FROM notifications WHERE id = ?1", [id])?;
    Ok(n)
}

fn notification_from_row(row: &rusqlite::Row) -> rusqlite::Result<NotificationRow> {
    Ok(NotificationRow {
        id: row.get(0)?,
        user_id: row.get(1)?,
        title: row.get(2)?,
        message: row.get(3)?,
        read: row.get(4)?,
        created_at: row.get(5)?,
    })
}

// -- Database conveniences for single-shot handler access --

impl Database {
    pub fn create_user(&self, id: &str, username: &str, password_hash: &str) -> Result<()> {
        self.with_conn(|conn| insert_user(conn, id, username, password_hash))
    }

    pub fn get_user_by_username(&self, username: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| user_by_username(conn, username))
    }

    pub fn get_user_by_id(&self, id: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| user_by_id(conn, id))
    }

    pub fn create_item(
        &self,
        id: &str,
        owner_id: &str,
        title: &str,
        description: Option<&str>,
        location: Option<&str>,
        image_url: Option<&str>,
    ) -> Result<ItemRow> {
        self.with_conn(|conn| {
            insert_item(conn, id, owner_id, title, description, location, image_url)?;
            item_by_id(conn, id)?.ok_or_else(|| anyhow!("item {} vanished after insert", id))
        })
    }

    pub fn get_item(&self, id: &str) -> Result<Option<ItemRow>> {
        self.with_conn(|conn| item_by_id(conn, id))
    }

    pub fn list_items(&self, search: Option<&str>, location: Option<&str>) -> Result<Vec<ItemRow>> {
        self.with_conn(|conn| list_items(conn, search, location))
    }

    pub fn update_item(
        &self,
        id: &str,
        title: Option<&str>,
        description: Option<&str>,
        location: Option<&str>,
        image_url: Option<&str>,
    ) -> Result<Option<ItemRow>> {
        self.with_conn(|conn| {
            update_item_fields(conn, id, title, description, location, image_url)?;
            item_by_id(conn, id)
        })
    }

    pub fn set_item_status(&self, id: &str, status: ItemStatus) -> Result<usize> {
        self.with_conn(|conn| set_item_status(conn, id, status))
    }

    pub fn sent_requests(&self, requester_id: &str) -> Result<Vec<RequestRow>> {
        self.with_conn(|conn| requests_by_requester(conn, requester_id))
    }

    pub fn received_requests(&self, owner_id: &str) -> Result<Vec<RequestRow>> {
        self.with_conn(|conn| requests_by_owner(conn, owner_id))
    }

    pub fn item_requests(&self, item_id: &str) -> Result<Vec<RequestRow>> {
        self.with_conn(|conn| requests_for_item(conn, item_id))
    }

    pub fn create_notification(
        &self,
        id: &str,
        user_id: &str,
        title: &str,
        message: &str,
    ) -> Result<NotificationRow> {
        self.with_conn(|conn| {
            insert_notification(conn, id, user_id, title, message)?;
            notification_by_id(conn, id)?
                .ok_or_else(|| anyhow!("notification {} vanished after insert", id))
        })
    }

    pub fn get_notification(&self, id: &str) -> Result<Option<NotificationRow>> {
        self.with_conn(|conn| notification_by_id(conn, id))
    }

    pub fn notifications_for(&self, user_id: &str) -> Result<Vec<NotificationRow>> {
        self.with_conn(|conn| notifications_for_user(conn, user_id))
    }

    pub fn mark_notification_read(&self, id: &str) -> Result<usize> {
        self.with_conn(|conn| mark_notification_read(conn, id))
    }

    pub fn delete_notification(&self, id: &str) -> Result<usize> {
        self.with_conn(|conn| delete_notification(conn, id))
    }
}
