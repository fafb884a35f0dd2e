//! Chat authorization resolver.
//!
//! Channel membership is derived, never stored: every read, write and
//! room-join recomputes the channel from the item plus its currently
//! ACCEPTED request. There is no cached grant to go stale: cancelling an
//! acceptance makes the channel stop resolving on the very next access.

use rusqlite::Connection;
use uuid::Uuid;

use recirc_db::{Database, queries};
use recirc_types::api::MessageView;
use recirc_types::models::Channel;

use crate::error::{Error, Result};

pub const HISTORY_MAX_LIMIT: u32 = 200;

/// Connection-level resolver, composable inside a transaction.
pub fn channel_for_item(conn: &Connection, item_id: &str) -> anyhow::Result<Option<Channel>> {
    let Some(item) = queries::item_by_id(conn, item_id)? else {
        return Ok(None);
    };
    let Some(accepted) = queries::accepted_request_for_item(conn, item_id)? else {
        return Ok(None);
    };
    let item = item.into_item()?;
    let accepted = accepted.into_request()?;
    Ok(Some(Channel {
        item_id: item.id,
        owner_id: item.owner_id,
        requester_id: accepted.requester_id,
    }))
}

/// `None` means the chat is unconditionally unavailable, regardless of any
/// message history the item may have from a past acceptance.
pub fn resolve_channel(db: &Database, item_id: Uuid) -> Result<Option<Channel>> {
    db.with_conn(|conn| channel_for_item(conn, &item_id.to_string()).map_err(Error::from))
}

pub fn can_access(db: &Database, item_id: Uuid, user_id: Uuid) -> Result<bool> {
    Ok(resolve_channel(db, item_id)?.is_some_and(|ch| ch.is_participant(user_id)))
}

/// Store a chat message. The sender is re-validated against the freshly
/// resolved channel inside the same transaction as the insert, so an
/// acceptance change between an earlier access check and this write
/// cannot slip a message through.
pub fn send_message(
    db: &Database,
    item_id: Uuid,
    sender_id: Uuid,
    content: &str,
) -> Result<MessageView> {
    if content.trim().is_empty() {
        return Err(Error::Validation("message content is required"));
    }

    db.with_conn_mut(|conn| {
        let tx = conn.transaction()?;

        let key = item_id.to_string();
        if queries::item_by_id(&tx, &key)?.is_none() {
            return Err(Error::NotFound("item"));
        }
        let channel = channel_for_item(&tx, &key)?
            .ok_or(Error::InvalidState("chat is not available for this item"))?;
        if !channel.is_participant(sender_id) {
            return Err(Error::Unauthorized("not a participant in this chat"));
        }

        let id = Uuid::new_v4();
        queries::insert_message(&tx, &id.to_string(), &key, &sender_id.to_string(), content)?;
        let message = queries::message_by_id(&tx, &id.to_string())?
            .ok_or_else(|| Error::Storage(anyhow::anyhow!("message {} vanished mid-transaction", id)))?
            .into_view()?;

        tx.commit()?;
        Ok(message)
    })
}

/// Paginated history for a channel participant, oldest-first within the
/// page. `before` is the created_at cursor of the previous page's oldest
/// message.
pub fn message_history(
    db: &Database,
    item_id: Uuid,
    user_id: Uuid,
    limit: u32,
    before: Option<&str>,
) -> Result<Vec<MessageView>> {
    db.with_conn(|conn| {
        let key = item_id.to_string();
        if queries::item_by_id(conn, &key)?.is_none() {
            return Err(Error::NotFound("item"));
        }
        let channel = channel_for_item(conn, &key)?
            .ok_or(Error::InvalidState("chat is not available for this item"))?;
        if !channel.is_participant(user_id) {
            return Err(Error::Unauthorized("not a participant in this chat"));
        }

        let limit = limit.clamp(1, HISTORY_MAX_LIMIT);
        let mut rows = queries::messages_for_item(conn, &key, limit, before)?;
        rows.reverse(); // stored newest-first, served oldest-first
        rows.into_iter()
            .map(|r| r.into_view().map_err(Error::from))
            .collect()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exchange::{accept_request, cancel_request, create_request};
    use crate::testutil::{fresh_db, seed_item, seed_user};

    #[test]
    fn no_channel_without_acceptance() {
        let db = fresh_db();
        let owner = seed_user(&db, "alice");
        let bob = seed_user(&db, "bob");
        let item = seed_item(&db, owner, "couch");

        assert!(resolve_channel(&db, item).unwrap().is_none());
        assert!(!can_access(&db, item, owner).unwrap());

        create_request(&db, item, bob, None).unwrap();
        // Still pending, no channel yet
        assert!(resolve_channel(&db, item).unwrap().is_none());

        let err = send_message(&db, item, bob, "hello?").unwrap_err();
        assert!(matches!(err, Error::InvalidState(_)));
    }

    #[test]
    fn acceptance_opens_channel_for_both_parties_only() {
        let db = fresh_db();
        let owner = seed_user(&db, "alice");
        let bob = seed_user(&db, "bob");
        let carol = seed_user(&db, "carol");
        let item = seed_item(&db, owner, "couch");

        let r1 = create_request(&db, item, bob, None).unwrap();
        accept_request(&db, r1.id, owner).unwrap();

        let channel = resolve_channel(&db, item).unwrap().unwrap();
        assert_eq!(channel.owner_id, owner);
        assert_eq!(channel.requester_id, bob);

        assert!(can_access(&db, item, owner).unwrap());
        assert!(can_access(&db, item, bob).unwrap());
        assert!(!can_access(&db, item, carol).unwrap());

        let err = send_message(&db, item, carol, "let me in").unwrap_err();
        assert!(matches!(err, Error::Unauthorized(_)));
    }

    #[test]
    fn messages_flow_between_participants() {
        let db = fresh_db();
        let owner = seed_user(&db, "alice");
        let bob = seed_user(&db, "bob");
        let item = seed_item(&db, owner, "couch");

        let r1 = create_request(&db, item, bob, None).unwrap();
        accept_request(&db, r1.id, owner).unwrap();

        send_message(&db, item, bob, "when can I pick it up?").unwrap();
        send_message(&db, item, owner, "tomorrow works").unwrap();

        let history = message_history(&db, item, owner, 50, None).unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].sender_id, bob);
        assert_eq!(history[1].sender_id, owner);

        let carol = seed_user(&db, "carol");
        let err = message_history(&db, item, carol, 50, None).unwrap_err();
        assert!(matches!(err, Error::Unauthorized(_)));
    }

    #[test]
    fn empty_content_is_rejected() {
        let db = fresh_db();
        let owner = seed_user(&db, "alice");
        let bob = seed_user(&db, "bob");
        let item = seed_item(&db, owner, "couch");

        let r1 = create_request(&db, item, bob, None).unwrap();
        accept_request(&db, r1.id, owner).unwrap();

        let err = send_message(&db, item, bob, "   ").unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn cancellation_revokes_the_channel_immediately() {
        let db = fresh_db();
        let owner = seed_user(&db, "alice");
        let bob = seed_user(&db, "bob");
        let item = seed_item(&db, owner, "couch");

        let r1 = create_request(&db, item, bob, None).unwrap();
        accept_request(&db, r1.id, owner).unwrap();
        send_message(&db, item, bob, "actually, never mind").unwrap();

        cancel_request(&db, r1.id, bob).unwrap();

        // Availability is a function of current state, not history:
        // past messages exist, yet the channel no longer resolves and the
        // former participant has no residual grant.
        assert!(resolve_channel(&db, item).unwrap().is_none());
        assert!(!can_access(&db, item, bob).unwrap());
        assert!(!can_access(&db, item, owner).unwrap());

        let err = send_message(&db, item, bob, "one more thing").unwrap_err();
        assert!(matches!(err, Error::InvalidState(_)));
        let err = message_history(&db, item, bob, 50, None).unwrap_err();
        assert!(matches!(err, Error::InvalidState(_)));
    }
}
