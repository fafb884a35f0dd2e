//! Exchange lifecycle state machine.
//!
//! Each operation runs its whole read-check-write sequence inside one
//! SQLite transaction taken under the store's connection mutex, so two
//! concurrent accepts on the same item serialize: the winner commits, the
//! loser re-reads a request that is no longer PENDING and fails with
//! `InvalidState` instead of silently overwriting.

use tracing::info;
use uuid::Uuid;

use recirc_db::{Database, queries};
use recirc_types::models::{ItemStatus, Request, RequestStatus};

use crate::error::{Error, Result};

/// Result of a successful accept: the winning request plus the requesters
/// whose PENDING requests were demoted to REJECTED, for fan-out.
#[derive(Debug)]
pub struct AcceptOutcome {
    pub request: Request,
    pub demoted_requesters: Vec<Uuid>,
}

/// Create a PENDING request for an item and move the item to REQUESTED
/// (a no-op when a previous request already moved it there).
pub fn create_request(
    db: &Database,
    item_id: Uuid,
    requester_id: Uuid,
    message: Option<&str>,
) -> Result<Request> {
    db.with_conn_mut(|conn| {
        let tx = conn.transaction()?;

        let item = queries::item_by_id(&tx, &item_id.to_string())?
            .ok_or(Error::NotFound("item"))?;
        if item.owner_id == requester_id.to_string() {
            return Err(Error::SelfRequest);
        }
        let status = item.status()?;
        if status.is_terminal() {
            return Err(Error::InvalidState("item is no longer available"));
        }

        let id = Uuid::new_v4();
        queries::insert_request(
            &tx,
            &id.to_string(),
            &item.id,
            &requester_id.to_string(),
            &item.owner_id,
            message,
        )?;
        if status == ItemStatus::Available {
            queries::set_item_status(&tx, &item.id, ItemStatus::Requested)?;
        }

        let request = fetch_request(&tx, &id.to_string())?;
        tx.commit()?;
        Ok(request)
    })
}

/// Accept a request as the item owner. In one atomic unit: the target
/// request becomes ACCEPTED, the item becomes GIVEN_AWAY, and every other
/// PENDING request on the item becomes REJECTED.
pub fn accept_request(db: &Database, request_id: Uuid, acting_user_id: Uuid) -> Result<AcceptOutcome> {
    db.with_conn_mut(|conn| {
        let tx = conn.transaction()?;

        let row = queries::request_by_id(&tx, &request_id.to_string())?
            .ok_or(Error::NotFound("request"))?;
        if row.owner_id != acting_user_id.to_string() {
            return Err(Error::Unauthorized("only the item owner can accept a request"));
        }
        if row.status()? != RequestStatus::Pending {
            return Err(Error::InvalidState("request is not pending"));
        }

        let siblings = queries::pending_requests_for_item_except(&tx, &row.item_id, &row.id)?;
        queries::set_request_status(&tx, &row.id, RequestStatus::Accepted)?;
        queries::set_item_status(&tx, &row.item_id, ItemStatus::GivenAway)?;
        queries::reject_pending_for_item(&tx, &row.item_id, &row.id)?;

        let request = fetch_request(&tx, &row.id)?;
        let demoted_requesters = siblings
            .into_iter()
            .map(|s| s.into_request().map(|r| r.requester_id))
            .collect::<anyhow::Result<Vec<_>>>()?;

        tx.commit()?;
        info!(
            "request {} accepted for item {}, {} sibling(s) rejected",
            request.id,
            request.item_id,
            demoted_requesters.len()
        );
        Ok(AcceptOutcome { request, demoted_requesters })
    })
}

/// Reject a PENDING request as the item owner.
pub fn reject_request(db: &Database, request_id: Uuid, acting_user_id: Uuid) -> Result<Request> {
    db.with_conn_mut(|conn| {
        let tx = conn.transaction()?;

        let row = queries::request_by_id(&tx, &request_id.to_string())?
            .ok_or(Error::NotFound("request"))?;
        if row.owner_id != acting_user_id.to_string() {
            return Err(Error::Unauthorized("only the item owner can reject a request"));
        }
        if row.status()? != RequestStatus::Pending {
            return Err(Error::InvalidState("request is not pending"));
        }

        queries::set_request_status(&tx, &row.id, RequestStatus::Rejected)?;
        let request = fetch_request(&tx, &row.id)?;
        tx.commit()?;
        Ok(request)
    })
}

/// Cancel an own request from any non-terminal state. Cancelling an
/// ACCEPTED request leaves the item GIVEN_AWAY (no automatic reopen) but
/// the chat channel stops resolving the moment this commits, because the
/// resolver finds no ACCEPTED request anymore.
pub fn cancel_request(db: &Database, request_id: Uuid, acting_user_id: Uuid) -> Result<Request> {
    db.with_conn_mut(|conn| {
        let tx = conn.transaction()?;

        let row = queries::request_by_id(&tx, &request_id.to_string())?
            .ok_or(Error::NotFound("request"))?;
        if row.requester_id != acting_user_id.to_string() {
            return Err(Error::Unauthorized("only the requester can cancel a request"));
        }
        if row.status()?.is_terminal() {
            return Err(Error::InvalidState("request is already resolved"));
        }

        queries::set_request_status(&tx, &row.id, RequestStatus::Cancelled)?;
        let request = fetch_request(&tx, &row.id)?;
        tx.commit()?;
        Ok(request)
    })
}

fn fetch_request(conn: &rusqlite::Connection, id: &str) -> Result<Request> {
    let row = queries::request_by_id(conn, id)?
        .ok_or_else(|| Error::Storage(anyhow::anyhow!("request {} vanished mid-transaction", id)))?;
    Ok(row.into_request()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{fresh_db, seed_item, seed_user};
    use recirc_types::models::ItemStatus;
    use std::sync::Arc;

    fn item_status(db: &Database, item_id: Uuid) -> ItemStatus {
        db.get_item(&item_id.to_string())
            .unwrap()
            .unwrap()
            .status()
            .unwrap()
    }

    fn request_status(db: &Database, request_id: Uuid) -> RequestStatus {
        db.with_conn(|conn| queries::request_by_id(conn, &request_id.to_string()))
            .unwrap()
            .unwrap()
            .status()
            .unwrap()
    }

    #[test]
    fn create_request_moves_item_to_requested() {
        let db = fresh_db();
        let owner = seed_user(&db, "alice");
        let requester = seed_user(&db, "bob");
        let item = seed_item(&db, owner, "couch");

        let req = create_request(&db, item, requester, Some("interested")).unwrap();
        assert_eq!(req.status, RequestStatus::Pending);
        assert_eq!(req.owner_id, owner);
        assert_eq!(item_status(&db, item), ItemStatus::Requested);

        // A second request leaves the item REQUESTED
        let carol = seed_user(&db, "carol");
        create_request(&db, item, carol, None).unwrap();
        assert_eq!(item_status(&db, item), ItemStatus::Requested);
    }

    #[test]
    fn own_item_cannot_be_requested() {
        let db = fresh_db();
        let owner = seed_user(&db, "alice");
        let item = seed_item(&db, owner, "couch");

        let err = create_request(&db, item, owner, None).unwrap_err();
        assert!(matches!(err, Error::SelfRequest));
    }

    #[test]
    fn missing_item_is_not_found() {
        let db = fresh_db();
        let requester = seed_user(&db, "bob");

        let err = create_request(&db, Uuid::new_v4(), requester, None).unwrap_err();
        assert!(matches!(err, Error::NotFound("item")));
    }

    #[test]
    fn given_away_item_refuses_new_requests() {
        let db = fresh_db();
        let owner = seed_user(&db, "alice");
        let bob = seed_user(&db, "bob");
        let carol = seed_user(&db, "carol");
        let item = seed_item(&db, owner, "couch");

        let r1 = create_request(&db, item, bob, None).unwrap();
        accept_request(&db, r1.id, owner).unwrap();

        let err = create_request(&db, item, carol, None).unwrap_err();
        assert!(matches!(err, Error::InvalidState(_)));
    }

    #[test]
    fn accept_demotes_pending_siblings() {
        let db = fresh_db();
        let owner = seed_user(&db, "alice");
        let bob = seed_user(&db, "bob");
        let carol = seed_user(&db, "carol");
        let item = seed_item(&db, owner, "couch");

        let r1 = create_request(&db, item, bob, Some("interested")).unwrap();
        let r2 = create_request(&db, item, carol, Some("me too")).unwrap();

        let outcome = accept_request(&db, r1.id, owner).unwrap();
        assert_eq!(outcome.request.status, RequestStatus::Accepted);
        assert_eq!(outcome.demoted_requesters, vec![carol]);

        assert_eq!(item_status(&db, item), ItemStatus::GivenAway);
        assert_eq!(request_status(&db, r2.id), RequestStatus::Rejected);
    }

    #[test]
    fn only_owner_can_accept() {
        let db = fresh_db();
        let owner = seed_user(&db, "alice");
        let bob = seed_user(&db, "bob");
        let item = seed_item(&db, owner, "couch");

        let r1 = create_request(&db, item, bob, None).unwrap();
        let err = accept_request(&db, r1.id, bob).unwrap_err();
        assert!(matches!(err, Error::Unauthorized(_)));

        // No side effects from the refused transition
        assert_eq!(request_status(&db, r1.id), RequestStatus::Pending);
        assert_eq!(item_status(&db, item), ItemStatus::Requested);
    }

    #[test]
    fn reject_requires_pending() {
        let db = fresh_db();
        let owner = seed_user(&db, "alice");
        let bob = seed_user(&db, "bob");
        let item = seed_item(&db, owner, "couch");

        let r1 = create_request(&db, item, bob, None).unwrap();
        reject_request(&db, r1.id, owner).unwrap();

        let err = reject_request(&db, r1.id, owner).unwrap_err();
        assert!(matches!(err, Error::InvalidState(_)));
        assert_eq!(request_status(&db, r1.id), RequestStatus::Rejected);
    }

    #[test]
    fn cancel_is_requester_only() {
        let db = fresh_db();
        let owner = seed_user(&db, "alice");
        let bob = seed_user(&db, "bob");
        let item = seed_item(&db, owner, "couch");

        let r1 = create_request(&db, item, bob, None).unwrap();
        let err = cancel_request(&db, r1.id, owner).unwrap_err();
        assert!(matches!(err, Error::Unauthorized(_)));

        let cancelled = cancel_request(&db, r1.id, bob).unwrap();
        assert_eq!(cancelled.status, RequestStatus::Cancelled);
    }

    #[test]
    fn cancel_accepted_leaves_item_given_away() {
        let db = fresh_db();
        let owner = seed_user(&db, "alice");
        let bob = seed_user(&db, "bob");
        let item = seed_item(&db, owner, "couch");

        let r1 = create_request(&db, item, bob, None).unwrap();
        accept_request(&db, r1.id, owner).unwrap();
        cancel_request(&db, r1.id, bob).unwrap();

        assert_eq!(request_status(&db, r1.id), RequestStatus::Cancelled);
        // Preserved source behavior: no automatic reopen of the item.
        assert_eq!(item_status(&db, item), ItemStatus::GivenAway);
    }

    #[test]
    fn concurrent_accepts_have_exactly_one_winner() {
        let db = Arc::new(fresh_db());
        let owner = seed_user(&db, "alice");
        let bob = seed_user(&db, "bob");
        let carol = seed_user(&db, "carol");
        let item = seed_item(&db, owner, "couch");

        let r1 = create_request(&db, item, bob, None).unwrap();
        let r2 = create_request(&db, item, carol, None).unwrap();

        let handles: Vec<_> = [r1.id, r2.id]
            .into_iter()
            .map(|rid| {
                let db = db.clone();
                std::thread::spawn(move || accept_request(&db, rid, owner))
            })
            .collect();

        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        let winners = results.iter().filter(|r| r.is_ok()).count();
        assert_eq!(winners, 1);
        for r in &results {
            if let Err(e) = r {
                assert!(matches!(e, Error::InvalidState(_)), "loser saw {:?}", e);
            }
        }

        let accepted = db
            .item_requests(&item.to_string())
            .unwrap()
            .into_iter()
            .filter(|r| r.status().unwrap() == RequestStatus::Accepted)
            .count();
        assert_eq!(accepted, 1);
        assert_eq!(item_status(&db, item), ItemStatus::GivenAway);
    }
}
