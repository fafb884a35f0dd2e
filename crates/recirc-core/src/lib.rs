//! Domain core of the give-away marketplace: the exchange lifecycle state
//! machine and the chat authorization resolver. Everything here is
//! transport-agnostic: callers hand in an authenticated user id and a
//! `Database`, and fan-out happens elsewhere, only after these functions
//! return Ok.

pub mod chat;
pub mod error;
pub mod exchange;

pub use error::{Error, Result};

#[cfg(test)]
pub(crate) mod testutil {
    use recirc_db::{Database, queries};
    use uuid::Uuid;

    pub fn fresh_db() -> Database {
        Database::open_in_memory().expect("in-memory db")
    }

    pub fn seed_user(db: &Database, username: &str) -> Uuid {
        let id = Uuid::new_v4();
        db.create_user(&id.to_string(), username, "hash").expect("seed user");
        id
    }

    pub fn seed_item(db: &Database, owner_id: Uuid, title: &str) -> Uuid {
        let id = Uuid::new_v4();
        db.with_conn(|conn| {
            queries::insert_item(
                conn,
                &id.to_string(),
                &owner_id.to_string(),
                title,
                None,
                None,
                None,
            )
        })
        .expect("seed item");
        id
    }
}
