use std::sync::Arc;

use tokio::task::spawn_blocking;
use tracing::{debug, warn};
use uuid::Uuid;

use recirc_core::chat;
use recirc_db::Database;
use recirc_types::api::MessageView;
use recirc_types::events::GatewayEvent;
use recirc_types::models::{Channel, Notification};

use crate::registry::Registry;

/// Maps committed state changes to audiences and pushes them through the
/// registry. Chat audiences are re-resolved from the store at dispatch
/// time, not at subscribe time, so a revoked acceptance silences the
/// channel even for connections still sitting in an old subscriber set.
///
/// Every method here is called strictly after the triggering mutation
/// committed, and none of them can fail the mutation: delivery problems
/// are logged and swallowed.
#[derive(Clone)]
pub struct Dispatcher {
    registry: Registry,
    db: Arc<Database>,
}

impl Dispatcher {
    pub fn new(registry: Registry, db: Arc<Database>) -> Self {
        Self { registry, db }
    }

    /// Item created/updated/soft-deleted, or an item status moved as part
    /// of a request transition. Pushes the full current list to the feed.
    pub async fn items_changed(&self) {
        let db = self.db.clone();
        let items = spawn_blocking(move || {
            let rows = db.list_items(None, None)?;
            rows.into_iter().map(|r| r.into_view()).collect::<anyhow::Result<Vec<_>>>()
        })
        .await;

        match items {
            Ok(Ok(items)) => self.registry.broadcast(GatewayEvent::ItemsUpdate { items }),
            Ok(Err(e)) => warn!("item feed refresh failed: {}", e),
            Err(e) => warn!("item feed task join error: {}", e),
        }
    }

    /// A request changed state: both parties get a bare re-fetch signal.
    pub async fn request_changed(&self, owner_id: Uuid, requester_id: Uuid) {
        self.registry.send_to_user(owner_id, GatewayEvent::RequestsUpdate).await;
        self.registry.send_to_user(requester_id, GatewayEvent::RequestsUpdate).await;
    }

    /// A chat message was committed. The channel is resolved fresh; when
    /// it no longer resolves (acceptance revoked between commit and
    /// dispatch) the event is dropped.
    pub async fn message_created(&self, message: MessageView) {
        match self.resolve(message.item_id).await {
            Some(channel) => {
                self.registry
                    .send_to_channel(&channel, GatewayEvent::MessageCreate { message })
                    .await;
            }
            None => debug!("dropping message fan-out, no channel for item {}", message.item_id),
        }
    }

    pub async fn notification_created(&self, notification: Notification) {
        let user_id = notification.user_id;
        self.registry
            .send_to_user(user_id, GatewayEvent::NotificationCreate { notification })
            .await;
    }

    /// Join an item's chat. Access is checked fresh against the currently
    /// accepted request; unauthorized callers get a silent no-op so the
    /// existence of the channel leaks nothing.
    pub async fn subscribe_chat(&self, conn_id: Uuid, item_id: Uuid, user_id: Uuid) {
        match self.resolve(item_id).await {
            Some(channel) if channel.is_participant(user_id) => {
                self.registry.subscribe(conn_id, channel).await;
                self.registry
                    .send_to_conn(conn_id, GatewayEvent::ChatJoined { channel })
                    .await;
            }
            _ => debug!("chat join refused for user {} on item {}", user_id, item_id),
        }
    }

    /// Socket-path message send: full core validation, then fan-out.
    /// Failures are silent toward the socket, matching the join behavior.
    pub async fn chat_send(&self, item_id: Uuid, sender_id: Uuid, content: String) {
        let db = self.db.clone();
        let result = spawn_blocking(move || chat::send_message(&db, item_id, sender_id, &content)).await;

        match result {
            Ok(Ok(message)) => self.message_created(message).await,
            Ok(Err(e)) => debug!("socket send refused for user {} on item {}: {}", sender_id, item_id, e),
            Err(e) => warn!("chat send task join error: {}", e),
        }
    }

    /// Typing indicator, gated the same way as message delivery.
    pub async fn typing(&self, item_id: Uuid, user_id: Uuid) {
        if let Some(channel) = self.resolve(item_id).await {
            if channel.is_participant(user_id) {
                self.registry
                    .send_to_channel(&channel, GatewayEvent::TypingStart { item_id, user_id })
                    .await;
            }
        }
    }

    async fn resolve(&self, item_id: Uuid) -> Option<Channel> {
        let db = self.db.clone();
        match spawn_blocking(move || chat::resolve_channel(&db, item_id)).await {
            Ok(Ok(channel)) => channel,
            Ok(Err(e)) => {
                warn!("channel resolve failed for item {}: {}", item_id, e);
                None
            }
            Err(e) => {
                warn!("channel resolve task join error: {}", e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use recirc_core::exchange::{accept_request, cancel_request, create_request};
    use recirc_db::queries;

    fn seed_user(db: &Database, username: &str) -> Uuid {
        let id = Uuid::new_v4();
        db.create_user(&id.to_string(), username, "hash").unwrap();
        id
    }

    fn seed_item(db: &Database, owner_id: Uuid, title: &str) -> Uuid {
        let id = Uuid::new_v4();
        db.with_conn(|conn| {
            queries::insert_item(conn, &id.to_string(), &owner_id.to_string(), title, None, None, None)
        })
        .unwrap();
        id
    }

    fn setup() -> (Dispatcher, Registry, Arc<Database>) {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let registry = Registry::new();
        (Dispatcher::new(registry.clone(), db.clone()), registry, db)
    }

    #[tokio::test]
    async fn message_fanout_reaches_participants_only() {
        let (dispatcher, registry, db) = setup();
        let owner = seed_user(&db, "alice");
        let bob = seed_user(&db, "bob");
        let carol = seed_user(&db, "carol");
        let item = seed_item(&db, owner, "couch");

        let r1 = create_request(&db, item, bob, None).unwrap();
        create_request(&db, item, carol, None).unwrap();
        accept_request(&db, r1.id, owner).unwrap();

        let (owner_conn, mut owner_rx) = registry.register(owner).await;
        let (bob_conn, mut bob_rx) = registry.register(bob).await;
        let (carol_conn, mut carol_rx) = registry.register(carol).await;

        dispatcher.subscribe_chat(owner_conn, item, owner).await;
        dispatcher.subscribe_chat(bob_conn, item, bob).await;
        dispatcher.subscribe_chat(carol_conn, item, carol).await;

        // Owner and requester are acked; the outsider gets nothing back
        assert!(matches!(owner_rx.try_recv(), Ok(GatewayEvent::ChatJoined { .. })));
        assert!(matches!(bob_rx.try_recv(), Ok(GatewayEvent::ChatJoined { .. })));
        assert!(carol_rx.try_recv().is_err());

        dispatcher.chat_send(item, bob, "when can I pick it up?".into()).await;

        assert!(matches!(owner_rx.try_recv(), Ok(GatewayEvent::MessageCreate { .. })));
        assert!(matches!(bob_rx.try_recv(), Ok(GatewayEvent::MessageCreate { .. })));
        assert!(carol_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn unauthorized_socket_send_is_swallowed() {
        let (dispatcher, registry, db) = setup();
        let owner = seed_user(&db, "alice");
        let bob = seed_user(&db, "bob");
        let carol = seed_user(&db, "carol");
        let item = seed_item(&db, owner, "couch");

        let r1 = create_request(&db, item, bob, None).unwrap();
        accept_request(&db, r1.id, owner).unwrap();

        let (owner_conn, mut owner_rx) = registry.register(owner).await;
        dispatcher.subscribe_chat(owner_conn, item, owner).await;
        let _ = owner_rx.try_recv(); // drain the join ack

        dispatcher.chat_send(item, carol, "let me in".into()).await;

        assert!(owner_rx.try_recv().is_err());
        // Nothing was persisted either
        let history = chat::message_history(&db, item, owner, 50, None).unwrap();
        assert!(history.is_empty());
    }

    #[tokio::test]
    async fn dispatch_resolves_audience_at_dispatch_time() {
        let (dispatcher, registry, db) = setup();
        let owner = seed_user(&db, "alice");
        let bob = seed_user(&db, "bob");
        let item = seed_item(&db, owner, "couch");

        let r1 = create_request(&db, item, bob, None).unwrap();
        accept_request(&db, r1.id, owner).unwrap();

        let (bob_conn, mut bob_rx) = registry.register(bob).await;
        dispatcher.subscribe_chat(bob_conn, item, bob).await;
        let _ = bob_rx.try_recv(); // join ack

        let message = chat::send_message(&db, item, owner, "still there?").unwrap();

        // Acceptance is revoked between commit and dispatch: the channel
        // no longer resolves, so even the old subscriber set gets nothing.
        cancel_request(&db, r1.id, bob).unwrap();
        dispatcher.message_created(message).await;

        assert!(bob_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn request_change_signals_both_parties() {
        let (dispatcher, registry, _db) = setup();
        let owner = Uuid::new_v4();
        let requester = Uuid::new_v4();
        let other = Uuid::new_v4();

        let (_c1, mut owner_rx) = registry.register(owner).await;
        let (_c2, mut requester_rx) = registry.register(requester).await;
        let (_c3, mut other_rx) = registry.register(other).await;

        dispatcher.request_changed(owner, requester).await;

        assert!(matches!(owner_rx.try_recv(), Ok(GatewayEvent::RequestsUpdate)));
        assert!(matches!(requester_rx.try_recv(), Ok(GatewayEvent::RequestsUpdate)));
        assert!(other_rx.try_recv().is_err());
    }
}
