use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tokio::sync::{RwLock, broadcast, mpsc};
use uuid::Uuid;

use recirc_types::events::GatewayEvent;
use recirc_types::models::Channel;

struct ConnEntry {
    user_id: Uuid,
    tx: mpsc::UnboundedSender<GatewayEvent>,
}

/// Tracks live connections and the audiences they belong to.
///
/// Kept as independent key→set-of-connections maps (rather than
/// connections owning back-references) so `unregister` is one removal
/// fan-out. Delivery is best-effort: audiences are snapshotted, then
/// iterated, and a send to a connection that died mid-broadcast is
/// silently skipped.
#[derive(Clone)]
pub struct Registry {
    inner: Arc<RegistryInner>,
}

struct RegistryInner {
    /// Global item-feed events; every live connection forwards these
    broadcast_tx: broadcast::Sender<GatewayEvent>,

    /// conn_id -> owning user + targeted send channel
    conns: RwLock<HashMap<Uuid, ConnEntry>>,

    /// user_id -> conn_ids (multi-device)
    users: RwLock<HashMap<Uuid, HashSet<Uuid>>>,

    /// derived chat channel -> subscribed conn_ids
    channels: RwLock<HashMap<Channel, HashSet<Uuid>>>,
}

impl Registry {
    pub fn new() -> Self {
        let (broadcast_tx, _) = broadcast::channel(1024);
        Self {
            inner: Arc::new(RegistryInner {
                broadcast_tx,
                conns: RwLock::new(HashMap::new()),
                users: RwLock::new(HashMap::new()),
                channels: RwLock::new(HashMap::new()),
            }),
        }
    }

    /// Subscribe to the global item feed. Returns a broadcast receiver.
    pub fn subscribe_feed(&self) -> broadcast::Receiver<GatewayEvent> {
        self.inner.broadcast_tx.subscribe()
    }

    /// Push an event to every live connection via the item feed.
    pub fn broadcast(&self, event: GatewayEvent) {
        let _ = self.inner.broadcast_tx.send(event);
    }

    /// Bind a new connection to a user identity. A user may hold several
    /// simultaneous connections. Returns (conn_id, targeted receiver).
    pub async fn register(&self, user_id: Uuid) -> (Uuid, mpsc::UnboundedReceiver<GatewayEvent>) {
        let conn_id = Uuid::new_v4();
        let (tx, rx) = mpsc::unbounded_channel();

        self.inner
            .conns
            .write()
            .await
            .insert(conn_id, ConnEntry { user_id, tx });
        self.inner
            .users
            .write()
            .await
            .entry(user_id)
            .or_default()
            .insert(conn_id);

        (conn_id, rx)
    }

    /// Remove a connection from every audience set it was part of. Runs
    /// on every disconnect, graceful or not.
    pub async fn unregister(&self, conn_id: Uuid) {
        let entry = self.inner.conns.write().await.remove(&conn_id);

        if let Some(entry) = entry {
            let mut users = self.inner.users.write().await;
            if let Some(set) = users.get_mut(&entry.user_id) {
                set.remove(&conn_id);
                if set.is_empty() {
                    users.remove(&entry.user_id);
                }
            }
        }

        let mut channels = self.inner.channels.write().await;
        channels.retain(|_, subs| {
            subs.remove(&conn_id);
            !subs.is_empty()
        });
    }

    /// Add a connection to a channel's subscriber set. Authorization
    /// happens upstream in the dispatcher; unknown conn_ids are ignored.
    pub async fn subscribe(&self, conn_id: Uuid, channel: Channel) {
        if !self.inner.conns.read().await.contains_key(&conn_id) {
            return;
        }
        self.inner
            .channels
            .write()
            .await
            .entry(channel)
            .or_default()
            .insert(conn_id);
    }

    /// Send a targeted event to one connection.
    pub async fn send_to_conn(&self, conn_id: Uuid, event: GatewayEvent) {
        let conns = self.inner.conns.read().await;
        if let Some(entry) = conns.get(&conn_id) {
            let _ = entry.tx.send(event);
        }
    }

    /// Send a targeted event to every connection of a user.
    pub async fn send_to_user(&self, user_id: Uuid, event: GatewayEvent) {
        let conn_ids: Vec<Uuid> = {
            let users = self.inner.users.read().await;
            users.get(&user_id).map(|s| s.iter().copied().collect()).unwrap_or_default()
        };

        let conns = self.inner.conns.read().await;
        for conn_id in conn_ids {
            if let Some(entry) = conns.get(&conn_id) {
                let _ = entry.tx.send(event.clone());
            }
        }
    }

    /// Send an event to every connection subscribed to a channel.
    pub async fn send_to_channel(&self, channel: &Channel, event: GatewayEvent) {
        let conn_ids: Vec<Uuid> = {
            let channels = self.inner.channels.read().await;
            channels.get(channel).map(|s| s.iter().copied().collect()).unwrap_or_default()
        };

        let conns = self.inner.conns.read().await;
        for conn_id in conn_ids {
            if let Some(entry) = conns.get(&conn_id) {
                let _ = entry.tx.send(event.clone());
            }
        }
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn channel(owner: Uuid, requester: Uuid) -> Channel {
        Channel {
            item_id: Uuid::new_v4(),
            owner_id: owner,
            requester_id: requester,
        }
    }

    #[tokio::test]
    async fn user_events_reach_every_device() {
        let registry = Registry::new();
        let user = Uuid::new_v4();

        let (_c1, mut rx1) = registry.register(user).await;
        let (_c2, mut rx2) = registry.register(user).await;

        registry.send_to_user(user, GatewayEvent::RequestsUpdate).await;

        assert!(matches!(rx1.try_recv(), Ok(GatewayEvent::RequestsUpdate)));
        assert!(matches!(rx2.try_recv(), Ok(GatewayEvent::RequestsUpdate)));
    }

    #[tokio::test]
    async fn channel_events_reach_only_subscribers() {
        let registry = Registry::new();
        let owner = Uuid::new_v4();
        let requester = Uuid::new_v4();
        let ch = channel(owner, requester);

        let (c1, mut rx1) = registry.register(owner).await;
        let (_c2, mut rx2) = registry.register(requester).await;

        registry.subscribe(c1, ch).await;
        registry
            .send_to_channel(&ch, GatewayEvent::TypingStart { item_id: ch.item_id, user_id: owner })
            .await;

        assert!(rx1.try_recv().is_ok());
        assert!(rx2.try_recv().is_err()); // never subscribed
    }

    #[tokio::test]
    async fn unregister_removes_every_membership() {
        let registry = Registry::new();
        let user = Uuid::new_v4();
        let ch = channel(user, Uuid::new_v4());

        let (conn, mut rx) = registry.register(user).await;
        registry.subscribe(conn, ch).await;
        registry.unregister(conn).await;

        registry.send_to_user(user, GatewayEvent::RequestsUpdate).await;
        registry
            .send_to_channel(&ch, GatewayEvent::TypingStart { item_id: ch.item_id, user_id: user })
            .await;

        // Sender side is gone; nothing was queued before the channel closed
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn feed_broadcast_reaches_all_connections() {
        let registry = Registry::new();
        let mut rx1 = registry.subscribe_feed();
        let mut rx2 = registry.subscribe_feed();

        registry.broadcast(GatewayEvent::ItemsUpdate { items: vec![] });

        assert!(matches!(rx1.try_recv(), Ok(GatewayEvent::ItemsUpdate { .. })));
        assert!(matches!(rx2.try_recv(), Ok(GatewayEvent::ItemsUpdate { .. })));
    }

    #[tokio::test]
    async fn subscribe_unknown_conn_is_ignored() {
        let registry = Registry::new();
        let ch = channel(Uuid::new_v4(), Uuid::new_v4());

        registry.subscribe(Uuid::new_v4(), ch).await;

        // No subscriber set should exist for the channel
        registry
            .send_to_channel(&ch, GatewayEvent::TypingStart { item_id: ch.item_id, user_id: ch.owner_id })
            .await;
    }
}
