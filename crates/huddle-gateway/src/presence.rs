//! Presence registry
//!
//! Maps a user to the connection currently serving them. The mapping lives in
//! a [`PresenceStore`] keyed `presence:{userId}` with the connection id as the
//! value. The outbound channel for that connection lives in a local table,
//! since a channel cannot be stored externally.

use dashmap::DashMap;
use huddle_core::{ConnectionId, Error, OutboundEvent, PresenceStatus, Result, UserId};
use huddle_store::PresenceStore;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

pub type ConnectionSender = mpsc::UnboundedSender<OutboundEvent>;

/// One authenticated connection: who it is and how to reach it.
#[derive(Clone, Debug)]
pub struct ConnectionHandle {
    pub id: ConnectionId,
    pub user: UserId,
    tx: ConnectionSender,
}

impl ConnectionHandle {
    pub fn new(user: UserId, tx: ConnectionSender) -> Self {
        Self {
            id: ConnectionId::new(),
            user,
            tx,
        }
    }

    /// Enqueue an event. Returns false once the connection has gone away.
    pub fn send(&self, event: OutboundEvent) -> bool {
        self.tx.send(event).is_ok()
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

fn presence_key(user: &UserId) -> String {
    format!("presence:{}", user)
}

pub struct PresenceRegistry {
    store: Arc<dyn PresenceStore>,
    ttl: Duration,
    connections: DashMap<ConnectionId, ConnectionHandle>,
}

impl PresenceRegistry {
    pub fn new(store: Arc<dyn PresenceStore>, ttl: Duration) -> Self {
        Self {
            store,
            ttl,
            connections: DashMap::new(),
        }
    }

    /// Make `handle` the user's live connection, replacing any earlier one,
    /// and announce the user as online.
    pub async fn register(&self, handle: &ConnectionHandle) -> Result<()> {
        self.connections.insert(handle.id, handle.clone());
        if let Err(e) = self
            .store
            .set_with_ttl(&presence_key(&handle.user), &handle.id.to_string(), self.ttl)
            .await
        {
            self.connections.remove(&handle.id);
            return Err(e);
        }
        info!("{} online via {}", handle.user, handle.id);
        self.broadcast(OutboundEvent::status(
            handle.user.clone(),
            PresenceStatus::Online,
        ));
        Ok(())
    }

    /// Remove `handle`. The presence entry is only cleared while it still
    /// names this connection; a newer connection for the same user stays
    /// registered. Returns whether the user went offline.
    pub async fn deregister(&self, handle: &ConnectionHandle) -> Result<bool> {
        self.connections.remove(&handle.id);
        let removed = self
            .store
            .delete_if_eq(&presence_key(&handle.user), &handle.id.to_string())
            .await?;
        if removed {
            info!("{} offline", handle.user);
            self.broadcast(OutboundEvent::status(
                handle.user.clone(),
                PresenceStatus::Offline,
            ));
        } else {
            debug!(
                "{} deregistered {} after being superseded",
                handle.user, handle.id
            );
        }
        Ok(removed)
    }

    /// Clear the user's presence regardless of which connection holds it.
    pub async fn evict(&self, user: &UserId) -> Result<bool> {
        let removed = self.store.delete(&presence_key(user)).await?;
        if removed {
            info!("{} evicted", user);
            self.broadcast(OutboundEvent::status(user.clone(), PresenceStatus::Offline));
        }
        Ok(removed)
    }

    /// The user's live connection, if any. Store failures and entries that
    /// name a connection this process does not hold count as offline.
    pub async fn lookup(&self, user: &UserId) -> Option<ConnectionHandle> {
        let value = match self.store.get(&presence_key(user)).await {
            Ok(Some(value)) => value,
            Ok(None) => return None,
            Err(e) => {
                warn!("Presence lookup for {} failed: {}", user, e);
                return None;
            }
        };

        let handle = ConnectionId::parse(&value)
            .and_then(|id| self.connections.get(&id).map(|h| h.value().clone()));
        if handle.is_none() {
            warn!("{}", Error::delivery(user, format!("stale connection {}", value)));
        }
        handle
    }

    pub async fn is_online(&self, user: &UserId) -> bool {
        self.lookup(user).await.is_some()
    }

    pub async fn status(&self, user: &UserId) -> PresenceStatus {
        if self.is_online(user).await {
            PresenceStatus::Online
        } else {
            PresenceStatus::Offline
        }
    }

    /// Deliver to the user's live connection. Returns whether it was enqueued.
    pub async fn send_to(&self, user: &UserId, event: OutboundEvent) -> bool {
        match self.lookup(user).await {
            Some(handle) => deliver(&handle, event),
            None => false,
        }
    }

    /// Send to every connection held by this process.
    pub fn broadcast(&self, event: OutboundEvent) {
        let handles: Vec<ConnectionHandle> =
            self.connections.iter().map(|h| h.value().clone()).collect();
        for handle in handles {
            deliver(&handle, event.clone());
        }
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }
}

/// Enqueue on a connection, logging a delivery failure if it is gone.
pub(crate) fn deliver(handle: &ConnectionHandle, event: OutboundEvent) -> bool {
    if handle.send(event) {
        true
    } else {
        debug!(
            "{}",
            Error::delivery(&handle.user, format!("connection {} closed", handle.id))
        );
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use huddle_store::MemoryPresenceStore;

    fn registry() -> PresenceRegistry {
        PresenceRegistry::new(
            Arc::new(MemoryPresenceStore::new()),
            Duration::from_secs(60),
        )
    }

    fn connect(user: &str) -> (ConnectionHandle, mpsc::UnboundedReceiver<OutboundEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (ConnectionHandle::new(user.into(), tx), rx)
    }

    #[tokio::test]
    async fn register_then_deregister() {
        let presence = registry();
        let (alice, _rx) = connect("alice");
        presence.register(&alice).await.unwrap();
        assert!(presence.is_online(&"alice".into()).await);

        assert!(presence.deregister(&alice).await.unwrap());
        assert!(!presence.is_online(&"alice".into()).await);
        assert_eq!(presence.connection_count(), 0);
    }

    #[tokio::test]
    async fn superseded_connection_cannot_evict_newer_one() {
        let presence = registry();
        let (old, _old_rx) = connect("alice");
        let (new, _new_rx) = connect("alice");
        presence.register(&old).await.unwrap();
        presence.register(&new).await.unwrap();

        assert!(!presence.deregister(&old).await.unwrap());
        let live = presence.lookup(&"alice".into()).await.unwrap();
        assert_eq!(live.id, new.id);
    }

    #[tokio::test]
    async fn stale_entry_reads_as_offline() {
        let store = Arc::new(MemoryPresenceStore::new());
        store
            .set_with_ttl("presence:ghost", &ConnectionId::new().to_string(), Duration::from_secs(60))
            .await
            .unwrap();
        let presence = PresenceRegistry::new(store, Duration::from_secs(60));
        assert!(presence.lookup(&"ghost".into()).await.is_none());
    }

    #[tokio::test]
    async fn status_changes_are_broadcast() {
        let presence = registry();
        let (watcher, mut watcher_rx) = connect("watcher");
        presence.register(&watcher).await.unwrap();
        let _ = watcher_rx.try_recv();

        let (bob, _bob_rx) = connect("bob");
        presence.register(&bob).await.unwrap();
        presence.deregister(&bob).await.unwrap();

        assert_eq!(
            watcher_rx.try_recv().unwrap(),
            OutboundEvent::status("bob".into(), PresenceStatus::Online)
        );
        assert_eq!(
            watcher_rx.try_recv().unwrap(),
            OutboundEvent::status("bob".into(), PresenceStatus::Offline)
        );
    }

    #[tokio::test]
    async fn evict_is_unconditional() {
        let presence = registry();
        let (alice, _rx) = connect("alice");
        presence.register(&alice).await.unwrap();
        assert!(presence.evict(&"alice".into()).await.unwrap());
        assert!(!presence.is_online(&"alice".into()).await);
        assert!(!presence.evict(&"alice".into()).await.unwrap());
    }
}
