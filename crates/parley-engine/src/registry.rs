//! In-memory presence registry.
//!
//! Maps each identity to its single active connection.  This is the one
//! structure mutated by every connection-handling task, so all access goes
//! through one `RwLock`; no other synchronization discipline is used.

use std::collections::HashMap;

use serde::Serialize;
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, info, warn};
use uuid::Uuid;

use parley_shared::protocol::PushFrame;
use parley_shared::UserId;

/// Handle to one client connection's push channel.
///
/// Cloning is cheap; all clones feed the same receiver.  The receiver half
/// lives with the transport task that pumps frames onto the socket.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    id: Uuid,
    tx: mpsc::UnboundedSender<PushFrame>,
}

impl ConnectionHandle {
    /// Create a handle and the receiver half of its push channel.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<PushFrame>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { id: Uuid::new_v4(), tx }, rx)
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Push one event frame to this connection.
    ///
    /// Emits are best-effort: a closed channel (client already gone) is a
    /// logged no-op, never an error.  Returns whether the frame was queued.
    pub fn emit<S: Serialize>(&self, event: &str, payload: &S) -> bool {
        let frame = match PushFrame::new(event, payload) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(event, error = %e, "failed to serialize push payload");
                return false;
            }
        };

        if self.tx.send(frame).is_err() {
            debug!(event, connection = %self.id, "push channel closed, dropping emit");
            return false;
        }
        true
    }
}

/// Process-wide table of identity -> active connection.
///
/// At most one registration per identity; a reconnect replaces the previous
/// handle (last connection wins) without closing it.
#[derive(Debug, Default)]
pub struct PresenceRegistry {
    inner: RwLock<HashMap<UserId, ConnectionHandle>>,
}

impl PresenceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handle` as the active connection for `user`, superseding
    /// any previous registration.
    pub async fn register(&self, user: UserId, handle: ConnectionHandle) {
        let mut table = self.inner.write().await;
        if let Some(previous) = table.insert(user, handle) {
            info!(%user, superseded = %previous.id(), "replaced presence registration");
        } else {
            info!(%user, "registered presence");
        }
    }

    /// Remove the registration for `user` only if it still belongs to
    /// `handle`.
    ///
    /// A stale unregister (the user reconnected and the table holds a newer
    /// handle) is a no-op returning `false`, so a slow disconnect can never
    /// clear a fresher registration.
    pub async fn unregister(&self, user: UserId, handle: &ConnectionHandle) -> bool {
        let mut table = self.inner.write().await;
        match table.get(&user) {
            Some(current) if current.id() == handle.id() => {
                table.remove(&user);
                info!(%user, "unregistered presence");
                true
            }
            Some(_) => {
                debug!(%user, stale = %handle.id(), "ignoring stale unregister");
                false
            }
            None => false,
        }
    }

    /// Current connection handle for `user`, if any.
    pub async fn lookup(&self, user: UserId) -> Option<ConnectionHandle> {
        self.inner.read().await.get(&user).cloned()
    }

    /// Partition `ids` into (online, offline) under one read guard.
    pub async fn is_online(&self, ids: &[UserId]) -> (Vec<UserId>, Vec<UserId>) {
        let table = self.inner.read().await;
        let mut online = Vec::new();
        let mut offline = Vec::new();
        for &id in ids {
            if table.contains_key(&id) {
                online.push(id);
            } else {
                offline.push(id);
            }
        }
        (online, offline)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn register_then_lookup() {
        let registry = PresenceRegistry::new();
        let user = UserId::new();
        let (handle, _rx) = ConnectionHandle::new();

        registry.register(user, handle.clone()).await;

        let found = registry.lookup(user).await.unwrap();
        assert_eq!(found.id(), handle.id());
    }

    #[tokio::test]
    async fn reconnect_wins_and_stale_unregister_is_ignored() {
        let registry = PresenceRegistry::new();
        let user = UserId::new();
        let (old, _old_rx) = ConnectionHandle::new();
        let (new, _new_rx) = ConnectionHandle::new();

        registry.register(user, old.clone()).await;
        registry.register(user, new.clone()).await;

        // The old connection's disconnect arrives late; it must not clear
        // the newer registration.
        assert!(!registry.unregister(user, &old).await);
        assert_eq!(registry.lookup(user).await.unwrap().id(), new.id());

        assert!(registry.unregister(user, &new).await);
        assert!(registry.lookup(user).await.is_none());
    }

    #[tokio::test]
    async fn is_online_partitions_the_input() {
        let registry = PresenceRegistry::new();
        let here = UserId::new();
        let gone = UserId::new();
        let (handle, _rx) = ConnectionHandle::new();

        registry.register(here, handle).await;

        let (online, offline) = registry.is_online(&[here, gone]).await;
        assert_eq!(online, vec![here]);
        assert_eq!(offline, vec![gone]);
    }

    #[tokio::test]
    async fn emit_to_closed_channel_is_a_noop() {
        let (handle, rx) = ConnectionHandle::new();
        drop(rx);
        assert!(!handle.emit("getOnlineFriends", &Vec::<UserId>::new()));
    }
}
