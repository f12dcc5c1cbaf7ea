//! Presence fan-out scheduler.
//!
//! Reacts to registry changes and recomputes the affected identities'
//! visible online sets from current registry + friend/message data.  There
//! is no incremental diffing: every triggering event recomputes from
//! scratch, trading O(friends) work per event for correctness.
//!
//! Fan-out is strictly best-effort.  A failure while emitting to one target
//! (closed connection, store hiccup) is logged and dropped; it never fails
//! the connect/disconnect event that triggered it.

use std::sync::Arc;

use tracing::warn;

use parley_shared::protocol::{
    OnlineStranger, UserOnlineStatus, EVENT_ONLINE_FRIENDS, EVENT_ONLINE_STRANGERS,
    EVENT_USER_ONLINE_STATUS,
};
use parley_shared::UserId;

use crate::registry::{ConnectionHandle, PresenceRegistry};
use crate::resolver::ContactResolver;
use crate::SharedDb;

pub struct PresenceFanout {
    db: SharedDb,
    registry: Arc<PresenceRegistry>,
    resolver: ContactResolver,
}

impl PresenceFanout {
    pub fn new(db: SharedDb, registry: Arc<PresenceRegistry>, resolver: ContactResolver) -> Self {
        Self {
            db,
            registry,
            resolver,
        }
    }

    /// A connection opened for `user`.
    ///
    /// Registers it, pushes `user`'s own online-friends and online-strangers
    /// views, then re-emits the online-friends view of every connected
    /// friend (each of which just gained a member).
    pub async fn handle_connect(&self, user: UserId, handle: ConnectionHandle) {
        self.registry.register(user, handle).await;

        self.emit_online_friends(user).await;
        self.emit_online_strangers(user).await;

        let friends = match self.resolver.friends_of(user).await {
            Ok(friends) => friends,
            Err(e) => {
                warn!(%user, error = %e, "connect fan-out: friend resolution failed");
                return;
            }
        };
        let (online_friends, _) = self.registry.is_online(&friends).await;
        for friend in online_friends {
            self.emit_online_friends(friend).await;
        }
    }

    /// A connection closed for `user`.
    ///
    /// The unregister is conditional on the handle still being current; a
    /// stale disconnect racing a fresher reconnect is a no-op, with no
    /// fan-out (the user is still online on the newer connection).
    pub async fn handle_disconnect(&self, user: UserId, handle: &ConnectionHandle) {
        if !self.registry.unregister(user, handle).await {
            return;
        }

        match self.resolver.friends_of(user).await {
            Ok(friends) => {
                let (online_friends, _) = self.registry.is_online(&friends).await;
                for friend in online_friends {
                    self.emit_online_friends(friend).await;
                }
            }
            Err(e) => {
                warn!(%user, error = %e, "disconnect fan-out: friend resolution failed");
            }
        }

        match self.resolver.strangers_of(user).await {
            Ok(strangers) => {
                let (online_strangers, _) = self.registry.is_online(&strangers).await;
                for stranger in online_strangers {
                    self.emit_online_strangers(stranger).await;
                }
            }
            Err(e) => {
                warn!(%user, error = %e, "disconnect fan-out: stranger resolution failed");
            }
        }
    }

    /// Synchronous online-status probe.  Replies only to the requesting
    /// connection; no fan-out.
    pub async fn probe(&self, requester: &ConnectionHandle, target: UserId) {
        let (online, _) = self.registry.is_online(&[target]).await;
        let status = UserOnlineStatus {
            user_id: target,
            is_online: !online.is_empty(),
        };
        requester.emit(EVENT_USER_ONLINE_STATUS, &status);
    }

    /// Recompute and push `user`'s online-friends view, if `user` is
    /// currently connected.  Payload: array of identity strings.
    async fn emit_online_friends(&self, user: UserId) {
        let Some(handle) = self.registry.lookup(user).await else {
            return;
        };

        let friends = match self.resolver.friends_of(user).await {
            Ok(friends) => friends,
            Err(e) => {
                warn!(%user, error = %e, "online-friends emit failed");
                return;
            }
        };
        let (online, _) = self.registry.is_online(&friends).await;

        handle.emit(EVENT_ONLINE_FRIENDS, &online);
    }

    /// Recompute and push `user`'s online-strangers view (with minimal
    /// profiles), if `user` is currently connected.
    async fn emit_online_strangers(&self, user: UserId) {
        let Some(handle) = self.registry.lookup(user).await else {
            return;
        };

        let strangers = match self.resolver.strangers_of(user).await {
            Ok(strangers) => strangers,
            Err(e) => {
                warn!(%user, error = %e, "online-strangers emit failed");
                return;
            }
        };
        let (online, _) = self.registry.is_online(&strangers).await;

        let mut rows = Vec::with_capacity(online.len());
        {
            let db = self.db.lock().await;
            for id in online {
                match db.get_user(id) {
                    Ok(Some(row)) => rows.push(OnlineStranger {
                        user: row.into_profile(),
                    }),
                    Ok(None) => warn!(stranger = %id, "online stranger has no profile, skipping"),
                    Err(e) => {
                        warn!(%user, error = %e, "online-strangers emit failed");
                        return;
                    }
                }
            }
        }

        handle.emit(EVENT_ONLINE_STRANGERS, &rows);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use parley_shared::protocol::PushFrame;
    use parley_store::{Database, FriendEdge, FriendStatus, UserRow};
    use tokio::sync::{mpsc, Mutex};

    fn shared_db() -> SharedDb {
        Arc::new(Mutex::new(Database::open_in_memory().unwrap()))
    }

    async fn seed_user(db: &SharedDb, name: &str) -> UserId {
        let user = UserRow {
            id: UserId::new(),
            username: name.to_string(),
            email: format!("{name}@example.com"),
            avatar_url: None,
            created_at: Utc::now(),
        };
        db.lock().await.upsert_user(&user).unwrap();
        user.id
    }

    async fn befriend(db: &SharedDb, a: UserId, b: UserId) {
        db.lock()
            .await
            .add_friend_edge(&FriendEdge {
                requester: a,
                addressee: b,
                status: FriendStatus::Accepted,
                created_at: Utc::now(),
            })
            .unwrap();
    }

    fn fanout(db: &SharedDb) -> PresenceFanout {
        PresenceFanout::new(
            db.clone(),
            Arc::new(PresenceRegistry::new()),
            ContactResolver::new(db.clone()),
        )
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<PushFrame>) -> Vec<PushFrame> {
        let mut frames = Vec::new();
        while let Ok(frame) = rx.try_recv() {
            frames.push(frame);
        }
        frames
    }

    #[tokio::test]
    async fn connect_pushes_own_views_first() {
        let db = shared_db();
        let scheduler = fanout(&db);
        let user = seed_user(&db, "user").await;

        let (handle, mut rx) = ConnectionHandle::new();
        scheduler.handle_connect(user, handle).await;

        let events: Vec<String> = drain(&mut rx).into_iter().map(|f| f.event).collect();
        assert_eq!(events, vec!["getOnlineFriends", "getOnlineStrangers"]);
    }

    #[tokio::test]
    async fn connect_updates_an_online_friend() {
        let db = shared_db();
        let scheduler = fanout(&db);
        let first = seed_user(&db, "first").await;
        let second = seed_user(&db, "second").await;
        befriend(&db, first, second).await;

        let (first_handle, mut first_rx) = ConnectionHandle::new();
        scheduler.handle_connect(first, first_handle).await;
        drain(&mut first_rx);

        let (second_handle, _second_rx) = ConnectionHandle::new();
        scheduler.handle_connect(second, second_handle).await;

        let frames = drain(&mut first_rx);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].event, "getOnlineFriends");
        assert_eq!(frames[0].data[0], second.to_string());
    }

    #[tokio::test]
    async fn stale_disconnect_produces_no_fanout() {
        let db = shared_db();
        let scheduler = fanout(&db);
        let first = seed_user(&db, "first").await;
        let second = seed_user(&db, "second").await;
        befriend(&db, first, second).await;

        let (first_handle, mut first_rx) = ConnectionHandle::new();
        scheduler.handle_connect(first, first_handle).await;

        let (old, _old_rx) = ConnectionHandle::new();
        let (new, _new_rx) = ConnectionHandle::new();
        scheduler.handle_connect(second, old.clone()).await;
        scheduler.handle_connect(second, new).await;
        drain(&mut first_rx);

        // Old connection's disconnect arrives after the reconnect.
        scheduler.handle_disconnect(second, &old).await;

        assert!(drain(&mut first_rx).is_empty());
    }

    #[tokio::test]
    async fn probe_answers_only_the_requester() {
        let db = shared_db();
        let scheduler = fanout(&db);
        let target = seed_user(&db, "target").await;

        let (requester, mut rx) = ConnectionHandle::new();
        scheduler.probe(&requester, target).await;

        let frames = drain(&mut rx);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].event, "getUserOnlineStatus");
        assert_eq!(frames[0].data["isOnline"], false);
    }
}
