//! Friend and stranger set resolution.
//!
//! Both sets are recomputed from the store on every call; nothing is cached
//! across events, so relationship or message changes are visible
//! immediately.

use std::collections::HashSet;

use parley_shared::UserId;

use crate::error::Result;
use crate::SharedDb;

/// Classifies, for a given identity, who is a friend and who is a
/// message-history contact without an accepted edge ("stranger").
#[derive(Clone)]
pub struct ContactResolver {
    db: SharedDb,
}

impl ContactResolver {
    pub fn new(db: SharedDb) -> Self {
        Self { db }
    }

    /// Accepted friends of `user`.
    pub async fn friends_of(&self, user: UserId) -> Result<Vec<UserId>> {
        let db = self.db.lock().await;
        Ok(db.friend_ids_of(user)?)
    }

    /// Distinct message counterparties of `user` that are neither friends
    /// nor `user` itself.
    pub async fn strangers_of(&self, user: UserId) -> Result<Vec<UserId>> {
        let (counterparties, friends) = {
            let db = self.db.lock().await;
            (db.counterparties_of(user)?, db.friend_ids_of(user)?)
        };

        let friend_set: HashSet<UserId> = friends.into_iter().collect();
        Ok(counterparties
            .into_iter()
            .filter(|id| *id != user && !friend_set.contains(id))
            .collect())
    }
}
