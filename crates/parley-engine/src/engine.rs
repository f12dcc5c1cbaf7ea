//! The engine facade exposed to the transport layer.
//!
//! Calls arriving here are assumed already authenticated and well-typed;
//! credential checks, friend CRUD, and media upload are collaborator
//! concerns.

use std::collections::HashMap;
use std::sync::Arc;

use parley_shared::protocol::{MessagePayload, EVENT_RECEIVE_MESSAGE};
use parley_shared::{Audience, Profile, UserId};
use parley_store::StoreError;

use crate::error::{EngineError, Result};
use crate::fanout::PresenceFanout;
use crate::ledger::{MessageLedger, SendMessage};
use crate::listing::{ConversationPage, ListingAssembler};
use crate::payload;
use crate::registry::{ConnectionHandle, PresenceRegistry};
use crate::resolver::ContactResolver;
use crate::SharedDb;

/// Conversation & presence synchronization engine.
///
/// Owns the message ledger, the presence registry, and the fan-out
/// scheduler; one instance serves the whole process.
pub struct Engine {
    db: SharedDb,
    ledger: MessageLedger,
    registry: Arc<PresenceRegistry>,
    listing: ListingAssembler,
    fanout: PresenceFanout,
}

impl Engine {
    pub fn new(db: SharedDb) -> Self {
        let registry = Arc::new(PresenceRegistry::new());
        let resolver = ContactResolver::new(db.clone());
        Self {
            ledger: MessageLedger::new(db.clone()),
            listing: ListingAssembler::new(db.clone(), resolver.clone()),
            fanout: PresenceFanout::new(db.clone(), registry.clone(), resolver),
            registry,
            db,
        }
    }

    /// Whether `user` resolves to a known identity.  The transport layer
    /// calls this before accepting a push-channel connection.
    pub async fn is_authorized(&self, user: UserId) -> Result<bool> {
        let db = self.db.lock().await;
        Ok(db.user_exists(user)?)
    }

    /// Commit one message and push it to both participants' registered
    /// connections (best-effort; an offline participant is simply skipped).
    pub async fn send_message(&self, request: SendMessage) -> Result<MessagePayload> {
        let message = self.ledger.append_and_anchor(request).await?;

        let profiles = self
            .load_profiles(&[message.sender_id, message.receiver_id])
            .await?;
        let payload =
            payload::build(&message, &profiles).ok_or(EngineError::Store(StoreError::NotFound))?;

        for participant in [message.receiver_id, message.sender_id] {
            if let Some(handle) = self.registry.lookup(participant).await {
                handle.emit(EVENT_RECEIVE_MESSAGE, &payload);
            }
        }

        Ok(payload)
    }

    /// Full chronological history between `a` and `b`, oldest first.
    pub async fn get_history(&self, a: UserId, b: UserId) -> Result<Vec<MessagePayload>> {
        let messages = self.ledger.history(a, b).await?;
        if messages.is_empty() {
            return Ok(Vec::new());
        }

        let profiles = self.load_profiles(&[a, b]).await?;
        messages
            .iter()
            .map(|message| {
                payload::build(message, &profiles).ok_or(EngineError::Store(StoreError::NotFound))
            })
            .collect()
    }

    /// Paginated, recency-sorted listing of `user`'s conversations.
    pub async fn list_conversations(
        &self,
        user: UserId,
        audience: Audience,
        skip: usize,
        limit: usize,
    ) -> Result<ConversationPage> {
        self.listing
            .list_conversations(user, audience, skip, limit)
            .await
    }

    /// A push-channel connection opened for `user`.
    pub async fn on_connect(&self, user: UserId, handle: ConnectionHandle) {
        self.fanout.handle_connect(user, handle).await;
    }

    /// A push-channel connection closed for `user`.
    pub async fn on_disconnect(&self, user: UserId, handle: &ConnectionHandle) {
        self.fanout.handle_disconnect(user, handle).await;
    }

    /// Online-status probe; replies on the requesting connection only.
    pub async fn probe_online(&self, requester: &ConnectionHandle, target: UserId) {
        self.fanout.probe(requester, target).await;
    }

    /// Maintenance hook: drop per-conversation lock entries with no
    /// in-flight send.  Returns the number of entries kept.
    pub async fn purge_idle_locks(&self) -> usize {
        self.ledger.purge_idle_locks().await
    }

    async fn load_profiles(&self, ids: &[UserId]) -> Result<HashMap<UserId, Profile>> {
        let db = self.db.lock().await;
        let mut profiles = HashMap::with_capacity(ids.len());
        for &id in ids {
            let row = db
                .get_user(id)?
                .ok_or(EngineError::Store(StoreError::NotFound))?;
            profiles.insert(id, row.into_profile());
        }
        Ok(profiles)
    }
}
