//! Async message ledger.
//!
//! Wraps the store's append-and-anchor transaction with payload validation,
//! receiver resolution, and the per-conversation-key critical section that
//! serializes concurrent sends for the same pair.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::Mutex;
use tracing::warn;
use uuid::Uuid;

use parley_shared::{ConversationKey, DeliveryState, MessageKind, UserId};
use parley_store::{Message, StoreError};

use crate::error::{EngineError, Result};
use crate::SharedDb;

/// Maximum length of a text body or media caption, in characters.
pub const MAX_CONTENT_CHARS: usize = 2000;

/// Attempts at the anchor transaction before surfacing the conflict.
const MAX_ANCHOR_ATTEMPTS: u32 = 3;

/// A validated send request, as delivered by the transport layer.
#[derive(Debug, Clone)]
pub struct SendMessage {
    pub sender: UserId,
    pub receiver: UserId,
    pub kind: MessageKind,
    /// Body for text messages; optional caption otherwise.
    pub content: Option<String>,
    /// Opaque media URL, already resolved by the upload collaborator.
    pub media_ref: Option<String>,
}

/// Append-only message store with a serialized re-anchor step per
/// conversation key.
pub struct MessageLedger {
    db: SharedDb,
    key_locks: Mutex<HashMap<ConversationKey, Arc<Mutex<()>>>>,
}

impl MessageLedger {
    pub fn new(db: SharedDb) -> Self {
        Self {
            db,
            key_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Validate, commit, and anchor one message.
    ///
    /// The clear+insert pair runs inside the store transaction while this
    /// task holds the conversation's key lock, so two sends for the same
    /// pair are linearized; sends for different pairs only contend on the
    /// brief connection critical section.  An [`StoreError::AnchorConflict`]
    /// is retried up to [`MAX_ANCHOR_ATTEMPTS`] times before being surfaced.
    pub async fn append_and_anchor(&self, request: SendMessage) -> Result<Message> {
        validate(&request)?;
        let key = ConversationKey::derive(request.sender, request.receiver)?;

        {
            let db = self.db.lock().await;
            if !db.user_exists(request.receiver)? {
                return Err(EngineError::RecipientNotFound(request.receiver));
            }
        }

        let key_lock = self.key_lock(&key).await;
        let _guard = key_lock.lock().await;

        let mut attempt = 0;
        loop {
            attempt += 1;
            let message = Message {
                id: Uuid::new_v4(),
                sender_id: request.sender,
                receiver_id: request.receiver,
                conversation_key: key.clone(),
                kind: request.kind,
                content: request.content.clone(),
                media_ref: request.media_ref.clone(),
                created_at: Utc::now(),
                read_at: None,
                delivery_state: DeliveryState::Delivered,
                is_last_in_conversation: true,
            };

            let result = {
                let mut db = self.db.lock().await;
                db.append_and_anchor(&message)
            };

            match result {
                Ok(()) => return Ok(message),
                Err(StoreError::AnchorConflict(_)) if attempt < MAX_ANCHOR_ATTEMPTS => {
                    warn!(key = %key, attempt, "anchor conflict, retrying");
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Full chronological history between `a` and `b`, oldest first.
    pub async fn history(&self, a: UserId, b: UserId) -> Result<Vec<Message>> {
        let key = ConversationKey::derive(a, b)?;
        let db = self.db.lock().await;
        Ok(db.messages_for_key(&key)?)
    }

    /// Batched anchored-message lookup, one round trip for any number of keys.
    pub async fn last_messages(
        &self,
        keys: &[ConversationKey],
    ) -> Result<HashMap<ConversationKey, Message>> {
        let db = self.db.lock().await;
        Ok(db.last_messages(keys)?)
    }

    async fn key_lock(&self, key: &ConversationKey) -> Arc<Mutex<()>> {
        let mut locks = self.key_locks.lock().await;
        locks
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Drop lock entries for conversations with no in-flight send.
    ///
    /// The lock table grows with every conversation ever written to; the
    /// server runs this periodically.  Returns how many entries were kept.
    pub async fn purge_idle_locks(&self) -> usize {
        let mut locks = self.key_locks.lock().await;
        locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        locks.len()
    }
}

fn validate(request: &SendMessage) -> Result<()> {
    match request.kind {
        MessageKind::Text => {
            let content = request.content.as_deref().unwrap_or("");
            if content.trim().is_empty() {
                return Err(EngineError::Validation(
                    "text messages require non-empty content".into(),
                ));
            }
        }
        _ => {
            let media_ref = request.media_ref.as_deref().unwrap_or("");
            if media_ref.is_empty() {
                return Err(EngineError::Validation(format!(
                    "{} messages require a media reference",
                    request.kind.as_str()
                )));
            }
        }
    }

    if let Some(content) = &request.content {
        if content.chars().count() > MAX_CONTENT_CHARS {
            return Err(EngineError::Validation(format!(
                "content exceeds {MAX_CONTENT_CHARS} characters"
            )));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use parley_store::{Database, UserRow};

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

    fn text(sender: UserId, receiver: UserId, body: &str) -> SendMessage {
        SendMessage {
            sender,
            receiver,
            kind: MessageKind::Text,
            content: Some(body.to_string()),
            media_ref: None,
        }
    }

    #[tokio::test]
    async fn append_anchors_the_new_message() {
        let db = shared_db();
        let ledger = MessageLedger::new(db.clone());
        let alice = seed_user(&db, "alice").await;
        let bob = seed_user(&db, "bob").await;

        let message = ledger.append_and_anchor(text(alice, bob, "hi")).await.unwrap();
        assert!(message.is_last_in_conversation);
        assert_eq!(message.delivery_state, DeliveryState::Delivered);
    }

    #[tokio::test]
    async fn empty_text_is_rejected() {
        let db = shared_db();
        let ledger = MessageLedger::new(db.clone());
        let alice = seed_user(&db, "alice").await;
        let bob = seed_user(&db, "bob").await;

        let err = ledger
            .append_and_anchor(text(alice, bob, "   "))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));
    }

    #[tokio::test]
    async fn media_without_reference_is_rejected() {
        let db = shared_db();
        let ledger = MessageLedger::new(db.clone());
        let alice = seed_user(&db, "alice").await;
        let bob = seed_user(&db, "bob").await;

        let request = SendMessage {
            sender: alice,
            receiver: bob,
            kind: MessageKind::Image,
            content: Some("caption".into()),
            media_ref: None,
        };
        let err = ledger.append_and_anchor(request).await.unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));
    }

    #[tokio::test]
    async fn oversized_content_is_rejected() {
        let db = shared_db();
        let ledger = MessageLedger::new(db.clone());
        let alice = seed_user(&db, "alice").await;
        let bob = seed_user(&db, "bob").await;

        let err = ledger
            .append_and_anchor(text(alice, bob, &"x".repeat(MAX_CONTENT_CHARS + 1)))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));
    }

    #[tokio::test]
    async fn unknown_receiver_is_rejected() {
        let db = shared_db();
        let ledger = MessageLedger::new(db.clone());
        let alice = seed_user(&db, "alice").await;
        let ghost = UserId::new();

        let err = ledger
            .append_and_anchor(text(alice, ghost, "hello?"))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::RecipientNotFound(id) if id == ghost));
    }

    #[tokio::test]
    async fn self_send_is_rejected() {
        let db = shared_db();
        let ledger = MessageLedger::new(db.clone());
        let alice = seed_user(&db, "alice").await;

        let err = ledger
            .append_and_anchor(text(alice, alice, "echo"))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidPair(_)));
    }

    #[tokio::test]
    async fn idle_locks_are_purged() {
        let db = shared_db();
        let ledger = MessageLedger::new(db.clone());
        let alice = seed_user(&db, "alice").await;
        let bob = seed_user(&db, "bob").await;

        ledger.append_and_anchor(text(alice, bob, "hi")).await.unwrap();
        assert_eq!(ledger.purge_idle_locks().await, 0);
    }
}
