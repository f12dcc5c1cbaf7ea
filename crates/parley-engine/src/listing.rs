//! Conversation listing assembler.
//!
//! The read path mirroring the ledger's write path: resolve the audience
//! set, batch-fetch anchored last messages, sort by recency, paginate.
//! Pagination is over the set of counterparts, not over messages, so page
//! boundaries stay stable as new messages arrive.

use std::collections::HashMap;

use serde::Serialize;

use parley_shared::protocol::MessagePayload;
use parley_shared::{Audience, ConversationKey, Profile, UserId};
use parley_store::StoreError;

use crate::error::{EngineError, Result};
use crate::payload;
use crate::resolver::ContactResolver;
use crate::SharedDb;

/// One row of a conversation listing.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationEntry {
    pub user: Profile,
    pub last_message: Option<MessagePayload>,
}

/// A page of conversation entries, most recent first.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationPage {
    pub data: Vec<ConversationEntry>,
    pub has_more: bool,
}

pub struct ListingAssembler {
    db: SharedDb,
    resolver: ContactResolver,
}

impl ListingAssembler {
    pub fn new(db: SharedDb, resolver: ContactResolver) -> Self {
        Self { db, resolver }
    }

    /// Assemble the `[skip, skip+limit)` page of `user`'s conversations with
    /// the given audience.
    ///
    /// The full audience set is sorted by the anchored message's timestamp
    /// (descending, counterparts with no messages last) before slicing, so
    /// concatenating consecutive pages partitions the audience set.
    pub async fn list_conversations(
        &self,
        user: UserId,
        audience: Audience,
        skip: usize,
        limit: usize,
    ) -> Result<ConversationPage> {
        let counterparts = match audience {
            Audience::Friends => self.resolver.friends_of(user).await?,
            Audience::Strangers => self.resolver.strangers_of(user).await?,
        };
        let counterparts: Vec<UserId> =
            counterparts.into_iter().filter(|id| *id != user).collect();
        let total = counterparts.len();

        let keyed: Vec<(UserId, ConversationKey)> = counterparts
            .into_iter()
            .map(|other| Ok((other, ConversationKey::derive(user, other)?)))
            .collect::<Result<_>>()?;
        let keys: Vec<ConversationKey> = keyed.iter().map(|(_, k)| k.clone()).collect();

        let anchored = {
            let db = self.db.lock().await;
            db.last_messages(&keys)?
        };

        let mut ordered: Vec<_> = keyed
            .into_iter()
            .map(|(other, key)| {
                let last = anchored.get(&key).cloned();
                (other, last)
            })
            .collect();
        // Recency first; counterparts with no messages last, id as a
        // deterministic tiebreak.
        ordered.sort_by(|a, b| {
            let ta = a.1.as_ref().map(|m| m.created_at);
            let tb = b.1.as_ref().map(|m| m.created_at);
            tb.cmp(&ta).then_with(|| a.0.cmp(&b.0))
        });

        let end = (skip + limit).min(ordered.len());
        let page = if skip < ordered.len() {
            &ordered[skip..end]
        } else {
            &[]
        };

        let mut profiles: HashMap<UserId, Profile> = HashMap::new();
        {
            let db = self.db.lock().await;
            let me = db
                .get_user(user)?
                .ok_or(EngineError::Store(StoreError::NotFound))?;
            profiles.insert(user, me.into_profile());
            for (other, _) in page {
                let row = db
                    .get_user(*other)?
                    .ok_or(EngineError::Store(StoreError::NotFound))?;
                profiles.insert(*other, row.into_profile());
            }
        }

        let mut data = Vec::with_capacity(page.len());
        for (other, last) in page {
            let last_message = match last {
                Some(message) => Some(
                    payload::build(message, &profiles)
                        .ok_or(EngineError::Store(StoreError::NotFound))?,
                ),
                None => None,
            };
            data.push(ConversationEntry {
                user: profiles[other].clone(),
                last_message,
            });
        }

        Ok(ConversationPage {
            data,
            has_more: skip + limit < total,
        })
    }
}
