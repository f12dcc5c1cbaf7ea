//! Domain model structs persisted in the SQLite database.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use parley_shared::{ConversationKey, DeliveryState, MessageKind, Profile, UserId};

// ---------------------------------------------------------------------------
// Message
// ---------------------------------------------------------------------------

/// A single direct message, as stored in the ledger.
///
/// `is_last_in_conversation` is the per-conversation anchor: it is set and
/// cleared only by [`Database::append_and_anchor`], never by callers.
///
/// [`Database::append_and_anchor`]: crate::Database::append_and_anchor
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Message {
    /// Unique message identifier.
    pub id: Uuid,
    /// Identity that sent the message.
    pub sender_id: UserId,
    /// Identity that received the message.
    pub receiver_id: UserId,
    /// Derived key of the conversation pair.
    pub conversation_key: ConversationKey,
    /// What the message carries.
    pub kind: MessageKind,
    /// Body for text messages; optional caption for media kinds.
    pub content: Option<String>,
    /// Opaque media URL, resolved by the upload service before the send.
    pub media_ref: Option<String>,
    /// Commit timestamp.
    pub created_at: DateTime<Utc>,
    /// Receiver-side read marker (set by the read-receipt collaborator).
    pub read_at: Option<DateTime<Utc>>,
    /// Delivery state (`delivered` until the receiver marks it `seen`).
    pub delivery_state: DeliveryState,
    /// Whether this is the anchored most-recent message of its conversation.
    pub is_last_in_conversation: bool,
}

// ---------------------------------------------------------------------------
// User (read-only mirror)
// ---------------------------------------------------------------------------

/// A row of the `users` table, owned by the external identity service.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserRow {
    pub id: UserId,
    pub username: String,
    pub email: String,
    pub avatar_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl UserRow {
    /// Trim to the minimal profile shape pushed over the wire.
    pub fn into_profile(self) -> Profile {
        Profile {
            id: self.id,
            username: self.username,
            email: self.email,
            avatar_url: self.avatar_url,
        }
    }
}

// ---------------------------------------------------------------------------
// Friend edge (read-only mirror)
// ---------------------------------------------------------------------------

/// State of a friend request.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FriendStatus {
    Pending,
    Accepted,
}

impl FriendStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Accepted => "accepted",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "accepted" => Some(Self::Accepted),
            _ => None,
        }
    }
}

/// A row of the `friends` table, owned by the external relationship service.
/// The edge is undirected once `status` is [`FriendStatus::Accepted`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FriendEdge {
    pub requester: UserId,
    pub addressee: UserId,
    pub status: FriendStatus,
    pub created_at: DateTime<Utc>,
}
