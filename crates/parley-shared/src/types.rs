use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

// User identity. Opaque and stable; owned by the external identity store,
// Parley only ever reads it.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct UserId(pub Uuid);

impl UserId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn parse(s: &str) -> Result<Self, uuid::Error> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

impl Default for UserId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Attempted to derive a conversation key for an identity paired with itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("a conversation requires two distinct identities")]
pub struct InvalidPair;

/// Canonical identifier for the message thread between two identities.
///
/// Derived by sorting the two identity strings lexicographically and joining
/// them with `_`, so `derive(a, b) == derive(b, a)`.  Keys are computed on
/// demand and never have a lifecycle of their own.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct ConversationKey(String);

impl ConversationKey {
    /// Derive the key for the pair `(a, b)`.
    ///
    /// Deterministic, commutative, side-effect-free.  Fails iff `a == b`.
    pub fn derive(a: UserId, b: UserId) -> Result<Self, InvalidPair> {
        if a == b {
            return Err(InvalidPair);
        }
        let (mut lo, mut hi) = (a.to_string(), b.to_string());
        if lo > hi {
            std::mem::swap(&mut lo, &mut hi);
        }
        Ok(Self(format!("{lo}_{hi}")))
    }

    /// Reconstruct a key from its stored string form.
    ///
    /// Only the store layer should need this, when reading the
    /// `conversation_key` column back out of SQLite.
    pub fn from_raw(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ConversationKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// What a message carries.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    Text,
    Image,
    File,
    Voice,
}

impl MessageKind {
    /// Storage form (matches the serde representation).
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Image => "image",
            Self::File => "file",
            Self::Voice => "voice",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "text" => Some(Self::Text),
            "image" => Some(Self::Image),
            "file" => Some(Self::File),
            "voice" => Some(Self::Voice),
            _ => None,
        }
    }
}

/// Delivery state of a message.  The `Delivered -> Seen` transition is owned
/// by the read-receipt collaborator, not by this engine.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryState {
    Delivered,
    Seen,
}

impl DeliveryState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Delivered => "delivered",
            Self::Seen => "seen",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "delivered" => Some(Self::Delivered),
            "seen" => Some(Self::Seen),
            _ => None,
        }
    }
}

/// Which counterpart set a conversation listing is drawn from.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Audience {
    /// Identities with a mutually-accepted relationship edge.
    Friends,
    /// Identities with message history but no accepted edge.
    Strangers,
}

impl Audience {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "friends" => Some(Self::Friends),
            "strangers" => Some(Self::Strangers),
            _ => None,
        }
    }
}

/// Minimal user profile, as resolved from the external identity store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    pub id: UserId,
    pub username: String,
    pub email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derive_key_is_commutative() {
        let a = UserId::new();
        let b = UserId::new();
        assert_eq!(
            ConversationKey::derive(a, b).unwrap(),
            ConversationKey::derive(b, a).unwrap()
        );
    }

    #[test]
    fn derive_key_orders_lexicographically() {
        let a = UserId::parse("00000000-0000-0000-0000-000000000001").unwrap();
        let b = UserId::parse("00000000-0000-0000-0000-000000000002").unwrap();
        let key = ConversationKey::derive(b, a).unwrap();
        assert_eq!(key.as_str(), format!("{a}_{b}"));
    }

    #[test]
    fn derive_key_rejects_self_pair() {
        let a = UserId::new();
        assert_eq!(ConversationKey::derive(a, a), Err(InvalidPair));
    }

    #[test]
    fn message_kind_round_trip() {
        for kind in [
            MessageKind::Text,
            MessageKind::Image,
            MessageKind::File,
            MessageKind::Voice,
        ] {
            assert_eq!(MessageKind::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(MessageKind::parse("video"), None);
    }

    #[test]
    fn user_id_serializes_as_plain_string() {
        let id = UserId::new();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{id}\""));
    }
}
