//! Push-channel protocol.
//!
//! Event names and payload shapes are fixed by the deployed web client and
//! must not change.  Every server-to-client push is a [`PushFrame`] JSON
//! envelope; the only client-to-server frame is the online-status probe.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::{DeliveryState, MessageKind, Profile, UserId};

/// A message was committed to a conversation the client participates in.
pub const EVENT_RECEIVE_MESSAGE: &str = "receiveMessage";
/// The client's online-friends view (payload: array of identity strings).
pub const EVENT_ONLINE_FRIENDS: &str = "getOnlineFriends";
/// The client's online-strangers view (payload: array of [`OnlineStranger`]).
pub const EVENT_ONLINE_STRANGERS: &str = "getOnlineStrangers";
/// Reply to an online-status probe (payload: [`UserOnlineStatus`]).
pub const EVENT_USER_ONLINE_STATUS: &str = "getUserOnlineStatus";
/// Client-to-server probe (payload: target identity string).
pub const EVENT_CHECK_USER_ONLINE: &str = "checkUserOnline";

/// Wire envelope for push-channel frames, in both directions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushFrame {
    pub event: String,
    pub data: serde_json::Value,
}

impl PushFrame {
    pub fn new<S: Serialize>(event: &str, data: &S) -> Result<Self, serde_json::Error> {
        Ok(Self {
            event: event.to_string(),
            data: serde_json::to_value(data)?,
        })
    }
}

/// Normalized message payload pushed with [`EVENT_RECEIVE_MESSAGE`] and
/// returned from the send/history/listing read paths.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct MessagePayload {
    pub id: Uuid,
    pub sender: Profile,
    pub receiver: Profile,
    pub kind: MessageKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub media_ref: Option<String>,
    pub created_at: DateTime<Utc>,
    pub delivery_state: DeliveryState,
    pub is_last_in_conversation: bool,
}

/// One row of the [`EVENT_ONLINE_STRANGERS`] payload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OnlineStranger {
    pub user: Profile,
}

/// Payload of [`EVENT_USER_ONLINE_STATUS`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UserOnlineStatus {
    pub user_id: UserId,
    pub is_online: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn online_friends_frame_shape() {
        let ids = vec![UserId::new(), UserId::new()];
        let frame = PushFrame::new(EVENT_ONLINE_FRIENDS, &ids).unwrap();
        let json = serde_json::to_value(&frame).unwrap();

        assert_eq!(json["event"], "getOnlineFriends");
        assert_eq!(json["data"][0], ids[0].to_string());
        assert_eq!(json["data"][1], ids[1].to_string());
    }

    #[test]
    fn user_online_status_uses_camel_case() {
        let status = UserOnlineStatus {
            user_id: UserId::new(),
            is_online: true,
        };
        let json = serde_json::to_value(&status).unwrap();
        assert!(json.get("userId").is_some());
        assert_eq!(json["isOnline"], true);
    }

    #[test]
    fn message_payload_omits_absent_media_ref() {
        let profile = Profile {
            id: UserId::new(),
            username: "ada".into(),
            email: "ada@example.com".into(),
            avatar_url: None,
        };
        let payload = MessagePayload {
            id: Uuid::new_v4(),
            sender: profile.clone(),
            receiver: profile,
            kind: MessageKind::Text,
            content: Some("hi".into()),
            media_ref: None,
            created_at: Utc::now(),
            delivery_state: DeliveryState::Delivered,
            is_last_in_conversation: true,
        };
        let json = serde_json::to_value(&payload).unwrap();

        assert_eq!(json["kind"], "text");
        assert!(json.get("mediaRef").is_none());
        assert_eq!(json["isLastInConversation"], true);
    }
}
