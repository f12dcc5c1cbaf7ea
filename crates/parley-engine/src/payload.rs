//! Conversion from stored messages to the normalized wire payload.

use std::collections::HashMap;

use parley_shared::protocol::MessagePayload;
use parley_shared::{Profile, UserId};
use parley_store::Message;

/// Build the push/response payload for `message`, resolving participants
/// from `profiles`.  Returns `None` if either profile is missing.
pub(crate) fn build(
    message: &Message,
    profiles: &HashMap<UserId, Profile>,
) -> Option<MessagePayload> {
    Some(MessagePayload {
        id: message.id,
        sender: profiles.get(&message.sender_id)?.clone(),
        receiver: profiles.get(&message.receiver_id)?.clone(),
        kind: message.kind,
        content: message.content.clone(),
        media_ref: message.media_ref.clone(),
        created_at: message.created_at,
        delivery_state: message.delivery_state,
        is_last_in_conversation: message.is_last_in_conversation,
    })
}
