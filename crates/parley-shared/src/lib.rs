//! # parley-shared
//!
//! Domain types and push-channel protocol shared by every Parley crate.
//!
//! This crate is deliberately small: identity and conversation-key types,
//! the message/presence enums, and the typed payloads that travel over the
//! push channel.  Everything stateful lives in `parley-store` and
//! `parley-engine`.

pub mod protocol;
pub mod types;

pub use types::{Audience, ConversationKey, DeliveryState, InvalidPair, MessageKind, Profile, UserId};
