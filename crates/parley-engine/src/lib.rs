//! # parley-engine
//!
//! The conversation & presence synchronization engine.
//!
//! Two sources of concurrent activity drive this crate: inbound send
//! requests and connection lifecycle events.  The two shared resources are
//! the [`PresenceRegistry`] (one `RwLock` table) and the message ledger's
//! per-conversation critical section ([`MessageLedger`], a per-key async
//! mutex around the store's append-and-anchor transaction).
//!
//! The [`Engine`] facade is what the transport layer talks to; it assumes
//! calls arrive already authenticated and well-typed.

pub mod engine;
pub mod fanout;
pub mod ledger;
pub mod listing;
pub mod registry;
pub mod resolver;

mod error;
mod payload;

use std::sync::Arc;

use tokio::sync::Mutex;

pub use engine::Engine;
pub use error::EngineError;
pub use ledger::{MessageLedger, SendMessage};
pub use listing::{ConversationEntry, ConversationPage};
pub use registry::{ConnectionHandle, PresenceRegistry};

/// Shared handle to the synchronous store, serialized behind an async mutex.
pub type SharedDb = Arc<Mutex<parley_store::Database>>;
