//! # parley-store
//!
//! SQLite persistence for the Parley messaging backend.
//!
//! The crate exposes a synchronous [`Database`] handle that wraps a
//! `rusqlite::Connection` and provides typed helpers for the message ledger
//! plus read-only views of the `users` and `friends` tables (those tables
//! are owned by the account and relationship services; this crate only
//! mirrors and reads them).
//!
//! The one write path with real invariants is
//! [`Database::append_and_anchor`]: a single transaction that moves the
//! per-conversation "last message" anchor, backed by a partial UNIQUE index
//! so that two anchored messages for one conversation cannot commit.

pub mod database;
pub mod friends;
pub mod messages;
pub mod migrations;
pub mod models;
pub mod users;

mod error;

pub use database::Database;
pub use error::StoreError;
pub use models::*;
