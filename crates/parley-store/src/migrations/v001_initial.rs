//! v001 -- Initial schema creation.
//!
//! Creates the three core tables: `users`, `friends`, and `messages`.
//! `users` and `friends` are owned by the account/relationship services and
//! are only read by this crate (plus seeded by tests and operational tools).

use rusqlite::Connection;

/// SQL executed when upgrading from version 0 to version 1.
const UP_SQL: &str = r#"
-- ----------------------------------------------------------------
-- Users (mirror of the identity service; read-only here)
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS users (
    id         TEXT PRIMARY KEY NOT NULL,   -- UUID v4
    username   TEXT NOT NULL,
    email      TEXT NOT NULL,
    avatar_url TEXT,
    created_at TEXT NOT NULL                -- ISO-8601 / RFC-3339
);

-- ----------------------------------------------------------------
-- Friend edges (mirror of the relationship service; read-only here)
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS friends (
    requester  TEXT NOT NULL,               -- FK -> users(id)
    addressee  TEXT NOT NULL,               -- FK -> users(id)
    status     TEXT NOT NULL DEFAULT 'pending',  -- pending | accepted
    created_at TEXT NOT NULL,

    PRIMARY KEY (requester, addressee),
    FOREIGN KEY (requester) REFERENCES users(id) ON DELETE CASCADE,
    FOREIGN KEY (addressee) REFERENCES users(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_friends_addressee ON friends(addressee);

-- ----------------------------------------------------------------
-- Messages (owned by this crate)
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS messages (
    id               TEXT PRIMARY KEY NOT NULL,  -- UUID v4
    sender_id        TEXT NOT NULL,              -- FK -> users(id)
    receiver_id      TEXT NOT NULL,              -- FK -> users(id)
    conversation_key TEXT NOT NULL,              -- derived pair key
    kind             TEXT NOT NULL DEFAULT 'text',       -- text | image | file | voice
    content          TEXT,                       -- body for text, caption otherwise
    media_ref        TEXT,                       -- opaque URL for non-text kinds
    created_at       TEXT NOT NULL,              -- ISO-8601
    read_at          TEXT,                       -- receiver-side read marker
    delivery_state   TEXT NOT NULL DEFAULT 'delivered',  -- delivered | seen
    is_last          INTEGER NOT NULL DEFAULT 0, -- boolean 0/1

    FOREIGN KEY (sender_id) REFERENCES users(id),
    FOREIGN KEY (receiver_id) REFERENCES users(id)
);

CREATE INDEX IF NOT EXISTS idx_messages_key_created
    ON messages(conversation_key, created_at);

CREATE INDEX IF NOT EXISTS idx_messages_sender ON messages(sender_id);
CREATE INDEX IF NOT EXISTS idx_messages_receiver ON messages(receiver_id);

-- At most one anchored message per conversation.  A transaction that would
-- leave two anchors fails at the insert instead of committing.
CREATE UNIQUE INDEX IF NOT EXISTS idx_messages_anchor
    ON messages(conversation_key) WHERE is_last = 1;
"#;

/// Apply the initial migration.
pub fn up(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(UP_SQL)
}
