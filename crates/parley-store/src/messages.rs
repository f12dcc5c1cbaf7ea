//! Message ledger queries and the append-and-anchor write path.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use rusqlite::params;
use uuid::Uuid;

use parley_shared::{ConversationKey, DeliveryState, MessageKind, UserId};

use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::models::Message;

const MESSAGE_COLUMNS: &str = "id, sender_id, receiver_id, conversation_key, kind, content, \
     media_ref, created_at, read_at, delivery_state, is_last";

impl Database {
    /// Append `message` and move its conversation's anchor to it, as one
    /// all-or-nothing transaction:
    ///
    /// 1. clear `is_last` on whichever message currently holds it,
    /// 2. insert the new message with `is_last = 1`,
    /// 3. verify exactly one anchor remains.
    ///
    /// A violation of step 3 (or the partial UNIQUE anchor index firing at
    /// step 2) rolls the transaction back and yields
    /// [`StoreError::AnchorConflict`].  No partially-applied state is ever
    /// visible to readers.
    pub fn append_and_anchor(&mut self, message: &Message) -> Result<()> {
        let key = message.conversation_key.clone();
        let tx = self.conn_mut().transaction()?;

        tx.execute(
            "UPDATE messages SET is_last = 0 WHERE conversation_key = ?1 AND is_last = 1",
            params![key.as_str()],
        )?;

        tx.execute(
            "INSERT INTO messages (id, sender_id, receiver_id, conversation_key, kind, \
             content, media_ref, created_at, read_at, delivery_state, is_last)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, 1)",
            params![
                message.id.to_string(),
                message.sender_id.to_string(),
                message.receiver_id.to_string(),
                key.as_str(),
                message.kind.as_str(),
                message.content,
                message.media_ref,
                message.created_at.to_rfc3339(),
                message.read_at.map(|t| t.to_rfc3339()),
                message.delivery_state.as_str(),
            ],
        )
        .map_err(|e| anchor_conflict_or(e, &key))?;

        let anchors: i64 = tx.query_row(
            "SELECT COUNT(*) FROM messages WHERE conversation_key = ?1 AND is_last = 1",
            params![key.as_str()],
            |row| row.get(0),
        )?;
        if anchors != 1 {
            // Dropping the transaction rolls it back.
            return Err(StoreError::AnchorConflict(key));
        }

        tx.commit()?;
        Ok(())
    }

    /// Full chronological history of a conversation, oldest first.
    pub fn messages_for_key(&self, key: &ConversationKey) -> Result<Vec<Message>> {
        let mut stmt = self.conn().prepare(&format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages
             WHERE conversation_key = ?1
             ORDER BY created_at ASC, rowid ASC"
        ))?;

        let rows = stmt.query_map(params![key.as_str()], row_to_message)?;

        let mut messages = Vec::new();
        for row in rows {
            messages.push(row?);
        }
        Ok(messages)
    }

    /// Batched lookup of the anchored last message per conversation key.
    ///
    /// Keys with no messages are simply absent from the returned map.
    pub fn last_messages(
        &self,
        keys: &[ConversationKey],
    ) -> Result<HashMap<ConversationKey, Message>> {
        if keys.is_empty() {
            return Ok(HashMap::new());
        }

        let placeholders = vec!["?"; keys.len()].join(", ");
        let sql = format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages
             WHERE is_last = 1 AND conversation_key IN ({placeholders})"
        );
        let mut stmt = self.conn().prepare(&sql)?;

        let rows = stmt.query_map(
            rusqlite::params_from_iter(keys.iter().map(|k| k.as_str())),
            row_to_message,
        )?;

        let mut map = HashMap::new();
        for row in rows {
            let message = row?;
            map.insert(message.conversation_key.clone(), message);
        }
        Ok(map)
    }

    /// Distinct counterparties across all messages sent or received by `user`.
    pub fn counterparties_of(&self, user: UserId) -> Result<Vec<UserId>> {
        let mut stmt = self.conn().prepare(
            "SELECT DISTINCT CASE WHEN sender_id = ?1 THEN receiver_id ELSE sender_id END
             FROM messages
             WHERE sender_id = ?1 OR receiver_id = ?1",
        )?;

        let rows = stmt.query_map(params![user.to_string()], |row| {
            let id: String = row.get(0)?;
            parse_user_id(&id, 0)
        })?;

        let mut ids = Vec::new();
        for row in rows {
            ids.push(row?);
        }
        Ok(ids)
    }
}

fn anchor_conflict_or(e: rusqlite::Error, key: &ConversationKey) -> StoreError {
    match e {
        rusqlite::Error::SqliteFailure(err, _)
            if err.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            StoreError::AnchorConflict(key.clone())
        }
        other => StoreError::Sqlite(other),
    }
}

fn parse_user_id(s: &str, idx: usize) -> rusqlite::Result<UserId> {
    UserId::parse(s).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}

fn parse_timestamp(s: &str, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
        })
}

fn row_to_message(row: &rusqlite::Row<'_>) -> rusqlite::Result<Message> {
    let id_str: String = row.get(0)?;
    let sender_str: String = row.get(1)?;
    let receiver_str: String = row.get(2)?;
    let key_str: String = row.get(3)?;
    let kind_str: String = row.get(4)?;
    let content: Option<String> = row.get(5)?;
    let media_ref: Option<String> = row.get(6)?;
    let created_str: String = row.get(7)?;
    let read_str: Option<String> = row.get(8)?;
    let state_str: String = row.get(9)?;
    let is_last: bool = row.get(10)?;

    let id = Uuid::parse_str(&id_str).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
    })?;

    let kind = MessageKind::parse(&kind_str).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            4,
            rusqlite::types::Type::Text,
            format!("unknown message kind: {kind_str}").into(),
        )
    })?;

    let delivery_state = DeliveryState::parse(&state_str).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            9,
            rusqlite::types::Type::Text,
            format!("unknown delivery state: {state_str}").into(),
        )
    })?;

    let read_at = match read_str {
        Some(s) => Some(parse_timestamp(&s, 8)?),
        None => None,
    };

    Ok(Message {
        id,
        sender_id: parse_user_id(&sender_str, 1)?,
        receiver_id: parse_user_id(&receiver_str, 2)?,
        conversation_key: ConversationKey::from_raw(key_str),
        kind,
        content,
        media_ref,
        created_at: parse_timestamp(&created_str, 7)?,
        read_at,
        delivery_state,
        is_last_in_conversation: is_last,
    })
}
