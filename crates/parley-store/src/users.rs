//! Read-only view of the `users` table.
//!
//! The identity service owns this data; the engine consumes it as its
//! "is this identity known" predicate and for profile resolution.  The
//! write helper exists for tests and operational mirroring only.

use chrono::{DateTime, Utc};
use rusqlite::params;

use parley_shared::UserId;

use crate::database::Database;
use crate::error::Result;
use crate::models::UserRow;

impl Database {
    /// Look up a user by id.  Returns `None` for unknown identities.
    pub fn get_user(&self, id: UserId) -> Result<Option<UserRow>> {
        let mut stmt = self.conn().prepare(
            "SELECT id, username, email, avatar_url, created_at FROM users WHERE id = ?1",
        )?;

        let mut rows = stmt.query_map(params![id.to_string()], row_to_user)?;
        match rows.next() {
            Some(row) => Ok(Some(row?)),
            None => Ok(None),
        }
    }

    /// Whether `id` resolves to a known identity.
    pub fn user_exists(&self, id: UserId) -> Result<bool> {
        let count: i64 = self.conn().query_row(
            "SELECT COUNT(*) FROM users WHERE id = ?1",
            params![id.to_string()],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// Insert or refresh a mirrored user row.  Tests and ops tooling only;
    /// the engine never writes this table.
    pub fn upsert_user(&self, user: &UserRow) -> Result<()> {
        self.conn().execute(
            "INSERT INTO users (id, username, email, avatar_url, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(id) DO UPDATE SET
                 username = excluded.username,
                 email = excluded.email,
                 avatar_url = excluded.avatar_url",
            params![
                user.id.to_string(),
                user.username,
                user.email,
                user.avatar_url,
                user.created_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }
}

fn row_to_user(row: &rusqlite::Row<'_>) -> rusqlite::Result<UserRow> {
    let id_str: String = row.get(0)?;
    let created_str: String = row.get(4)?;

    let id = UserId::parse(&id_str).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
    })?;

    let created_at: DateTime<Utc> = DateTime::parse_from_rfc3339(&created_str)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(4, rusqlite::types::Type::Text, Box::new(e))
        })?;

    Ok(UserRow {
        id,
        username: row.get(1)?,
        email: row.get(2)?,
        avatar_url: row.get(3)?,
        created_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_user_resolves_to_none() {
        let db = Database::open_in_memory().unwrap();
        assert!(db.get_user(UserId::new()).unwrap().is_none());
        assert!(!db.user_exists(UserId::new()).unwrap());
    }

    #[test]
    fn upsert_then_get_round_trip() {
        let db = Database::open_in_memory().unwrap();
        let user = UserRow {
            id: UserId::new(),
            username: "ada".into(),
            email: "ada@example.com".into(),
            avatar_url: Some("https://cdn.example.com/a.png".into()),
            created_at: Utc::now(),
        };
        db.upsert_user(&user).unwrap();

        let fetched = db.get_user(user.id).unwrap().unwrap();
        assert_eq!(fetched.username, "ada");
        assert_eq!(fetched.avatar_url.as_deref(), Some("https://cdn.example.com/a.png"));
        assert!(db.user_exists(user.id).unwrap());
    }
}
