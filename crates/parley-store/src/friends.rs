//! Read-only view of the `friends` table.
//!
//! The relationship service owns friend CRUD; the engine only ever asks
//! "who are the accepted friends of X".  The write helper exists for tests
//! and operational mirroring only.

use rusqlite::params;

use parley_shared::UserId;

use crate::database::Database;
use crate::error::Result;
use crate::models::{FriendEdge, FriendStatus};

impl Database {
    /// Accepted friends of `user`, resolved to the identity on the other
    /// side of each edge, deduplicated.
    pub fn friend_ids_of(&self, user: UserId) -> Result<Vec<UserId>> {
        let mut stmt = self.conn().prepare(
            "SELECT DISTINCT CASE WHEN requester = ?1 THEN addressee ELSE requester END
             FROM friends
             WHERE status = 'accepted' AND (requester = ?1 OR addressee = ?1)",
        )?;

        let rows = stmt.query_map(params![user.to_string()], |row| {
            let id: String = row.get(0)?;
            UserId::parse(&id).map_err(|e| {
                rusqlite::Error::FromSqlConversionFailure(
                    0,
                    rusqlite::types::Type::Text,
                    Box::new(e),
                )
            })
        })?;

        let mut ids = Vec::new();
        for row in rows {
            ids.push(row?);
        }
        Ok(ids)
    }

    /// Mirror a friend edge.  Tests and ops tooling only; the engine never
    /// writes this table.
    pub fn add_friend_edge(&self, edge: &FriendEdge) -> Result<()> {
        self.conn().execute(
            "INSERT INTO friends (requester, addressee, status, created_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(requester, addressee) DO UPDATE SET status = excluded.status",
            params![
                edge.requester.to_string(),
                edge.addressee.to_string(),
                edge.status.as_str(),
                edge.created_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }
}
