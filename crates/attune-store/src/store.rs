use std::path::Path;

use rusqlite::{Connection, OptionalExtension, params};

use attune_core::constants::DORMANCY_PERIOD_SECS;
use attune_core::{ConversationMessage, DataRetention, Role, UserProfile};

use crate::error::{Result, StoreError};
use crate::schema;

/// Rows removed by one retention sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PurgeReport {
    pub profiles: usize,
    pub messages: usize,
}

/// Retention window for `DataRetention::ThirtyDays`.
pub const RETENTION_WINDOW_SECS: u64 = DORMANCY_PERIOD_SECS;

pub struct Store {
    conn: Connection,
}

impl Store {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        schema::initialize(&conn)?;
        Ok(Self { conn })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        schema::initialize(&conn)?;
        Ok(Self { conn })
    }

    // --- Profiles ---

    /// Load a stored profile. A row whose JSON no longer parses is an error
    /// here; callers that want a fresh default use `get_or_create`.
    pub fn load_profile(&self, user_id: &str) -> Result<Option<UserProfile>> {
        let json: Option<String> = self
            .conn
            .query_row(
                "SELECT profile_json FROM profiles WHERE user_id = ?1",
                [user_id],
                |row| row.get(0),
            )
            .optional()?;
        match json {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    /// Persist `profile` according to its own retention consent.
    ///
    /// Session-only profiles are never written; any copy already on disk is
    /// removed along with the user's transcript. Returns whether a row was
    /// written.
    pub fn save_profile(&self, profile: &UserProfile, now: u64) -> Result<bool> {
        let retention = profile.consent.data_retention;
        if !retention.persists() {
            self.forget_user(&profile.user_id)?;
            return Ok(false);
        }

        let json = serde_json::to_string(profile)?;
        self.conn.execute(
            "INSERT INTO profiles (user_id, profile_json, retention, updated_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(user_id) DO UPDATE SET
                profile_json = excluded.profile_json,
                retention = excluded.retention,
                updated_at = excluded.updated_at",
            params![profile.user_id, json, retention.as_str(), to_sql_time(now)],
        )?;
        Ok(true)
    }

    /// Delete a user's profile and transcript.
    pub fn forget_user(&self, user_id: &str) -> Result<usize> {
        let tx = self.conn.unchecked_transaction()?;
        let profiles = tx.execute("DELETE FROM profiles WHERE user_id = ?1", [user_id])?;
        let messages = tx.execute("DELETE FROM conversation_log WHERE user_id = ?1", [user_id])?;
        tx.commit()?;
        Ok(profiles + messages)
    }

    // --- Transcript ---

    /// Append one message unless the retention policy forbids writing it.
    pub fn append_message(
        &self,
        session_id: &str,
        user_id: &str,
        message: &ConversationMessage,
        retention: DataRetention,
    ) -> Result<bool> {
        if !retention.persists() {
            return Ok(false);
        }
        self.conn.execute(
            "INSERT INTO conversation_log (session_id, user_id, role, content, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                session_id,
                user_id,
                message.role.as_str(),
                message.content,
                to_sql_time(message.timestamp),
            ],
        )?;
        Ok(true)
    }

    /// The last `limit` messages `user_id` exchanged in a session, oldest first.
    pub fn load_session(
        &self,
        session_id: &str,
        user_id: &str,
        limit: usize,
    ) -> Result<Vec<ConversationMessage>> {
        let mut stmt = self.conn.prepare(
            "SELECT role, content, created_at FROM conversation_log
             WHERE session_id = ?1 AND user_id = ?2 ORDER BY id DESC LIMIT ?3",
        )?;
        let rows: Vec<(String, String, i64)> = stmt
            .query_map(params![session_id, user_id, limit as i64], |row| {
                Ok((row.get(0)?, row.get(1)?, row.get(2)?))
            })?
            .collect::<std::result::Result<_, _>>()?;

        let mut messages = rows
            .into_iter()
            .map(|(role, content, created_at)| {
                let role = Role::parse(&role)
                    .ok_or_else(|| StoreError::InvalidData(format!("unknown role '{role}'")))?;
                Ok(ConversationMessage::at(role, &content, from_sql_time(created_at)))
            })
            .collect::<Result<Vec<_>>>()?;
        messages.reverse();
        Ok(messages)
    }

    // --- Retention ---

    /// Remove thirty-day data older than the window. Indefinite profiles and
    /// their transcripts are kept.
    pub fn purge_expired(&self, now: u64) -> Result<PurgeReport> {
        let cutoff = to_sql_time(now.saturating_sub(RETENTION_WINDOW_SECS));
        let tx = self.conn.unchecked_transaction()?;
        let profiles = tx.execute(
            "DELETE FROM profiles WHERE retention = ?1 AND updated_at < ?2",
            params![DataRetention::ThirtyDays.as_str(), cutoff],
        )?;
        let messages = tx.execute(
            "DELETE FROM conversation_log
             WHERE created_at < ?1
               AND user_id NOT IN (SELECT user_id FROM profiles WHERE retention = ?2)",
            params![cutoff, DataRetention::Indefinite.as_str()],
        )?;
        tx.commit()?;

        if profiles + messages > 0 {
            tracing::info!(profiles, messages, "purged expired data");
        }
        Ok(PurgeReport { profiles, messages })
    }

    /// Flush the WAL into the main database file.
    pub fn checkpoint_truncate(&self) -> Result<()> {
        self.conn.execute_batch("PRAGMA wal_checkpoint(TRUNCATE);")?;
        Ok(())
    }
}

fn to_sql_time(secs: u64) -> i64 {
    i64::try_from(secs).unwrap_or(i64::MAX)
}

fn from_sql_time(secs: i64) -> u64 {
    u64::try_from(secs).unwrap_or(0)
}

#[cfg(test)]
impl Store {
    pub(crate) fn conn(&self) -> &Connection {
        &self.conn
    }

    fn count(&self, table: &str) -> usize {
        let n: i64 = self
            .conn
            .query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| row.get(0))
            .unwrap();
        n as usize
    }
}
