//! Storage-agnostic profile contract used by the session engine.

use std::collections::BTreeMap;

use attune_core::{ConversationMessage, DataRetention, UserProfile};

use crate::error::Result;
use crate::store::{PurgeReport, RETENTION_WINDOW_SECS, Store};

pub trait ProfileRepository: Send {
    fn load_profile(&self, user_id: &str) -> Result<Option<UserProfile>>;

    /// Persist according to the profile's retention consent. Returns whether
    /// anything was written.
    fn save_profile(&mut self, profile: &UserProfile, now: u64) -> Result<bool>;

    fn append_message(
        &mut self,
        session_id: &str,
        user_id: &str,
        message: &ConversationMessage,
        retention: DataRetention,
    ) -> Result<bool>;

    fn load_session(
        &self,
        session_id: &str,
        user_id: &str,
        limit: usize,
    ) -> Result<Vec<ConversationMessage>>;

    fn purge_expired(&mut self, now: u64) -> Result<PurgeReport>;

    /// Flush buffered writes to durable storage. No-op for memory backends.
    fn checkpoint(&self) -> Result<()> {
        Ok(())
    }

    /// Stored profile, or a fresh default. Unreadable data is logged and
    /// replaced rather than failing the turn.
    fn get_or_create(&self, user_id: &str, now: u64) -> UserProfile {
        match self.load_profile(user_id) {
            Ok(Some(profile)) => profile,
            Ok(None) => {
                tracing::debug!(user_id, "creating profile");
                UserProfile::new_at(user_id, now)
            }
            Err(e) => {
                tracing::warn!(user_id, error = %e, "stored profile unreadable, starting fresh");
                UserProfile::new_at(user_id, now)
            }
        }
    }
}

impl ProfileRepository for Store {
    fn load_profile(&self, user_id: &str) -> Result<Option<UserProfile>> {
        Store::load_profile(self, user_id)
    }

    fn save_profile(&mut self, profile: &UserProfile, now: u64) -> Result<bool> {
        Store::save_profile(self, profile, now)
    }

    fn append_message(
        &mut self,
        session_id: &str,
        user_id: &str,
        message: &ConversationMessage,
        retention: DataRetention,
    ) -> Result<bool> {
        Store::append_message(self, session_id, user_id, message, retention)
    }

    fn load_session(
        &self,
        session_id: &str,
        user_id: &str,
        limit: usize,
    ) -> Result<Vec<ConversationMessage>> {
        Store::load_session(self, session_id, user_id, limit)
    }

    fn purge_expired(&mut self, now: u64) -> Result<PurgeReport> {
        Store::purge_expired(self, now)
    }

    fn checkpoint(&self) -> Result<()> {
        self.checkpoint_truncate()
    }
}

struct StoredProfile {
    profile: UserProfile,
    updated_at: u64,
}

struct StoredMessage {
    session_id: String,
    user_id: String,
    message: ConversationMessage,
}

/// Process-lifetime repository with the same retention rules as [`Store`].
#[derive(Default)]
pub struct MemoryRepository {
    profiles: BTreeMap<String, StoredProfile>,
    log: Vec<StoredMessage>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ProfileRepository for MemoryRepository {
    fn load_profile(&self, user_id: &str) -> Result<Option<UserProfile>> {
        Ok(self.profiles.get(user_id).map(|s| s.profile.clone()))
    }

    fn save_profile(&mut self, profile: &UserProfile, now: u64) -> Result<bool> {
        if !profile.consent.data_retention.persists() {
            self.profiles.remove(&profile.user_id);
            self.log.retain(|m| m.user_id != profile.user_id);
            return Ok(false);
        }
        self.profiles.insert(
            profile.user_id.clone(),
            StoredProfile {
                profile: profile.clone(),
                updated_at: now,
            },
        );
        Ok(true)
    }

    fn append_message(
        &mut self,
        session_id: &str,
        user_id: &str,
        message: &ConversationMessage,
        retention: DataRetention,
    ) -> Result<bool> {
        if !retention.persists() {
            return Ok(false);
        }
        self.log.push(StoredMessage {
            session_id: session_id.to_string(),
            user_id: user_id.to_string(),
            message: message.clone(),
        });
        Ok(true)
    }

    fn load_session(
        &self,
        session_id: &str,
        user_id: &str,
        limit: usize,
    ) -> Result<Vec<ConversationMessage>> {
        let mut messages: Vec<ConversationMessage> = self
            .log
            .iter()
            .rev()
            .filter(|m| m.session_id == session_id && m.user_id == user_id)
            .take(limit)
            .map(|m| m.message.clone())
            .collect();
        messages.reverse();
        Ok(messages)
    }

    fn purge_expired(&mut self, now: u64) -> Result<PurgeReport> {
        let cutoff = now.saturating_sub(RETENTION_WINDOW_SECS);

        let before = self.profiles.len();
        self.profiles.retain(|_, s| {
            s.profile.consent.data_retention != DataRetention::ThirtyDays || s.updated_at >= cutoff
        });
        let profiles = before - self.profiles.len();

        let before = self.log.len();
        let keep_forever: Vec<String> = self
            .profiles
            .iter()
            .filter(|(_, s)| s.profile.consent.data_retention == DataRetention::Indefinite)
            .map(|(id, _)| id.clone())
            .collect();
        self.log
            .retain(|m| m.message.timestamp >= cutoff || keep_forever.contains(&m.user_id));
        let messages = before - self.log.len();

        Ok(PurgeReport { profiles, messages })
    }
}
