use serde::{Deserialize, Serialize};

use crate::time::now_unix_secs;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "user" => Some(Role::User),
            "assistant" => Some(Role::Assistant),
            _ => None,
        }
    }
}

/// One turn of a session transcript. Transcripts are append-only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationMessage {
    pub role: Role,
    pub content: String,
    pub timestamp: u64,
}

impl ConversationMessage {
    pub fn user(content: &str) -> Self {
        Self::at(Role::User, content, now_unix_secs())
    }

    pub fn assistant(content: &str) -> Self {
        Self::at(Role::Assistant, content, now_unix_secs())
    }

    pub fn at(role: Role, content: &str, timestamp: u64) -> Self {
        Self {
            role,
            content: content.to_string(),
            timestamp,
        }
    }
}

/// The last `n` user messages, oldest first.
pub fn recent_user_messages(history: &[ConversationMessage], n: usize) -> Vec<&ConversationMessage> {
    let mut recent: Vec<&ConversationMessage> = history
        .iter()
        .rev()
        .filter(|m| m.role == Role::User)
        .take(n)
        .collect();
    recent.reverse();
    recent
}

/// The last `n` messages of either role, oldest first.
pub fn tail(history: &[ConversationMessage], n: usize) -> &[ConversationMessage] {
    &history[history.len().saturating_sub(n)..]
}

/// Content of the most recent assistant message, if any.
pub fn last_assistant(history: &[ConversationMessage]) -> Option<&str> {
    history
        .iter()
        .rev()
        .find(|m| m.role == Role::Assistant)
        .map(|m| m.content.as_str())
}
