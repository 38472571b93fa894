use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

use crate::error::{StoreError, StoreResult};
use crate::rooms::UserId;

pub const DEFAULT_HISTORY_LIMIT: usize = 200;
pub const DEFAULT_RECENT_LIMIT: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    /// Runtime events such as the sensor uplink.
    System,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub user_id: UserId,
    pub role: Role,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_id: Option<String>,
    pub created_at: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
    Created,
    /// A message with the same source id was already stored.
    Exists,
    /// Guests have no history.
    SkippedAnonymous,
}

/// Per-user chat history, kept as one JSON array on disk.
#[derive(Debug)]
pub struct MessageLog {
    path: PathBuf,
    lock: Mutex<()>,
}

impl MessageLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn save(
        &self,
        user: &UserId,
        role: Role,
        content: &str,
        source_id: Option<&str>,
    ) -> StoreResult<SaveOutcome> {
        if user.is_guest() {
            tracing::debug!("skipping message persistence for guest user");
            return Ok(SaveOutcome::SkippedAnonymous);
        }
        let _guard = self
            .lock
            .lock()
            .map_err(|_| StoreError::Poisoned("message log"))?;
        let mut messages = read_messages(&self.path)?;
        if let Some(source) = source_id {
            let seen = messages.iter().any(|message| {
                &message.user_id == user && message.source_id.as_deref() == Some(source)
            });
            if seen {
                return Ok(SaveOutcome::Exists);
            }
        }
        messages.push(ChatMessage {
            user_id: user.clone(),
            role,
            content: content.to_string(),
            source_id: source_id.map(str::to_string),
            created_at: chrono::Utc::now().timestamp_millis(),
        });
        write_messages(&self.path, &messages)?;
        Ok(SaveOutcome::Created)
    }

    /// Oldest first.
    pub fn history(&self, user: &UserId, limit: usize) -> StoreResult<Vec<ChatMessage>> {
        Ok(self
            .for_user(user)?
            .into_iter()
            .take(limit)
            .collect())
    }

    /// Newest first.
    pub fn recent(&self, user: &UserId, limit: usize) -> StoreResult<Vec<ChatMessage>> {
        Ok(self
            .for_user(user)?
            .into_iter()
            .rev()
            .take(limit)
            .collect())
    }

    fn for_user(&self, user: &UserId) -> StoreResult<Vec<ChatMessage>> {
        if user.is_guest() {
            return Ok(Vec::new());
        }
        let _guard = self
            .lock
            .lock()
            .map_err(|_| StoreError::Poisoned("message log"))?;
        Ok(read_messages(&self.path)?
            .into_iter()
            .filter(|message| &message.user_id == user)
            .collect())
    }
}

fn read_messages(path: &Path) -> StoreResult<Vec<ChatMessage>> {
    match std::fs::read_to_string(path) {
        Ok(raw) if raw.trim().is_empty() => Ok(Vec::new()),
        Ok(raw) => Ok(serde_json::from_str(&raw)?),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
        Err(err) => Err(StoreError::io(path, err)),
    }
}

fn write_messages(path: &Path, messages: &[ChatMessage]) -> StoreResult<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|err| StoreError::io(parent, err))?;
    }
    let rendered = serde_json::to_string_pretty(messages)?;
    std::fs::write(path, rendered).map_err(|err| StoreError::io(path, err))
}
