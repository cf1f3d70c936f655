//! History store abstraction: the append-only log of processed updates.

use async_trait::async_trait;
use tebo_core::{Chat, Update};

use crate::error::StorageError;

/// State recovered from the update log at startup.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct History {
    /// Highest update id ever persisted; polling resumes strictly after it.
    pub high_water_mark: i64,
    /// Every distinct chat seen, in order of first appearance.
    pub chats: Vec<Chat>,
}

#[async_trait]
pub trait HistoryStore: Send + Sync {
    async fn load(&self) -> Result<History, StorageError>;

    /// Appends updates to the log. Re-appending an already stored update id is a no-op.
    async fn append(&self, updates: &[Update]) -> Result<(), StorageError>;
}

/// Chat of an update, skipping the zero id of malformed payloads.
pub(crate) fn update_chat(update: &Update) -> Option<&Chat> {
    update.chat().filter(|c| c.id != 0)
}
