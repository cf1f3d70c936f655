//! In-process history store: nothing survives a restart.

use async_trait::async_trait;
use tebo_core::Update;
use tokio::sync::Mutex;

use crate::error::StorageError;
use crate::history::{update_chat, History, HistoryStore};

#[derive(Default)]
pub struct MemoryHistory {
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    history: History,
    updates: Vec<Update>,
}

impl MemoryHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-seeded as if a previous run had persisted `history`.
    pub fn with_history(history: History) -> Self {
        Self {
            inner: Mutex::new(Inner {
                history,
                updates: Vec::new(),
            }),
        }
    }

    /// Updates appended since construction.
    pub async fn updates(&self) -> Vec<Update> {
        self.inner.lock().await.updates.clone()
    }
}

#[async_trait]
impl HistoryStore for MemoryHistory {
    async fn load(&self) -> Result<History, StorageError> {
        Ok(self.inner.lock().await.history.clone())
    }

    async fn append(&self, updates: &[Update]) -> Result<(), StorageError> {
        let mut inner = self.inner.lock().await;
        for update in updates {
            if inner.updates.iter().any(|u| u.update_id == update.update_id) {
                continue;
            }
            inner.history.high_water_mark = inner.history.high_water_mark.max(update.update_id);
            if let Some(chat) = update_chat(update) {
                if !inner.history.chats.iter().any(|c| c.id == chat.id) {
                    inner.history.chats.push(chat.clone());
                }
            }
            inner.updates.push(update.clone());
        }
        Ok(())
    }
}
