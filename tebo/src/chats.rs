//! Chat registry: per-chat conversational state shared by every dispatch task.
//!
//! Entries are created on first sight of a chat and live for the process lifetime.
//! There is no eviction, so memory grows with the number of distinct chats ever seen.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use dashmap::DashMap;
use tebo_core::Chat;
use tokio::sync::oneshot;
use tracing::error;

use crate::context::Context;
use crate::fsm::Fsm;

/// Resolution of a pending `expect_answer` wait.
pub(crate) enum Answer {
    Reply(Context),
    Cancelled,
}

/// Mutable conversational state of one chat.
pub struct ChatState {
    id: i64,
    inner: Mutex<ChatInner>,
}

struct ChatInner {
    /// Latest username or title seen for the chat.
    alias: Option<String>,
    /// Outstanding `expect_answer`; taking the sender resolves the wait exactly once.
    pending: Option<oneshot::Sender<Answer>>,
    /// Tree the chat is navigating. The bot owns the tree; the chat never keeps it alive.
    active_fsm: Weak<Fsm>,
    edit_message_id: Option<i64>,
    last_message_from_bot: bool,
}

impl ChatState {
    fn new(chat: &Chat) -> Self {
        Self {
            id: chat.id,
            inner: Mutex::new(ChatInner {
                alias: chat.alias().map(normalize_alias),
                pending: None,
                active_fsm: Weak::new(),
                edit_message_id: None,
                last_message_from_bot: false,
            }),
        }
    }

    pub fn id(&self) -> i64 {
        self.id
    }

    pub fn alias(&self) -> Option<String> {
        self.lock().alias.clone()
    }

    /// Stores `alias` and returns the one it replaced, if the alias changed.
    fn update_alias(&self, alias: &str) -> Option<Option<String>> {
        let mut inner = self.lock();
        if inner.alias.as_deref() == Some(alias) {
            return None;
        }
        Some(inner.alias.replace(alias.to_string()))
    }

    fn lock(&self) -> MutexGuard<'_, ChatInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Installs a fresh pending reply and returns its receiving end.
    /// A previous wait, if any, is dropped and resolves as cancelled.
    pub(crate) fn install_pending(&self) -> oneshot::Receiver<Answer> {
        let (tx, rx) = oneshot::channel();
        self.lock().pending = Some(tx);
        rx
    }

    /// Removes the pending reply so the caller can resolve it. Later calls return `None`.
    pub(crate) fn take_pending(&self) -> Option<oneshot::Sender<Answer>> {
        self.lock().pending.take()
    }

    /// True while a handler of this chat waits in `expect_answer`.
    pub fn has_pending_reply(&self) -> bool {
        self.lock()
            .pending
            .as_ref()
            .is_some_and(|tx| !tx.is_closed())
    }

    pub fn active_fsm(&self) -> Option<Arc<Fsm>> {
        self.lock().active_fsm.upgrade()
    }

    pub fn set_active_fsm(&self, fsm: &Arc<Fsm>) {
        self.lock().active_fsm = Arc::downgrade(fsm);
    }

    pub fn clear_active_fsm(&self) {
        self.lock().active_fsm = Weak::new();
    }

    /// Records a bot-authored message as the target of the next in-place edit.
    pub fn set_edit_target(&self, message_id: i64) {
        let mut inner = self.lock();
        inner.edit_message_id = Some(message_id);
        inner.last_message_from_bot = true;
    }

    /// Message to edit in place, present only while the last message was bot-authored.
    pub fn edit_target(&self) -> Option<i64> {
        let inner = self.lock();
        inner.edit_message_id.filter(|_| inner.last_message_from_bot)
    }

    /// Marks that the user spoke after the bot, so the next output is sent anew.
    pub fn mark_user_message(&self) {
        self.lock().last_message_from_bot = false;
    }
}

impl std::fmt::Debug for ChatState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatState")
            .field("id", &self.id)
            .field("alias", &self.lock().alias)
            .finish_non_exhaustive()
    }
}

fn normalize_alias(alias: &str) -> String {
    alias.trim_start_matches('@').to_string()
}

/// Concurrent map from chat id (and alias) to [`ChatState`].
#[derive(Default)]
pub struct ChatRegistry {
    by_id: DashMap<i64, Arc<ChatState>>,
    by_alias: DashMap<String, Arc<ChatState>>,
}

impl ChatRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the state of `chat`, constructing it on first call. All callers for the
    /// same id observe the same instance.
    ///
    /// The alias index follows the latest sighting: a renamed chat is found under its new
    /// alias only, and an alias taken over by another chat points to that chat.
    pub fn get_or_create(&self, chat: &Chat) -> Arc<ChatState> {
        if chat.id == 0 {
            error!(critical = true, chat = ?chat, "chat id is 0");
        }

        let state = self
            .by_id
            .entry(chat.id)
            .or_insert_with(|| Arc::new(ChatState::new(chat)))
            .value()
            .clone();

        if let Some(alias) = chat.alias().map(normalize_alias) {
            let indexed = self
                .by_alias
                .get(&alias)
                .is_some_and(|s| Arc::ptr_eq(s.value(), &state));
            if let Some(previous) = state.update_alias(&alias) {
                if let Some(previous) = previous {
                    self.by_alias
                        .remove_if(&previous, |_, s| Arc::ptr_eq(s, &state));
                }
                self.by_alias.insert(alias, state.clone());
            } else if !indexed {
                self.by_alias.insert(alias, state.clone());
            }
        }

        state
    }

    pub fn get(&self, chat_id: i64) -> Option<Arc<ChatState>> {
        self.by_id.get(&chat_id).map(|s| s.value().clone())
    }

    /// Looks a chat up by username or title; a leading `@` is ignored.
    pub fn lookup_by_alias(&self, alias: &str) -> Option<Arc<ChatState>> {
        self.by_alias
            .get(alias.trim_start_matches('@'))
            .map(|s| s.value().clone())
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }
}
