//! Per-update context handed to interceptors, middleware, handlers and FSM states.

use std::any::{Any, TypeId};
use std::sync::{Arc, Mutex, PoisonError};

use dashmap::DashMap;
use tebo_core::{BotApi, Message, Result, SendMessage, Update, User};
use tokio::sync::OwnedSemaphorePermit;
use tracing::{debug, instrument};

use crate::chats::{Answer, ChatState};

/// Bundles the bot API handle, the update, its resolved message and the chat state.
///
/// Cloning is cheap; clones share the same update, chat state and values.
#[derive(Clone)]
pub struct Context {
    api: Arc<dyn BotApi>,
    update: Arc<Update>,
    message: Arc<Message>,
    chat: Arc<ChatState>,
    permit: Arc<Mutex<Option<OwnedSemaphorePermit>>>,
    values: Arc<DashMap<TypeId, Box<dyn Any + Send + Sync>>>,
}

impl Context {
    pub(crate) fn new(
        api: Arc<dyn BotApi>,
        update: Update,
        message: Message,
        chat: Arc<ChatState>,
        permit: Option<OwnedSemaphorePermit>,
    ) -> Self {
        Self {
            api,
            update: Arc::new(update),
            message: Arc::new(message),
            chat,
            permit: Arc::new(Mutex::new(permit)),
            values: Arc::new(DashMap::new()),
        }
    }

    /// Context outside of any update, for messages the bot initiates itself.
    pub(crate) fn proactive(api: Arc<dyn BotApi>, chat: Arc<ChatState>, message: Message) -> Self {
        let update = Update {
            update_id: 0,
            message: Some(message.clone()),
            callback_query: None,
        };
        Self::new(api, update, message, chat, None)
    }

    pub fn api(&self) -> &Arc<dyn BotApi> {
        &self.api
    }

    pub fn update(&self) -> &Update {
        &self.update
    }

    /// Inbound message, or the message a pressed button was attached to.
    pub fn message(&self) -> &Message {
        &self.message
    }

    pub fn chat(&self) -> &Arc<ChatState> {
        &self.chat
    }

    pub fn chat_id(&self) -> i64 {
        self.message.chat.id
    }

    pub fn from(&self) -> Option<&User> {
        self.update.from()
    }

    /// Text of the inbound message; empty for button presses.
    pub fn text(&self) -> &str {
        self.update.text()
    }

    pub fn callback_data(&self) -> Option<&str> {
        self.update.callback_data()
    }

    pub fn is_callback(&self) -> bool {
        self.update.is_callback()
    }

    /// Attaches a value of type `T` to this update, replacing any previous one.
    ///
    /// Interceptors and middleware use this to hand data (a resolved account, parsed
    /// arguments) to the handler. Values live as long as the update's contexts.
    pub fn insert<T: Any + Send + Sync>(&self, value: T) {
        self.values.insert(TypeId::of::<T>(), Box::new(value));
    }

    /// Copy of the value of type `T` attached to this update.
    pub fn get<T: Any + Clone + Send + Sync>(&self) -> Option<T> {
        self.values
            .get(&TypeId::of::<T>())
            .and_then(|v| v.downcast_ref::<T>().cloned())
    }

    pub fn remove<T: Any + Send + Sync>(&self) -> Option<T> {
        self.values
            .remove(&TypeId::of::<T>())
            .and_then(|(_, v)| v.downcast::<T>().ok())
            .map(|v| *v)
    }

    /// Sends to the current chat and makes the new message the chat's edit target.
    #[instrument(skip(self, message), fields(chat_id = self.chat_id()))]
    pub async fn send(&self, message: &SendMessage) -> Result<i64> {
        let sent = self.api.send_message(self.chat_id(), message).await?;
        self.chat.set_edit_target(sent.message_id);
        debug!(message_id = sent.message_id, "message sent");
        Ok(sent.message_id)
    }

    pub async fn send_text(&self, text: impl Into<String>) -> Result<i64> {
        self.send(&SendMessage::new(text)).await
    }

    /// Edits `message_id` in the current chat. Edit-target bookkeeping is left untouched.
    #[instrument(skip(self, message), fields(chat_id = self.chat_id()))]
    pub async fn edit(&self, message_id: i64, message: &SendMessage) -> Result<()> {
        self.api
            .edit_message(self.chat_id(), message_id, message)
            .await?;
        Ok(())
    }

    /// Edits the chat's last bot message when the bot spoke last, otherwise sends anew.
    pub async fn edit_or_send(&self, message: &SendMessage) -> Result<i64> {
        match self.chat.edit_target() {
            Some(message_id) => {
                self.edit(message_id, message).await?;
                Ok(message_id)
            }
            None => self.send(message).await,
        }
    }

    pub async fn delete(&self, message_id: i64) -> Result<bool> {
        self.api.delete_message(self.chat_id(), message_id).await
    }

    /// Acknowledges the pressed button, if this context comes from one.
    pub async fn answer_callback(&self, text: Option<&str>) -> Result<()> {
        if let Some(cb) = &self.update.callback_query {
            self.api.answer_callback_query(&cb.id, text).await?;
        }
        Ok(())
    }

    /// Waits for the next non-command message in this chat and returns its context.
    ///
    /// Returns `None` when a command arrives first (it is then routed normally) or when
    /// another `expect_answer` in the same chat replaces this one. While parked the task
    /// does not count towards the dispatcher's concurrency limit.
    pub async fn expect_answer(&self) -> Option<Context> {
        let rx = self.chat.install_pending();
        self.release_permit();
        debug!(chat_id = self.chat_id(), "waiting for answer");

        match rx.await {
            Ok(Answer::Reply(ctx)) => Some(ctx),
            Ok(Answer::Cancelled) | Err(_) => None,
        }
    }

    fn release_permit(&self) {
        self.permit
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("update_id", &self.update.update_id)
            .field("chat", &self.chat)
            .finish_non_exhaustive()
    }
}
