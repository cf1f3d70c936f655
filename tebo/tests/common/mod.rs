//! Recording [`BotApi`] mock and update builders for the engine integration tests.
//!
//! `MockApi` hands out increasing message ids, records every outbound call and serves
//! scripted `get_updates` batches while recording the requested offsets.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures::stream;
use tebo_core::{
    BotApi, ByteStream, CallbackQuery, Chat, File, InputFile, Message, MessageEntity, Result,
    SendMessage, TeboError, Update, User, BOT_COMMAND_ENTITY,
};

/// One outbound call observed by the mock.
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Send {
        chat_id: i64,
        message_id: i64,
        message: SendMessage,
    },
    Edit {
        chat_id: i64,
        message_id: i64,
        message: SendMessage,
    },
    Delete {
        chat_id: i64,
        message_id: i64,
    },
    AnswerCallback {
        id: String,
    },
}

#[derive(Default)]
struct State {
    calls: Vec<Call>,
    batches: VecDeque<Result<Vec<Update>>>,
    offsets: Vec<i64>,
    next_message_id: i64,
}

#[derive(Default)]
pub struct MockApi {
    state: Mutex<State>,
}

impl MockApi {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(State {
                next_message_id: 100,
                ..Default::default()
            }),
        })
    }

    /// Queues a batch returned by the next `get_updates` call.
    pub fn push_batch(&self, updates: Vec<Update>) {
        self.state.lock().unwrap().batches.push_back(Ok(updates));
    }

    /// Queues a transport failure for the next `get_updates` call.
    pub fn push_error(&self, error: TeboError) {
        self.state.lock().unwrap().batches.push_back(Err(error));
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn sends(&self) -> Vec<SendMessage> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Send { message, .. } => Some(message),
                _ => None,
            })
            .collect()
    }

    pub fn edits(&self) -> Vec<(i64, SendMessage)> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Edit {
                    message_id,
                    message,
                    ..
                } => Some((message_id, message)),
                _ => None,
            })
            .collect()
    }

    /// Offsets passed to `get_updates`, in call order.
    pub fn offsets(&self) -> Vec<i64> {
        self.state.lock().unwrap().offsets.clone()
    }

    /// Waits until at least `n` outbound calls were recorded.
    pub async fn wait_for_calls(&self, n: usize) -> Vec<Call> {
        let waited = tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                let calls = self.calls();
                if calls.len() >= n {
                    return calls;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await;
        waited.unwrap_or_else(|_| panic!("expected {} calls, got {:?}", n, self.calls()))
    }

    fn record(&self, call: Call) {
        self.state.lock().unwrap().calls.push(call);
    }

    fn next_id(&self) -> i64 {
        let mut state = self.state.lock().unwrap();
        state.next_message_id += 1;
        state.next_message_id
    }
}

fn sent_message(chat_id: i64, message_id: i64, content: &SendMessage) -> Message {
    Message {
        message_id,
        chat: Chat {
            id: chat_id,
            ..Default::default()
        },
        text: Some(content.text.clone()),
        ..Default::default()
    }
}

#[async_trait]
impl BotApi for MockApi {
    async fn get_me(&self) -> Result<User> {
        Ok(User {
            id: 1,
            is_bot: true,
            first_name: "Tebo".to_string(),
            username: Some("tebo_bot".to_string()),
            ..Default::default()
        })
    }

    async fn get_updates(&self, offset: i64) -> Result<Vec<Update>> {
        let next = {
            let mut state = self.state.lock().unwrap();
            state.offsets.push(offset);
            state.batches.pop_front()
        };
        match next {
            Some(batch) => batch,
            None => {
                tokio::time::sleep(Duration::from_millis(5)).await;
                Ok(Vec::new())
            }
        }
    }

    async fn send_message(&self, chat_id: i64, message: &SendMessage) -> Result<Message> {
        let message_id = self.next_id();
        self.record(Call::Send {
            chat_id,
            message_id,
            message: message.clone(),
        });
        Ok(sent_message(chat_id, message_id, message))
    }

    async fn edit_message(
        &self,
        chat_id: i64,
        message_id: i64,
        message: &SendMessage,
    ) -> Result<Message> {
        self.record(Call::Edit {
            chat_id,
            message_id,
            message: message.clone(),
        });
        Ok(sent_message(chat_id, message_id, message))
    }

    async fn delete_message(&self, chat_id: i64, message_id: i64) -> Result<bool> {
        self.record(Call::Delete {
            chat_id,
            message_id,
        });
        Ok(true)
    }

    async fn send_photo(
        &self,
        chat_id: i64,
        _photo: InputFile,
        caption: Option<&str>,
    ) -> Result<Message> {
        self.send_message(chat_id, &SendMessage::new(caption.unwrap_or("")))
            .await
    }

    async fn send_document(
        &self,
        chat_id: i64,
        _document: InputFile,
        caption: Option<&str>,
    ) -> Result<Message> {
        self.send_message(chat_id, &SendMessage::new(caption.unwrap_or("")))
            .await
    }

    async fn answer_callback_query(
        &self,
        callback_query_id: &str,
        _text: Option<&str>,
    ) -> Result<bool> {
        self.record(Call::AnswerCallback {
            id: callback_query_id.to_string(),
        });
        Ok(true)
    }

    async fn get_file(&self, file_id: &str) -> Result<File> {
        Ok(File {
            file_id: file_id.to_string(),
            file_path: Some(format!("files/{}", file_id)),
            ..Default::default()
        })
    }

    async fn download_file(&self, _file_path: &str) -> Result<ByteStream> {
        Ok(Box::pin(stream::empty()))
    }
}

pub fn chat(id: i64, username: Option<&str>) -> Chat {
    Chat {
        id,
        kind: "private".to_string(),
        username: username.map(str::to_string),
        ..Default::default()
    }
}

fn user(id: i64) -> User {
    User {
        id,
        first_name: "Alice".to_string(),
        username: Some("alice".to_string()),
        ..Default::default()
    }
}

/// Plain text message from user `chat_id` in the private chat `chat_id`.
pub fn text_update(update_id: i64, chat_id: i64, text: &str) -> Update {
    Update {
        update_id,
        message: Some(Message {
            message_id: update_id,
            from: Some(user(chat_id)),
            chat: chat(chat_id, Some("alice")),
            text: Some(text.to_string()),
            ..Default::default()
        }),
        callback_query: None,
    }
}

/// Message carrying a `bot_command` entity over its whole text.
pub fn command_update(update_id: i64, chat_id: i64, text: &str) -> Update {
    let mut update = text_update(update_id, chat_id, text);
    if let Some(message) = update.message.as_mut() {
        message.entities.push(MessageEntity {
            kind: BOT_COMMAND_ENTITY.to_string(),
            offset: 0,
            length: text.len() as i64,
            url: None,
        });
    }
    update
}

/// Button press with `data` on bot message `message_id`.
pub fn callback_update(update_id: i64, chat_id: i64, message_id: i64, data: &str) -> Update {
    Update {
        update_id,
        message: None,
        callback_query: Some(CallbackQuery {
            id: format!("cb-{}", update_id),
            from: user(chat_id),
            message: Some(Message {
                message_id,
                chat: chat(chat_id, Some("alice")),
                ..Default::default()
            }),
            data: Some(data.to_string()),
            ..Default::default()
        }),
    }
}
