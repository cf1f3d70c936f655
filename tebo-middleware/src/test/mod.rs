//! Unit test module
//!
//! Middleware and interceptor tests live here, separate from source files. They drive a
//! real bot over [`RecordingApi`], which records sent texts and rejects everything else.


use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tebo::{Bot, BotBuilder, Context};
use tebo_core::{
    BotApi, ByteStream, Chat, File, InputFile, Message, MessageEntity, Result, SendMessage,
    TeboError, Update, User, BOT_COMMAND_ENTITY,
};

#[derive(Default)]
pub(crate) struct RecordingApi {
    sent: Mutex<Vec<String>>,
}

impl RecordingApi {
    pub(crate) fn sent(&self) -> Vec<String> {
        self.sent.lock().unwrap().clone()
    }
}

fn unsupported<T>() -> Result<T> {
    Err(TeboError::Network("not supported by RecordingApi".to_string()))
}

#[async_trait]
impl BotApi for RecordingApi {
    async fn get_me(&self) -> Result<User> {
        Ok(User {
            id: 1,
            is_bot: true,
            first_name: "Tebo".to_string(),
            ..Default::default()
        })
    }

    async fn get_updates(&self, _offset: i64) -> Result<Vec<Update>> {
        Ok(Vec::new())
    }

    async fn send_message(&self, chat_id: i64, message: &SendMessage) -> Result<Message> {
        let mut sent = self.sent.lock().unwrap();
        sent.push(message.text.clone());
        Ok(Message {
            message_id: sent.len() as i64,
            chat: Chat {
                id: chat_id,
                ..Default::default()
            },
            ..Default::default()
        })
    }

    async fn edit_message(&self, _: i64, _: i64, _: &SendMessage) -> Result<Message> {
        unsupported()
    }

    async fn delete_message(&self, _: i64, _: i64) -> Result<bool> {
        unsupported()
    }

    async fn send_photo(&self, _: i64, _: InputFile, _: Option<&str>) -> Result<Message> {
        unsupported()
    }

    async fn send_document(&self, _: i64, _: InputFile, _: Option<&str>) -> Result<Message> {
        unsupported()
    }

    async fn answer_callback_query(&self, _: &str, _: Option<&str>) -> Result<bool> {
        unsupported()
    }

    async fn get_file(&self, _: &str) -> Result<File> {
        unsupported()
    }

    async fn download_file(&self, _: &str) -> Result<ByteStream> {
        unsupported()
    }
}

pub(crate) async fn pong(_ctx: Context) -> Result<Option<SendMessage>> {
    Ok(Some(SendMessage::new("pong")))
}

pub(crate) async fn build_bot(
    configure: impl FnOnce(&mut BotBuilder),
) -> (Bot, Arc<RecordingApi>) {
    let api = Arc::new(RecordingApi::default());
    let mut builder = BotBuilder::new(api.clone());
    configure(&mut builder);
    (builder.build().await.unwrap(), api)
}

/// `/ping` sent by `user_id` in their private chat.
pub(crate) fn ping_from(update_id: i64, user_id: i64) -> Update {
    Update {
        update_id,
        message: Some(Message {
            message_id: update_id,
            from: Some(User {
                id: user_id,
                first_name: "Test".to_string(),
                username: Some("testuser".to_string()),
                ..Default::default()
            }),
            chat: Chat {
                id: user_id,
                kind: "private".to_string(),
                ..Default::default()
            },
            text: Some("/ping".to_string()),
            entities: vec![MessageEntity {
                kind: BOT_COMMAND_ENTITY.to_string(),
                offset: 0,
                length: 5,
                url: None,
            }],
            ..Default::default()
        }),
        callback_query: None,
    }
}
