//! Remote bot service abstraction.
//!
//! [`BotApi`] is transport-agnostic; `tebo-telegram` implements it over HTTP and tests substitute recording mocks.

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;

use crate::error::{Result, TeboError};
use crate::types::{File, Message, SendMessage, Update, User};

/// Body of a downloaded file, delivered chunk by chunk.
pub type ByteStream = BoxStream<'static, Result<Bytes>>;

/// In-memory file for multipart uploads.
#[derive(Debug, Clone)]
pub struct InputFile {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

impl InputFile {
    pub fn new(file_name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            file_name: file_name.into(),
            bytes: bytes.into(),
        }
    }
}

/// Operations consumed from the remote messaging service.
#[async_trait]
pub trait BotApi: Send + Sync {
    /// Identity of the bot account; used to verify the connection at startup.
    async fn get_me(&self) -> Result<User>;

    /// Long-polls updates with `update_id >= offset`. Returns an empty list on timeout.
    async fn get_updates(&self, offset: i64) -> Result<Vec<Update>>;

    async fn send_message(&self, chat_id: i64, message: &SendMessage) -> Result<Message>;

    async fn edit_message(
        &self,
        chat_id: i64,
        message_id: i64,
        message: &SendMessage,
    ) -> Result<Message>;

    async fn delete_message(&self, chat_id: i64, message_id: i64) -> Result<bool>;

    async fn send_photo(
        &self,
        chat_id: i64,
        photo: InputFile,
        caption: Option<&str>,
    ) -> Result<Message>;

    async fn send_document(
        &self,
        chat_id: i64,
        document: InputFile,
        caption: Option<&str>,
    ) -> Result<Message>;

    /// Stops the client-side progress indicator of a pressed button.
    async fn answer_callback_query(&self, callback_query_id: &str, text: Option<&str>)
        -> Result<bool>;

    async fn get_file(&self, file_id: &str) -> Result<File>;

    async fn download_file(&self, file_path: &str) -> Result<ByteStream>;

    /// Resolves `file_id` to its storage path and streams its content.
    async fn load_file(&self, file_id: &str) -> Result<ByteStream> {
        let file = self.get_file(file_id).await?;
        let path = file
            .file_path
            .ok_or_else(|| TeboError::Decode(format!("file {} has no file_path", file_id)))?;
        self.download_file(&path).await
    }
}
