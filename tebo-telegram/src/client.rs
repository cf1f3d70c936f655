//! HTTP implementation of [`BotApi`] over the Telegram Bot API.
//!
//! Every method is a POST of a JSON (or multipart) body to `<api_url>/bot<token>/<method>`;
//! successful responses are `{ok: true, result: ...}`.

use std::time::Duration;

use async_trait::async_trait;
use futures::{StreamExt, TryStreamExt};
use reqwest::multipart::{Form, Part};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tebo_core::{
    ApiError, BotApi, ByteStream, File, InputFile, Message, Result, SendMessage, TeboError, Update,
    User,
};
use tracing::{debug, instrument};

use crate::config::TelegramConfig;

pub const DEFAULT_API_URL: &str = "https://api.telegram.org";

const ALLOWED_UPDATES: &[&str] = &["message", "callback_query"];
const DEFAULT_POLL_TIMEOUT: Duration = Duration::from_secs(25);
/// Added to the long-poll timeout for the HTTP request deadline.
const POLL_TIMEOUT_MARGIN: Duration = Duration::from_secs(10);

/// Telegram Bot API client.
#[derive(Debug, Clone)]
pub struct TelegramClient {
    client: Client,
    api_url: String,
    token: String,
    poll_timeout: Duration,
}

impl TelegramClient {
    pub fn new(token: impl Into<String>) -> Result<Self> {
        let client = Client::builder().build().map_err(network)?;
        Ok(Self {
            client,
            api_url: DEFAULT_API_URL.to_string(),
            token: token.into(),
            poll_timeout: DEFAULT_POLL_TIMEOUT,
        })
    }

    pub fn from_config(config: &TelegramConfig) -> Result<Self> {
        let mut client = Self::new(config.bot_token.clone())?
            .with_poll_timeout(Duration::from_secs(config.poll_timeout_secs));
        if let Some(url) = &config.telegram_api_url {
            client = client.with_api_url(url.as_str());
        }
        Ok(client)
    }

    /// Points the client at another server (a local Bot API server, or a mock in tests).
    pub fn with_api_url(mut self, api_url: impl Into<String>) -> Self {
        self.api_url = api_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Server-side long-poll timeout of `get_updates`.
    pub fn with_poll_timeout(mut self, timeout: Duration) -> Self {
        self.poll_timeout = timeout;
        self
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.api_url, self.token, method)
    }

    fn file_url(&self, file_path: &str) -> String {
        format!("{}/file/bot{}/{}", self.api_url, self.token, file_path)
    }

    async fn call<P, T>(&self, method: &str, params: &P) -> Result<T>
    where
        P: Serialize + ?Sized + Sync,
        T: DeserializeOwned,
    {
        self.execute(method, self.client.post(self.method_url(method)).json(params))
            .await
    }

    async fn execute<T: DeserializeOwned>(&self, method: &str, request: RequestBuilder) -> Result<T> {
        debug!(method, "step: api request");
        let response = request.send().await.map_err(network)?;
        let status = response.status();
        let body = response.text().await.map_err(network)?;

        if !status.is_success() {
            return Err(response_error(status, &body));
        }
        decode_result(&body)
    }

    async fn send_file(
        &self,
        method: &str,
        field: &'static str,
        chat_id: i64,
        file: InputFile,
        caption: Option<&str>,
    ) -> Result<Message> {
        let part = Part::bytes(file.bytes).file_name(file.file_name);
        let mut form = Form::new()
            .text("chat_id", chat_id.to_string())
            .part(field, part);
        if let Some(caption) = caption {
            form = form.text("caption", caption.to_string());
        }
        self.execute(method, self.client.post(self.method_url(method)).multipart(form))
            .await
    }
}

#[derive(Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    #[serde(default)]
    error_code: i64,
    #[serde(default)]
    description: String,
}

fn decode_result<T: DeserializeOwned>(body: &str) -> Result<T> {
    let response: ApiResponse<T> = serde_json::from_str(body)?;
    if !response.ok {
        return Err(TeboError::Api(ApiError {
            ok: false,
            error_code: response.error_code,
            description: response.description,
        }));
    }
    response
        .result
        .ok_or_else(|| TeboError::Decode("response without result".to_string()))
}

/// Maps a non-2xx response to an API error when the body is a well-formed error
/// object, otherwise to a transport error carrying the raw status and body.
pub fn response_error(status: StatusCode, body: &str) -> TeboError {
    match serde_json::from_str::<ApiError>(body) {
        Ok(error) if !error.description.is_empty() => TeboError::Api(error),
        _ => TeboError::Transport {
            status: status.to_string(),
            body: body.to_string(),
        },
    }
}

fn network(e: reqwest::Error) -> TeboError {
    if e.is_decode() {
        TeboError::Decode(e.to_string())
    } else {
        TeboError::Network(e.to_string())
    }
}

fn ensure_text(message: &SendMessage) -> Result<()> {
    if message.text.trim().is_empty() {
        return Err(TeboError::EmptyText);
    }
    Ok(())
}

#[derive(Serialize)]
struct GetUpdates<'a> {
    offset: i64,
    timeout: u64,
    allowed_updates: &'a [&'a str],
}

#[derive(Serialize)]
struct SendMessageRequest<'a> {
    chat_id: i64,
    #[serde(flatten)]
    message: &'a SendMessage,
}

#[derive(Serialize)]
struct EditMessageRequest<'a> {
    chat_id: i64,
    message_id: i64,
    #[serde(flatten)]
    message: &'a SendMessage,
}

#[derive(Serialize)]
struct MessageRef {
    chat_id: i64,
    message_id: i64,
}

#[derive(Serialize)]
struct AnswerCallbackQuery<'a> {
    callback_query_id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<&'a str>,
}

#[derive(Serialize)]
struct GetFile<'a> {
    file_id: &'a str,
}

#[async_trait]
impl BotApi for TelegramClient {
    async fn get_me(&self) -> Result<User> {
        self.call("getMe", &serde_json::json!({})).await
    }

    #[instrument(skip(self))]
    async fn get_updates(&self, offset: i64) -> Result<Vec<Update>> {
        let params = GetUpdates {
            offset,
            timeout: self.poll_timeout.as_secs(),
            allowed_updates: ALLOWED_UPDATES,
        };
        let request = self
            .client
            .post(self.method_url("getUpdates"))
            .timeout(self.poll_timeout + POLL_TIMEOUT_MARGIN)
            .json(&params);
        self.execute("getUpdates", request).await
    }

    async fn send_message(&self, chat_id: i64, message: &SendMessage) -> Result<Message> {
        ensure_text(message)?;
        self.call("sendMessage", &SendMessageRequest { chat_id, message })
            .await
    }

    async fn edit_message(
        &self,
        chat_id: i64,
        message_id: i64,
        message: &SendMessage,
    ) -> Result<Message> {
        ensure_text(message)?;
        let params = EditMessageRequest {
            chat_id,
            message_id,
            message,
        };
        self.call("editMessageText", &params).await
    }

    async fn delete_message(&self, chat_id: i64, message_id: i64) -> Result<bool> {
        self.call("deleteMessage", &MessageRef { chat_id, message_id })
            .await
    }

    async fn send_photo(
        &self,
        chat_id: i64,
        photo: InputFile,
        caption: Option<&str>,
    ) -> Result<Message> {
        self.send_file("sendPhoto", "photo", chat_id, photo, caption)
            .await
    }

    async fn send_document(
        &self,
        chat_id: i64,
        document: InputFile,
        caption: Option<&str>,
    ) -> Result<Message> {
        self.send_file("sendDocument", "document", chat_id, document, caption)
            .await
    }

    async fn answer_callback_query(
        &self,
        callback_query_id: &str,
        text: Option<&str>,
    ) -> Result<bool> {
        let params = AnswerCallbackQuery {
            callback_query_id,
            text,
        };
        self.call("answerCallbackQuery", &params).await
    }

    async fn get_file(&self, file_id: &str) -> Result<File> {
        self.call("getFile", &GetFile { file_id }).await
    }

    async fn download_file(&self, file_path: &str) -> Result<ByteStream> {
        debug!(file_path, "step: file download");
        let response = self
            .client
            .get(self.file_url(file_path))
            .send()
            .await
            .map_err(network)?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.map_err(network)?;
            return Err(response_error(status, &body));
        }
        Ok(response.bytes_stream().map_err(network).boxed())
    }
}
