use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error body returned by the remote service: `{ok: false, error_code, description}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiError {
    #[serde(default)]
    pub ok: bool,
    #[serde(default)]
    pub error_code: i64,
    #[serde(default)]
    pub description: String,
}

#[derive(Error, Debug)]
pub enum TeboError {
    #[error("Telegram API error {}: {}", .0.error_code, .0.description)]
    Api(ApiError),

    /// Non-2xx response whose body is not a well-formed API error.
    #[error("Transport error: {status}: {body}")]
    Transport { status: String, body: String },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Message text is empty")]
    EmptyText,

    #[error("Routing error: {0}")]
    Routing(String),

    #[error("FSM error: {0}")]
    Fsm(String),

    #[error("Invalid handler pattern: {0}")]
    Pattern(String),

    #[error("Handler panicked: {message}\n{backtrace}")]
    HandlerPanic { message: String, backtrace: String },

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for TeboError {
    fn from(e: serde_json::Error) -> Self {
        TeboError::Decode(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, TeboError>;
