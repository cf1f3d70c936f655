//! # tebo-core
//!
//! Core types for the tebo bot framework: the remote API wire model, [`TeboError`], the
//! [`BotApi`] trait, inline keyboard pagination and tracing initialization.
//! Transport-agnostic; used by the `tebo` engine, `tebo-storage` and `tebo-telegram`.

pub mod api;
pub mod error;
pub mod keyboard;
pub mod logger;
pub mod types;

pub use api::{BotApi, ByteStream, InputFile};
pub use error::{ApiError, Result, TeboError};
pub use keyboard::InlineKeyboard;
pub use logger::init_tracing;
pub use types::{
    CallbackQuery, Chat, Document, File, ForceReply, InlineKeyboardButton, InlineKeyboardMarkup,
    KeyboardButton, Message, MessageEntity, ParseMode, PhotoSize, ReplyKeyboardMarkup,
    ReplyKeyboardRemove, ReplyMarkup, SendMessage, Update, User, BOT_COMMAND_ENTITY,
};
