//! # tebo-telegram
//!
//! Telegram transport for tebo: [`TelegramClient`] implements [`tebo_core::BotApi`] over
//! HTTP, [`TelegramConfig`] loads process settings from the environment and the runner
//! wires both into a [`tebo::Bot`] that stops on Ctrl-C.

mod client;
mod config;
mod runner;

pub use client::{response_error, TelegramClient, DEFAULT_API_URL};
pub use config::{TelegramConfig, DEFAULT_HISTORY_DATABASE_URL};
pub use runner::{builder_from_config, run_until_ctrl_c};
