//! Process plumbing: assemble a bot from [`TelegramConfig`] and run it until Ctrl-C.

use std::sync::Arc;

use anyhow::Result;
use tebo::{Bot, BotBuilder};
use tebo_storage::SqliteHistory;
use tracing::{error, info, instrument};

use crate::client::TelegramClient;
use crate::config::TelegramConfig;

/// Validates `config` and returns a builder wired to the Telegram client, the SQLite
/// history at `history_database_url` and the configured polling.
#[instrument(skip(config))]
pub async fn builder_from_config(config: &TelegramConfig) -> Result<BotBuilder> {
    config.validate()?;
    let client = TelegramClient::from_config(config)?;
    let history = SqliteHistory::new(&config.history_database_url).await?;
    info!(
        database_url = %config.history_database_url,
        api_url = ?config.telegram_api_url,
        "step: telegram client and history ready"
    );

    let mut builder = BotBuilder::new(Arc::new(client));
    builder
        .history(Arc::new(history))
        .poll_config(config.poll_config());
    Ok(builder)
}

/// Runs `bot` until Ctrl-C, then closes it and waits for the poll loop to stop.
pub async fn run_until_ctrl_c(bot: Bot) -> Result<()> {
    info!(username = ?bot.me().username, "step: bot running, press Ctrl-C to stop");
    let running = {
        let bot = bot.clone();
        tokio::spawn(async move { bot.run().await })
    };

    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "failed to listen for Ctrl-C");
    }
    bot.close();
    running.await?;
    info!("step: bot stopped");
    Ok(())
}
