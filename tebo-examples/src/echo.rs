use chrono::Local;
use tebo::Context;
use tebo_core::{init_tracing, Result, SendMessage};
use tebo_middleware::{LoggingMiddleware, UpdateLogger};
use tebo_telegram::{builder_from_config, run_until_ctrl_c, TelegramConfig};
use tracing::info;

async fn clock(_ctx: Context) -> Result<Option<SendMessage>> {
    let now = Local::now().format("%Y-%m-%d %H:%M:%S");
    Ok(Some(SendMessage::new(format!("Current time: {}", now))))
}

async fn echo(ctx: Context) -> Result<Option<SendMessage>> {
    Ok(Some(SendMessage::new(format!("Echo: {}", ctx.text()))))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = TelegramConfig::from_env()?;
    init_tracing(config.log_file.as_deref())?;
    info!(
        start_time = %Local::now().format("%Y-%m-%d %H:%M:%S"),
        log_file = ?config.log_file,
        "Echo Bot started"
    );

    let mut builder = builder_from_config(&config).await?;
    builder.intercept(UpdateLogger).pre(LoggingMiddleware);
    builder.handle("/clock", clock)?.handle(".+", echo)?;

    let bot = builder.build().await?;
    run_until_ctrl_c(bot).await
}
