//! Menu bot: `/menu` opens a small settings tree, `/ask` runs a question flow,
//! `/notify @alias text` messages a chat the bot has seen before.

use std::sync::Arc;

use chrono::Local;
use tebo::fsm::{self, Render};
use tebo::{Bot, Context, Middleware};
use tebo_core::{
    init_tracing, InlineKeyboardButton, InlineKeyboardMarkup, Result, SendMessage,
};
use tebo_middleware::{AllowList, BlockList, LoggingMiddleware, UpdateLogger};
use tebo_telegram::{builder_from_config, run_until_ctrl_c, TelegramConfig};
use tokio::sync::OnceCell;
use tracing::info;

/// Set once the bot is built; lets handlers reach `Bot::lookup_chat_id`.
static BOT: OnceCell<Bot> = OnceCell::const_new();

async fn main_menu(ctx: Context) -> Result<Render> {
    let name = ctx
        .from()
        .map(|u| u.first_name.clone())
        .unwrap_or_else(|| "there".to_string());
    Ok(Render::Message(SendMessage::html(format!(
        "Hi <b>{}</b>, continue?",
        name
    ))))
}

async fn time_state(_ctx: Context) -> Result<Render> {
    let now = Local::now().format("%H:%M:%S");
    Ok(Render::Message(SendMessage::new(format!("It is {}", now))))
}

/// Validation-style state: group chats are sent back to the menu root.
async fn private_only(ctx: Context) -> Result<Render> {
    if ctx.message().chat.kind != "private" {
        return Ok(Render::Parent);
    }
    Ok(Render::Message(SendMessage::new("Only you can see this.")))
}

/// Ad-hoc keyboard; the menu re-targets its buttons under this state.
async fn rate_state(_ctx: Context) -> Result<Render> {
    let markup = InlineKeyboardMarkup {
        inline_keyboard: vec![
            vec![
                InlineKeyboardButton::text("1"),
                InlineKeyboardButton::text("2"),
                InlineKeyboardButton::text("3"),
            ],
            vec![InlineKeyboardButton::url("About", "https://core.telegram.org/bots")],
        ],
    };
    Ok(Render::Message(
        SendMessage::new("How do you like it?").reply_markup(markup),
    ))
}

fn admin_button(ctx: &Context) -> Option<InlineKeyboardButton> {
    (ctx.message().chat.kind == "private").then(|| InlineKeyboardButton::text("Secrets"))
}

async fn ask(ctx: Context) -> Result<Option<SendMessage>> {
    ctx.send_text("What is your name? (send a command to cancel)")
        .await?;
    let Some(answer) = ctx.expect_answer().await else {
        return Ok(None);
    };
    ctx.send_text("And your favourite colour?").await?;
    let Some(colour) = answer.expect_answer().await else {
        return Ok(None);
    };
    Ok(Some(SendMessage::new(format!(
        "Nice to meet you, {} who likes {}.",
        answer.text(),
        colour.text()
    ))))
}

async fn notify(ctx: Context) -> Result<Option<SendMessage>> {
    let mut parts = ctx.text().splitn(3, ' ').skip(1);
    let (Some(alias), Some(text)) = (parts.next(), parts.next()) else {
        return Ok(Some(SendMessage::new("Usage: /notify @alias text")));
    };
    let target = BOT
        .get()
        .and_then(|bot| bot.lookup_chat_id(alias).and_then(|id| bot.context_for(id)));
    match target {
        Some(target) => {
            target.send_text(text).await?;
            Ok(Some(SendMessage::new("Delivered.")))
        }
        None => Ok(Some(SendMessage::new(format!("I don't know {}.", alias)))),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = TelegramConfig::from_env()?;
    init_tracing(config.log_file.as_deref())?;

    let mut builder = builder_from_config(&config).await?;
    builder
        .intercept(UpdateLogger)
        .intercept(BlockList::default())
        .pre(LoggingMiddleware);

    let mut menu = builder.fsm(main_menu)?;
    let root = menu.root();
    menu.set_columns(root, 2);
    let yes = menu.add(root, "Yes", fsm::text("Great! Pick something."))?;
    menu.add(root, "No", fsm::text("Maybe later."))?;
    menu.add(yes, "Time", time_state)?;
    menu.add(yes, "Rate", rate_state)?;
    menu.add_dynamic(yes, admin_button, private_only)?;
    let menu = builder.add_fsm(menu)?;
    builder.handle_fsm("/menu|/start", &menu)?;

    builder.handle("/ask", ask)?;
    let admins = std::env::var("ADMIN_USER_IDS")
        .unwrap_or_default()
        .split(',')
        .filter_map(|id| id.trim().parse().ok())
        .collect::<Vec<i64>>();
    let admins_only: Arc<dyn Middleware> = Arc::new(AllowList::new(admins));
    builder.handle_with("/notify .+", notify, vec![admins_only])?;

    let bot = builder.build().await?;
    let _ = BOT.set(bot.clone());
    info!(username = ?bot.me().username, chats = bot.chats().len(), "Menu Bot started");
    run_until_ctrl_c(bot).await
}
