//! Integration tests for the bot lifecycle: build, poll loop, history, proactive contexts.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{chat, command_update, text_update, Call, MockApi};
use tebo::{Bot, BotBuilder, Context, PollConfig};
use tebo_core::{Result, SendMessage, TeboError};
use tebo_storage::{History, MemoryHistory};

fn fast_polling(max_in_flight: usize) -> PollConfig {
    PollConfig {
        short_interval: Duration::from_millis(5),
        long_interval: Duration::from_millis(20),
        idle_threshold: Duration::from_secs(60),
        max_in_flight,
    }
}

async fn start(_ctx: Context) -> Result<Option<SendMessage>> {
    Ok(Some(SendMessage::new("started")))
}

async fn ask(ctx: Context) -> Result<Option<SendMessage>> {
    ctx.send_text("Name?").await?;
    let answer = ctx.expect_answer().await;
    Ok(answer.map(|a| SendMessage::new(format!("Hi {}", a.text()))))
}

async fn stall(ctx: Context) -> Result<Option<SendMessage>> {
    ctx.send_text("working").await?;
    tokio::time::sleep(Duration::from_secs(3600)).await;
    Ok(None)
}

async fn wait_for_offsets(api: &MockApi, n: usize) -> Vec<i64> {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let offsets = api.offsets();
            if offsets.len() >= n {
                return offsets;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("poll loop did not fetch enough times")
}

fn spawn_run(bot: &Bot) -> tokio::task::JoinHandle<()> {
    let bot = bot.clone();
    tokio::spawn(async move { bot.run().await })
}

/// **Test: Polling offsets stay strictly after the highest id seen**
///
/// **Setup:** Batches `[5, 3, 4]`, then `[2, 9, 7]` (2 is stale), then nothing.
///
/// **Action:** Run the bot until it fetched four times, then close it.
///
/// **Expected:** Offsets 1, 6, 10, 10...; only fresh updates are persisted, each once.
#[tokio::test]
async fn test_monotonic_polling() {
    let api = MockApi::new();
    api.push_batch(vec![text_update(5, 7, "a"), text_update(3, 7, "b"), text_update(4, 7, "c")]);
    api.push_batch(vec![text_update(2, 7, "d"), text_update(9, 7, "e"), text_update(7, 7, "f")]);
    let history = Arc::new(MemoryHistory::new());

    let mut builder = BotBuilder::new(api.clone());
    builder.history(history.clone()).poll_config(fast_polling(4));
    let bot = builder.build().await.unwrap();

    let running = spawn_run(&bot);
    let offsets = wait_for_offsets(&api, 4).await;
    bot.close();
    running.await.unwrap();

    assert_eq!(offsets[..3], [1, 6, 10]);
    assert!(api.offsets()[2..].iter().all(|&o| o == 10));
    assert_eq!(bot.high_water_mark(), 9);

    let stored: Vec<i64> = history.updates().await.iter().map(|u| u.update_id).collect();
    assert_eq!(stored, vec![3, 4, 5, 7, 9]);
}

/// **Test: Updates fetched by the poll loop reach their handlers**
///
/// **Setup:** `/start` handler; one batch with `/start`.
///
/// **Action:** Run the bot.
///
/// **Expected:** "started" is sent to chat 7.
#[tokio::test]
async fn test_poll_loop_dispatches() {
    let api = MockApi::new();
    api.push_batch(vec![command_update(1, 7, "/start")]);

    let mut builder = BotBuilder::new(api.clone());
    builder.poll_config(fast_polling(4));
    builder.handle("/start", start).unwrap();
    let bot = builder.build().await.unwrap();

    let running = spawn_run(&bot);
    let calls = api.wait_for_calls(1).await;
    bot.close();
    running.await.unwrap();

    assert!(matches!(
        &calls[0],
        Call::Send { chat_id: 7, message, .. } if message.text == "started"
    ));
}

/// **Test: Fetch errors do not stop the loop**
///
/// **Setup:** First fetch fails with a network error, second returns update 1.
///
/// **Action:** Run the bot.
///
/// **Expected:** The loop retries with the same offset, then advances past update 1.
#[tokio::test]
async fn test_fetch_error_retried() {
    let api = MockApi::new();
    api.push_error(TeboError::Network("connection reset".to_string()));
    api.push_batch(vec![text_update(1, 7, "hi")]);

    let mut builder = BotBuilder::new(api.clone());
    builder.poll_config(fast_polling(4));
    let bot = builder.build().await.unwrap();

    let running = spawn_run(&bot);
    let offsets = wait_for_offsets(&api, 3).await;
    bot.close();
    running.await.unwrap();

    assert_eq!(offsets[..3], [1, 1, 2]);
}

/// **Test: A parked expect_answer frees its dispatch slot**
///
/// **Setup:** A single dispatch slot; `/ask` waits for an answer; batches `/ask` then "Bob".
///
/// **Action:** Run the bot.
///
/// **Expected:** "Bob" is dispatched while `/ask` waits, and the greeting is sent.
#[tokio::test]
async fn test_parked_answer_releases_slot() {
    let api = MockApi::new();
    api.push_batch(vec![command_update(1, 7, "/ask")]);
    api.push_batch(vec![text_update(2, 7, "Bob")]);

    let mut builder = BotBuilder::new(api.clone());
    builder.poll_config(fast_polling(1));
    builder.handle("/ask", ask).unwrap();
    let bot = builder.build().await.unwrap();

    let running = spawn_run(&bot);
    api.wait_for_calls(2).await;
    bot.close();
    running.await.unwrap();

    let texts: Vec<String> = api.sends().into_iter().map(|m| m.text).collect();
    assert_eq!(texts, vec!["Name?", "Hi Bob"]);
}

/// **Test: Closing stops a loop that waits for a dispatch slot**
///
/// **Setup:** A single dispatch slot; one batch of two `/stall` commands whose handler
/// never finishes.
///
/// **Action:** Run the bot until the first handler started, then close it.
///
/// **Expected:** `run` returns promptly; the second update was never dispatched.
#[tokio::test]
async fn test_close_while_pool_full() {
    let api = MockApi::new();
    api.push_batch(vec![command_update(1, 7, "/stall"), command_update(2, 7, "/stall")]);

    let mut builder = BotBuilder::new(api.clone());
    builder.poll_config(fast_polling(1));
    builder.handle("/stall", stall).unwrap();
    let bot = builder.build().await.unwrap();

    let running = spawn_run(&bot);
    api.wait_for_calls(1).await;
    bot.close();
    tokio::time::timeout(Duration::from_secs(1), running)
        .await
        .expect("poll loop ignored close while the pool was full")
        .unwrap();

    assert_eq!(api.sends().len(), 1);
    assert_eq!(bot.high_water_mark(), 1);
}

/// **Test: History seeds the chat registry and the high-water mark**
///
/// **Setup:** History with mark 41 and chat 7 aliased "alice".
///
/// **Action:** Build the bot, look the alias up, run one poll.
///
/// **Expected:** Alias resolves to 7 (with or without "@"), polling starts at offset 42.
#[tokio::test]
async fn test_history_seeds_registry() {
    let api = MockApi::new();
    let mut builder = BotBuilder::new(api.clone());
    builder
        .history(Arc::new(MemoryHistory::with_history(History {
            high_water_mark: 41,
            chats: vec![chat(7, Some("alice"))],
        })))
        .poll_config(fast_polling(4));
    let bot = builder.build().await.unwrap();

    assert_eq!(bot.lookup_chat_id("alice"), Some(7));
    assert_eq!(bot.lookup_chat_id("@alice"), Some(7));
    assert_eq!(bot.lookup_chat_id("bob"), None);
    assert_eq!(bot.high_water_mark(), 41);
    assert_eq!(bot.me().username.as_deref(), Some("tebo_bot"));

    let running = spawn_run(&bot);
    let offsets = wait_for_offsets(&api, 1).await;
    bot.close();
    running.await.unwrap();
    assert_eq!(offsets[0], 42);
}

/// **Test: Proactive context sends to a known chat**
///
/// **Setup:** Chat 7 seen in a previous update.
///
/// **Action:** Obtain `context_for(7)` and send a text; ask for an unknown chat.
///
/// **Expected:** Message sent to chat 7; unknown chat yields no context.
#[tokio::test]
async fn test_context_for_known_chat() {
    let api = MockApi::new();
    let bot = BotBuilder::new(api.clone()).build().await.unwrap();
    bot.dispatcher().dispatch(text_update(1, 7, "hello")).await;

    let ctx = bot.context_for(7).unwrap();
    ctx.send_text("reminder").await.unwrap();

    assert!(matches!(
        &api.calls()[0],
        Call::Send { chat_id: 7, message, .. } if message.text == "reminder"
    ));
    assert!(bot.context_for(8).is_none());
}

/// **Test: Closing before running returns immediately**
///
/// **Setup:** Fresh bot.
///
/// **Action:** Close, then run.
///
/// **Expected:** `run` returns without fetching.
#[tokio::test]
async fn test_close_before_run() {
    let api = MockApi::new();
    let bot = BotBuilder::new(api.clone()).build().await.unwrap();

    bot.close();
    assert!(bot.is_closed());
    tokio::time::timeout(Duration::from_secs(1), bot.run())
        .await
        .unwrap();
    assert!(api.offsets().is_empty());
}
