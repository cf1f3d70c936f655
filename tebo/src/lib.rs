//! # tebo
//!
//! Update-dispatch and conversational-state engine for long-polling bots.
//!
//! Updates fetched by the poll loop are routed with a fixed precedence:
//! interceptors, a pending [`Context::expect_answer`], the chat's active FSM menu, then
//! static command handlers. Per-chat state lives in the [`ChatRegistry`].
//!
//! ```no_run
//! # use std::sync::Arc;
//! # use tebo::{fsm, BotBuilder, Context};
//! # use tebo_core::{BotApi, Result, SendMessage};
//! async fn start(_ctx: Context) -> Result<Option<SendMessage>> {
//!     Ok(Some(SendMessage::new("hello")))
//! }
//!
//! # async fn demo(api: Arc<dyn BotApi>) -> Result<()> {
//! let mut builder = BotBuilder::new(api);
//! builder.handle("/start", start)?;
//! let mut menu = builder.fsm(fsm::text("Continue?"))?;
//! menu.add(menu.root(), "Yes", fsm::text("Done"))?;
//! let menu = builder.add_fsm(menu)?;
//! builder.handle_fsm("/menu", &menu)?;
//! let bot = builder.build().await?;
//! bot.run().await;
//! # Ok(())
//! # }
//! ```

pub mod bot;
pub mod chats;
pub mod context;
pub mod dispatcher;
pub mod fsm;
pub mod poller;
pub mod router;

pub use bot::{Bot, BotBuilder};
pub use chats::{ChatRegistry, ChatState};
pub use context::Context;
pub use dispatcher::Dispatcher;
pub use fsm::{ButtonBuilder, Fsm, FsmBuilder, Render, State, StateHandler, StateRef};
pub use poller::PollConfig;
pub use router::{Flow, Handler, HandlerRef, Interceptor, Middleware, Next, Router};
