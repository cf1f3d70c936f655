//! Bot assembly: [`BotBuilder`] collects registrations, [`Bot`] runs them.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use tebo_core::{BotApi, Chat, Message, Result, TeboError, User};
use tebo_storage::{HistoryStore, MemoryHistory};
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument};

use crate::chats::ChatRegistry;
use crate::context::Context;
use crate::dispatcher::Dispatcher;
use crate::fsm::{Fsm, FsmBuilder, StateHandler};
use crate::poller::{PollConfig, Poller};
use crate::router::{FsmEntry, Handler, Interceptor, Middleware, Router};

/// Collects handlers, middleware, interceptors and FSM trees before the bot starts.
pub struct BotBuilder {
    api: Arc<dyn BotApi>,
    history: Arc<dyn HistoryStore>,
    poll_config: PollConfig,
    router: Router,
    interceptors: Vec<Arc<dyn Interceptor>>,
    fsms: Vec<Arc<Fsm>>,
    next_tree: usize,
}

impl BotBuilder {
    /// Builder with an in-memory history and default polling.
    pub fn new(api: Arc<dyn BotApi>) -> Self {
        Self {
            api,
            history: Arc::new(MemoryHistory::new()),
            poll_config: PollConfig::default(),
            router: Router::new(),
            interceptors: Vec::new(),
            fsms: Vec::new(),
            next_tree: 0,
        }
    }

    pub fn history(&mut self, store: Arc<dyn HistoryStore>) -> &mut Self {
        self.history = store;
        self
    }

    pub fn poll_config(&mut self, config: PollConfig) -> &mut Self {
        self.poll_config = config;
        self
    }

    /// Binds `pattern` (anchored regex over the message text) to `handler`.
    pub fn handle(&mut self, pattern: &str, handler: impl Handler + 'static) -> Result<&mut Self> {
        self.handle_with(pattern, handler, Vec::new())
    }

    /// Like [`handle`](Self::handle), with middleware that wraps only this route.
    pub fn handle_with(
        &mut self,
        pattern: &str,
        handler: impl Handler + 'static,
        middleware: Vec<Arc<dyn Middleware>>,
    ) -> Result<&mut Self> {
        self.router.add_route(pattern, Arc::new(handler), middleware)?;
        Ok(self)
    }

    /// Adds a global middleware, run before any route-scoped one.
    pub fn pre(&mut self, middleware: impl Middleware + 'static) -> &mut Self {
        self.router.add_middleware(Arc::new(middleware));
        self
    }

    pub fn intercept(&mut self, interceptor: impl Interceptor + 'static) -> &mut Self {
        self.interceptors.push(Arc::new(interceptor));
        self
    }

    /// Starts a new tree with the next free root symbol.
    pub fn fsm(&mut self, handler: impl StateHandler + 'static) -> Result<FsmBuilder> {
        let builder = FsmBuilder::with_index(self.next_tree, handler)?;
        self.next_tree += 1;
        Ok(builder)
    }

    /// Freezes a tree and registers it for callback routing.
    pub fn add_fsm(&mut self, builder: FsmBuilder) -> Result<Arc<Fsm>> {
        let fsm = Arc::new(builder.build());
        if self.fsms.iter().any(|f| f.root_id() == fsm.root_id()) {
            return Err(TeboError::Fsm(format!(
                "tree root {} registered twice",
                fsm.root_id()
            )));
        }
        self.fsms.push(fsm.clone());
        Ok(fsm)
    }

    /// Binds `pattern` to entering `fsm` at its root.
    pub fn handle_fsm(&mut self, pattern: &str, fsm: &Arc<Fsm>) -> Result<&mut Self> {
        self.handle(pattern, FsmEntry { fsm: fsm.clone() })
    }

    /// Verifies the connection, restores history and returns the runnable bot.
    #[instrument(skip(self))]
    pub async fn build(self) -> Result<Bot> {
        let me = self.api.get_me().await?;
        info!(bot_id = me.id, username = ?me.username, "step: connected");

        let history = self.history.load().await?;
        let chats = Arc::new(ChatRegistry::new());
        for chat in &history.chats {
            chats.get_or_create(chat);
        }
        info!(
            high_water_mark = history.high_water_mark,
            chats = chats.len(),
            routes = self.router.len(),
            fsms = self.fsms.len(),
            "step: history restored"
        );

        let high_water_mark = Arc::new(AtomicI64::new(history.high_water_mark));
        let dispatcher = Arc::new(Dispatcher::new(
            self.api.clone(),
            chats,
            self.router,
            self.interceptors,
            self.fsms,
        ));
        let poller = Poller::new(
            self.api.clone(),
            dispatcher.clone(),
            self.history,
            self.poll_config,
            high_water_mark.clone(),
        );

        Ok(Bot {
            inner: Arc::new(BotInner {
                api: self.api,
                me,
                dispatcher,
                poller,
                high_water_mark,
                token: CancellationToken::new(),
            }),
        })
    }
}

struct BotInner {
    api: Arc<dyn BotApi>,
    me: User,
    dispatcher: Arc<Dispatcher>,
    poller: Poller,
    high_water_mark: Arc<AtomicI64>,
    token: CancellationToken,
}

/// A running bot. Cloning yields another handle to the same bot.
#[derive(Clone)]
pub struct Bot {
    inner: Arc<BotInner>,
}

impl Bot {
    /// Polls and dispatches until [`close`](Self::close) is called.
    pub async fn run(&self) {
        self.inner.poller.run(self.inner.token.clone()).await
    }

    /// Stops the poll loop and cancels an in-flight fetch. Dispatch tasks already
    /// running are left to finish.
    pub fn close(&self) {
        info!("step: closing bot");
        self.inner.token.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.inner.token.is_cancelled()
    }

    pub fn api(&self) -> &Arc<dyn BotApi> {
        &self.inner.api
    }

    /// Account the bot is connected as.
    pub fn me(&self) -> &User {
        &self.inner.me
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.inner.dispatcher
    }

    pub fn chats(&self) -> &Arc<ChatRegistry> {
        self.inner.dispatcher.chats()
    }

    /// Highest update id seen so far.
    pub fn high_water_mark(&self) -> i64 {
        self.inner.high_water_mark.load(Ordering::SeqCst)
    }

    /// Id of the chat known under `alias` (username or title, `@` optional).
    pub fn lookup_chat_id(&self, alias: &str) -> Option<i64> {
        self.chats().lookup_by_alias(alias).map(|c| c.id())
    }

    /// Context for messaging a known chat outside of any update.
    pub fn context_for(&self, chat_id: i64) -> Option<Context> {
        let chat = self.chats().get(chat_id)?;
        let message = Message {
            chat: Chat {
                id: chat_id,
                ..Default::default()
            },
            ..Default::default()
        };
        Some(Context::proactive(self.inner.api.clone(), chat, message))
    }
}

impl std::fmt::Debug for Bot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bot")
            .field("me", &self.inner.me)
            .field("high_water_mark", &self.high_water_mark())
            .field("closed", &self.is_closed())
            .finish()
    }
}
