//! Interceptors run on every update before routing, including button presses and
//! answers to a pending `expect_answer`.

use std::collections::HashSet;
use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;
use tebo::{Context, Flow, Interceptor};
use tracing::{debug, info};

/// Logs every update; always continues.
pub struct UpdateLogger;

#[async_trait]
impl Interceptor for UpdateLogger {
    async fn intercept(&self, ctx: &Context) -> Flow {
        let kind = if ctx.is_callback() { "callback" } else { "message" };
        info!(
            update_id = ctx.update().update_id,
            chat_id = ctx.chat_id(),
            user_id = ctx.from().map(|u| u.id),
            kind,
            text = %ctx.text(),
            data = ?ctx.callback_data(),
            "step: update received"
        );
        Flow::Continue
    }
}

/// Drops every update from blocked users. Clones share one set, so a clone kept
/// outside the bot can block and unblock users while it runs.
#[derive(Clone, Default)]
pub struct BlockList {
    blocked: Arc<RwLock<HashSet<i64>>>,
}

impl BlockList {
    pub fn new(blocked: impl IntoIterator<Item = i64>) -> Self {
        Self {
            blocked: Arc::new(RwLock::new(blocked.into_iter().collect())),
        }
    }

    pub fn block(&self, user_id: i64) {
        self.blocked
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(user_id);
    }

    pub fn unblock(&self, user_id: i64) {
        self.blocked
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&user_id);
    }

    pub fn is_blocked(&self, user_id: i64) -> bool {
        self.blocked
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(&user_id)
    }
}

#[async_trait]
impl Interceptor for BlockList {
    async fn intercept(&self, ctx: &Context) -> Flow {
        match ctx.from() {
            Some(user) if self.is_blocked(user.id) => {
                debug!(user_id = user.id, chat_id = ctx.chat_id(), "update from blocked user dropped");
                Flow::Stop
            }
            _ => Flow::Continue,
        }
    }
}
