use std::collections::HashSet;

use async_trait::async_trait;
use tebo::{Context, HandlerRef, Middleware, Next};
use tracing::{info, instrument, warn};

/// Logs each routed command; always continues.
pub struct LoggingMiddleware;

#[async_trait]
impl Middleware for LoggingMiddleware {
    #[instrument(skip(self, next, ctx))]
    async fn wrap(&self, next: HandlerRef, ctx: &Context) -> Next {
        let from = ctx.from();
        info!(
            user_id = from.map(|u| u.id),
            username = %from.and_then(|u| u.username.as_deref()).unwrap_or("unknown"),
            chat_id = ctx.chat_id(),
            message_content = %ctx.text(),
            "Received command"
        );
        Next::Continue(next)
    }
}

/// Stops the chain unless the sender is in the allowlist.
pub struct AllowList {
    allowed_users: HashSet<i64>,
}

impl AllowList {
    /// Creates a middleware that lets only the given user ids through.
    pub fn new(allowed_users: impl IntoIterator<Item = i64>) -> Self {
        Self {
            allowed_users: allowed_users.into_iter().collect(),
        }
    }

    pub fn is_allowed(&self, user_id: i64) -> bool {
        self.allowed_users.contains(&user_id)
    }
}

#[async_trait]
impl Middleware for AllowList {
    #[instrument(skip(self, next, ctx))]
    async fn wrap(&self, next: HandlerRef, ctx: &Context) -> Next {
        match ctx.from().map(|u| u.id) {
            Some(user_id) if self.is_allowed(user_id) => {
                info!(user_id, "User authorized");
                Next::Continue(next)
            }
            user_id => {
                warn!(user_id, chat_id = ctx.chat_id(), "Unauthorized access attempt");
                Next::Stop
            }
        }
    }
}
