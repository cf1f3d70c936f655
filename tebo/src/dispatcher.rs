//! # Dispatcher
//!
//! Routes one update through the fixed precedence chain:
//! interceptors, then a pending `expect_answer`, then the chat's active FSM, then the router.

use std::sync::Arc;

use tebo_core::{BotApi, Update};
use tokio::sync::OwnedSemaphorePermit;
use tracing::{debug, error, info, instrument, warn};

use crate::chats::{Answer, ChatRegistry};
use crate::context::Context;
use crate::fsm::{tree_prefix, Fsm};
use crate::router::{Flow, Interceptor, Router};

/// Owns every registration of a bot. Immutable once built.
pub struct Dispatcher {
    api: Arc<dyn BotApi>,
    chats: Arc<ChatRegistry>,
    router: Router,
    interceptors: Vec<Arc<dyn Interceptor>>,
    fsms: Vec<Arc<Fsm>>,
}

impl Dispatcher {
    pub(crate) fn new(
        api: Arc<dyn BotApi>,
        chats: Arc<ChatRegistry>,
        router: Router,
        interceptors: Vec<Arc<dyn Interceptor>>,
        fsms: Vec<Arc<Fsm>>,
    ) -> Self {
        Self {
            api,
            chats,
            router,
            interceptors,
            fsms,
        }
    }

    pub fn chats(&self) -> &Arc<ChatRegistry> {
        &self.chats
    }

    pub fn router(&self) -> &Router {
        &self.router
    }

    /// Tree owning the state id `id`, by its root prefix.
    pub fn fsm_for(&self, id: &str) -> Option<&Arc<Fsm>> {
        let prefix = tree_prefix(id)?;
        self.fsms.iter().find(|f| f.root_id() == prefix)
    }

    /// Processes one update to completion.
    pub async fn dispatch(&self, update: Update) {
        self.dispatch_with_permit(update, None).await
    }

    #[instrument(skip(self, update, permit), fields(update_id = update.update_id))]
    pub(crate) async fn dispatch_with_permit(
        &self,
        update: Update,
        permit: Option<OwnedSemaphorePermit>,
    ) {
        let Some(ctx) = self.context(update, permit) else {
            return;
        };

        for interceptor in &self.interceptors {
            if interceptor.intercept(&ctx).await == Flow::Stop {
                info!(
                    chat_id = ctx.chat_id(),
                    interceptor = %std::any::type_name_of_val(interceptor.as_ref()),
                    "step: update stopped by interceptor"
                );
                return;
            }
        }

        let Some(ctx) = self.deliver_pending(ctx) else {
            return;
        };

        if !ctx.update().is_command() {
            if let Some(fsm) = ctx.chat().active_fsm() {
                debug!(chat_id = ctx.chat_id(), fsm = %fsm.root_id(), "step: routed to active fsm");
                if let Err(e) = fsm.handle(&ctx).await {
                    error!(chat_id = ctx.chat_id(), error = %e, "fsm dispatch failed");
                }
                return;
            }
        }

        if ctx.is_callback() {
            debug!(
                chat_id = ctx.chat_id(),
                data = ?ctx.callback_data(),
                "callback without active fsm, update dropped"
            );
            return;
        }

        if let Err(e) = self.router.execute(&ctx).await {
            error!(chat_id = ctx.chat_id(), error = %e, "handler failed");
        }
    }

    /// Builds the context and applies the per-update chat bookkeeping.
    fn context(&self, update: Update, permit: Option<OwnedSemaphorePermit>) -> Option<Context> {
        let Some(message) = update.resolved_message().cloned() else {
            warn!(update_id = update.update_id, "update without chat, ignored");
            return None;
        };
        let chat = self.chats.get_or_create(&message.chat);

        if let Some(data) = update.callback_data() {
            if let Some(fsm) = self.fsm_for(data) {
                chat.set_active_fsm(fsm);
            }
            chat.set_edit_target(message.message_id);
        } else {
            chat.mark_user_message();
        }

        Some(Context::new(self.api.clone(), update, message, chat, permit))
    }

    /// Resolves an outstanding `expect_answer` of the chat. Returns the context when
    /// routing must continue.
    fn deliver_pending(&self, ctx: Context) -> Option<Context> {
        let Some(tx) = ctx.chat().take_pending() else {
            return Some(ctx);
        };

        if ctx.text().starts_with('/') {
            debug!(chat_id = ctx.chat_id(), "step: pending answer cancelled by command");
            let _ = tx.send(Answer::Cancelled);
            return Some(ctx);
        }

        match tx.send(Answer::Reply(ctx)) {
            Ok(()) => {
                debug!("step: update delivered to pending answer");
                None
            }
            Err(Answer::Reply(ctx)) => {
                debug!(chat_id = ctx.chat_id(), "pending answer abandoned, routing normally");
                Some(ctx)
            }
            Err(Answer::Cancelled) => None,
        }
    }
}
