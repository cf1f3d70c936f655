//! # Router
//!
//! Static command handlers bound to anchored patterns, wrapped by global and per-route
//! middleware. Interceptors run before any routing and may drop an update entirely.

use std::any::Any;
use std::backtrace::Backtrace;
use std::cell::RefCell;
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Once};

use async_trait::async_trait;
use futures::FutureExt;
use regex::Regex;
use tebo_core::{Result, SendMessage, TeboError};
use tracing::{debug, info, instrument};

use crate::context::Context;
use crate::fsm::Fsm;

/// Terminal callback of a route. A returned message is sent to the chat.
#[async_trait]
pub trait Handler: Send + Sync {
    async fn handle(&self, ctx: Context) -> Result<Option<SendMessage>>;
}

pub type HandlerRef = Arc<dyn Handler>;

#[async_trait]
impl<F, Fut> Handler for F
where
    F: Fn(Context) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Option<SendMessage>>> + Send + 'static,
{
    async fn handle(&self, ctx: Context) -> Result<Option<SendMessage>> {
        (self)(ctx).await
    }
}

/// Decision of a middleware link.
pub enum Next {
    /// Continue with this callback (the one passed in, or a substitute).
    Continue(HandlerRef),
    /// End the dispatch silently.
    Stop,
}

/// Wraps the next callback of a route; may substitute it or stop the chain.
#[async_trait]
pub trait Middleware: Send + Sync {
    async fn wrap(&self, next: HandlerRef, ctx: &Context) -> Next;
}

/// Decision of an interceptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Stop,
}

/// Inspects every update before routing.
#[async_trait]
pub trait Interceptor: Send + Sync {
    async fn intercept(&self, ctx: &Context) -> Flow;
}

#[async_trait]
impl<F> Interceptor for F
where
    F: Fn(&Context) -> Flow + Send + Sync,
{
    async fn intercept(&self, ctx: &Context) -> Flow {
        (self)(ctx)
    }
}

struct Route {
    pattern: String,
    regex: Regex,
    handler: HandlerRef,
    middleware: Vec<Arc<dyn Middleware>>,
}

/// Ordered pattern → handler bindings; the first anchored match wins.
#[derive(Default)]
pub struct Router {
    routes: Vec<Route>,
    middleware: Vec<Arc<dyn Middleware>>,
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds `pattern`, matched against the whole message text.
    pub fn add_route(
        &mut self,
        pattern: &str,
        handler: HandlerRef,
        middleware: Vec<Arc<dyn Middleware>>,
    ) -> Result<()> {
        let regex = Regex::new(&format!("^(?:{})$", pattern))
            .map_err(|e| TeboError::Pattern(format!("{}: {}", pattern, e)))?;
        self.routes.push(Route {
            pattern: pattern.to_string(),
            regex,
            handler,
            middleware,
        });
        Ok(())
    }

    /// Appends a middleware that wraps every route.
    pub fn add_middleware(&mut self, middleware: Arc<dyn Middleware>) {
        self.middleware.push(middleware);
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Pattern of the first route matching `text`.
    pub fn matching_pattern(&self, text: &str) -> Option<&str> {
        self.find(text).map(|r| r.pattern.as_str())
    }

    fn find(&self, text: &str) -> Option<&Route> {
        self.routes.iter().find(|r| r.regex.is_match(text))
    }

    /// Runs the matching route: middleware chain, then the handler, then sends its reply.
    ///
    /// A panic anywhere in the chain is caught and reported as [`TeboError::HandlerPanic`].
    #[instrument(skip(self, ctx), fields(chat_id = ctx.chat_id(), update_id = ctx.update().update_id))]
    pub async fn execute(&self, ctx: &Context) -> Result<()> {
        install_panic_hook();
        match AssertUnwindSafe(self.run(ctx)).catch_unwind().await {
            Ok(result) => result,
            Err(payload) => Err(TeboError::HandlerPanic {
                message: panic_message(payload.as_ref()),
                backtrace: take_panic_backtrace(),
            }),
        }
    }

    async fn run(&self, ctx: &Context) -> Result<()> {
        let Some(route) = self.find(ctx.text()) else {
            debug!(text = %ctx.text(), "no handler matches, update dropped");
            return Ok(());
        };
        info!(pattern = %route.pattern, "step: handler matched");

        let mut next = route.handler.clone();
        for mw in self.middleware.iter().chain(route.middleware.iter()) {
            let mw_name = std::any::type_name_of_val(mw.as_ref());
            match mw.wrap(next, ctx).await {
                Next::Continue(handler) => next = handler,
                Next::Stop => {
                    info!(
                        pattern = %route.pattern,
                        middleware = %mw_name,
                        "step: middleware stopped the chain"
                    );
                    return Ok(());
                }
            }
        }

        if let Some(reply) = next.handle(ctx.clone()).await? {
            ctx.send(&reply).await?;
        }
        info!(pattern = %route.pattern, "step: handler done");
        Ok(())
    }
}

thread_local! {
    /// Trace of the last panic on this thread, taken while its stack was still intact.
    static PANIC_BACKTRACE: RefCell<Option<String>> = const { RefCell::new(None) };
}

static PANIC_HOOK: Once = Once::new();

/// Chains a hook in front of the current one that records the panic-site backtrace.
fn install_panic_hook() {
    PANIC_HOOK.call_once(|| {
        let previous = panic::take_hook();
        panic::set_hook(Box::new(move |info| {
            let trace = Backtrace::force_capture().to_string();
            PANIC_BACKTRACE.with(|slot| *slot.borrow_mut() = Some(trace));
            previous(info);
        }));
    });
}

/// The catch site polls the panicking future on the same thread, so the slot holds
/// its trace. Falls back to a trace of the catch site.
fn take_panic_backtrace() -> String {
    PANIC_BACKTRACE
        .with(|slot| slot.borrow_mut().take())
        .unwrap_or_else(|| Backtrace::force_capture().to_string())
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Route handler that enters an FSM tree at its root.
pub(crate) struct FsmEntry {
    pub(crate) fsm: Arc<Fsm>,
}

#[async_trait]
impl Handler for FsmEntry {
    async fn handle(&self, ctx: Context) -> Result<Option<SendMessage>> {
        self.fsm.clone().handle(&ctx).await?;
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn noop(_ctx: Context) -> Result<Option<SendMessage>> {
        Ok(None)
    }

    #[test]
    fn test_patterns_are_anchored() {
        let mut router = Router::new();
        router.add_route("/start", Arc::new(noop), vec![]).unwrap();

        assert_eq!(router.matching_pattern("/start"), Some("/start"));
        assert_eq!(router.matching_pattern("/start now"), None);
        assert_eq!(router.matching_pattern("x/start"), None);
    }

    #[test]
    fn test_first_match_wins() {
        let mut router = Router::new();
        router.add_route("/echo .*", Arc::new(noop), vec![]).unwrap();
        router.add_route("/echo hi", Arc::new(noop), vec![]).unwrap();

        assert_eq!(router.matching_pattern("/echo hi"), Some("/echo .*"));
        assert_eq!(router.len(), 2);
    }

    #[test]
    fn test_alternation_is_fully_anchored() {
        let mut router = Router::new();
        router.add_route("/a|/b", Arc::new(noop), vec![]).unwrap();

        assert!(router.matching_pattern("/b").is_some());
        assert!(router.matching_pattern("/a/b").is_none());
    }

    #[test]
    fn test_invalid_pattern_rejected() {
        let mut router = Router::new();
        let err = router.add_route("/bad(", Arc::new(noop), vec![]).unwrap_err();
        assert!(matches!(err, TeboError::Pattern(_)));
        assert!(router.is_empty());
    }

    #[test]
    fn test_panic_message_from_payload() {
        let payload: Box<dyn Any + Send> = Box::new("boom");
        assert_eq!(panic_message(payload.as_ref()), "boom");
        let payload: Box<dyn Any + Send> = Box::new(String::from("bang"));
        assert_eq!(panic_message(payload.as_ref()), "bang");
        let payload: Box<dyn Any + Send> = Box::new(7u8);
        assert_eq!(panic_message(payload.as_ref()), "non-string panic payload");
    }
}
