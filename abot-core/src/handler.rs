// ABOUTME: EventHandler trait for asynchronous event consumers
// ABOUTME: handler_fn adapts an async closure plus an explicit interest into a handler

use crate::context::Context;
use crate::kind::Interest;
use anyhow::Result;
use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;

/// An asynchronous consumer of events.
///
/// Each matching event runs `handle` in its own task. Returning an
/// [`crate::Abort`] stops the bot; any other error is reported through
/// [`crate::BotHooks::handler_exception`] and swallowed.
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Name used in logs
    fn name(&self) -> &str;

    /// Kinds this handler declares for itself, used by `register_handler`.
    /// Empty by default, which makes self-registration an error.
    fn interest(&self) -> Interest {
        Interest::none()
    }

    async fn handle(&self, ctx: Context) -> Result<()>;
}

/// Handler backed by an async closure.
pub struct FnHandler<F> {
    name: String,
    interest: Interest,
    f: F,
}

#[async_trait]
impl<F, Fut> EventHandler for FnHandler<F>
where
    F: Fn(Context) -> Fut + Send + Sync,
    Fut: Future<Output = Result<()>> + Send,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn interest(&self) -> Interest {
        self.interest.clone()
    }

    async fn handle(&self, ctx: Context) -> Result<()> {
        (self.f)(ctx).await
    }
}

/// Build a shareable handler from a closure.
///
/// ```
/// use abot_core::{handler_fn, EventHandler, EventKind, Interest};
///
/// let greeter = handler_fn(
///     "greeter",
///     Interest::of(EventKind::MemberJoined),
///     |ctx| async move { ctx.reply("welcome!").await },
/// );
/// assert_eq!(greeter.name(), "greeter");
/// ```
pub fn handler_fn<F, Fut>(
    name: impl Into<String>,
    interest: impl Into<Interest>,
    f: F,
) -> Arc<dyn EventHandler>
where
    F: Fn(Context) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    Arc::new(FnHandler {
        name: name.into(),
        interest: interest.into(),
        f,
    })
}
