// ABOUTME: Overridable failure hooks consulted by the run loop and handler tasks
// ABOUTME: LoggingHooks logs and keeps the bot alive

use crate::context::Context;
use async_trait::async_trait;

/// Failure policy of a bot.
#[async_trait]
pub trait BotHooks: Send + Sync {
    /// A loop-level error surfaced while pulling events (e.g. a backend gave
    /// up restarting). Return `true` to keep running, `false` to stop.
    async fn internal_exception(&self, error: &anyhow::Error) -> bool {
        tracing::error!(error = %error, details = ?error, "Internal exception handled");
        true
    }

    /// A handler task failed with an ordinary error. The error is swallowed
    /// after this returns.
    async fn handler_exception(&self, handler: &str, ctx: &Context, error: &anyhow::Error) {
        tracing::error!(
            handler = %handler,
            backend = %ctx.backend().name(),
            event = ?ctx.event(),
            error = %error,
            details = ?error,
            "Handler failed"
        );
    }
}

/// Default hooks: log everything, never stop.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingHooks;

impl BotHooks for LoggingHooks {}
