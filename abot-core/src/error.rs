// ABOUTME: Typed errors for the bot core: the fatal Abort condition and registration errors
// ABOUTME: Everything else travels as anyhow::Error and is recovered from

use thiserror::Error;

/// The one condition that stops the whole bot.
///
/// Backends return it from their event stream and handlers return it from
/// `handle` (or call [`crate::BotHandle::abort`]). Every other error is
/// logged and absorbed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("bot aborted: {reason}")]
pub struct Abort {
    reason: String,
}

impl Abort {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }

    pub fn reason(&self) -> &str {
        &self.reason
    }
}

/// Find an [`Abort`] anywhere in an error chain, including through `.context()` layers.
pub fn find_abort(error: &anyhow::Error) -> Option<&Abort> {
    error.chain().find_map(|cause| cause.downcast_ref::<Abort>())
}

/// Whether the error carries the fatal condition.
pub fn is_abort(error: &anyhow::Error) -> bool {
    find_abort(error).is_some()
}

/// Errors raised while assembling a bot (before it runs).
#[derive(Debug, Error)]
pub enum BotError {
    /// The same backend instance was attached twice
    #[error("backend '{0}' is already attached to this bot")]
    BackendAlreadyAttached(String),

    /// A handler was registered without any event kinds
    #[error("handler '{handler}' must be registered for at least one event kind")]
    EmptyInterest { handler: String },
}
