// ABOUTME: Backend trait every chat-platform or data-source connector implements
// ABOUTME: Also provides the NoBackend absence singleton

use crate::mention::mention_token;
use crate::model::{MessageEvent, SharedEntity, SharedEvent};
use anyhow::Result;
use async_trait::async_trait;
use futures_util::stream::BoxStream;
use std::sync::{Arc, LazyLock};

/// Stream of events produced by one `consume()` cycle.
///
/// An `Err` item ends the cycle. An ordinary error makes the supervisor call
/// `consume()` again; an [`crate::Abort`] stops the bot.
pub type EventStream = BoxStream<'static, Result<SharedEvent>>;

/// A pluggable connector producing events from some external source.
///
/// Lifecycle: `configure` (zero or more times, before the backend is shared),
/// then `initialize` once when the bot starts, then `consume` whenever the
/// supervisor needs a fresh event stream.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Name used in logs (e.g. "telegram", "console")
    fn name(&self) -> &str;

    /// Store credentials and settings. Must be idempotent.
    fn configure(&mut self, _options: &serde_json::Value) -> Result<()> {
        Ok(())
    }

    /// One-time connection setup. A failure here aborts bot startup.
    async fn initialize(&self) -> Result<()> {
        Ok(())
    }

    /// Start a lazy stream of events.
    ///
    /// Ending the stream means "no more events right now", not that the
    /// backend shut down.
    fn consume(&self) -> EventStream;

    /// Entity identifying this backend instance, if known
    fn whoami(&self) -> Option<SharedEntity>;

    /// Mention token when `message` addresses this backend's identity
    fn is_mentioned(&self, message: &dyn MessageEvent) -> Option<String> {
        let me = self.whoami()?;
        if !me.is_present() {
            return None;
        }
        mention_token(me.username(), message.text())
    }

    /// False only for the absence singleton
    fn is_present(&self) -> bool {
        true
    }
}

/// Backend used where none is available. Produces no events.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoBackend;

#[async_trait]
impl Backend for NoBackend {
    fn name(&self) -> &str {
        "none"
    }

    fn consume(&self) -> EventStream {
        Box::pin(futures_util::stream::empty())
    }

    fn whoami(&self) -> Option<SharedEntity> {
        None
    }

    fn is_present(&self) -> bool {
        false
    }
}

static NO_BACKEND: LazyLock<Arc<dyn Backend>> = LazyLock::new(|| Arc::new(NoBackend));

pub fn no_backend() -> Arc<dyn Backend> {
    Arc::clone(&NO_BACKEND)
}
