// ABOUTME: Per-dispatch context handed to every handler and command invocation
// ABOUTME: Carries the event, its originating backend, the bot handle, and the mention token

use crate::backend::{no_backend, Backend};
use crate::error::Abort;
use crate::handle::BotHandle;
use crate::model::{no_message_event, MessageEvent, SharedChannel, SharedEntity, SharedEvent};
use anyhow::Result;
use std::fmt;
use std::sync::Arc;

/// Everything a handler needs to know about the event it is handling.
///
/// Built fresh for each dispatched event and cloned into each task, so
/// concurrent handlers never see each other's event.
#[derive(Clone)]
pub struct Context {
    event: SharedEvent,
    backend: Arc<dyn Backend>,
    bot: BotHandle,
    mention: Option<String>,
}

impl Context {
    pub fn new(event: SharedEvent, backend: Arc<dyn Backend>, bot: BotHandle) -> Self {
        Self {
            event,
            backend,
            bot,
            mention: None,
        }
    }

    /// Context with no real event, backend or bot behind it.
    pub fn detached() -> Self {
        Self::new(no_message_event(), no_backend(), BotHandle::detached())
    }

    /// Record the token that addressed the bot in this message.
    pub fn with_mention(mut self, mention: impl Into<String>) -> Self {
        self.mention = Some(mention.into());
        self
    }

    pub fn event(&self) -> &SharedEvent {
        &self.event
    }

    pub fn backend(&self) -> &Arc<dyn Backend> {
        &self.backend
    }

    pub fn bot(&self) -> &BotHandle {
        &self.bot
    }

    /// Mention token, set only when the message addressed the bot
    pub fn mention(&self) -> Option<&str> {
        self.mention.as_deref()
    }

    pub fn message(&self) -> Option<&dyn MessageEvent> {
        self.event.as_message()
    }

    /// Message text, empty for non-message events
    pub fn text(&self) -> &str {
        self.message().map(|m| m.text()).unwrap_or("")
    }

    pub fn sender(&self) -> SharedEntity {
        self.event.sender()
    }

    pub fn channel(&self) -> SharedChannel {
        self.event.channel()
    }

    /// Reply to the event in its channel
    pub async fn reply(&self, text: &str) -> Result<()> {
        self.event.reply(text).await
    }

    /// Post to the event's channel without addressing anyone
    pub async fn say(&self, text: &str) -> Result<()> {
        self.event.channel().say(text).await
    }

    /// Stop the whole bot. Returns false when no run loop is listening.
    pub fn abort(&self, reason: impl Into<String>) -> bool {
        self.bot.abort(Abort::new(reason))
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("event", &self.event)
            .field("backend", &self.backend.name())
            .field("bot", &self.bot.name())
            .field("mention", &self.mention)
            .finish()
    }
}
