// ABOUTME: Handlers and hooks that record what reached them, for asserting on dispatch
// ABOUTME: RecordingHandler can also be told to fail, abort, or hang

use crate::context::Context;
use crate::error::Abort;
use crate::handler::EventHandler;
use crate::hooks::BotHooks;
use crate::kind::Interest;
use crate::model::SharedEvent;
use crate::testing::mock::MockEvent;
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::sync::Mutex;
use std::time::Duration;

/// Identifier of an event for assertions: the mock id, or the kind otherwise
pub fn event_id(event: &SharedEvent) -> String {
    match event.as_any().downcast_ref::<MockEvent>() {
        Some(mock) => mock.id().to_string(),
        None => event.kind().to_string(),
    }
}

#[derive(Debug, Clone)]
enum Behavior {
    Succeed,
    Fail(String),
    Abort(String),
    Hang,
}

/// Handler recording the id of every event it handled.
pub struct RecordingHandler {
    name: String,
    interest: Interest,
    delay: Option<Duration>,
    behavior: Behavior,
    seen: Mutex<Vec<String>>,
    mentions: Mutex<Vec<Option<String>>>,
}

impl RecordingHandler {
    pub fn new(name: impl Into<String>, interest: impl Into<Interest>) -> Self {
        Self {
            name: name.into(),
            interest: interest.into(),
            delay: None,
            behavior: Behavior::Succeed,
            seen: Mutex::new(Vec::new()),
            mentions: Mutex::new(Vec::new()),
        }
    }

    /// Wait this long after recording, before finishing
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Return an ordinary error after recording
    pub fn failing(mut self, message: impl Into<String>) -> Self {
        self.behavior = Behavior::Fail(message.into());
        self
    }

    /// Return the fatal condition after recording
    pub fn aborting(mut self, reason: impl Into<String>) -> Self {
        self.behavior = Behavior::Abort(reason.into());
        self
    }

    /// Never finish
    pub fn hanging(mut self) -> Self {
        self.behavior = Behavior::Hang;
        self
    }

    /// Ids of handled events, in the order handling started
    pub fn seen(&self) -> Vec<String> {
        self.seen.lock().unwrap().clone()
    }

    pub fn count(&self) -> usize {
        self.seen.lock().unwrap().len()
    }

    /// Mention token of each handled event's context
    pub fn mentions(&self) -> Vec<Option<String>> {
        self.mentions.lock().unwrap().clone()
    }
}

#[async_trait]
impl EventHandler for RecordingHandler {
    fn name(&self) -> &str {
        &self.name
    }

    fn interest(&self) -> Interest {
        self.interest.clone()
    }

    async fn handle(&self, ctx: Context) -> Result<()> {
        self.seen.lock().unwrap().push(event_id(ctx.event()));
        self.mentions
            .lock()
            .unwrap()
            .push(ctx.mention().map(str::to_string));

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        match &self.behavior {
            Behavior::Succeed => Ok(()),
            Behavior::Fail(message) => Err(anyhow!("{}", message)),
            Behavior::Abort(reason) => Err(Abort::new(reason.clone()).into()),
            Behavior::Hang => futures_util::future::pending().await,
        }
    }
}

/// Hooks recording every failure they were consulted about.
pub struct RecordingHooks {
    keep_running: bool,
    internal: Mutex<Vec<String>>,
    handler_failures: Mutex<Vec<(String, String)>>,
}

impl RecordingHooks {
    /// Hooks that keep the bot running after loop-level errors
    pub fn new() -> Self {
        Self {
            keep_running: true,
            internal: Mutex::new(Vec::new()),
            handler_failures: Mutex::new(Vec::new()),
        }
    }

    /// Hooks that stop the bot at the first loop-level error
    pub fn stopping() -> Self {
        Self {
            keep_running: false,
            ..Self::new()
        }
    }

    /// Loop-level errors, formatted with their full context chain
    pub fn internal_errors(&self) -> Vec<String> {
        self.internal.lock().unwrap().clone()
    }

    /// `(handler name, error)` for each handler failure
    pub fn handler_failures(&self) -> Vec<(String, String)> {
        self.handler_failures.lock().unwrap().clone()
    }
}

impl Default for RecordingHooks {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BotHooks for RecordingHooks {
    async fn internal_exception(&self, error: &anyhow::Error) -> bool {
        self.internal.lock().unwrap().push(format!("{:#}", error));
        self.keep_running
    }

    async fn handler_exception(&self, handler: &str, _ctx: &Context, error: &anyhow::Error) {
        self.handler_failures
            .lock()
            .unwrap()
            .push((handler.to_string(), format!("{:#}", error)));
    }
}
