// ABOUTME: Backend that plays back a fixed script of events, delays, failures and aborts
// ABOUTME: The script cursor survives consume() restarts so a restarted stream resumes where it failed

use crate::backend::{Backend, EventStream};
use crate::error::Abort;
use crate::model::{SharedEntity, SharedEvent};
use crate::testing::mock::{MockEntity, MockEvent};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use futures_util::stream::{self, StreamExt};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// One instruction of a backend script.
#[derive(Debug, Clone)]
pub enum Step {
    /// Yield this event
    Emit(SharedEvent),
    /// Wait before the next step
    Sleep(Duration),
    /// End the current consume cycle with an ordinary error
    Fail(String),
    /// Fail every consume cycle from here on, immediately
    FailForever(String),
    /// End the current consume cycle with the fatal condition
    Abort(String),
    /// End the current consume cycle normally
    End,
    /// Never produce anything again
    Pending,
}

/// Builder for [`ScriptedBackend`]
pub struct ScriptedBackendBuilder {
    name: String,
    steps: Vec<Step>,
    username: Option<String>,
    fail_initialize: Option<String>,
}

impl ScriptedBackendBuilder {
    pub fn emit(self, event: MockEvent) -> Self {
        self.emit_shared(Arc::new(event))
    }

    pub fn emit_shared(mut self, event: SharedEvent) -> Self {
        self.steps.push(Step::Emit(event));
        self
    }

    pub fn sleep(mut self, duration: Duration) -> Self {
        self.steps.push(Step::Sleep(duration));
        self
    }

    pub fn fail(mut self, message: impl Into<String>) -> Self {
        self.steps.push(Step::Fail(message.into()));
        self
    }

    pub fn fail_forever(mut self, message: impl Into<String>) -> Self {
        self.steps.push(Step::FailForever(message.into()));
        self
    }

    pub fn abort(mut self, reason: impl Into<String>) -> Self {
        self.steps.push(Step::Abort(reason.into()));
        self
    }

    pub fn end(mut self) -> Self {
        self.steps.push(Step::End);
        self
    }

    pub fn pending(mut self) -> Self {
        self.steps.push(Step::Pending);
        self
    }

    /// Identity reported by `whoami()`, enabling mention detection
    pub fn username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    /// Make `initialize()` fail with `message`
    pub fn fail_initialize(mut self, message: impl Into<String>) -> Self {
        self.fail_initialize = Some(message.into());
        self
    }

    pub fn build(self) -> ScriptedBackend {
        ScriptedBackend {
            name: self.name,
            steps: Arc::new(self.steps),
            cursor: Arc::new(AtomicUsize::new(0)),
            consume_calls: AtomicUsize::new(0),
            initialize_calls: AtomicUsize::new(0),
            me: self
                .username
                .map(|username| Arc::new(MockEntity::new(username)) as SharedEntity),
            fail_initialize: self.fail_initialize,
            options: Mutex::new(Vec::new()),
        }
    }
}

/// Backend driven by a list of [`Step`]s.
///
/// When the script runs out, the current cycle ends, and so does every
/// later one.
pub struct ScriptedBackend {
    name: String,
    steps: Arc<Vec<Step>>,
    cursor: Arc<AtomicUsize>,
    consume_calls: AtomicUsize,
    initialize_calls: AtomicUsize,
    me: Option<SharedEntity>,
    fail_initialize: Option<String>,
    options: Mutex<Vec<serde_json::Value>>,
}

impl ScriptedBackend {
    #[allow(clippy::new_ret_no_self)]
    pub fn new(name: impl Into<String>) -> ScriptedBackendBuilder {
        ScriptedBackendBuilder {
            name: name.into(),
            steps: Vec::new(),
            username: None,
            fail_initialize: None,
        }
    }

    /// How many times `consume()` was called
    pub fn consume_calls(&self) -> usize {
        self.consume_calls.load(Ordering::SeqCst)
    }

    pub fn initialize_calls(&self) -> usize {
        self.initialize_calls.load(Ordering::SeqCst)
    }

    /// Options passed to `configure()`, oldest first
    pub fn options(&self) -> Vec<serde_json::Value> {
        self.options.lock().unwrap().clone()
    }
}

#[async_trait]
impl Backend for ScriptedBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn configure(&mut self, options: &serde_json::Value) -> Result<()> {
        if let Some(username) = options.get("username").and_then(|v| v.as_str()) {
            self.me = Some(Arc::new(MockEntity::new(username)));
        }
        self.options.lock().unwrap().push(options.clone());
        Ok(())
    }

    async fn initialize(&self) -> Result<()> {
        self.initialize_calls.fetch_add(1, Ordering::SeqCst);
        match &self.fail_initialize {
            Some(message) => Err(anyhow!("{}", message)),
            None => Ok(()),
        }
    }

    fn consume(&self) -> EventStream {
        self.consume_calls.fetch_add(1, Ordering::SeqCst);
        let script = (Arc::clone(&self.steps), Arc::clone(&self.cursor));

        stream::unfold(Some(script), |script| async move {
            // an error ends the cycle, so nothing follows it
            let (steps, cursor) = script?;
            loop {
                let index = cursor.fetch_add(1, Ordering::SeqCst);
                let step = steps.get(index).cloned()?;
                match step {
                    Step::Emit(event) => return Some((Ok(event), Some((steps, cursor)))),
                    Step::Sleep(duration) => tokio::time::sleep(duration).await,
                    Step::Fail(message) => return Some((Err(anyhow!("{}", message)), None)),
                    Step::FailForever(message) => {
                        cursor.store(index, Ordering::SeqCst);
                        return Some((Err(anyhow!("{}", message)), None));
                    }
                    Step::Abort(reason) => return Some((Err(Abort::new(reason).into()), None)),
                    Step::End => return None,
                    Step::Pending => futures_util::future::pending::<()>().await,
                }
            }
        })
        .boxed()
    }

    fn whoami(&self) -> Option<SharedEntity> {
        self.me.clone()
    }
}
