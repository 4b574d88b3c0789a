// ABOUTME: The orchestrator: owns backends, handlers and command groups, and runs the event loop
// ABOUTME: Merges supervised backend streams, dispatches events into a JoinSet, and applies abort semantics

use crate::backend::Backend;
use crate::commands::{CommandCollection, CommandGroup};
use crate::config::{BotConfig, ShutdownConfig, ShutdownPolicy};
use crate::context::Context;
use crate::error::{find_abort, is_abort, Abort, BotError};
use crate::handle::{BotHandle, BotState};
use crate::handler::{handler_fn, EventHandler};
use crate::hooks::{BotHooks, LoggingHooks};
use crate::kind::Interest;
use crate::model::SharedEvent;
use crate::multiplexer::StreamMultiplexer;
use crate::registry::HandlerRegistry;
use crate::supervisor::supervise;
use anyhow::{anyhow, Result};
use futures_util::{FutureExt, StreamExt};
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::{JoinError, JoinHandle, JoinSet};

type Tagged = (Arc<dyn Backend>, Result<SharedEvent>);

/// A chat bot assembled from backends, handlers and command groups.
///
/// ```no_run
/// # use abot_core::{Bot, BotConfig, EventKind};
/// # async fn demo(backend: std::sync::Arc<dyn abot_core::Backend>) -> anyhow::Result<()> {
/// let mut bot = Bot::new(BotConfig::default());
/// bot.attach_backend(backend)?;
/// bot.on("greeter", EventKind::MemberJoined, |ctx| async move {
///     ctx.reply("welcome!").await
/// })?;
/// bot.run().await
/// # }
/// ```
pub struct Bot {
    config: BotConfig,
    name: Arc<str>,
    backends: Vec<Arc<dyn Backend>>,
    registry: HandlerRegistry,
    command_groups: Vec<Arc<dyn CommandGroup>>,
    hooks: Arc<dyn BotHooks>,
    abort_tx: mpsc::UnboundedSender<Abort>,
    abort_rx: mpsc::UnboundedReceiver<Abort>,
    state_tx: watch::Sender<BotState>,
}

/// Why the running loop stopped.
enum Exit {
    /// Every backend stream ended
    Exhausted,
    /// The internal exception hook asked to stop
    Stopped,
    Aborted(anyhow::Error),
}

impl Bot {
    pub fn new(config: BotConfig) -> Self {
        let (abort_tx, abort_rx) = mpsc::unbounded_channel();
        let (state_tx, _) = watch::channel(BotState::Idle);
        Self {
            name: Arc::from(config.name.as_str()),
            config,
            backends: Vec::new(),
            registry: HandlerRegistry::new(),
            command_groups: Vec::new(),
            hooks: Arc::new(LoggingHooks),
            abort_tx,
            abort_rx,
            state_tx,
        }
    }

    /// Replace the failure hooks
    pub fn with_hooks(mut self, hooks: Arc<dyn BotHooks>) -> Self {
        self.hooks = hooks;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &BotConfig {
        &self.config
    }

    /// Handle for observing state and aborting from outside the loop
    pub fn handle(&self) -> BotHandle {
        BotHandle::new(
            Arc::clone(&self.name),
            self.abort_tx.clone(),
            self.state_tx.subscribe(),
        )
    }

    /// Attach a configured backend. A backend instance can be attached once.
    pub fn attach_backend(&mut self, backend: Arc<dyn Backend>) -> Result<(), BotError> {
        if self.backends.iter().any(|b| same_backend(b, &backend)) {
            return Err(BotError::BackendAlreadyAttached(backend.name().to_string()));
        }
        tracing::info!(bot = %self.name, backend = %backend.name(), "Backend attached");
        self.backends.push(backend);
        Ok(())
    }

    pub fn backends(&self) -> &[Arc<dyn Backend>] {
        &self.backends
    }

    /// Add a command group answering messages that mention the bot
    pub fn attach_command_group(&mut self, group: Arc<dyn CommandGroup>) {
        tracing::info!(bot = %self.name, group = %group.name(), "Command group attached");
        self.command_groups.push(group);
    }

    /// Register `handler` for an explicit set of kinds
    pub fn add_event_handler(
        &mut self,
        interest: impl Into<Interest>,
        handler: Arc<dyn EventHandler>,
    ) -> Result<(), BotError> {
        self.registry.register(interest, handler)
    }

    /// Register `handler` for the kinds it declares itself
    pub fn add_handler(&mut self, handler: Arc<dyn EventHandler>) -> Result<(), BotError> {
        self.registry.register_handler(handler)
    }

    /// Register an async closure, returning the handler so it can be registered again.
    pub fn on<F, Fut>(
        &mut self,
        name: impl Into<String>,
        interest: impl Into<Interest>,
        f: F,
    ) -> Result<Arc<dyn EventHandler>, BotError>
    where
        F: Fn(Context) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        let interest = interest.into();
        let handler = handler_fn(name, interest.clone(), f);
        self.registry.register(interest, Arc::clone(&handler))?;
        Ok(handler)
    }

    pub fn registry(&self) -> &HandlerRegistry {
        &self.registry
    }

    /// Spawn [`Bot::run`] onto the current runtime.
    pub fn start(self) -> JoinHandle<Result<()>> {
        tokio::spawn(self.run())
    }

    /// Initialize every backend, then pull and dispatch events until all
    /// backend streams end, the internal exception hook says stop, or the
    /// bot is aborted.
    ///
    /// When the streams end, handlers already scheduled are awaited (up to
    /// the drain timeout) so the last events are handled too. The shutdown
    /// policy only applies when the hooks stop the bot.
    ///
    /// Fails with the [`Abort`] (reachable through [`find_abort`]) when
    /// aborted, or with the initialization error when startup fails.
    pub async fn run(self) -> Result<()> {
        let handle = self.handle();
        let Bot {
            config,
            name,
            backends,
            registry,
            command_groups,
            hooks,
            abort_tx,
            mut abort_rx,
            state_tx,
        } = self;
        drop(abort_tx);

        state_tx.send_replace(BotState::Starting);
        tracing::info!(bot = %name, backends = backends.len(), "Starting bot");

        for backend in &backends {
            if let Err(err) = backend.initialize().await {
                tracing::error!(
                    bot = %name,
                    backend = %backend.name(),
                    error = %err,
                    "Backend failed to initialize, aborting startup"
                );
                state_tx.send_replace(BotState::Stopped);
                return Err(err.context(format!(
                    "backend '{}' failed to initialize",
                    backend.name()
                )));
            }
            tracing::info!(bot = %name, backend = %backend.name(), "Backend initialized");
        }

        let mut merged: StreamMultiplexer<Tagged> = backends
            .iter()
            .map(|backend| {
                let origin = Arc::clone(backend);
                supervise(Arc::clone(backend), config.supervisor.clone())
                    .map(move |item| (Arc::clone(&origin), item))
                    .boxed()
            })
            .collect();

        let commands = if command_groups.is_empty() {
            None
        } else {
            Some(Arc::new(CommandCollection::new(command_groups)))
        };
        let dispatcher = Dispatcher {
            registry,
            commands,
            hooks: Arc::clone(&hooks),
            handle,
        };
        let mut tasks: JoinSet<()> = JoinSet::new();

        state_tx.send_replace(BotState::Running);
        tracing::info!(bot = %name, handlers = dispatcher.registry.len(), "Bot running");

        let exit = loop {
            tokio::select! {
                biased;

                Some(abort) = abort_rx.recv() => {
                    tracing::warn!(bot = %name, reason = %abort.reason(), "Abort requested");
                    break Exit::Aborted(anyhow::Error::new(abort));
                }

                Some(joined) = tasks.join_next(), if !tasks.is_empty() => {
                    if let Err(err) = joined {
                        if !report_join_error(&name, &state_tx, hooks.as_ref(), err).await {
                            break Exit::Stopped;
                        }
                    }
                }

                next = merged.next() => match next {
                    Some((backend, Ok(event))) => dispatcher.dispatch(backend, event, &mut tasks),
                    Some((_, Err(err))) if is_abort(&err) => break Exit::Aborted(err),
                    Some((backend, Err(err))) => {
                        state_tx.send_replace(BotState::Recovering);
                        tracing::warn!(
                            bot = %name,
                            backend = %backend.name(),
                            error = %err,
                            "Recovering from loop-level error"
                        );
                        if !hooks.internal_exception(&err).await {
                            break Exit::Stopped;
                        }
                        state_tx.send_replace(BotState::Running);
                    }
                    None => break Exit::Exhausted,
                },
            }
        };

        let result = match exit {
            Exit::Aborted(err) => Err(err),
            Exit::Exhausted => {
                // handlers for the final events still run to completion
                tracing::info!(bot = %name, "All backend streams ended");
                drain(&name, &mut tasks, &mut abort_rx, &config.shutdown).await
            }
            Exit::Stopped => {
                tracing::info!(bot = %name, "Stopping at the internal exception hook's request");
                finish(&name, &mut tasks, &mut abort_rx, &config.shutdown).await
            }
        };

        if !tasks.is_empty() {
            tracing::info!(bot = %name, tasks = tasks.len(), "Cancelling in-flight handler tasks");
        }
        tasks.shutdown().await;

        match &result {
            Ok(()) => {
                state_tx.send_replace(BotState::Stopped);
                tracing::info!(bot = %name, "Bot stopped");
            }
            Err(err) => {
                state_tx.send_replace(BotState::Aborted);
                tracing::error!(bot = %name, error = %err, "Bot aborted");
            }
        }
        result
    }
}

fn same_backend(a: &Arc<dyn Backend>, b: &Arc<dyn Backend>) -> bool {
    std::ptr::eq(Arc::as_ptr(a) as *const (), Arc::as_ptr(b) as *const ())
}

/// Read-only state shared by every dispatch during Running.
struct Dispatcher {
    registry: HandlerRegistry,
    commands: Option<Arc<CommandCollection>>,
    hooks: Arc<dyn BotHooks>,
    handle: BotHandle,
}

impl Dispatcher {
    /// Schedule mention routing and every matching handler for one event.
    fn dispatch(&self, backend: Arc<dyn Backend>, event: SharedEvent, tasks: &mut JoinSet<()>) {
        let kind = event.kind();
        let mut ctx = Context::new(Arc::clone(&event), backend, self.handle.clone());
        let mut scheduled = 0usize;

        if let Some(commands) = &self.commands {
            let mention = event
                .as_message()
                .and_then(|message| ctx.backend().is_mentioned(message));
            if let Some(token) = mention {
                ctx = ctx.with_mention(token);
                let handler: Arc<dyn EventHandler> = Arc::clone(commands) as Arc<dyn EventHandler>;
                self.spawn(tasks, handler, ctx.clone());
                scheduled += 1;
            }
        }

        for handler in self.registry.matching(kind) {
            self.spawn(tasks, handler, ctx.clone());
            scheduled += 1;
        }

        if scheduled == 0 {
            tracing::debug!(
                backend = %ctx.backend().name(),
                kind = %kind,
                "No handler registered for event"
            );
        }
    }

    fn spawn(&self, tasks: &mut JoinSet<()>, handler: Arc<dyn EventHandler>, ctx: Context) {
        tasks.spawn(run_isolated(handler, ctx, Arc::clone(&self.hooks)));
    }
}

/// Run one handler, keeping its failures away from the loop.
///
/// An [`Abort`] is forwarded through the bot handle; any other error or a
/// panic goes to the handler exception hook.
async fn run_isolated(handler: Arc<dyn EventHandler>, ctx: Context, hooks: Arc<dyn BotHooks>) {
    let outcome = AssertUnwindSafe(handler.handle(ctx.clone()))
        .catch_unwind()
        .await;

    let err = match outcome {
        Ok(Ok(())) => return,
        Ok(Err(err)) => err,
        Err(panic) => anyhow!("handler panicked: {}", panic_message(panic.as_ref())),
    };

    if let Some(abort) = find_abort(&err) {
        tracing::warn!(
            handler = %handler.name(),
            reason = %abort.reason(),
            "Handler decided to abort bot execution"
        );
        ctx.bot().abort(abort.clone());
        return;
    }

    hooks.handler_exception(handler.name(), &ctx, &err).await;
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// A task that could not be joined is a loop-level error.
async fn report_join_error(
    bot: &str,
    state_tx: &watch::Sender<BotState>,
    hooks: &dyn BotHooks,
    err: JoinError,
) -> bool {
    if err.is_cancelled() {
        return true;
    }
    tracing::error!(bot = %bot, error = %err, "Handler task failed to join");
    state_tx.send_replace(BotState::Recovering);
    let keep_running = hooks
        .internal_exception(&anyhow!("handler task failed: {}", err))
        .await;
    if keep_running {
        state_tx.send_replace(BotState::Running);
    }
    keep_running
}

/// Apply the shutdown policy to tasks still running when the hooks stop the bot.
///
/// An abort already raised by a handler wins over abandoning.
async fn finish(
    bot: &str,
    tasks: &mut JoinSet<()>,
    abort_rx: &mut mpsc::UnboundedReceiver<Abort>,
    config: &ShutdownConfig,
) -> Result<()> {
    match config.policy {
        ShutdownPolicy::Abandon => match abort_rx.try_recv() {
            Ok(abort) => {
                tracing::warn!(bot = %bot, reason = %abort.reason(), "Abort requested while stopping");
                Err(anyhow::Error::new(abort))
            }
            Err(_) => Ok(()),
        },
        ShutdownPolicy::Drain => drain(bot, tasks, abort_rx, config).await,
    }
}

/// Wait for in-flight tasks up to the drain timeout. An abort raised by one
/// of them still fails the run.
async fn drain(
    bot: &str,
    tasks: &mut JoinSet<()>,
    abort_rx: &mut mpsc::UnboundedReceiver<Abort>,
    config: &ShutdownConfig,
) -> Result<()> {
    if tasks.is_empty() {
        return Ok(());
    }
    tracing::info!(
        bot = %bot,
        tasks = tasks.len(),
        timeout_ms = config.drain_timeout_ms,
        "Draining in-flight handler tasks"
    );

    let deadline = tokio::time::sleep(config.drain_timeout());
    tokio::pin!(deadline);

    loop {
        tokio::select! {
            biased;

            Some(abort) = abort_rx.recv() => {
                tracing::warn!(bot = %bot, reason = %abort.reason(), "Abort requested while draining");
                return Err(anyhow::Error::new(abort));
            }

            joined = tasks.join_next() => match joined {
                None => return Ok(()),
                Some(Err(err)) if err.is_panic() => {
                    tracing::error!(bot = %bot, error = %err, "Handler task failed while draining");
                }
                Some(_) => {}
            },

            _ = &mut deadline => {
                tracing::warn!(
                    bot = %bot,
                    remaining = tasks.len(),
                    "Drain timeout reached, abandoning remaining tasks"
                );
                return Ok(());
            }
        }
    }
}
