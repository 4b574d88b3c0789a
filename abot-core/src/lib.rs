// ABOUTME: Backend-agnostic chat bot runtime: merges backend streams and dispatches events to handlers.
// ABOUTME: Failures stay isolated per backend and per handler; only Abort stops the bot.

pub mod backend;
pub mod backoff;
pub mod bot;
pub mod commands;
pub mod config;
pub mod context;
pub mod error;
pub mod handle;
pub mod handler;
pub mod hooks;
pub mod kind;
pub mod mention;
pub mod model;
pub mod multiplexer;
pub mod registry;
pub mod supervisor;

pub mod testing;

pub use backend::{no_backend, Backend, EventStream, NoBackend};
pub use backoff::{BackoffConfig, BackoffState};
pub use bot::Bot;
pub use commands::{Command, CommandCollection, CommandGroup, CommandSpec};
pub use config::{BotConfig, OnExhausted, ShutdownConfig, ShutdownPolicy, SupervisorConfig};
pub use context::Context;
pub use error::{find_abort, is_abort, Abort, BotError};
pub use handle::{BotHandle, BotState};
pub use handler::{handler_fn, EventHandler};
pub use hooks::{BotHooks, LoggingHooks};
pub use kind::{EventKind, Interest};
pub use model::{
    no_channel, no_entity, no_event, no_message_event, Channel, Entity, Event, MessageEvent,
    SharedChannel, SharedEntity, SharedEvent,
};
pub use multiplexer::StreamMultiplexer;
pub use registry::HandlerRegistry;
pub use supervisor::supervise;
