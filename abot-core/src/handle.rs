// ABOUTME: Cloneable handle onto a bot: its name, lifecycle state, and the abort channel
// ABOUTME: Handler tasks use it to inject the fatal condition into the run loop

use crate::error::Abort;
use std::fmt;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};

/// Lifecycle of the run loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BotState {
    /// Constructed, run not called yet
    Idle,
    /// Initializing backends one by one
    Starting,
    /// Pulling and dispatching events
    Running,
    /// Consulting the internal exception hook after a loop-level error
    Recovering,
    /// Terminated by the fatal condition
    Aborted,
    /// Terminated normally, or startup failed
    Stopped,
}

impl BotState {
    pub fn is_terminal(self) -> bool {
        matches!(self, BotState::Aborted | BotState::Stopped)
    }
}

/// Send + Sync handle passed to every handler through its context.
#[derive(Clone)]
pub struct BotHandle {
    name: Arc<str>,
    abort_tx: mpsc::UnboundedSender<Abort>,
    state: watch::Receiver<BotState>,
}

impl BotHandle {
    pub(crate) fn new(
        name: Arc<str>,
        abort_tx: mpsc::UnboundedSender<Abort>,
        state: watch::Receiver<BotState>,
    ) -> Self {
        Self {
            name,
            abort_tx,
            state,
        }
    }

    /// Handle that belongs to no running bot. Aborting through it does nothing.
    pub fn detached() -> Self {
        let (abort_tx, _abort_rx) = mpsc::unbounded_channel();
        let (_state_tx, state) = watch::channel(BotState::Idle);
        Self::new(Arc::from(""), abort_tx, state)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> BotState {
        *self.state.borrow()
    }

    /// Force the run loop to stop with `abort`.
    ///
    /// Returns false when no run loop is listening any more.
    pub fn abort(&self, abort: Abort) -> bool {
        match self.abort_tx.send(abort) {
            Ok(()) => true,
            Err(rejected) => {
                tracing::warn!(
                    bot = %self.name,
                    reason = %rejected.0.reason(),
                    "Abort requested but no run loop is listening"
                );
                false
            }
        }
    }

    /// Wait until the state satisfies `predicate`, returning that state.
    ///
    /// Returns the last known state if the bot goes away first.
    pub async fn wait_until(&self, predicate: impl Fn(BotState) -> bool) -> BotState {
        let mut rx = self.state.clone();
        let result = rx.wait_for(|state| predicate(*state)).await.map(|state| *state);
        match result {
            Ok(state) => state,
            Err(_) => *rx.borrow(),
        }
    }
}

impl fmt::Debug for BotHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BotHandle")
            .field("name", &self.name)
            .field("state", &self.state())
            .finish()
    }
}
