// ABOUTME: Wraps a backend's consume() so ordinary failures restart it instead of ending the bot
// ABOUTME: Abort errors pass straight through and terminate the wrapped stream

use crate::backend::{Backend, EventStream};
use crate::backoff::BackoffState;
use crate::config::{OnExhausted, SupervisorConfig};
use crate::error::is_abort;
use futures_util::stream::{self, StreamExt};
use std::sync::Arc;
use std::time::Duration;

struct Supervised {
    backend: Arc<dyn Backend>,
    config: SupervisorConfig,
    backoff: BackoffState,
    current: Option<EventStream>,
    done: bool,
}

/// Wait before the next consume cycle. A zero delay still hands control back
/// to the scheduler, so a backend failing instantly cannot hog the runtime.
async fn pause(delay: Duration) {
    if delay.is_zero() {
        tokio::task::yield_now().await;
    } else {
        tokio::time::sleep(delay).await;
    }
}

/// Turn a backend into a self-healing event stream.
///
/// - events are passed through in order
/// - an ordinary error is logged and `consume()` is called again after the
///   backoff delay; once retries are exhausted the error is yielded and the
///   stream ends
/// - an [`crate::Abort`] is yielded as-is and the stream ends
/// - a cycle that ends normally finishes the stream or resubscribes,
///   depending on [`SupervisorConfig::on_exhausted`]
pub fn supervise(backend: Arc<dyn Backend>, config: SupervisorConfig) -> EventStream {
    let state = Supervised {
        backoff: BackoffState::new(config.backoff.clone()),
        backend,
        config,
        current: None,
        done: false,
    };

    stream::unfold(state, |mut state| async move {
        loop {
            if state.done {
                return None;
            }

            let backend = &state.backend;
            let next = state
                .current
                .get_or_insert_with(|| {
                    tracing::debug!(backend = %backend.name(), "Starting consume cycle");
                    backend.consume()
                })
                .next()
                .await;

            match next {
                Some(Ok(event)) => {
                    state.backoff.record_success();
                    return Some((Ok(event), state));
                }
                Some(Err(err)) if is_abort(&err) => {
                    tracing::error!(
                        backend = %state.backend.name(),
                        error = %err,
                        "Backend decided to abort bot execution"
                    );
                    state.done = true;
                    return Some((Err(err), state));
                }
                Some(Err(err)) => {
                    state.current = None;
                    match state.backoff.record_failure() {
                        Some(delay) => {
                            tracing::warn!(
                                backend = %state.backend.name(),
                                error = %err,
                                failures = state.backoff.consecutive_failures(),
                                delay = ?delay,
                                "Backend stream failed, trying to recover"
                            );
                            pause(delay).await;
                        }
                        None => {
                            tracing::error!(
                                backend = %state.backend.name(),
                                error = %err,
                                failures = state.backoff.consecutive_failures(),
                                "Backend exceeded restart limit, giving up"
                            );
                            state.done = true;
                            let name = state.backend.name().to_string();
                            let err = err.context(format!(
                                "backend '{}' gave up after repeated failures",
                                name
                            ));
                            return Some((Err(err), state));
                        }
                    }
                }
                None => {
                    state.current = None;
                    match state.config.on_exhausted {
                        OnExhausted::Finish => {
                            tracing::info!(backend = %state.backend.name(), "Backend stream finished");
                            return None;
                        }
                        OnExhausted::Resubscribe => {
                            let delay = state.config.resubscribe_delay();
                            tracing::debug!(
                                backend = %state.backend.name(),
                                delay = ?delay,
                                "Backend stream drained, resubscribing"
                            );
                            pause(delay).await;
                        }
                    }
                }
            }
        }
    })
    .boxed()
}
