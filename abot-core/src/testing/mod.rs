// ABOUTME: Test doubles for exercising bots without a real chat platform
// ABOUTME: Mock domain objects, a scripted backend, and recording handlers/hooks

pub mod mock;
pub mod recording;
pub mod scripted;

pub use mock::{MockChannel, MockEntity, MockEvent};
pub use recording::{RecordingHandler, RecordingHooks};
pub use scripted::{ScriptedBackend, ScriptedBackendBuilder, Step};

use crate::backoff::BackoffConfig;
use crate::config::{BotConfig, ShutdownConfig, ShutdownPolicy, SupervisorConfig};

/// Config for tests: restarts without delay and waits for in-flight handlers
/// when the streams run dry, so every dispatched handler gets to finish.
pub fn test_config() -> BotConfig {
    BotConfig {
        name: "test-bot".to_string(),
        supervisor: SupervisorConfig {
            backoff: BackoffConfig::immediate(),
            ..SupervisorConfig::default()
        },
        shutdown: ShutdownConfig {
            policy: ShutdownPolicy::Drain,
            drain_timeout_ms: 5_000,
        },
    }
}
