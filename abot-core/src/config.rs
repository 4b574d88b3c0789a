// ABOUTME: Serde-backed settings for the bot core: supervision and shutdown behaviour
// ABOUTME: Every field has a default so an empty [bot] table is valid

use crate::backoff::BackoffConfig;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BotConfig {
    /// Name used in logs and exposed through the bot handle
    pub name: String,
    pub supervisor: SupervisorConfig,
    pub shutdown: ShutdownConfig,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            name: default_bot_name(),
            supervisor: SupervisorConfig::default(),
            shutdown: ShutdownConfig::default(),
        }
    }
}

fn default_bot_name() -> String {
    "abot".to_string()
}

/// What the supervisor does when a consume() cycle ends without error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OnExhausted {
    /// The backend leaves the merged stream
    #[default]
    Finish,
    /// Call consume() again after `resubscribe_delay_ms`
    Resubscribe,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SupervisorConfig {
    pub on_exhausted: OnExhausted,
    pub resubscribe_delay_ms: u64,
    pub backoff: BackoffConfig,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            on_exhausted: OnExhausted::Finish,
            resubscribe_delay_ms: 1_000,
            backoff: BackoffConfig::default(),
        }
    }
}

impl SupervisorConfig {
    pub fn resubscribe_delay(&self) -> Duration {
        Duration::from_millis(self.resubscribe_delay_ms)
    }
}

/// Fate of in-flight handler tasks when the internal exception hook stops
/// the bot. Tasks still running after every stream ended are always waited
/// for, up to `drain_timeout_ms`; an abort always cancels them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShutdownPolicy {
    /// Cancel them immediately
    #[default]
    Abandon,
    /// Wait for them, up to `drain_timeout_ms`
    Drain,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShutdownConfig {
    pub policy: ShutdownPolicy,
    pub drain_timeout_ms: u64,
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            policy: ShutdownPolicy::Abandon,
            drain_timeout_ms: 5_000,
        }
    }
}

impl ShutdownConfig {
    pub fn drain_timeout(&self) -> Duration {
        Duration::from_millis(self.drain_timeout_ms)
    }
}
