// ABOUTME: Domain contracts shared by every backend: Entity, Channel, Event, MessageEvent
// ABOUTME: Includes the absence singletons used where no real instance exists

use crate::kind::EventKind;
use anyhow::Result;
use async_trait::async_trait;
use std::any::Any;
use std::fmt::Debug;
use std::sync::{Arc, LazyLock};

pub type SharedEntity = Arc<dyn Entity>;
pub type SharedChannel = Arc<dyn Channel>;
pub type SharedEvent = Arc<dyn Event>;

// =============================================================================
// Contracts
// =============================================================================

/// An addressable identity on a backend (user, bot account, ...).
#[async_trait]
pub trait Entity: Send + Sync + Debug {
    /// Backend-unique identifier
    fn id(&self) -> &str;

    /// Handle used for mentions (without any `@` prefix)
    fn username(&self) -> &str;

    /// Human-readable name, if the backend knows one
    fn display_name(&self) -> Option<&str> {
        None
    }

    /// Send a direct message to this entity
    async fn tell(&self, text: &str) -> Result<()>;

    /// False only for the absence singleton
    fn is_present(&self) -> bool {
        true
    }
}

/// An addressable destination: room, group, conversation.
#[async_trait]
pub trait Channel: Send + Sync + Debug {
    fn id(&self) -> &str;

    fn name(&self) -> Option<&str> {
        None
    }

    /// Post a message to the channel
    async fn say(&self, text: &str) -> Result<()>;

    /// Participants currently known to be in the channel
    async fn entities(&self) -> Result<Vec<SharedEntity>>;

    fn is_present(&self) -> bool {
        true
    }
}

/// Something that happened in a channel.
#[async_trait]
pub trait Event: Send + Sync + Debug {
    /// Variant tag used for handler dispatch
    fn kind(&self) -> EventKind;

    /// Who caused the event; the absence entity when nobody did
    fn sender(&self) -> SharedEntity {
        no_entity()
    }

    /// Where the event happened
    fn channel(&self) -> SharedChannel;

    /// Answer in the originating channel, addressing the sender when there is one
    async fn reply(&self, text: &str) -> Result<()> {
        let sender = self.sender();
        let channel = self.channel();
        if sender.is_present() && !sender.username().is_empty() {
            channel
                .say(&format!("@{}: {}", sender.username(), text))
                .await
        } else {
            channel.say(text).await
        }
    }

    /// Message view of this event, when it carries text
    fn as_message(&self) -> Option<&dyn MessageEvent> {
        None
    }

    /// Access to the concrete backend type for downcasting
    fn as_any(&self) -> &dyn Any;

    fn is_present(&self) -> bool {
        true
    }
}

/// An event with plain-text content.
pub trait MessageEvent: Event {
    fn text(&self) -> &str;
}

// =============================================================================
// Absence singletons
// =============================================================================

/// Entity used where none is available.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoEntity;

#[async_trait]
impl Entity for NoEntity {
    fn id(&self) -> &str {
        ""
    }

    fn username(&self) -> &str {
        ""
    }

    async fn tell(&self, text: &str) -> Result<()> {
        tracing::info!(target: "abot::absent", text = %text, "tell() on absent entity");
        Ok(())
    }

    fn is_present(&self) -> bool {
        false
    }
}

/// Channel used where none is available.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoChannel;

#[async_trait]
impl Channel for NoChannel {
    fn id(&self) -> &str {
        ""
    }

    async fn say(&self, text: &str) -> Result<()> {
        tracing::info!(target: "abot::absent", text = %text, "say() on absent channel");
        Ok(())
    }

    async fn entities(&self) -> Result<Vec<SharedEntity>> {
        Ok(vec![no_entity()])
    }

    fn is_present(&self) -> bool {
        false
    }
}

/// Event used where none is available.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoEvent;

#[async_trait]
impl Event for NoEvent {
    fn kind(&self) -> EventKind {
        EventKind::Event
    }

    fn channel(&self) -> SharedChannel {
        no_channel()
    }

    async fn reply(&self, text: &str) -> Result<()> {
        tracing::info!(target: "abot::absent", text = %text, "reply() on absent event");
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn is_present(&self) -> bool {
        false
    }
}

/// Message event used where none is available; its text is empty.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoMessageEvent;

#[async_trait]
impl Event for NoMessageEvent {
    fn kind(&self) -> EventKind {
        EventKind::Message
    }

    fn channel(&self) -> SharedChannel {
        no_channel()
    }

    async fn reply(&self, text: &str) -> Result<()> {
        tracing::info!(target: "abot::absent", text = %text, "reply() on absent message");
        Ok(())
    }

    fn as_message(&self) -> Option<&dyn MessageEvent> {
        Some(self)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn is_present(&self) -> bool {
        false
    }
}

impl MessageEvent for NoMessageEvent {
    fn text(&self) -> &str {
        ""
    }
}

static NO_ENTITY: LazyLock<SharedEntity> = LazyLock::new(|| Arc::new(NoEntity));
static NO_CHANNEL: LazyLock<SharedChannel> = LazyLock::new(|| Arc::new(NoChannel));
static NO_EVENT: LazyLock<SharedEvent> = LazyLock::new(|| Arc::new(NoEvent));
static NO_MESSAGE_EVENT: LazyLock<SharedEvent> = LazyLock::new(|| Arc::new(NoMessageEvent));

pub fn no_entity() -> SharedEntity {
    Arc::clone(&NO_ENTITY)
}

pub fn no_channel() -> SharedChannel {
    Arc::clone(&NO_CHANNEL)
}

pub fn no_event() -> SharedEvent {
    Arc::clone(&NO_EVENT)
}

pub fn no_message_event() -> SharedEvent {
    Arc::clone(&NO_MESSAGE_EVENT)
}

// =============================================================================
// Tests
// =============================================================================
