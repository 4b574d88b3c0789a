// ABOUTME: In-memory Entity, Channel and Event implementations that record what they were told
// ABOUTME: MockEvent is a MessageEvent whenever its kind is message-shaped

use crate::kind::EventKind;
use crate::model::{
    no_entity, Channel, Entity, Event, MessageEvent, SharedChannel, SharedEntity,
};
use anyhow::Result;
use async_trait::async_trait;
use std::any::Any;
use std::sync::{Arc, Mutex};

#[derive(Debug)]
pub struct MockEntity {
    id: String,
    username: String,
    told: Mutex<Vec<String>>,
}

impl MockEntity {
    pub fn new(username: impl Into<String>) -> Self {
        let username = username.into();
        Self {
            id: format!("id-{}", username),
            username,
            told: Mutex::new(Vec::new()),
        }
    }

    /// Direct messages received so far
    pub fn told(&self) -> Vec<String> {
        self.told.lock().unwrap().clone()
    }
}

#[async_trait]
impl Entity for MockEntity {
    fn id(&self) -> &str {
        &self.id
    }

    fn username(&self) -> &str {
        &self.username
    }

    async fn tell(&self, text: &str) -> Result<()> {
        self.told.lock().unwrap().push(text.to_string());
        Ok(())
    }
}

#[derive(Debug)]
pub struct MockChannel {
    id: String,
    members: Vec<SharedEntity>,
    said: Mutex<Vec<String>>,
}

impl MockChannel {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            members: Vec::new(),
            said: Mutex::new(Vec::new()),
        }
    }

    pub fn with_member(mut self, member: SharedEntity) -> Self {
        self.members.push(member);
        self
    }

    /// Messages posted so far, in order
    pub fn said(&self) -> Vec<String> {
        self.said.lock().unwrap().clone()
    }
}

#[async_trait]
impl Channel for MockChannel {
    fn id(&self) -> &str {
        &self.id
    }

    fn name(&self) -> Option<&str> {
        Some(&self.id)
    }

    async fn say(&self, text: &str) -> Result<()> {
        self.said.lock().unwrap().push(text.to_string());
        Ok(())
    }

    async fn entities(&self) -> Result<Vec<SharedEntity>> {
        Ok(self.members.clone())
    }
}

/// Event with an id so tests can tell deliveries apart.
#[derive(Debug, Clone)]
pub struct MockEvent {
    id: String,
    kind: EventKind,
    text: String,
    sender: Option<SharedEntity>,
    channel: Arc<MockChannel>,
}

impl MockEvent {
    pub fn new(id: impl Into<String>, kind: EventKind) -> Self {
        Self {
            id: id.into(),
            kind,
            text: String::new(),
            sender: None,
            channel: Arc::new(MockChannel::new("mock-channel")),
        }
    }

    /// Plain message event
    pub fn message(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self::new(id, EventKind::Message).with_text(text)
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = text.into();
        self
    }

    pub fn sent_by(mut self, sender: SharedEntity) -> Self {
        self.sender = Some(sender);
        self
    }

    pub fn in_channel(mut self, channel: Arc<MockChannel>) -> Self {
        self.channel = channel;
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn mock_channel(&self) -> &Arc<MockChannel> {
        &self.channel
    }
}

#[async_trait]
impl Event for MockEvent {
    fn kind(&self) -> EventKind {
        self.kind
    }

    fn sender(&self) -> SharedEntity {
        self.sender.clone().unwrap_or_else(no_entity)
    }

    fn channel(&self) -> SharedChannel {
        self.channel.clone()
    }

    fn as_message(&self) -> Option<&dyn MessageEvent> {
        if self.kind.is_message() {
            Some(self)
        } else {
            None
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl MessageEvent for MockEvent {
    fn text(&self) -> &str {
        &self.text
    }
}
