// ABOUTME: Console backend: each stdin line becomes a message event, bot output goes to stdout
// ABOUTME: Lines starting with "/" are commands addressed to the bot

use abot_core::{
    Backend, Channel, Entity, Event, EventKind, EventStream, MessageEvent, SharedChannel,
    SharedEntity, SharedEvent,
};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures_util::stream::{self, StreamExt};
use serde::Deserialize;
use std::any::Any;
use std::fmt;
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader, Lines};
use tokio::sync::Mutex;
use uuid::Uuid;

type Input = Lines<Box<dyn AsyncBufRead + Send + Unpin>>;
type Output = Arc<Mutex<Box<dyn AsyncWrite + Send + Unpin>>>;

/// Lines starting with this are commands for the bot
pub const COMMAND_PREFIX: &str = "/";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
struct ConsoleOptions {
    username: String,
    user: String,
    channel: String,
}

impl Default for ConsoleOptions {
    fn default() -> Self {
        Self {
            username: "abot".to_string(),
            user: "you".to_string(),
            channel: "console".to_string(),
        }
    }
}

async fn write_line(output: &Output, line: &str) -> Result<()> {
    let mut out = output.lock().await;
    out.write_all(line.as_bytes()).await?;
    out.write_all(b"\n").await?;
    out.flush().await?;
    Ok(())
}

/// A participant of the console conversation.
pub struct ConsoleEntity {
    username: String,
    output: Output,
}

impl fmt::Debug for ConsoleEntity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConsoleEntity")
            .field("username", &self.username)
            .finish()
    }
}

#[async_trait]
impl Entity for ConsoleEntity {
    fn id(&self) -> &str {
        &self.username
    }

    fn username(&self) -> &str {
        &self.username
    }

    async fn tell(&self, text: &str) -> Result<()> {
        write_line(&self.output, &format!("(to {}) {}", self.username, text)).await
    }
}

/// The single conversation the console has.
pub struct ConsoleChannel {
    name: String,
    bot: Arc<ConsoleEntity>,
    user: Arc<ConsoleEntity>,
    output: Output,
}

impl fmt::Debug for ConsoleChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConsoleChannel")
            .field("name", &self.name)
            .finish()
    }
}

#[async_trait]
impl Channel for ConsoleChannel {
    fn id(&self) -> &str {
        &self.name
    }

    fn name(&self) -> Option<&str> {
        Some(&self.name)
    }

    async fn say(&self, text: &str) -> Result<()> {
        let line = format!("[{}] {}: {}", self.name, self.bot.username, text);
        write_line(&self.output, &line).await
    }

    async fn entities(&self) -> Result<Vec<SharedEntity>> {
        let user: SharedEntity = self.user.clone();
        let bot: SharedEntity = self.bot.clone();
        Ok(vec![user, bot])
    }
}

/// One line typed into the console.
#[derive(Debug)]
pub struct ConsoleMessage {
    id: Uuid,
    kind: EventKind,
    text: String,
    received_at: DateTime<Utc>,
    sender: Arc<ConsoleEntity>,
    channel: Arc<ConsoleChannel>,
}

impl ConsoleMessage {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn received_at(&self) -> DateTime<Utc> {
        self.received_at
    }
}

#[async_trait]
impl Event for ConsoleMessage {
    fn kind(&self) -> EventKind {
        self.kind
    }

    fn sender(&self) -> SharedEntity {
        self.sender.clone()
    }

    fn channel(&self) -> SharedChannel {
        self.channel.clone()
    }

    fn as_message(&self) -> Option<&dyn MessageEvent> {
        Some(self)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl MessageEvent for ConsoleMessage {
    fn text(&self) -> &str {
        &self.text
    }
}

/// Backend talking to whoever sits at the terminal.
pub struct ConsoleBackend {
    input: Arc<Mutex<Input>>,
    output: Output,
    channel: Arc<ConsoleChannel>,
}

impl ConsoleBackend {
    /// Console on the process's stdin and stdout
    pub fn stdio() -> Self {
        Self::with_io(BufReader::new(tokio::io::stdin()), tokio::io::stdout())
    }

    /// Console on arbitrary streams
    pub fn with_io(
        input: impl AsyncBufRead + Send + Unpin + 'static,
        output: impl AsyncWrite + Send + Unpin + 'static,
    ) -> Self {
        let input: Box<dyn AsyncBufRead + Send + Unpin> = Box::new(input);
        let output: Box<dyn AsyncWrite + Send + Unpin> = Box::new(output);
        let output: Output = Arc::new(Mutex::new(output));
        let channel = Self::build_channel(&ConsoleOptions::default(), &output);
        Self {
            input: Arc::new(Mutex::new(input.lines())),
            output,
            channel,
        }
    }

    fn build_channel(options: &ConsoleOptions, output: &Output) -> Arc<ConsoleChannel> {
        let entity = |username: &str| {
            Arc::new(ConsoleEntity {
                username: username.to_string(),
                output: output.clone(),
            })
        };
        Arc::new(ConsoleChannel {
            name: options.channel.clone(),
            bot: entity(&options.username),
            user: entity(&options.user),
            output: output.clone(),
        })
    }

    pub fn channel(&self) -> &Arc<ConsoleChannel> {
        &self.channel
    }

    fn message(&self, line: &str) -> ConsoleMessage {
        console_message(&self.channel, line)
    }
}

/// "/ping" is shorthand for "!<bot> ping"; the rewritten text goes through
/// the usual mention rules like any other message
fn console_message(channel: &Arc<ConsoleChannel>, line: &str) -> ConsoleMessage {
    let (kind, text) = match line.strip_prefix(COMMAND_PREFIX) {
        Some(command) => {
            let text = format!("!{} {}", channel.bot.username, command.trim());
            (EventKind::Command, text.trim_end().to_string())
        }
        None => (EventKind::Message, line.to_string()),
    };
    ConsoleMessage {
        id: Uuid::new_v4(),
        kind,
        text,
        received_at: Utc::now(),
        sender: channel.user.clone(),
        channel: channel.clone(),
    }
}

#[async_trait]
impl Backend for ConsoleBackend {
    fn name(&self) -> &str {
        "console"
    }

    fn configure(&mut self, options: &serde_json::Value) -> Result<()> {
        let options: ConsoleOptions = serde_json::from_value(options.clone())
            .context("Invalid console backend options")?;
        self.channel = Self::build_channel(&options, &self.output);
        tracing::debug!(
            username = %options.username,
            user = %options.user,
            channel = %options.channel,
            "Console backend configured"
        );
        Ok(())
    }

    async fn initialize(&self) -> Result<()> {
        tracing::info!(channel = %self.channel.name, "Console backend ready");
        Ok(())
    }

    fn consume(&self) -> EventStream {
        let reader = (self.input.clone(), self.channel.clone());

        stream::unfold(Some(reader), |reader| async move {
            // a read error ends the cycle
            let (input, channel) = reader?;
            loop {
                let next = input.lock().await.next_line().await;
                match next {
                    Ok(Some(line)) => {
                        let line = line.trim();
                        if line.is_empty() {
                            continue;
                        }
                        let event: SharedEvent = Arc::new(console_message(&channel, line));
                        return Some((Ok(event), Some((input, channel))));
                    }
                    Ok(None) => {
                        tracing::info!(channel = %channel.name, "Console input closed");
                        return None;
                    }
                    Err(e) => {
                        let err = anyhow::Error::new(e).context("Failed to read console input");
                        return Some((Err(err), None));
                    }
                }
            }
        })
        .boxed()
    }

    fn whoami(&self) -> Option<SharedEntity> {
        Some(self.channel.bot.clone())
    }
}
