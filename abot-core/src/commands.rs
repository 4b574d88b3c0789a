// ABOUTME: Command execution for messages that mention the bot
// ABOUTME: Parses "@bot name args..." and routes to the command group declaring `name`

use crate::context::Context;
use crate::handler::EventHandler;
use crate::kind::{EventKind, Interest};
use anyhow::{Context as _, Result};
use async_trait::async_trait;
use std::sync::Arc;

/// A parsed command from a message addressed to the bot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    /// Lower-cased command name
    pub name: String,
    /// Arguments, with quoted strings kept together
    pub args: Vec<String>,
    /// Everything after the command name, untouched
    pub raw_args: String,
}

impl Command {
    pub fn new(name: impl Into<String>, args: Vec<String>, raw_args: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            args,
            raw_args: raw_args.into(),
        }
    }

    pub fn first_arg(&self) -> Option<&str> {
        self.args.first().map(|s| s.as_str())
    }

    pub fn arg(&self, index: usize) -> Option<&str> {
        self.args.get(index).map(|s| s.as_str())
    }
}

/// Name and one-line help of a command offered by a group
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandSpec {
    pub name: &'static str,
    pub help: &'static str,
}

/// A set of related commands.
#[async_trait]
pub trait CommandGroup: Send + Sync {
    fn name(&self) -> &str;

    /// Commands this group answers to
    fn commands(&self) -> &[CommandSpec];

    async fn execute(&self, command: &Command, ctx: &Context) -> Result<()>;
}

/// Split arguments on whitespace, keeping quoted strings together
fn parse_args(input: &str) -> Vec<String> {
    let mut args = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut quote_char = '"';

    for c in input.chars() {
        match c {
            '"' | '\'' if !in_quotes => {
                in_quotes = true;
                quote_char = c;
            }
            c if c == quote_char && in_quotes => {
                in_quotes = false;
                if !current.is_empty() {
                    args.push(std::mem::take(&mut current));
                }
            }
            c if c.is_whitespace() && !in_quotes => {
                if !current.is_empty() {
                    args.push(std::mem::take(&mut current));
                }
            }
            _ => current.push(c),
        }
    }

    if !current.is_empty() {
        args.push(current);
    }

    args
}

/// Remove the leading mention (`@bot,`, `!bot:`, `bot `) from a message.
///
/// Text that does not start with the token is returned trimmed but otherwise unchanged.
pub fn strip_mention<'a>(text: &'a str, token: &str) -> &'a str {
    let trimmed = text.trim();
    if token.is_empty() {
        return trimmed;
    }
    let unprefixed = trimmed.strip_prefix(['@', '!']).unwrap_or(trimmed);
    match unprefixed.strip_prefix(token) {
        Some(rest) => rest.trim_start_matches([',', ':']).trim(),
        None => trimmed,
    }
}

/// Parse command text (mention already removed). `None` for empty text.
pub fn parse_command(text: &str) -> Option<Command> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }

    let (name, rest) = match text.split_once(char::is_whitespace) {
        Some((name, rest)) => (name, rest.trim()),
        None => (text, ""),
    };

    Some(Command::new(name.to_lowercase(), parse_args(rest), rest))
}

/// All command groups attached to a bot, acting as one handler.
///
/// The bot runs it once per message that mentions it. `help` and an empty
/// command list every command; unknown commands get a short reply.
pub struct CommandCollection {
    groups: Vec<Arc<dyn CommandGroup>>,
}

impl CommandCollection {
    pub fn new(groups: Vec<Arc<dyn CommandGroup>>) -> Self {
        Self { groups }
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// First group declaring a command called `name`
    pub fn find(&self, name: &str) -> Option<&Arc<dyn CommandGroup>> {
        self.groups
            .iter()
            .find(|group| group.commands().iter().any(|spec| spec.name == name))
    }

    pub fn help_text(&self) -> String {
        let mut text = String::from("Available commands:\n  help - Show this help");
        for group in &self.groups {
            for spec in group.commands() {
                text.push_str(&format!("\n  {} - {}", spec.name, spec.help));
            }
        }
        text
    }
}

#[async_trait]
impl EventHandler for CommandCollection {
    fn name(&self) -> &str {
        "commands"
    }

    fn interest(&self) -> Interest {
        Interest::of(EventKind::Message)
    }

    async fn handle(&self, ctx: Context) -> Result<()> {
        let text = strip_mention(ctx.text(), ctx.mention().unwrap_or(""));

        let command = match parse_command(text) {
            Some(command) if command.name != "help" => command,
            _ => return ctx.reply(&self.help_text()).await,
        };

        match self.find(&command.name) {
            Some(group) => {
                tracing::info!(
                    command = %command.name,
                    group = %group.name(),
                    sender = %ctx.sender().username(),
                    "Executing command"
                );
                group
                    .execute(&command, &ctx)
                    .await
                    .with_context(|| format!("command '{}' failed", command.name))
            }
            None => {
                ctx.reply(&format!(
                    "Unknown command: {}. Try `help` for available commands.",
                    command.name
                ))
                .await
            }
        }
    }
}
