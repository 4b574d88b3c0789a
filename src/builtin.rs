// ABOUTME: Commands every abot instance answers to: ping, echo, whoami, members, shutdown
// ABOUTME: `help` is answered by the command collection itself

use abot_core::{Abort, Command, CommandGroup, CommandSpec, Context};
use anyhow::Result;
use async_trait::async_trait;

const COMMANDS: &[CommandSpec] = &[
    CommandSpec {
        name: "ping",
        help: "Check the bot is alive",
    },
    CommandSpec {
        name: "echo",
        help: "Repeat the given text into the channel",
    },
    CommandSpec {
        name: "whoami",
        help: "Show who the bot is on this backend",
    },
    CommandSpec {
        name: "members",
        help: "List the members of this channel",
    },
    CommandSpec {
        name: "shutdown",
        help: "Stop the bot",
    },
];

#[derive(Debug, Default, Clone, Copy)]
pub struct CoreCommands;

impl CoreCommands {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl CommandGroup for CoreCommands {
    fn name(&self) -> &str {
        "core"
    }

    fn commands(&self) -> &[CommandSpec] {
        COMMANDS
    }

    async fn execute(&self, command: &Command, ctx: &Context) -> Result<()> {
        match command.name.as_str() {
            "ping" => ctx.reply("pong").await,
            "echo" => {
                let text = command.raw_args.trim();
                if text.is_empty() {
                    ctx.reply("Usage: echo <text>").await
                } else {
                    ctx.say(text).await
                }
            }
            "whoami" => {
                let backend = ctx.backend();
                let username = backend
                    .whoami()
                    .map(|me| me.username().to_string())
                    .unwrap_or_else(|| "(unknown)".to_string());
                ctx.reply(&format!(
                    "I am {} ({}) on {}",
                    username,
                    ctx.bot().name(),
                    backend.name()
                ))
                .await
            }
            "members" => {
                let members = ctx.channel().entities().await?;
                if members.is_empty() {
                    return ctx.reply("Nobody is here.").await;
                }
                let names: Vec<&str> = members.iter().map(|m| m.username()).collect();
                ctx.reply(&format!("Members: {}", names.join(", "))).await
            }
            "shutdown" => {
                let requested_by = ctx.sender().username().to_string();
                tracing::info!(requested_by = %requested_by, "Shutdown requested");
                ctx.reply("Shutting down.").await?;
                Err(Abort::new(format!("shutdown requested by {}", requested_by)).into())
            }
            other => anyhow::bail!("core commands do not include '{}'", other),
        }
    }
}
