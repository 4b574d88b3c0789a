// ABOUTME: Command-line entry point: loads config, sets up logging, runs the bot on the console
// ABOUTME: Ctrl-C aborts the bot; an Abort ends the process cleanly

use abot::builtin::CoreCommands;
use abot::config::Config;
use abot::console::ConsoleBackend;
use abot_core::{find_abort, Abort, Backend, Bot, EventKind};
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "abot", version, about = "A pluggable chat bot")]
struct Cli {
    /// Config file to use instead of the default search path
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log every message the bot sees at debug level
    #[arg(long, global = true, default_value_t = false)]
    trace_messages: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Chat with the bot on this terminal (default)
    Run,
    /// Load and validate the configuration, then print it
    CheckConfig,
}

fn init_logging(config: &Config) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.filter));
    let json = config.logging.json;

    // stdout belongs to the console conversation
    tracing_subscriber::registry()
        .with(filter)
        .with(json.then(|| fmt::layer().json().with_writer(std::io::stderr)))
        .with((!json).then(|| fmt::layer().with_writer(std::io::stderr)))
        .init();
}

fn check_config(config: &Config) -> Result<()> {
    let rendered = toml::to_string_pretty(config).context("Failed to render configuration")?;
    println!("{}", rendered);
    println!("# configuration is valid");
    Ok(())
}

async fn run(config: Config, trace_messages: bool) -> Result<()> {
    let mut console = ConsoleBackend::stdio();
    console.configure(&config.console_options())?;

    let mut bot = Bot::new(config.bot.clone());
    bot.attach_backend(Arc::new(console))?;
    bot.attach_command_group(Arc::new(CoreCommands::new()));
    if trace_messages {
        bot.on("trace-messages", EventKind::Message, |ctx| async move {
            tracing::debug!(
                sender = %ctx.sender().username(),
                channel = %ctx.channel().id(),
                mention = ?ctx.mention(),
                text = %ctx.text(),
                "Message"
            );
            Ok(())
        })?;
    }

    let handle = bot.handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Interrupted, stopping");
            handle.abort(Abort::new("interrupted"));
        }
    });

    tracing::info!(
        bot = %config.bot.name,
        username = %config.console.username,
        "Type '@{} help' or '/help' to list commands, Ctrl-D to leave",
        config.console.username
    );

    match bot.run().await {
        Ok(()) => Ok(()),
        Err(err) => match find_abort(&err) {
            Some(abort) => {
                tracing::info!(reason = %abort.reason(), "Bot aborted");
                Ok(())
            }
            None => Err(err),
        },
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    dotenvy::dotenv().ok();
    let config = Config::load_from(cli.config.as_deref())?;
    init_logging(&config);

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => run(config, cli.trace_messages).await,
        Commands::CheckConfig => check_config(&config),
    }
}
