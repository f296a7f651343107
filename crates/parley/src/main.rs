use std::io::{self, IsTerminal, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use log::LevelFilter;
use tokio::io::AsyncBufReadExt;
use tokio::sync::broadcast;

use parley::config::{ClientConfig, resolve_config_path};
use parley::connection::AgentConnection;
use parley::transcript::Message;
use parley_protocol::FrameKind;

const APP_NAME: &str = "parley";

fn main() {
    if let Err(err) = try_main() {
        let _ = writeln!(io::stderr(), "{err:?}");
        std::process::exit(1);
    }
}

fn try_main() -> Result<()> {
    let cli = Cli::parse();

    let config = ClientConfig::load(cli.common.config.as_deref())?;
    init_logging(&cli.common, &config);

    match cli.command.unwrap_or_else(|| Command::Chat(ChatCommand::default())) {
        Command::Chat(cmd) => async_chat(config, cmd),
        Command::Config { command } => handle_config(&cli.common, &config, command),
        Command::Completions { shell } => {
            clap_complete::generate(shell, &mut Cli::command(), APP_NAME, &mut io::stdout());
            Ok(())
        }
    }
}

#[tokio::main]
async fn async_chat(config: ClientConfig, cmd: ChatCommand) -> Result<()> {
    handle_chat(config, cmd).await
}

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Parley - chat with a remote browser agent from the terminal.",
    propagate_version = true
)]
struct Cli {
    #[command(flatten)]
    common: CommonOpts,
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Clone, Args)]
struct CommonOpts {
    /// Override the config file path
    #[arg(long, value_name = "PATH", global = true)]
    config: Option<PathBuf>,
    /// Reduce output to only errors
    #[arg(short, long, action = clap::ArgAction::SetTrue, global = true)]
    quiet: bool,
    /// Increase logging verbosity (stackable)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count, global = true)]
    verbose: u8,
    /// Enable debug logging (equivalent to -vv)
    #[arg(long, global = true)]
    debug: bool,
    /// Emit logs as machine readable JSON
    #[arg(long, global = true)]
    json: bool,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Connect to the agent backend and chat (default)
    Chat(ChatCommand),
    /// Inspect configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
    /// Generate shell completions
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Debug, Clone, Default, Args)]
struct ChatCommand {
    /// WebSocket endpoint of the agent backend (overrides config)
    #[arg(long, value_name = "URL")]
    url: Option<String>,
}

#[derive(Debug, Subcommand)]
enum ConfigCommand {
    /// Output the effective configuration
    Show,
    /// Print the resolved config file path
    Path,
}

async fn handle_chat(mut config: ClientConfig, cmd: ChatCommand) -> Result<()> {
    if let Some(url) = cmd.url {
        config.agent_url = url;
    }

    let connection = AgentConnection::open(&config)?;
    let mut entries = connection.transcript().subscribe();
    let mut state_rx = connection.watch_state();

    println!("* connecting to {}", config.agent_url);

    let mut lines = tokio::io::BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            line = lines.next_line() => match line.context("reading stdin")? {
                Some(line) => {
                    let line = line.trim();
                    if !line.is_empty() {
                        connection.send(line).await;
                    }
                }
                // EOF: the operator is done.
                None => break,
            },
            entry = entries.recv() => match entry {
                Ok(message) => render_entry(&message),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    eprintln!("(display fell behind; {skipped} entries not shown)");
                }
                Err(broadcast::error::RecvError::Closed) => {}
            },
            changed = state_rx.changed() => {
                if changed.is_ok() {
                    println!("* connection {}", *state_rx.borrow());
                }
            }
        }
    }

    connection.close().await;
    Ok(())
}

fn render_entry(message: &Message) {
    let body = match &message.kind {
        // Inline image payloads are data URIs; dumping them to a terminal
        // helps nobody.
        FrameKind::Image if message.content.starts_with("data:") => {
            format!("<inline image, {} bytes>", message.content.len())
        }
        _ => message.content.clone(),
    };
    println!("{:>5} | {}", message.sender.to_string(), body);
}

fn handle_config(common: &CommonOpts, config: &ClientConfig, command: ConfigCommand) -> Result<()> {
    match command {
        ConfigCommand::Show => {
            let rendered = toml::to_string_pretty(config).context("serializing configuration")?;
            print!("{rendered}");
        }
        ConfigCommand::Path => match resolve_config_path(common.config.as_deref()) {
            Some(path) => println!("{}", path.display()),
            None => println!("(no config directory available)"),
        },
    }
    Ok(())
}

fn init_logging(common: &CommonOpts, config: &ClientConfig) {
    use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

    if common.quiet {
        log::set_max_level(LevelFilter::Off);
        return;
    }

    let level = match effective_log_level(common, config) {
        LevelFilter::Off => "off",
        LevelFilter::Error => "error",
        LevelFilter::Warn => "warn",
        LevelFilter::Info => "info",
        LevelFilter::Debug => "debug",
        LevelFilter::Trace => "trace",
    };

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("parley={level}")));

    // Chat output owns stdout; logs go to stderr.
    if common.json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json().with_writer(io::stderr))
            .try_init()
            .ok();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .with_writer(io::stderr)
                    .with_ansi(io::stderr().is_terminal()),
            )
            .try_init()
            .ok();
    }

    // Also init env_logger for compatibility with log crate users
    let mut builder = env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(config.logging.level.clone()),
    );
    builder.filter_level(effective_log_level(common, config));
    builder.try_init().ok();
}

fn effective_log_level(common: &CommonOpts, config: &ClientConfig) -> LevelFilter {
    if common.debug {
        LevelFilter::Debug
    } else {
        match common.verbose {
            0 => config.logging.level.parse().unwrap_or(LevelFilter::Info),
            1 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        }
    }
}
