//! Statecraft CLI — the main entry point.
//!
//! Commands:
//! - `serve`   — Start the A2A gateway
//! - `chat`    — Interactive chat or single-message mode
//! - `config`  — Show the effective configuration

use clap::{Parser, Subcommand};
use statecraft_config::{AppConfig, LoggingConfig};
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(
    name = "statecraft",
    about = "Statecraft — a stateful supervisor agent over A2A",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the A2A gateway server
    Serve {
        /// Override the port
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Chat with the agent
    Chat {
        /// Send a single message instead of entering interactive mode
        #[arg(short, long)]
        message: Option<String>,
    },

    /// Print the effective configuration (secrets redacted)
    Config {
        /// Print the default configuration file instead
        #[arg(long)]
        init: bool,
    },
}

fn init_tracing(logging: &LoggingConfig, verbose: bool) {
    let level = if verbose { "debug" } else { logging.level.as_str() };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);
    if logging.json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    if let Commands::Config { init: true } = cli.command {
        print!("{}", AppConfig::default_toml());
        return Ok(());
    }

    let config = match AppConfig::load() {
        Ok(config) => config,
        Err(e) => {
            init_tracing(&LoggingConfig::default(), cli.verbose);
            return Err(format!("Failed to load config: {e}").into());
        }
    };
    init_tracing(&config.logging, cli.verbose);

    match cli.command {
        Commands::Serve { port } => commands::serve::run(config, port).await?,
        Commands::Chat { message } => commands::chat::run(config, message).await?,
        Commands::Config { .. } => commands::config_cmd::show(&config),
    }

    Ok(())
}
