use anyhow::Result;
use clap::{Parser, Subcommand};

pub mod chat;
pub mod serve;

use crate::ai::DEFAULT_PERSONALITY;
use crate::core::{AppConfig, ConfigError};
use crate::core::config::SETUP_INSTRUCTIONS;

#[derive(Subcommand)]
enum Command {
    /// Run the web chat server
    Serve {
        /// Set the server host address
        #[arg(long, default_value = "127.0.0.1")]
        host: String,

        /// Set the server port
        #[arg(long, default_value = "2222")]
        port: String,
    },
    /// Start a chat session in the terminal
    Chat {
        /// Personality to start with
        #[arg(long, default_value = DEFAULT_PERSONALITY)]
        personality: String,
    },
}

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

/// Loads the config or halts with setup instructions. Nothing that
/// talks to the completion API runs unless this succeeds.
fn load_config() -> Result<AppConfig> {
    halt_on_missing_config(AppConfig::from_env())
}

fn halt_on_missing_config(resolved: Result<AppConfig, ConfigError>) -> Result<AppConfig> {
    resolved.map_err(|e| {
        eprintln!("{}", SETUP_INSTRUCTIONS);
        anyhow::Error::from(e)
    })
}

pub async fn run() -> Result<()> {
    let args = Cli::parse();

    // Handle each sub command
    match args.command {
        Some(Command::Serve { host, port }) => {
            let config = load_config()?;
            serve::run(host, port, config).await?;
        }
        Some(Command::Chat { personality }) => {
            let config = load_config()?;
            chat::run(config, &personality).await?;
        }
        None => {}
    }

    Ok(())
}
