use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod backend;
mod commands;
mod config;

use commands::{
    AuthCommand, ConfigCommand, DeleteCommand, ListCommand, NewCommand, ShellCommand,
    WatchCommand,
};
use config::Config;

#[derive(Parser)]
#[command(name = "resv")]
#[command(version)]
#[command(about = "Book and manage salon reservations", long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(long, short, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Sign in, sign up, sign out or reset a password
    Auth(AuthCommand),

    /// Book a new reservation
    New(NewCommand),

    /// List your reservations
    List(ListCommand),

    /// Delete a reservation
    Delete(DeleteCommand),

    /// Follow your reservations live
    Watch(WatchCommand),

    /// Interactive login and reservation screens
    Shell(ShellCommand),

    /// Manage configuration
    Config(ConfigCommand),
}

#[tokio::main]
async fn main() {
    init_tracing();

    if let Err(e) = run().await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

/// Logs go to stderr so they never mix with command output.
fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let cli_config_path = cli.config.clone();
    let config = Config::load(cli.config)?;
    tracing::debug!(locale = %config.locale.value, "Loaded configuration");

    match &cli.command {
        Some(Commands::Auth(cmd)) => cmd.run(&config).await?,
        Some(Commands::New(cmd)) => cmd.run(&config).await?,
        Some(Commands::List(cmd)) => cmd.run(&config).await?,
        Some(Commands::Delete(cmd)) => cmd.run(&config).await?,
        Some(Commands::Watch(cmd)) => cmd.run(&config).await?,
        Some(Commands::Shell(cmd)) => cmd.run(&config).await?,
        Some(Commands::Config(cmd)) => cmd.run(&config, cli_config_path)?,
        None => {
            println!("Use --help to see available commands");
        }
    }

    Ok(())
}
