mod commands;
mod config;
mod context;

use clap::{Parser, Subcommand};
use config::CliConfig;
use context::AppContext;
use fairhouse_core::Account;
use fairhouse_session::SessionError;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "fairhouse")]
#[command(about = "Provably fair commit-reveal wagering against a local house ledger")]
#[command(version)]
struct Cli {
    /// Data directory for the session store and local house
    #[arg(short, long, global = true)]
    data_dir: Option<PathBuf>,

    /// Account to act as (0x-prefixed address)
    #[arg(short, long, global = true)]
    account: Option<Account>,

    /// Game to play (crash or mines)
    #[arg(short, long, global = true)]
    game: Option<String>,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Wallet, deposit and withdrawal commands
    #[command(subcommand)]
    Funds(commands::FundsCommands),

    /// Commit, play, settle and recover sessions
    #[command(subcommand)]
    Session(commands::SessionCommands),

    /// House operator commands
    #[command(subcommand)]
    House(commands::HouseCommands),

    /// Stored CLI configuration
    #[command(subcommand)]
    Config(commands::ConfigCommands),
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let data_dir = cli.data_dir.unwrap_or_else(config::default_data_dir);
    let config = CliConfig::load(&data_dir)?;

    // Initialize logging
    let log_level = if cli.verbose || config.verbose {
        "debug"
    } else {
        "info"
    };
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(format!(
            "fairhouse_cli={0},fairhouse_core={0},fairhouse_session={0}",
            log_level
        )))
        .with(tracing_subscriber::fmt::layer())
        .init();

    tokio::fs::create_dir_all(&data_dir).await?;

    let result = match cli.command {
        Commands::Config(cmd) => commands::handle_config_command(cmd, config),
        command => run(command, config, cli.account, cli.game).await,
    };

    if let Err(e) = result {
        match e.downcast_ref::<SessionError>() {
            Some(SessionError::InsufficientFunds { need, available }) => {
                eprintln!("Error: Insufficient funds");
                eprintln!("Need: {}, Available: {}", need, available);
            }
            Some(SessionError::SessionAlreadyActive) => {
                eprintln!("Error: A session is already open for this account");
                eprintln!("Use 'fairhouse session status' or 'fairhouse session recover'");
            }
            Some(SessionError::HouseCommitmentUnset) => {
                eprintln!("Error: The house has not published a commitment");
                eprintln!("The owner can run 'fairhouse house publish'");
            }
            Some(err @ SessionError::HouseCommitmentMismatch { .. }) => {
                eprintln!("Error: {}", err);
                eprintln!(
                    "Check that {} is the seed the session started with",
                    fairhouse_session::HOUSE_SEED_ENV
                );
            }
            Some(err) if err.is_transient() => {
                eprintln!("Error: {}", err);
                eprintln!("Retry, or run 'fairhouse session recover'");
            }
            _ => {
                eprintln!("Error: {:#}", e);
            }
        }
        std::process::exit(1);
    }

    Ok(())
}

async fn run(
    command: Commands,
    config: CliConfig,
    account: Option<Account>,
    game: Option<String>,
) -> anyhow::Result<()> {
    let ctx = AppContext::open(config, account, game).await?;

    match command {
        Commands::Funds(cmd) => commands::handle_funds_command(cmd, &ctx).await,
        Commands::Session(cmd) => commands::handle_session_command(cmd, &ctx).await,
        Commands::House(cmd) => commands::handle_house_command(cmd, &ctx).await,
        Commands::Config(cmd) => commands::handle_config_command(cmd, ctx.config.clone()),
    }
}
