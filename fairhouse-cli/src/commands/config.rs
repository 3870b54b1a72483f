use crate::config::CliConfig;
use clap::Subcommand;
use fairhouse_core::{Account, SessionConfig};

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Show the stored configuration
    Show,
    /// Set the default account
    SetAccount { account: Account },
    /// Set the default game (crash or mines)
    SetGame { game: String },
}

pub fn handle_config_command(cmd: ConfigCommands, mut config: CliConfig) -> anyhow::Result<()> {
    match cmd {
        ConfigCommands::Show => {
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
        ConfigCommands::SetAccount { account } => {
            config.account = Some(account);
            config.save()?;
            println!("Default account set to {}", account);
        }
        ConfigCommands::SetGame { game } => {
            SessionConfig::for_game(&game)?;
            config.default_game = game;
            config.save()?;
            println!("Default game set to {}", config.default_game);
        }
    }
    Ok(())
}
