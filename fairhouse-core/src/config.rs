use crate::error::{CoreError, Result};
use crate::types::Amount;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Game name, used to namespace persisted session records.
    pub game: String,
    /// Game identifier passed to the ledger at settlement.
    pub game_id: u64,
    pub balance_poll_interval: Duration,
    pub default_wager: Amount,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self::crash()
    }
}

impl SessionConfig {
    pub fn new(game: impl Into<String>, game_id: u64) -> Self {
        Self {
            game: game.into(),
            game_id,
            balance_poll_interval: Duration::from_secs(12),
            default_wager: Amount::from_units(10_000_000_000_000_000), // 0.01 at 18 decimals
        }
    }

    pub fn crash() -> Self {
        Self::new("crash", 2)
    }

    pub fn mines() -> Self {
        Self::new("mines", 1)
    }

    /// Preset by game name.
    pub fn for_game(game: &str) -> Result<Self> {
        match game {
            "crash" => Ok(Self::crash()),
            "mines" => Ok(Self::mines()),
            other => Err(CoreError::config(format!("Unknown game '{}'", other))),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.game.is_empty() {
            return Err(CoreError::config("Game name cannot be empty"));
        }

        if !self
            .game
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(CoreError::config(
                "Game name may only contain letters, digits, '-' and '_'",
            ));
        }

        if self.balance_poll_interval.is_zero() {
            return Err(CoreError::config("Balance poll interval must be greater than 0"));
        }

        if self.default_wager.is_zero() {
            return Err(CoreError::config("Default wager must be greater than 0"));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_presets_validate() {
        assert!(SessionConfig::crash().validate().is_ok());
        assert!(SessionConfig::mines().validate().is_ok());
        assert_eq!(SessionConfig::for_game("crash").unwrap().game_id, 2);
        assert!(SessionConfig::for_game("roulette").is_err());
    }

    #[test]
    fn test_rejects_bad_namespace() {
        let mut config = SessionConfig::crash();
        config.game = "crash:evil".to_string();
        assert!(config.validate().is_err());

        let mut config = SessionConfig::crash();
        config.balance_poll_interval = Duration::ZERO;
        assert!(config.validate().is_err());
    }
}
