use anyhow::Context;
use fairhouse_core::Account;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const CONFIG_FILE: &str = "config.json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CliConfig {
    pub data_dir: PathBuf,
    pub account: Option<Account>,
    pub default_game: String,
    pub verbose: bool,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            account: None,
            default_game: "crash".to_string(),
            verbose: false,
        }
    }
}

pub fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("fairhouse")
}

impl CliConfig {
    /// Config stored in `data_dir`, or defaults rooted there.
    pub fn load(data_dir: &Path) -> anyhow::Result<Self> {
        let path = data_dir.join(CONFIG_FILE);
        if !path.exists() {
            return Ok(Self {
                data_dir: data_dir.to_path_buf(),
                ..Self::default()
            });
        }

        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("reading {}", path.display()))?;
        let mut config: Self = serde_json::from_str(&content)
            .with_context(|| format!("parsing {}", path.display()))?;
        config.data_dir = data_dir.to_path_buf();
        Ok(config)
    }

    pub fn save(&self) -> anyhow::Result<()> {
        std::fs::create_dir_all(&self.data_dir)?;
        let path = self.data_dir.join(CONFIG_FILE);
        std::fs::write(&path, serde_json::to_string_pretty(self)?)
            .with_context(|| format!("writing {}", path.display()))?;
        Ok(())
    }

    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join("fairhouse.db")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_missing_file_gives_defaults_in_dir() {
        let dir = tempdir().unwrap();
        let config = CliConfig::load(dir.path()).unwrap();
        assert_eq!(config.data_dir, dir.path());
        assert_eq!(config.default_game, "crash");
        assert!(config.account.is_none());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempdir().unwrap();
        let mut config = CliConfig::load(dir.path()).unwrap();
        config.account = Some(Account::new([0xaa; 20]));
        config.default_game = "mines".to_string();
        config.save().unwrap();

        assert_eq!(CliConfig::load(dir.path()).unwrap(), config);
    }
}
