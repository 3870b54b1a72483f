use crate::config::CliConfig;
use anyhow::Context as _;
use fairhouse_core::{
    Account, Amount, BalanceSignal, LedgerView, SessionConfig, SessionStore, SqliteSessionStore,
    Storage,
};
use fairhouse_session::{ConfiguredHouseSecret, Funds, HouseOperator, SessionEngine, SimulatedHouse};
use std::sync::Arc;

/// Everything a command needs, opened once per invocation.
pub struct AppContext {
    pub config: CliConfig,
    pub session_config: SessionConfig,
    pub account: Account,
    pub storage: Arc<Storage>,
    pub house: Arc<SimulatedHouse>,
    pub signal: BalanceSignal,
}

impl AppContext {
    pub async fn open(
        config: CliConfig,
        account: Option<Account>,
        game: Option<String>,
    ) -> anyhow::Result<Self> {
        let account = account.or(config.account).context(
            "no account selected; pass --account or run `fairhouse config set-account`",
        )?;
        let game = game.unwrap_or_else(|| config.default_game.clone());
        let session_config = SessionConfig::for_game(&game)?;

        let storage = Arc::new(Storage::new(&config.db_path()).await?);
        // The first account to open the local house becomes its operator.
        let house = Arc::new(SimulatedHouse::open(storage.clone(), account).await?);

        tracing::debug!(
            "Opened {} for {} in {}",
            session_config.game,
            account,
            config.data_dir.display()
        );

        Ok(Self {
            config,
            session_config,
            account,
            storage,
            house,
            signal: BalanceSignal::default(),
        })
    }

    fn store(&self) -> Arc<SqliteSessionStore> {
        Arc::new(SqliteSessionStore::new(
            self.storage.clone(),
            self.session_config.game.clone(),
        ))
    }

    pub async fn engine(&self) -> anyhow::Result<SessionEngine> {
        let engine = SessionEngine::open(
            self.session_config.clone(),
            self.account,
            self.house.clone(),
            self.store(),
            Arc::new(ConfiguredHouseSecret::from_env()?),
            self.signal.clone(),
        )
        .await?;
        Ok(engine)
    }

    /// Funds for the account, with wagers of any saved session counted as
    /// locked.
    pub async fn funds(&self) -> anyhow::Result<Funds> {
        let view = Arc::new(LedgerView::new(self.house.clone(), self.account));
        if let Some(record) = self.store().get(&self.account).await? {
            let locked = Amount::checked_sum(record.moves.iter().copied())
                .context("saved session wagers overflow")?;
            view.set_pending(locked);
        }

        Ok(Funds::new(
            self.account,
            self.house.clone(),
            self.house.clone(),
            view,
            self.signal.clone(),
        ))
    }

    pub fn operator(&self) -> HouseOperator {
        HouseOperator::new(self.house.clone(), self.account)
    }
}
