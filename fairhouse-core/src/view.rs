use crate::ledger::Ledger;
use crate::signal::BalanceSignal;
use crate::types::{Account, Amount};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BalanceSnapshot {
    /// Last balance read from the ledger; `None` until the first successful read.
    pub balance: Option<Amount>,
    /// Value locked by unsettled moves.
    pub pending: Amount,
    pub refreshed_at: Option<DateTime<Utc>>,
}

impl BalanceSnapshot {
    pub fn available(&self) -> Amount {
        self.balance
            .unwrap_or(Amount::ZERO)
            .saturating_sub(self.pending)
    }
}

/// Read-only shadow of one account's ledger balance.
///
/// Read failures keep the previous value: this is a display and guard value,
/// the ledger stays authoritative.
pub struct LedgerView {
    ledger: Arc<dyn Ledger>,
    account: Account,
    state: RwLock<BalanceSnapshot>,
}

impl LedgerView {
    pub fn new(ledger: Arc<dyn Ledger>, account: Account) -> Self {
        Self {
            ledger,
            account,
            state: RwLock::new(BalanceSnapshot::default()),
        }
    }

    pub fn account(&self) -> &Account {
        &self.account
    }

    /// Re-read the balance. Returns the fresh value, or `None` if the read
    /// failed and the previous value was kept.
    pub async fn refresh(&self) -> Option<Amount> {
        match self.ledger.balance_of(&self.account).await {
            Ok(balance) => {
                let mut state = self.state.write();
                state.balance = Some(balance);
                state.refreshed_at = Some(Utc::now());
                Some(balance)
            }
            Err(e) => {
                tracing::warn!("Balance refresh for {} failed: {}", self.account, e);
                None
            }
        }
    }

    pub fn balance(&self) -> Option<Amount> {
        self.state.read().balance
    }

    pub fn available(&self) -> Amount {
        self.state.read().available()
    }

    pub fn set_pending(&self, pending: Amount) {
        self.state.write().pending = pending;
    }

    pub fn snapshot(&self) -> BalanceSnapshot {
        self.state.read().clone()
    }

    /// Refresh on every `interval` tick and on every balance signal for this
    /// account until the signal channel closes or the task is aborted.
    pub fn spawn_poller(self: Arc<Self>, interval: Duration, signal: &BalanceSignal) -> JoinHandle<()> {
        let mut changes = signal.subscribe();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {}
                    change = changes.recv() => match change {
                        Ok(change) if change.account != self.account => continue,
                        Ok(_) | Err(RecvError::Lagged(_)) => {}
                        Err(RecvError::Closed) => break,
                    },
                }
                self.refresh().await;
            }
            tracing::debug!("Balance poller for {} stopped", self.account);
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LedgerError;
    use crate::ledger::{LedgerResult, Receipt, SettleRequest};
    use crate::signal::BalanceChangeReason;
    use crate::types::Hash32;
    use async_trait::async_trait;
    use parking_lot::Mutex;

    /// Serves balance reads from a script; every other call is unsupported.
    struct ScriptedBalances {
        reads: Mutex<Vec<LedgerResult<Amount>>>,
    }

    impl ScriptedBalances {
        fn new(mut reads: Vec<LedgerResult<Amount>>) -> Self {
            reads.reverse();
            Self {
                reads: Mutex::new(reads),
            }
        }
    }

    fn unsupported<T>() -> LedgerResult<T> {
        Err(LedgerError::transport("unsupported"))
    }

    #[async_trait]
    impl Ledger for ScriptedBalances {
        fn address(&self) -> Account {
            Account::new([0xee; 20])
        }

        async fn balance_of(&self, _account: &Account) -> LedgerResult<Amount> {
            self.reads
                .lock()
                .pop()
                .unwrap_or_else(|| Err(LedgerError::transport("script exhausted")))
        }

        async fn deposit(&self, _: &Account, _: Amount) -> LedgerResult<Receipt> {
            unsupported()
        }

        async fn withdraw(&self, _: &Account, _: Amount) -> LedgerResult<Receipt> {
            unsupported()
        }

        async fn withdraw_all(&self, _: &Account) -> LedgerResult<Receipt> {
            unsupported()
        }

        async fn user_commit(&self, _: &Account, _: Hash32) -> LedgerResult<Receipt> {
            unsupported()
        }

        async fn user_commitment(&self, _: &Account) -> LedgerResult<Option<Hash32>> {
            unsupported()
        }

        async fn current_house_commitment(&self) -> LedgerResult<Option<Hash32>> {
            unsupported()
        }

        async fn settle_batch(&self, _: &Account, _: &SettleRequest) -> LedgerResult<Receipt> {
            unsupported()
        }

        async fn house_edge_bps(&self) -> LedgerResult<u32> {
            unsupported()
        }

        async fn fee_bps(&self) -> LedgerResult<u32> {
            unsupported()
        }

        async fn owner(&self) -> LedgerResult<Account> {
            unsupported()
        }

        async fn set_current_house_commitment(&self, _: &Account, _: Hash32) -> LedgerResult<Receipt> {
            unsupported()
        }

        async fn set_house_edge_bps(&self, _: &Account, _: u32) -> LedgerResult<Receipt> {
            unsupported()
        }
    }

    fn view(reads: Vec<LedgerResult<Amount>>) -> Arc<LedgerView> {
        Arc::new(LedgerView::new(
            Arc::new(ScriptedBalances::new(reads)),
            Account::new([1u8; 20]),
        ))
    }

    #[tokio::test]
    async fn test_failed_read_keeps_previous_value() {
        let view = view(vec![
            Ok(Amount::from_units(100)),
            Err(LedgerError::transport("rpc down")),
        ]);

        assert_eq!(view.refresh().await, Some(Amount::from_units(100)));
        assert_eq!(view.refresh().await, None);
        assert_eq!(view.balance(), Some(Amount::from_units(100)));
    }

    #[tokio::test]
    async fn test_available_subtracts_pending() {
        let view = view(vec![Ok(Amount::from_units(100))]);
        view.refresh().await;
        view.set_pending(Amount::from_units(30));
        assert_eq!(view.available(), Amount::from_units(70));

        view.set_pending(Amount::from_units(130));
        assert_eq!(view.available(), Amount::ZERO);
    }

    #[tokio::test]
    async fn test_poller_refreshes_on_signal() {
        let view = view(vec![Ok(Amount::from_units(5)), Ok(Amount::from_units(42))]);
        let signal = BalanceSignal::default();
        let handle = view.clone().spawn_poller(Duration::from_secs(3600), &signal);

        // First tick fires immediately.
        for _ in 0..50 {
            if view.balance().is_some() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(view.balance(), Some(Amount::from_units(5)));

        signal.notify(*view.account(), BalanceChangeReason::Settlement);
        for _ in 0..50 {
            if view.balance() == Some(Amount::from_units(42)) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(view.balance(), Some(Amount::from_units(42)));

        handle.abort();
    }
}
