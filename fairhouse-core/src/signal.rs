use crate::types::Account;
use tokio::sync::broadcast;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BalanceChangeReason {
    Deposit,
    Withdraw,
    Settlement,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BalanceChanged {
    pub account: Account,
    pub reason: BalanceChangeReason,
}

/// Process-wide "balance updated" notification. Clones share one channel.
#[derive(Debug, Clone)]
pub struct BalanceSignal {
    tx: broadcast::Sender<BalanceChanged>,
}

impl Default for BalanceSignal {
    fn default() -> Self {
        Self::new(64)
    }
}

impl BalanceSignal {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn notify(&self, account: Account, reason: BalanceChangeReason) {
        // No subscribers is fine: nothing is displaying a balance.
        let receivers = self.tx.send(BalanceChanged { account, reason }).unwrap_or(0);
        tracing::debug!(
            "Balance change ({:?}) for {} sent to {} listeners",
            reason,
            account,
            receivers
        );
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BalanceChanged> {
        self.tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_notify_reaches_all_subscribers() {
        let signal = BalanceSignal::default();
        let mut first = signal.subscribe();
        let mut second = signal.clone().subscribe();
        let account = Account::new([7u8; 20]);

        signal.notify(account, BalanceChangeReason::Deposit);

        assert_eq!(first.recv().await.unwrap().account, account);
        assert_eq!(
            second.recv().await.unwrap().reason,
            BalanceChangeReason::Deposit
        );
    }

    #[test]
    fn test_notify_without_subscribers() {
        BalanceSignal::new(4).notify(Account::new([1u8; 20]), BalanceChangeReason::Withdraw);
    }
}
