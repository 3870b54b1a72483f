use crate::error::{Result, SessionError};
use fairhouse_core::{
    Account, Amount, BalanceChangeReason, BalanceSignal, Ledger, LedgerError, LedgerView, Receipt,
    TokenAllowance,
};
use std::sync::Arc;

/// Result of making sure the ledger may pull `amount` from the wallet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApprovalOutcome {
    AlreadySufficient,
    Approved(Receipt),
    /// The token refuses to change a non-zero allowance directly; reset it to
    /// zero first.
    NeedsReset { current: Amount },
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DepositOutcome {
    Deposited {
        receipt: Receipt,
        balance: Option<Amount>,
    },
    NeedsAllowanceReset { current: Amount },
}

/// Moves value between the wallet and the ledger for one account.
pub struct Funds {
    account: Account,
    ledger: Arc<dyn Ledger>,
    token: Arc<dyn TokenAllowance>,
    view: Arc<LedgerView>,
    signal: BalanceSignal,
}

impl Funds {
    pub fn new(
        account: Account,
        ledger: Arc<dyn Ledger>,
        token: Arc<dyn TokenAllowance>,
        view: Arc<LedgerView>,
        signal: BalanceSignal,
    ) -> Self {
        Self {
            account,
            ledger,
            token,
            view,
            signal,
        }
    }

    pub async fn wallet_balance(&self) -> Result<Amount> {
        Ok(self.token.wallet_balance(&self.account).await?)
    }

    /// Fresh ledger balance; also updates the view.
    pub async fn ledger_balance(&self) -> Result<Amount> {
        let balance = self.ledger.balance_of(&self.account).await?;
        self.view.refresh().await;
        Ok(balance)
    }

    /// Value held back by unsettled moves.
    pub fn locked(&self) -> Amount {
        self.view.snapshot().pending
    }

    pub async fn allowance(&self) -> Result<Amount> {
        Ok(self
            .token
            .allowance(&self.account, &self.ledger.address())
            .await?)
    }

    pub async fn ensure_allowance(&self, amount: Amount) -> Result<ApprovalOutcome> {
        let spender = self.ledger.address();
        let current = self.token.allowance(&self.account, &spender).await?;
        if current >= amount {
            return Ok(ApprovalOutcome::AlreadySufficient);
        }

        match self.token.approve(&self.account, &spender, amount).await {
            Ok(receipt) => {
                tracing::info!("Approved {} for {} to spend {}", spender, self.account, amount);
                Ok(ApprovalOutcome::Approved(receipt))
            }
            Err(LedgerError::Reverted { reason }) if !current.is_zero() => {
                tracing::warn!(
                    "Approval from {} refused ({}); allowance must be reset first",
                    self.account,
                    reason
                );
                Ok(ApprovalOutcome::NeedsReset { current })
            }
            Err(LedgerError::Reverted { reason }) => Ok(ApprovalOutcome::Failed(reason)),
            Err(err) => Err(err.into()),
        }
    }

    /// Set the ledger's allowance back to zero.
    pub async fn reset_allowance(&self) -> Result<Receipt> {
        let receipt = self
            .token
            .approve(&self.account, &self.ledger.address(), Amount::ZERO)
            .await?;
        tracing::info!("Reset allowance for {}", self.account);
        Ok(receipt)
    }

    pub async fn deposit(&self, amount: Amount) -> Result<DepositOutcome> {
        if amount.is_zero() {
            return Err(SessionError::InvalidAmount(
                "deposit must be greater than 0".to_string(),
            ));
        }

        match self.token.wallet_balance(&self.account).await {
            Ok(wallet) if wallet < amount => {
                return Err(SessionError::InsufficientFunds {
                    need: amount,
                    available: wallet,
                })
            }
            Ok(_) => {}
            Err(e) => tracing::warn!("Wallet balance check for {} failed: {}", self.account, e),
        }

        match self.ensure_allowance(amount).await? {
            ApprovalOutcome::AlreadySufficient | ApprovalOutcome::Approved(_) => {}
            ApprovalOutcome::NeedsReset { current } => {
                return Ok(DepositOutcome::NeedsAllowanceReset { current })
            }
            ApprovalOutcome::Failed(reason) => return Err(SessionError::TransactionRejected(reason)),
        }

        let receipt = self.ledger.deposit(&self.account, amount).await?;
        tracing::info!("Deposited {} for {}", amount, self.account);
        let balance = self.changed(BalanceChangeReason::Deposit).await;
        Ok(DepositOutcome::Deposited { receipt, balance })
    }

    /// Withdraw up to the available balance; value locked by unsettled moves
    /// stays on the ledger.
    pub async fn withdraw(&self, amount: Amount) -> Result<Receipt> {
        if amount.is_zero() {
            return Err(SessionError::InvalidAmount(
                "withdrawal must be greater than 0".to_string(),
            ));
        }

        self.view.refresh().await;
        let available = self.view.available();
        if available < amount {
            return Err(SessionError::InsufficientFunds {
                need: amount,
                available,
            });
        }

        let receipt = self.ledger.withdraw(&self.account, amount).await?;
        tracing::info!("Withdrew {} for {}", amount, self.account);
        self.changed(BalanceChangeReason::Withdraw).await;
        Ok(receipt)
    }

    /// Withdraw the whole ledger balance. Refused while moves are unsettled.
    pub async fn withdraw_all(&self) -> Result<Receipt> {
        let pending = self.view.snapshot().pending;
        if !pending.is_zero() {
            return Err(SessionError::invalid_state(format!(
                "{} is locked by unsettled moves; settle first",
                pending
            )));
        }

        let receipt = self.ledger.withdraw_all(&self.account).await?;
        tracing::info!("Withdrew full balance for {}", self.account);
        self.changed(BalanceChangeReason::Withdraw).await;
        Ok(receipt)
    }

    async fn changed(&self, reason: BalanceChangeReason) -> Option<Amount> {
        let balance = self.view.refresh().await;
        self.signal.notify(self.account, reason);
        balance
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulator::SimulatedHouse;

    const OWNER: Account = Account::new([0x0f; 20]);
    const PLAYER: Account = Account::new([0xaa; 20]);

    fn units(n: u128) -> Amount {
        Amount::from_units(n)
    }

    fn funds(house: &Arc<SimulatedHouse>, signal: &BalanceSignal) -> Funds {
        Funds::new(
            PLAYER,
            house.clone(),
            house.clone(),
            Arc::new(LedgerView::new(house.clone(), PLAYER)),
            signal.clone(),
        )
    }

    #[tokio::test]
    async fn test_deposit_approves_then_pulls_from_wallet() {
        let house = Arc::new(SimulatedHouse::new(OWNER));
        house.mint(&PLAYER, units(100)).await.unwrap();
        let signal = BalanceSignal::default();
        let mut changes = signal.subscribe();
        let funds = funds(&house, &signal);

        let DepositOutcome::Deposited { balance, .. } = funds.deposit(units(40)).await.unwrap()
        else {
            panic!("expected a deposit");
        };
        assert_eq!(balance, Some(units(40)));
        assert_eq!(funds.wallet_balance().await.unwrap(), units(60));
        assert_eq!(
            changes.try_recv().unwrap().reason,
            BalanceChangeReason::Deposit
        );
    }

    #[tokio::test]
    async fn test_deposit_checks_wallet_first() {
        let house = Arc::new(SimulatedHouse::new(OWNER));
        house.mint(&PLAYER, units(10)).await.unwrap();
        let funds = funds(&house, &BalanceSignal::default());

        assert!(matches!(
            funds.deposit(units(40)).await,
            Err(SessionError::InsufficientFunds { need, available })
                if need == units(40) && available == units(10)
        ));
        assert_eq!(funds.allowance().await.unwrap(), Amount::ZERO);
    }

    #[tokio::test]
    async fn test_strict_token_asks_for_allowance_reset() {
        let house = Arc::new(SimulatedHouse::new(OWNER));
        house.mint(&PLAYER, units(100)).await.unwrap();
        house.set_strict_approvals(true);
        let funds = funds(&house, &BalanceSignal::default());

        assert!(matches!(
            funds.ensure_allowance(units(5)).await.unwrap(),
            ApprovalOutcome::Approved(_)
        ));
        assert_eq!(
            funds.ensure_allowance(units(5)).await.unwrap(),
            ApprovalOutcome::AlreadySufficient
        );
        assert_eq!(
            funds.deposit(units(20)).await.unwrap(),
            DepositOutcome::NeedsAllowanceReset { current: units(5) }
        );

        funds.reset_allowance().await.unwrap();
        assert!(matches!(
            funds.deposit(units(20)).await.unwrap(),
            DepositOutcome::Deposited { .. }
        ));
    }

    #[tokio::test]
    async fn test_withdraw_respects_pending_moves() {
        let house = Arc::new(SimulatedHouse::new(OWNER));
        house.credit(&PLAYER, units(50)).await.unwrap();
        let funds = funds(&house, &BalanceSignal::default());
        funds.view.set_pending(units(30));

        assert!(matches!(
            funds.withdraw(units(30)).await,
            Err(SessionError::InsufficientFunds { .. })
        ));
        assert!(matches!(
            funds.withdraw_all().await,
            Err(SessionError::InvalidState(_))
        ));

        funds.withdraw(units(20)).await.unwrap();
        assert_eq!(funds.wallet_balance().await.unwrap(), units(20));

        funds.view.set_pending(Amount::ZERO);
        funds.withdraw_all().await.unwrap();
        assert_eq!(house.balance_of(&PLAYER).await.unwrap(), Amount::ZERO);
        assert_eq!(funds.wallet_balance().await.unwrap(), units(50));
    }
}
