//! Narrow interface to the value-custodying house ledger.
//!
//! The ledger is authoritative for balances and settlement. Everything here
//! suspends until the transaction is confirmed or reverted; timeouts and
//! retries belong to the transport behind the trait, never to its callers.

use crate::error::LedgerError;
use crate::types::{Account, Amount, Hash32};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub type LedgerResult<T> = std::result::Result<T, LedgerError>;

/// `GamePlayed(account, gameId, wager, payout, data)` as emitted at settlement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GamePlayed {
    pub account: Account,
    pub game_id: u64,
    pub wager: Amount,
    pub payout: Amount,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Receipt {
    pub tx_hash: Hash32,
    pub block_number: u64,
    /// Return value of the call, when the transport can surface it.
    pub returned: Option<Amount>,
    pub events: Vec<GamePlayed>,
}

impl Receipt {
    /// Realized payout for `account`: the direct return value if present,
    /// otherwise the sum of its `GamePlayed` events.
    pub fn realized_payout(&self, account: &Account) -> Option<Amount> {
        if let Some(returned) = self.returned {
            return Some(returned);
        }

        let mut events = self
            .events
            .iter()
            .filter(|event| &event.account == account)
            .peekable();
        events.peek()?;
        Amount::checked_sum(events.map(|event| event.payout))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SettlementKind {
    /// `playBatchReveal`: settle and keep winnings on the ledger.
    Reveal,
    /// `settleAndWithdraw`: settle and move the whole balance to the wallet.
    RevealAndWithdraw,
}

/// Full reveal for one session. Both secrets become public once submitted.
#[derive(Clone, PartialEq, Eq)]
pub struct SettleRequest {
    pub game_id: u64,
    pub wagers: Vec<Amount>,
    pub user_secret: Vec<u8>,
    pub house_secret: Vec<u8>,
    pub kind: SettlementKind,
}

impl std::fmt::Debug for SettleRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SettleRequest")
            .field("game_id", &self.game_id)
            .field("wagers", &self.wagers)
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}

#[async_trait]
pub trait Ledger: Send + Sync {
    /// Contract address, the spender for token approvals.
    fn address(&self) -> Account;

    async fn balance_of(&self, account: &Account) -> LedgerResult<Amount>;

    async fn deposit(&self, account: &Account, amount: Amount) -> LedgerResult<Receipt>;

    async fn withdraw(&self, account: &Account, amount: Amount) -> LedgerResult<Receipt>;

    async fn withdraw_all(&self, account: &Account) -> LedgerResult<Receipt>;

    async fn user_commit(&self, account: &Account, commitment: Hash32) -> LedgerResult<Receipt>;

    /// Commitment recorded for the account's active session, if any.
    async fn user_commitment(&self, account: &Account) -> LedgerResult<Option<Hash32>>;

    async fn current_house_commitment(&self) -> LedgerResult<Option<Hash32>>;

    async fn settle_batch(&self, account: &Account, request: &SettleRequest)
        -> LedgerResult<Receipt>;

    async fn house_edge_bps(&self) -> LedgerResult<u32>;

    async fn fee_bps(&self) -> LedgerResult<u32>;

    async fn owner(&self) -> LedgerResult<Account>;

    /// Operator only.
    async fn set_current_house_commitment(
        &self,
        operator: &Account,
        commitment: Hash32,
    ) -> LedgerResult<Receipt>;

    /// Operator only.
    async fn set_house_edge_bps(&self, operator: &Account, bps: u32) -> LedgerResult<Receipt>;
}

/// ERC-20 style token the ledger custodies.
#[async_trait]
pub trait TokenAllowance: Send + Sync {
    async fn wallet_balance(&self, owner: &Account) -> LedgerResult<Amount>;

    async fn allowance(&self, owner: &Account, spender: &Account) -> LedgerResult<Amount>;

    async fn approve(
        &self,
        owner: &Account,
        spender: &Account,
        amount: Amount,
    ) -> LedgerResult<Receipt>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn account(last: u8) -> Account {
        let mut bytes = [0u8; 20];
        bytes[19] = last;
        Account::new(bytes)
    }

    fn played(account: Account, payout: u128) -> GamePlayed {
        GamePlayed {
            account,
            game_id: 2,
            wager: Amount::from_units(10),
            payout: Amount::from_units(payout),
            data: Vec::new(),
        }
    }

    #[test]
    fn test_payout_prefers_return_value() {
        let receipt = Receipt {
            tx_hash: Hash32::ZERO,
            block_number: 1,
            returned: Some(Amount::from_units(7)),
            events: vec![played(account(1), 99)],
        };
        assert_eq!(receipt.realized_payout(&account(1)), Some(Amount::from_units(7)));
    }

    #[test]
    fn test_payout_recovered_from_events() {
        let receipt = Receipt {
            tx_hash: Hash32::ZERO,
            block_number: 1,
            returned: None,
            events: vec![played(account(1), 19), played(account(2), 5), played(account(1), 0)],
        };
        assert_eq!(receipt.realized_payout(&account(1)), Some(Amount::from_units(19)));
        assert_eq!(receipt.realized_payout(&account(3)), None);
    }
}
