//! In-process house ledger with the same commit-reveal rules as the on-chain
//! contract: one open commitment per account, both secrets checked against
//! their commitments at settlement, owner-only house configuration.
//!
//! Used by the CLI for local play and by tests as the ledger fake. The
//! simulated bankroll is unlimited.

use crate::commitment::{commitment_of, move_outcome, HouseSecret, UserSecret};
use crate::house::MAX_BPS;
use crate::payout::{projected_return, HouseRates};
use fairhouse_core::error::{ACTIVE_SESSION_REASON, NO_ACTIVE_SESSION_REASON};
use fairhouse_core::storage::HouseStateStore;
use fairhouse_core::{
    Account, Amount, GamePlayed, Hash32, Ledger, LedgerError, LedgerResult, Receipt,
    SettleRequest, SettlementKind, Storage, TokenAllowance,
};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

pub const SIMULATED_HOUSE_ID: &str = "simulated-house";

/// Default contract address of the simulated house.
pub const SIMULATED_HOUSE_ADDRESS: Account = Account::new([0x4f; 20]);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HouseState {
    pub address: Account,
    pub owner: Account,
    pub house_commitment: Option<Hash32>,
    pub edge_bps: u32,
    pub fee_bps: u32,
    pub block_number: u64,
    pub balances: HashMap<Account, Amount>,
    pub commitments: HashMap<Account, Hash32>,
    /// Token balances outside the ledger.
    pub wallets: HashMap<Account, Amount>,
    /// owner -> spender -> allowance
    pub allowances: HashMap<Account, HashMap<Account, Amount>>,
}

impl HouseState {
    pub fn new(owner: Account) -> Self {
        Self {
            address: SIMULATED_HOUSE_ADDRESS,
            owner,
            house_commitment: None,
            edge_bps: 0,
            fee_bps: 0,
            block_number: 0,
            balances: HashMap::new(),
            commitments: HashMap::new(),
            wallets: HashMap::new(),
            allowances: HashMap::new(),
        }
    }

    fn balance(&self, account: &Account) -> Amount {
        self.balances.get(account).copied().unwrap_or_default()
    }

    fn wallet(&self, account: &Account) -> Amount {
        self.wallets.get(account).copied().unwrap_or_default()
    }

    fn allowance(&self, owner: &Account, spender: &Account) -> Amount {
        self.allowances
            .get(owner)
            .and_then(|spenders| spenders.get(spender))
            .copied()
            .unwrap_or_default()
    }

    fn rates(&self) -> HouseRates {
        HouseRates {
            edge_bps: self.edge_bps,
            fee_bps: self.fee_bps,
        }
    }

    fn only_owner(&self, caller: &Account) -> LedgerResult<()> {
        if caller != &self.owner {
            return Err(LedgerError::reverted("NOT_OWNER"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LedgerOp {
    Read,
    Deposit,
    Withdraw,
    Commit,
    Settle,
    Approve,
    Admin,
}

/// One-shot failure for the next call of a kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fault {
    /// Fail before any state change.
    Fail(LedgerError),
    /// Apply the transaction, then report a transport error.
    LoseReceipt,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettleCall {
    pub account: Account,
    pub game_id: u64,
    pub wagers: Vec<Amount>,
    pub kind: SettlementKind,
}

#[derive(Debug, Default)]
struct Effects {
    returned: Option<Amount>,
    events: Vec<GamePlayed>,
}

pub struct SimulatedHouse {
    state: Mutex<HouseState>,
    faults: Mutex<HashMap<LedgerOp, Fault>>,
    settle_calls: Mutex<Vec<SettleCall>>,
    latency: Mutex<Option<Duration>>,
    returns_payout: Mutex<bool>,
    strict_approvals: Mutex<bool>,
    storage: Option<Arc<Storage>>,
}

impl SimulatedHouse {
    pub fn new(owner: Account) -> Self {
        Self::from_state(HouseState::new(owner), None)
    }

    /// Load the persisted house, or create one owned by `owner`.
    pub async fn open(storage: Arc<Storage>, owner: Account) -> fairhouse_core::Result<Self> {
        let state = HouseStateStore::new(&storage)
            .load::<HouseState>(SIMULATED_HOUSE_ID)
            .await?;

        let state = match state {
            Some(state) => {
                tracing::debug!("Loaded simulated house at block {}", state.block_number);
                state
            }
            None => {
                let state = HouseState::new(owner);
                HouseStateStore::new(&storage)
                    .save(SIMULATED_HOUSE_ID, &state)
                    .await?;
                tracing::info!("Created simulated house owned by {}", owner);
                state
            }
        };

        Ok(Self::from_state(state, Some(storage)))
    }

    fn from_state(state: HouseState, storage: Option<Arc<Storage>>) -> Self {
        Self {
            state: Mutex::new(state),
            faults: Mutex::new(HashMap::new()),
            settle_calls: Mutex::new(Vec::new()),
            latency: Mutex::new(None),
            returns_payout: Mutex::new(false),
            strict_approvals: Mutex::new(false),
            storage,
        }
    }

    pub fn state(&self) -> HouseState {
        self.state.lock().clone()
    }

    pub fn settle_calls(&self) -> Vec<SettleCall> {
        self.settle_calls.lock().clone()
    }

    pub fn fail_next(&self, op: LedgerOp, fault: Fault) {
        self.faults.lock().insert(op, fault);
    }

    /// Delay applied to every transaction.
    pub fn set_latency(&self, latency: Option<Duration>) {
        *self.latency.lock() = latency;
    }

    /// Surface the payout as a call return value instead of only as events.
    pub fn set_returns_payout(&self, enabled: bool) {
        *self.returns_payout.lock() = enabled;
    }

    /// Reject changing one non-zero allowance straight to another.
    pub fn set_strict_approvals(&self, enabled: bool) {
        *self.strict_approvals.lock() = enabled;
    }

    /// Faucet: add tokens to an account's wallet.
    pub async fn mint(&self, account: &Account, amount: Amount) -> LedgerResult<Receipt> {
        self.transact(LedgerOp::Admin, |state| {
            let wallet = state.wallet(account);
            let next = wallet
                .checked_add(amount)
                .ok_or_else(|| LedgerError::reverted("OVERFLOW"))?;
            state.wallets.insert(*account, next);
            Ok(Effects::default())
        })
        .await
    }

    /// Grant ledger balance directly, skipping the token transfer.
    pub async fn credit(&self, account: &Account, amount: Amount) -> LedgerResult<Receipt> {
        self.transact(LedgerOp::Admin, |state| {
            let next = state
                .balance(account)
                .checked_add(amount)
                .ok_or_else(|| LedgerError::reverted("OVERFLOW"))?;
            state.balances.insert(*account, next);
            Ok(Effects::default())
        })
        .await
    }

    /// Operator only.
    pub async fn set_fee_bps(&self, operator: &Account, bps: u32) -> LedgerResult<Receipt> {
        self.transact(LedgerOp::Admin, |state| {
            state.only_owner(operator)?;
            if bps > MAX_BPS {
                return Err(LedgerError::reverted("FEE_TOO_HIGH"));
            }
            state.fee_bps = bps;
            Ok(Effects::default())
        })
        .await
    }

    fn take_fault(&self, op: LedgerOp) -> Option<Fault> {
        self.faults.lock().remove(&op)
    }

    fn read<T>(&self, f: impl FnOnce(&HouseState) -> T) -> LedgerResult<T> {
        if let Some(Fault::Fail(err)) = self.take_fault(LedgerOp::Read) {
            return Err(err);
        }
        Ok(f(&self.state.lock()))
    }

    /// Apply `apply` atomically to a scratch copy; a revert leaves no trace.
    async fn transact(
        &self,
        op: LedgerOp,
        apply: impl FnOnce(&mut HouseState) -> LedgerResult<Effects>,
    ) -> LedgerResult<Receipt> {
        let latency = *self.latency.lock();
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }

        let lose_receipt = match self.take_fault(op) {
            Some(Fault::Fail(err)) => return Err(err),
            Some(Fault::LoseReceipt) => true,
            None => false,
        };

        let (effects, snapshot) = {
            let mut state = self.state.lock();
            let mut next = state.clone();
            let effects = apply(&mut next)?;
            next.block_number += 1;
            *state = next;
            (effects, state.clone())
        };

        if let Some(storage) = &self.storage {
            HouseStateStore::new(storage)
                .save(SIMULATED_HOUSE_ID, &snapshot)
                .await
                .map_err(|e| LedgerError::transport(format!("house state not saved: {}", e)))?;
        }

        if lose_receipt {
            return Err(LedgerError::transport("connection lost before receipt"));
        }

        Ok(Receipt {
            tx_hash: Hash32::new(rand::random()),
            block_number: snapshot.block_number,
            returned: effects.returned,
            events: effects.events,
        })
    }
}

fn settle(
    state: &mut HouseState,
    account: &Account,
    request: &SettleRequest,
    returns_payout: bool,
) -> LedgerResult<Effects> {
    let commitment = state
        .commitments
        .get(account)
        .copied()
        .ok_or_else(|| LedgerError::reverted(NO_ACTIVE_SESSION_REASON))?;

    if commitment_of(&request.user_secret) != commitment {
        return Err(LedgerError::reverted("BAD_USER_SECRET"));
    }

    match state.house_commitment {
        Some(house) if commitment_of(&request.house_secret) == house => {}
        _ => return Err(LedgerError::reverted("BAD_HOUSE_SECRET")),
    }

    if request.wagers.is_empty() {
        return Err(LedgerError::reverted("NO_MOVES"));
    }

    let total = Amount::checked_sum(request.wagers.iter().copied())
        .ok_or_else(|| LedgerError::reverted("OVERFLOW"))?;
    let balance = state
        .balance(account)
        .checked_sub(total)
        .ok_or_else(|| LedgerError::reverted("INSUFFICIENT_BALANCE"))?;

    let user_secret: [u8; 32] = request
        .user_secret
        .clone()
        .try_into()
        .map_err(|_| LedgerError::reverted("BAD_USER_SECRET"))?;
    let user_secret = UserSecret::from_bytes(user_secret);
    let house_secret = HouseSecret::new(request.house_secret.clone())
        .map_err(|_| LedgerError::reverted("BAD_HOUSE_SECRET"))?;

    let rates = state.rates();
    let mut payout = Amount::ZERO;
    let mut data = Vec::with_capacity(request.wagers.len());
    for (index, wager) in request.wagers.iter().enumerate() {
        let won = move_outcome(&user_secret, &house_secret, account, index as u64);
        data.push(u8::from(won));
        if !won {
            break;
        }
        payout = payout
            .checked_add(projected_return(*wager, 1, rates))
            .ok_or_else(|| LedgerError::reverted("OVERFLOW"))?;
    }

    let credited = balance
        .checked_add(payout)
        .ok_or_else(|| LedgerError::reverted("OVERFLOW"))?;
    state.commitments.remove(account);

    match request.kind {
        SettlementKind::Reveal => {
            state.balances.insert(*account, credited);
        }
        SettlementKind::RevealAndWithdraw => {
            state.balances.insert(*account, Amount::ZERO);
            let wallet = state
                .wallet(account)
                .checked_add(credited)
                .ok_or_else(|| LedgerError::reverted("OVERFLOW"))?;
            state.wallets.insert(*account, wallet);
        }
    }

    Ok(Effects {
        returned: returns_payout.then_some(payout),
        events: vec![GamePlayed {
            account: *account,
            game_id: request.game_id,
            wager: total,
            payout,
            data,
        }],
    })
}

#[async_trait]
impl Ledger for SimulatedHouse {
    fn address(&self) -> Account {
        self.state.lock().address
    }

    async fn balance_of(&self, account: &Account) -> LedgerResult<Amount> {
        self.read(|state| state.balance(account))
    }

    async fn deposit(&self, account: &Account, amount: Amount) -> LedgerResult<Receipt> {
        self.transact(LedgerOp::Deposit, |state| {
            if amount.is_zero() {
                return Err(LedgerError::reverted("ZERO_AMOUNT"));
            }
            let wallet = state
                .wallet(account)
                .checked_sub(amount)
                .ok_or_else(|| LedgerError::reverted("TRANSFER_EXCEEDS_BALANCE"))?;
            let house = state.address;
            let allowance = state
                .allowance(account, &house)
                .checked_sub(amount)
                .ok_or_else(|| LedgerError::reverted("INSUFFICIENT_ALLOWANCE"))?;
            let balance = state
                .balance(account)
                .checked_add(amount)
                .ok_or_else(|| LedgerError::reverted("OVERFLOW"))?;

            state.wallets.insert(*account, wallet);
            state
                .allowances
                .entry(*account)
                .or_default()
                .insert(house, allowance);
            state.balances.insert(*account, balance);
            Ok(Effects::default())
        })
        .await
    }

    async fn withdraw(&self, account: &Account, amount: Amount) -> LedgerResult<Receipt> {
        self.transact(LedgerOp::Withdraw, |state| {
            if amount.is_zero() {
                return Err(LedgerError::reverted("ZERO_AMOUNT"));
            }
            let balance = state
                .balance(account)
                .checked_sub(amount)
                .ok_or_else(|| LedgerError::reverted("INSUFFICIENT_BALANCE"))?;
            let wallet = state
                .wallet(account)
                .checked_add(amount)
                .ok_or_else(|| LedgerError::reverted("OVERFLOW"))?;
            state.balances.insert(*account, balance);
            state.wallets.insert(*account, wallet);
            Ok(Effects::default())
        })
        .await
    }

    async fn withdraw_all(&self, account: &Account) -> LedgerResult<Receipt> {
        self.transact(LedgerOp::Withdraw, |state| {
            let balance = state.balance(account);
            if balance.is_zero() {
                return Err(LedgerError::reverted("NOTHING_TO_WITHDRAW"));
            }
            let wallet = state
                .wallet(account)
                .checked_add(balance)
                .ok_or_else(|| LedgerError::reverted("OVERFLOW"))?;
            state.balances.insert(*account, Amount::ZERO);
            state.wallets.insert(*account, wallet);
            Ok(Effects {
                returned: Some(balance),
                events: Vec::new(),
            })
        })
        .await
    }

    async fn user_commit(&self, account: &Account, commitment: Hash32) -> LedgerResult<Receipt> {
        self.transact(LedgerOp::Commit, |state| {
            if state.commitments.contains_key(account) {
                return Err(LedgerError::reverted(ACTIVE_SESSION_REASON));
            }
            if commitment.is_zero() {
                return Err(LedgerError::reverted("ZERO_COMMITMENT"));
            }
            state.commitments.insert(*account, commitment);
            Ok(Effects::default())
        })
        .await
    }

    async fn user_commitment(&self, account: &Account) -> LedgerResult<Option<Hash32>> {
        self.read(|state| state.commitments.get(account).copied())
    }

    async fn current_house_commitment(&self) -> LedgerResult<Option<Hash32>> {
        self.read(|state| state.house_commitment)
    }

    async fn settle_batch(
        &self,
        account: &Account,
        request: &SettleRequest,
    ) -> LedgerResult<Receipt> {
        self.settle_calls.lock().push(SettleCall {
            account: *account,
            game_id: request.game_id,
            wagers: request.wagers.clone(),
            kind: request.kind,
        });
        let returns_payout = *self.returns_payout.lock();

        self.transact(LedgerOp::Settle, |state| {
            settle(state, account, request, returns_payout)
        })
        .await
    }

    async fn house_edge_bps(&self) -> LedgerResult<u32> {
        self.read(|state| state.edge_bps)
    }

    async fn fee_bps(&self) -> LedgerResult<u32> {
        self.read(|state| state.fee_bps)
    }

    async fn owner(&self) -> LedgerResult<Account> {
        self.read(|state| state.owner)
    }

    async fn set_current_house_commitment(
        &self,
        operator: &Account,
        commitment: Hash32,
    ) -> LedgerResult<Receipt> {
        self.transact(LedgerOp::Admin, |state| {
            state.only_owner(operator)?;
            state.house_commitment = Some(commitment);
            Ok(Effects::default())
        })
        .await
    }

    async fn set_house_edge_bps(&self, operator: &Account, bps: u32) -> LedgerResult<Receipt> {
        self.transact(LedgerOp::Admin, |state| {
            state.only_owner(operator)?;
            if bps > MAX_BPS {
                return Err(LedgerError::reverted("EDGE_TOO_HIGH"));
            }
            state.edge_bps = bps;
            Ok(Effects::default())
        })
        .await
    }
}

#[async_trait]
impl TokenAllowance for SimulatedHouse {
    async fn wallet_balance(&self, owner: &Account) -> LedgerResult<Amount> {
        self.read(|state| state.wallet(owner))
    }

    async fn allowance(&self, owner: &Account, spender: &Account) -> LedgerResult<Amount> {
        self.read(|state| state.allowance(owner, spender))
    }

    async fn approve(
        &self,
        owner: &Account,
        spender: &Account,
        amount: Amount,
    ) -> LedgerResult<Receipt> {
        let strict = *self.strict_approvals.lock();
        self.transact(LedgerOp::Approve, |state| {
            if strict && !amount.is_zero() && !state.allowance(owner, spender).is_zero() {
                return Err(LedgerError::reverted("APPROVE_NON_ZERO_ALLOWANCE"));
            }
            state
                .allowances
                .entry(*owner)
                .or_default()
                .insert(*spender, amount);
            Ok(Effects::default())
        })
        .await
    }
}
