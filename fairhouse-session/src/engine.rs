//! Session lifecycle: commit a secret, play moves locally, settle the batch.
//!
//! Outcomes are computed client-side from both secrets, but nothing is final
//! until the ledger replays the same computation during settlement. Every
//! ledger write happens at most once per call; failures leave the session in a
//! state that [`SessionEngine::recover`] can resume from.

use crate::commitment::{
    is_winning_hash, outcome_hash, CommitmentScheme, HouseSecret, KeccakCommitment, UserSecret,
};
use crate::error::{Result, SessionError};
use crate::house::HouseSecretSource;
use crate::payout::{projected_return, HouseRates};
use crate::session::{Session, SessionStatus};
use fairhouse_core::{
    Account, Amount, BalanceChangeReason, BalanceSignal, GamePlayed, Hash32, Ledger, LedgerError,
    LedgerView, SessionConfig, SessionRecord, SessionStore, SettleRequest, SettlementKind,
};
use std::sync::Arc;
use tokio::task::JoinHandle;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartOutcome {
    Committed {
        commitment: Hash32,
        house_commitment: Hash32,
        tx_hash: Hash32,
    },
    /// Balance does not cover the first wager; nothing was sent.
    AwaitingFunds { need: Amount, available: Amount },
    /// The ledger already holds a commitment for this account.
    RecoveryNeeded,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MoveOutcome {
    pub index: u64,
    pub wager: Amount,
    pub won: bool,
    pub outcome_hash: Hash32,
    pub status: SessionStatus,
    pub pending_spent: Amount,
    pub total_gain: Amount,
}

/// Moves played by one [`SessionEngine::play_until`] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoundOutcome {
    pub target_steps: u32,
    pub moves: Vec<MoveOutcome>,
}

impl RoundOutcome {
    pub fn steps_won(&self) -> u32 {
        self.moves.iter().filter(|m| m.won).count() as u32
    }

    pub fn busted(&self) -> bool {
        self.moves.last().is_some_and(|m| !m.won)
    }

    pub fn reached_target(&self) -> bool {
        self.steps_won() == self.target_steps
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settlement {
    pub tx_hash: Hash32,
    pub block_number: u64,
    pub kind: SettlementKind,
    pub wagers: Vec<Amount>,
    /// Realized payout, when the receipt exposes it.
    pub payout: Option<Amount>,
    /// Ledger balance read after settlement.
    pub balance: Option<Amount>,
    /// `GamePlayed` events from the receipt; `data` holds the ledger's
    /// per-move verdicts.
    pub events: Vec<GamePlayed>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SettleOutcome {
    Settled(Settlement),
    /// Committed without moves: only the balance was refreshed.
    NothingToSettle { balance: Option<Amount> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoverySource {
    /// Secret read back from the session store.
    Persisted,
    /// Secret supplied by the user.
    Supplied,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecoverOutcome {
    /// A session was already open in this engine.
    Resumed { status: SessionStatus },
    Recovered {
        status: SessionStatus,
        source: RecoverySource,
        moves: usize,
    },
    /// Neither the ledger nor the store holds a session.
    NothingToRecover,
    /// The ledger holds a commitment and no usable secret is stored locally.
    ManualSecretRequired { ledger_commitment: Hash32 },
}

pub struct SessionEngine {
    config: SessionConfig,
    ledger: Arc<dyn Ledger>,
    store: Arc<dyn SessionStore>,
    house: Arc<dyn HouseSecretSource>,
    view: Arc<LedgerView>,
    signal: BalanceSignal,
    session: Session,
    rates: HouseRates,
}

impl SessionEngine {
    /// Engine for `account`. A stored session record puts it in
    /// `RecoveryNeeded`; call [`recover`](Self::recover) to resume it.
    pub async fn open(
        config: SessionConfig,
        account: Account,
        ledger: Arc<dyn Ledger>,
        store: Arc<dyn SessionStore>,
        house: Arc<dyn HouseSecretSource>,
        signal: BalanceSignal,
    ) -> Result<Self> {
        config.validate()?;

        let view = Arc::new(LedgerView::new(ledger.clone(), account));
        view.refresh().await;

        let mut engine = Self {
            config,
            ledger,
            store,
            house,
            view,
            signal,
            session: Session::new(account),
            rates: HouseRates::default(),
        };

        if engine.store.get(&account).await?.is_some() {
            engine.session.set_status(SessionStatus::RecoveryNeeded);
            tracing::info!(
                "Found a saved {} session for {}",
                engine.config.game,
                account
            );
        }

        Ok(engine)
    }

    pub fn account(&self) -> &Account {
        self.session.account()
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn status(&self) -> SessionStatus {
        self.session.status()
    }

    pub fn view(&self) -> Arc<LedgerView> {
        self.view.clone()
    }

    pub fn rates(&self) -> HouseRates {
        self.rates
    }

    /// Estimated return of `wager` after `steps` wins at the current rates.
    pub fn projected_return(&self, wager: Amount, steps: u32) -> Amount {
        projected_return(wager, steps, self.rates)
    }

    /// Keep the balance view fresh on the configured interval and on every
    /// balance signal.
    pub fn spawn_balance_poller(&self) -> JoinHandle<()> {
        self.view
            .clone()
            .spawn_poller(self.config.balance_poll_interval, &self.signal)
    }

    /// Re-read house edge and fee. Failures keep the previous rates.
    pub async fn refresh_rates(&mut self) -> HouseRates {
        match tokio::try_join!(self.ledger.house_edge_bps(), self.ledger.fee_bps()) {
            Ok((edge_bps, fee_bps)) => {
                self.rates = HouseRates { edge_bps, fee_bps };
            }
            Err(e) => {
                tracing::warn!("Could not read house rates: {}", e);
            }
        }
        self.rates
    }

    fn ensure_not_in_flight(&self) -> Result<()> {
        let status = self.session.status();
        if status.is_in_flight() {
            return Err(SessionError::OperationInProgress(status));
        }
        Ok(())
    }

    /// Commit a fresh secret and open a session whose first move will be
    /// `first_wager`.
    pub async fn start(&mut self, first_wager: Amount) -> Result<StartOutcome> {
        self.start_with_secret(first_wager, UserSecret::generate())
            .await
    }

    pub(crate) async fn start_with_secret(
        &mut self,
        first_wager: Amount,
        secret: UserSecret,
    ) -> Result<StartOutcome> {
        self.ensure_not_in_flight()?;
        if self.session.status().is_open() {
            return Err(SessionError::SessionAlreadyActive);
        }
        if first_wager.is_zero() {
            return Err(SessionError::InvalidAmount(
                "first wager must be greater than 0".to_string(),
            ));
        }

        let account = *self.account();

        if self.store.get(&account).await?.is_some() {
            match self.ledger.user_commitment(&account).await? {
                Some(_) => {
                    self.session.set_status(SessionStatus::RecoveryNeeded);
                    return Err(SessionError::SessionAlreadyActive);
                }
                None => {
                    tracing::warn!("Discarding stale session record for {}", account);
                    self.store.remove(&account).await?;
                }
            }
        }

        self.session.reset();
        self.view.set_pending(Amount::ZERO);
        self.view.refresh().await;

        let available = self.view.available();
        if available < first_wager {
            self.session.set_status(SessionStatus::AwaitingFunds);
            tracing::info!(
                "Awaiting funds for {}: need {}, have {}",
                account,
                first_wager,
                available
            );
            return Ok(StartOutcome::AwaitingFunds {
                need: first_wager,
                available,
            });
        }

        let house_commitment = match self.ledger.current_house_commitment().await? {
            Some(commitment) if !commitment.is_zero() => commitment,
            _ => return Err(SessionError::HouseCommitmentUnset),
        };
        self.refresh_rates().await;

        let commitment = secret.commitment();
        self.session.begin(secret, house_commitment);
        let record = self.current_record()?;
        if let Err(e) = self.store.put(&account, &record).await {
            self.session.reset();
            return Err(e.into());
        }

        self.session.set_status(SessionStatus::Committing);
        match self.ledger.user_commit(&account, commitment).await {
            Ok(receipt) => {
                self.session.set_status(SessionStatus::Committed);
                tracing::info!(
                    "Session {} committed {} for {} in block {}",
                    self.session.id(),
                    commitment,
                    account,
                    receipt.block_number
                );
                Ok(StartOutcome::Committed {
                    commitment,
                    house_commitment,
                    tx_hash: receipt.tx_hash,
                })
            }
            Err(err) => self.abort_commit(err).await,
        }
    }

    async fn abort_commit(&mut self, err: LedgerError) -> Result<StartOutcome> {
        let account = *self.account();

        if let LedgerError::Transport(_) = err {
            // The commit may have landed; keep the secret so recovery can tell.
            self.session.set_status(SessionStatus::RecoveryNeeded);
            tracing::warn!("Commit for {} unconfirmed: {}", account, err);
            return Err(err.into());
        }

        self.discard_record().await;
        self.session.reset();

        if err.is_active_session() {
            self.session.set_status(SessionStatus::RecoveryNeeded);
            tracing::warn!("Ledger already holds a session for {}", account);
            return Ok(StartOutcome::RecoveryNeeded);
        }

        tracing::warn!("Commit for {} rejected: {}", account, err);
        Err(err.into())
    }

    /// Play one move. Nothing touches the ledger; the outcome becomes final
    /// at settlement.
    pub async fn play(&mut self, wager: Amount) -> Result<MoveOutcome> {
        self.ensure_not_in_flight()?;
        match self.session.status() {
            SessionStatus::Committed | SessionStatus::Playing => {}
            SessionStatus::Busted => {
                return Err(SessionError::invalid_state(
                    "session is busted; settle it before playing again",
                ))
            }
            status => {
                return Err(SessionError::invalid_state(format!(
                    "no committed session ({:?})",
                    status
                )))
            }
        }
        if wager.is_zero() {
            return Err(SessionError::InvalidAmount(
                "wager must be greater than 0".to_string(),
            ));
        }

        let available = self.view.available();
        if available < wager {
            return Err(SessionError::InsufficientFunds {
                need: wager,
                available,
            });
        }
        let pending = self
            .session
            .pending_spent()
            .checked_add(wager)
            .ok_or_else(|| SessionError::InvalidAmount("pending total overflows".to_string()))?;

        let house = self.verified_house_secret()?;
        let account = *self.account();
        let index = self.session.moves().len() as u64;
        let hash = outcome_hash(self.user_secret()?, &house, &account, index);
        let won = is_winning_hash(&hash);
        let gain = if won {
            projected_return(wager, 1, self.rates)
        } else {
            Amount::ZERO
        };

        let mut record = self.current_record()?;
        record.moves.push(wager);
        self.store.put(&account, &record).await?;

        self.session.record_move(wager, won, gain)?;
        self.view.set_pending(pending);

        tracing::debug!(
            "Session {} move {}: wagered {}, {}",
            self.session.id(),
            index,
            wager,
            if won { "won" } else { "lost" }
        );

        Ok(MoveOutcome {
            index,
            wager,
            won,
            outcome_hash: hash,
            status: self.session.status(),
            pending_spent: pending,
            total_gain: self.session.total_gain(),
        })
    }

    /// Play up to `target_steps` more moves of `wager`, stopping at the first
    /// loss.
    pub async fn play_until(&mut self, wager: Amount, target_steps: u32) -> Result<RoundOutcome> {
        if target_steps == 0 {
            return Err(SessionError::InvalidAmount(
                "target must be at least one step".to_string(),
            ));
        }

        let mut moves = Vec::with_capacity(target_steps as usize);
        while moves.len() < target_steps as usize {
            let outcome = self.play(wager).await?;
            let won = outcome.won;
            moves.push(outcome);
            if !won {
                break;
            }
        }

        Ok(RoundOutcome {
            target_steps,
            moves,
        })
    }

    /// Reveal both secrets with every recorded wager in one ledger call.
    pub async fn settle(&mut self, kind: SettlementKind) -> Result<SettleOutcome> {
        self.ensure_not_in_flight()?;
        let status = self.session.status();

        if status == SessionStatus::Committed && self.session.moves().is_empty() {
            let balance = self.view.refresh().await;
            return Ok(SettleOutcome::NothingToSettle { balance });
        }
        if !matches!(status, SessionStatus::Playing | SessionStatus::Busted) {
            return Err(SessionError::invalid_state(format!(
                "nothing to settle ({:?})",
                status
            )));
        }

        let house = self.verified_house_secret()?;
        let request = SettleRequest {
            game_id: self.config.game_id,
            wagers: self.session.wagers(),
            user_secret: self.user_secret()?.as_bytes().to_vec(),
            house_secret: house.as_bytes().to_vec(),
            kind,
        };
        let account = *self.account();

        self.session.set_status(SessionStatus::Settling);
        let receipt = match self.ledger.settle_batch(&account, &request).await {
            Ok(receipt) => receipt,
            Err(LedgerError::Transport(msg)) => {
                // Unknown whether it landed; recovery asks the ledger.
                self.session.set_status(SessionStatus::RecoveryNeeded);
                tracing::warn!("Settlement for {} unconfirmed: {}", account, msg);
                return Err(SessionError::LedgerUnavailable(msg));
            }
            Err(err) if err.is_no_active_session() => {
                // Cleared on the ledger; recovery drops the local copy.
                self.session.set_status(SessionStatus::RecoveryNeeded);
                tracing::warn!("Ledger holds no session for {}: {}", account, err);
                return Err(err.into());
            }
            Err(err) => {
                self.session.set_status(status);
                tracing::warn!("Settlement for {} rejected: {}", account, err);
                return Err(err.into());
            }
        };

        let payout = receipt.realized_payout(&account);
        self.session.set_status(SessionStatus::Settled);
        tracing::info!(
            "Session {} settled {} moves in block {} (payout {})",
            self.session.id(),
            request.wagers.len(),
            receipt.block_number,
            payout.map_or_else(|| "unknown".to_string(), |p| p.to_string())
        );

        self.discard_record().await;
        self.session.reset();
        self.view.set_pending(Amount::ZERO);
        let balance = self.view.refresh().await;
        self.signal
            .notify(account, BalanceChangeReason::Settlement);

        Ok(SettleOutcome::Settled(Settlement {
            tx_hash: receipt.tx_hash,
            block_number: receipt.block_number,
            kind,
            wagers: request.wagers,
            payout,
            balance,
            events: receipt.events,
        }))
    }

    /// Resume a session the ledger still holds, from the stored record or
    /// from a user-supplied hex secret.
    pub async fn recover(&mut self, supplied: Option<&str>) -> Result<RecoverOutcome> {
        let status = self.session.status();
        let account = *self.account();
        let on_ledger = self.ledger.user_commitment(&account).await;

        if status.is_open() {
            if let Ok(None) = on_ledger {
                tracing::warn!(
                    "Session {} is no longer open on the ledger for {}; dropping it",
                    self.session.id(),
                    account
                );
                self.store.remove(&account).await?;
                self.clear();
                self.view.refresh().await;
                return Ok(RecoverOutcome::NothingToRecover);
            }
            return Ok(RecoverOutcome::Resumed { status });
        }

        if let Some(record) = self.store.get(&account).await? {
            let secret = UserSecret::from_hex(&record.user_secret)?;
            return match on_ledger {
                Ok(Some(commitment)) if commitment == secret.commitment() => {
                    self.restore(secret, record, RecoverySource::Persisted).await
                }
                Ok(Some(commitment)) => {
                    tracing::warn!(
                        "Saved secret for {} does not match its ledger commitment",
                        account
                    );
                    self.recover_manually(commitment, supplied).await
                }
                Ok(None) => {
                    tracing::info!(
                        "No open session on the ledger for {}; clearing saved record",
                        account
                    );
                    self.store.remove(&account).await?;
                    self.clear();
                    Ok(RecoverOutcome::NothingToRecover)
                }
                Err(e) => {
                    tracing::warn!(
                        "Could not confirm saved session for {}, resuming it anyway: {}",
                        account,
                        e
                    );
                    self.restore(secret, record, RecoverySource::Persisted).await
                }
            };
        }

        match on_ledger? {
            None => {
                self.clear();
                Ok(RecoverOutcome::NothingToRecover)
            }
            Some(commitment) => self.recover_manually(commitment, supplied).await,
        }
    }

    async fn recover_manually(
        &mut self,
        ledger_commitment: Hash32,
        supplied: Option<&str>,
    ) -> Result<RecoverOutcome> {
        let Some(input) = supplied else {
            self.clear();
            self.session.set_status(SessionStatus::RecoveryNeeded);
            return Ok(RecoverOutcome::ManualSecretRequired { ledger_commitment });
        };

        let secret = UserSecret::from_hex(input)?;
        if secret.commitment() != ledger_commitment {
            return Err(SessionError::SecretMismatch);
        }

        let house_commitment = match self.ledger.current_house_commitment().await? {
            Some(commitment) if !commitment.is_zero() => commitment,
            _ => return Err(SessionError::HouseCommitmentUnset),
        };

        let record = SessionRecord {
            user_secret: secret.to_hex(),
            house_commitment: Some(house_commitment),
            moves: Vec::new(),
        };
        self.store.put(self.session.account(), &record).await?;

        self.restore(secret, record, RecoverySource::Supplied).await
    }

    /// Rebuild the session from a record, replaying stored moves up to the
    /// first loss.
    async fn restore(
        &mut self,
        secret: UserSecret,
        mut record: SessionRecord,
        source: RecoverySource,
    ) -> Result<RecoverOutcome> {
        let house_commitment = match record.house_commitment {
            Some(commitment) => commitment,
            None => match self.ledger.current_house_commitment().await? {
                Some(commitment) if !commitment.is_zero() => commitment,
                _ => return Err(SessionError::HouseCommitmentUnset),
            },
        };
        self.refresh_rates().await;

        let account = *self.account();
        self.session.begin(secret, house_commitment);
        self.session.set_status(SessionStatus::Committed);

        if !record.moves.is_empty() {
            let house = match self.verified_house_secret() {
                Ok(house) => house,
                Err(e) => {
                    self.session.set_status(SessionStatus::RecoveryNeeded);
                    return Err(e);
                }
            };
            for wager in &record.moves {
                if self.session.status() == SessionStatus::Busted {
                    break;
                }
                let index = self.session.moves().len() as u64;
                let hash = outcome_hash(self.user_secret()?, &house, &account, index);
                let won = is_winning_hash(&hash);
                let gain = if won {
                    projected_return(*wager, 1, self.rates)
                } else {
                    Amount::ZERO
                };
                self.session.record_move(*wager, won, gain)?;
            }

            let replayed = self.session.moves().len();
            if replayed < record.moves.len() {
                tracing::warn!(
                    "Saved session for {} has {} moves after a loss; dropping them",
                    account,
                    record.moves.len() - replayed
                );
                record.moves.truncate(replayed);
                self.store.put(&account, &record).await?;
            }
        }

        self.view.set_pending(self.session.pending_spent());
        self.view.refresh().await;

        let status = self.session.status();
        tracing::info!(
            "Recovered session {} for {} ({:?}, {} moves, {:?})",
            self.session.id(),
            account,
            source,
            self.session.moves().len(),
            status
        );

        Ok(RecoverOutcome::Recovered {
            status,
            source,
            moves: self.session.moves().len(),
        })
    }

    /// Forget local session state. Refused while a session is open or a
    /// transaction is outstanding; stored records are left for recovery.
    pub fn reset(&mut self) -> Result<()> {
        let status = self.session.status();
        if status.is_open() || status.is_in_flight() {
            return Err(SessionError::invalid_state(format!(
                "cannot reset a session in {:?}; settle or recover it first",
                status
            )));
        }
        self.clear();
        Ok(())
    }

    fn clear(&mut self) {
        self.session.reset();
        self.view.set_pending(Amount::ZERO);
    }

    fn user_secret(&self) -> Result<&UserSecret> {
        self.session
            .user_secret()
            .ok_or_else(|| SessionError::invalid_state("session has no secret"))
    }

    fn current_record(&self) -> Result<SessionRecord> {
        self.session
            .to_record()
            .ok_or_else(|| SessionError::invalid_state("session has no secret"))
    }

    /// House secret, checked against the commitment captured at start.
    fn verified_house_secret(&self) -> Result<HouseSecret> {
        let captured = self
            .session
            .captured_house_commitment()
            .ok_or(SessionError::HouseCommitmentUnset)?;
        let house = self.house.house_secret()?;
        if !KeccakCommitment::verify(&captured, house.as_bytes()) {
            return Err(SessionError::HouseCommitmentMismatch {
                captured,
                computed: house.commitment(),
            });
        }
        Ok(house)
    }

    async fn discard_record(&self) {
        let account = self.session.account();
        if let Err(e) = self.store.remove(account).await {
            tracing::warn!("Could not remove session record for {}: {}", account, e);
        }
    }
}
