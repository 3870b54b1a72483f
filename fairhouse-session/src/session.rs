use crate::commitment::UserSecret;
use crate::error::{Result, SessionError};
use chrono::{DateTime, Utc};
use fairhouse_core::{Account, Amount, Hash32, SessionRecord};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionStatus {
    Idle,
    /// Balance did not cover the first wager.
    AwaitingFunds,
    /// Commit transaction submitted, not yet confirmed.
    Committing,
    /// Commitment on the ledger, no moves yet.
    Committed,
    /// At least one move, all won so far.
    Playing,
    /// Last move lost; only settlement is allowed.
    Busted,
    /// Settlement transaction submitted, not yet confirmed.
    Settling,
    /// Settlement confirmed; transient before returning to `Idle`.
    Settled,
    /// The ledger holds a commitment this client cannot use yet.
    RecoveryNeeded,
}

impl SessionStatus {
    /// A commitment is live on the ledger and the secret is held locally.
    pub fn is_open(self) -> bool {
        matches!(self, Self::Committed | Self::Playing | Self::Busted)
    }

    pub fn accepts_moves(self) -> bool {
        matches!(self, Self::Committed | Self::Playing)
    }

    /// A ledger transaction is outstanding.
    pub fn is_in_flight(self) -> bool {
        matches!(self, Self::Committing | Self::Settling)
    }
}

/// One recorded wager and its outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Move {
    pub index: u64,
    pub wager: Amount,
    pub won: bool,
}

/// One account's commit-reveal session.
///
/// `pending_spent` always equals the sum of recorded wagers; both only change
/// through [`Session::record_move`] and [`Session::reset`].
#[derive(Debug, Clone)]
pub struct Session {
    id: Uuid,
    account: Account,
    status: SessionStatus,
    user_secret: Option<UserSecret>,
    user_commitment: Option<Hash32>,
    captured_house_commitment: Option<Hash32>,
    moves: Vec<Move>,
    pending_spent: Amount,
    total_gain: Amount,
    started_at: Option<DateTime<Utc>>,
}

impl Session {
    pub fn new(account: Account) -> Self {
        Self {
            id: Uuid::new_v4(),
            account,
            status: SessionStatus::Idle,
            user_secret: None,
            user_commitment: None,
            captured_house_commitment: None,
            moves: Vec::new(),
            pending_spent: Amount::ZERO,
            total_gain: Amount::ZERO,
            started_at: None,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn account(&self) -> &Account {
        &self.account
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    pub fn user_secret(&self) -> Option<&UserSecret> {
        self.user_secret.as_ref()
    }

    pub fn user_commitment(&self) -> Option<Hash32> {
        self.user_commitment
    }

    pub fn captured_house_commitment(&self) -> Option<Hash32> {
        self.captured_house_commitment
    }

    pub fn moves(&self) -> &[Move] {
        &self.moves
    }

    pub fn wagers(&self) -> Vec<Amount> {
        self.moves.iter().map(|m| m.wager).collect()
    }

    pub fn pending_spent(&self) -> Amount {
        self.pending_spent
    }

    pub fn total_gain(&self) -> Amount {
        self.total_gain
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    /// Consecutive wins so far.
    pub fn steps(&self) -> u32 {
        self.moves.iter().take_while(|m| m.won).count() as u32
    }

    pub(crate) fn set_status(&mut self, status: SessionStatus) {
        if self.status != status {
            tracing::debug!("Session {} {:?} -> {:?}", self.id, self.status, status);
        }
        self.status = status;
    }

    /// Bind a new secret and the house commitment it will be judged against.
    pub(crate) fn begin(&mut self, secret: UserSecret, house_commitment: Hash32) {
        self.reset();
        self.user_commitment = Some(secret.commitment());
        self.user_secret = Some(secret);
        self.captured_house_commitment = Some(house_commitment);
        self.started_at = Some(Utc::now());
    }

    /// Append a move. Returns the new pending total.
    pub(crate) fn record_move(&mut self, wager: Amount, won: bool, gain: Amount) -> Result<Amount> {
        let pending = self
            .pending_spent
            .checked_add(wager)
            .ok_or_else(|| SessionError::InvalidAmount("pending total overflows".to_string()))?;
        let index = self.moves.len() as u64;

        self.moves.push(Move { index, wager, won });
        self.pending_spent = pending;
        self.total_gain = self.total_gain.checked_add(gain).unwrap_or(self.total_gain);
        self.set_status(if won {
            SessionStatus::Playing
        } else {
            SessionStatus::Busted
        });

        debug_assert_eq!(
            Amount::checked_sum(self.moves.iter().map(|m| m.wager)),
            Some(self.pending_spent)
        );
        Ok(pending)
    }

    /// Drop every secret and move; back to `Idle` with a fresh id.
    pub(crate) fn reset(&mut self) {
        let account = self.account;
        *self = Self::new(account);
    }

    /// Persisted form. `None` before a secret exists.
    pub fn to_record(&self) -> Option<SessionRecord> {
        let secret = self.user_secret.as_ref()?;
        Some(SessionRecord {
            user_secret: secret.to_hex(),
            house_commitment: self.captured_house_commitment,
            moves: self.wagers(),
        })
    }
}
