use crate::session::SessionStatus;
use fairhouse_core::{Amount, CoreError, Hash32, LedgerError};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, SessionError>;

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Core error: {0}")]
    Core(#[from] CoreError),

    #[error("Not connected: a signer is required for this account")]
    Connectivity,

    #[error("Insufficient funds: need {need}, have {available}")]
    InsufficientFunds { need: Amount, available: Amount },

    #[error("House commitment is not set; an operator must publish one first")]
    HouseCommitmentUnset,

    #[error("House commitment mismatch: session captured {captured}, house secret hashes to {computed}")]
    HouseCommitmentMismatch { captured: Hash32, computed: Hash32 },

    #[error("A session is already active for this account")]
    SessionAlreadyActive,

    #[error("Transaction rejected: {0}")]
    TransactionRejected(String),

    #[error("Ledger unavailable: {0}")]
    LedgerUnavailable(String),

    #[error("Invalid secret format: {0}")]
    InvalidSecretFormat(String),

    #[error("Secret does not match the commitment recorded on the ledger")]
    SecretMismatch,

    #[error("Invalid session state: {0}")]
    InvalidState(String),

    #[error("Operation already in progress ({0:?})")]
    OperationInProgress(SessionStatus),

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),
}

impl SessionError {
    pub fn invalid_state(msg: impl Into<String>) -> Self {
        Self::InvalidState(msg.into())
    }

    pub fn invalid_secret(msg: impl Into<String>) -> Self {
        Self::InvalidSecretFormat(msg.into())
    }

    /// True when retrying the same call later may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::LedgerUnavailable(_) | Self::OperationInProgress(_) | Self::Connectivity
        )
    }
}

impl From<LedgerError> for SessionError {
    fn from(err: LedgerError) -> Self {
        if err.is_active_session() {
            return Self::SessionAlreadyActive;
        }
        match err {
            LedgerError::NotConnected => Self::Connectivity,
            LedgerError::Reverted { reason } => Self::TransactionRejected(reason),
            LedgerError::Transport(msg) => Self::LedgerUnavailable(msg),
        }
    }
}
