use thiserror::Error;

pub type Result<T> = std::result::Result<T, CoreError>;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Invalid format: {0}")]
    InvalidFormat(String),

    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl CoreError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn invalid_format(msg: impl Into<String>) -> Self {
        Self::InvalidFormat(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }
}

/// Failures reported by the ledger collaborator.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    /// No signer is attached for the account.
    #[error("Not connected: no signer available")]
    NotConnected,

    /// The transaction was mined and reverted, or refused before submission.
    #[error("Transaction reverted: {reason}")]
    Reverted { reason: String },

    /// Transport failure; the outcome of a submitted transaction is unknown.
    #[error("Ledger transport error: {0}")]
    Transport(String),
}

/// Revert reason the ledger uses when an account already has a committed session.
pub const ACTIVE_SESSION_REASON: &str = "ACTIVE_SESSION";

/// Revert reason for settling an account that holds no committed session.
pub const NO_ACTIVE_SESSION_REASON: &str = "NO_ACTIVE_SESSION";

impl LedgerError {
    pub fn reverted(reason: impl Into<String>) -> Self {
        Self::Reverted {
            reason: reason.into(),
        }
    }

    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport(msg.into())
    }

    /// Revert reason with any `...: ` prefix the transport adds stripped.
    pub fn revert_reason(&self) -> Option<&str> {
        match self {
            Self::Reverted { reason } => {
                let reason = reason.rsplit(':').next().unwrap_or(reason);
                Some(reason.trim())
            }
            _ => None,
        }
    }

    pub fn is_active_session(&self) -> bool {
        self.revert_reason() == Some(ACTIVE_SESSION_REASON)
    }

    pub fn is_no_active_session(&self) -> bool {
        self.revert_reason() == Some(NO_ACTIVE_SESSION_REASON)
    }
}
