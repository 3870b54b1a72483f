//! fairhouse core - shared types, storage and the ledger interface for
//! commit-reveal wagering sessions
//!
//! The ledger itself is an external collaborator reached through the
//! [`Ledger`] trait; this crate only shadows its balances and stores what a
//! client needs to recover an interrupted session.

pub mod config;
pub mod error;
pub mod ledger;
pub mod signal;
pub mod storage;
pub mod types;
pub mod view;

pub use config::SessionConfig;
pub use error::{CoreError, LedgerError, Result};
pub use ledger::{
    GamePlayed, Ledger, LedgerResult, Receipt, SettleRequest, SettlementKind, TokenAllowance,
};
pub use signal::{BalanceChangeReason, BalanceChanged, BalanceSignal};
pub use storage::{MemorySessionStore, SessionRecord, SessionStore, SqliteSessionStore, Storage};
pub use types::{Account, Amount, Hash32};
pub use view::{BalanceSnapshot, LedgerView};
