//! Commit-reveal wagering sessions against a house ledger
//!
//! A player commits to a secret on the ledger, plays any number of moves
//! locally (each outcome derived from both the player's and the house's
//! secret), then reveals everything in a single settlement the ledger can
//! verify.

pub mod commitment;
pub mod engine;
pub mod error;
pub mod funds;
pub mod house;
pub mod payout;
pub mod session;
pub mod simulator;

pub use commitment::{
    commitment_of, generate_secret, move_outcome, CommitmentScheme, HouseSecret,
    KeccakCommitment, UserSecret,
};
pub use engine::{
    MoveOutcome, RecoverOutcome, RecoverySource, RoundOutcome, SessionEngine, SettleOutcome,
    Settlement, StartOutcome,
};
pub use error::{Result, SessionError};
pub use funds::{ApprovalOutcome, DepositOutcome, Funds};
pub use house::{
    house_commitment_preview, ConfiguredHouseSecret, HouseOperator, HouseSecretSource,
    DEFAULT_HOUSE_SEED, HOUSE_SEED_ENV,
};
pub use payout::{projected_return, HouseRates};
pub use session::{Move, Session, SessionStatus};
pub use simulator::{HouseState, SimulatedHouse};
