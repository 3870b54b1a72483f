//! The house side of the protocol: where the house secret comes from, and the
//! operator calls that publish its commitment.
//!
//! Whoever can read the house secret before settlement can predict every
//! outcome. Clients only ever see it through [`HouseSecretSource`], so the
//! secret can come from a configured seed or from an operator that reveals it
//! at settlement time without the session engine changing.

use crate::commitment::HouseSecret;
use crate::error::{Result, SessionError};
use fairhouse_core::{Account, Hash32, Ledger, Receipt};
use std::sync::Arc;

/// Environment variable holding the house seed.
pub const HOUSE_SEED_ENV: &str = "FAIRHOUSE_HOUSE_SEED";
pub const DEFAULT_HOUSE_SEED: &str = "house-seed";
pub const MAX_BPS: u32 = 10_000;

pub trait HouseSecretSource: Send + Sync {
    fn house_secret(&self) -> Result<HouseSecret>;
}

/// House secret parsed once from a seed string.
#[derive(Debug, Clone)]
pub struct ConfiguredHouseSecret {
    secret: HouseSecret,
}

impl ConfiguredHouseSecret {
    pub fn from_seed(seed: &str) -> Result<Self> {
        Ok(Self {
            secret: HouseSecret::from_seed(seed)?,
        })
    }

    /// Seed from [`HOUSE_SEED_ENV`], falling back to [`DEFAULT_HOUSE_SEED`].
    pub fn from_env() -> Result<Self> {
        match std::env::var(HOUSE_SEED_ENV) {
            Ok(seed) if !seed.is_empty() => Self::from_seed(&seed),
            _ => {
                tracing::warn!(
                    "{} not set, using the default house seed",
                    HOUSE_SEED_ENV
                );
                Self::from_seed(DEFAULT_HOUSE_SEED)
            }
        }
    }
}

impl HouseSecretSource for ConfiguredHouseSecret {
    fn house_secret(&self) -> Result<HouseSecret> {
        Ok(self.secret.clone())
    }
}

/// Commitment an operator would publish for `seed`. No ledger call.
pub fn house_commitment_preview(seed: &str) -> Result<Hash32> {
    Ok(HouseSecret::from_seed(seed)?.commitment())
}

/// Owner-only house configuration.
pub struct HouseOperator {
    ledger: Arc<dyn Ledger>,
    operator: Account,
}

impl HouseOperator {
    pub fn new(ledger: Arc<dyn Ledger>, operator: Account) -> Self {
        Self { ledger, operator }
    }

    /// Fails with `TransactionRejected` unless the operator owns the ledger.
    pub async fn ensure_owner(&self) -> Result<()> {
        let owner = self.ledger.owner().await?;
        if owner != self.operator {
            return Err(SessionError::TransactionRejected(format!(
                "{} is not the ledger owner ({})",
                self.operator, owner
            )));
        }
        Ok(())
    }

    /// Publish the commitment to `source`'s current secret.
    pub async fn publish_commitment(&self, source: &dyn HouseSecretSource) -> Result<Hash32> {
        let commitment = source.house_secret()?.commitment();
        self.set_current_house_commitment(commitment).await?;
        Ok(commitment)
    }

    pub async fn set_current_house_commitment(&self, commitment: Hash32) -> Result<Receipt> {
        if commitment.is_zero() {
            return Err(SessionError::InvalidAmount(
                "house commitment cannot be zero".to_string(),
            ));
        }
        let receipt = self
            .ledger
            .set_current_house_commitment(&self.operator, commitment)
            .await?;
        tracing::info!("Published house commitment {}", commitment);
        Ok(receipt)
    }

    pub async fn set_house_edge_bps(&self, bps: u32) -> Result<Receipt> {
        if bps > MAX_BPS {
            return Err(SessionError::InvalidAmount(format!(
                "house edge {} bps exceeds {}",
                bps, MAX_BPS
            )));
        }
        let receipt = self.ledger.set_house_edge_bps(&self.operator, bps).await?;
        tracing::info!("House edge set to {} bps", bps);
        Ok(receipt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulator::SimulatedHouse;

    #[test]
    fn test_preview_matches_commitment() {
        assert_eq!(
            house_commitment_preview("houseSeed").unwrap().to_hex(),
            "0x2ea94c920beea3cbbca4a67272fd48ab82a1d634d6a757f6141d27ec172a78b2"
        );
        assert_eq!(
            house_commitment_preview("0x0102").unwrap().to_hex(),
            "0x22ae6da6b482f9b1b19b0b897c3fd43884180a1c5ee361e1107a1bc635649dda"
        );
    }

    #[tokio::test]
    async fn test_operator_publishes_and_non_owner_is_rejected() {
        let owner = Account::new([0x0f; 20]);
        let stranger = Account::new([0x01; 20]);
        let house = Arc::new(SimulatedHouse::new(owner));
        let source = ConfiguredHouseSecret::from_seed("houseSeed").unwrap();

        let operator = HouseOperator::new(house.clone(), owner);
        operator.ensure_owner().await.unwrap();
        let published = operator.publish_commitment(&source).await.unwrap();
        assert_eq!(
            house.current_house_commitment().await.unwrap(),
            Some(published)
        );

        let intruder = HouseOperator::new(house.clone(), stranger);
        assert!(intruder.ensure_owner().await.is_err());
        assert!(matches!(
            intruder.set_house_edge_bps(100).await,
            Err(SessionError::TransactionRejected(_))
        ));
        assert!(matches!(
            operator.set_house_edge_bps(MAX_BPS + 1).await,
            Err(SessionError::InvalidAmount(_))
        ));
    }
}
