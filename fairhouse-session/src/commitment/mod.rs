pub mod encoding;
pub mod scheme;

pub use encoding::encode_outcome_input;
pub use scheme::{keccak256, CommitmentScheme, KeccakCommitment};

use crate::error::{Result, SessionError};
use fairhouse_core::types::decode_hex;
use fairhouse_core::{Account, Hash32};
use rand::rngs::OsRng;
use rand::RngCore;
use std::fmt;

pub const USER_SECRET_LEN: usize = 32;

/// The player's 32-byte session secret. Never logged.
#[derive(Clone, PartialEq, Eq)]
pub struct UserSecret([u8; USER_SECRET_LEN]);

impl UserSecret {
    /// Fresh secret from the OS CSPRNG.
    pub fn generate() -> Self {
        let mut bytes = [0u8; USER_SECRET_LEN];
        OsRng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    pub const fn from_bytes(bytes: [u8; USER_SECRET_LEN]) -> Self {
        Self(bytes)
    }

    /// Parse `0x`-prefixed (or bare) hex of exactly 32 bytes.
    pub fn from_hex(input: &str) -> Result<Self> {
        let raw = decode_hex(input).map_err(SessionError::invalid_secret)?;
        let bytes: [u8; USER_SECRET_LEN] = raw.try_into().map_err(|raw: Vec<u8>| {
            SessionError::invalid_secret(format!(
                "expected {} bytes, got {}",
                USER_SECRET_LEN,
                raw.len()
            ))
        })?;
        Ok(Self(bytes))
    }

    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn commitment(&self) -> Hash32 {
        commitment_of(&self.0)
    }
}

impl fmt::Debug for UserSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("UserSecret(<redacted>)")
    }
}

/// The operator's secret: arbitrary bytes whose hash is the published house
/// commitment. Never logged.
#[derive(Clone, PartialEq, Eq)]
pub struct HouseSecret(Vec<u8>);

impl HouseSecret {
    pub fn new(bytes: Vec<u8>) -> Result<Self> {
        if bytes.is_empty() {
            return Err(SessionError::invalid_secret("house secret cannot be empty"));
        }
        Ok(Self(bytes))
    }

    /// Seed strings starting with `0x` are hex bytes; anything else is its
    /// UTF-8 bytes.
    pub fn from_seed(seed: &str) -> Result<Self> {
        if seed.starts_with("0x") {
            let bytes = decode_hex(seed).map_err(SessionError::invalid_secret)?;
            return Self::new(bytes);
        }
        Self::new(seed.as_bytes().to_vec())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn commitment(&self) -> Hash32 {
        commitment_of(&self.0)
    }
}

impl fmt::Debug for HouseSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("HouseSecret(<redacted>)")
    }
}

pub fn generate_secret() -> UserSecret {
    UserSecret::generate()
}

pub fn commitment_of(secret: &[u8]) -> Hash32 {
    KeccakCommitment::commit(secret)
}

/// Keccak hash of the encoded move preimage.
pub fn outcome_hash(
    user_secret: &UserSecret,
    house_secret: &HouseSecret,
    account: &Account,
    move_index: u64,
) -> Hash32 {
    keccak256(&encode_outcome_input(
        user_secret.as_bytes(),
        house_secret.as_bytes(),
        account,
        move_index,
    ))
}

/// A move wins when the lowest bit of its outcome hash is clear.
pub fn move_outcome(
    user_secret: &UserSecret,
    house_secret: &HouseSecret,
    account: &Account,
    move_index: u64,
) -> bool {
    is_winning_hash(&outcome_hash(user_secret, house_secret, account, move_index))
}

pub fn is_winning_hash(hash: &Hash32) -> bool {
    hash.as_bytes()[31] & 1 == 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn account() -> Account {
        Account::new([0xaa; 20])
    }

    fn house() -> HouseSecret {
        HouseSecret::from_seed("houseSeed").unwrap()
    }

    #[test]
    fn test_keccak_known_vectors() {
        assert_eq!(
            commitment_of(b"").to_hex(),
            "0xc5d2460186f7233c927e7db2dcc703c0e500b653ca82273b7bfad8045d85a470"
        );
        assert_eq!(
            commitment_of(&[0u8; 32]).to_hex(),
            "0x290decd9548b62a8d60345a988386fc84ba6bc95484008f6362f93160ef3e563"
        );
        assert_eq!(
            house().commitment().to_hex(),
            "0x2ea94c920beea3cbbca4a67272fd48ab82a1d634d6a757f6141d27ec172a78b2"
        );
    }

    #[test]
    fn test_commitment_is_stable() {
        let secret = UserSecret::from_bytes([1u8; 32]);
        assert_eq!(secret.commitment(), secret.clone().commitment());
        assert_eq!(
            secret.commitment().to_hex(),
            "0xcebc8882fecbec7fb80d2cf4b312bec018884c2d66667c67a90508214bd8bafc"
        );
        assert!(KeccakCommitment::verify(&secret.commitment(), secret.as_bytes()));
        assert!(!KeccakCommitment::verify(&secret.commitment(), b"wrong secret"));
    }

    #[test]
    fn test_move_outcome_known_vectors() {
        let secret = UserSecret::from_bytes([1u8; 32]);
        assert_eq!(
            outcome_hash(&secret, &house(), &account(), 0).to_hex(),
            "0x5359dde90bea5fbbd82a363b64ab31f3f6e8c4b69bea61f5ea5b763fd96dd3b0"
        );
        assert!(move_outcome(&secret, &house(), &account(), 0));

        // [0x05; 32] loses its first move.
        let loser = UserSecret::from_bytes([5u8; 32]);
        assert!(!move_outcome(&loser, &house(), &account(), 0));
    }

    #[test]
    fn test_move_outcome_is_deterministic_and_index_sensitive() {
        let secret = UserSecret::from_bytes([0x11; 32]);
        let outcomes: Vec<bool> = (0..4)
            .map(|i| move_outcome(&secret, &house(), &account(), i))
            .collect();
        let again: Vec<bool> = (0..4)
            .map(|i| move_outcome(&secret, &house(), &account(), i))
            .collect();
        assert_eq!(outcomes, again);
        assert_eq!(outcomes, vec![true, false, false, false]);
    }

    #[test]
    fn test_generated_secrets_do_not_collide() {
        let mut seen = HashSet::new();
        for _ in 0..10_000 {
            assert!(seen.insert(generate_secret().to_hex()));
        }
    }

    #[test]
    fn test_secret_hex_round_trip_and_format_errors() {
        let secret = UserSecret::from_bytes([0xab; 32]);
        assert_eq!(UserSecret::from_hex(&secret.to_hex()).unwrap(), secret);
        assert_eq!(UserSecret::from_hex(&"ab".repeat(32)).unwrap(), secret);

        for bad in ["", "0x", "0x1234", "0xzz", &format!("0x{}", "ab".repeat(33))] {
            assert!(matches!(
                UserSecret::from_hex(bad),
                Err(SessionError::InvalidSecretFormat(_))
            ));
        }
    }

    #[test]
    fn test_house_seed_parsing() {
        assert_eq!(HouseSecret::from_seed("0x0102").unwrap().as_bytes(), &[1, 2]);
        assert_eq!(
            HouseSecret::from_seed("house-seed").unwrap().as_bytes(),
            b"house-seed"
        );
        assert!(HouseSecret::from_seed("0xnothex").is_err());
        assert!(HouseSecret::from_seed("").is_err());
    }

    #[test]
    fn test_debug_output_is_redacted() {
        let secret = UserSecret::from_bytes([0xab; 32]);
        assert!(!format!("{:?}", secret).contains("abab"));
        assert!(!format!("{:?}", house()).contains("houseSeed"));
    }
}
