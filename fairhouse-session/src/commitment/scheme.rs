use fairhouse_core::Hash32;
use sha3::{Digest, Keccak256};

/// Hiding, binding commitment to an opaque byte secret.
pub trait CommitmentScheme {
    fn commit(secret: &[u8]) -> Hash32;

    fn verify(commitment: &Hash32, secret: &[u8]) -> bool {
        Self::commit(secret) == *commitment
    }
}

/// `keccak256(secret)`, the commitment the ledger checks on reveal.
#[derive(Debug, Clone, Copy, Default)]
pub struct KeccakCommitment;

impl CommitmentScheme for KeccakCommitment {
    fn commit(secret: &[u8]) -> Hash32 {
        keccak256(secret)
    }
}

pub fn keccak256(data: &[u8]) -> Hash32 {
    let digest = Keccak256::digest(data);
    let mut out = [0u8; 32];
    out.copy_from_slice(&digest);
    Hash32::new(out)
}
