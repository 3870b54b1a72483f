use crate::error::{CoreError, Result};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Integer token amount in the ledger's smallest unit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Amount(u128);

impl Amount {
    pub const ZERO: Amount = Amount(0);

    pub const fn from_units(units: u128) -> Self {
        Self(units)
    }

    pub const fn to_units(self) -> u128 {
        self.0
    }

    pub fn is_zero(self) -> bool {
        self.0 == 0
    }

    pub fn checked_add(self, other: Amount) -> Option<Amount> {
        self.0.checked_add(other.0).map(Amount)
    }

    pub fn checked_sub(self, other: Amount) -> Option<Amount> {
        self.0.checked_sub(other.0).map(Amount)
    }

    pub fn saturating_sub(self, other: Amount) -> Amount {
        Amount(self.0.saturating_sub(other.0))
    }

    /// Sum of `amounts`, or `None` on overflow.
    pub fn checked_sum<I: IntoIterator<Item = Amount>>(amounts: I) -> Option<Amount> {
        amounts
            .into_iter()
            .try_fold(Amount::ZERO, |acc, amount| acc.checked_add(amount))
    }

    /// `self * numerator / denominator`, rounding down.
    pub fn mul_div(self, numerator: u128, denominator: u128) -> Option<Amount> {
        if denominator == 0 {
            return None;
        }
        self.0
            .checked_mul(numerator)
            .map(|product| Amount(product / denominator))
    }

    /// 32-byte big-endian form, as a `uint256` word.
    pub fn to_word(self) -> [u8; 32] {
        let mut word = [0u8; 32];
        word[16..].copy_from_slice(&self.0.to_be_bytes());
        word
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Amount {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        s.trim()
            .parse::<u128>()
            .map(Amount)
            .map_err(|e| CoreError::invalid_format(format!("Invalid amount '{}': {}", s, e)))
    }
}

/// 20-byte ledger account address. Displayed and keyed in lower-case hex.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Account([u8; 20]);

impl Account {
    pub const fn new(bytes: [u8; 20]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    /// Address left-padded to a 32-byte `address` word.
    pub fn to_word(&self) -> [u8; 32] {
        let mut word = [0u8; 32];
        word[12..].copy_from_slice(&self.0);
        word
    }
}

impl fmt::Display for Account {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for Account {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Account({})", self)
    }
}

impl FromStr for Account {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        let bytes = decode_fixed::<20>(s)
            .map_err(|e| CoreError::invalid_format(format!("Invalid account '{}': {}", s, e)))?;
        Ok(Self(bytes))
    }
}

impl Serialize for Account {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Account {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// 32-byte hash (commitments, outcome hashes, transaction hashes).
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Hash32([u8; 32]);

impl Hash32 {
    pub const ZERO: Hash32 = Hash32([0u8; 32]);

    pub const fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0.iter().all(|b| *b == 0)
    }

    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }
}

impl fmt::Display for Hash32 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Hash32 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hash32({})", self.to_hex())
    }
}

impl FromStr for Hash32 {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        let bytes = decode_fixed::<32>(s)
            .map_err(|e| CoreError::invalid_format(format!("Invalid hash '{}': {}", s, e)))?;
        Ok(Self(bytes))
    }
}

impl Serialize for Hash32 {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Hash32 {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Strip an optional `0x` prefix and decode exactly `N` bytes of hex.
pub fn decode_fixed<const N: usize>(s: &str) -> std::result::Result<[u8; N], String> {
    let raw = decode_hex(s)?;
    raw.try_into()
        .map_err(|raw: Vec<u8>| format!("expected {} bytes, got {}", N, raw.len()))
}

/// Strip an optional `0x` prefix and decode hex of any non-zero length.
pub fn decode_hex(s: &str) -> std::result::Result<Vec<u8>, String> {
    let trimmed = s.trim();
    let digits = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);
    if digits.is_empty() {
        return Err("empty hex string".to_string());
    }
    hex::decode(digits).map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_account_is_lower_cased() {
        let account: Account = "0xAbCdEf0123456789aBcDeF0123456789AbCdEf01".parse().unwrap();
        assert_eq!(
            account.to_string(),
            "0xabcdef0123456789abcdef0123456789abcdef01"
        );
    }

    #[test]
    fn test_account_rejects_wrong_length() {
        assert!("0x1234".parse::<Account>().is_err());
        assert!("not-hex".parse::<Account>().is_err());
    }

    #[test]
    fn test_hash_zero() {
        assert!(Hash32::ZERO.is_zero());
        let parsed: Hash32 = format!("0x{}", "00".repeat(32)).parse().unwrap();
        assert!(parsed.is_zero());
    }

    #[test]
    fn test_amount_words_and_math() {
        let amount = Amount::from_units(258);
        let word = amount.to_word();
        assert_eq!(word[30], 1);
        assert_eq!(word[31], 2);
        assert!(word[..30].iter().all(|b| *b == 0));

        let total = Amount::checked_sum([Amount::from_units(10), Amount::from_units(5)]).unwrap();
        assert_eq!(total, Amount::from_units(15));
        assert_eq!(
            Amount::checked_sum([Amount::from_units(u128::MAX), Amount::from_units(1)]),
            None
        );
        assert_eq!(Amount::from_units(3).saturating_sub(total), Amount::ZERO);
        assert_eq!(
            Amount::from_units(200).mul_div(9500, 10_000),
            Some(Amount::from_units(190))
        );
    }

    #[test]
    fn test_serde_round_trip_as_strings() {
        let account: Account = "0x00000000000000000000000000000000000000aa".parse().unwrap();
        let json = serde_json::to_string(&account).unwrap();
        assert_eq!(json, "\"0x00000000000000000000000000000000000000aa\"");
        let back: Account = serde_json::from_str(&json).unwrap();
        assert_eq!(back, account);
    }
}
