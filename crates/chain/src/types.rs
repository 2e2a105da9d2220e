use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha3::{Digest, Keccak256};
use std::fmt;
use std::str::FromStr;
use hex::{encode as hex_encode, decode as hex_decode};
use anyhow::Result;

/// Address is 20 bytes (last 20 bytes of Keccak-256 over the uncompressed pubkey body)
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Address(pub [u8; 20]);

impl Address {
    pub fn from_bytes(b: [u8; 20]) -> Self { Address(b) }
    pub fn as_bytes(&self) -> &[u8;20] { &self.0 }
    pub fn to_hex(&self) -> String { hex_encode(self.0) }
    pub fn is_zero(&self) -> bool { self.0 == [0u8; 20] }
    pub fn from_hex(s: &str) -> Result<Self, anyhow::Error> {
        let s = s.strip_prefix("0x").unwrap_or(s);
        let bytes = hex_decode(s)?;
        if bytes.len() != 20 { anyhow::bail!("invalid address length: {}", bytes.len()); }
        let mut arr = [0u8;20];
        arr.copy_from_slice(&bytes);
        Ok(Address(arr))
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", self.to_hex())
    }
}
impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Address").field(&self.to_hex()).finish()
    }
}
impl FromStr for Address {
    type Err = anyhow::Error;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Address::from_hex(s)
    }
}

/* --- serde serialize/deserialize for Address as hex string --- */
impl Serialize for Address {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where S: Serializer {
        serializer.serialize_str(&self.to_string())
    }
}
impl<'de> Deserialize<'de> for Address {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Address, D::Error>
    where D: Deserializer<'de> {
        let s = String::deserialize(deserializer)?;
        Address::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

/// Hash type: Keccak-256 digest wrapper (32 bytes).
/// Root-chain transaction hashes use the same width.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Hash(pub [u8; 32]);

impl Hash {
    pub fn from_bytes(b: [u8;32]) -> Self { Hash(b) }
    pub fn as_bytes(&self) -> &[u8;32] { &self.0 }
    pub fn to_hex(&self) -> String { hex_encode(self.0) }
    pub fn is_zero(&self) -> bool { self.0 == [0u8; 32] }

    pub fn keccak(data: &[u8]) -> Self {
        Hash(Keccak256::digest(data).into())
    }
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", self.to_hex())
    }
}
impl fmt::Debug for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Hash").field(&self.to_hex()).finish()
    }
}

impl FromStr for Hash {
    type Err = anyhow::Error;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.strip_prefix("0x").unwrap_or(s);
        let v = hex_decode(s)?;
        if v.len() != 32 { anyhow::bail!("invalid keccak-256 length: {}", v.len()); }
        let mut arr = [0u8;32];
        arr.copy_from_slice(&v);
        Ok(Hash(arr))
    }
}

/* serde impls for Hash as hex string */
impl Serialize for Hash {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where S: Serializer {
        serializer.serialize_str(&self.to_string())
    }
}
impl<'de> Deserialize<'de> for Hash {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Hash, D::Error>
    where D: Deserializer<'de> {
        let s = String::deserialize(deserializer)?;
        Hash::from_str(&s).map_err(serde::de::Error::custom)
    }
}

/// Stable validator identifier assigned by the root-chain staking contract.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ValidatorId(pub u64);

impl ValidatorId {
    pub fn to_be_bytes(self) -> [u8; 8] { self.0.to_be_bytes() }
}

impl fmt::Display for ValidatorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
impl fmt::Debug for ValidatorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ValidatorId({})", self.0)
    }
}
impl From<u64> for ValidatorId {
    fn from(v: u64) -> Self { ValidatorId(v) }
}

/// Uncompressed secp256k1 public key (0x04 ‖ X ‖ Y).
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct PubKey(pub Vec<u8>);

impl PubKey {
    pub const SIZE: usize = 65;

    pub fn as_bytes(&self) -> &[u8] { &self.0 }
    pub fn to_hex(&self) -> String { hex_encode(&self.0) }

    pub fn from_hex(s: &str) -> Result<Self, anyhow::Error> {
        let s = s.strip_prefix("0x").unwrap_or(s);
        Ok(PubKey(hex_decode(s)?))
    }

    /// Well-formed: right length, uncompressed tag, not all zero.
    pub fn is_valid(&self) -> bool {
        self.0.len() == Self::SIZE
            && self.0[0] == 0x04
            && self.0[1..].iter().any(|b| *b != 0)
    }

    /// Signer address derived from this key.
    pub fn address(&self) -> Address {
        let body = match self.0.first() {
            Some(0x04) if self.0.len() == Self::SIZE => &self.0[1..],
            _ => &self.0[..],
        };
        let digest = Keccak256::digest(body);
        let mut out = [0u8; 20];
        out.copy_from_slice(&digest[12..]);
        Address(out)
    }
}

impl fmt::Debug for PubKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("PubKey").field(&self.to_hex()).finish()
    }
}

impl Serialize for PubKey {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where S: Serializer {
        serializer.serialize_str(&format!("0x{}", self.to_hex()))
    }
}
impl<'de> Deserialize<'de> for PubKey {
    fn deserialize<D>(deserializer: D) -> std::result::Result<PubKey, D::Error>
    where D: Deserializer<'de> {
        let s = String::deserialize(deserializer)?;
        PubKey::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

/// Idempotency marker for an event observed on the root chain.
///
/// Two deliveries of the same (tx hash, log index) pair map to the same
/// sequence string.
pub fn sequence_id(tx_hash: &Hash, log_index: u64) -> String {
    format!("{}:{}", tx_hash, log_index)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_pubkey(seed: u8) -> PubKey {
        let mut raw = vec![0x04u8];
        raw.extend(std::iter::repeat(seed).take(64));
        PubKey(raw)
    }

    #[test]
    fn test_address_hex_roundtrip() {
        let a = Address::from_bytes([0xab; 20]);
        let s = a.to_string();
        assert!(s.starts_with("0x"));
        assert_eq!(Address::from_str(&s).unwrap(), a);
        assert!(Address::from_hex("0x1234").is_err());
    }

    #[test]
    fn test_pubkey_address_is_deterministic() {
        let pk = sample_pubkey(7);
        assert!(pk.is_valid());
        assert_eq!(pk.address(), sample_pubkey(7).address());
        assert_ne!(pk.address(), sample_pubkey(8).address());
    }

    #[test]
    fn test_pubkey_validity() {
        assert!(!PubKey(vec![0u8; 65]).is_valid());
        let mut zero_body = vec![0x04u8];
        zero_body.extend([0u8; 64]);
        assert!(!PubKey(zero_body).is_valid());
        assert!(!PubKey(vec![0x04, 1, 2]).is_valid());
    }

    #[test]
    fn test_sequence_id_distinguishes_log_index() {
        let h = Hash::keccak(b"tx");
        assert_ne!(sequence_id(&h, 0), sequence_id(&h, 1));
        assert_eq!(sequence_id(&h, 3), sequence_id(&h, 3));
    }

    #[test]
    fn test_hash_serde_json() {
        let h = Hash::keccak(b"abc");
        let js = serde_json::to_string(&h).unwrap();
        let back: Hash = serde_json::from_str(&js).unwrap();
        assert_eq!(back, h);
    }
}
