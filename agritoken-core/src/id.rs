use curve25519_dalek::edwards::CompressedEdwardsY;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use std::fmt;
use std::ops::Deref;
use std::str::FromStr;

// AccountId identifies any party the contract deals with: admins, holders,
// the contract itself, its reserve account and unit classes.
// It is a 32 byte identifier, resembling a public key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct AccountId([u8; 32]);

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Short form: the first 6 bytes are enough to tell accounts apart in logs
        let prefix = hex::encode(&self.0[0..6]);
        write!(f, "acct:{}", prefix)
    }
}

impl Deref for AccountId {
    type Target = [u8; 32];

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl AsRef<[u8]> for AccountId {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// Error returned when parsing an `AccountId` from hex
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid account id: {0}")]
pub struct ParseAccountIdError(String);

impl FromStr for AccountId {
    type Err = ParseAccountIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw = s.strip_prefix("0x").unwrap_or(s);
        let bytes = hex::decode(raw).map_err(|e| ParseAccountIdError(e.to_string()))?;
        let array: [u8; 32] = bytes
            .try_into()
            .map_err(|b: Vec<u8>| ParseAccountIdError(format!("expected 32 bytes, got {}", b.len())))?;
        Ok(AccountId(array))
    }
}

// Human readable formats (deployment configs) carry ids as hex strings,
// binary formats carry the raw 32 bytes.
impl Serialize for AccountId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        if serializer.is_human_readable() {
            serializer.serialize_str(&self.to_hex())
        } else {
            self.0.serialize(serializer)
        }
    }
}

impl<'de> Deserialize<'de> for AccountId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        if deserializer.is_human_readable() {
            let s = String::deserialize(deserializer)?;
            s.parse().map_err(serde::de::Error::custom)
        } else {
            <[u8; 32]>::deserialize(deserializer).map(AccountId)
        }
    }
}

impl AccountId {
    pub fn new(bytes: [u8; 32]) -> Self {
        AccountId(bytes)
    }

    /// Get a reference to the internal bytes
    pub fn bytes(&self) -> &[u8] {
        &self.0
    }

    /// Full lower-case hex encoding
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Deterministic id for a human readable label.
    ///
    /// Handy for fixtures and deployment configs that name accounts instead of
    /// spelling out 64 hex characters.
    pub fn from_label(label: &str) -> Self {
        Self::derive(&[b"label", label.as_bytes()])
    }

    pub fn hash_seeds(seeds: &[&[u8]], bump: u8) -> [u8; 32] {
        let mut hasher = Sha256::new();

        // Domain separator
        hasher.update(b"AGRITOKEN_Account");

        for seed in seeds {
            hasher.update((seed.len() as u32).to_le_bytes());
            hasher.update(seed);
        }

        hasher.update([bump]);

        hasher.finalize().into()
    }

    /// Verify that a 32-byte array is not a valid point on the ed25519 curve.
    ///
    /// Derived accounts (the contract, its reserve, unit classes) are kept
    /// off-curve so no private key can ever sign for them.
    pub fn is_off_curve(bytes: &[u8; 32]) -> bool {
        let Ok(compressed) = CompressedEdwardsY::from_slice(bytes.as_ref()) else {
            return true;
        };
        compressed.decompress().is_none()
    }

    /// Try to find an off-curve id for the given seeds
    pub fn try_derive(seeds: &[&[u8]]) -> Option<(AccountId, u8)> {
        (0..=u8::MAX).find_map(|bump| {
            let id = Self::hash_seeds(seeds, bump);
            Self::is_off_curve(&id).then_some((AccountId(id), bump))
        })
    }

    /// Derive an off-curve id for the given seeds.
    ///
    /// Roughly half of all hashes are off-curve, so 256 bumps exhausting is
    /// not a practical concern; the all-zero id is returned if it ever happens.
    pub fn derive(seeds: &[&[u8]]) -> AccountId {
        Self::try_derive(seeds)
            .map(|(id, _)| id)
            .unwrap_or_default()
    }

    /// Whether this is the all-zero id
    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 32]
    }
}
