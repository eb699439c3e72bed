//! Content-address (CID) syntax checks for provenance metadata pointers.
//!
//! Only the pointer string is validated here; fetching and parsing the
//! document it points to happens off-ledger.

use crate::error::TokenizerError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// URL scheme accepted in front of a bare CID
pub const IPFS_SCHEME: &str = "ipfs://";

const BASE58_ALPHABET: &str = "123456789ABCDEFGHJKLMNPQRSTUVWXYZabcdefghijkmnopqrstuvwxyz";
const CID_V0_LEN: usize = 46;
const CID_V1_MIN_LEN: usize = 59;

/// CID generation of a content address
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CidVersion {
    /// base58btc sha2-256 multihash, always `Qm...`
    V0,
    /// multibase base32 lower-case, `b...`
    V1,
}

/// A validated content address in canonical (bare CID) form
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContentAddress {
    cid: String,
    version: CidVersion,
}

impl ContentAddress {
    /// Parse a pointer, accepting either a bare CID or `ipfs://<cid>`
    pub fn parse(pointer: &str) -> Result<Self, TokenizerError> {
        let cid = pointer.strip_prefix(IPFS_SCHEME).unwrap_or(pointer);

        let version = if is_cid_v0(cid) {
            CidVersion::V0
        } else if is_cid_v1(cid) {
            CidVersion::V1
        } else {
            return Err(TokenizerError::MalformedPointer(pointer.to_string()));
        };

        Ok(Self {
            cid: cid.to_string(),
            version,
        })
    }

    pub fn cid(&self) -> &str {
        &self.cid
    }

    pub fn version(&self) -> CidVersion {
        self.version
    }

    /// `ipfs://` URL for this address
    pub fn url(&self) -> String {
        format!("{}{}", IPFS_SCHEME, self.cid)
    }

    pub fn into_cid(self) -> String {
        self.cid
    }
}

impl fmt::Display for ContentAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.cid)
    }
}

fn is_cid_v0(cid: &str) -> bool {
    cid.len() == CID_V0_LEN
        && cid.starts_with("Qm")
        && cid.chars().all(|c| BASE58_ALPHABET.contains(c))
}

fn is_cid_v1(cid: &str) -> bool {
    let Some(body) = cid.strip_prefix('b') else {
        return false;
    };
    cid.len() >= CID_V1_MIN_LEN
        && body
            .chars()
            .all(|c| c.is_ascii_lowercase() || ('2'..='7').contains(&c))
}
