//! Content keys and composite merge keys
//!
//! A content key names an immutable upload by the hash of its bytes.
//! Same bytes = same key = same path on disk.

use crate::error::{MapmergeError, MapmergeResult};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;

/// Number of hex characters in a content key
pub const KEY_LEN: usize = 32;

/// Separator between keys in a composite key's wire form
pub const KEY_SEPARATOR: char = '_';

/// Hash of an uploaded map (32 lowercase hex chars)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContentKey(String);

impl ContentKey {
    /// Validate a candidate key
    ///
    /// Only lowercase hex of exactly [`KEY_LEN`] characters is accepted.
    pub fn parse(candidate: &str) -> MapmergeResult<Self> {
        let well_formed = candidate.len() == KEY_LEN
            && candidate
                .bytes()
                .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b));

        if well_formed {
            Ok(Self(candidate.to_string()))
        } else {
            Err(MapmergeError::InvalidKey(candidate.to_string()))
        }
    }

    /// Derive the key for a byte payload
    ///
    /// SHA-256 truncated to the first 16 bytes. Not MD5: keys of an
    /// MD5-addressed upload tree do not carry over.
    pub fn for_bytes(bytes: &[u8]) -> Self {
        let digest = Sha256::digest(bytes);
        Self(hex::encode(&digest[..KEY_LEN / 2]))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Two-character shard directory for the upload store
    pub fn shard(&self) -> &str {
        &self.0[..2]
    }
}

impl FromStr for ContentKey {
    type Err = MapmergeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for ContentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Ordered list of at least two content keys naming a merge target
///
/// Order is significant: later keys win on primary-key conflicts, so
/// `[a, b]` and `[b, a]` are distinct targets.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CompositeKey(Vec<ContentKey>);

impl CompositeKey {
    /// Build from already-validated keys
    pub fn new(keys: Vec<ContentKey>) -> MapmergeResult<Self> {
        if keys.len() < 2 {
            return Err(MapmergeError::TooFewKeys);
        }
        Ok(Self(keys))
    }

    /// Parse the `a_b_c` wire form
    pub fn parse(joined: &str) -> MapmergeResult<Self> {
        if joined.is_empty() {
            return Err(MapmergeError::TooFewKeys);
        }

        let parts: Vec<&str> = joined.split(KEY_SEPARATOR).collect();
        if parts.len() < 2 {
            return Err(MapmergeError::TooFewKeys);
        }

        let keys = parts
            .into_iter()
            .map(ContentKey::parse)
            .collect::<MapmergeResult<Vec<_>>>()?;
        Self::new(keys)
    }

    pub fn keys(&self) -> &[ContentKey] {
        &self.0
    }

    /// Artifact file stem shared by the merged store and its render
    pub fn artifact_stem(&self) -> String {
        format!("merge_{}", self)
    }
}

impl FromStr for CompositeKey {
    type Err = MapmergeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for CompositeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, key) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, "{}", KEY_SEPARATOR)?;
            }
            write!(f, "{}", key)?;
        }
        Ok(())
    }
}
