use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha1::{Digest, Sha1};
use std::fmt;
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;
use std::str::FromStr;

/// Length of a hex-encoded SHA-1 digest.
pub const HASH_HEX_LEN: usize = 40;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HashParseError {
    #[error("object hash must be {HASH_HEX_LEN} hex characters, got {0}")]
    Length(usize),
    #[error("object hash contains non-lowercase-hex character {0:?}")]
    Char(char),
}

/// Lowercase hex SHA-1 digest naming an object in both stores.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObjectHash(String);

impl ObjectHash {
    pub fn parse(s: &str) -> Result<Self, HashParseError> {
        if s.len() != HASH_HEX_LEN {
            return Err(HashParseError::Length(s.len()));
        }
        if let Some(c) = s.chars().find(|c| !matches!(c, '0'..='9' | 'a'..='f')) {
            return Err(HashParseError::Char(c));
        }
        Ok(Self(s.to_owned()))
    }

    /// Digest of `bytes`.
    pub fn of_bytes(bytes: &[u8]) -> Self {
        Self(hex::encode(Sha1::digest(bytes)))
    }

    /// Stream a file through SHA-1.
    pub fn of_file(path: &Path) -> io::Result<Self> {
        let mut f = File::open(path)?;
        let mut hasher = Sha1::new();
        let mut buf = vec![0u8; 64 * 1024];
        loop {
            let n = f.read(&mut buf)?;
            if n == 0 {
                break;
            }
            hasher.update(&buf[..n]);
        }
        Ok(Self(hex::encode(hasher.finalize())))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Two-character prefix used as the shard directory.
    pub fn shard(&self) -> &str {
        &self.0[..2]
    }

    pub fn matches(&self, bytes: &[u8]) -> bool {
        Self::of_bytes(bytes) == *self
    }
}

impl fmt::Display for ObjectHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for ObjectHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectHash({})", self.0)
    }
}

impl FromStr for ObjectHash {
    type Err = HashParseError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for ObjectHash {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for ObjectHash {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        let s = String::deserialize(d)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_digest() {
        // sha1("hello")
        let h = ObjectHash::of_bytes(b"hello");
        assert_eq!(h.as_str(), "aaf4c61ddcc5e8a2dabede0f3b482cd9aea9434d");
        assert_eq!(h.shard(), "aa");
        assert!(h.matches(b"hello"));
        assert!(!h.matches(b"hello!"));
    }

    #[test]
    fn rejects_malformed() {
        assert_eq!(ObjectHash::parse("abc"), Err(HashParseError::Length(3)));
        let upper = "AAF4C61DDCC5E8A2DABEDE0F3B482CD9AEA9434D";
        assert_eq!(ObjectHash::parse(upper), Err(HashParseError::Char('A')));
        let bad = "zaf4c61ddcc5e8a2dabede0f3b482cd9aea9434d";
        assert_eq!(ObjectHash::parse(bad), Err(HashParseError::Char('z')));
    }
}
