// ABOUTME: Content digest of a built image.
// ABOUTME: Validates the sha256:<64 hex> form container registries use.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use thiserror::Error;

const ALGORITHM: &str = "sha256";
const HEX_LEN: usize = 64;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DigestError {
    #[error("digest must start with '{ALGORITHM}:': {0}")]
    UnsupportedAlgorithm(String),

    #[error("digest must have {HEX_LEN} hex characters, got {0}")]
    WrongLength(usize),

    #[error("invalid character in digest: '{0}'")]
    InvalidChar(char),
}

/// Immutable content address of an image. Holding one proves a build finished.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Digest(String);

impl Digest {
    pub fn parse(input: &str) -> Result<Self, DigestError> {
        let input = input.trim();
        let hex = input
            .strip_prefix("sha256:")
            .ok_or_else(|| DigestError::UnsupportedAlgorithm(input.to_string()))?;

        if hex.len() != HEX_LEN {
            return Err(DigestError::WrongLength(hex.len()));
        }

        if let Some(c) = hex
            .chars()
            .find(|c| !c.is_ascii_digit() && !('a'..='f').contains(c))
        {
            return Err(DigestError::InvalidChar(c));
        }

        Ok(Self(input.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The hex part without the algorithm prefix.
    pub fn hex(&self) -> &str {
        &self.0[ALGORITHM.len() + 1..]
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Serialize for Digest {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.0.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Digest {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Digest::parse(&s).map_err(serde::de::Error::custom)
    }
}
