// ABOUTME: Service names: the stem of container names, labels, and the remote lock file.
// ABOUTME: Restricted to a single DNS label so every one of those uses accepts it.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

const MAX_LEN: usize = 63;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ServiceNameError {
    #[error("service name is empty")]
    Empty,

    #[error("service name is {0} characters long; at most 63 are allowed")]
    TooLong(usize),

    #[error("service name may not begin or end with '-'")]
    HyphenAtEdge,

    #[error("service name must be lowercase, found '{0}'")]
    Uppercase(char),

    #[error("service name may only contain a-z, 0-9 and '-', found '{0}'")]
    InvalidChar(char),
}

/// A validated service name such as `billing-api`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ServiceName(String);

impl ServiceName {
    pub fn new(value: &str) -> Result<Self, ServiceNameError> {
        if value.is_empty() {
            return Err(ServiceNameError::Empty);
        }
        if value.len() > MAX_LEN {
            return Err(ServiceNameError::TooLong(value.len()));
        }
        if let Some(c) = value.chars().find(|c| !matches!(c, 'a'..='z' | '0'..='9' | '-')) {
            return Err(if c.is_ascii_uppercase() {
                ServiceNameError::Uppercase(c)
            } else {
                ServiceNameError::InvalidChar(c)
            });
        }
        if value.starts_with('-') || value.ends_with('-') {
            return Err(ServiceNameError::HyphenAtEdge);
        }
        Ok(Self(value.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for ServiceName {
    type Err = ServiceNameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl AsRef<str> for ServiceName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ServiceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Serialize for ServiceName {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for ServiceName {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::new(&raw).map_err(serde::de::Error::custom)
    }
}
