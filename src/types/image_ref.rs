// ABOUTME: Parsed container image references: [registry/]name[:tag][@digest].
// ABOUTME: The registry part decides which credentials the publisher logs in with.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseImageRefError {
    #[error("image reference is empty")]
    Empty,

    #[error("image reference contains '{0}'")]
    InvalidChar(char),

    #[error("malformed image reference: {0}")]
    InvalidFormat(String),
}

/// An image reference as written in hoist.yml or printed by the registry.
///
/// No `latest` is implied: `ghcr.io/acme/api` has no tag until
/// [`ImageRef::tagged`] gives it the deploy tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRef {
    registry: Option<String>,
    name: String,
    tag: Option<String>,
    digest: Option<String>,
}

/// `ghcr.io`, `registry:5000` and `localhost` are registries; `acme` is a namespace.
fn is_registry_host(component: &str) -> bool {
    component == "localhost" || component.contains('.') || component.contains(':')
}

fn allowed(c: char) -> bool {
    c.is_ascii_alphanumeric() || "/:.-_@".contains(c)
}

impl ImageRef {
    pub fn parse(input: &str) -> Result<Self, ParseImageRefError> {
        let input = input.trim();
        if input.is_empty() {
            return Err(ParseImageRefError::Empty);
        }
        if let Some(c) = input.chars().find(|&c| !allowed(c)) {
            return Err(ParseImageRefError::InvalidChar(c));
        }
        let malformed = || ParseImageRefError::InvalidFormat(input.to_string());

        let (rest, digest) = match input.split_once('@') {
            Some((_, digest)) if digest.is_empty() => return Err(malformed()),
            Some((rest, digest)) => (rest, Some(digest)),
            None => (input, None),
        };

        // The last ':' is a tag only if no '/' follows it; otherwise it is a registry port.
        let (path, tag) = match rest.rsplit_once(':') {
            Some((_, tag)) if tag.is_empty() => return Err(malformed()),
            Some((path, tag)) if !tag.contains('/') => (path, Some(tag)),
            _ => (rest, None),
        };

        let (registry, name) = match path.split_once('/') {
            Some((host, name)) if is_registry_host(host) => (Some(host), name),
            _ => (None, path),
        };
        if name.is_empty() || name.starts_with('/') || name.ends_with('/') {
            return Err(malformed());
        }

        Ok(Self {
            registry: registry.map(str::to_string),
            name: name.to_string(),
            tag: tag.map(str::to_string),
            digest: digest.map(str::to_string),
        })
    }

    /// The same repository under `tag`, with any digest pin dropped.
    pub fn tagged(&self, tag: &str) -> ImageRef {
        ImageRef {
            tag: Some(tag.to_string()),
            digest: None,
            ..self.clone()
        }
    }

    /// `registry/name`, or just `name` for Docker Hub references.
    pub fn repository(&self) -> String {
        self.registry
            .as_ref()
            .map_or_else(|| self.name.clone(), |registry| format!("{}/{}", registry, self.name))
    }

    pub fn registry(&self) -> Option<&str> {
        self.registry.as_deref()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn tag(&self) -> Option<&str> {
        self.tag.as_deref()
    }

    pub fn digest(&self) -> Option<&str> {
        self.digest.as_deref()
    }
}

impl FromStr for ImageRef {
    type Err = ParseImageRefError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for ImageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.repository())?;
        if let Some(tag) = &self.tag {
            write!(f, ":{tag}")?;
        }
        if let Some(digest) = &self.digest {
            write!(f, "@{digest}")?;
        }
        Ok(())
    }
}

impl Serialize for ImageRef {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ImageRef {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}
