// ABOUTME: What to build and what a build produced.
// ABOUTME: The fingerprint identifies a build input; the digest identifies its output.

use crate::config::RuntimeEnv;
use crate::types::{Digest, ImageRef, Revision};
use serde::Serialize;
use sha2::{Digest as _, Sha256};
use std::collections::BTreeMap;
use std::fmt;

/// Inputs of one image build. Constructed once per run and never modified.
#[derive(Clone, PartialEq, Eq)]
pub struct BuildSpec {
    revision: Revision,
    image: ImageRef,
    args: BTreeMap<String, String>,
}

impl BuildSpec {
    pub fn new(revision: Revision, image: ImageRef, args: &RuntimeEnv) -> Self {
        Self {
            revision,
            image,
            args: args
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }

    pub fn revision(&self) -> &Revision {
        &self.revision
    }

    pub fn image(&self) -> &ImageRef {
        &self.image
    }

    /// Build arguments in name order.
    pub fn args(&self) -> impl Iterator<Item = (&str, &str)> {
        self.args.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// SHA-256 over revision, image, and sorted build args, hex encoded.
    ///
    /// Equal specs have equal fingerprints. Fields are length-prefixed so
    /// that moving bytes between adjacent fields changes the hash.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        let mut field = |bytes: &[u8]| {
            hasher.update((bytes.len() as u64).to_be_bytes());
            hasher.update(bytes);
        };

        field(self.revision.as_str().as_bytes());
        field(self.image.to_string().as_bytes());
        for (name, value) in &self.args {
            field(name.as_bytes());
            field(value.as_bytes());
        }

        hasher
            .finalize()
            .iter()
            .map(|b| format!("{:02x}", b))
            .collect()
    }
}

impl fmt::Debug for BuildSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BuildSpec")
            .field("revision", &self.revision)
            .field("image", &self.image)
            .field("args", &self.args.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// A built image. Holding one means the build succeeded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Artifact {
    pub image: ImageRef,
    pub digest: Digest,
    pub fingerprint: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn spec(args: &[(&str, &str)]) -> BuildSpec {
        BuildSpec::new(
            Revision::new("abc123").unwrap(),
            ImageRef::parse("ghcr.io/acme/api:api-latest").unwrap(),
            &args.iter().copied().collect::<RuntimeEnv>(),
        )
    }

    #[test]
    fn fingerprint_ignores_insertion_order() {
        let a = spec(&[("NODE_ENV", "production"), ("APP_PORT", "3000")]);
        let b = spec(&[("APP_PORT", "3000"), ("NODE_ENV", "production")]);
        assert_eq!(a, b);
        assert_eq!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn fingerprint_tracks_arg_values() {
        let a = spec(&[("NODE_ENV", "production")]);
        let b = spec(&[("NODE_ENV", "staging")]);
        assert_ne!(a.fingerprint(), b.fingerprint());
        assert_eq!(a.fingerprint().len(), 64);
    }

    #[test]
    fn debug_omits_values() {
        let spec = spec(&[("DATABASE_PASSWORD", "hunter2")]);
        let debug = format!("{spec:?}");
        assert!(debug.contains("DATABASE_PASSWORD"));
        assert!(!debug.contains("hunter2"));
    }

    proptest! {
        #[test]
        fn shifting_bytes_between_fields_changes_fingerprint(
            name in "[A-Z]{1,8}",
            value in "[a-z]{1,8}",
        ) {
            let joined = format!("{}{}", name, value);
            let a = spec(&[(name.as_str(), value.as_str())]);
            let b = spec(&[(joined.as_str(), "")]);
            prop_assert_ne!(a.fingerprint(), b.fingerprint());
        }
    }
}
