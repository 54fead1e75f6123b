// ABOUTME: Integration tests for validated identifiers and references.
// ABOUTME: Covers image references, digests, revisions, and service names.

use hoist::types::*;

mod image_ref_tests {
    use super::*;

    #[test]
    fn untagged_reference_stays_untagged() {
        let img = ImageRef::parse("ghcr.io/acme/api").unwrap();
        assert_eq!(img.registry(), Some("ghcr.io"));
        assert_eq!(img.name(), "acme/api");
        assert_eq!(img.tag(), None);
        assert_eq!(img.to_string(), "ghcr.io/acme/api");
    }

    #[test]
    fn tagged_replaces_tag_and_drops_digest() {
        let pinned = ImageRef::parse("ghcr.io/acme/api:v1@sha256:abc123").unwrap();
        let img = pinned.tagged("api-latest");
        assert_eq!(img.tag(), Some("api-latest"));
        assert!(img.digest().is_none());
        assert_eq!(img.to_string(), "ghcr.io/acme/api:api-latest");
    }

    #[test]
    fn registry_port_is_not_a_tag() {
        let img = ImageRef::parse("localhost:5000/api").unwrap();
        assert_eq!(img.registry(), Some("localhost:5000"));
        assert_eq!(img.name(), "api");
        assert_eq!(img.tag(), None);

        let tagged = ImageRef::parse("localhost:5000/api:api-latest").unwrap();
        assert_eq!(tagged.tag(), Some("api-latest"));
    }

    #[test]
    fn docker_hub_org_is_not_a_registry() {
        let img = ImageRef::parse("acme/api:api-latest").unwrap();
        assert!(img.registry().is_none());
        assert_eq!(img.repository(), "acme/api");
    }

    #[test]
    fn rejects_bad_input() {
        assert!(matches!(ImageRef::parse(""), Err(ParseImageRefError::Empty)));
        assert!(matches!(
            ImageRef::parse("ghcr.io/acme/api latest"),
            Err(ParseImageRefError::InvalidChar(' '))
        ));
        assert!(ImageRef::parse("ghcr.io/acme/api:").is_err());
    }
}

mod digest_tests {
    use super::*;

    fn valid() -> String {
        format!("sha256:{}", "0123456789abcdef".repeat(4))
    }

    #[test]
    fn parses_and_exposes_hex() {
        let digest = Digest::parse(&valid()).unwrap();
        assert_eq!(digest.as_str(), valid());
        assert_eq!(digest.hex(), "0123456789abcdef".repeat(4));
    }

    #[test]
    fn rejects_other_algorithms_and_lengths() {
        assert!(matches!(
            Digest::parse("md5:abc"),
            Err(DigestError::UnsupportedAlgorithm(_))
        ));
        assert_eq!(Digest::parse("sha256:abc"), Err(DigestError::WrongLength(3)));
        let upper = format!("sha256:{}", "A".repeat(64));
        assert_eq!(Digest::parse(&upper), Err(DigestError::InvalidChar('A')));
    }

    #[test]
    fn serializes_as_plain_string() {
        let digest = Digest::parse(&valid()).unwrap();
        let json = serde_json::to_string(&digest).unwrap();
        assert_eq!(json, format!("\"{}\"", valid()));
        let back: Digest = serde_json::from_str(&json).unwrap();
        assert_eq!(back, digest);
    }
}

mod revision_tests {
    use super::*;

    #[test]
    fn accepts_commit_shas_and_tags() {
        assert!(Revision::new("abc123").is_ok());
        assert!(Revision::new("9f86d081884c7d659a2feaa0c55ad015a3bf4f1b").is_ok());
        assert!(Revision::new("v1.2.3").is_ok());
    }

    #[test]
    fn short_form_is_twelve_lowercase_characters() {
        let rev = Revision::new("9F86D081884C7D659A2FEAA0").unwrap();
        assert_eq!(rev.short(), "9f86d081884c");
        assert_eq!(Revision::new("abc123").unwrap().short(), "abc123");
    }

    #[test]
    fn rejects_unsafe_characters() {
        assert_eq!(Revision::new("  "), Err(RevisionError::Empty));
        assert_eq!(Revision::new("feature/x"), Err(RevisionError::InvalidChar('/')));
        assert_eq!(Revision::new("a;rm -rf"), Err(RevisionError::InvalidChar(';')));
        assert_eq!(Revision::new(&"a".repeat(129)), Err(RevisionError::TooLong));
    }
}

mod service_name_tests {
    use super::*;

    #[test]
    fn valid_names() {
        assert!(ServiceName::new("api").is_ok());
        assert!(ServiceName::new("billing-api-2").is_ok());
    }

    #[test]
    fn invalid_names() {
        assert_eq!(ServiceName::new(""), Err(ServiceNameError::Empty));
        assert_eq!(ServiceName::new("Api"), Err(ServiceNameError::Uppercase('A')));
        assert_eq!(ServiceName::new("-api"), Err(ServiceNameError::HyphenAtEdge));
        assert_eq!(ServiceName::new("api-"), Err(ServiceNameError::HyphenAtEdge));
        assert_eq!(ServiceName::new("api_v2"), Err(ServiceNameError::InvalidChar('_')));
        assert_eq!(ServiceName::new(&"a".repeat(64)), Err(ServiceNameError::TooLong(64)));
    }

    #[test]
    fn parses_from_str() {
        let name: ServiceName = "worker".parse().unwrap();
        assert_eq!(name.as_ref(), "worker");
        assert_eq!(name.to_string(), "worker");
    }
}

mod id_tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn ids_compare_by_value() {
        let a = ContainerId::new("0ldc0ffee".to_string());
        let b = ContainerId::new("0ldc0ffee".to_string());
        assert_eq!(a, b);

        let set: HashSet<_> = [a, b].into_iter().collect();
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn short_form_truncates_long_ids() {
        let id = ContainerId::new("4f53cda18c2baa0c0354bb5f9a3ecbe5".to_string());
        assert_eq!(id.short(), "4f53cda18c2b");
    }
}
