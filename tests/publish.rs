// ABOUTME: Build and publish through the container CLI and through in-memory fakes.
// ABOUTME: Checks idempotent publishing and that secrets never reach argv.

mod support;

use std::sync::Arc;
use std::sync::atomic::Ordering;

use hoist::build::{BuildSpec, Builder};
use hoist::config::RuntimeEnv;
use hoist::publish::{Credentials, Publisher};
use hoist::types::{ImageRef, Revision};
use support::{FakeBuilder, FakeRegistry, LocalImages, runtime_env};

fn spec(revision: &str, env: &RuntimeEnv) -> BuildSpec {
    BuildSpec::new(
        Revision::new(revision).unwrap(),
        ImageRef::parse("ghcr.io/acme/api:api-latest").unwrap(),
        env,
    )
}

fn credentials() -> Credentials {
    Credentials {
        server: Some("ghcr.io".to_string()),
        username: "acme-bot".to_string(),
        password: "ghp_registry-token".to_string(),
    }
}

mod idempotence {
    use super::*;

    #[tokio::test]
    async fn identical_build_is_published_once() {
        let images = LocalImages::default();
        let builder = FakeBuilder {
            images: images.clone(),
            ..FakeBuilder::default()
        };
        let registry = Arc::new(FakeRegistry::sharing(&images));

        let first = builder.build(&spec("abc123", &runtime_env())).await.unwrap();
        let published = Publisher::new(Arc::clone(&registry), Some(credentials()))
            .publish(&first)
            .await
            .unwrap();
        assert!(!published.already_present);

        let second = builder.build(&spec("abc123", &runtime_env())).await.unwrap();
        assert_eq!(first.digest, second.digest);
        let again = Publisher::new(Arc::clone(&registry), Some(credentials()))
            .publish(&second)
            .await
            .unwrap();

        assert!(again.already_present);
        assert_eq!(again.digest, published.digest);
        assert_eq!(registry.pushes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn changed_build_args_publish_a_new_digest() {
        let images = LocalImages::default();
        let builder = FakeBuilder {
            images: images.clone(),
            ..FakeBuilder::default()
        };
        let registry = Arc::new(FakeRegistry::sharing(&images));
        let publisher = Publisher::new(Arc::clone(&registry), None);

        let first = builder.build(&spec("abc123", &runtime_env())).await.unwrap();
        publisher.publish(&first).await.unwrap();

        let mut env = runtime_env();
        env.insert("APP_NAME", "acme-api");
        let second = builder.build(&spec("abc123", &env)).await.unwrap();
        let published = publisher.publish(&second).await.unwrap();

        assert_ne!(first.fingerprint, second.fingerprint);
        assert!(!published.already_present);
        assert_eq!(registry.pushes.load(Ordering::SeqCst), 2);
        assert_eq!(registry.logins.load(Ordering::SeqCst), 0);
    }
}

#[cfg(unix)]
mod container_cli {
    use super::*;
    use hoist::build::CliBuilder;
    use hoist::publish::CliRegistry;
    use std::os::unix::fs::PermissionsExt;
    use std::path::Path;

    const IMAGE_ID: &str = "sha256:4f53cda18c2baa0c0354bb5f9a3ecbe5ed12ab4d8e11ba873c2f11161202b945";

    /// A stand-in for the docker CLI that keeps its state next to itself.
    fn fake_cli(dir: &Path) -> String {
        let script = format!(
            r#"#!/bin/sh
state="$(dirname "$0")"
echo "$*" >> "$state/argv.log"
case "$1" in
  build) printf '%s' "$DATABASE_PASSWORD" > "$state/build-secret" ;;
  image) echo "{id}" ;;
  login) cat > "$state/login-stdin" ;;
  manifest)
    if [ -f "$state/pushed" ]; then
      printf '{{"SchemaV2Manifest":{{"config":{{"digest":"%s"}}}}}}' "$(cat "$state/pushed")"
    else
      echo "no such manifest: $4" >&2
      exit 1
    fi
    ;;
  push) echo "{id}" > "$state/pushed" ;;
esac
"#,
            id = IMAGE_ID
        );
        let path = dir.join("docker");
        std::fs::write(&path, script).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path.display().to_string()
    }

    // One test drives the CLI end to end so no other test in this binary
    // spawns processes while the script is being written.
    #[tokio::test]
    async fn builds_and_publishes_without_exposing_secrets() {
        let dir = tempfile::tempdir().unwrap();
        let cli = fake_cli(dir.path());
        let context = dir.path().join("app");
        std::fs::create_dir(&context).unwrap();

        let builder = CliBuilder::new(&cli, &context);
        let artifact = builder.build(&spec("abc123", &runtime_env())).await.unwrap();
        assert_eq!(artifact.digest.as_str(), IMAGE_ID);

        let registry = CliRegistry::new(&cli);
        let published = Publisher::new(registry.clone(), Some(credentials()))
            .publish(&artifact)
            .await
            .unwrap();
        assert!(!published.already_present);

        let again = Publisher::new(registry, Some(credentials()))
            .publish(&artifact)
            .await
            .unwrap();
        assert!(again.already_present);

        let argv = std::fs::read_to_string(dir.path().join("argv.log")).unwrap();
        assert!(argv.contains("--build-arg DATABASE_PASSWORD"));
        assert!(argv.contains("hoist.fingerprint="));
        assert_eq!(argv.lines().filter(|l| l.starts_with("push ")).count(), 1);
        assert!(!argv.contains("s3cret-password"));
        assert!(!argv.contains("ghp_registry-token"));

        let build_secret = std::fs::read_to_string(dir.path().join("build-secret")).unwrap();
        assert_eq!(build_secret, "s3cret-password");
        let login = std::fs::read_to_string(dir.path().join("login-stdin")).unwrap();
        assert_eq!(login, "ghp_registry-token");
    }
}
