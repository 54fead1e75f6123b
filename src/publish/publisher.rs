// ABOUTME: Publishes a built artifact, skipping the push when the registry already has it.
// ABOUTME: Logs in at most once per run and forgets the login on an authentication failure.

use std::sync::atomic::{AtomicBool, Ordering};

use super::{Credentials, PublishError, Registry};
use crate::build::Artifact;
use crate::types::{Digest, ImageRef};
use serde::Serialize;

/// What the remote host should pull.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PublishedRef {
    pub image: ImageRef,
    pub digest: Digest,
    /// The registry already held this digest; nothing was pushed.
    pub already_present: bool,
}

pub struct Publisher<R> {
    registry: R,
    credentials: Option<Credentials>,
    logged_in: AtomicBool,
}

impl<R: Registry> Publisher<R> {
    /// Without credentials, login is skipped (anonymous or local registry).
    pub fn new(registry: R, credentials: Option<Credentials>) -> Self {
        Self {
            registry,
            credentials,
            logged_in: AtomicBool::new(false),
        }
    }

    pub fn registry(&self) -> &R {
        &self.registry
    }

    /// Make `artifact` available under its tag.
    ///
    /// Calling this again for an artifact that is already published does not
    /// push and returns `already_present: true`.
    pub async fn publish(&self, artifact: &Artifact) -> Result<PublishedRef, PublishError> {
        self.ensure_login().await?;

        let remote = self
            .registry
            .remote_digest(&artifact.image)
            .await
            .inspect_err(|e| self.forget_login_on(e))?;

        if remote.as_ref() == Some(&artifact.digest) {
            tracing::info!("{} already published at {}", artifact.image, artifact.digest);
            return Ok(PublishedRef {
                image: artifact.image.clone(),
                digest: artifact.digest.clone(),
                already_present: true,
            });
        }

        tracing::info!("pushing {}", artifact.image);
        self.registry
            .push(&artifact.image)
            .await
            .inspect_err(|e| self.forget_login_on(e))?;

        Ok(PublishedRef {
            image: artifact.image.clone(),
            digest: artifact.digest.clone(),
            already_present: false,
        })
    }

    async fn ensure_login(&self) -> Result<(), PublishError> {
        let Some(ref credentials) = self.credentials else {
            return Ok(());
        };
        if self.logged_in.load(Ordering::Acquire) {
            return Ok(());
        }

        tracing::debug!(
            "logging in to {} as {}",
            credentials.server.as_deref().unwrap_or("default registry"),
            credentials.username
        );
        self.registry.login(credentials).await?;
        self.logged_in.store(true, Ordering::Release);
        Ok(())
    }

    fn forget_login_on(&self, error: &PublishError) {
        if matches!(error, PublishError::Authentication(_)) {
            self.logged_in.store(false, Ordering::Release);
        }
    }
}
