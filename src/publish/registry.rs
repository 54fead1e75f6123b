// ABOUTME: The registry seam and its error classification.
// ABOUTME: Implemented by the container CLI in production and by fakes in tests.

use crate::types::{Digest, ImageRef};
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Resolved registry login. Only ever held in memory for the duration of a run.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    /// Registry host; `None` means the CLI's default registry.
    pub server: Option<String>,
    pub username: String,
    pub password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("server", &self.server)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Error)]
pub enum PublishError {
    #[error("registry rejected credentials: {0}")]
    Authentication(String),

    #[error("could not reach registry: {0}")]
    Transport(String),

    #[error("registry unavailable: {0}")]
    Unavailable(String),

    #[error("invalid image reference {image}: {reason}")]
    InvalidReference { image: String, reason: String },
}

impl PublishError {
    /// Whether repeating the same call may succeed.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, PublishError::InvalidReference { .. })
    }

    /// Classify CLI stderr into an error kind.
    pub(crate) fn from_cli(subject: &str, stderr: &str) -> PublishError {
        let lower = stderr.to_lowercase();
        let message = stderr.trim().to_string();

        if lower.contains("invalid reference format") || lower.contains("invalid reference") {
            PublishError::InvalidReference {
                image: subject.to_string(),
                reason: message,
            }
        } else if lower.contains("unauthorized")
            || lower.contains("authentication required")
            || lower.contains("denied")
            || lower.contains("incorrect username or password")
        {
            PublishError::Authentication(message)
        } else if lower.contains("toomanyrequests")
            || lower.contains("service unavailable")
            || lower.contains("503")
            || lower.contains("502")
            || lower.contains("internal server error")
        {
            PublishError::Unavailable(message)
        } else {
            PublishError::Transport(message)
        }
    }
}

#[async_trait]
pub trait Registry: Send + Sync {
    async fn login(&self, credentials: &Credentials) -> Result<(), PublishError>;

    /// Digest the registry holds under `image`'s tag, if any.
    async fn remote_digest(&self, image: &ImageRef) -> Result<Option<Digest>, PublishError>;

    async fn push(&self, image: &ImageRef) -> Result<(), PublishError>;
}

#[async_trait]
impl<R: Registry + ?Sized> Registry for Arc<R> {
    async fn login(&self, credentials: &Credentials) -> Result<(), PublishError> {
        (**self).login(credentials).await
    }

    async fn remote_digest(&self, image: &ImageRef) -> Result<Option<Digest>, PublishError> {
        (**self).remote_digest(image).await
    }

    async fn push(&self, image: &ImageRef) -> Result<(), PublishError> {
        (**self).push(image).await
    }
}
