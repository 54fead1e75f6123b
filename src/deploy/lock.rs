// ABOUTME: Serializes deployments to the same target, in process and across machines.
// ABOUTME: The remote lock is a JSON file created atomically under ~/.local/state/hoist/.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use crate::remote::{RemoteCommand, RemoteShell, quote};
use crate::types::ServiceName;

use super::DeployError;

const STATE_DIR: &str = ".local/state/hoist";

/// One async mutex per target, created on first use.
///
/// Runs against different targets never wait on each other.
#[derive(Debug, Default, Clone)]
pub struct TargetLocks {
    locks: Arc<Mutex<HashMap<String, Arc<AsyncMutex<()>>>>>,
}

impl TargetLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait until no other run in this process holds `key`.
    pub async fn acquire(&self, key: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock();
            Arc::clone(locks.entry(key.to_string()).or_default())
        };
        lock.lock_owned().await
    }
}

/// Information about who holds a deploy lock.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockInfo {
    pub holder: String,
    pub pid: u32,
    pub started_at: DateTime<Utc>,
    pub service: String,
    #[serde(default)]
    pub revision: Option<String>,
}

impl LockInfo {
    pub fn new(service: &ServiceName, revision: Option<&str>) -> Self {
        Self {
            holder: gethostname::gethostname().to_string_lossy().into_owned(),
            pid: std::process::id(),
            started_at: Utc::now(),
            service: service.to_string(),
            revision: revision.map(str::to_string),
        }
    }

    /// Locks older than an hour are assumed abandoned.
    pub fn is_stale(&self) -> bool {
        let age = Utc::now() - self.started_at;
        age.num_hours() >= 1
    }

    /// Uses $HOME so the path expands inside double quotes.
    pub fn lock_path(service: &ServiceName) -> String {
        format!("$HOME/{}/{}.lock", STATE_DIR, service)
    }
}

/// A held remote deploy lock. Release it explicitly; there is no async drop.
pub struct DeployLock<'a, S: RemoteShell> {
    shell: &'a S,
    service: ServiceName,
}

impl<S: RemoteShell> std::fmt::Debug for DeployLock<'_, S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeployLock")
            .field("service", &self.service)
            .finish()
    }
}

impl<'a, S: RemoteShell> DeployLock<'a, S> {
    /// Take the lock for `service` on the host behind `shell`.
    ///
    /// Creation uses noclobber so two deployers cannot both succeed. A
    /// stale, unreadable, or (with `force`) live lock is broken once.
    pub async fn acquire(
        shell: &'a S,
        service: &ServiceName,
        revision: Option<&str>,
        force: bool,
    ) -> Result<Self, DeployError> {
        let lock_path = LockInfo::lock_path(service);
        Self::ensure_state_dir(shell).await?;

        let info = LockInfo::new(service, revision);
        let json = serde_json::to_string(&info)
            .map_err(|e| DeployError::lock_error(format!("failed to serialize lock: {}", e)))?;
        let acquire = RemoteCommand::new(format!(
            "(set -C; echo {} > \"{}\") 2>/dev/null",
            quote(&json),
            lock_path
        ));

        if Self::exec(shell, &acquire).await?.success() {
            return Ok(Self::held(shell, service));
        }

        match Self::read_existing(shell, &lock_path).await? {
            Some(existing) if !force && !existing.is_stale() => {
                return Err(DeployError::LockHeld {
                    holder: existing.holder,
                    pid: existing.pid,
                    started_at: existing.started_at,
                });
            }
            Some(existing) => tracing::warn!(
                "breaking {} lock held by {} (pid {}) since {}",
                if force { "forced" } else { "stale" },
                existing.holder,
                existing.pid,
                existing.started_at
            ),
            None => tracing::warn!("lock file unreadable, breaking it"),
        }

        Self::exec(shell, &RemoteCommand::new(format!("rm -f \"{}\"", lock_path))).await?;
        if !Self::exec(shell, &acquire).await?.success() {
            return Err(DeployError::lock_error(
                "lock acquired by another process during break",
            ));
        }
        Ok(Self::held(shell, service))
    }

    fn held(shell: &'a S, service: &ServiceName) -> Self {
        Self {
            shell,
            service: service.clone(),
        }
    }

    async fn exec(
        shell: &S,
        command: &RemoteCommand,
    ) -> Result<crate::ssh::CommandOutput, DeployError> {
        shell
            .exec(command)
            .await
            .map_err(|e| DeployError::lock_error(e.to_string()))
    }

    async fn ensure_state_dir(shell: &S) -> Result<(), DeployError> {
        let output = Self::exec(
            shell,
            &RemoteCommand::new(format!("mkdir -p \"$HOME/{}\"", STATE_DIR)),
        )
        .await?;
        if !output.success() {
            return Err(DeployError::lock_error(format!(
                "failed to create state directory: {}",
                output.diagnostic()
            )));
        }
        Ok(())
    }

    /// `None` when the file cannot be read or parsed.
    async fn read_existing(shell: &S, lock_path: &str) -> Result<Option<LockInfo>, DeployError> {
        let output = Self::exec(shell, &RemoteCommand::new(format!("cat \"{}\"", lock_path))).await?;
        if !output.success() {
            return Ok(None);
        }
        Ok(serde_json::from_str(output.stdout.trim()).ok())
    }

    pub async fn release(self) -> Result<(), DeployError> {
        let lock_path = LockInfo::lock_path(&self.service);
        let output = Self::exec(self.shell, &RemoteCommand::new(format!("rm -f \"{}\"", lock_path))).await?;
        if !output.success() {
            return Err(DeployError::lock_error(output.diagnostic()));
        }
        Ok(())
    }
}
