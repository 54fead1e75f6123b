// ABOUTME: Container CLI detection on the remote host.
// ABOUTME: Prefers docker, falls back to podman, unless the server config pins one.

use super::{RemoteCommand, RemoteShell, RuntimeType};
use crate::ssh;

/// Detect which container CLI the host has.
///
/// Returns `Ok(None)` when neither `docker` nor `podman` is on the PATH.
pub async fn detect_runtime<S: RemoteShell>(
    shell: &S,
    configured: Option<RuntimeType>,
) -> ssh::Result<Option<RuntimeType>> {
    if let Some(runtime) = configured {
        return Ok(Some(runtime));
    }

    for runtime in [RuntimeType::Docker, RuntimeType::Podman] {
        let probe = RemoteCommand::new(format!(
            "command -v {} >/dev/null 2>&1",
            runtime.binary()
        ));
        if shell.exec(&probe).await?.success() {
            tracing::debug!("detected {} on remote host", runtime);
            return Ok(Some(runtime));
        }
    }

    Ok(None)
}
