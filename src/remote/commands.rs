// ABOUTME: Container CLI command lines issued on the target host.
// ABOUTME: docker and podman share this syntax; only the binary differs.

use std::time::Duration;

use super::{RemoteCommand, RuntimeType, quote};
use crate::config::{RestartPolicy, RuntimeEnv};
use crate::publish::Credentials;
use crate::types::{ContainerId, ImageRef, ServiceName};

/// Label marking containers that belong to a service.
pub const SERVICE_LABEL: &str = "hoist.service";
pub const REVISION_LABEL: &str = "hoist.revision";
pub const DIGEST_LABEL: &str = "hoist.digest";

/// Remote directory for transient files (env files, lock files).
pub const STATE_DIR: &str = ".local/state/hoist";

/// Everything needed to start the new container.
#[derive(Debug, Clone)]
pub struct RunSpec<'a> {
    pub service: &'a ServiceName,
    pub name: String,
    pub image: &'a ImageRef,
    pub revision: &'a str,
    pub digest: &'a str,
    pub restart: &'a RestartPolicy,
    pub host_port: u16,
    pub container_port: u16,
    pub env: &'a RuntimeEnv,
}

/// Renders commands for one container CLI.
#[derive(Debug, Clone, Copy)]
pub struct ContainerCli {
    runtime: RuntimeType,
}

impl ContainerCli {
    pub fn new(runtime: RuntimeType) -> Self {
        Self { runtime }
    }

    pub fn runtime(&self) -> RuntimeType {
        self.runtime
    }

    fn bin(&self) -> &'static str {
        self.runtime.binary()
    }

    /// IDs of running containers that belong to the service or hold its
    /// host port, one per line. The port match catches a container started
    /// outside hoist, which would otherwise block the new one from binding.
    pub fn list_running(&self, service: &ServiceName, port: u16) -> RemoteCommand {
        RemoteCommand::new(format!(
            "{{ {bin} ps --quiet --no-trunc --filter {label}; {bin} ps --quiet --no-trunc --filter publish={port}; }} | sort -u",
            bin = self.bin(),
            label = quote(&format!("label={}={}", SERVICE_LABEL, service)),
        ))
    }

    pub fn stop(&self, ids: &[ContainerId], timeout: Duration) -> RemoteCommand {
        RemoteCommand::new(format!(
            "{} stop --time {} {}",
            self.bin(),
            timeout.as_secs(),
            join_ids(ids)
        ))
    }

    pub fn remove(&self, ids: &[ContainerId]) -> RemoteCommand {
        RemoteCommand::new(format!("{} rm --force {}", self.bin(), join_ids(ids)))
    }

    /// Log in with the password on stdin; the display form omits it.
    pub fn login(&self, credentials: &Credentials) -> RemoteCommand {
        let server = credentials
            .server
            .as_deref()
            .map(|s| format!(" {}", quote(s)))
            .unwrap_or_default();
        let login = format!(
            "{} login --username {} --password-stdin{}",
            self.bin(),
            quote(&credentials.username),
            server
        );
        RemoteCommand::redacted(
            format!("printf '%s' {} | {}", quote(&credentials.password), login),
            login,
        )
    }

    pub fn pull(&self, image: &ImageRef) -> RemoteCommand {
        RemoteCommand::new(format!("{} pull {}", self.bin(), quote(&image.to_string())))
    }

    /// Start the new container; prints its ID.
    ///
    /// Runtime variables go through a mode-0600 env file that is removed in
    /// the same command, so they never appear in argv or in logs.
    pub fn run(&self, spec: &RunSpec<'_>) -> Result<RemoteCommand, String> {
        let env_file = env_file_contents(spec.env)?;
        let env_path = format!("\"$HOME/{}/{}.env\"", STATE_DIR, spec.service);

        let run = format!(
            "{bin} run --detach --name {name} --label {service} --label {revision} --label {digest} --restart {restart} --publish {host}:{container} --env-file {env_path} {image}",
            bin = self.bin(),
            name = quote(&spec.name),
            service = quote(&format!("{}={}", SERVICE_LABEL, spec.service)),
            revision = quote(&format!("{}={}", REVISION_LABEL, spec.revision)),
            digest = quote(&format!("{}={}", DIGEST_LABEL, spec.digest)),
            restart = quote(&spec.restart.to_string()),
            host = spec.host_port,
            container = spec.container_port,
            image = quote(&spec.image.to_string()),
        );

        let script = format!(
            "mkdir -p \"$HOME/{state}\" && umask 077 && cat > {env_path} <<'HOIST_ENV'\n{env_file}HOIST_ENV\nstatus=0\n{run} || status=$?\nrm -f {env_path}\nexit $status",
            state = STATE_DIR,
        );

        Ok(RemoteCommand::redacted(script, run))
    }

    /// Prints `<status> <exit code>`, e.g. `running 0` or `exited 2`.
    pub fn inspect_state(&self, id: &ContainerId) -> RemoteCommand {
        RemoteCommand::new(format!(
            "{} inspect --format '{{{{.State.Status}}}} {{{{.State.ExitCode}}}}' {}",
            self.bin(),
            quote(id.as_str())
        ))
    }

    pub fn logs(&self, id: &ContainerId) -> RemoteCommand {
        RemoteCommand::new(format!("{} logs {} 2>&1", self.bin(), quote(id.as_str())))
    }
}

fn join_ids(ids: &[ContainerId]) -> String {
    ids.iter()
        .map(|id| quote(id.as_str()))
        .collect::<Vec<_>>()
        .join(" ")
}

/// `NAME=value` lines in the format `--env-file` reads.
///
/// The format has no quoting, so values spanning lines cannot be passed.
fn env_file_contents(env: &RuntimeEnv) -> Result<String, String> {
    let mut out = String::new();
    for (name, value) in env.iter() {
        if value.contains('\n') || value.contains('\r') {
            return Err(name.to_string());
        }
        out.push_str(name);
        out.push('=');
        out.push_str(value);
        out.push('\n');
    }
    Ok(out)
}

/// Parse container IDs from `ps --quiet` output.
pub(crate) fn parse_ids(stdout: &str) -> Vec<ContainerId> {
    stdout
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| ContainerId::new(line.to_string()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service() -> ServiceName {
        ServiceName::new("api").unwrap()
    }

    #[test]
    fn lists_by_service_label_and_host_port() {
        let cmd = ContainerCli::new(RuntimeType::Docker).list_running(&service(), 8080);
        assert_eq!(
            cmd.script(),
            "{ docker ps --quiet --no-trunc --filter label=hoist.service=api; \
             docker ps --quiet --no-trunc --filter publish=8080; } | sort -u"
        );
    }

    #[test]
    fn login_keeps_password_out_of_display() {
        let credentials = Credentials {
            server: Some("ghcr.io".to_string()),
            username: "bot".to_string(),
            password: "hunter2".to_string(),
        };
        let cmd = ContainerCli::new(RuntimeType::Podman).login(&credentials);
        assert!(cmd.script().contains("hunter2"));
        assert!(!cmd.display().contains("hunter2"));
        assert!(cmd.display().starts_with("podman login"));
    }

    #[test]
    fn run_writes_env_file_and_hides_values() {
        let service = service();
        let image = ImageRef::parse("ghcr.io/acme/api:api-latest").unwrap();
        let env: RuntimeEnv = [("DATABASE_PASSWORD", "hunter2"), ("APP_PORT", "3000")]
            .into_iter()
            .collect();
        let spec = RunSpec {
            service: &service,
            name: "api-abc123".to_string(),
            image: &image,
            revision: "abc123",
            digest: "sha256:00",
            restart: &RestartPolicy::UnlessStopped,
            host_port: 8080,
            container_port: 3000,
            env: &env,
        };

        let cmd = ContainerCli::new(RuntimeType::Docker).run(&spec).unwrap();
        assert!(cmd.script().contains("APP_PORT=3000\nDATABASE_PASSWORD=hunter2\n"));
        assert!(cmd.script().contains("--publish 8080:3000"));
        assert!(!cmd.display().contains("hunter2"));
        assert!(cmd.display().contains("--label hoist.revision=abc123"));
    }

    #[test]
    fn multiline_values_are_rejected() {
        let env: RuntimeEnv = [("CERT", "line1\nline2")].into_iter().collect();
        assert_eq!(env_file_contents(&env), Err("CERT".to_string()));
    }

    #[test]
    fn parses_ids_ignoring_blank_lines() {
        let ids = parse_ids("abc\n\n def \n");
        assert_eq!(ids.len(), 2);
        assert_eq!(ids[1].as_str(), "def");
    }
}
