// ABOUTME: Test support utilities.
// ABOUTME: In-memory builder, registry, ledger, and scripted remote shells for integration tests.

// Each test binary only uses some of these helpers.
#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{BTreeSet, HashMap, VecDeque};
use std::sync::Arc;
use std::sync::Once;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use hoist::build::{Artifact, BuildError, BuildSpec, Builder};
use hoist::config::{RestartPolicy, RuntimeEnv};
use hoist::deploy::{DeployRequest, DeploySettings};
use hoist::publish::{Credentials, PublishError, Registry};
use hoist::remote::{
    Connector, DeploymentTarget, ExecutorSettings, RemoteCommand, RemoteShell,
};
use hoist::ssh::{self, CommandOutput};
use hoist::startup::{Ledger, LedgerError, LedgerKind};
use hoist::types::{Digest, ImageRef, Revision, ServiceName};

static TRACING_INIT: Once = Once::new();

/// Initialize tracing for tests. Safe to call multiple times.
pub fn init_tracing() {
    TRACING_INIT.call_once(|| {
        use tracing_subscriber::EnvFilter;
        let filter = EnvFilter::from_default_env()
            .add_directive("hoist=debug".parse().unwrap());
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init()
            .ok();
    });
}

pub fn digest(c: char) -> Digest {
    Digest::parse(&format!("sha256:{}", c.to_string().repeat(64))).unwrap()
}

pub fn output(exit_code: u32, stdout: &str) -> CommandOutput {
    CommandOutput {
        exit_code,
        stdout: stdout.to_string(),
        stderr: String::new(),
    }
}

pub fn failure(stderr: &str) -> CommandOutput {
    CommandOutput {
        exit_code: 1,
        stdout: String::new(),
        stderr: stderr.to_string(),
    }
}

// =============================================================================
// Builder and registry
// =============================================================================

/// Images built locally, by tag. Shared by the fake builder and registry.
#[derive(Debug, Default, Clone)]
pub struct LocalImages(Arc<Mutex<HashMap<String, Digest>>>);

impl LocalImages {
    pub fn get(&self, image: &ImageRef) -> Option<Digest> {
        self.0.lock().get(&image.to_string()).cloned()
    }
}

/// Registry pushes and host commands from every run, in the order they happened.
#[derive(Debug, Default, Clone)]
pub struct Timeline(Arc<Mutex<Vec<String>>>);

impl Timeline {
    pub fn record(&self, event: impl Into<String>) {
        self.0.lock().push(event.into());
    }

    pub fn events(&self) -> Vec<String> {
        self.0.lock().clone()
    }
}

/// Builds by hashing the spec: identical specs give identical digests.
#[derive(Debug, Default)]
pub struct FakeBuilder {
    pub images: LocalImages,
    pub builds: AtomicUsize,
    pub fail_with: Mutex<Option<String>>,
}

#[async_trait]
impl Builder for FakeBuilder {
    async fn build(&self, spec: &BuildSpec) -> Result<Artifact, BuildError> {
        self.builds.fetch_add(1, Ordering::SeqCst);
        if let Some(stderr_tail) = self.fail_with.lock().clone() {
            return Err(BuildError::BuildFailed {
                status: "exit status: 1".to_string(),
                stderr_tail,
            });
        }
        let digest = Digest::parse(&format!("sha256:{}", spec.fingerprint())).unwrap();
        self.images
            .0
            .lock()
            .insert(spec.image().to_string(), digest.clone());
        Ok(Artifact {
            image: spec.image().clone(),
            digest,
            fingerprint: spec.fingerprint(),
        })
    }
}

/// Registry holding digests by tag; pushes copy from the local images.
#[derive(Debug, Default)]
pub struct FakeRegistry {
    pub local: LocalImages,
    pub remote: Mutex<HashMap<String, Digest>>,
    pub logins: AtomicUsize,
    pub pushes: AtomicUsize,
    /// Errors returned by the next pushes, in order.
    pub push_errors: Mutex<VecDeque<PublishError>>,
    pub timeline: Timeline,
}

impl FakeRegistry {
    pub fn sharing(local: &LocalImages) -> Self {
        Self {
            local: local.clone(),
            ..Self::default()
        }
    }
}

#[async_trait]
impl Registry for FakeRegistry {
    async fn login(&self, _credentials: &Credentials) -> Result<(), PublishError> {
        self.logins.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn remote_digest(&self, image: &ImageRef) -> Result<Option<Digest>, PublishError> {
        Ok(self.remote.lock().get(&image.to_string()).cloned())
    }

    async fn push(&self, image: &ImageRef) -> Result<(), PublishError> {
        if let Some(error) = self.push_errors.lock().pop_front() {
            return Err(error);
        }
        let digest = self.local.get(image).ok_or_else(|| PublishError::InvalidReference {
            image: image.to_string(),
            reason: "no such local image".to_string(),
        })?;
        self.pushes.fetch_add(1, Ordering::SeqCst);
        self.timeline.record(format!("push {}", digest));
        self.remote.lock().insert(image.to_string(), digest);
        Ok(())
    }
}

// =============================================================================
// Remote shell
// =============================================================================

/// Canned response for scripts containing a pattern. First match wins.
#[derive(Debug, Clone)]
pub struct Rule {
    pub pattern: String,
    pub response: Result<CommandOutput, String>,
}

/// A host simulated by pattern-matched responses.
///
/// Unmatched commands succeed with empty output.
#[derive(Debug, Default, Clone)]
pub struct Host {
    rules: Vec<Rule>,
    delay: Duration,
}

impl Host {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(mut self, pattern: &str, response: CommandOutput) -> Self {
        self.rules.push(Rule {
            pattern: pattern.to_string(),
            response: Ok(response),
        });
        self
    }

    pub fn transport_error(mut self, pattern: &str, message: &str) -> Self {
        self.rules.push(Rule {
            pattern: pattern.to_string(),
            response: Err(message.to_string()),
        });
        self
    }

    /// Sleep this long in every command, to widen race windows.
    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// A docker host running `old` for the service, where the new container
    /// starts as `new` and writes `log`. Rules added before this one win.
    pub fn docker(self, old: Option<&str>, new: &str, log: &str) -> Self {
        self.on("command -v docker", output(0, "/usr/bin/docker\n"))
            .on("docker ps --quiet", output(0, &old.map(|id| format!("{id}\n")).unwrap_or_default()))
            .on("docker run --detach", output(0, &format!("{new}\n")))
            .on("docker inspect --format", output(0, "running 0\n"))
            .on("docker logs", output(0, log))
    }

    fn respond(&self, script: &str) -> ssh::Result<CommandOutput> {
        for rule in &self.rules {
            if script.contains(&rule.pattern) {
                return match &rule.response {
                    Ok(output) => Ok(output.clone()),
                    Err(message) => Err(ssh::Error::Exec(message.clone())),
                };
            }
        }
        Ok(output(0, ""))
    }
}

/// Everything the fake connector saw, shared across its shells.
#[derive(Debug, Default)]
pub struct Activity {
    /// Display form of every command, in order.
    pub commands: Mutex<Vec<String>>,
    /// Full scripts, in order.
    pub scripts: Mutex<Vec<String>>,
    pub connects: AtomicUsize,
    pub closes: AtomicUsize,
    open: AtomicUsize,
    /// Most sessions open at the same time.
    pub max_open: AtomicUsize,
    pub timeline: Timeline,
}

impl Activity {
    pub fn commands(&self) -> Vec<String> {
        self.commands.lock().clone()
    }

    pub fn ran(&self, pattern: &str) -> bool {
        self.commands().iter().any(|c| c.contains(pattern))
    }

    pub fn position(&self, pattern: &str) -> Option<usize> {
        self.commands().iter().position(|c| c.contains(pattern))
    }
}

pub struct ScriptedShell {
    host: Host,
    activity: Arc<Activity>,
}

impl ScriptedShell {
    pub fn new(host: Host) -> Self {
        Self {
            host,
            activity: Arc::new(Activity::default()),
        }
    }

    pub fn activity(&self) -> Arc<Activity> {
        Arc::clone(&self.activity)
    }
}

#[async_trait]
impl RemoteShell for ScriptedShell {
    async fn exec(&self, command: &RemoteCommand) -> ssh::Result<CommandOutput> {
        self.activity.commands.lock().push(command.display().to_string());
        self.activity.scripts.lock().push(command.script().to_string());
        self.activity.timeline.record(command.display());
        if !self.host.delay.is_zero() {
            tokio::time::sleep(self.host.delay).await;
        }
        self.host.respond(command.script())
    }

    async fn close(self) -> ssh::Result<()> {
        self.activity.closes.fetch_add(1, Ordering::SeqCst);
        self.activity.open.fetch_sub(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Hands out scripted shells, one host definition per target host name.
#[derive(Default)]
pub struct FakeConnector {
    hosts: HashMap<String, Host>,
    pub activity: Arc<Activity>,
    pub refuse: bool,
}

impl FakeConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn host(mut self, name: &str, host: Host) -> Self {
        self.hosts.insert(name.to_string(), host);
        self
    }

    /// Record every command on `timeline` as well.
    pub fn timeline(mut self, timeline: &Timeline) -> Self {
        self.activity = Arc::new(Activity {
            timeline: timeline.clone(),
            ..Activity::default()
        });
        self
    }

    pub fn refusing() -> Self {
        Self {
            refuse: true,
            ..Self::default()
        }
    }
}

#[async_trait]
impl Connector for FakeConnector {
    type Shell = ScriptedShell;

    async fn connect(&self, target: &DeploymentTarget) -> ssh::Result<ScriptedShell> {
        if self.refuse {
            return Err(ssh::Error::Connect {
                address: format!("{}:{}", target.host, target.port),
                reason: "connection refused".to_string(),
            });
        }
        let host = self.hosts.get(&target.host).cloned().unwrap_or_default();
        self.activity.connects.fetch_add(1, Ordering::SeqCst);
        let open = self.activity.open.fetch_add(1, Ordering::SeqCst) + 1;
        self.activity.max_open.fetch_max(open, Ordering::SeqCst);
        Ok(ScriptedShell {
            host,
            activity: Arc::clone(&self.activity),
        })
    }
}

// =============================================================================
// Requests
// =============================================================================

pub fn target(host: &str) -> DeploymentTarget {
    DeploymentTarget {
        host: host.to_string(),
        port: 22,
        user: "deploy".to_string(),
        credential: None,
        known_hosts: None,
        trust_first_connection: true,
        runtime: None,
        current_container: None,
    }
}

pub fn runtime_env() -> RuntimeEnv {
    [
        ("NODE_ENV", "production"),
        ("APP_PORT", "3000"),
        ("DATABASE_HOST", "db.internal"),
        ("DATABASE_PASSWORD", "s3cret-password"),
    ]
    .into_iter()
    .collect()
}

pub fn executor_settings(revision: &str) -> ExecutorSettings {
    ExecutorSettings {
        service: ServiceName::new("api").unwrap(),
        revision: Revision::new(revision).unwrap(),
        restart: RestartPolicy::UnlessStopped,
        stop_timeout: Duration::from_secs(10),
        registry: None,
        env: runtime_env(),
    }
}

pub fn request(revision: &str, host: &str) -> DeployRequest {
    DeployRequest {
        revision: Revision::new(revision).unwrap(),
        image: ImageRef::parse("ghcr.io/acme/api:api-latest").unwrap(),
        build_args: runtime_env(),
        credentials: None,
        retry: hoist::config::RetryPolicy::immediate(3),
        deploy: DeploySettings {
            target: target(host),
            executor: executor_settings(revision),
            port: 8080,
            startup_timeout: Duration::from_millis(200),
            startup_interval: Duration::from_millis(5),
            force: false,
        },
    }
}

pub const STARTED_LOG: &str = "hoist-startup step=run-migrations status=ok applied 2 (already applied 0)\n\
hoist-startup step=run-seed status=ok applied 1 (already applied 0)\n\
hoist-startup step=start-process status=ok node dist/main.js\n\
Nest application successfully started\n";

pub const DB_UNREACHABLE_LOG: &str = "hoist-startup step=run-migrations status=failed ledger: psql: error: connection to server at \"db.internal\" failed: Connection refused\n";

// =============================================================================
// Ledger
// =============================================================================

/// Ledger in memory, optionally failing on one key.
#[derive(Debug, Default)]
pub struct MemoryLedger {
    pub recorded: Mutex<HashMap<&'static str, BTreeSet<String>>>,
    /// Keys applied, in order, across both kinds.
    pub applied_log: Mutex<Vec<String>>,
    pub fail_on: Option<String>,
    pub unreachable: bool,
}

impl MemoryLedger {
    pub fn failing_on(key: &str) -> Self {
        Self {
            fail_on: Some(key.to_string()),
            ..Self::default()
        }
    }

    pub fn unreachable() -> Self {
        Self {
            unreachable: true,
            ..Self::default()
        }
    }

    fn check(&self) -> Result<(), LedgerError> {
        if self.unreachable {
            return Err(LedgerError::Query {
                action: "connecting".to_string(),
                stderr: "connection refused".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl Ledger for MemoryLedger {
    async fn prepare(&self, kind: LedgerKind) -> Result<(), LedgerError> {
        self.check()?;
        self.recorded.lock().entry(kind.table()).or_default();
        Ok(())
    }

    async fn applied(&self, kind: LedgerKind) -> Result<BTreeSet<String>, LedgerError> {
        self.check()?;
        Ok(self
            .recorded
            .lock()
            .get(kind.table())
            .cloned()
            .unwrap_or_default())
    }

    async fn apply(&self, kind: LedgerKind, key: &str, _sql: &str) -> Result<(), LedgerError> {
        self.check()?;
        if self.fail_on.as_deref() == Some(key) {
            return Err(LedgerError::Query {
                action: format!("applying {}", key),
                stderr: "syntax error".to_string(),
            });
        }
        self.recorded
            .lock()
            .entry(kind.table())
            .or_default()
            .insert(key.to_string());
        self.applied_log.lock().push(key.to_string());
        Ok(())
    }
}

/// Write `files` (name, sql) into a fresh directory.
pub fn script_dir(files: &[(&str, &str)]) -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    for (name, sql) in files {
        std::fs::write(dir.path().join(name), sql).unwrap();
    }
    dir
}

// =============================================================================
// Local shell
// =============================================================================

/// Runs scripts with the local `sh`, HOME pointed at a scratch directory.
#[cfg(unix)]
pub struct LocalShell {
    home: tempfile::TempDir,
}

#[cfg(unix)]
impl LocalShell {
    pub fn new() -> Self {
        Self {
            home: tempfile::tempdir().unwrap(),
        }
    }

    pub fn home(&self) -> &std::path::Path {
        self.home.path()
    }

    /// Path of the deploy lock for `service` under this shell's HOME.
    pub fn lock_file(&self, service: &str) -> std::path::PathBuf {
        self.home
            .path()
            .join(".local/state/hoist")
            .join(format!("{service}.lock"))
    }
}

#[cfg(unix)]
#[async_trait]
impl RemoteShell for LocalShell {
    async fn exec(&self, command: &RemoteCommand) -> ssh::Result<CommandOutput> {
        let output = tokio::process::Command::new("sh")
            .arg("-c")
            .arg(command.script())
            .env("HOME", self.home.path())
            .output()
            .await
            .map_err(|e| ssh::Error::Exec(e.to_string()))?;
        Ok(CommandOutput {
            exit_code: output.status.code().unwrap_or(255) as u32,
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }

    async fn close(self) -> ssh::Result<()> {
        Ok(())
    }
}
