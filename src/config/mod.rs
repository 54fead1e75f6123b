// ABOUTME: Configuration types and parsing for hoist.yml.
// ABOUTME: hoist.yml: discovery, destination overlays, and the template written by `hoist init`.

mod build;
mod container;
mod env_value;
mod registry;
mod retry;
mod runtime_env;
mod server;

pub use build::BuildConfig;
pub use container::{RestartPolicy, RestartPolicyError, StopConfig};
pub use env_value::{EnvValue, resolve_env_map};
pub use registry::RegistryConfig;
pub use retry::RetryPolicy;
pub use runtime_env::{RUNTIME_VARIABLES, RuntimeEnv};
pub use server::ServerConfig;

use crate::error::{Error, Result};
use crate::types::{ImageRef, ServiceName};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const CONFIG_FILENAME: &str = "hoist.yml";
pub const CONFIG_FILENAME_ALT: &str = "hoist.yaml";
pub const CONFIG_FILENAME_DIR: &str = ".hoist/config.yml";

/// The single mutable tag the remote host always pulls.
pub const DEFAULT_TAG: &str = "api-latest";

/// Host port the service is published on.
pub const DEFAULT_PORT: u16 = 8080;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub service: ServiceName,

    pub image: ImageRef,

    #[serde(default = "default_tag")]
    pub tag: String,

    pub server: ServerConfig,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default)]
    pub build: BuildConfig,

    #[serde(default)]
    pub registry: Option<RegistryConfig>,

    #[serde(default)]
    pub publish_retry: RetryPolicy,

    #[serde(default)]
    pub env: HashMap<String, EnvValue>,

    #[serde(default)]
    pub restart: RestartPolicy,

    #[serde(default)]
    pub stop: StopConfig,

    #[serde(default)]
    pub startup_check: StartupCheckConfig,

    #[serde(default = "default_archive_dir")]
    pub archive_dir: PathBuf,

    #[serde(default)]
    pub destinations: HashMap<String, Destination>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct Destination {
    #[serde(default)]
    pub server: Option<ServerConfig>,

    #[serde(default)]
    pub env: HashMap<String, EnvValue>,

    #[serde(default)]
    pub port: Option<u16>,

    #[serde(default)]
    pub tag: Option<String>,
}

/// How long the deployer watches a new container for its startup markers.
#[derive(Debug, Clone, Deserialize)]
pub struct StartupCheckConfig {
    #[serde(default = "default_startup_timeout", with = "humantime_serde")]
    pub timeout: Duration,

    #[serde(default = "default_startup_interval", with = "humantime_serde")]
    pub interval: Duration,
}

impl Default for StartupCheckConfig {
    fn default() -> Self {
        Self {
            timeout: default_startup_timeout(),
            interval: default_startup_interval(),
        }
    }
}

fn default_tag() -> String {
    DEFAULT_TAG.to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_startup_timeout() -> Duration {
    Duration::from_secs(120)
}

fn default_startup_interval() -> Duration {
    Duration::from_secs(2)
}

fn default_archive_dir() -> PathBuf {
    PathBuf::from(".hoist/runs")
}

impl Config {
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml).map_err(Error::from)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    pub fn discover(dir: &Path) -> Result<Self> {
        let candidates = [
            dir.join(CONFIG_FILENAME),
            dir.join(CONFIG_FILENAME_ALT),
            dir.join(CONFIG_FILENAME_DIR),
        ];

        for path in &candidates {
            if path.exists() {
                return Self::load(path);
            }
        }

        Err(Error::ConfigNotFound(dir.to_path_buf()))
    }

    pub fn for_destination(&self, name: &str) -> Result<Config> {
        let dest = self
            .destinations
            .get(name)
            .ok_or_else(|| Error::UnknownDestination(name.to_string()))?;

        let mut merged = self.clone();

        if let Some(ref server) = dest.server {
            merged.server = server.clone();
        }

        for (k, v) in &dest.env {
            merged.env.insert(k.clone(), v.clone());
        }

        if let Some(port) = dest.port {
            merged.port = port;
        }

        if let Some(ref tag) = dest.tag {
            merged.tag = tag.clone();
        }

        Ok(merged)
    }

    /// The image under the deploy tag, e.g. `ghcr.io/acme/api:api-latest`.
    pub fn image_ref(&self) -> ImageRef {
        self.image.tagged(&self.tag)
    }

    /// Resolve the runtime variables passed to both the build and the container.
    pub fn runtime_env(&self) -> Result<RuntimeEnv> {
        RuntimeEnv::resolve(&self.env)
    }

    /// Starting point for `hoist init`.
    pub fn template() -> Result<Self> {
        let invalid = |e: String| Error::InvalidConfig(e);
        Ok(Config {
            service: ServiceName::new("api").map_err(|e| invalid(e.to_string()))?,
            image: ImageRef::parse("ghcr.io/my-org/api").map_err(|e| invalid(e.to_string()))?,
            tag: default_tag(),
            server: ServerConfig::parse("deploy@server.example.com").map_err(invalid)?,
            port: DEFAULT_PORT,
            build: BuildConfig::default(),
            registry: None,
            publish_retry: RetryPolicy::default(),
            env: HashMap::new(),
            restart: RestartPolicy::default(),
            stop: StopConfig::default(),
            startup_check: StartupCheckConfig::default(),
            archive_dir: default_archive_dir(),
            destinations: HashMap::new(),
        })
    }
}

pub fn init_config(
    dir: &Path,
    service: Option<&str>,
    image: Option<&str>,
    force: bool,
) -> Result<PathBuf> {
    let config_path = dir.join(CONFIG_FILENAME);

    if config_path.exists() && !force {
        return Err(Error::AlreadyExists(config_path));
    }

    let mut config = Config::template()?;

    if let Some(s) = service {
        config.service = ServiceName::new(s).map_err(|e| Error::InvalidConfig(e.to_string()))?;
    }

    if let Some(i) = image {
        config.image = ImageRef::parse(i).map_err(|e| Error::InvalidConfig(e.to_string()))?;
    }

    std::fs::write(&config_path, generate_template_yaml(&config))?;

    Ok(config_path)
}

fn generate_template_yaml(config: &Config) -> String {
    let env_lines: String = RUNTIME_VARIABLES
        .iter()
        .map(|var| format!("#   {var}: {{ env: {var} }}\n"))
        .collect();

    format!(
        r#"service: {}
image: {}
tag: {}
server:
  host: {}
  port: {}
  user: {}
  # key: {{ env: SSH_PRIVATE_KEY }}
# Host port the service publishes. A running container already holding it is
# stopped on deploy, even one started outside hoist.
port: {}

build:
  context: .
  dockerfile: Dockerfile
  scripts:
    - start.sh

# registry:
#   username: {{ env: REGISTRY_USERNAME }}
#   password: {{ env: REGISTRY_PASSWORD }}

# Recognised runtime variables are read from the environment when not listed:
{}env: {{}}
"#,
        config.service,
        config.image,
        config.tag,
        config.server.host,
        config.server.port,
        config.server.user.as_deref().unwrap_or("deploy"),
        config.port,
        env_lines,
    )
}
