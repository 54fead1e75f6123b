// ABOUTME: Local image build settings.
// ABOUTME: Context, Dockerfile, container CLI, and scripts to normalize before building.

use crate::config::EnvValue;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::PathBuf;

#[derive(Debug, Clone, Deserialize)]
pub struct BuildConfig {
    /// Container CLI used for build and push.
    #[serde(default = "default_binary")]
    pub binary: String,

    #[serde(default = "default_context")]
    pub context: PathBuf,

    /// Relative to the context when not absolute.
    #[serde(default = "default_dockerfile")]
    pub dockerfile: PathBuf,

    /// Scripts copied into the image that must run under a Unix shell.
    /// Relative to the context when not absolute.
    #[serde(default)]
    pub scripts: Vec<PathBuf>,

    /// Extra build arguments layered over the runtime variables.
    #[serde(default)]
    pub args: HashMap<String, EnvValue>,
}

fn default_binary() -> String {
    "docker".to_string()
}

fn default_context() -> PathBuf {
    PathBuf::from(".")
}

fn default_dockerfile() -> PathBuf {
    PathBuf::from("Dockerfile")
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            binary: default_binary(),
            context: default_context(),
            dockerfile: default_dockerfile(),
            scripts: Vec::new(),
            args: HashMap::new(),
        }
    }
}

impl BuildConfig {
    pub fn dockerfile_path(&self) -> PathBuf {
        self.resolve(&self.dockerfile)
    }

    pub fn script_paths(&self) -> Vec<PathBuf> {
        self.scripts.iter().map(|s| self.resolve(s)).collect()
    }

    fn resolve(&self, path: &PathBuf) -> PathBuf {
        if path.is_absolute() {
            path.clone()
        } else {
            self.context.join(path)
        }
    }
}
