// ABOUTME: The opaque set of runtime variables handed to build and container.
// ABOUTME: Values are never printed; Debug shows variable names only.

use crate::config::EnvValue;
use crate::error::Result;
use std::collections::{BTreeMap, HashMap};
use std::fmt;

/// Variables the application understands. Picked up from the process
/// environment when hoist.yml does not list them explicitly.
pub const RUNTIME_VARIABLES: [&str; 16] = [
    "NODE_ENV",
    "APP_NAME",
    "APP_PORT",
    "API_PREFIX",
    "FRONTEND_DOMAIN",
    "BACKEND_DOMAIN",
    "DATABASE_TYPE",
    "DATABASE_HOST",
    "DATABASE_PORT",
    "DATABASE_USERNAME",
    "DATABASE_PASSWORD",
    "DATABASE_NAME",
    "DATABASE_SYNCHRONIZE",
    "DATABASE_MAX_CONNECTIONS",
    "DATABASE_SSL_ENABLED",
    "DATABASE_REJECT_UNAUTHORIZED",
];

#[derive(Clone, Default, PartialEq, Eq)]
pub struct RuntimeEnv(BTreeMap<String, String>);

impl RuntimeEnv {
    /// Explicit entries win; recognised variables fill the gaps from the environment.
    pub fn resolve(configured: &HashMap<String, EnvValue>) -> Result<Self> {
        let mut vars = BTreeMap::new();
        for (name, value) in configured {
            vars.insert(name.clone(), value.resolve()?);
        }

        for name in RUNTIME_VARIABLES {
            if vars.contains_key(name) {
                continue;
            }
            match std::env::var(name) {
                Ok(value) => {
                    vars.insert(name.to_string(), value);
                }
                Err(_) => tracing::debug!("runtime variable {} not set", name),
            }
        }

        Ok(Self(vars))
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.0.insert(name.into(), value.into());
    }

    /// Name/value pairs in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Port the application listens on inside the container.
    pub fn app_port(&self) -> Option<u16> {
        self.get("APP_PORT").and_then(|p| p.trim().parse().ok())
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for RuntimeEnv {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        RuntimeEnv(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

impl fmt::Debug for RuntimeEnv {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.0.keys().map(|k| (k, "<redacted>")))
            .finish()
    }
}
