// ABOUTME: Registry credentials configuration.
// ABOUTME: Values are references resolved at run time, never stored in hoist.yml.

use crate::config::EnvValue;
use crate::error::Result;
use crate::publish::Credentials;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct RegistryConfig {
    /// Registry host to log in to; defaults to the image's registry.
    #[serde(default)]
    pub server: Option<String>,
    pub username: EnvValue,
    pub password: EnvValue,
}

impl RegistryConfig {
    pub fn credentials(&self, image_registry: Option<&str>) -> Result<Credentials> {
        Ok(Credentials {
            server: self
                .server
                .clone()
                .or_else(|| image_registry.map(str::to_string)),
            username: self.username.resolve()?,
            password: self.password.resolve()?,
        })
    }
}
