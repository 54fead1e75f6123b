// ABOUTME: Configuration values that may come from the environment or a file.
// ABOUTME: Lets hoist.yml reference secrets without containing them.

use crate::error::{Error, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::PathBuf;

/// A configured value: inline, read from an environment variable, or read from a file.
///
/// ```yaml
/// NODE_ENV: production
/// DATABASE_PASSWORD: { env: DB_PASSWORD }
/// DATABASE_HOST: { env: DB_HOST, default: localhost }
/// REGISTRY_TOKEN: { file: /run/secrets/registry }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum EnvValue {
    Literal(String),
    FromEnv {
        #[serde(rename = "env")]
        var: String,
        #[serde(default)]
        default: Option<String>,
    },
    FromFile {
        file: PathBuf,
    },
}

impl EnvValue {
    pub fn resolve(&self) -> Result<String> {
        match self {
            EnvValue::Literal(s) => Ok(s.clone()),
            EnvValue::FromEnv { var, default } => match std::env::var(var) {
                Ok(val) => Ok(val),
                Err(_) => default
                    .clone()
                    .ok_or_else(|| Error::MissingEnvVar(var.clone())),
            },
            EnvValue::FromFile { file } => std::fs::read_to_string(file)
                .map(|s| s.trim_end_matches(['\r', '\n']).to_string())
                .map_err(|e| {
                    Error::InvalidConfig(format!("cannot read {}: {}", file.display(), e))
                }),
        }
    }
}

pub fn resolve_env_map(map: &HashMap<String, EnvValue>) -> Result<HashMap<String, String>> {
    map.iter()
        .map(|(k, v)| v.resolve().map(|resolved| (k.clone(), resolved)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn env_reference_falls_back_to_default() {
        temp_env::with_var_unset("HOIST_TEST_UNSET", || {
            let value = EnvValue::FromEnv {
                var: "HOIST_TEST_UNSET".to_string(),
                default: Some("fallback".to_string()),
            };
            assert_eq!(value.resolve().unwrap(), "fallback");
        });
    }

    #[test]
    fn env_reference_without_default_is_an_error() {
        temp_env::with_var_unset("HOIST_TEST_UNSET", || {
            let value = EnvValue::FromEnv {
                var: "HOIST_TEST_UNSET".to_string(),
                default: None,
            };
            let err = value.resolve().unwrap_err();
            assert!(err.to_string().contains("HOIST_TEST_UNSET"));
        });
    }

    #[test]
    fn file_reference_strips_trailing_newline() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "s3cret").unwrap();

        let value = EnvValue::FromFile {
            file: file.path().to_path_buf(),
        };
        assert_eq!(value.resolve().unwrap(), "s3cret");
    }
}
