// ABOUTME: Ordered SQL script sets (migrations, seeds) loaded from a directory.
// ABOUTME: Files are named `NNNN_name.sql`; versions must be unique.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ScriptError {
    #[error("cannot read script directory {path}: {source}")]
    ReadDir {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("cannot read script {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("script {0} is not named NNNN_name.sql")]
    InvalidName(PathBuf),

    #[error("scripts {first} and {second} share version {version}")]
    DuplicateVersion {
        version: u64,
        first: PathBuf,
        second: PathBuf,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Script {
    pub version: u64,
    /// File stem, e.g. `0001_create_users`. Recorded in the ledger.
    pub key: String,
    pub path: PathBuf,
}

impl Script {
    pub fn sql(&self) -> Result<String, ScriptError> {
        std::fs::read_to_string(&self.path).map_err(|source| ScriptError::Read {
            path: self.path.clone(),
            source,
        })
    }

    fn from_path(path: &Path) -> Result<Option<Script>, ScriptError> {
        if path.extension().and_then(|e| e.to_str()) != Some("sql") {
            return Ok(None);
        }
        let invalid = || ScriptError::InvalidName(path.to_path_buf());

        let stem = path.file_stem().and_then(|s| s.to_str()).ok_or_else(invalid)?;
        let (digits, name) = stem.split_once('_').ok_or_else(invalid)?;
        if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) || name.is_empty() {
            return Err(invalid());
        }
        let version = digits.parse().map_err(|_| invalid())?;

        Ok(Some(Script {
            version,
            key: stem.to_string(),
            path: path.to_path_buf(),
        }))
    }
}

/// Scripts sorted by version.
#[derive(Debug, Clone, Default)]
pub struct ScriptSet {
    scripts: Vec<Script>,
}

impl ScriptSet {
    /// Load every `.sql` file in `dir`. Other files are ignored.
    pub fn load(dir: &Path) -> Result<Self, ScriptError> {
        let read_dir = |source: std::io::Error| ScriptError::ReadDir {
            path: dir.to_path_buf(),
            source,
        };

        let mut by_version: BTreeMap<u64, Script> = BTreeMap::new();
        for entry in std::fs::read_dir(dir).map_err(read_dir)? {
            let path = entry.map_err(read_dir)?.path();
            if !path.is_file() {
                continue;
            }
            let Some(script) = Script::from_path(&path)? else {
                continue;
            };
            if let Some(existing) = by_version.get(&script.version) {
                return Err(ScriptError::DuplicateVersion {
                    version: script.version,
                    first: existing.path.clone(),
                    second: script.path,
                });
            }
            by_version.insert(script.version, script);
        }

        Ok(Self {
            scripts: by_version.into_values().collect(),
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = &Script> {
        self.scripts.iter()
    }

    pub fn len(&self) -> usize {
        self.scripts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scripts.is_empty()
    }
}
