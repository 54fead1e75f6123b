// ABOUTME: Records which migrations and seeds a database has already received.
// ABOUTME: PsqlLedger talks to PostgreSQL through the psql client using DATABASE_* variables.

use async_trait::async_trait;
use std::collections::BTreeSet;
use thiserror::Error;
use tokio::process::Command;

use crate::config::RuntimeEnv;
use crate::local;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedgerKind {
    Migrations,
    Seeds,
}

impl LedgerKind {
    pub fn table(self) -> &'static str {
        match self {
            LedgerKind::Migrations => "hoist_schema_migrations",
            LedgerKind::Seeds => "hoist_seeds",
        }
    }
}

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("unsupported DATABASE_TYPE {0:?}; SQL scripts need postgres")]
    UnsupportedDatabase(String),

    #[error("failed to run psql: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("{action} failed: {stderr}")]
    Query { action: String, stderr: String },
}

#[async_trait]
pub trait Ledger: Send + Sync {
    /// Create the ledger table if missing.
    async fn prepare(&self, kind: LedgerKind) -> Result<(), LedgerError>;

    async fn applied(&self, kind: LedgerKind) -> Result<BTreeSet<String>, LedgerError>;

    /// Run `sql` and record `key`, in one transaction.
    async fn apply(&self, kind: LedgerKind, key: &str, sql: &str) -> Result<(), LedgerError>;
}

/// libpq `sslmode` derived from DATABASE_SSL_ENABLED / DATABASE_REJECT_UNAUTHORIZED.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SslMode {
    Disable,
    Require,
    VerifyFull,
}

impl SslMode {
    pub fn from_flags(enabled: Option<&str>, reject_unauthorized: Option<&str>) -> SslMode {
        match (enabled.map(is_true), reject_unauthorized.map(is_true)) {
            (Some(true), Some(true)) => SslMode::VerifyFull,
            (Some(true), _) => SslMode::Require,
            _ => SslMode::Disable,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SslMode::Disable => "disable",
            SslMode::Require => "require",
            SslMode::VerifyFull => "verify-full",
        }
    }
}

fn is_true(value: &str) -> bool {
    matches!(value.trim().to_lowercase().as_str(), "true" | "1" | "yes")
}

/// Ledger backed by the `psql` client.
#[derive(Clone)]
pub struct PsqlLedger {
    binary: String,
    database_type: Option<String>,
    /// libpq environment (PGHOST, PGPASSWORD, ...).
    connection: Vec<(&'static str, String)>,
}

impl std::fmt::Debug for PsqlLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<_> = self.connection.iter().map(|(k, _)| *k).collect();
        f.debug_struct("PsqlLedger")
            .field("binary", &self.binary)
            .field("connection", &names)
            .finish()
    }
}

impl PsqlLedger {
    /// Connection settings from the runtime variables. Unset variables are
    /// left to libpq defaults.
    pub fn from_env(env: &RuntimeEnv) -> Self {
        let mut connection = Vec::new();
        for (var, pg) in [
            ("DATABASE_HOST", "PGHOST"),
            ("DATABASE_PORT", "PGPORT"),
            ("DATABASE_USERNAME", "PGUSER"),
            ("DATABASE_PASSWORD", "PGPASSWORD"),
            ("DATABASE_NAME", "PGDATABASE"),
        ] {
            if let Some(value) = env.get(var) {
                connection.push((pg, value.to_string()));
            }
        }
        let ssl = SslMode::from_flags(
            env.get("DATABASE_SSL_ENABLED"),
            env.get("DATABASE_REJECT_UNAUTHORIZED"),
        );
        connection.push(("PGSSLMODE", ssl.as_str().to_string()));

        Self {
            binary: "psql".to_string(),
            database_type: env.get("DATABASE_TYPE").map(str::to_string),
            connection,
        }
    }

    pub fn binary(mut self, binary: impl Into<String>) -> Self {
        self.binary = binary.into();
        self
    }

    fn check_type(&self) -> Result<(), LedgerError> {
        match self.database_type.as_deref() {
            None => Ok(()),
            Some(t) if matches!(t.to_lowercase().as_str(), "postgres" | "postgresql") => Ok(()),
            Some(t) => Err(LedgerError::UnsupportedDatabase(t.to_string())),
        }
    }

    async fn psql(&self, action: &str, sql: &str) -> Result<String, LedgerError> {
        self.check_type()?;

        let mut command = Command::new(&self.binary);
        command
            .args([
                "--no-psqlrc",
                "--quiet",
                "--tuples-only",
                "--no-align",
                "--single-transaction",
                "--set",
                "ON_ERROR_STOP=1",
                "--file",
                "-",
            ])
            .envs(self.connection.iter().map(|(k, v)| (*k, v.as_str())));

        let output = local::run(command, Some(sql))
            .await
            .map_err(LedgerError::Spawn)?;
        if output.status.success() {
            Ok(String::from_utf8_lossy(&output.stdout).into_owned())
        } else {
            Err(LedgerError::Query {
                action: action.to_string(),
                stderr: local::tail(&output.stderr, 5),
            })
        }
    }
}

fn literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

#[async_trait]
impl Ledger for PsqlLedger {
    async fn prepare(&self, kind: LedgerKind) -> Result<(), LedgerError> {
        let sql = format!(
            "CREATE TABLE IF NOT EXISTS {} (id TEXT PRIMARY KEY, applied_at TIMESTAMPTZ NOT NULL DEFAULT now());",
            kind.table()
        );
        self.psql(&format!("creating {}", kind.table()), &sql)
            .await
            .map(|_| ())
    }

    async fn applied(&self, kind: LedgerKind) -> Result<BTreeSet<String>, LedgerError> {
        let sql = format!("SELECT id FROM {};", kind.table());
        let stdout = self
            .psql(&format!("reading {}", kind.table()), &sql)
            .await?;
        Ok(stdout
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect())
    }

    async fn apply(&self, kind: LedgerKind, key: &str, sql: &str) -> Result<(), LedgerError> {
        let script = format!(
            "{}\n;\nINSERT INTO {} (id) VALUES ({});\n",
            sql,
            kind.table(),
            literal(key)
        );
        self.psql(&format!("applying {}", key), &script)
            .await
            .map(|_| ())
    }
}
