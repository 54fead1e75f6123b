// ABOUTME: Startup transition tests: ordering, fail-fast, ledger idempotence, exit codes.
// ABOUTME: Uses an in-memory ledger and local commands in place of a database.

mod support;

use async_trait::async_trait;
use hoist::startup::{
    ConfiguredSteps, ExitCode, LedgerKind, StartupError, StartupRunner, StartupSteps, StepAction,
    StepError, StepReport, apply_scripts,
};
use hoist::step::TransitionStep;
use support::{MemoryLedger, script_dir};

/// Records the order steps are called in.
#[derive(Default)]
struct Recorder {
    calls: Vec<&'static str>,
    fail_migrations: bool,
    fail_seed: bool,
    fail_launch: bool,
    exit: i32,
}

#[async_trait]
impl StartupSteps for Recorder {
    async fn run_migrations(&mut self) -> Result<StepReport, StepError> {
        self.calls.push("migrate");
        if self.fail_migrations {
            return Err(StepError::Command {
                program: "migrate".to_string(),
                status: "exit status: 1".to_string(),
            });
        }
        Ok(StepReport::Scripts {
            applied: 2,
            skipped: 0,
        })
    }

    async fn run_seed(&mut self) -> Result<StepReport, StepError> {
        self.calls.push("seed");
        if self.fail_seed {
            return Err(StepError::NoCommand);
        }
        Ok(StepReport::NotConfigured)
    }

    fn describe_process(&self) -> String {
        "node dist/main.js".to_string()
    }

    async fn start_process(&mut self) -> Result<i32, StepError> {
        self.calls.push("start");
        if self.fail_launch {
            return Err(StepError::Spawn {
                program: "node".to_string(),
                source: std::io::Error::from(std::io::ErrorKind::NotFound),
            });
        }
        Ok(self.exit)
    }
}

mod ordering {
    use super::*;

    #[tokio::test]
    async fn steps_run_in_order_and_return_service_exit_code() {
        let mut runner = StartupRunner::new(Recorder {
            exit: 0,
            ..Recorder::default()
        })
        .silent();

        assert_eq!(runner.run().await.unwrap(), 0);
        assert_eq!(runner.steps().calls, ["migrate", "seed", "start"]);

        let markers: Vec<_> = runner.markers().iter().map(|m| (m.step, m.ok)).collect();
        assert_eq!(
            markers,
            [
                (TransitionStep::RunMigrations, true),
                (TransitionStep::RunSeed, true),
                (TransitionStep::StartProcess, true),
            ]
        );
        assert_eq!(runner.markers()[0].detail, "applied 2 (already applied 0)");
        assert_eq!(runner.markers()[2].detail, "node dist/main.js");
    }

    #[tokio::test]
    async fn failed_migration_never_starts_the_service() {
        let mut runner = StartupRunner::new(Recorder {
            fail_migrations: true,
            ..Recorder::default()
        })
        .silent();

        let err = runner.run().await.unwrap_err();

        assert!(matches!(err, StartupError::Migration(_)));
        assert_eq!(err.exit_code(), ExitCode::MigrationFailed);
        assert_eq!(runner.steps().calls, ["migrate"]);
        assert_eq!(runner.markers().len(), 1);
        assert!(!runner.markers()[0].ok);
        assert!(runner.markers()[0].detail.contains("migrate exited"));
    }

    #[tokio::test]
    async fn failed_seed_never_starts_the_service() {
        let mut runner = StartupRunner::new(Recorder {
            fail_seed: true,
            ..Recorder::default()
        })
        .silent();

        let err = runner.run().await.unwrap_err();

        assert_eq!(err.exit_code().code(), 3);
        assert_eq!(runner.steps().calls, ["migrate", "seed"]);
    }

    #[tokio::test]
    async fn launch_failure_is_marked_after_the_start_marker() {
        let mut runner = StartupRunner::new(Recorder {
            fail_launch: true,
            ..Recorder::default()
        })
        .silent();

        let err = runner.run().await.unwrap_err();

        assert_eq!(err.exit_code(), ExitCode::LaunchFailed);
        let last_two: Vec<_> = runner.markers()[2..].iter().map(|m| m.ok).collect();
        assert_eq!(last_two, [true, false]);
        assert!(
            runner.markers()[2..]
                .iter()
                .all(|m| m.step == TransitionStep::StartProcess)
        );
    }
}

mod ledger {
    use super::*;

    #[tokio::test]
    async fn scripts_apply_once_in_version_order() {
        let dir = script_dir(&[
            ("10_add_index.sql", "CREATE INDEX users_email ON users (email);"),
            ("2_add_email.sql", "ALTER TABLE users ADD COLUMN email TEXT;"),
            ("1_create_users.sql", "CREATE TABLE users (id SERIAL PRIMARY KEY);"),
            ("README.md", "not a script"),
        ]);
        let ledger = MemoryLedger::default();

        let first = apply_scripts(&ledger, LedgerKind::Migrations, dir.path())
            .await
            .unwrap();
        let second = apply_scripts(&ledger, LedgerKind::Migrations, dir.path())
            .await
            .unwrap();

        assert_eq!(first, StepReport::Scripts { applied: 3, skipped: 0 });
        assert_eq!(second, StepReport::Scripts { applied: 0, skipped: 3 });
        assert_eq!(
            *ledger.applied_log.lock(),
            ["1_create_users", "2_add_email", "10_add_index"]
        );
    }

    #[tokio::test]
    async fn new_script_is_applied_on_next_start() {
        let dir = script_dir(&[("0001_create_users.sql", "CREATE TABLE users ();")]);
        let ledger = MemoryLedger::default();
        apply_scripts(&ledger, LedgerKind::Migrations, dir.path())
            .await
            .unwrap();

        std::fs::write(dir.path().join("0002_add_email.sql"), "ALTER TABLE users;").unwrap();
        let report = apply_scripts(&ledger, LedgerKind::Migrations, dir.path())
            .await
            .unwrap();

        assert_eq!(report, StepReport::Scripts { applied: 1, skipped: 1 });
    }

    #[tokio::test]
    async fn migrations_and_seeds_are_tracked_separately() {
        let migrations = script_dir(&[("0001_init.sql", "CREATE TABLE roles ();")]);
        let seeds = script_dir(&[("0001_init.sql", "INSERT INTO roles VALUES ();")]);
        let ledger = MemoryLedger::default();

        apply_scripts(&ledger, LedgerKind::Migrations, migrations.path())
            .await
            .unwrap();
        let report = apply_scripts(&ledger, LedgerKind::Seeds, seeds.path())
            .await
            .unwrap();

        assert_eq!(report.applied(), 1);
    }

    #[tokio::test]
    async fn failing_script_stops_the_rest() {
        let dir = script_dir(&[
            ("0001_create_users.sql", "CREATE TABLE users ();"),
            ("0002_broken.sql", "CREATE TABEL oops;"),
            ("0003_add_email.sql", "ALTER TABLE users;"),
        ]);
        let ledger = MemoryLedger::failing_on("0002_broken");

        let err = apply_scripts(&ledger, LedgerKind::Migrations, dir.path())
            .await
            .unwrap_err();

        assert!(matches!(err, StepError::Ledger(_)));
        assert_eq!(*ledger.applied_log.lock(), ["0001_create_users"]);
    }

    #[tokio::test]
    async fn duplicate_versions_are_rejected_before_anything_runs() {
        let dir = script_dir(&[
            ("0001_create_users.sql", "CREATE TABLE users ();"),
            ("0001_create_roles.sql", "CREATE TABLE roles ();"),
        ]);
        let ledger = MemoryLedger::default();

        let err = apply_scripts(&ledger, LedgerKind::Migrations, dir.path())
            .await
            .unwrap_err();

        assert!(matches!(err, StepError::Scripts(_)));
        assert!(ledger.applied_log.lock().is_empty());
    }
}

#[cfg(unix)]
mod configured {
    use super::*;

    fn touch(path: &std::path::Path) -> Vec<String> {
        vec!["touch".to_string(), path.display().to_string()]
    }

    #[tokio::test]
    async fn unreachable_database_blocks_the_service() {
        let scratch = tempfile::tempdir().unwrap();
        let started = scratch.path().join("started");
        let migrations = script_dir(&[("0001_create_users.sql", "CREATE TABLE users ();")]);

        let steps = ConfiguredSteps::new(MemoryLedger::unreachable(), touch(&started))
            .migrations(StepAction::Sql {
                dir: migrations.path().to_path_buf(),
            })
            .spawn_process();
        let mut runner = StartupRunner::new(steps).silent();

        let err = runner.run().await.unwrap_err();

        assert_eq!(err.exit_code().code(), 2);
        assert!(!started.exists());
        assert!(runner.markers()[0].detail.contains("connection refused"));
    }

    #[tokio::test]
    async fn scripts_then_service() {
        let scratch = tempfile::tempdir().unwrap();
        let started = scratch.path().join("started");
        let migrations = script_dir(&[("0001_create_users.sql", "CREATE TABLE users ();")]);
        let seeds = script_dir(&[("0001_admin_user.sql", "INSERT INTO users DEFAULT VALUES;")]);

        let steps = ConfiguredSteps::new(MemoryLedger::default(), touch(&started))
            .migrations(StepAction::Sql {
                dir: migrations.path().to_path_buf(),
            })
            .seed(StepAction::Sql {
                dir: seeds.path().to_path_buf(),
            })
            .spawn_process();
        let mut runner = StartupRunner::new(steps).silent();

        assert_eq!(runner.run().await.unwrap(), 0);
        assert!(started.exists());
        assert_eq!(
            *runner.steps().ledger().applied_log.lock(),
            ["0001_create_users", "0001_admin_user"]
        );
    }

    #[tokio::test]
    async fn failing_seed_command_exits_with_seed_code() {
        let scratch = tempfile::tempdir().unwrap();
        let started = scratch.path().join("started");

        let steps = ConfiguredSteps::new(MemoryLedger::default(), touch(&started))
            .migrations(StepAction::shell("true"))
            .seed(StepAction::shell("exit 7"))
            .spawn_process();
        let mut runner = StartupRunner::new(steps).silent();

        let err = runner.run().await.unwrap_err();

        assert_eq!(err.exit_code(), ExitCode::SeedFailed);
        assert!(matches!(err, StartupError::Seed(StepError::Command { .. })));
        assert!(!started.exists());
    }

    #[tokio::test]
    async fn service_exit_code_is_passed_through() {
        let steps = ConfiguredSteps::new(
            MemoryLedger::default(),
            vec!["sh".to_string(), "-c".to_string(), "exit 5".to_string()],
        )
        .spawn_process();
        let mut runner = StartupRunner::new(steps).silent();

        assert_eq!(runner.run().await.unwrap(), 5);
        assert_eq!(runner.markers()[0].detail, "applied 0 (not configured)");
    }

    #[tokio::test]
    async fn missing_service_binary_is_a_launch_failure() {
        let steps = ConfiguredSteps::new(
            MemoryLedger::default(),
            vec!["/nonexistent/hoist-test-binary".to_string()],
        )
        .spawn_process();
        let mut runner = StartupRunner::new(steps).silent();

        let err = runner.run().await.unwrap_err();
        assert_eq!(err.exit_code(), ExitCode::LaunchFailed);
    }
}
