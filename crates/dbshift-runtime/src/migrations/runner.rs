//! Migration runner.
//!
//! Applies pending units in timestamp order, or reverts the most recently
//! applied one, under the chosen transaction policy. Where the dialect has
//! an advisory lock, the run holds it from before the bookkeeping is read
//! until the last statement finishes.

use std::collections::HashSet;
use std::fmt;

use dbshift_core::config::{MigrationsConfig, TransactionMode};
use dbshift_core::db::{QueryFuture, QueryRunner};
use dbshift_core::dialect::DialectCapabilities;
use dbshift_core::error::{Result, ShiftError};
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use super::recorder::{MigrationRecord, MigrationRecorder, MigrationStatus, UnitInfo};

/// A migration unit: forward and backward DDL under one identifier.
pub trait Migration: Send + Sync {
    /// Unit identifier, usually epoch milliseconds.
    fn timestamp(&self) -> i64;

    fn name(&self) -> &str;

    /// Content hash stored with the record.
    fn checksum(&self) -> Option<String> {
        None
    }

    /// `Some(false)` runs the unit outside any transaction.
    fn transaction(&self) -> Option<bool> {
        None
    }

    fn up<'a>(&'a self, runner: &'a mut dyn QueryRunner) -> QueryFuture<'a, ()>;

    fn down<'a>(&'a self, runner: &'a mut dyn QueryRunner) -> QueryFuture<'a, ()>;

    fn info(&self) -> UnitInfo {
        UnitInfo {
            timestamp: self.timestamp(),
            name: self.name().to_string(),
            checksum: self.checksum(),
        }
    }
}

/// A unit made of literal SQL statements.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqlMigration {
    pub timestamp: i64,
    pub name: String,
    pub up: Vec<String>,
    pub down: Vec<String>,
    pub transaction: Option<bool>,
}

impl SqlMigration {
    pub fn new(
        timestamp: i64,
        name: impl Into<String>,
        up: Vec<String>,
        down: Vec<String>,
    ) -> Self {
        Self {
            timestamp,
            name: name.into(),
            up,
            down,
            transaction: None,
        }
    }

    pub fn without_transaction(mut self) -> Self {
        self.transaction = Some(false);
        self
    }
}

async fn execute_all(runner: &mut dyn QueryRunner, statements: &[String]) -> Result<()> {
    for statement in statements {
        runner.execute(statement).await?;
    }
    Ok(())
}

impl Migration for SqlMigration {
    fn timestamp(&self) -> i64 {
        self.timestamp
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn checksum(&self) -> Option<String> {
        let mut hasher = Sha256::new();
        for statement in &self.up {
            hasher.update(statement.as_bytes());
            hasher.update(b";\n");
        }
        hasher.update(b"--\n");
        for statement in &self.down {
            hasher.update(statement.as_bytes());
            hasher.update(b";\n");
        }
        Some(format!("{:x}", hasher.finalize()))
    }

    fn transaction(&self) -> Option<bool> {
        self.transaction
    }

    fn up<'a>(&'a self, runner: &'a mut dyn QueryRunner) -> QueryFuture<'a, ()> {
        Box::pin(execute_all(runner, &self.up))
    }

    fn down<'a>(&'a self, runner: &'a mut dyn QueryRunner) -> QueryFuture<'a, ()> {
        Box::pin(execute_all(runner, &self.down))
    }
}

/// Options for one run.
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub transaction: TransactionMode,
    /// Record units without executing them.
    pub fake: bool,
    pub verify_checksums: bool,
    /// Proceed despite integrity errors.
    pub force: bool,
    /// Take the dialect's advisory lock.
    pub lock: bool,
    pub table_name: String,
    /// Schema holding the bookkeeping table.
    pub schema: Option<String>,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self::from_config(&MigrationsConfig::default())
    }
}

impl RunOptions {
    pub fn from_config(config: &MigrationsConfig) -> Self {
        Self {
            transaction: config.transaction,
            fake: false,
            verify_checksums: config.verify_checksums,
            force: false,
            lock: config.lock,
            table_name: config.table_name.clone(),
            schema: None,
        }
    }
}

/// Where a run is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Locking,
    /// Executing the i-th pending unit.
    Applying(usize),
    /// Writing the i-th unit's record.
    Recording(usize),
    Committed,
    RolledBack,
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunState::Idle => write!(f, "idle"),
            RunState::Locking => write!(f, "locking"),
            RunState::Applying(i) => write!(f, "applying({})", i),
            RunState::Recording(i) => write!(f, "recording({})", i),
            RunState::Committed => write!(f, "committed"),
            RunState::RolledBack => write!(f, "rolled back"),
        }
    }
}

/// Set up the session for migration DDL. SQLite must switch foreign key
/// enforcement off outside any transaction, or table rebuilds would cascade.
pub(crate) async fn setup_session(
    runner: &mut dyn QueryRunner,
    caps: &DialectCapabilities,
) -> Result<()> {
    for statement in caps.session_setup {
        runner.execute(statement).await?;
    }
    Ok(())
}

pub(crate) async fn teardown_session(runner: &mut dyn QueryRunner, caps: &DialectCapabilities) {
    for statement in caps.session_teardown {
        if let Err(e) = runner.execute(statement).await {
            warn!(error = %e, "Failed to restore session settings");
        }
    }
}

/// Fail when the dialect reports broken references.
pub(crate) async fn check_integrity(
    runner: &mut dyn QueryRunner,
    caps: &DialectCapabilities,
) -> Result<()> {
    let Some(sql) = caps.integrity_check else {
        return Ok(());
    };
    let violations = runner.query(sql, &[]).await?;
    if let Some(row) = violations.first() {
        return Err(ShiftError::MigrationIntegrity(format!(
            "{} foreign key violation(s), first in table '{}'",
            violations.len(),
            row.get_str("table").unwrap_or_default()
        )));
    }
    Ok(())
}

/// Applies and reverts migration units over one connection.
pub struct MigrationRunner<'r> {
    runner: &'r mut dyn QueryRunner,
    caps: &'static DialectCapabilities,
    options: RunOptions,
    recorder: MigrationRecorder,
    state: RunState,
}

impl<'r> MigrationRunner<'r> {
    pub fn new(runner: &'r mut dyn QueryRunner, options: RunOptions) -> Self {
        let dialect = runner.dialect();
        let recorder = MigrationRecorder::new(dialect, options.table_name.clone())
            .in_schema(options.schema.clone());
        Self {
            runner,
            caps: dialect.capabilities(),
            options,
            recorder,
            state: RunState::Idle,
        }
    }

    #[cfg(test)]
    fn with_capabilities(mut self, caps: &'static DialectCapabilities) -> Self {
        self.caps = caps;
        self
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    fn transition(&mut self, next: RunState) {
        debug!(from = %self.state, to = %next, "Migration run state");
        self.state = next;
    }

    /// Apply every pending unit. Returns the applied units' full names.
    pub async fn run(&mut self, units: &[Box<dyn Migration>]) -> Result<Vec<String>> {
        check_unique_timestamps(units)?;
        self.transition(RunState::Locking);
        self.acquire_lock().await?;

        let result = match setup_session(self.runner, self.caps).await {
            Ok(()) => {
                let result = self.run_inner(units).await;
                teardown_session(self.runner, self.caps).await;
                result
            }
            Err(e) => Err(e),
        };

        if let Err(e) = self.release_lock().await {
            warn!("Failed to release migration lock: {}", e);
        }
        result
    }

    async fn run_inner(&mut self, units: &[Box<dyn Migration>]) -> Result<Vec<String>> {
        self.recorder.ensure_table(self.runner).await?;
        let status = self.status_of(units).await?;
        self.check_status(&status)?;

        for unit in &status.out_of_order {
            warn!(
                migration = %unit.full_name(),
                "Pending migration is older than the newest applied one"
            );
        }

        let pending_ids: HashSet<i64> = status.pending.iter().map(|u| u.timestamp).collect();
        let mut pending: Vec<&dyn Migration> = units
            .iter()
            .map(|u| u.as_ref())
            .filter(|u| pending_ids.contains(&u.timestamp()))
            .collect();
        pending.sort_by_key(|u| u.timestamp());

        if pending.is_empty() {
            info!("No pending migrations");
            self.transition(RunState::Idle);
            return Ok(Vec::new());
        }
        if !self.caps.transactional_ddl && self.options.transaction != TransactionMode::None {
            warn!(
                dialect = %self.caps.dialect,
                "DDL is not transactional on this dialect; a failure can leave the schema partially migrated"
            );
        }

        match self.options.transaction {
            TransactionMode::All => {
                if let Some(unit) = pending.iter().find(|u| u.transaction() == Some(false)) {
                    return Err(ShiftError::InvalidArgument(format!(
                        "migration {}_{} must run outside a transaction; use --transaction each or none",
                        unit.timestamp(),
                        unit.name()
                    )));
                }
                self.runner.start_transaction().await?;
                for (i, unit) in pending.iter().enumerate() {
                    if let Err(e) = self.apply(i, *unit).await {
                        self.abort().await;
                        return Err(e);
                    }
                }
                if let Err(e) = self.finish().await {
                    self.abort().await;
                    return Err(e);
                }
            }
            TransactionMode::Each => {
                for (i, unit) in pending.iter().enumerate() {
                    let wrapped = unit.transaction() != Some(false);
                    if wrapped {
                        self.runner.start_transaction().await?;
                    }
                    let result = match self.apply(i, *unit).await {
                        Ok(()) if wrapped => self.finish().await,
                        Ok(()) => check_integrity(self.runner, self.caps).await,
                        other => other,
                    };
                    if let Err(e) = result {
                        if wrapped {
                            self.abort().await;
                        }
                        return Err(e);
                    }
                }
            }
            TransactionMode::None => {
                for (i, unit) in pending.iter().enumerate() {
                    self.apply(i, *unit).await?;
                }
                check_integrity(self.runner, self.caps).await?;
            }
        }

        self.transition(RunState::Committed);
        Ok(pending.iter().map(|u| u.info().full_name()).collect())
    }

    async fn apply(&mut self, index: usize, unit: &dyn Migration) -> Result<()> {
        let info = unit.info();
        self.transition(RunState::Applying(index));
        if self.options.fake {
            info!(migration = %info.full_name(), "Marking migration as applied without running it");
        } else {
            unit.up(self.runner)
                .await
                .map_err(|e| ShiftError::Migration {
                    name: info.full_name(),
                    source: Box::new(e),
                })?;
        }

        self.transition(RunState::Recording(index));
        self.recorder
            .record(self.runner, &info, chrono::Utc::now().timestamp_millis())
            .await?;
        info!(migration = %info.full_name(), "Migration applied");
        Ok(())
    }

    /// Revert the most recently applied unit. Returns its full name, or
    /// `None` when nothing is applied.
    pub async fn revert(&mut self, units: &[Box<dyn Migration>]) -> Result<Option<String>> {
        check_unique_timestamps(units)?;
        self.transition(RunState::Locking);
        self.acquire_lock().await?;

        let result = match setup_session(self.runner, self.caps).await {
            Ok(()) => {
                let result = self.revert_inner(units).await;
                teardown_session(self.runner, self.caps).await;
                result
            }
            Err(e) => Err(e),
        };

        if let Err(e) = self.release_lock().await {
            warn!("Failed to release migration lock: {}", e);
        }
        result
    }

    async fn revert_inner(&mut self, units: &[Box<dyn Migration>]) -> Result<Option<String>> {
        if !self.recorder.has_table(self.runner).await? {
            info!("No migrations have been applied");
            self.transition(RunState::Idle);
            return Ok(None);
        }
        let records = self.recorder.list(self.runner).await?;
        let Some(last) = records.iter().max_by_key(|r| r.id).cloned() else {
            info!("No migrations have been applied");
            self.transition(RunState::Idle);
            return Ok(None);
        };

        let Some(unit) = units.iter().find(|u| u.timestamp() == last.timestamp) else {
            return Err(ShiftError::MigrationIntegrity(format!(
                "cannot revert {}_{}: no matching migration unit",
                last.timestamp, last.name
            )));
        };
        let info = unit.info();
        if let (Some(recorded), Some(current)) = (&last.checksum, &info.checksum) {
            if recorded != current && self.options.verify_checksums {
                let err = ShiftError::MigrationIntegrity(format!(
                    "migration {} changed since it was applied",
                    info.full_name()
                ));
                if !self.options.force {
                    return Err(err);
                }
                warn!(error = %err, "Reverting anyway");
            }
        }

        let wrapped =
            self.options.transaction != TransactionMode::None && unit.transaction() != Some(false);
        if wrapped {
            self.runner.start_transaction().await?;
        }
        let result = self.revert_unit(unit.as_ref(), &last).await;
        let result = match result {
            Ok(()) if wrapped => self.finish().await,
            Ok(()) => check_integrity(self.runner, self.caps).await,
            Err(e) => Err(e),
        };
        if let Err(e) = result {
            if wrapped {
                self.abort().await;
            }
            return Err(e);
        }

        self.transition(RunState::Committed);
        info!(migration = %info.full_name(), "Migration reverted");
        Ok(Some(info.full_name()))
    }

    async fn revert_unit(
        &mut self,
        unit: &dyn Migration,
        record: &MigrationRecord,
    ) -> Result<()> {
        self.transition(RunState::Applying(0));
        if !self.options.fake {
            unit.down(self.runner)
                .await
                .map_err(|e| ShiftError::Migration {
                    name: unit.info().full_name(),
                    source: Box::new(e),
                })?;
        }
        self.transition(RunState::Recording(0));
        self.recorder.delete(self.runner, record).await
    }

    /// Applied and pending units. Never creates the bookkeeping table.
    pub async fn show(&mut self, units: &[Box<dyn Migration>]) -> Result<MigrationStatus> {
        check_unique_timestamps(units)?;
        self.status_of(units).await
    }

    async fn status_of(&mut self, units: &[Box<dyn Migration>]) -> Result<MigrationStatus> {
        let infos: Vec<UnitInfo> = units.iter().map(|u| u.info()).collect();
        let records = if self.recorder.has_table(self.runner).await? {
            self.recorder.list(self.runner).await?
        } else {
            Vec::new()
        };
        Ok(MigrationStatus::compute(&infos, &records))
    }

    fn check_status(&self, status: &MigrationStatus) -> Result<()> {
        match status.integrity_error(self.options.verify_checksums) {
            Some(err) if self.options.force => {
                warn!(error = %err, "Proceeding despite integrity error");
                Ok(())
            }
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    async fn finish(&mut self) -> Result<()> {
        check_integrity(self.runner, self.caps).await?;
        self.runner.commit_transaction().await
    }

    async fn abort(&mut self) {
        if let Err(e) = self.runner.rollback_transaction().await {
            warn!(error = %e, "Rollback failed");
        }
        self.transition(RunState::RolledBack);
    }

    async fn acquire_lock(&mut self) -> Result<()> {
        let Some(sql) = self.caps.advisory_lock.filter(|_| self.options.lock) else {
            return Ok(());
        };
        debug!("Acquiring migration lock...");
        let rows = self.runner.query(sql, &[]).await.map_err(|e| {
            ShiftError::Database(format!("Failed to acquire migration lock: {}", e))
        })?;
        // GET_LOCK reports a timeout as 0.
        let granted = rows
            .first()
            .and_then(|r| r.get_index(0))
            .and_then(|v| v.as_i64())
            .map(|v| v != 0)
            .unwrap_or(true);
        if !granted {
            return Err(ShiftError::Database(
                "Timed out waiting for the migration lock".into(),
            ));
        }
        debug!("Migration lock acquired");
        Ok(())
    }

    async fn release_lock(&mut self) -> Result<()> {
        let Some(sql) = self.caps.advisory_unlock.filter(|_| self.options.lock) else {
            return Ok(());
        };
        self.runner.query(sql, &[]).await.map_err(|e| {
            ShiftError::Database(format!("Failed to release migration lock: {}", e))
        })?;
        debug!("Migration lock released");
        Ok(())
    }
}

fn check_unique_timestamps(units: &[Box<dyn Migration>]) -> Result<()> {
    let mut seen = HashSet::new();
    for unit in units {
        if !seen.insert(unit.timestamp()) {
            return Err(ShiftError::MigrationIntegrity(format!(
                "more than one migration unit has timestamp {}",
                unit.timestamp()
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use dbshift_core::db::{Row, Value};
    use dbshift_core::dialect::Dialect;
    use dbshift_core::testing::{MockQueryRunner, BEGIN, COMMIT, ROLLBACK};

    fn unit(timestamp: i64, name: &str, up: &str, down: &str) -> Box<dyn Migration> {
        Box::new(SqlMigration::new(
            timestamp,
            name,
            vec![up.to_string()],
            vec![down.to_string()],
        ))
    }

    fn units() -> Vec<Box<dyn Migration>> {
        vec![
            unit(2, "add_body", "ALTER TABLE post ADD body text", "ALTER TABLE post DROP body"),
            unit(1, "create_post", "CREATE TABLE post (id int)", "DROP TABLE post"),
        ]
    }

    fn postgres() -> MockQueryRunner {
        let mock = MockQueryRunner::new(Dialect::Postgres);
        mock.on_query("information_schema.tables", vec![Row::from_pairs([("n", Value::Int(1))])]);
        mock
    }

    fn applied(mock: &MockQueryRunner, records: &[(i64, i64, &str, Option<String>)]) {
        mock.on_query(
            r#"FROM "migrations" ORDER BY"#,
            records
                .iter()
                .map(|(id, ts, name, checksum)| {
                    Row::from_pairs([
                        ("id", Value::Int(*id)),
                        ("timestamp", Value::Int(*ts)),
                        ("name", Value::from(*name)),
                        ("checksum", Value::from(checksum.clone())),
                        ("applied_at", Value::Int(0)),
                    ])
                })
                .collect(),
        );
    }

    fn executed(mock: &MockQueryRunner) -> Vec<String> {
        mock.statements()
            .into_iter()
            .filter(|s| !s.starts_with("SELECT"))
            .collect()
    }

    #[test]
    fn test_checksum_covers_both_directions() {
        let a = SqlMigration::new(1, "a", vec!["SELECT 1".into()], vec![]);
        let b = SqlMigration::new(1, "a", vec!["SELECT 1".into()], vec!["SELECT 2".into()]);
        assert_eq!(a.checksum(), a.clone().checksum());
        assert_ne!(a.checksum(), b.checksum());
        assert_eq!(a.checksum().map(|c| c.len()), Some(64));
    }

    #[tokio::test]
    async fn test_run_all_in_one_transaction() {
        let mock = postgres();
        let mut conn = mock.clone();
        let units = units();

        let mut runner = MigrationRunner::new(&mut conn, RunOptions::default());
        let applied = runner.run(&units).await.unwrap();
        assert_eq!(applied, vec!["1_create_post", "2_add_body"]);
        assert_eq!(runner.state(), RunState::Committed);

        let statements = executed(&mock);
        assert_eq!(statements[0], BEGIN);
        assert_eq!(statements[1], "CREATE TABLE post (id int)");
        assert!(statements[2].starts_with("INSERT INTO \"migrations\""));
        assert_eq!(statements[3], "ALTER TABLE post ADD body text");
        assert_eq!(statements.last().map(String::as_str), Some(COMMIT));
        mock.assert_executed("pg_advisory_lock");
        mock.assert_executed("pg_advisory_unlock");
    }

    #[tokio::test]
    async fn test_failure_in_all_mode_rolls_back_everything() {
        let mock = postgres();
        mock.fail_on("ADD body", "syntax error");
        let mut conn = mock.clone();
        let units = units();

        let mut runner = MigrationRunner::new(&mut conn, RunOptions::default());
        let err = runner.run(&units).await.unwrap_err();
        assert!(matches!(err, ShiftError::Migration { ref name, .. } if name == "2_add_body"));
        assert_eq!(err.failed_statement(), Some("ALTER TABLE post ADD body text"));
        assert_eq!(runner.state(), RunState::RolledBack);

        let statements = executed(&mock);
        assert_eq!(statements.last().map(String::as_str), Some(ROLLBACK));
        assert!(!statements.contains(&COMMIT.to_string()));
        mock.assert_executed("pg_advisory_unlock");
    }

    #[tokio::test]
    async fn test_failure_in_each_mode_keeps_earlier_units() {
        let mock = postgres();
        mock.fail_on("ADD body", "syntax error");
        let mut conn = mock.clone();
        let units = units();

        let options = RunOptions {
            transaction: TransactionMode::Each,
            ..RunOptions::default()
        };
        let mut runner = MigrationRunner::new(&mut conn, options);
        assert!(runner.run(&units).await.is_err());

        let statements = executed(&mock);
        let commits = statements.iter().filter(|s| *s == COMMIT).count();
        assert_eq!(commits, 1);
        assert_eq!(mock.statements_matching("^INSERT INTO").len(), 1);
        assert_eq!(statements.last().map(String::as_str), Some(ROLLBACK));
    }

    #[tokio::test]
    async fn test_fake_records_without_running() {
        let mock = postgres();
        let mut conn = mock.clone();
        let units = units();

        let options = RunOptions {
            fake: true,
            ..RunOptions::default()
        };
        let mut runner = MigrationRunner::new(&mut conn, options);
        runner.run(&units).await.unwrap();
        mock.assert_not_executed("CREATE TABLE post");
        assert_eq!(mock.statements_matching("^INSERT INTO").len(), 2);
    }

    #[tokio::test]
    async fn test_second_run_applies_nothing() {
        let mock = postgres();
        let units = units();
        let records: Vec<_> = units
            .iter()
            .enumerate()
            .map(|(i, u)| (i as i64 + 1, u.timestamp(), u.name(), u.checksum()))
            .collect();
        applied(&mock, &records);
        let mut conn = mock.clone();

        let mut runner = MigrationRunner::new(&mut conn, RunOptions::default());
        assert!(runner.run(&units).await.unwrap().is_empty());
        mock.assert_not_executed("^INSERT");
        mock.assert_not_executed(BEGIN);
    }

    #[tokio::test]
    async fn test_orphaned_record_refuses_unless_forced() {
        let mock = postgres();
        applied(&mock, &[(1, 99, "vanished", None)]);
        let units = units();

        let mut conn = mock.clone();
        let mut runner = MigrationRunner::new(&mut conn, RunOptions::default());
        assert!(matches!(
            runner.run(&units).await,
            Err(ShiftError::MigrationIntegrity(_))
        ));
        mock.assert_not_executed("CREATE TABLE post");

        let options = RunOptions {
            force: true,
            ..RunOptions::default()
        };
        let mut conn = mock.clone();
        let mut runner = MigrationRunner::new(&mut conn, options);
        assert_eq!(runner.run(&units).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_revert_pops_latest() {
        let mock = postgres();
        let units = units();
        applied(&mock, &[(1, 1, "create_post", None), (2, 2, "add_body", None)]);
        let mut conn = mock.clone();

        let mut runner = MigrationRunner::new(&mut conn, RunOptions::default());
        let reverted = runner.revert(&units).await.unwrap();
        assert_eq!(reverted.as_deref(), Some("2_add_body"));
        assert_eq!(
            executed(&mock),
            vec![
                BEGIN.to_string(),
                "ALTER TABLE post DROP body".to_string(),
                "DELETE FROM \"migrations\" WHERE \"id\" = $1".to_string(),
                COMMIT.to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn test_failed_revert_keeps_record() {
        let mock = postgres();
        mock.fail_on("DROP body", "locked");
        let units = units();
        applied(&mock, &[(1, 1, "create_post", None), (2, 2, "add_body", None)]);
        let mut conn = mock.clone();

        let mut runner = MigrationRunner::new(&mut conn, RunOptions::default());
        assert!(runner.revert(&units).await.is_err());
        mock.assert_not_executed("^DELETE");
        assert_eq!(executed(&mock).last().map(String::as_str), Some(ROLLBACK));
    }

    #[tokio::test]
    async fn test_all_mode_rejects_non_transactional_unit() {
        let mock = postgres();
        let mut conn = mock.clone();
        let concurrent = SqlMigration::new(
            1,
            "concurrent_index",
            vec!["CREATE INDEX CONCURRENTLY i ON post (id)".into()],
            vec![],
        )
        .without_transaction();
        let units: Vec<Box<dyn Migration>> = vec![Box::new(concurrent)];
        let mut runner = MigrationRunner::new(&mut conn, RunOptions::default());
        assert!(matches!(
            runner.run(&units).await,
            Err(ShiftError::InvalidArgument(_))
        ));
    }

    #[tokio::test]
    async fn test_duplicate_timestamps_rejected() {
        let mock = postgres();
        let mut conn = mock.clone();
        let units = vec![unit(1, "a", "SELECT 1", ""), unit(1, "b", "SELECT 2", "")];
        let mut runner = MigrationRunner::new(&mut conn, RunOptions::default());
        assert!(matches!(
            runner.run(&units).await,
            Err(ShiftError::MigrationIntegrity(_))
        ));
        assert!(mock.statements().is_empty());
    }

    #[tokio::test]
    async fn test_sqlite_session_wraps_run() {
        let mock = MockQueryRunner::new(Dialect::Sqlite);
        let mut conn = mock.clone();
        let units = units();
        let mut runner = MigrationRunner::new(&mut conn, RunOptions::default());
        runner.run(&units).await.unwrap();

        let statements = mock.statements();
        assert_eq!(statements[0], "PRAGMA foreign_keys = OFF");
        assert_eq!(statements.last().map(String::as_str), Some("PRAGMA foreign_keys = ON"));
        mock.assert_executed("PRAGMA foreign_key_check");
    }

    #[tokio::test]
    async fn test_failed_session_setup_releases_lock() {
        let caps: &'static DialectCapabilities = Box::leak(Box::new(DialectCapabilities {
            session_setup: &["SET lock_timeout = '5s'"],
            ..Dialect::Postgres.capabilities().clone()
        }));
        let mock = postgres();
        mock.fail_on("lock_timeout", "permission denied");
        let mut conn = mock.clone();
        let units = units();

        let options = RunOptions {
            lock: true,
            ..RunOptions::default()
        };
        let mut runner = MigrationRunner::new(&mut conn, options).with_capabilities(caps);
        assert!(runner.run(&units).await.is_err());
        mock.assert_executed("pg_advisory_lock");
        mock.assert_executed("pg_advisory_unlock");
        mock.assert_not_executed("CREATE TABLE post");

        mock.clear_statements();
        assert!(runner.revert(&units).await.is_err());
        mock.assert_executed("pg_advisory_unlock");
    }

    #[tokio::test]
    async fn test_each_mode_checks_integrity_after_non_transactional_unit() {
        let mock = MockQueryRunner::new(Dialect::Sqlite);
        mock.on_query(
            "foreign_key_check",
            vec![Row::from_pairs([("table", Value::from("comment"))])],
        );
        let mut conn = mock.clone();
        let outside = SqlMigration::new(
            1,
            "drop_post",
            vec!["DROP TABLE post".into()],
            vec![],
        )
        .without_transaction();
        let units: Vec<Box<dyn Migration>> = vec![Box::new(outside)];

        let options = RunOptions {
            transaction: TransactionMode::Each,
            ..RunOptions::default()
        };
        let mut runner = MigrationRunner::new(&mut conn, options);
        assert!(matches!(
            runner.run(&units).await,
            Err(ShiftError::MigrationIntegrity(_))
        ));
        mock.assert_executed("DROP TABLE post");
        mock.assert_not_executed(BEGIN);
    }
}
