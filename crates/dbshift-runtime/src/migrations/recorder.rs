//! Bookkeeping table access.

use std::collections::{HashMap, HashSet};

use dbshift_core::db::{QueryRunner, Row, Value};
use dbshift_core::dialect::{CatalogFamily, Dialect, DialectCapabilities};
use dbshift_core::error::{Result, ShiftError};
use dbshift_core::schema::{
    ColumnDef, Generation, LogicalType, NamingStrategy, SchemaModel, TableDef,
};
use serde::Serialize;
use tracing::debug;

use super::synth::DdlSynthesizer;

/// One row of the bookkeeping table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MigrationRecord {
    pub id: i64,
    /// Unit identifier, usually epoch milliseconds.
    pub timestamp: i64,
    pub name: String,
    pub checksum: Option<String>,
    /// Epoch milliseconds.
    pub applied_at: i64,
}

impl MigrationRecord {
    fn from_row(row: &Row) -> Result<Self> {
        Ok(Self {
            id: row.require_i64("id")?,
            timestamp: row.require_i64("timestamp")?,
            name: row.get_string("name")?,
            checksum: row.get_str("checksum"),
            applied_at: row.require_i64("applied_at")?,
        })
    }
}

/// What the bookkeeping needs to know about a migration unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnitInfo {
    pub timestamp: i64,
    pub name: String,
    pub checksum: Option<String>,
}

impl UnitInfo {
    pub fn new(timestamp: i64, name: impl Into<String>) -> Self {
        Self {
            timestamp,
            name: name.into(),
            checksum: None,
        }
    }

    pub fn with_checksum(mut self, checksum: impl Into<String>) -> Self {
        self.checksum = Some(checksum.into());
        self
    }

    /// `<timestamp>_<name>`, the unit's file stem.
    pub fn full_name(&self) -> String {
        format!("{}_{}", self.timestamp, self.name)
    }
}

/// Known units set against the recorded ones.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MigrationStatus {
    /// Records with a matching unit, ascending by timestamp.
    pub applied: Vec<MigrationRecord>,
    /// Units without a record, ascending by timestamp.
    pub pending: Vec<UnitInfo>,
    /// Pending units older than the newest record.
    pub out_of_order: Vec<UnitInfo>,
    /// Records no known unit matches.
    pub orphaned: Vec<MigrationRecord>,
    /// Names of applied units whose checksum changed since they ran.
    pub checksum_mismatches: Vec<String>,
}

impl MigrationStatus {
    /// Units match records by timestamp. The recorded set is an explicit
    /// input, never cached between calls.
    pub fn compute(units: &[UnitInfo], records: &[MigrationRecord]) -> Self {
        let by_timestamp: HashMap<i64, &UnitInfo> =
            units.iter().map(|u| (u.timestamp, u)).collect();
        let recorded: HashSet<i64> = records.iter().map(|r| r.timestamp).collect();
        let newest = records.iter().map(|r| r.timestamp).max();

        let mut status = MigrationStatus::default();
        for record in records {
            match by_timestamp.get(&record.timestamp) {
                Some(unit) => {
                    if let (Some(recorded), Some(current)) = (&record.checksum, &unit.checksum) {
                        if recorded != current {
                            status.checksum_mismatches.push(unit.full_name());
                        }
                    }
                    status.applied.push(record.clone());
                }
                None => status.orphaned.push(record.clone()),
            }
        }
        status.applied.sort_by_key(|r| (r.timestamp, r.id));

        let mut pending: Vec<UnitInfo> = units
            .iter()
            .filter(|u| !recorded.contains(&u.timestamp))
            .cloned()
            .collect();
        pending.sort_by_key(|u| u.timestamp);
        status.out_of_order = pending
            .iter()
            .filter(|u| newest.map(|n| u.timestamp < n).unwrap_or(false))
            .cloned()
            .collect();
        status.pending = pending;
        status
    }

    pub fn is_up_to_date(&self) -> bool {
        self.pending.is_empty()
    }

    /// The integrity failure, if any. Checksums count only when verified.
    pub fn integrity_error(&self, verify_checksums: bool) -> Option<ShiftError> {
        if let Some(record) = self.orphaned.first() {
            return Some(ShiftError::MigrationIntegrity(format!(
                "recorded migration {}_{} has no matching migration unit ({} orphaned)",
                record.timestamp,
                record.name,
                self.orphaned.len()
            )));
        }
        if verify_checksums && !self.checksum_mismatches.is_empty() {
            return Some(ShiftError::MigrationIntegrity(format!(
                "applied migrations changed since they ran: {}",
                self.checksum_mismatches.join(", ")
            )));
        }
        None
    }
}

/// Reads and writes the bookkeeping table.
pub struct MigrationRecorder {
    caps: &'static DialectCapabilities,
    table: TableDef,
}

impl MigrationRecorder {
    pub fn new(dialect: Dialect, table_name: impl Into<String>) -> Self {
        Self::build(dialect, TableDef::new(table_name))
    }

    /// Keep the bookkeeping table in this schema instead of the current one.
    pub fn in_schema(self, schema: Option<String>) -> Self {
        let mut table = self.table;
        table.schema = schema;
        Self::build(self.caps.dialect, table)
    }

    fn build(dialect: Dialect, shell: TableDef) -> Self {
        let caps = dialect.capabilities();
        let table = TableDef {
            columns: vec![
                ColumnDef::new("id", LogicalType::Integer)
                    .primary()
                    .generated_by(Generation::Increment),
                ColumnDef::new("timestamp", LogicalType::BigInt),
                ColumnDef::varchar("name", 255),
                ColumnDef::varchar("checksum", 64).nullable(),
                ColumnDef::new("applied_at", LogicalType::BigInt),
            ],
            ..shell
        };
        let mut model = SchemaModel::new().with_table(table);
        model.resolve_names(&NamingStrategy::new(caps.max_identifier_length));
        let table = model.tables.remove(0);
        Self { caps, table }
    }

    pub fn table(&self) -> &TableDef {
        &self.table
    }

    pub fn table_name(&self) -> &str {
        &self.table.name
    }

    fn path(&self) -> String {
        self.caps
            .quote_path(self.table.schema.as_deref(), &self.table.name)
    }

    fn existence_query(&self) -> (String, Vec<Value>) {
        let p = |n| self.caps.placeholder(n);
        let name = Value::from(self.table.name.as_str());
        let (current, catalog) = match self.caps.catalog {
            CatalogFamily::Sqlite => {
                return (
                    format!(
                        "SELECT COUNT(*) AS n FROM sqlite_master WHERE type = 'table' AND name = {}",
                        p(1)
                    ),
                    vec![name],
                )
            }
            CatalogFamily::Postgres => ("current_schema()", "information_schema.tables"),
            CatalogFamily::MySql => ("DATABASE()", "information_schema.tables"),
            CatalogFamily::Mssql => ("SCHEMA_NAME()", "INFORMATION_SCHEMA.TABLES"),
        };
        match &self.table.schema {
            Some(schema) => (
                format!(
                    "SELECT COUNT(*) AS n FROM {} WHERE table_schema = {} AND table_name = {}",
                    catalog,
                    p(1),
                    p(2)
                ),
                vec![Value::from(schema.as_str()), name],
            ),
            None => (
                format!(
                    "SELECT COUNT(*) AS n FROM {} WHERE table_schema = {} AND table_name = {}",
                    catalog,
                    current,
                    p(1)
                ),
                vec![name],
            ),
        }
    }

    pub async fn has_table(&self, runner: &mut dyn QueryRunner) -> Result<bool> {
        let (sql, params) = self.existence_query();
        let rows = runner.query(&sql, &params).await?;
        Ok(rows
            .first()
            .and_then(|r| r.get_i64("n"))
            .map(|n| n > 0)
            .unwrap_or(false))
    }

    /// Create the table unless it exists.
    pub async fn ensure_table(&self, runner: &mut dyn QueryRunner) -> Result<()> {
        if self.has_table(runner).await? {
            return Ok(());
        }
        debug!(table = %self.table.name, "Creating bookkeeping table");
        let statements = DdlSynthesizer::new(self.caps.dialect).create_table(&self.table)?;
        for statement in &statements {
            runner.execute(statement).await?;
        }
        Ok(())
    }

    /// Every record, ascending by timestamp.
    pub async fn list(&self, runner: &mut dyn QueryRunner) -> Result<Vec<MigrationRecord>> {
        let q = |c: &str| self.caps.quote_ident(c);
        let sql = format!(
            "SELECT {}, {}, {}, {}, {} FROM {} ORDER BY {} ASC, {} ASC",
            q("id"),
            q("timestamp"),
            q("name"),
            q("checksum"),
            q("applied_at"),
            self.path(),
            q("timestamp"),
            q("id")
        );
        let rows = runner.query(&sql, &[]).await?;
        rows.iter().map(MigrationRecord::from_row).collect()
    }

    pub async fn record(
        &self,
        runner: &mut dyn QueryRunner,
        unit: &UnitInfo,
        applied_at: i64,
    ) -> Result<()> {
        let q = |c: &str| self.caps.quote_ident(c);
        let sql = format!(
            "INSERT INTO {} ({}, {}, {}, {}) VALUES ({}, {}, {}, {})",
            self.path(),
            q("timestamp"),
            q("name"),
            q("checksum"),
            q("applied_at"),
            self.caps.placeholder(1),
            self.caps.placeholder(2),
            self.caps.placeholder(3),
            self.caps.placeholder(4)
        );
        let params = [
            Value::Int(unit.timestamp),
            Value::from(unit.name.as_str()),
            Value::from(unit.checksum.clone()),
            Value::Int(applied_at),
        ];
        runner.query(&sql, &params).await?;
        Ok(())
    }

    pub async fn delete(&self, runner: &mut dyn QueryRunner, record: &MigrationRecord) -> Result<()> {
        let sql = format!(
            "DELETE FROM {} WHERE {} = {}",
            self.path(),
            self.caps.quote_ident("id"),
            self.caps.placeholder(1)
        );
        runner.query(&sql, &[Value::Int(record.id)]).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dbshift_core::testing::MockQueryRunner;

    fn record(id: i64, timestamp: i64, name: &str, checksum: Option<&str>) -> MigrationRecord {
        MigrationRecord {
            id,
            timestamp,
            name: name.into(),
            checksum: checksum.map(str::to_string),
            applied_at: 0,
        }
    }

    #[test]
    fn test_status_pending_and_out_of_order() {
        let units = vec![
            UnitInfo::new(3, "third"),
            UnitInfo::new(1, "first"),
            UnitInfo::new(2, "second"),
            UnitInfo::new(4, "fourth"),
        ];
        let records = vec![record(1, 1, "first", None), record(2, 3, "third", None)];
        let status = MigrationStatus::compute(&units, &records);

        assert_eq!(status.applied.len(), 2);
        let pending: Vec<i64> = status.pending.iter().map(|u| u.timestamp).collect();
        assert_eq!(pending, vec![2, 4]);
        assert_eq!(status.out_of_order, vec![UnitInfo::new(2, "second")]);
        assert!(status.integrity_error(true).is_none());
    }

    #[test]
    fn test_status_integrity() {
        let units = vec![UnitInfo::new(1, "first").with_checksum("aaa")];

        let orphan = MigrationStatus::compute(&units, &[record(1, 9, "gone", None)]);
        assert!(matches!(
            orphan.integrity_error(false),
            Some(ShiftError::MigrationIntegrity(_))
        ));

        let changed = MigrationStatus::compute(&units, &[record(1, 1, "first", Some("bbb"))]);
        assert_eq!(changed.checksum_mismatches, vec!["1_first"]);
        assert!(changed.integrity_error(true).is_some());
        assert!(changed.integrity_error(false).is_none());
    }

    #[test]
    fn test_bookkeeping_table_shape() {
        let recorder = MigrationRecorder::new(Dialect::Postgres, "migrations");
        let table = recorder.table();
        assert_eq!(table.primary_columns(), vec!["id"]);
        assert!(table.primary_key_name.is_some());
        assert!(table.get_column("checksum").map(|c| c.nullable).unwrap_or(false));
    }

    #[tokio::test]
    async fn test_ensure_table_creates_once() {
        let mock = MockQueryRunner::new(Dialect::Sqlite);
        let mut runner = mock.clone();
        let recorder = MigrationRecorder::new(Dialect::Sqlite, "migrations");

        recorder.ensure_table(&mut runner).await.unwrap();
        mock.assert_executed(r#"^CREATE TABLE "migrations" \("id" integer NOT NULL PRIMARY KEY AUTOINCREMENT"#);

        mock.clear_statements();
        mock.on_query("sqlite_master", vec![Row::from_pairs([("n", Value::Int(1))])]);
        recorder.ensure_table(&mut runner).await.unwrap();
        mock.assert_not_executed("CREATE TABLE");
    }

    #[tokio::test]
    async fn test_list_and_record() {
        let mock = MockQueryRunner::new(Dialect::Postgres);
        mock.on_query(
            r#"FROM "migrations""#,
            vec![Row::from_pairs([
                ("id", Value::Int(1)),
                ("timestamp", Value::Int(1700000000000)),
                ("name", Value::from("create_post")),
                ("checksum", Value::Null),
                ("applied_at", Value::Int(1700000000500)),
            ])],
        );
        let mut runner = mock.clone();
        let recorder = MigrationRecorder::new(Dialect::Postgres, "migrations");

        let records = recorder.list(&mut runner).await.unwrap();
        assert_eq!(records, vec![MigrationRecord {
            id: 1,
            timestamp: 1700000000000,
            name: "create_post".into(),
            checksum: None,
            applied_at: 1700000000500,
        }]);

        recorder
            .record(&mut runner, &UnitInfo::new(1700000000001, "add_body"), 5)
            .await
            .unwrap();
        mock.assert_executed(
            r#"^INSERT INTO "migrations" \("timestamp", "name", "checksum", "applied_at"\) VALUES \(\$1, \$2, \$3, \$4\)$"#,
        );

        recorder.delete(&mut runner, &records[0]).await.unwrap();
        mock.assert_executed(r#"^DELETE FROM "migrations" WHERE "id" = \$1$"#);
    }

    #[tokio::test]
    async fn test_schema_qualified_table() {
        let mock = MockQueryRunner::new(Dialect::Postgres);
        let mut runner = mock.clone();
        let recorder =
            MigrationRecorder::new(Dialect::Postgres, "schema_history").in_schema(Some("ops".into()));
        assert!(!recorder.has_table(&mut runner).await.unwrap());
        mock.assert_executed(r"table_schema = \$1 AND table_name = \$2");
        recorder.list(&mut runner).await.unwrap();
        mock.assert_executed(r#"FROM "ops"."schema_history""#);
    }
}
