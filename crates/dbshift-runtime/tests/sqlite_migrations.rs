//! End-to-end migration tests against in-memory SQLite.

use chrono::{TimeZone, Utc};
use dbshift_core::db::QueryRunner;
use dbshift_core::dialect::Dialect;
use dbshift_core::schema::{
    ColumnDef, ForeignKeyDef, Generation, IndexDef, LogicalType, ReferentialAction, SchemaModel,
    TableDef,
};
use dbshift_core::testing::test_database_url;
use dbshift_runtime::db::{Database, SqlxQueryRunner};
use dbshift_runtime::introspect::Introspector;
use dbshift_runtime::migrations::{
    DdlSynthesizer, Migration, MigrationGenerator, MigrationRunner, RunOptions, SchemaDiffer,
    SchemaSynchronizer, SqlMigration,
};

fn post(name_length: u32) -> TableDef {
    TableDef::new("post")
        .column(
            ColumnDef::new("id", LogicalType::Integer)
                .primary()
                .generated_by(Generation::Increment),
        )
        .column(ColumnDef::varchar("name", name_length))
}

fn blog() -> SchemaModel {
    // Listed before the table it references.
    let comment = TableDef::new("comment")
        .column(
            ColumnDef::new("id", LogicalType::Integer)
                .primary()
                .generated_by(Generation::Increment),
        )
        .column(ColumnDef::new("post_id", LogicalType::Integer))
        .column(ColumnDef::new("body", LogicalType::Text).nullable())
        .index(IndexDef::new(&["post_id"]))
        .foreign_key(
            ForeignKeyDef::new(&["post_id"], "post", &["id"])
                .on_delete(ReferentialAction::Cascade),
        );
    SchemaModel::new()
        .with_table(comment)
        .with_table(post(50))
}

async fn sqlite() -> (Database, SqlxQueryRunner) {
    let db = Database::connect("sqlite::memory:").await.unwrap();
    let runner = db.runner().await.unwrap();
    (db, runner)
}

async fn introspect(runner: &mut SqlxQueryRunner) -> SchemaModel {
    Introspector::new(Dialect::Sqlite)
        .introspect(runner, None)
        .await
        .unwrap()
}

/// Generate a migration for the current drift, as `migration:generate` does.
async fn generate(runner: &mut SqlxQueryRunner, desired: &SchemaModel, at: i64) -> SqlMigration {
    let actual = introspect(runner).await;
    let created_at = Utc.timestamp_millis_opt(at).unwrap();
    let generated = MigrationGenerator::new(Dialect::Sqlite, "migrations")
        .generate("change", desired, &actual, created_at)
        .unwrap()
        .expect("schema drift");
    SqlMigration::new(generated.timestamp, generated.name, generated.up, generated.down)
}

#[tokio::test]
async fn test_sync_is_idempotent() {
    let (_db, mut runner) = sqlite().await;
    let desired = blog();

    let executed = SchemaSynchronizer::new(Dialect::Sqlite)
        .sync(&mut runner, &desired)
        .await
        .unwrap();
    assert!(!executed.is_empty());

    let actual = introspect(&mut runner).await;
    let diff = SchemaDiffer::new(Dialect::Sqlite)
        .diff(&desired, &actual)
        .unwrap();
    assert!(diff.is_empty(), "unexpected drift: {:?}", diff.describe());

    let again = SchemaSynchronizer::new(Dialect::Sqlite)
        .sync(&mut runner, &desired)
        .await
        .unwrap();
    assert!(again.is_empty());
}

#[tokio::test]
async fn test_referenced_table_is_created_first() {
    let (_db, mut runner) = sqlite().await;
    let batch = SchemaSynchronizer::new(Dialect::Sqlite)
        .plan(&mut runner, &blog())
        .await
        .unwrap();

    let position = |needle: &str| {
        batch
            .up
            .iter()
            .position(|s| s.starts_with(needle))
            .unwrap_or_else(|| panic!("missing {}", needle))
    };
    assert!(position("CREATE TABLE \"post\"") < position("CREATE TABLE \"comment\""));
    assert!(position("CREATE TABLE \"comment\"") < position("CREATE INDEX"));

    // Down undoes in reverse: the referencing table goes first.
    let drop_comment = batch.down.iter().position(|s| s == "DROP TABLE \"comment\"");
    let drop_post = batch.down.iter().position(|s| s == "DROP TABLE \"post\"");
    assert!(drop_comment.is_some() && drop_comment < drop_post);
}

#[tokio::test]
async fn test_up_then_down_restores_schema() {
    let (_db, mut runner) = sqlite().await;
    SchemaSynchronizer::new(Dialect::Sqlite)
        .sync(&mut runner, &SchemaModel::new().with_table(post(50)))
        .await
        .unwrap();
    let before = introspect(&mut runner).await;

    let unit = generate(&mut runner, &blog(), 1_700_000_000_000).await;
    let units: Vec<Box<dyn Migration>> = vec![Box::new(unit)];

    let mut migrations = MigrationRunner::new(&mut runner, RunOptions::default());
    let applied = migrations.run(&units).await.unwrap();
    assert_eq!(applied, vec!["1700000000000_change"]);
    let reverted = migrations.revert(&units).await.unwrap();
    assert_eq!(reverted.as_deref(), Some("1700000000000_change"));

    let after = introspect(&mut runner).await;
    let diff = SchemaDiffer::new(Dialect::Sqlite).diff(&before, &after).unwrap();
    assert!(diff.is_empty(), "unexpected drift: {:?}", diff.describe());
    assert!(!after.contains("comment"));
}

#[tokio::test]
async fn test_widening_keeps_rows() {
    let (_db, mut runner) = sqlite().await;
    SchemaSynchronizer::new(Dialect::Sqlite)
        .sync(&mut runner, &SchemaModel::new().with_table(post(50)))
        .await
        .unwrap();

    let fifty = "a".repeat(50);
    runner
        .execute(&format!("INSERT INTO \"post\" (\"name\") VALUES ('{}')", fifty))
        .await
        .unwrap();

    let widened = SchemaModel::new().with_table(post(80));
    let executed = SchemaSynchronizer::new(Dialect::Sqlite)
        .sync(&mut runner, &widened)
        .await
        .unwrap();
    assert!(executed
        .iter()
        .any(|s| s.starts_with("CREATE TABLE \"temporary_post\"")));

    let rows = runner
        .query("SELECT \"id\", \"name\" FROM \"post\"", &[])
        .await
        .unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get_i64("id"), Some(1));
    assert_eq!(rows[0].get_str("name"), Some(fifty));

    runner
        .execute(&format!("INSERT INTO \"post\" (\"name\") VALUES ('{}')", "b".repeat(80)))
        .await
        .unwrap();

    let actual = introspect(&mut runner).await;
    assert_eq!(
        actual.table("post").and_then(|t| t.get_column("name")).and_then(|c| c.length),
        Some(80)
    );
}

#[tokio::test]
async fn test_units_apply_exactly_once() {
    let (_db, mut runner) = sqlite().await;
    let first = generate(&mut runner, &SchemaModel::new().with_table(post(50)), 1_000).await;
    let units: Vec<Box<dyn Migration>> = vec![Box::new(first)];

    let mut migrations = MigrationRunner::new(&mut runner, RunOptions::default());
    assert_eq!(migrations.run(&units).await.unwrap().len(), 1);
    assert!(migrations.run(&units).await.unwrap().is_empty());

    let status = migrations.show(&units).await.unwrap();
    assert_eq!(status.applied.len(), 1);
    assert!(status.pending.is_empty());
    assert_eq!(status.applied[0].name, "change");
}

#[tokio::test]
async fn test_create_post_scenario() {
    let (_db, mut runner) = sqlite().await;
    let unit = generate(&mut runner, &SchemaModel::new().with_table(post(50)), 1_000).await;
    assert_eq!(
        unit.up,
        vec!["CREATE TABLE \"post\" (\"id\" integer NOT NULL PRIMARY KEY AUTOINCREMENT, \"name\" varchar(50) NOT NULL)"]
    );
    assert_eq!(unit.down, vec!["DROP TABLE \"post\""]);

    let units: Vec<Box<dyn Migration>> = vec![Box::new(unit)];
    MigrationRunner::new(&mut runner, RunOptions::default())
        .run(&units)
        .await
        .unwrap();

    let rows = runner
        .query("SELECT COUNT(*) AS n FROM \"migrations\"", &[])
        .await
        .unwrap();
    assert_eq!(rows[0].get_i64("n"), Some(1));
    assert!(introspect(&mut runner).await.contains("post"));
}

#[tokio::test]
async fn test_failed_unit_leaves_no_record() {
    let (_db, mut runner) = sqlite().await;
    let good = SqlMigration::new(1, "create_tag", vec!["CREATE TABLE \"tag\" (\"id\" integer)".into()], vec![]);
    let bad = SqlMigration::new(2, "broken", vec!["ALTER TABLE \"missing\" ADD \"x\" integer".into()], vec![]);
    let units: Vec<Box<dyn Migration>> = vec![Box::new(good), Box::new(bad)];

    let err = MigrationRunner::new(&mut runner, RunOptions::default())
        .run(&units)
        .await
        .unwrap_err();
    assert_eq!(err.failed_statement(), Some("ALTER TABLE \"missing\" ADD \"x\" integer"));

    // The whole batch was one transaction.
    assert!(!introspect(&mut runner).await.contains("tag"));
    let rows = runner
        .query("SELECT COUNT(*) AS n FROM \"migrations\"", &[])
        .await
        .unwrap();
    assert_eq!(rows[0].get_i64("n"), Some(0));
}

/// SQLite ignores declared lengths, so the widened limit is enforced by
/// servers that get a real type change.
#[test]
fn test_widening_changes_type_on_postgres() {
    let desired = SchemaModel::new().with_table(post(80));
    let actual = SchemaModel::new().with_table(post(50));
    let diff = SchemaDiffer::new(Dialect::Postgres)
        .diff(&desired, &actual)
        .unwrap();
    let batch = DdlSynthesizer::new(Dialect::Postgres)
        .synthesize(&diff)
        .unwrap();
    assert_eq!(
        batch.up,
        vec!["ALTER TABLE \"post\" ALTER COLUMN \"name\" TYPE character varying(80)"]
    );
    assert!(batch.up.iter().all(|s| !s.contains("temporary_post")));
}

/// Length enforcement after widening needs a server that enforces it.
/// Runs only when `TEST_DATABASE_URL` points at Postgres.
#[tokio::test]
async fn test_widening_enforces_new_length_on_postgres() {
    let Some(url) = test_database_url() else {
        return;
    };
    if !url.starts_with("postgres") {
        return;
    }
    let db = Database::connect(&url).await.unwrap();
    let mut runner = db.runner().await.unwrap();
    let table = TableDef::new("dbshift_widen_probe")
        .column(ColumnDef::new("id", LogicalType::Integer).primary())
        .column(ColumnDef::varchar("name", 50));
    runner
        .execute("DROP TABLE IF EXISTS \"dbshift_widen_probe\"")
        .await
        .unwrap();

    let filter = vec!["dbshift_widen_probe".to_string()];
    let sync = SchemaSynchronizer::new(Dialect::Postgres).with_filter(filter);
    sync.sync(&mut runner, &SchemaModel::new().with_table(table.clone()))
        .await
        .unwrap();
    runner
        .execute(&format!(
            "INSERT INTO \"dbshift_widen_probe\" VALUES (1, '{}')",
            "a".repeat(50)
        ))
        .await
        .unwrap();

    let mut widened = table;
    if let Some(name) = widened.get_column_mut("name") {
        name.length = Some(80);
    }
    sync.sync(&mut runner, &SchemaModel::new().with_table(widened))
        .await
        .unwrap();

    runner
        .execute(&format!(
            "INSERT INTO \"dbshift_widen_probe\" VALUES (2, '{}')",
            "b".repeat(80)
        ))
        .await
        .unwrap();
    assert!(runner
        .execute(&format!(
            "INSERT INTO \"dbshift_widen_probe\" VALUES (3, '{}')",
            "c".repeat(81)
        ))
        .await
        .is_err());

    runner
        .execute("DROP TABLE \"dbshift_widen_probe\"")
        .await
        .unwrap();
    runner.release().await.unwrap();
    db.close().await;
}
