//! DDL synthesis.
//!
//! Renders an ordered [`SchemaDiff`] as up statements and the down
//! statements that undo them. Each operation is rendered against the model
//! state it sees during the migration, so a later operation on the same
//! table renders from what the earlier ones left behind.

mod in_place;
mod rebuild;
mod render;

use dbshift_core::dialect::{Dialect, DialectCapabilities};
use dbshift_core::error::{Result, ShiftError};
use dbshift_core::schema::{ColumnDef, GeneratedKind, Generation, SchemaModel, TableDef};
use tracing::debug;

use super::diff::SchemaDiff;
use super::operation::SchemaOperation;

pub(crate) use in_place::InPlaceAlterStrategy;
pub(crate) use rebuild::RebuildStrategy;
pub(crate) use render::SqlRenderer;

/// Renders one operation, given the models before and after it.
pub(crate) trait AlterStrategy {
    fn render(
        &self,
        op: &SchemaOperation,
        before: &SchemaModel,
        after: &SchemaModel,
    ) -> Result<Vec<String>>;
}

/// Statements for one migration in both directions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SqlBatch {
    pub up: Vec<String>,
    /// Undo statements, already in execution order.
    pub down: Vec<String>,
}

impl SqlBatch {
    pub fn is_empty(&self) -> bool {
        self.up.is_empty()
    }
}

/// Turns schema operations into dialect SQL.
pub struct DdlSynthesizer {
    caps: &'static DialectCapabilities,
    in_place: InPlaceAlterStrategy,
    rebuild: RebuildStrategy,
}

impl DdlSynthesizer {
    pub fn new(dialect: Dialect) -> Self {
        let caps = dialect.capabilities();
        let renderer = SqlRenderer::new(caps);
        Self {
            caps,
            in_place: InPlaceAlterStrategy::new(renderer),
            rebuild: RebuildStrategy::new(renderer),
        }
    }

    pub fn dialect(&self) -> Dialect {
        self.caps.dialect
    }

    /// Render the diff. Up runs the operations in order; down runs the
    /// inverse of each, last operation first.
    pub fn synthesize(&self, diff: &SchemaDiff) -> Result<SqlBatch> {
        let mut working = diff.base.clone();
        let mut up = Vec::new();
        let mut downs: Vec<Vec<String>> = Vec::with_capacity(diff.operations.len());

        for op in &diff.operations {
            let before = working.clone();
            op.apply_to(&mut working)?;

            up.extend(self.render(op, &before, &working)?);
            downs.push(self.render(&op.inverse(), &working, &before)?);
        }

        let down = downs.into_iter().rev().flatten().collect();
        debug!(
            dialect = %self.caps.dialect,
            up = up.len(),
            "Synthesized DDL"
        );
        Ok(SqlBatch { up, down })
    }

    /// Statements creating one table, indices included.
    pub fn create_table(&self, table: &TableDef) -> Result<Vec<String>> {
        SqlRenderer::new(self.caps).create_table(table)
    }

    fn render(
        &self,
        op: &SchemaOperation,
        before: &SchemaModel,
        after: &SchemaModel,
    ) -> Result<Vec<String>> {
        self.strategy_for(op).render(op, before, after).map_err(|e| match e {
            ShiftError::UnsupportedOperation { dialect, message } => {
                ShiftError::UnsupportedOperation {
                    dialect,
                    message: format!("{} ({})", message, op),
                }
            }
            other => other,
        })
    }

    fn strategy_for(&self, op: &SchemaOperation) -> &dyn AlterStrategy {
        if self.needs_rebuild(op) {
            &self.rebuild
        } else {
            &self.in_place
        }
    }

    fn needs_rebuild(&self, op: &SchemaOperation) -> bool {
        let triggers = &self.caps.rebuild;
        match op {
            SchemaOperation::ChangeColumn { .. } => triggers.change_column,
            SchemaOperation::DropColumn { .. } => triggers.drop_column,
            SchemaOperation::AddColumn { column, .. } => {
                triggers.restricted_add_column && is_restricted_add(column)
            }
            SchemaOperation::AddUnique { .. }
            | SchemaOperation::DropUnique { .. }
            | SchemaOperation::AddCheck { .. }
            | SchemaOperation::DropCheck { .. }
            | SchemaOperation::AddExclusion { .. }
            | SchemaOperation::DropExclusion { .. }
            | SchemaOperation::AddForeignKey { .. }
            | SchemaOperation::DropForeignKey { .. } => triggers.constraints,
            SchemaOperation::ChangePrimaryKey { .. } => triggers.primary_key,
            SchemaOperation::CreateTable { .. }
            | SchemaOperation::DropTable { .. }
            | SchemaOperation::AddIndex { .. }
            | SchemaOperation::DropIndex { .. }
            | SchemaOperation::RenameConstraint { .. } => false,
        }
    }
}

/// Columns a limited `ADD COLUMN` cannot add.
fn is_restricted_add(column: &ColumnDef) -> bool {
    let stored = column
        .generated
        .as_ref()
        .map(|g| g.kind == GeneratedKind::Stored)
        .unwrap_or(false);
    let dynamic_default = column
        .default
        .as_deref()
        .map(|d| !is_constant(d))
        .unwrap_or(false);
    column.primary
        || column.generation != Generation::None
        || stored
        || (!column.nullable && column.default.is_none())
        || dynamic_default
}

fn is_constant(expr: &str) -> bool {
    let expr = expr.trim();
    expr.starts_with('\'')
        || expr.parse::<f64>().is_ok()
        || matches!(
            expr.to_ascii_lowercase().as_str(),
            "null" | "true" | "false"
        )
}

/// Look up a table the operation expects to exist.
pub(crate) fn table_in<'m>(model: &'m SchemaModel, name: &str) -> Result<&'m TableDef> {
    model
        .table(name)
        .ok_or_else(|| ShiftError::InvalidState(format!("Table '{}' does not exist", name)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migrations::diff::SchemaDiffer;
    use dbshift_core::schema::{ConstraintKind, IndexDef, LogicalType};

    fn post(name_len: u32) -> TableDef {
        TableDef::new("post")
            .column(
                ColumnDef::new("id", LogicalType::Integer)
                    .primary()
                    .generated_by(Generation::Increment),
            )
            .column(ColumnDef::varchar("name", name_len))
    }

    fn model(tables: Vec<TableDef>) -> SchemaModel {
        SchemaModel { tables }
    }

    fn synthesize(dialect: Dialect, desired: &SchemaModel, actual: &SchemaModel) -> SqlBatch {
        let diff = SchemaDiffer::new(dialect).diff(desired, actual).unwrap();
        DdlSynthesizer::new(dialect).synthesize(&diff).unwrap()
    }

    #[test]
    fn test_new_table_is_one_create() {
        let batch = synthesize(Dialect::Postgres, &model(vec![post(50)]), &SchemaModel::new());
        assert_eq!(batch.up.len(), 1);
        assert!(batch.up[0].starts_with("CREATE TABLE \"post\""));
        assert_eq!(batch.down, vec!["DROP TABLE \"post\""]);
    }

    #[test]
    fn test_sqlite_widening_rebuilds_table() {
        let batch = synthesize(
            Dialect::Sqlite,
            &model(vec![post(80)]),
            &model(vec![post(50)]),
        );
        assert_eq!(
            batch.up,
            vec![
                "CREATE TABLE \"temporary_post\" (\"id\" integer NOT NULL PRIMARY KEY AUTOINCREMENT, \"name\" varchar(80) NOT NULL)",
                "INSERT INTO \"temporary_post\" (\"id\", \"name\") SELECT \"id\", \"name\" FROM \"post\"",
                "DROP TABLE \"post\"",
                "ALTER TABLE \"temporary_post\" RENAME TO \"post\"",
            ]
        );
        assert!(batch.up.iter().all(|s| !s.contains("ADD COLUMN") && !s.contains("DROP COLUMN")));
        assert!(batch.down[0].contains("varchar(50)"));
    }

    #[test]
    fn test_postgres_widening_alters_in_place() {
        let batch = synthesize(
            Dialect::Postgres,
            &model(vec![post(80)]),
            &model(vec![post(50)]),
        );
        assert_eq!(
            batch.up,
            vec!["ALTER TABLE \"post\" ALTER COLUMN \"name\" TYPE character varying(80)"]
        );
        assert_eq!(
            batch.down,
            vec!["ALTER TABLE \"post\" ALTER COLUMN \"name\" TYPE character varying(50)"]
        );
    }

    #[test]
    fn test_mysql_widening_modifies_column() {
        let batch = synthesize(Dialect::MySql, &model(vec![post(80)]), &model(vec![post(50)]));
        assert_eq!(
            batch.up,
            vec!["ALTER TABLE `post` MODIFY COLUMN `name` varchar(80) NOT NULL"]
        );
    }

    #[test]
    fn test_down_mirrors_up() {
        let desired = model(vec![post(50)
            .column(ColumnDef::new("body", LogicalType::Text).nullable())
            .index(IndexDef::new(&["name"]).named("IDX_post_name"))]);
        let batch = synthesize(Dialect::Postgres, &desired, &model(vec![post(50)]));
        assert_eq!(
            batch.up,
            vec![
                "ALTER TABLE \"post\" ADD COLUMN \"body\" text",
                "CREATE INDEX \"IDX_post_name\" ON \"post\" (\"name\")",
            ]
        );
        assert_eq!(
            batch.down,
            vec![
                "DROP INDEX \"IDX_post_name\"",
                "ALTER TABLE \"post\" DROP COLUMN \"body\"",
            ]
        );
    }

    #[test]
    fn test_sqlite_nullable_column_is_added_in_place() {
        let desired = model(vec![post(50).column(ColumnDef::new("body", LogicalType::Text).nullable())]);
        let batch = synthesize(Dialect::Sqlite, &desired, &model(vec![post(50)]));
        assert_eq!(batch.up, vec!["ALTER TABLE \"post\" ADD COLUMN \"body\" text"]);
        // Dropping needs the rebuild.
        assert_eq!(batch.down.len(), 4);
        assert!(batch.down[0].starts_with("CREATE TABLE \"temporary_post\""));
    }

    #[test]
    fn test_primary_key_change_postgres() {
        let tag = |pk: &[&str]| {
            let mut t = TableDef::new("tag")
                .column(ColumnDef::new("post_id", LogicalType::Integer))
                .column(ColumnDef::varchar("label", 20));
            for c in pk {
                if let Some(col) = t.get_column_mut(c) {
                    col.primary = true;
                }
            }
            t
        };
        let mut actual = model(vec![tag(&["post_id"])]);
        actual.tables[0].primary_key_name = Some("tag_pkey".into());

        let batch = synthesize(Dialect::Postgres, &model(vec![tag(&["post_id", "label"])]), &actual);
        assert_eq!(batch.up.len(), 2);
        assert_eq!(batch.up[0], "ALTER TABLE \"tag\" DROP CONSTRAINT \"tag_pkey\"");
        assert!(batch.up[1].starts_with("ALTER TABLE \"tag\" ADD CONSTRAINT \"PK_"));
        assert!(batch.up[1].ends_with("PRIMARY KEY (\"post_id\", \"label\")"));
        assert!(batch.down[1].ends_with("CONSTRAINT \"tag_pkey\" PRIMARY KEY (\"post_id\")"));
    }

    #[test]
    fn test_rename_styles() {
        let index = IndexDef::new(&["name"]).named("IDX_new");
        let base = model(vec![post(50).index(IndexDef::new(&["name"]).named("IDX_old"))]);
        let op = SchemaOperation::RenameConstraint {
            table: "post".into(),
            kind: ConstraintKind::Index,
            from: "IDX_old".into(),
            to: index.name().into(),
        };
        let diff = SchemaDiff {
            base,
            operations: vec![op],
        };

        let pg = DdlSynthesizer::new(Dialect::Postgres).synthesize(&diff).unwrap();
        assert_eq!(pg.up, vec!["ALTER INDEX \"IDX_old\" RENAME TO \"IDX_new\""]);
        assert_eq!(pg.down, vec!["ALTER INDEX \"IDX_new\" RENAME TO \"IDX_old\""]);

        let mysql = DdlSynthesizer::new(Dialect::MySql).synthesize(&diff).unwrap();
        assert_eq!(
            mysql.up,
            vec!["ALTER TABLE `post` RENAME INDEX `IDX_old` TO `IDX_new`"]
        );

        let mssql = DdlSynthesizer::new(Dialect::Mssql).synthesize(&diff).unwrap();
        assert_eq!(
            mssql.up,
            vec!["EXEC sp_rename 'dbo.post.IDX_old', 'IDX_new', 'INDEX'"]
        );

        let sqlite = DdlSynthesizer::new(Dialect::Sqlite).synthesize(&diff);
        assert!(matches!(sqlite, Err(ShiftError::UnsupportedOperation { .. })));
    }

    #[test]
    fn test_mssql_default_change_swaps_constraint() {
        let actual = model(vec![post(50).column(
            ColumnDef::new("flag", LogicalType::Boolean).default_expr("0"),
        )]);
        let desired = model(vec![post(50).column(
            ColumnDef::new("flag", LogicalType::Boolean).default_expr("1"),
        )]);
        let batch = synthesize(Dialect::Mssql, &desired, &actual);
        assert_eq!(
            batch.up,
            vec![
                "ALTER TABLE [post] DROP CONSTRAINT [DF_post_flag]",
                "ALTER TABLE [post] ADD CONSTRAINT [DF_post_flag] DEFAULT 1 FOR [flag]",
            ]
        );
    }

    #[test]
    fn test_restricted_add_detection() {
        assert!(is_restricted_add(&ColumnDef::new("a", LogicalType::Integer)));
        assert!(!is_restricted_add(
            &ColumnDef::new("a", LogicalType::Integer).default_expr("0")
        ));
        assert!(is_restricted_add(
            &ColumnDef::new("a", LogicalType::Timestamp)
                .nullable()
                .default_expr("CURRENT_TIMESTAMP")
        ));
        assert!(!is_restricted_add(&ColumnDef::new("a", LogicalType::Text).nullable()));
    }
}
