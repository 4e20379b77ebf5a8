use dbshift_core::dialect::{AlterColumnStyle, CommentStyle, RenameStyle};
use dbshift_core::error::{Result, ShiftError};
use dbshift_core::schema::{ColumnDef, ConstraintKind, Generation, SchemaModel, TableDef};

use super::render::{default_constraint_name, SqlRenderer};
use super::{table_in, AlterStrategy};
use crate::migrations::operation::SchemaOperation;

/// Changes the table with `ALTER` statements.
pub(crate) struct InPlaceAlterStrategy {
    renderer: SqlRenderer,
}

impl InPlaceAlterStrategy {
    pub(crate) fn new(renderer: SqlRenderer) -> Self {
        Self { renderer }
    }

    fn change_column(
        &self,
        table: &TableDef,
        from: &ColumnDef,
        to: &ColumnDef,
    ) -> Result<Vec<String>> {
        let r = &self.renderer;
        let caps = r.caps;

        if from.generated != to.generated {
            // A computed expression cannot be altered; the column is recreated.
            return Ok(vec![
                r.alter_table(table, &format!("DROP COLUMN {}", r.ident(&from.name))),
                r.alter_table(
                    table,
                    &format!("{} {}", caps.add_column, r.column_definition(table, to, false)?),
                ),
            ]);
        }
        let increments = |c: &ColumnDef| c.generation == Generation::Increment;
        let redefines = matches!(
            caps.alter_column,
            AlterColumnStyle::Modify | AlterColumnStyle::Change
        );
        if increments(from) != increments(to) && !redefines {
            return Err(ShiftError::unsupported(
                caps.dialect,
                format!(
                    "changing auto-increment on {}.{} in place",
                    table.name, to.name
                ),
            ));
        }

        match caps.alter_column {
            AlterColumnStyle::AlterColumn => self.alter_piecewise(table, from, to),
            AlterColumnStyle::Modify => Ok(vec![r.alter_table(
                table,
                &format!("MODIFY COLUMN {}", r.column_definition(table, to, false)?),
            )]),
            AlterColumnStyle::Change => Ok(vec![r.alter_table(
                table,
                &format!(
                    "CHANGE {} {}",
                    r.ident(&from.name),
                    r.column_definition(table, to, false)?
                ),
            )]),
            AlterColumnStyle::AlterColumnFull => Ok(self.alter_full(table, from, to)),
            AlterColumnStyle::None => Err(ShiftError::unsupported(
                caps.dialect,
                "altering a column in place",
            )),
        }
    }

    /// One `ALTER TABLE` carrying every changed facet of the column.
    fn alter_piecewise(
        &self,
        table: &TableDef,
        from: &ColumnDef,
        to: &ColumnDef,
    ) -> Result<Vec<String>> {
        let r = &self.renderer;
        let caps = r.caps;
        let column = r.ident(&to.name);
        let mut clauses = Vec::new();

        if caps.render_type(from) != caps.render_type(to) || from.collation != to.collation {
            let mut clause = format!("ALTER COLUMN {} TYPE {}", column, caps.render_type(to));
            if let Some(collation) = &to.collation {
                clause.push_str(&format!(" COLLATE {}", r.ident(collation)));
            }
            clauses.push(clause);
        }
        if from.nullable != to.nullable {
            let action = if to.nullable { "DROP NOT NULL" } else { "SET NOT NULL" };
            clauses.push(format!("ALTER COLUMN {} {}", column, action));
        }
        if self.default_changed(from, to) {
            clauses.push(match r.default_expression(to) {
                Some(default) => format!("ALTER COLUMN {} SET DEFAULT {}", column, default),
                None => format!("ALTER COLUMN {} DROP DEFAULT", column),
            });
        }
        match (from.generation, to.generation) {
            (Generation::Identity, Generation::Identity) => {}
            (Generation::Identity, _) => {
                clauses.push(format!("ALTER COLUMN {} DROP IDENTITY", column));
            }
            (_, Generation::Identity) => {
                let identity = caps.identity.ok_or_else(|| {
                    ShiftError::unsupported(caps.dialect, "identity columns")
                })?;
                clauses.push(format!("ALTER COLUMN {} ADD {}", column, identity));
            }
            _ => {}
        }

        let mut statements = Vec::new();
        if !clauses.is_empty() {
            statements.push(r.alter_table(table, &clauses.join(", ")));
        }
        if from.comment != to.comment && caps.comments == CommentStyle::CommentOn {
            statements.push(r.set_comment(table, to, to.comment.as_deref()));
        }
        Ok(statements)
    }

    /// SQL Server: type and nullability in one clause, the default as a
    /// separate named constraint.
    fn alter_full(&self, table: &TableDef, from: &ColumnDef, to: &ColumnDef) -> Vec<String> {
        let r = &self.renderer;
        let caps = r.caps;
        let column = r.ident(&to.name);
        let constraint = r.ident(&default_constraint_name(table, to));
        let default_changed = self.default_changed(from, to);
        let mut statements = Vec::new();

        if default_changed && r.default_expression(from).is_some() {
            statements.push(r.alter_table(table, &format!("DROP CONSTRAINT {}", constraint)));
        }
        if caps.render_type(from) != caps.render_type(to)
            || from.nullable != to.nullable
            || from.collation != to.collation
        {
            let mut clause = format!("ALTER COLUMN {} {}", column, caps.render_type(to));
            if let Some(collation) = &to.collation {
                clause.push_str(&format!(" COLLATE {}", collation));
            }
            clause.push_str(if to.nullable { " NULL" } else { " NOT NULL" });
            statements.push(r.alter_table(table, &clause));
        }
        if default_changed {
            if let Some(default) = r.default_expression(to) {
                statements.push(r.alter_table(
                    table,
                    &format!("ADD CONSTRAINT {} DEFAULT {} FOR {}", constraint, default, column),
                ));
            }
        }
        statements
    }

    fn default_changed(&self, from: &ColumnDef, to: &ColumnDef) -> bool {
        let r = &self.renderer;
        r.caps
            .normalize_default(to, r.default_expression(from).as_deref())
            != r.caps.normalize_default(to, r.default_expression(to).as_deref())
    }

    fn change_primary_key(
        &self,
        before: &TableDef,
        after: &TableDef,
        from: &[String],
        from_name: Option<&str>,
    ) -> Result<Vec<String>> {
        let r = &self.renderer;
        let mut statements = Vec::new();

        // Dropping a key column already took the constraint with it.
        let mut current = before.primary_columns();
        let mut expected = from.to_vec();
        current.sort();
        expected.sort();
        if !current.is_empty() && current == expected {
            let clause = if r.caps.named_primary_key {
                let name = from_name.ok_or_else(|| {
                    ShiftError::unsupported(
                        r.caps.dialect,
                        format!("dropping the unnamed primary key of {}", before.name),
                    )
                })?;
                format!("DROP CONSTRAINT {}", r.ident(name))
            } else {
                "DROP PRIMARY KEY".to_string()
            };
            statements.push(r.alter_table(before, &clause));
        }
        if let Some(clause) = r.primary_key_clause(after) {
            statements.push(r.alter_table(after, &format!("ADD {}", clause)));
        }
        Ok(statements)
    }

    fn rename(
        &self,
        table: &TableDef,
        kind: ConstraintKind,
        from: &str,
        to: &str,
    ) -> Result<Vec<String>> {
        let r = &self.renderer;
        let caps = r.caps;
        let style = if kind == ConstraintKind::Index {
            caps.rename_index
        } else {
            caps.rename_constraint
        };
        let target = if kind == ConstraintKind::Index { "INDEX" } else { "CONSTRAINT" };

        let sql = match style {
            RenameStyle::AlterIndex => format!(
                "ALTER INDEX {} RENAME TO {}",
                caps.quote_path(table.schema.as_deref(), from),
                r.ident(to)
            ),
            RenameStyle::AlterTable => r.alter_table(
                table,
                &format!("RENAME {} {} TO {}", target, r.ident(from), r.ident(to)),
            ),
            RenameStyle::SpRename => {
                let owner = table.schema.as_deref().unwrap_or("dbo");
                let (object, class) = if kind == ConstraintKind::Index {
                    (format!("{}.{}.{}", owner, table.name, from), "INDEX")
                } else {
                    (format!("{}.{}", owner, from), "OBJECT")
                };
                format!(
                    "EXEC sp_rename {}, {}, {}",
                    caps.quote_literal(&object),
                    caps.quote_literal(to),
                    caps.quote_literal(class)
                )
            }
            RenameStyle::None => {
                return Err(ShiftError::unsupported(
                    caps.dialect,
                    format!("renaming {} {}", kind, from),
                ))
            }
        };
        Ok(vec![sql])
    }
}

impl AlterStrategy for InPlaceAlterStrategy {
    fn render(
        &self,
        op: &SchemaOperation,
        before: &SchemaModel,
        after: &SchemaModel,
    ) -> Result<Vec<String>> {
        let r = &self.renderer;
        let caps = r.caps;
        let drop_named = |table: &TableDef, clause: &str, name: &str| {
            r.alter_table(table, &format!("{} {}", clause, r.ident(name)))
        };

        match op {
            SchemaOperation::CreateTable { table } => r.create_table(table),
            SchemaOperation::DropTable { table } => Ok(vec![r.drop_table(table)]),
            SchemaOperation::AddColumn { table, column } => {
                let table = table_in(after, table)?;
                let mut statements = vec![r.alter_table(
                    table,
                    &format!("{} {}", caps.add_column, r.column_definition(table, column, false)?),
                )];
                statements.extend(r.comment_statement(table, column, column.comment.as_deref()));
                Ok(statements)
            }
            SchemaOperation::DropColumn { table, column } => {
                let table = table_in(before, table)?;
                let mut statements = Vec::new();
                if caps.named_defaults && r.default_expression(column).is_some() {
                    statements.push(drop_named(
                        table,
                        "DROP CONSTRAINT",
                        &default_constraint_name(table, column),
                    ));
                }
                statements.push(drop_named(table, "DROP COLUMN", &column.name));
                Ok(statements)
            }
            SchemaOperation::ChangeColumn { table, from, to } => {
                self.change_column(table_in(before, table)?, from, to)
            }
            SchemaOperation::AddIndex { table, index } => {
                Ok(vec![r.create_index(table_in(after, table)?, index)?])
            }
            SchemaOperation::DropIndex { table, index } => {
                Ok(vec![r.drop_index(table_in(before, table)?, index)])
            }
            SchemaOperation::AddUnique { table, unique } => {
                let table = table_in(after, table)?;
                Ok(vec![r.alter_table(table, &format!("ADD {}", r.unique_clause(unique)))])
            }
            SchemaOperation::DropUnique { table, unique } => Ok(vec![drop_named(
                table_in(before, table)?,
                "DROP CONSTRAINT",
                unique.name(),
            )]),
            SchemaOperation::AddCheck { table, check } => {
                let table = table_in(after, table)?;
                Ok(vec![r.alter_table(table, &format!("ADD {}", r.check_clause(check)?))])
            }
            SchemaOperation::DropCheck { table, check } => Ok(vec![drop_named(
                table_in(before, table)?,
                caps.drop_check,
                check.name(),
            )]),
            SchemaOperation::AddExclusion { table, exclusion } => {
                let table = table_in(after, table)?;
                Ok(vec![r.alter_table(
                    table,
                    &format!("ADD {}", r.exclusion_clause(exclusion)?),
                )])
            }
            SchemaOperation::DropExclusion { table, exclusion } => {
                if !caps.exclusions {
                    return Err(ShiftError::unsupported(caps.dialect, "exclusion constraints"));
                }
                Ok(vec![drop_named(
                    table_in(before, table)?,
                    "DROP CONSTRAINT",
                    exclusion.name(),
                )])
            }
            SchemaOperation::AddForeignKey { table, foreign_key } => {
                let table = table_in(after, table)?;
                Ok(vec![r.alter_table(
                    table,
                    &format!("ADD {}", r.foreign_key_clause(table, foreign_key)),
                )])
            }
            SchemaOperation::DropForeignKey { table, foreign_key } => Ok(vec![drop_named(
                table_in(before, table)?,
                caps.drop_foreign_key,
                foreign_key.name(),
            )]),
            SchemaOperation::ChangePrimaryKey {
                table,
                from,
                from_name,
                ..
            } => self.change_primary_key(
                table_in(before, table)?,
                table_in(after, table)?,
                from,
                from_name.as_deref(),
            ),
            SchemaOperation::RenameConstraint {
                table,
                kind,
                from,
                to,
            } => self.rename(table_in(before, table)?, *kind, from, to),
        }
    }
}
