use std::fmt;

use dbshift_core::error::{Result, ShiftError};
use dbshift_core::schema::{
    CheckDef, ColumnDef, ConstraintKind, ExclusionDef, ForeignKeyDef, IndexDef, SchemaModel,
    TableDef, UniqueDef,
};

/// One abstract schema change.
///
/// Each variant carries the full descriptors it needs, so it can be rendered
/// and inverted without looking at either model again.
#[derive(Debug, Clone, PartialEq)]
pub enum SchemaOperation {
    CreateTable {
        table: TableDef,
    },
    DropTable {
        table: TableDef,
    },
    AddColumn {
        table: String,
        column: ColumnDef,
    },
    DropColumn {
        table: String,
        column: ColumnDef,
    },
    ChangeColumn {
        table: String,
        from: ColumnDef,
        to: ColumnDef,
    },
    AddIndex {
        table: String,
        index: IndexDef,
    },
    DropIndex {
        table: String,
        index: IndexDef,
    },
    AddUnique {
        table: String,
        unique: UniqueDef,
    },
    DropUnique {
        table: String,
        unique: UniqueDef,
    },
    AddCheck {
        table: String,
        check: CheckDef,
    },
    DropCheck {
        table: String,
        check: CheckDef,
    },
    AddExclusion {
        table: String,
        exclusion: ExclusionDef,
    },
    DropExclusion {
        table: String,
        exclusion: ExclusionDef,
    },
    AddForeignKey {
        table: String,
        foreign_key: ForeignKeyDef,
    },
    DropForeignKey {
        table: String,
        foreign_key: ForeignKeyDef,
    },
    ChangePrimaryKey {
        table: String,
        from: Vec<String>,
        to: Vec<String>,
        from_name: Option<String>,
        to_name: Option<String>,
    },
    RenameConstraint {
        table: String,
        kind: ConstraintKind,
        from: String,
        to: String,
    },
}

impl SchemaOperation {
    /// Name of the table the operation changes.
    pub fn table(&self) -> &str {
        match self {
            SchemaOperation::CreateTable { table } | SchemaOperation::DropTable { table } => {
                &table.name
            }
            SchemaOperation::AddColumn { table, .. }
            | SchemaOperation::DropColumn { table, .. }
            | SchemaOperation::ChangeColumn { table, .. }
            | SchemaOperation::AddIndex { table, .. }
            | SchemaOperation::DropIndex { table, .. }
            | SchemaOperation::AddUnique { table, .. }
            | SchemaOperation::DropUnique { table, .. }
            | SchemaOperation::AddCheck { table, .. }
            | SchemaOperation::DropCheck { table, .. }
            | SchemaOperation::AddExclusion { table, .. }
            | SchemaOperation::DropExclusion { table, .. }
            | SchemaOperation::AddForeignKey { table, .. }
            | SchemaOperation::DropForeignKey { table, .. }
            | SchemaOperation::ChangePrimaryKey { table, .. }
            | SchemaOperation::RenameConstraint { table, .. } => table,
        }
    }

    /// The operation that undoes this one.
    pub fn inverse(&self) -> SchemaOperation {
        use SchemaOperation::*;
        match self.clone() {
            CreateTable { table } => DropTable { table },
            DropTable { table } => CreateTable { table },
            AddColumn { table, column } => DropColumn { table, column },
            DropColumn { table, column } => AddColumn { table, column },
            ChangeColumn { table, from, to } => ChangeColumn {
                table,
                from: to,
                to: from,
            },
            AddIndex { table, index } => DropIndex { table, index },
            DropIndex { table, index } => AddIndex { table, index },
            AddUnique { table, unique } => DropUnique { table, unique },
            DropUnique { table, unique } => AddUnique { table, unique },
            AddCheck { table, check } => DropCheck { table, check },
            DropCheck { table, check } => AddCheck { table, check },
            AddExclusion { table, exclusion } => DropExclusion { table, exclusion },
            DropExclusion { table, exclusion } => AddExclusion { table, exclusion },
            AddForeignKey { table, foreign_key } => DropForeignKey { table, foreign_key },
            DropForeignKey { table, foreign_key } => AddForeignKey { table, foreign_key },
            ChangePrimaryKey {
                table,
                from,
                to,
                from_name,
                to_name,
            } => ChangePrimaryKey {
                table,
                from: to,
                to: from,
                from_name: to_name,
                to_name: from_name,
            },
            RenameConstraint {
                table,
                kind,
                from,
                to,
            } => RenameConstraint {
                table,
                kind,
                from: to,
                to: from,
            },
        }
    }

    /// Whether the operation removes something.
    pub fn is_drop(&self) -> bool {
        matches!(
            self,
            SchemaOperation::DropTable { .. }
                | SchemaOperation::DropColumn { .. }
                | SchemaOperation::DropIndex { .. }
                | SchemaOperation::DropUnique { .. }
                | SchemaOperation::DropCheck { .. }
                | SchemaOperation::DropExclusion { .. }
                | SchemaOperation::DropForeignKey { .. }
        )
    }

    /// Constraint name the operation adds, with its kind.
    pub(crate) fn added_name(&self) -> Option<(ConstraintKind, &str)> {
        match self {
            SchemaOperation::AddIndex { index, .. } => Some((ConstraintKind::Index, index.name())),
            SchemaOperation::AddUnique { unique, .. } => {
                Some((ConstraintKind::Unique, unique.name()))
            }
            SchemaOperation::AddCheck { check, .. } => Some((ConstraintKind::Check, check.name())),
            SchemaOperation::AddExclusion { exclusion, .. } => {
                Some((ConstraintKind::Exclusion, exclusion.name()))
            }
            SchemaOperation::AddForeignKey { foreign_key, .. } => {
                Some((ConstraintKind::ForeignKey, foreign_key.name()))
            }
            SchemaOperation::RenameConstraint { kind, to, .. } => Some((*kind, to)),
            _ => None,
        }
    }

    /// Constraint name the operation removes.
    pub(crate) fn removed_name(&self) -> Option<&str> {
        match self {
            SchemaOperation::DropIndex { index, .. } => Some(index.name()),
            SchemaOperation::DropUnique { unique, .. } => Some(unique.name()),
            SchemaOperation::DropCheck { check, .. } => Some(check.name()),
            SchemaOperation::DropExclusion { exclusion, .. } => Some(exclusion.name()),
            SchemaOperation::DropForeignKey { foreign_key, .. } => Some(foreign_key.name()),
            SchemaOperation::RenameConstraint { from, .. } => Some(from),
            _ => None,
        }
    }

    /// Apply the operation to an in-memory model.
    ///
    /// The synthesizer walks a working copy of the base model through every
    /// operation, so each statement is rendered against the state it will
    /// actually meet.
    pub fn apply_to(&self, model: &mut SchemaModel) -> Result<()> {
        if let SchemaOperation::CreateTable { table } = self {
            if model.contains(&table.name) {
                return Err(ShiftError::ConstraintConflict(format!(
                    "table '{}' already exists",
                    table.name
                )));
            }
            model.put_table(table.clone());
            return Ok(());
        }
        if let SchemaOperation::DropTable { table } = self {
            return match model.remove_table(&table.name) {
                Some(_) => Ok(()),
                None => Err(missing_table(&table.name)),
            };
        }

        let name = self.table().to_string();
        let table = model.table_mut(&name).ok_or_else(|| missing_table(&name))?;
        apply_to_table(self, table)
    }
}

fn apply_to_table(op: &SchemaOperation, table: &mut TableDef) -> Result<()> {
    match op {
        SchemaOperation::AddColumn { column, .. } => {
            if table.has_column(&column.name) {
                return Err(ShiftError::ConstraintConflict(format!(
                    "column '{}.{}' already exists",
                    table.name, column.name
                )));
            }
            table.columns.push(column.clone());
        }
        SchemaOperation::DropColumn { column, .. } => {
            let before = table.columns.len();
            table.columns.retain(|c| c.name != column.name);
            if table.columns.len() == before {
                return Err(missing(&table.name, "column", &column.name));
            }
            // The database drops whatever still depends on the column.
            let gone = |cols: &[String]| cols.iter().any(|c| *c == column.name);
            table.indices.retain(|i| !gone(&i.columns));
            table.uniques.retain(|u| !gone(&u.columns));
            table.foreign_keys.retain(|f| !gone(&f.columns));
        }
        SchemaOperation::ChangeColumn { from, to, .. } => {
            let table_name = table.name.clone();
            let column = table
                .get_column_mut(&from.name)
                .ok_or_else(|| missing(&table_name, "column", &from.name))?;
            *column = to.clone();
        }
        SchemaOperation::AddIndex { index, .. } => table.indices.push(index.clone()),
        SchemaOperation::DropIndex { index, .. } => {
            remove_named(&mut table.indices, index.name(), |i| i.name(), &table.name)?
        }
        SchemaOperation::AddUnique { unique, .. } => table.uniques.push(unique.clone()),
        SchemaOperation::DropUnique { unique, .. } => {
            remove_named(&mut table.uniques, unique.name(), |u| u.name(), &table.name)?
        }
        SchemaOperation::AddCheck { check, .. } => table.checks.push(check.clone()),
        SchemaOperation::DropCheck { check, .. } => {
            remove_named(&mut table.checks, check.name(), |c| c.name(), &table.name)?
        }
        SchemaOperation::AddExclusion { exclusion, .. } => {
            table.exclusions.push(exclusion.clone())
        }
        SchemaOperation::DropExclusion { exclusion, .. } => {
            remove_named(&mut table.exclusions, exclusion.name(), |e| e.name(), &table.name)?
        }
        SchemaOperation::AddForeignKey { foreign_key, .. } => {
            table.foreign_keys.push(foreign_key.clone())
        }
        SchemaOperation::DropForeignKey { foreign_key, .. } => remove_named(
            &mut table.foreign_keys,
            foreign_key.name(),
            |f| f.name(),
            &table.name,
        )?,
        SchemaOperation::ChangePrimaryKey { to, to_name, .. } => {
            for column in &mut table.columns {
                column.primary = to.contains(&column.name);
                if column.primary {
                    column.nullable = false;
                }
            }
            table.primary_key_name = if to.is_empty() { None } else { to_name.clone() };
        }
        SchemaOperation::RenameConstraint { kind, from, to, .. } => {
            rename(table, *kind, from, to)?;
        }
        SchemaOperation::CreateTable { .. } | SchemaOperation::DropTable { .. } => {}
    }
    Ok(())
}

fn rename(table: &mut TableDef, kind: ConstraintKind, from: &str, to: &str) -> Result<()> {
    let slot = match kind {
        ConstraintKind::PrimaryKey => table
            .primary_key_name
            .as_mut()
            .filter(|n| n.as_str() == from),
        ConstraintKind::Index => table
            .indices
            .iter_mut()
            .find(|i| i.name() == from)
            .and_then(|i| i.name.as_mut()),
        ConstraintKind::Unique => table
            .uniques
            .iter_mut()
            .find(|u| u.name() == from)
            .and_then(|u| u.name.as_mut()),
        ConstraintKind::Check => table
            .checks
            .iter_mut()
            .find(|c| c.name() == from)
            .and_then(|c| c.name.as_mut()),
        ConstraintKind::Exclusion => table
            .exclusions
            .iter_mut()
            .find(|e| e.name() == from)
            .and_then(|e| e.name.as_mut()),
        ConstraintKind::ForeignKey => table
            .foreign_keys
            .iter_mut()
            .find(|f| f.name() == from)
            .and_then(|f| f.name.as_mut()),
    };
    match slot {
        Some(name) => {
            *name = to.to_string();
            Ok(())
        }
        None => Err(missing(&table.name, &kind.to_string(), from)),
    }
}

fn remove_named<T>(
    items: &mut Vec<T>,
    name: &str,
    name_of: impl Fn(&T) -> &str,
    table: &str,
) -> Result<()> {
    match items.iter().position(|item| name_of(item) == name) {
        Some(pos) => {
            items.remove(pos);
            Ok(())
        }
        None => Err(missing(table, "constraint", name)),
    }
}

fn missing_table(name: &str) -> ShiftError {
    ShiftError::InvalidState(format!("table '{}' does not exist in the working model", name))
}

fn missing(table: &str, what: &str, name: &str) -> ShiftError {
    ShiftError::InvalidState(format!("{} '{}' not found on table '{}'", what, name, table))
}

impl fmt::Display for SchemaOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let table = self.table();
        match self {
            SchemaOperation::CreateTable { .. } => write!(f, "create table {}", table),
            SchemaOperation::DropTable { .. } => write!(f, "drop table {}", table),
            SchemaOperation::AddColumn { column, .. } => {
                write!(f, "add column {}.{}", table, column.name)
            }
            SchemaOperation::DropColumn { column, .. } => {
                write!(f, "drop column {}.{}", table, column.name)
            }
            SchemaOperation::ChangeColumn { to, .. } => {
                write!(f, "change column {}.{}", table, to.name)
            }
            SchemaOperation::AddIndex { index, .. } => {
                write!(f, "add index {} on {}", index.name(), table)
            }
            SchemaOperation::DropIndex { index, .. } => {
                write!(f, "drop index {} on {}", index.name(), table)
            }
            SchemaOperation::AddUnique { unique, .. } => {
                write!(f, "add unique {} on {}", unique.name(), table)
            }
            SchemaOperation::DropUnique { unique, .. } => {
                write!(f, "drop unique {} on {}", unique.name(), table)
            }
            SchemaOperation::AddCheck { check, .. } => {
                write!(f, "add check {} on {}", check.name(), table)
            }
            SchemaOperation::DropCheck { check, .. } => {
                write!(f, "drop check {} on {}", check.name(), table)
            }
            SchemaOperation::AddExclusion { exclusion, .. } => {
                write!(f, "add exclusion {} on {}", exclusion.name(), table)
            }
            SchemaOperation::DropExclusion { exclusion, .. } => {
                write!(f, "drop exclusion {} on {}", exclusion.name(), table)
            }
            SchemaOperation::AddForeignKey { foreign_key, .. } => write!(
                f,
                "add foreign key {} on {} -> {}",
                foreign_key.name(),
                table,
                foreign_key.referenced_table
            ),
            SchemaOperation::DropForeignKey { foreign_key, .. } => {
                write!(f, "drop foreign key {} on {}", foreign_key.name(), table)
            }
            SchemaOperation::ChangePrimaryKey { to, .. } => {
                write!(f, "change primary key of {} to ({})", table, to.join(", "))
            }
            SchemaOperation::RenameConstraint { kind, from, to, .. } => {
                write!(f, "rename {} {} to {} on {}", kind, from, to, table)
            }
        }
    }
}
