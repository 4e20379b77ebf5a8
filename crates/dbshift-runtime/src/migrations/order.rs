//! Operation ordering.
//!
//! Operations run in phases: every drop before any add, foreign keys dropped
//! first and added last, and new tables created after the tables they
//! reference. Within a phase the differ's order is kept.

use std::collections::{HashMap, HashSet};

use dbshift_core::dialect::DialectCapabilities;
use dbshift_core::error::{Result, ShiftError};
use dbshift_core::schema::{ConstraintKind, SchemaModel, TableDef};

use super::operation::SchemaOperation;

fn phase(op: &SchemaOperation) -> u8 {
    match op {
        SchemaOperation::DropForeignKey { .. } => 0,
        SchemaOperation::DropIndex { .. }
        | SchemaOperation::DropUnique { .. }
        | SchemaOperation::DropCheck { .. }
        | SchemaOperation::DropExclusion { .. } => 1,
        SchemaOperation::DropColumn { .. } => 2,
        SchemaOperation::DropTable { .. } => 3,
        SchemaOperation::RenameConstraint { .. } => 4,
        SchemaOperation::CreateTable { .. } => 5,
        SchemaOperation::AddColumn { .. } => 6,
        SchemaOperation::ChangeColumn { .. } => 7,
        SchemaOperation::ChangePrimaryKey { .. } => 8,
        SchemaOperation::AddIndex { .. }
        | SchemaOperation::AddUnique { .. }
        | SchemaOperation::AddCheck { .. }
        | SchemaOperation::AddExclusion { .. } => 9,
        SchemaOperation::AddForeignKey { .. } => 10,
    }
}

/// Check for conflicting names, then order the operations.
pub(crate) fn order_operations(
    ops: Vec<SchemaOperation>,
    base: &SchemaModel,
    caps: &DialectCapabilities,
) -> Result<Vec<SchemaOperation>> {
    check_conflicts(&ops, base)?;

    let (creates, mut rest): (Vec<_>, Vec<_>) = ops
        .into_iter()
        .partition(|op| matches!(op, SchemaOperation::CreateTable { .. }));
    let tables = creates
        .into_iter()
        .filter_map(|op| match op {
            SchemaOperation::CreateTable { table } => Some(table),
            _ => None,
        })
        .collect();

    let (tables, deferred) = sort_new_tables(tables, caps.forward_references);
    rest.extend(tables.into_iter().map(|table| SchemaOperation::CreateTable { table }));
    rest.extend(deferred);

    let mut drops: Vec<SchemaOperation> = Vec::new();
    let mut others: Vec<SchemaOperation> = Vec::new();
    for op in rest {
        if matches!(op, SchemaOperation::DropTable { .. }) {
            drops.push(op);
        } else {
            others.push(op);
        }
    }
    others.extend(sort_dropped_tables(drops));

    // Stable: keeps creation order and the differ's order inside a phase.
    others.sort_by_key(phase);
    Ok(others)
}

/// Two adds of one name on a table, or an add reusing a name that survives
/// on the table, can never both hold.
fn check_conflicts(ops: &[SchemaOperation], base: &SchemaModel) -> Result<()> {
    let mut removed: HashSet<(&str, &str)> = HashSet::new();
    for op in ops {
        if let Some(name) = op.removed_name() {
            removed.insert((op.table(), name));
        }
    }

    let mut added: HashMap<(&str, &str), ConstraintKind> = HashMap::new();
    for op in ops {
        let Some((kind, name)) = op.added_name() else {
            continue;
        };
        let table = op.table();
        if added.insert((table, name), kind).is_some() {
            return Err(ShiftError::ConstraintConflict(format!(
                "{} '{}' is added twice on table '{}'",
                kind, name, table
            )));
        }
        let survives = base
            .table(table)
            .map(|t| t.constraint_names().contains(&name))
            .unwrap_or(false)
            && !removed.contains(&(table, name));
        if survives {
            return Err(ShiftError::ConstraintConflict(format!(
                "{} '{}' on table '{}' collides with an existing constraint",
                kind, name, table
            )));
        }
    }
    Ok(())
}

/// Order new tables so referenced tables come first.
///
/// A reference cycle cannot be created inline; unless the dialect accepts
/// forward references, the keys closing the cycle are split off and added
/// once every table exists.
fn sort_new_tables(
    mut pending: Vec<TableDef>,
    forward_references: bool,
) -> (Vec<TableDef>, Vec<SchemaOperation>) {
    let mut created: Vec<TableDef> = Vec::with_capacity(pending.len());
    let mut deferred = Vec::new();

    while !pending.is_empty() {
        let waiting: HashSet<String> = pending.iter().map(|t| t.name.clone()).collect();
        let ready = pending.iter().position(|t| {
            t.foreign_keys
                .iter()
                .all(|fk| fk.referenced_table == t.name || !waiting.contains(&fk.referenced_table))
        });

        let table = match ready {
            Some(i) => pending.remove(i),
            None => {
                // Every remaining table waits on another one.
                let mut table = pending.remove(0);
                if !forward_references {
                    let (inline, later): (Vec<_>, Vec<_>) =
                        std::mem::take(&mut table.foreign_keys)
                            .into_iter()
                            .partition(|fk| {
                                fk.referenced_table == table.name
                                    || !waiting.contains(&fk.referenced_table)
                            });
                    table.foreign_keys = inline;
                    deferred.extend(later.into_iter().map(|foreign_key| {
                        SchemaOperation::AddForeignKey {
                            table: table.name.clone(),
                            foreign_key,
                        }
                    }));
                }
                table
            }
        };
        created.push(table);
    }
    (created, deferred)
}

/// Dropped tables go dependents first.
fn sort_dropped_tables(mut pending: Vec<SchemaOperation>) -> Vec<SchemaOperation> {
    let mut ordered = Vec::with_capacity(pending.len());
    while !pending.is_empty() {
        let names: HashSet<String> = pending.iter().map(|op| op.table().to_string()).collect();
        let referenced = |name: &str| {
            pending.iter().any(|op| match op {
                SchemaOperation::DropTable { table } => {
                    table.name != name && table.foreign_keys.iter().any(|fk| fk.references(name))
                }
                _ => false,
            })
        };
        let next = pending
            .iter()
            .position(|op| !referenced(op.table()) || names.len() == 1)
            .unwrap_or(0);
        ordered.push(pending.remove(next));
    }
    ordered
}

#[cfg(test)]
mod tests {
    use super::*;
    use dbshift_core::dialect::Dialect;
    use dbshift_core::schema::{ColumnDef, ForeignKeyDef, IndexDef, LogicalType};

    fn table(name: &str, refs: &[&str]) -> TableDef {
        let mut t = TableDef::new(name).column(ColumnDef::new("id", LogicalType::Integer).primary());
        for r in refs {
            let col = format!("{}_id", r);
            let fk = ForeignKeyDef::new(&[col.as_str()], *r, &["id"]).named(format!("FK_{}_{}", name, r));
            t = t
                .column(ColumnDef::new(col.clone(), LogicalType::Integer).nullable())
                .foreign_key(fk);
        }
        t
    }

    fn names(ops: &[SchemaOperation]) -> Vec<String> {
        ops.iter().map(|op| op.to_string()).collect()
    }

    #[test]
    fn test_referenced_tables_are_created_first() {
        let ops = vec![
            SchemaOperation::CreateTable { table: table("comment", &["post"]) },
            SchemaOperation::CreateTable { table: table("post", &["author"]) },
            SchemaOperation::CreateTable { table: table("author", &[]) },
        ];
        let ordered =
            order_operations(ops, &SchemaModel::new(), Dialect::Postgres.capabilities()).unwrap();
        assert_eq!(
            names(&ordered),
            vec!["create table author", "create table post", "create table comment"]
        );
    }

    #[test]
    fn test_cycle_defers_foreign_key() {
        let ops = vec![
            SchemaOperation::CreateTable { table: table("a", &["b"]) },
            SchemaOperation::CreateTable { table: table("b", &["a"]) },
        ];
        let ordered =
            order_operations(ops.clone(), &SchemaModel::new(), Dialect::Postgres.capabilities())
                .unwrap();
        assert_eq!(
            names(&ordered),
            vec!["create table a", "create table b", "add foreign key FK_a_b on a -> b"]
        );
        match &ordered[0] {
            SchemaOperation::CreateTable { table } => assert!(table.foreign_keys.is_empty()),
            other => panic!("unexpected {:?}", other),
        }

        let inline =
            order_operations(ops, &SchemaModel::new(), Dialect::Sqlite.capabilities()).unwrap();
        assert_eq!(inline.len(), 2);
    }

    #[test]
    fn test_foreign_key_dropped_before_column() {
        let post = table("post", &["author"]);
        let fk = post.foreign_keys[0].clone();
        let ops = vec![
            SchemaOperation::DropColumn {
                table: "post".into(),
                column: ColumnDef::new("author_id", LogicalType::Integer),
            },
            SchemaOperation::AddIndex {
                table: "post".into(),
                index: IndexDef::new(&["id"]).named("IDX_id"),
            },
            SchemaOperation::DropForeignKey {
                table: "post".into(),
                foreign_key: fk,
            },
        ];
        let base = SchemaModel::new().with_table(post);
        let ordered = order_operations(ops, &base, Dialect::MySql.capabilities()).unwrap();
        assert!(matches!(ordered[0], SchemaOperation::DropForeignKey { .. }));
        assert!(matches!(ordered[1], SchemaOperation::DropColumn { .. }));
        assert!(matches!(ordered[2], SchemaOperation::AddIndex { .. }));
    }

    #[test]
    fn test_name_conflicts() {
        let index = IndexDef::new(&["id"]).named("IDX_id");
        let twice = vec![
            SchemaOperation::AddIndex { table: "post".into(), index: index.clone() },
            SchemaOperation::AddIndex { table: "post".into(), index: index.clone() },
        ];
        assert!(matches!(
            order_operations(twice, &SchemaModel::new(), Dialect::Postgres.capabilities()),
            Err(ShiftError::ConstraintConflict(_))
        ));

        let base = SchemaModel::new().with_table(table("post", &[]).index(index.clone()));
        let clash = vec![SchemaOperation::AddIndex { table: "post".into(), index: index.clone() }];
        assert!(matches!(
            order_operations(clash, &base, Dialect::Postgres.capabilities()),
            Err(ShiftError::ConstraintConflict(_))
        ));

        let replaced = vec![
            SchemaOperation::AddIndex { table: "post".into(), index: index.clone() },
            SchemaOperation::DropIndex { table: "post".into(), index },
        ];
        let ordered = order_operations(replaced, &base, Dialect::Postgres.capabilities()).unwrap();
        assert!(ordered[0].is_drop());
    }

    #[test]
    fn test_dependents_dropped_first() {
        let ops = vec![
            SchemaOperation::DropTable { table: table("author", &[]) },
            SchemaOperation::DropTable { table: table("post", &["author"]) },
        ];
        let ordered =
            order_operations(ops, &SchemaModel::new(), Dialect::Postgres.capabilities()).unwrap();
        assert_eq!(names(&ordered), vec!["drop table post", "drop table author"]);
    }
}
