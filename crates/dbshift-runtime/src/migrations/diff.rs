use std::collections::{BTreeSet, HashSet};

use dbshift_core::dialect::{
    AlterColumnStyle, CatalogFamily, CommentStyle, Dialect, DialectCapabilities, IncrementStyle,
    RenameStyle,
};
use dbshift_core::error::Result;
use dbshift_core::schema::{
    normalize_expression, ColumnDef, ConstraintKind, ForeignKeyDef, GeneratedKind, Generation,
    IndexDef, LogicalType, NamingStrategy, ReferentialAction, SchemaModel, TableDef,
};
use tracing::debug;

use super::operation::SchemaOperation;
use super::order::order_operations;

/// The ordered operations that turn `base` into the desired schema.
#[derive(Debug, Clone, Default)]
pub struct SchemaDiff {
    /// The normalized actual model the operations start from.
    pub base: SchemaModel,
    /// Operations in execution order.
    pub operations: Vec<SchemaOperation>,
}

impl SchemaDiff {
    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    /// One line per operation, for logs and `--check` output.
    pub fn describe(&self) -> Vec<String> {
        self.operations.iter().map(|op| op.to_string()).collect()
    }
}

/// Compares a desired schema with an introspected one.
pub struct SchemaDiffer {
    caps: &'static DialectCapabilities,
    naming: NamingStrategy,
}

impl SchemaDiffer {
    pub fn new(dialect: Dialect) -> Self {
        let caps = dialect.capabilities();
        Self {
            caps,
            naming: NamingStrategy::new(caps.max_identifier_length),
        }
    }

    pub fn dialect(&self) -> Dialect {
        self.caps.dialect
    }

    /// Compute the operations that bring `actual` to `desired`.
    ///
    /// Tables that exist only in `actual` are never dropped, and tables or
    /// columns marked unmanaged are left alone.
    pub fn diff(&self, desired: &SchemaModel, actual: &SchemaModel) -> Result<SchemaDiff> {
        let desired = self.normalize_desired(desired, actual)?;
        let base = self.normalize_actual(actual);

        let mut ops = Vec::new();
        for table in desired.tables.iter().filter(|t| t.synchronize) {
            match base.table(&table.name) {
                None => ops.push(SchemaOperation::CreateTable {
                    table: table.clone(),
                }),
                Some(existing) => self.diff_table(table, existing, &mut ops),
            }
        }
        self.reattach_disturbed_keys(&desired, &base, &mut ops);

        let operations = order_operations(ops, &base, self.caps)?;
        debug!(
            dialect = %self.caps.dialect,
            operations = operations.len(),
            "Computed schema diff"
        );
        Ok(SchemaDiff { base, operations })
    }

    /// Resolve names, validate, and drop everything the dialect cannot
    /// store, so the desired model compares against what introspection
    /// would report.
    pub fn normalize_desired(
        &self,
        desired: &SchemaModel,
        actual: &SchemaModel,
    ) -> Result<SchemaModel> {
        let mut model = desired.clone();
        model.resolve_names(&self.naming);

        // Foreign keys may target tables that only exist in the database.
        let mut known = model.clone();
        for table in &actual.tables {
            if !known.contains(&table.name) {
                let mut target = table.clone();
                target.foreign_keys.clear();
                known.tables.push(target);
            }
        }
        known.validate()?;

        for table in &mut model.tables {
            for column in &mut table.columns {
                self.normalize_column(column);
            }
            self.normalize_constraints(table);
        }
        Ok(model)
    }

    /// Derive missing names on the introspected model and fold it the same
    /// way as the desired one.
    pub fn normalize_actual(&self, actual: &SchemaModel) -> SchemaModel {
        let mut model = actual.clone();
        model.resolve_names(&self.naming);
        for table in &mut model.tables {
            for column in &mut table.columns {
                if column.comment.as_deref() == Some("") {
                    column.comment = None;
                }
            }
            self.normalize_constraints(table);
        }
        model
    }

    fn normalize_column(&self, column: &mut ColumnDef) {
        let caps = self.caps;
        if caps.comments == CommentStyle::None || column.comment.as_deref() == Some("") {
            column.comment = None;
        }
        if !caps.collation {
            column.collation = None;
        }
        if !caps.column_charset {
            column.charset = None;
        }
        if !caps.on_update {
            column.on_update = None;
        }
        if !caps.display_width {
            column.width = None;
        }
        if !caps.generated_columns {
            column.generated = None;
        }
        if column.generation == Generation::Uuid && caps.uuid_default.is_none() {
            column.generation = Generation::None;
        }
        if column.generation == Generation::Identity && caps.identity.is_none() {
            column.generation = Generation::Increment;
        }
        if column.generation == Generation::Increment
            && caps.increment == IncrementStyle::Autoincrement
        {
            // The rowid alias is always declared `integer`.
            column.column_type = LogicalType::Integer;
        }
        if column.primary {
            column.nullable = false;
        }
    }

    fn normalize_constraints(&self, table: &mut TableDef) {
        if self.caps.folds_uniques() {
            for unique in std::mem::take(&mut table.uniques) {
                table.indices.push(IndexDef {
                    name: unique.name,
                    columns: unique.columns,
                    unique: true,
                    predicate: None,
                });
            }
        }
        if self.caps.catalog == CatalogFamily::MySql {
            // The MySQL family reports RESTRICT and NO ACTION interchangeably.
            for fk in &mut table.foreign_keys {
                fold_restrict(&mut fk.on_delete);
                fold_restrict(&mut fk.on_update);
            }
        }
    }

    fn diff_table(&self, desired: &TableDef, actual: &TableDef, ops: &mut Vec<SchemaOperation>) {
        let name = &desired.name;

        for column in &desired.columns {
            match actual.get_column(&column.name) {
                None => {
                    let mut column = column.clone();
                    column.primary = false;
                    ops.push(SchemaOperation::AddColumn {
                        table: name.clone(),
                        column,
                    });
                }
                Some(existing) if self.column_differs(column, existing) => {
                    ops.push(SchemaOperation::ChangeColumn {
                        table: name.clone(),
                        from: existing.clone(),
                        to: merged_column(column, existing),
                    });
                }
                Some(_) => {}
            }
        }
        for existing in &actual.columns {
            let keep = desired.has_column(&existing.name)
                || desired.is_unmanaged_column(&existing.name)
                || actual.is_unmanaged_column(&existing.name);
            if !keep {
                ops.push(SchemaOperation::DropColumn {
                    table: name.clone(),
                    column: existing.clone(),
                });
            }
        }

        self.diff_primary_key(desired, actual, ops);

        let index_rename = self.caps.rename_index != RenameStyle::None;
        let constraint_rename = self.caps.rename_constraint != RenameStyle::None;

        let indices = match_items(&desired.indices, &actual.indices, IndexDef::same_shape, |i| {
            i.name()
        });
        for index in indices.dropped {
            ops.push(SchemaOperation::DropIndex {
                table: name.clone(),
                index: index.clone(),
            });
        }
        for index in indices.added {
            ops.push(SchemaOperation::AddIndex {
                table: name.clone(),
                index: index.clone(),
            });
        }
        for (old, new) in indices.renamed {
            if index_rename {
                ops.push(rename(name, ConstraintKind::Index, old.name(), new.name()));
            } else {
                ops.push(SchemaOperation::DropIndex {
                    table: name.clone(),
                    index: old.clone(),
                });
                ops.push(SchemaOperation::AddIndex {
                    table: name.clone(),
                    index: new.clone(),
                });
            }
        }

        let uniques = match_items(&desired.uniques, &actual.uniques, |a, b| a.same_shape(b), |u| {
            u.name()
        });
        for unique in uniques.dropped {
            ops.push(SchemaOperation::DropUnique {
                table: name.clone(),
                unique: unique.clone(),
            });
        }
        for unique in uniques.added {
            ops.push(SchemaOperation::AddUnique {
                table: name.clone(),
                unique: unique.clone(),
            });
        }
        for (old, new) in uniques.renamed {
            if constraint_rename {
                ops.push(rename(name, ConstraintKind::Unique, old.name(), new.name()));
            } else {
                ops.push(SchemaOperation::DropUnique {
                    table: name.clone(),
                    unique: old.clone(),
                });
                ops.push(SchemaOperation::AddUnique {
                    table: name.clone(),
                    unique: new.clone(),
                });
            }
        }

        // Databases rewrite check and exclusion expressions, so these match
        // by name only; derived names hash the declared expression.
        let checks = match_by_name(&desired.checks, &actual.checks, |c| c.name());
        for check in checks.dropped {
            ops.push(SchemaOperation::DropCheck {
                table: name.clone(),
                check: check.clone(),
            });
        }
        for check in checks.added {
            ops.push(SchemaOperation::AddCheck {
                table: name.clone(),
                check: check.clone(),
            });
        }

        let exclusions = match_by_name(&desired.exclusions, &actual.exclusions, |e| e.name());
        for exclusion in exclusions.dropped {
            ops.push(SchemaOperation::DropExclusion {
                table: name.clone(),
                exclusion: exclusion.clone(),
            });
        }
        for exclusion in exclusions.added {
            ops.push(SchemaOperation::AddExclusion {
                table: name.clone(),
                exclusion: exclusion.clone(),
            });
        }

        let keys = match_items(
            &desired.foreign_keys,
            &actual.foreign_keys,
            ForeignKeyDef::same_shape,
            |f| f.name(),
        );
        for fk in keys.dropped {
            ops.push(SchemaOperation::DropForeignKey {
                table: name.clone(),
                foreign_key: fk.clone(),
            });
        }
        for fk in keys.added {
            ops.push(SchemaOperation::AddForeignKey {
                table: name.clone(),
                foreign_key: fk.clone(),
            });
        }
        for (old, new) in keys.renamed {
            if constraint_rename {
                ops.push(rename(name, ConstraintKind::ForeignKey, old.name(), new.name()));
            } else {
                ops.push(SchemaOperation::DropForeignKey {
                    table: name.clone(),
                    foreign_key: old.clone(),
                });
                ops.push(SchemaOperation::AddForeignKey {
                    table: name.clone(),
                    foreign_key: new.clone(),
                });
            }
        }
    }

    fn diff_primary_key(
        &self,
        desired: &TableDef,
        actual: &TableDef,
        ops: &mut Vec<SchemaOperation>,
    ) {
        let want = desired.primary_columns();
        let have = actual.primary_columns();
        let to_name = if self.caps.named_primary_key {
            desired.primary_key_name.clone()
        } else {
            None
        };

        if sorted(&want) != sorted(&have) {
            ops.push(SchemaOperation::ChangePrimaryKey {
                table: desired.name.clone(),
                from: have,
                to: want,
                from_name: actual.primary_key_name.clone(),
                to_name,
            });
            return;
        }

        if !self.caps.named_primary_key || want.is_empty() {
            return;
        }
        if let (Some(from), Some(to)) = (&actual.primary_key_name, &to_name) {
            if from != to && self.caps.rename_constraint != RenameStyle::None {
                ops.push(rename(&desired.name, ConstraintKind::PrimaryKey, from, to));
            }
        }
    }

    fn column_differs(&self, desired: &ColumnDef, actual: &ColumnDef) -> bool {
        let caps = self.caps;
        let mut seen = actual.clone();
        if desired.width.is_none() {
            seen.width = None;
        }
        if desired.collation.is_none() {
            seen.collation = None;
        }
        if desired.charset.is_none() {
            seen.charset = None;
        }

        let changed = caps.render_type(desired) != caps.render_type(&seen)
            || desired.nullable != actual.nullable
            || desired.generation != actual.generation
            || self.default_of(desired, desired) != self.default_of(desired, actual)
            || desired.comment != actual.comment
            || desired.collation != seen.collation
            || desired.charset != seen.charset
            || caps.normalize_default(desired, desired.on_update.as_deref())
                != caps.normalize_default(desired, actual.on_update.as_deref())
            || generated_key(desired) != generated_key(actual);
        if changed {
            debug!(column = %desired.name, "Column differs");
        }
        changed
    }

    /// Normalized default, with the desired column giving the type context.
    /// A generation strategy owns the default, so none is compared.
    fn default_of(&self, context: &ColumnDef, column: &ColumnDef) -> Option<String> {
        if column.generation != Generation::None || column.generated.is_some() {
            return None;
        }
        self.caps.normalize_default(context, column.default.as_deref())
    }

    /// Foreign keys touching a column whose type changes, or a table whose
    /// primary key changes, are dropped before and re-added after the change.
    fn reattach_disturbed_keys(
        &self,
        desired: &SchemaModel,
        base: &SchemaModel,
        ops: &mut Vec<SchemaOperation>,
    ) {
        if self.caps.alter_column == AlterColumnStyle::None {
            // The rebuild path carries every key through.
            return;
        }

        let mut retyped: HashSet<(String, String)> = HashSet::new();
        let mut rekeyed: HashSet<String> = HashSet::new();
        for op in ops.iter() {
            match op {
                SchemaOperation::ChangeColumn { table, from, to }
                    if self.caps.render_type(from) != self.caps.render_type(to) =>
                {
                    retyped.insert((table.clone(), from.name.clone()));
                }
                SchemaOperation::ChangePrimaryKey { table, .. } => {
                    rekeyed.insert(table.clone());
                }
                _ => {}
            }
        }
        if retyped.is_empty() && rekeyed.is_empty() {
            return;
        }

        let touched: HashSet<(String, String)> = ops
            .iter()
            .filter_map(|op| {
                op.removed_name()
                    .map(|n| (op.table().to_string(), n.to_string()))
            })
            .collect();

        let mut extra = Vec::new();
        for table in &base.tables {
            for fk in &table.foreign_keys {
                if touched.contains(&(table.name.clone(), fk.name().to_string())) {
                    continue;
                }
                let own = fk
                    .columns
                    .iter()
                    .any(|c| retyped.contains(&(table.name.clone(), c.clone())));
                let target = fk
                    .referenced_columns
                    .iter()
                    .any(|c| retyped.contains(&(fk.referenced_table.clone(), c.clone())));
                if !(own || target || rekeyed.contains(&fk.referenced_table)) {
                    continue;
                }

                let replacement = match desired.table(&table.name) {
                    Some(t) if t.synchronize => t
                        .foreign_keys
                        .iter()
                        .find(|d| d.name() == fk.name())
                        .cloned(),
                    _ => Some(fk.clone()),
                };
                extra.push(SchemaOperation::DropForeignKey {
                    table: table.name.clone(),
                    foreign_key: fk.clone(),
                });
                if let Some(foreign_key) = replacement {
                    extra.push(SchemaOperation::AddForeignKey {
                        table: table.name.clone(),
                        foreign_key,
                    });
                }
            }
        }
        ops.extend(extra);
    }
}

/// The target column for a change: what the user declared, plus the
/// attributes the database chose where the declaration is silent.
fn merged_column(desired: &ColumnDef, actual: &ColumnDef) -> ColumnDef {
    let mut to = desired.clone();
    if to.width.is_none() {
        to.width = actual.width;
    }
    if to.collation.is_none() {
        to.collation = actual.collation.clone();
    }
    if to.charset.is_none() {
        to.charset = actual.charset.clone();
    }
    to.primary = actual.primary;
    to
}

fn generated_key(column: &ColumnDef) -> Option<(String, GeneratedKind)> {
    column.generated.as_ref().map(|g| {
        let expr: String = normalize_expression(&g.expression)
            .chars()
            .filter(|c| !matches!(c, '"' | '`' | '[' | ']') && !c.is_whitespace())
            .collect();
        (expr.to_ascii_lowercase(), g.kind)
    })
}

fn fold_restrict(action: &mut ReferentialAction) {
    if *action == ReferentialAction::Restrict {
        *action = ReferentialAction::NoAction;
    }
}

fn sorted(columns: &[String]) -> BTreeSet<&str> {
    columns.iter().map(String::as_str).collect()
}

fn rename(table: &str, kind: ConstraintKind, from: &str, to: &str) -> SchemaOperation {
    SchemaOperation::RenameConstraint {
        table: table.to_string(),
        kind,
        from: from.to_string(),
        to: to.to_string(),
    }
}

struct Matched<'a, T> {
    added: Vec<&'a T>,
    dropped: Vec<&'a T>,
    /// `(actual, desired)` pairs equal in shape but not in name.
    renamed: Vec<(&'a T, &'a T)>,
}

/// Pair desired and actual items: first by shape and name, then by shape
/// alone. Whatever is left is added or dropped.
fn match_items<'a, T>(
    desired: &'a [T],
    actual: &'a [T],
    same_shape: impl Fn(&T, &T) -> bool,
    name: impl Fn(&T) -> &str,
) -> Matched<'a, T> {
    let mut used = vec![false; actual.len()];
    let mut unmatched = Vec::new();
    for d in desired {
        let hit = actual
            .iter()
            .enumerate()
            .position(|(i, a)| !used[i] && same_shape(d, a) && name(d) == name(a));
        match hit {
            Some(i) => used[i] = true,
            None => unmatched.push(d),
        }
    }

    let mut added = Vec::new();
    let mut renamed = Vec::new();
    for d in unmatched {
        // A rename must not steal a name another desired item still claims.
        let hit = actual.iter().enumerate().position(|(i, a)| {
            !used[i] && same_shape(d, a) && !desired.iter().any(|o| name(o) == name(a))
        });
        match hit {
            Some(i) => {
                used[i] = true;
                renamed.push((&actual[i], d));
            }
            None => added.push(d),
        }
    }

    let dropped = actual
        .iter()
        .enumerate()
        .filter(|(i, _)| !used[*i])
        .map(|(_, a)| a)
        .collect();
    Matched {
        added,
        dropped,
        renamed,
    }
}

fn match_by_name<'a, T>(
    desired: &'a [T],
    actual: &'a [T],
    name: impl Fn(&T) -> &str,
) -> Matched<'a, T> {
    Matched {
        added: desired
            .iter()
            .filter(|d| !actual.iter().any(|a| name(a) == name(d)))
            .collect(),
        dropped: actual
            .iter()
            .filter(|a| !desired.iter().any(|d| name(d) == name(a)))
            .collect(),
        renamed: Vec::new(),
    }
}
