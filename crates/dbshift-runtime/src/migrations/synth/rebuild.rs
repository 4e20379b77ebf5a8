use dbshift_core::error::Result;
use dbshift_core::schema::{SchemaModel, TableDef};

use super::render::SqlRenderer;
use super::{table_in, AlterStrategy};
use crate::migrations::operation::SchemaOperation;

/// Recreates the table under a temporary name, copies the rows across and
/// swaps it in. Used where the engine cannot alter a table in place.
pub(crate) struct RebuildStrategy {
    renderer: SqlRenderer,
}

impl RebuildStrategy {
    pub(crate) fn new(renderer: SqlRenderer) -> Self {
        Self { renderer }
    }

    fn rebuild(&self, old: &TableDef, new: &TableDef) -> Result<Vec<String>> {
        let r = &self.renderer;
        let shadow = format!("temporary_{}", new.name);
        let shadow_path = r.caps.quote_path(new.qualifier(), &shadow);

        let mut statements = vec![r.create_table_statement(new, Some(&shadow))?];

        let shared: Vec<String> = new
            .columns
            .iter()
            .filter(|c| c.generated.is_none() && old.has_column(&c.name))
            .map(|c| c.name.clone())
            .collect();
        if !shared.is_empty() {
            let columns = r.idents(&shared);
            statements.push(format!(
                "INSERT INTO {} ({}) SELECT {} FROM {}",
                shadow_path,
                columns,
                columns,
                r.table_path(old)
            ));
        }

        statements.push(r.drop_table(old));
        statements.push(format!(
            "ALTER TABLE {} RENAME TO {}",
            shadow_path,
            r.ident(&new.name)
        ));
        for index in &new.indices {
            statements.push(r.create_index(new, index)?);
        }
        Ok(statements)
    }
}

impl AlterStrategy for RebuildStrategy {
    fn render(
        &self,
        op: &SchemaOperation,
        before: &SchemaModel,
        after: &SchemaModel,
    ) -> Result<Vec<String>> {
        let name = op.table();
        self.rebuild(table_in(before, name)?, table_in(after, name)?)
    }
}
