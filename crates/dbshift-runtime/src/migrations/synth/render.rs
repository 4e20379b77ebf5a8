use dbshift_core::dialect::{
    CommentStyle, DialectCapabilities, DropIndexStyle, GeneratedStyle, IncrementStyle,
};
use dbshift_core::error::{Result, ShiftError};
use dbshift_core::schema::{
    CheckDef, ColumnDef, ExclusionDef, ForeignKeyDef, GeneratedKind, Generation, IndexDef,
    ReferentialAction, TableDef, UniqueDef,
};

/// Renders schema descriptors as dialect SQL.
#[derive(Clone, Copy)]
pub(crate) struct SqlRenderer {
    pub caps: &'static DialectCapabilities,
}

impl SqlRenderer {
    pub fn new(caps: &'static DialectCapabilities) -> Self {
        Self { caps }
    }

    pub fn ident(&self, name: &str) -> String {
        self.caps.quote_ident(name)
    }

    pub fn idents(&self, names: &[String]) -> String {
        names
            .iter()
            .map(|n| self.ident(n))
            .collect::<Vec<_>>()
            .join(", ")
    }

    pub fn table_path(&self, table: &TableDef) -> String {
        self.caps.quote_path(table.qualifier(), &table.name)
    }

    /// Whether the table's primary key is declared on the column itself.
    pub fn inline_primary_key(&self, table: &TableDef) -> Option<String> {
        if self.caps.increment != IncrementStyle::Autoincrement {
            return None;
        }
        let primary: Vec<&ColumnDef> = table.columns.iter().filter(|c| c.primary).collect();
        match primary.as_slice() {
            [column] if column.generation == Generation::Increment => Some(column.name.clone()),
            _ => None,
        }
    }

    /// Full column definition. `inline_primary` marks the SQLite rowid alias.
    pub fn column_definition(
        &self,
        table: &TableDef,
        column: &ColumnDef,
        inline_primary: bool,
    ) -> Result<String> {
        let caps = self.caps;
        let mut parts = vec![self.ident(&column.name)];

        if let Some(generated) = &column.generated {
            if !caps.generated_columns {
                return Err(ShiftError::unsupported(caps.dialect, "generated columns"));
            }
            if caps.generated_style == GeneratedStyle::Computed {
                parts.push(format!("AS ({})", generated.expression));
                if generated.kind == GeneratedKind::Stored {
                    parts.push("PERSISTED".to_string());
                }
                return Ok(parts.join(" "));
            }
        }

        parts.push(caps.render_declared_type(column));
        if caps.column_charset {
            if let Some(charset) = &column.charset {
                parts.push(format!("CHARACTER SET {}", charset));
            }
        }
        if caps.collation {
            if let Some(collation) = &column.collation {
                parts.push(format!("COLLATE {}", self.collation(collation)));
            }
        }
        if let Some(generated) = &column.generated {
            let kind = match generated.kind {
                GeneratedKind::Stored => "STORED",
                GeneratedKind::Virtual => "VIRTUAL",
            };
            parts.push(format!("GENERATED ALWAYS AS ({}) {}", generated.expression, kind));
        }
        if !column.nullable {
            parts.push("NOT NULL".to_string());
        }
        if let Some(default) = self.default_expression(column) {
            if caps.named_defaults {
                parts.push(format!(
                    "CONSTRAINT {} DEFAULT {}",
                    self.ident(&default_constraint_name(table, column)),
                    default
                ));
            } else {
                parts.push(format!("DEFAULT {}", default));
            }
        }
        if caps.on_update {
            if let Some(on_update) = &column.on_update {
                parts.push(format!("ON UPDATE {}", on_update));
            }
        }
        match column.generation {
            Generation::Increment => match caps.increment {
                IncrementStyle::AutoIncrement => parts.push("AUTO_INCREMENT".to_string()),
                IncrementStyle::Identity => parts.push("IDENTITY(1,1)".to_string()),
                IncrementStyle::Autoincrement if inline_primary => {
                    parts.push("PRIMARY KEY AUTOINCREMENT".to_string())
                }
                IncrementStyle::Autoincrement | IncrementStyle::Serial => {}
            },
            Generation::Identity => {
                if let Some(identity) = caps.identity {
                    parts.push(identity.to_string());
                }
            }
            Generation::None | Generation::Uuid => {}
        }
        if caps.comments == CommentStyle::Inline {
            if let Some(comment) = &column.comment {
                parts.push(format!("COMMENT {}", caps.quote_literal(comment)));
            }
        }
        Ok(parts.join(" "))
    }

    /// The DEFAULT clause value, including generated UUID defaults.
    pub fn default_expression(&self, column: &ColumnDef) -> Option<String> {
        match column.generation {
            Generation::Uuid => self.caps.uuid_default.map(str::to_string),
            Generation::Increment | Generation::Identity => None,
            Generation::None => column.default.clone(),
        }
    }

    fn collation(&self, collation: &str) -> String {
        if self.caps.quote_open == '"' {
            self.ident(collation)
        } else {
            collation.to_string()
        }
    }

    /// `CREATE TABLE` with inline primary key, uniques, checks, exclusions
    /// and foreign keys. `name` overrides the table name (rebuild shadows).
    pub fn create_table_statement(&self, table: &TableDef, name: Option<&str>) -> Result<String> {
        let inline = self.inline_primary_key(table);
        let mut items = Vec::new();
        for column in &table.columns {
            let rowid = inline.as_deref() == Some(column.name.as_str());
            items.push(self.column_definition(table, column, rowid)?);
        }
        if inline.is_none() {
            if let Some(pk) = self.primary_key_clause(table) {
                items.push(pk);
            }
        }
        for unique in &table.uniques {
            items.push(self.unique_clause(unique));
        }
        for check in &table.checks {
            items.push(self.check_clause(check)?);
        }
        for exclusion in &table.exclusions {
            items.push(self.exclusion_clause(exclusion)?);
        }
        for fk in &table.foreign_keys {
            items.push(self.foreign_key_clause(table, fk));
        }

        let path = self
            .caps
            .quote_path(table.qualifier(), name.unwrap_or(&table.name));
        Ok(format!("CREATE TABLE {} ({})", path, items.join(", ")))
    }

    /// `CREATE TABLE` plus the statements that complete it: indices and
    /// separate column comments.
    pub fn create_table(&self, table: &TableDef) -> Result<Vec<String>> {
        let mut statements = vec![self.create_table_statement(table, None)?];
        for index in &table.indices {
            statements.push(self.create_index(table, index)?);
        }
        for column in &table.columns {
            if let Some(comment) = self.comment_statement(table, column, column.comment.as_deref()) {
                statements.push(comment);
            }
        }
        Ok(statements)
    }

    pub fn drop_table(&self, table: &TableDef) -> String {
        format!("DROP TABLE {}", self.table_path(table))
    }

    pub fn primary_key_clause(&self, table: &TableDef) -> Option<String> {
        let columns = table.primary_columns();
        if columns.is_empty() {
            return None;
        }
        Some(match (&table.primary_key_name, self.caps.named_primary_key) {
            (Some(name), true) => format!(
                "CONSTRAINT {} PRIMARY KEY ({})",
                self.ident(name),
                self.idents(&columns)
            ),
            _ => format!("PRIMARY KEY ({})", self.idents(&columns)),
        })
    }

    pub fn unique_clause(&self, unique: &UniqueDef) -> String {
        format!(
            "CONSTRAINT {} UNIQUE ({})",
            self.ident(unique.name()),
            self.idents(&unique.columns)
        )
    }

    pub fn check_clause(&self, check: &CheckDef) -> Result<String> {
        if !self.caps.checks {
            return Err(ShiftError::unsupported(self.caps.dialect, "check constraints"));
        }
        Ok(format!(
            "CONSTRAINT {} CHECK ({})",
            self.ident(check.name()),
            check.expression
        ))
    }

    pub fn exclusion_clause(&self, exclusion: &ExclusionDef) -> Result<String> {
        if !self.caps.exclusions {
            return Err(ShiftError::unsupported(self.caps.dialect, "exclusion constraints"));
        }
        Ok(format!(
            "CONSTRAINT {} EXCLUDE {}",
            self.ident(exclusion.name()),
            exclusion.expression
        ))
    }

    pub fn foreign_key_clause(&self, table: &TableDef, fk: &ForeignKeyDef) -> String {
        let qualifier = fk
            .referenced_database
            .as_deref()
            .or(fk.referenced_schema.as_deref())
            .or(table.schema.as_deref());
        let mut sql = format!(
            "CONSTRAINT {} FOREIGN KEY ({}) REFERENCES {} ({})",
            self.ident(fk.name()),
            self.idents(&fk.columns),
            self.caps.quote_path(qualifier, &fk.referenced_table),
            self.idents(&fk.referenced_columns)
        );
        if fk.on_delete != ReferentialAction::NoAction {
            sql.push_str(&format!(" ON DELETE {}", fk.on_delete.as_sql()));
        }
        if fk.on_update != ReferentialAction::NoAction {
            sql.push_str(&format!(" ON UPDATE {}", fk.on_update.as_sql()));
        }
        sql
    }

    pub fn create_index(&self, table: &TableDef, index: &IndexDef) -> Result<String> {
        if index.predicate.is_some() && !self.caps.partial_indexes {
            return Err(ShiftError::unsupported(self.caps.dialect, "partial indices"));
        }
        // SQLite qualifies the index, not the table, with the attached database.
        let (index_path, table_path) = match (&table.database, self.caps.drop_index) {
            (Some(db), DropIndexStyle::Standalone) => (
                self.caps.quote_path(Some(db), index.name()),
                self.ident(&table.name),
            ),
            _ => (self.ident(index.name()), self.table_path(table)),
        };
        let mut sql = format!(
            "CREATE {}INDEX {} ON {} ({})",
            if index.unique { "UNIQUE " } else { "" },
            index_path,
            table_path,
            self.idents(&index.columns)
        );
        if let Some(predicate) = &index.predicate {
            sql.push_str(&format!(" WHERE {}", predicate));
        }
        Ok(sql)
    }

    pub fn drop_index(&self, table: &TableDef, index: &IndexDef) -> String {
        match self.caps.drop_index {
            DropIndexStyle::Standalone => format!(
                "DROP INDEX {}",
                self.caps.quote_path(table.qualifier(), index.name())
            ),
            DropIndexStyle::OnTable => format!(
                "DROP INDEX {} ON {}",
                self.ident(index.name()),
                self.table_path(table)
            ),
        }
    }

    /// `COMMENT ON COLUMN`, for dialects that keep comments out of line.
    pub fn comment_statement(
        &self,
        table: &TableDef,
        column: &ColumnDef,
        comment: Option<&str>,
    ) -> Option<String> {
        if self.caps.comments != CommentStyle::CommentOn {
            return None;
        }
        let comment = comment?;
        Some(self.set_comment(table, column, Some(comment)))
    }

    pub fn set_comment(&self, table: &TableDef, column: &ColumnDef, comment: Option<&str>) -> String {
        format!(
            "COMMENT ON COLUMN {}.{} IS {}",
            self.table_path(table),
            self.ident(&column.name),
            comment
                .map(|c| self.caps.quote_literal(c))
                .unwrap_or_else(|| "NULL".to_string())
        )
    }

    pub fn alter_table(&self, table: &TableDef, clause: &str) -> String {
        format!("ALTER TABLE {} {}", self.table_path(table), clause)
    }
}

/// Name of a SQL Server default constraint.
pub(crate) fn default_constraint_name(table: &TableDef, column: &ColumnDef) -> String {
    format!("DF_{}_{}", table.name, column.name)
}
