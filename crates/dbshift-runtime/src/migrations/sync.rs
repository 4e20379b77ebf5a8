//! Direct synchronization: apply the diff without writing a migration.

use dbshift_core::db::QueryRunner;
use dbshift_core::dialect::{Dialect, DialectCapabilities};
use dbshift_core::error::Result;
use dbshift_core::schema::SchemaModel;
use tracing::{info, warn};

use super::diff::SchemaDiffer;
use super::runner::{check_integrity, setup_session, teardown_session};
use super::synth::{DdlSynthesizer, SqlBatch};
use crate::introspect::Introspector;

/// Brings a live database to the desired schema in one transaction.
pub struct SchemaSynchronizer {
    introspector: Introspector,
    differ: SchemaDiffer,
    synthesizer: DdlSynthesizer,
    filter: Option<Vec<String>>,
}

impl SchemaSynchronizer {
    pub fn new(dialect: Dialect) -> Self {
        Self::with_introspector(Introspector::new(dialect))
    }

    pub fn with_introspector(introspector: Introspector) -> Self {
        let dialect = introspector.dialect();
        Self {
            introspector,
            differ: SchemaDiffer::new(dialect),
            synthesizer: DdlSynthesizer::new(dialect),
            filter: None,
        }
    }

    /// Only read and compare these tables. Desired tables outside the list
    /// are skipped as well.
    pub fn with_filter(mut self, tables: Vec<String>) -> Self {
        self.filter = (!tables.is_empty()).then_some(tables);
        self
    }

    /// The statements a sync would run, without running them.
    pub async fn plan(
        &self,
        runner: &mut dyn QueryRunner,
        desired: &SchemaModel,
    ) -> Result<SqlBatch> {
        let actual = self
            .introspector
            .introspect(runner, self.filter.as_deref())
            .await?;
        let diff = match &self.filter {
            Some(filter) => {
                let mut desired = desired.clone();
                desired.tables.retain(|t| filter.contains(&t.name));
                self.differ.diff(&desired, &actual)?
            }
            None => self.differ.diff(desired, &actual)?,
        };
        for line in diff.describe() {
            info!(operation = %line, "Planned");
        }
        self.synthesizer.synthesize(&diff)
    }

    /// Apply the diff. Returns the executed statements.
    pub async fn sync(
        &self,
        runner: &mut dyn QueryRunner,
        desired: &SchemaModel,
    ) -> Result<Vec<String>> {
        let batch = self.plan(runner, desired).await?;
        if batch.is_empty() {
            info!("Schema is up to date");
            return Ok(Vec::new());
        }

        let caps = runner.dialect().capabilities();
        if !caps.transactional_ddl {
            warn!(
                dialect = %caps.dialect,
                "DDL is not transactional on this dialect; a failure can leave the schema partially synchronized"
            );
        }

        setup_session(runner, caps).await?;
        let result = apply(runner, caps, &batch.up).await;
        teardown_session(runner, caps).await;
        result?;

        info!(statements = batch.up.len(), "Schema synchronized");
        Ok(batch.up)
    }
}

async fn apply(
    runner: &mut dyn QueryRunner,
    caps: &DialectCapabilities,
    statements: &[String],
) -> Result<()> {
    runner.start_transaction().await?;
    let mut result = Ok(());
    for statement in statements {
        if let Err(e) = runner.execute(statement).await {
            result = Err(e);
            break;
        }
    }
    if result.is_ok() {
        result = check_integrity(runner, caps).await;
    }
    match result {
        Ok(()) => runner.commit_transaction().await,
        Err(e) => {
            if let Err(rollback) = runner.rollback_transaction().await {
                warn!(error = %rollback, "Rollback failed");
            }
            Err(e)
        }
    }
}
