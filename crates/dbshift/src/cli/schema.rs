use anyhow::Result;
use clap::Parser;
use console::style;

use dbshift_core::db::QueryRunner;
use dbshift_runtime::migrations::SchemaSynchronizer;

use super::{print_header, Context};

/// Bring the database to the desired schema without a migration.
#[derive(Parser)]
pub struct SyncCommand {
    /// Print the statements instead of running them.
    #[arg(long)]
    pub dryrun: bool,
}

impl SyncCommand {
    pub async fn execute(self, ctx: &Context) -> Result<()> {
        let desired = ctx.desired()?;
        let db = ctx.connect().await?;
        let mut runner = db.runner().await?;

        let sync = SchemaSynchronizer::with_introspector(ctx.introspector(&db))
            .with_filter(ctx.config.schema.tables.clone());

        print_header("Schema Sync");
        let result = if self.dryrun {
            sync.plan(&mut runner, &desired).await.map(|batch| batch.up)
        } else {
            sync.sync(&mut runner, &desired).await
        };
        runner.release().await?;
        db.close().await;
        let statements = result?;

        if statements.is_empty() {
            println!("  {} Schema is already in sync", style("ℹ").blue());
            println!();
            return Ok(());
        }

        let label = if self.dryrun { "Would execute" } else { "Executed" };
        println!("  {} {}:", style("→").dim(), label);
        for statement in &statements {
            println!("    {};", statement);
        }
        println!();
        if !self.dryrun {
            println!(
                "  {} Schema synchronized ({} statements)",
                style("✓").green(),
                statements.len()
            );
            println!();
        }
        Ok(())
    }
}
