use std::path::PathBuf;

use anyhow::Result;
use chrono::{DateTime, Utc};
use clap::{Args, Parser};
use console::style;

use dbshift_core::config::TransactionMode;
use dbshift_core::db::QueryRunner;
use dbshift_runtime::migrations::{
    load_units, MigrationGenerator, MigrationRunner, MigrationStatus, RunOptions,
};

use super::{print_header, Context};

/// Options shared by `migration:run` and `migration:revert`.
#[derive(Args)]
pub struct RunArgs {
    /// Transaction policy: all, each or none (overrides config).
    #[arg(short, long)]
    pub transaction: Option<TransactionMode>,

    /// Update the bookkeeping table without executing the migrations.
    #[arg(long)]
    pub fake: bool,

    /// Proceed despite orphaned records or changed checksums.
    #[arg(long)]
    pub force: bool,
}

impl RunArgs {
    fn options(&self, ctx: &Context) -> RunOptions {
        let mut options = ctx.run_options();
        if let Some(mode) = self.transaction {
            options.transaction = mode;
        }
        options.fake = self.fake;
        options.force = self.force;
        options
    }
}

/// Apply pending migrations.
#[derive(Parser)]
pub struct RunCommand {
    #[command(flatten)]
    pub args: RunArgs,
}

impl RunCommand {
    pub async fn execute(self, ctx: &Context) -> Result<()> {
        let units = load_units(ctx.migrations_dir())?;
        print_header("Migrations");
        if units.is_empty() {
            println!(
                "  {} No migrations found in {}",
                style("ℹ").blue(),
                ctx.migrations_dir().display()
            );
            println!();
            return Ok(());
        }

        let db = ctx.connect().await?;
        let mut runner = db.runner().await?;
        println!("  {} Running pending migrations...", style("→").dim());
        let result = MigrationRunner::new(&mut runner, self.args.options(ctx))
            .run(&units)
            .await;
        runner.release().await?;
        db.close().await;
        let applied = result?;

        if applied.is_empty() {
            println!("  {} No pending migrations", style("ℹ").blue());
        } else {
            for name in &applied {
                let verb = if self.args.fake { "Faked" } else { "Applied" };
                println!("  {} {}: {}", style("✓").green(), verb, name);
            }
            println!();
            println!(
                "  {} {} migration(s) complete",
                style("✓").green(),
                applied.len()
            );
        }
        println!();
        Ok(())
    }
}

/// Revert the most recently applied migration.
#[derive(Parser)]
pub struct RevertCommand {
    #[command(flatten)]
    pub args: RunArgs,
}

impl RevertCommand {
    pub async fn execute(self, ctx: &Context) -> Result<()> {
        let units = load_units(ctx.migrations_dir())?;
        print_header("Migrations");

        let db = ctx.connect().await?;
        let mut runner = db.runner().await?;
        println!("  {} Reverting last migration...", style("→").dim());
        let result = MigrationRunner::new(&mut runner, self.args.options(ctx))
            .revert(&units)
            .await;
        runner.release().await?;
        db.close().await;

        match result? {
            Some(name) => println!("  {} Reverted: {}", style("✓").green(), name),
            None => println!("  {} No migrations to revert", style("ℹ").blue()),
        }
        println!();
        Ok(())
    }
}

/// List applied and pending migrations.
#[derive(Parser)]
pub struct ShowCommand {
    /// Print the status as JSON.
    #[arg(long)]
    pub json: bool,
}

impl ShowCommand {
    pub async fn execute(self, ctx: &Context) -> Result<()> {
        let units = load_units(ctx.migrations_dir())?;
        let db = ctx.connect().await?;
        let mut runner = db.runner().await?;
        let result = MigrationRunner::new(&mut runner, ctx.run_options())
            .show(&units)
            .await;
        runner.release().await?;
        db.close().await;
        let status = result?;

        if self.json {
            println!("{}", serde_json::to_string_pretty(&status)?);
        } else {
            print_header("Migration Status");
            print_status(&status);
        }
        Ok(())
    }
}

fn print_status(status: &MigrationStatus) {
    if status.applied.is_empty() && status.pending.is_empty() && status.orphaned.is_empty() {
        println!("  {} No migrations found", style("ℹ").blue());
        println!();
        return;
    }

    if !status.applied.is_empty() {
        println!("  {} Applied:", style("✓").green());
        for record in &status.applied {
            println!(
                "    {} {} {} ({})",
                style("[X]").green(),
                style(format!("{}_{}", record.timestamp, record.name)).cyan(),
                style("at").dim(),
                format_millis(record.applied_at)
            );
        }
    }

    if !status.pending.is_empty() {
        if !status.applied.is_empty() {
            println!();
        }
        println!("  {} Pending:", style("○").yellow());
        for unit in &status.pending {
            let late = status
                .out_of_order
                .iter()
                .any(|u| u.timestamp == unit.timestamp);
            let note = if late {
                style(" (older than the newest applied migration)").red().to_string()
            } else {
                String::new()
            };
            println!(
                "    {} {}{}",
                style("[ ]").dim(),
                style(unit.full_name()).yellow(),
                note
            );
        }
    }

    if !status.orphaned.is_empty() {
        println!();
        println!("  {} Recorded without a migration file:", style("!").red());
        for record in &status.orphaned {
            println!("    {}_{}", record.timestamp, record.name);
        }
    }
    if !status.checksum_mismatches.is_empty() {
        println!();
        println!("  {} Changed since applied:", style("!").red());
        for name in &status.checksum_mismatches {
            println!("    {}", name);
        }
    }

    println!();
    println!(
        "  {} {} applied, {} pending",
        style("ℹ").blue(),
        status.applied.len(),
        status.pending.len()
    );
    println!();
}

fn format_millis(millis: i64) -> String {
    DateTime::<Utc>::from_timestamp_millis(millis)
        .map(|at| at.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| millis.to_string())
}

/// Write a migration for the current schema drift.
#[derive(Parser)]
pub struct GenerateCommand {
    /// Migration name, optionally with a directory (`db/migrations/AddBody`).
    pub path: PathBuf,

    /// Put each column of a CREATE TABLE on its own line.
    #[arg(short, long)]
    pub pretty: bool,

    /// Print the migration instead of writing it.
    #[arg(long)]
    pub dryrun: bool,

    /// Fail when the schema has drifted; write nothing.
    #[arg(long)]
    pub check: bool,
}

impl GenerateCommand {
    pub async fn execute(self, ctx: &Context) -> Result<()> {
        let desired = ctx.desired()?;
        let db = ctx.connect().await?;
        let mut runner = db.runner().await?;
        let actual = ctx
            .introspector(&db)
            .introspect(&mut runner, ctx.table_filter())
            .await;
        runner.release().await?;
        db.close().await;
        let actual = actual?;

        let (dir, name) = MigrationGenerator::target(&self.path, ctx.migrations_dir());
        let generator = MigrationGenerator::new(db.dialect(), dir);
        let Some(migration) = generator.generate(&name, &desired, &actual, Utc::now())? else {
            println!(
                "  {} No changes in database schema were found",
                style("ℹ").blue()
            );
            return Ok(());
        };

        if self.check {
            println!(
                "  {} Schema drift detected; a migration with {} statement(s) is needed:",
                style("✗").red(),
                migration.up.len()
            );
            for statement in &migration.up {
                println!("    {};", statement);
            }
            anyhow::bail!("Schema is out of date");
        }

        if self.dryrun {
            print!("{}", migration.render(self.pretty));
            return Ok(());
        }

        let path = generator.write(&migration, self.pretty)?;
        println!(
            "  {} Migration {} has been generated",
            style("✓").green(),
            style(path.display()).cyan()
        );
        Ok(())
    }
}

/// Write an empty migration.
#[derive(Parser)]
pub struct CreateCommand {
    /// Migration name, optionally with a directory.
    pub path: PathBuf,
}

impl CreateCommand {
    pub fn execute(self, ctx: &Context) -> Result<()> {
        let path = self.create(ctx, Utc::now())?;
        println!(
            "  {} Migration {} has been created",
            style("✓").green(),
            style(path.display()).cyan()
        );
        Ok(())
    }

    fn create(&self, ctx: &Context, at: DateTime<Utc>) -> Result<PathBuf> {
        let (dir, name) = MigrationGenerator::target(&self.path, ctx.migrations_dir());
        let generator = MigrationGenerator::new(ctx.config.database.dialect()?, dir);
        let migration = generator.create(&name, at)?;
        Ok(generator.write(&migration, false)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use dbshift_core::config::ShiftConfig;
    use dbshift_runtime::migrations::load_migrations_from_dir;
    use tempfile::TempDir;

    fn context(dir: &TempDir) -> Context {
        let mut config = ShiftConfig::default_with_database_url("sqlite::memory:");
        config.migrations.directory = dir.path().join("migrations");
        Context::new(config, None)
    }

    #[test]
    fn test_create_writes_empty_migration() {
        let dir = TempDir::new().unwrap();
        let ctx = context(&dir);
        let at = Utc.with_ymd_and_hms(2024, 5, 6, 7, 8, 9).unwrap();

        let cmd = CreateCommand {
            path: PathBuf::from("AddBody"),
        };
        let path = cmd.create(&ctx, at).unwrap();
        assert_eq!(path.parent(), Some(ctx.migrations_dir()));

        let loaded = load_migrations_from_dir(ctx.migrations_dir()).unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].name, "add_body");
        assert_eq!(loaded[0].timestamp, at.timestamp_millis());
        assert!(loaded[0].up.is_empty());
    }

    #[test]
    fn test_run_args_override_config() {
        let dir = TempDir::new().unwrap();
        let ctx = context(&dir);
        let args = RunArgs {
            transaction: Some(TransactionMode::None),
            fake: true,
            force: false,
        };
        let options = args.options(&ctx);
        assert_eq!(options.transaction, TransactionMode::None);
        assert!(options.fake);
        assert_eq!(options.table_name, "migrations");
    }

    #[test]
    fn test_format_millis() {
        assert_eq!(format_millis(0), "1970-01-01 00:00:00");
    }
}
