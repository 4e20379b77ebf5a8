mod migration;
mod schema;

pub use migration::{CreateCommand, GenerateCommand, RevertCommand, RunCommand, ShowCommand};
pub use schema::SyncCommand;

use std::path::{Path, PathBuf};

use anyhow::{Context as _, Result};
use clap::{Parser, Subcommand};
use console::style;
use tracing::info;

use dbshift_core::config::ShiftConfig;
use dbshift_core::schema::SchemaModel;
use dbshift_runtime::db::Database;
use dbshift_runtime::introspect::Introspector;
use dbshift_runtime::migrations::RunOptions;

/// dbshift - keep a database schema in step with its declaration
#[derive(Parser)]
#[command(name = "dbshift")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Configuration file path.
    #[arg(short, long, default_value = "dbshift.toml", global = true)]
    pub config: PathBuf,

    /// Desired schema file (overrides config).
    #[arg(short, long, global = true)]
    pub schema: Option<PathBuf>,

    /// Log at debug level unless RUST_LOG says otherwise.
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

/// CLI commands.
#[derive(Subcommand)]
pub enum Commands {
    /// Bring the database to the desired schema without a migration.
    #[command(name = "schema:sync")]
    SchemaSync(SyncCommand),

    /// Apply pending migrations.
    #[command(name = "migration:run")]
    MigrationRun(RunCommand),

    /// Revert the most recently applied migration.
    #[command(name = "migration:revert")]
    MigrationRevert(RevertCommand),

    /// List applied and pending migrations.
    #[command(name = "migration:show")]
    MigrationShow(ShowCommand),

    /// Write a migration for the current schema drift.
    #[command(name = "migration:generate")]
    MigrationGenerate(GenerateCommand),

    /// Write an empty migration.
    #[command(name = "migration:create")]
    MigrationCreate(CreateCommand),
}

impl Cli {
    /// Execute the CLI command.
    pub async fn execute(self) -> Result<()> {
        dotenvy::dotenv().ok();
        init_tracing(self.verbose);

        let ctx = Context::load(&self.config, self.schema.as_deref())?;
        match self.command {
            Commands::SchemaSync(cmd) => cmd.execute(&ctx).await,
            Commands::MigrationRun(cmd) => cmd.execute(&ctx).await,
            Commands::MigrationRevert(cmd) => cmd.execute(&ctx).await,
            Commands::MigrationShow(cmd) => cmd.execute(&ctx).await,
            Commands::MigrationGenerate(cmd) => cmd.execute(&ctx).await,
            Commands::MigrationCreate(cmd) => cmd.execute(&ctx),
        }
    }
}

fn init_tracing(verbose: bool) {
    let log_level = if verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(std::env::var("RUST_LOG").unwrap_or_else(|_| log_level.to_string()))
        .with_writer(std::io::stderr)
        .init();
}

/// Resolved configuration shared by every command.
pub struct Context {
    pub config: ShiftConfig,
    pub schema_path: PathBuf,
}

impl Context {
    /// Read the config file, falling back to `DATABASE_URL` when there is
    /// none. `schema` overrides the configured schema file.
    pub fn load(config_path: &Path, schema: Option<&Path>) -> Result<Self> {
        let config = if config_path.exists() {
            info!("Loading configuration from {}", config_path.display());
            ShiftConfig::from_file(config_path)?
        } else if let Ok(url) = std::env::var("DATABASE_URL") {
            ShiftConfig::default_with_database_url(&url)
        } else {
            anyhow::bail!(
                "Configuration file not found: {}\nCreate it or set DATABASE_URL.",
                config_path.display()
            );
        };
        Ok(Self::new(config, schema.map(Path::to_path_buf)))
    }

    pub fn new(config: ShiftConfig, schema: Option<PathBuf>) -> Self {
        let schema_path = schema.unwrap_or_else(|| config.schema.path.clone());
        Self {
            config,
            schema_path,
        }
    }

    pub async fn connect(&self) -> Result<Database> {
        Database::from_config(&self.config.database)
            .await
            .context("Failed to connect to the database")
    }

    /// The desired schema, limited to the configured tables.
    pub fn desired(&self) -> Result<SchemaModel> {
        let mut model = SchemaModel::from_file(&self.schema_path).with_context(|| {
            format!("Failed to load schema from {}", self.schema_path.display())
        })?;
        if let Some(filter) = self.table_filter() {
            model.tables.retain(|t| filter.contains(&t.name));
        }
        Ok(model)
    }

    pub fn table_filter(&self) -> Option<&[String]> {
        let tables = &self.config.schema.tables;
        (!tables.is_empty()).then_some(tables.as_slice())
    }

    pub fn introspector(&self, database: &Database) -> Introspector {
        Introspector::new(database.dialect())
            .with_schema(self.config.database.schema.clone())
            .with_bookkeeping_table(self.config.migrations.table_name.clone())
    }

    pub fn run_options(&self) -> RunOptions {
        let mut options = RunOptions::from_config(&self.config.migrations);
        options.schema = self.config.database.schema.clone();
        options
    }

    pub fn migrations_dir(&self) -> &Path {
        &self.config.migrations.directory
    }
}

fn print_header(title: &str) {
    println!();
    println!(
        "  {}  {}",
        style("dbshift").bold().cyan(),
        style(title).bold()
    );
    println!();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parse() {
        let cli = Cli::try_parse_from(["dbshift", "schema:sync", "--dryrun"]);
        assert!(cli.is_ok());
    }

    #[test]
    fn test_cli_parse_global_flags() {
        let cli = Cli::try_parse_from([
            "dbshift",
            "migration:run",
            "--transaction",
            "each",
            "--config",
            "db/dbshift.toml",
            "-v",
        ])
        .unwrap();
        assert!(cli.verbose);
        assert_eq!(cli.config, PathBuf::from("db/dbshift.toml"));
        assert!(matches!(cli.command, Commands::MigrationRun(_)));
    }

    #[test]
    fn test_cli_rejects_unknown_transaction_mode() {
        let cli = Cli::try_parse_from(["dbshift", "migration:revert", "--transaction", "some"]);
        assert!(cli.is_err());
    }

    #[test]
    fn test_cli_generate_requires_path() {
        assert!(Cli::try_parse_from(["dbshift", "migration:generate"]).is_err());
        assert!(Cli::try_parse_from(["dbshift", "migration:generate", "AddBody", "--check"]).is_ok());
    }

    #[test]
    fn test_context_schema_override() {
        let mut config = ShiftConfig::default_with_database_url("sqlite::memory:");
        config.schema.tables = vec!["post".into()];

        let ctx = Context::new(config.clone(), None);
        assert_eq!(ctx.schema_path, PathBuf::from("schema.toml"));
        assert_eq!(ctx.table_filter(), Some(&["post".to_string()][..]));

        let ctx = Context::new(config, Some(PathBuf::from("other.json")));
        assert_eq!(ctx.schema_path, PathBuf::from("other.json"));
    }
}
