mod diff;
mod generator;
mod loader;
mod operation;
mod order;
mod recorder;
mod runner;
mod sync;
mod synth;

pub use diff::{SchemaDiff, SchemaDiffer};
pub use generator::{pretty_statement, GeneratedMigration, MigrationGenerator};
pub use loader::{
    load_migrations_from_dir, load_units, parse_file_stem, parse_migration, split_sql_statements,
    DOWN_MARKER, NO_TRANSACTION_MARKER, UP_MARKER,
};
pub use operation::SchemaOperation;
pub use recorder::{MigrationRecord, MigrationRecorder, MigrationStatus, UnitInfo};
pub use runner::{Migration, MigrationRunner, RunOptions, RunState, SqlMigration};
pub use sync::SchemaSynchronizer;
pub use synth::{DdlSynthesizer, SqlBatch};
