pub mod db;
pub mod introspect;
pub mod migrations;

pub use db::{Database, SqlxQueryRunner};
pub use introspect::Introspector;
pub use migrations::{
    DdlSynthesizer, Migration, MigrationGenerator, MigrationRunner, MigrationStatus, RunOptions,
    SchemaDiff, SchemaDiffer, SchemaSynchronizer, SqlBatch, SqlMigration,
};
