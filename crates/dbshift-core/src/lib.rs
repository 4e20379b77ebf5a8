pub mod config;
pub mod db;
pub mod dialect;
pub mod error;
pub mod schema;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use config::{DatabaseConfig, MigrationsConfig, SchemaConfig, ShiftConfig, TransactionMode};
pub use db::{QueryFuture, QueryRunner, Row, Value};
pub use dialect::{Dialect, DialectCapabilities};
pub use error::{Result, ShiftError};
pub use schema::{
    CheckDef, ColumnDef, ExclusionDef, ForeignKeyDef, Generation, IndexDef, LogicalType,
    NamingStrategy, ReferentialAction, SchemaModel, TableDef, UniqueDef,
};
