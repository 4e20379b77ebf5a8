//! dbshift - schema synchronization and migrations for SQL databases.
//!
//! The library half of the binary: the command definitions and the glue that
//! turns configuration into runtime calls. The engine itself lives in
//! `dbshift-core` and `dbshift-runtime`.

pub mod cli;

pub use cli::Cli;
