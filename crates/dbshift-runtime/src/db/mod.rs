mod pool;
mod runner;

pub use pool::Database;
pub use runner::SqlxQueryRunner;
