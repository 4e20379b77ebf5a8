//! Testing utilities.
//!
//! Prefer a real database where one is cheap: SQLite in memory covers most
//! of the migration pipeline. [`MockQueryRunner`] is for unit tests that need
//! to observe the exact statement stream or inject failures.

pub mod mock_runner;

pub use mock_runner::{MockQueryRunner, BEGIN, COMMIT, ROLLBACK};

/// Read `TEST_DATABASE_URL`, the explicit opt-in for tests against a real
/// server. `DATABASE_URL` is never read here.
pub fn test_database_url() -> Option<String> {
    std::env::var("TEST_DATABASE_URL").ok().filter(|u| !u.is_empty())
}
